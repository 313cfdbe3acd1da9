//! Open-world `$type` unions
//!
//! Many lexicon fields hold "one of these object shapes", discriminated by a
//! `$type` string. The set of shapes grows as the protocol evolves, so a
//! decoder must not fail on a tag it has never seen. [`Union<V>`] is either
//! a [`Known`](Union::Known) variant of the closed enum `V`, or an
//! [`Unknown`](Union::Unknown) one that keeps the original object verbatim
//! and writes it back unchanged on encode.
//!
//! Union enums are declared with [`open_union!`](crate::open_union), which
//! generates the tag registry:
//!
//! ```
//! use atproto_client::open_union;
//! use atproto_client::union::Union;
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! pub struct Images {
//!     pub count: u32,
//! }
//!
//! open_union! {
//!     #[derive(Debug, Clone, PartialEq)]
//!     pub enum Embed {
//!         Images(Images) = "app.example.embed#images",
//!     }
//! }
//!
//! let known: Union<Embed> =
//!     serde_json::from_value(json!({"$type": "app.example.embed#images", "count": 2})).unwrap();
//! assert_eq!(known.known(), Some(&Embed::Images(Images { count: 2 })));
//!
//! let future = json!({"$type": "app.example.embed#hologram", "depth": 3});
//! let unknown: Union<Embed> = serde_json::from_value(future.clone()).unwrap();
//! assert_eq!(unknown.tag(), "app.example.embed#hologram");
//! assert_eq!(serde_json::to_value(&unknown).unwrap(), future);
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Discriminator field used by every lexicon union
pub const TYPE_FIELD: &str = "$type";

#[doc(hidden)]
pub mod __private {
    pub use serde;
    pub use serde_json;
}

/// A variant whose tag is not in the registry
///
/// `fields` is the complete original object, discriminator included.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownVariant {
    /// The discriminator value; empty when it was missing or not a string
    pub tag: String,
    /// The original object
    pub fields: Map<String, Value>,
}

/// Registry of the known variants of one union
///
/// Implemented by [`open_union!`](crate::open_union); hand-written impls
/// are possible but rarely needed.
pub trait UnionVariants: Sized {
    /// Every tag this union recognizes
    fn tags() -> &'static [&'static str];

    /// Decode `payload` as the variant registered under `tag`
    ///
    /// Only called with tags from [`tags`](UnionVariants::tags). The payload
    /// still contains the discriminator.
    fn decode_variant(tag: &str, payload: Value) -> Result<Self, serde_json::Error>;

    /// Tag of this variant
    fn tag(&self) -> &'static str;

    /// Fields of this variant, without the discriminator
    fn encode_fields(&self) -> Result<Map<String, Value>, serde_json::Error>;
}

/// A union value: a known variant or a preserved unknown one
#[derive(Debug, Clone, PartialEq)]
pub enum Union<V> {
    /// A registered variant
    Known(V),
    /// Anything else
    Unknown(UnknownVariant),
}

impl<V: UnionVariants> Union<V> {
    /// The discriminator of this value
    pub fn tag(&self) -> &str {
        match self {
            Union::Known(v) => v.tag(),
            Union::Unknown(u) => &u.tag,
        }
    }
}

impl<V> Union<V> {
    /// The known variant, if it is one
    pub fn known(&self) -> Option<&V> {
        match self {
            Union::Known(v) => Some(v),
            Union::Unknown(_) => None,
        }
    }

    /// Consume into the known variant, if it is one
    pub fn into_known(self) -> Option<V> {
        match self {
            Union::Known(v) => Some(v),
            Union::Unknown(_) => None,
        }
    }

    /// Whether the tag was not recognized
    pub fn is_unknown(&self) -> bool {
        matches!(self, Union::Unknown(_))
    }
}

impl<V> From<V> for Union<V> {
    fn from(value: V) -> Self {
        Union::Known(value)
    }
}

/// Decode a union from its JSON object, discriminated by `discriminator`
///
/// `known` lists the recognized tags and `decode` builds the variant for
/// one of them. Any other tag, or a missing one, yields
/// [`Union::Unknown`] holding the object untouched. A recognized tag whose
/// fields do not match the variant is an error. A payload that is not a
/// JSON object is an error.
pub fn decode_with<T, F>(
    payload: Value,
    discriminator: &str,
    known: &[&str],
    decode: F,
) -> Result<Union<T>, serde_json::Error>
where
    F: FnOnce(&str, Value) -> Result<T, serde_json::Error>,
{
    let Value::Object(fields) = payload else {
        return Err(serde_json::Error::custom(format!(
            "union payload must be a JSON object, got {}",
            json_type_name(&payload)
        )));
    };

    let tag = fields
        .get(discriminator)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if !tag.is_empty() && known.contains(&tag.as_str()) {
        return decode(&tag, Value::Object(fields)).map(Union::Known);
    }

    if tag.is_empty() {
        tracing::debug!("Union payload without a {} string", discriminator);
    }
    Ok(Union::Unknown(UnknownVariant { tag, fields }))
}

/// Decode a `$type` union using the registry of `V`
pub fn decode_union<V: UnionVariants>(payload: Value) -> Result<Union<V>, serde_json::Error> {
    decode_with(payload, TYPE_FIELD, V::tags(), V::decode_variant)
}

/// Encode a union back to its JSON object
///
/// Known variants get the discriminator followed by their fields. Unknown
/// ones are written back exactly as they were received.
pub fn encode_union<V: UnionVariants>(value: &Union<V>) -> Result<Value, serde_json::Error> {
    match value {
        Union::Known(variant) => {
            let mut object = Map::new();
            object.insert(TYPE_FIELD.to_string(), Value::String(variant.tag().to_string()));
            for (key, field) in variant.encode_fields()? {
                if key != TYPE_FIELD {
                    object.insert(key, field);
                }
            }
            Ok(Value::Object(object))
        }
        Union::Unknown(unknown) => Ok(Value::Object(unknown.fields.clone())),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl<V: UnionVariants> Serialize for Union<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        encode_union(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de, V: UnionVariants> Deserialize<'de> for Union<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let payload = Value::deserialize(deserializer)?;
        decode_union(payload).map_err(D::Error::custom)
    }
}

/// Declare a closed enum of union variants and its tag registry
///
/// Each variant wraps one serde type and is bound to its `$type` tag. The
/// resulting enum is used as `Union<Enum>`.
#[macro_export]
macro_rules! open_union {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident($ty:ty) = $tag:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant($ty),
            )+
        }

        impl $crate::union::UnionVariants for $name {
            fn tags() -> &'static [&'static str] {
                &[$($tag),+]
            }

            fn decode_variant(
                tag: &str,
                payload: $crate::union::__private::serde_json::Value,
            ) -> ::std::result::Result<Self, $crate::union::__private::serde_json::Error> {
                match tag {
                    $(
                        $tag => $crate::union::__private::serde_json::from_value::<$ty>(payload)
                            .map($name::$variant),
                    )+
                    other => ::std::result::Result::Err(
                        <$crate::union::__private::serde_json::Error
                            as $crate::union::__private::serde::de::Error>::custom(
                            ::std::format!("unregistered union tag {}", other),
                        ),
                    ),
                }
            }

            fn tag(&self) -> &'static str {
                match self {
                    $( $name::$variant(_) => $tag, )+
                }
            }

            fn encode_fields(
                &self,
            ) -> ::std::result::Result<
                $crate::union::__private::serde_json::Map<
                    ::std::string::String,
                    $crate::union::__private::serde_json::Value,
                >,
                $crate::union::__private::serde_json::Error,
            > {
                let value = match self {
                    $( $name::$variant(inner) => {
                        $crate::union::__private::serde_json::to_value(inner)?
                    } )+
                };
                match value {
                    $crate::union::__private::serde_json::Value::Object(fields) => {
                        ::std::result::Result::Ok(fields)
                    }
                    _ => ::std::result::Result::Err(
                        <$crate::union::__private::serde_json::Error
                            as $crate::union::__private::serde::ser::Error>::custom(
                            "union variant must serialize to a JSON object",
                        ),
                    ),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Circle {
        radius: u32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Label {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_size: Option<u32>,
    }

    crate::open_union! {
        #[derive(Debug, Clone, PartialEq)]
        enum Shape {
            Circle(Circle) = "test.shape#circle",
            Label(Label) = "test.shape#label",
        }
    }

    #[test]
    fn test_decode_known_variant() {
        let shape: Union<Shape> =
            decode_union(json!({"$type": "test.shape#circle", "radius": 4})).unwrap();

        assert_eq!(shape, Union::Known(Shape::Circle(Circle { radius: 4 })));
        assert_eq!(shape.tag(), "test.shape#circle");
    }

    #[test]
    fn test_encode_known_variant_writes_tag() {
        let shape: Union<Shape> = Shape::Label(Label {
            text: "hi".to_string(),
            font_size: None,
        })
        .into();

        let encoded = encode_union(&shape).unwrap();

        assert_eq!(encoded, json!({"$type": "test.shape#label", "text": "hi"}));
    }

    #[test]
    fn test_unknown_tag_is_preserved() {
        let payload = json!({
            "$type": "test.shape#hexagon",
            "sides": 6,
            "nested": {"a": [1, 2, 3]}
        });

        let shape: Union<Shape> = decode_union(payload.clone()).unwrap();

        assert!(shape.is_unknown());
        assert_eq!(shape.tag(), "test.shape#hexagon");
        assert_eq!(encode_union(&shape).unwrap(), payload);
    }

    #[test]
    fn test_missing_tag_is_unknown() {
        let shape: Union<Shape> = decode_union(json!({"radius": 4})).unwrap();
        assert_eq!(shape.tag(), "");
        assert!(shape.is_unknown());

        let shape: Union<Shape> = decode_union(json!({"$type": 7, "radius": 4})).unwrap();
        assert!(shape.is_unknown());
    }

    #[test]
    fn test_known_tag_with_bad_fields_is_error() {
        let result: Result<Union<Shape>, _> =
            decode_union(json!({"$type": "test.shape#circle", "radius": "big"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_non_object_payload_is_error() {
        let err = decode_union::<Shape>(json!(["test.shape#circle"])).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_custom_discriminator() {
        let union = decode_with(
            json!({"kind": "circle", "radius": 1}),
            "kind",
            &["circle"],
            |_, payload| serde_json::from_value::<Circle>(payload),
        )
        .unwrap();

        assert_eq!(union.into_known(), Some(Circle { radius: 1 }));
    }

    #[test]
    fn test_serde_integration_in_struct() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Drawing {
            shapes: Vec<Union<Shape>>,
        }

        let payload = json!({
            "shapes": [
                {"$type": "test.shape#circle", "radius": 1},
                {"$type": "test.shape#star", "points": 5}
            ]
        });

        let drawing: Drawing = serde_json::from_value(payload.clone()).unwrap();
        assert_eq!(drawing.shapes.len(), 2);
        assert!(drawing.shapes[1].is_unknown());
        assert_eq!(serde_json::to_value(&drawing).unwrap(), payload);
    }

    #[test]
    fn test_registry_tags() {
        assert_eq!(Shape::tags(), &["test.shape#circle", "test.shape#label"]);
    }
}
