//! Identifier types
//!
//! Light syntactic validation only; resolution (handle to DID, DID to
//! document) is the server's job.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier failed syntactic validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind}: {value}")]
pub struct InvalidIdentifier {
    kind: &'static str,
    value: String,
}

/// Decentralized identifier, e.g. `did:plc:z72i7hdynmk6r22z27h6tvur`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Parse a DID
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        let mut parts = value.splitn(3, ':');
        let valid = parts.next() == Some("did")
            && parts
                .next()
                .map(|method| !method.is_empty() && method.bytes().all(|b| b.is_ascii_lowercase()))
                .unwrap_or(false)
            && parts.next().map(|id| !id.is_empty()).unwrap_or(false);

        if valid {
            Ok(Self(value))
        } else {
            Err(InvalidIdentifier { kind: "DID", value })
        }
    }

    /// DID method, e.g. `plc` or `web`
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// The DID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Domain-style account handle, e.g. `alice.bsky.social`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Parse a handle; a leading `@` is stripped and case is normalized
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        let normalized = value.trim_start_matches('@').to_ascii_lowercase();

        let labels: Vec<&str> = normalized.split('.').collect();
        let valid = normalized.len() <= 253
            && labels.len() >= 2
            && labels.iter().all(|label| {
                !label.is_empty()
                    && label.len() <= 63
                    && !label.starts_with('-')
                    && !label.ends_with('-')
                    && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
            });

        if valid {
            Ok(Self(normalized))
        } else {
            Err(InvalidIdentifier { kind: "handle", value })
        }
    }

    /// The handle as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Either a DID or a handle, as accepted by `actor` parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtIdentifier {
    /// A DID
    Did(Did),
    /// A handle
    Handle(Handle),
}

impl AtIdentifier {
    /// Parse a DID or handle
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        if value.starts_with("did:") {
            Did::new(value).map(AtIdentifier::Did)
        } else {
            Handle::new(value).map(AtIdentifier::Handle)
        }
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        match self {
            AtIdentifier::Did(did) => did.as_str(),
            AtIdentifier::Handle(handle) => handle.as_str(),
        }
    }
}

macro_rules! string_conversions {
    ($($ty:ty),*) => {$(
        impl TryFrom<String> for $ty {
            type Error = InvalidIdentifier;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = InvalidIdentifier;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.as_str().to_string()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    )*};
}

string_conversions!(Did, Handle, AtIdentifier);

impl From<Did> for AtIdentifier {
    fn from(did: Did) -> Self {
        AtIdentifier::Did(did)
    }
}

impl From<Handle> for AtIdentifier {
    fn from(handle: Handle) -> Self {
        AtIdentifier::Handle(handle)
    }
}
