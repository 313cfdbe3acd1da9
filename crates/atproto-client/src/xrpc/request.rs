//! XRPC request building
//!
//! Everything here is pure: URLs are parsed and composed, bodies are
//! serialized, headers are decided, and no I/O happens until the finished
//! [`XrpcRequest`] is handed to the dispatcher.

use super::error::{ErrorKind, XrpcError};
use bytes::Bytes;
use reqwest::Url;
use serde::Serialize;

/// Default `Accept` header for XRPC calls
pub const JSON_MIME: &str = "application/json";

/// HTTP method for XRPC requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET request (used for queries)
    Get,
    /// POST request (used for procedures)
    Post,
}

impl HttpMethod {
    /// Method name as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Whether a request may be re-sent after a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    /// Sending twice has the same effect as sending once
    Idempotent,
    /// Must be sent at most once (e.g. uploads that create a job)
    NonIdempotent,
}

impl Idempotency {
    /// Default for a method: queries are idempotent, procedures are not
    pub const fn for_method(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Idempotency::Idempotent,
            HttpMethod::Post => Idempotency::NonIdempotent,
        }
    }
}

/// Ordered list of query parameters
///
/// Keys may repeat; array parameters such as `uris` are sent as one
/// `key=value` pair per element, in insertion order.
///
/// # Examples
/// ```
/// use atproto_client::xrpc::QueryItems;
///
/// let items = QueryItems::new()
///     .with_all("uris", ["at://a", "at://b"])
///     .with("limit", 10);
/// assert_eq!(items.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryItems(Vec<(String, String)>);

impl QueryItems {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one pair
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.push((key.into(), value.to_string()));
    }

    /// Append one pair, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// Append a pair only when the value is present
    pub fn with_opt<V: ToString>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    /// Append one pair per value, all under the same key
    pub fn with_all<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let key = key.into();
        for value in values {
            self.push(key.clone(), value);
        }
        self
    }

    /// Append every pair of `other`, keeping its order
    pub fn extend(&mut self, other: QueryItems) {
        self.0.extend(other.0);
    }

    /// All values recorded for `key`, in order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over all pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no pairs
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for QueryItems {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut items = QueryItems::new();
        for (key, value) in iter {
            items.push(key, value);
        }
        items
    }
}

/// Percent-encode `items` and append them to the query string of `url`
///
/// Existing query parameters are kept; new ones follow them in order.
pub fn append_query_items(url: &Url, items: &QueryItems) -> Url {
    let mut url = url.clone();
    if !items.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in items.iter() {
            pairs.append_pair(key, value);
        }
    }
    url
}

/// Parse and validate a service base URL
pub fn parse_service_url(service: &str) -> Result<Url, XrpcError> {
    let service = service.trim();
    if service.is_empty() {
        return Err(XrpcError::with_kind(
            ErrorKind::EmptyServiceUrl,
            0,
            "EmptyServiceURL",
            "No service URL configured",
        ));
    }

    let base = Url::parse(service).map_err(|e| invalid_url(format!("{}: {}", service, e)))?;
    if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
        return Err(invalid_url(format!("unsupported service URL {}", service)));
    }
    Ok(base)
}

/// Build `{service}/xrpc/{nsid}`, validating the service URL
pub fn xrpc_url(service: &str, nsid: &str) -> Result<Url, XrpcError> {
    let base = parse_service_url(service)?;
    let joined = format!("{}/xrpc/{}", base.as_str().trim_end_matches('/'), nsid);
    Url::parse(&joined).map_err(|e| invalid_url(format!("{}: {}", joined, e)))
}

fn invalid_url(reason: String) -> XrpcError {
    XrpcError::with_kind(ErrorKind::InvalidRequestUrl, 0, "InvalidRequestURL", reason)
}

/// Request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// No body
    Empty,
    /// Serialized JSON
    Json(Bytes),
    /// Raw bytes with their own content type (e.g. `video/mp4`)
    Bytes {
        /// MIME type sent as `Content-Type`
        content_type: String,
        /// Payload; cloning shares the buffer
        data: Bytes,
    },
}

impl Body {
    /// Serialize a value as a JSON body
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Body::Json(Bytes::from(serde_json::to_vec(value)?)))
    }

    /// Wrap raw bytes
    pub fn bytes(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Body::Bytes {
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Content type implied by the body
    pub fn content_type(&self) -> Option<&str> {
        match self {
            Body::Empty => None,
            Body::Json(_) => Some(JSON_MIME),
            Body::Bytes { content_type, .. } => Some(content_type),
        }
    }

    /// Body bytes, if any
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Empty => None,
            Body::Json(data) | Body::Bytes { data, .. } => Some(&data[..]),
        }
    }
}

/// A fully-formed XRPC request
///
/// Built once and then only read; the dispatcher may send the same request
/// several times when retrying.
#[derive(Debug, Clone)]
pub struct XrpcRequest {
    method: HttpMethod,
    url: Url,
    accept: String,
    content_type: Option<String>,
    authorization: Option<String>,
    body: Body,
    idempotency: Idempotency,
}

/// Produce a request descriptor from its parts
///
/// `content_type` overrides whatever a body set later would imply.
pub fn build_request(
    url: Url,
    method: HttpMethod,
    accept: Option<&str>,
    content_type: Option<&str>,
    authorization: Option<&str>,
) -> XrpcRequest {
    XrpcRequest {
        method,
        url,
        accept: accept.unwrap_or(JSON_MIME).to_string(),
        content_type: content_type.map(str::to_string),
        authorization: authorization.map(str::to_string),
        body: Body::Empty,
        idempotency: Idempotency::for_method(method),
    }
}

impl XrpcRequest {
    /// A GET request (query)
    pub fn query(url: Url) -> Self {
        build_request(url, HttpMethod::Get, None, None, None)
    }

    /// A POST request (procedure)
    pub fn procedure(url: Url) -> Self {
        build_request(url, HttpMethod::Post, None, None, None)
    }

    /// Append query parameters to the URL
    pub fn with_query(mut self, items: &QueryItems) -> Self {
        self.url = append_query_items(&self.url, items);
        self
    }

    /// Authorize with `Bearer {token}`
    pub fn bearer(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {}", token));
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Set the body from JSON
    pub fn json_body<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, serde_json::Error> {
        Ok(self.with_body(Body::json(value)?))
    }

    /// Override the retry safety of this request
    pub fn with_idempotency(mut self, idempotency: Idempotency) -> Self {
        self.idempotency = idempotency;
        self
    }

    /// HTTP method
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Target URL including the query string
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `Accept` header value
    pub fn accept(&self) -> &str {
        &self.accept
    }

    /// Effective `Content-Type`, if the request carries a body
    pub fn content_type(&self) -> Option<&str> {
        self.content_type
            .as_deref()
            .or_else(|| self.body.content_type())
    }

    /// `Authorization` header value
    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    /// Request body
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Retry safety
    pub fn idempotency(&self) -> Idempotency {
        self.idempotency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_query_items_preserve_order_and_duplicates() {
        let items: QueryItems = [("uris", "a"), ("uris", "b"), ("limit", "10")]
            .into_iter()
            .collect();

        let base = url("https://example.com/xrpc/app.bsky.feed.getPosts");
        let built = append_query_items(&base, &items);

        assert_eq!(built.query(), Some("uris=a&uris=b&limit=10"));
    }

    #[test]
    fn test_query_items_percent_encoding() {
        let items = QueryItems::new()
            .with("uri", "at://did:plc:abc/app.bsky.feed.post/1")
            .with("q", "rust & atproto");

        let built = append_query_items(&url("https://example.com/xrpc/x"), &items);
        let query = built.query().unwrap();

        assert!(query.starts_with("uri=at%3A%2F%2Fdid%3Aplc%3Aabc%2Fapp.bsky.feed.post%2F1"));
        assert!(query.contains("q=rust+%26+atproto"));
    }

    #[test]
    fn test_query_items_keep_existing_query() {
        let items = QueryItems::new().with("limit", 5);
        let built = append_query_items(&url("https://example.com/xrpc/x?cursor=abc"), &items);
        assert_eq!(built.query(), Some("cursor=abc&limit=5"));
    }

    #[test]
    fn test_empty_query_items_leave_url_untouched() {
        let base = url("https://example.com/xrpc/x");
        let built = append_query_items(&base, &QueryItems::new());
        assert_eq!(built, base);
        assert_eq!(built.query(), None);
    }

    #[test]
    fn test_query_items_helpers() {
        let items = QueryItems::new()
            .with_opt("cursor", None::<String>)
            .with_opt("filter", Some("posts_no_replies"))
            .with_all("actors", vec!["alice", "bob"]);

        assert_eq!(items.len(), 3);
        assert_eq!(items.get_all("actors").collect::<Vec<_>>(), vec!["alice", "bob"]);
        assert_eq!(items.get_all("cursor").count(), 0);
    }

    #[test]
    fn test_xrpc_url() {
        let built = xrpc_url("https://bsky.social/", "com.atproto.server.createSession").unwrap();
        assert_eq!(
            built.as_str(),
            "https://bsky.social/xrpc/com.atproto.server.createSession"
        );
    }

    #[test]
    fn test_xrpc_url_empty_service() {
        let err = xrpc_url("  ", "app.bsky.actor.getProfile").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyServiceUrl);
    }

    #[test]
    fn test_xrpc_url_invalid_service() {
        let err = xrpc_url("not a url", "app.bsky.actor.getProfile").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequestUrl);

        let err = xrpc_url("ftp://example.com", "app.bsky.actor.getProfile").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequestUrl);
    }

    #[test]
    fn test_build_request_defaults() {
        let req = build_request(
            url("https://example.com/xrpc/x"),
            HttpMethod::Get,
            None,
            None,
            Some("Bearer token"),
        );

        assert_eq!(req.method(), HttpMethod::Get);
        assert_eq!(req.accept(), JSON_MIME);
        assert_eq!(req.content_type(), None);
        assert_eq!(req.authorization(), Some("Bearer token"));
        assert_eq!(req.idempotency(), Idempotency::Idempotent);
    }

    #[test]
    fn test_procedure_json_body() {
        #[derive(Serialize)]
        struct Input {
            foo: String,
        }

        let req = XrpcRequest::procedure(url("https://example.com/xrpc/x"))
            .json_body(&Input { foo: "bar".to_string() })
            .unwrap()
            .bearer("abc");

        assert_eq!(req.method(), HttpMethod::Post);
        assert_eq!(req.content_type(), Some(JSON_MIME));
        assert_eq!(req.authorization(), Some("Bearer abc"));
        assert_eq!(req.idempotency(), Idempotency::NonIdempotent);
        assert_eq!(req.body().as_bytes(), Some(br#"{"foo":"bar"}"#.as_slice()));
    }

    #[test]
    fn test_binary_body_bypasses_json() {
        let req = XrpcRequest::procedure(url("https://example.com/xrpc/app.bsky.video.uploadVideo"))
            .with_body(Body::bytes("video/mp4", vec![0, 1, 2, 3]));

        assert_eq!(req.content_type(), Some("video/mp4"));
        assert_eq!(req.body().as_bytes(), Some([0u8, 1, 2, 3].as_slice()));
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let req = build_request(
            url("https://example.com/xrpc/x"),
            HttpMethod::Post,
            Some("*/*"),
            Some("application/octet-stream"),
            None,
        )
        .with_body(Body::Json(Bytes::from_static(b"{}")));

        assert_eq!(req.accept(), "*/*");
        assert_eq!(req.content_type(), Some("application/octet-stream"));
    }

    #[test]
    fn test_http_method_as_str() {
        assert_eq!(HttpMethod::Get.as_str(), "GET");
        assert_eq!(HttpMethod::Post.as_str(), "POST");
    }
}
