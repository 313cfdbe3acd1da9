//! XRPC protocol implementation
//!
//! XRPC is the HTTP-based RPC layer of AT Protocol: queries are GETs,
//! procedures are POSTs, both addressed as `{service}/xrpc/{nsid}`.

mod dispatch;
mod error;
mod request;

pub use dispatch::{retry, RawResponse, RetryConfig, XrpcClient, XrpcClientConfig};
pub use error::{ErrorKind, XrpcError, XrpcErrorResponse};
pub use request::{
    append_query_items, build_request, parse_service_url, xrpc_url, Body, HttpMethod, Idempotency,
    QueryItems, XrpcRequest, JSON_MIME,
};

/// Clamp a page-size style parameter into `[min, max]`
///
/// # Examples
/// ```
/// use atproto_client::xrpc::clamp_limit;
///
/// assert_eq!(clamp_limit(500, 1, 100), 100);
/// assert_eq!(clamp_limit(0, 1, 100), 1);
/// assert_eq!(clamp_limit(50, 1, 100), 50);
/// ```
pub fn clamp_limit(value: i64, min: i64, max: i64) -> i64 {
    value.clamp(min, max)
}
