//! Typed endpoints
//!
//! Every XRPC method is described by a small [`Endpoint`] value: its NSID,
//! HTTP method, whether it needs a session, its query items and body, and
//! the type its response decodes into. [`BskyAgent::call`] turns any
//! endpoint into a request, so each namespace module only declares data.
//!
//! ```rust,no_run
//! use atproto_client::api::feed::GetAuthorFeed;
//! use atproto_client::{AgentConfig, BskyAgent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let agent = BskyAgent::new(AgentConfig::default())?;
//!
//!     // Optional auth: without a session this goes to the public App View
//!     let feed = agent
//!         .call(&GetAuthorFeed::new("bsky.app").limit(10))
//!         .await?;
//!     for item in feed.feed {
//!         println!("{}", item.post.uri);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! [`BskyAgent::call`]: crate::BskyAgent::call

pub mod actor;
pub mod feed;
pub mod graph;
pub mod notification;
pub mod unspecced;
pub mod video;

use crate::xrpc::{Body, HttpMethod, Idempotency, QueryItems};
use serde::de::DeserializeOwned;

/// Whether an endpoint needs a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    /// Fails with `MissingActiveSession` when logged out
    Required,
    /// Uses the session when there is one, the public App View otherwise
    Optional,
    /// Always sent without credentials to the public App View
    None,
}

/// Who a service-auth token is minted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// The configured video service DID
    VideoService,
    /// The user's own PDS, as `did:web:{pds host}`
    Pds,
}

/// Host an endpoint is served by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceTarget {
    /// The session's PDS, or the public App View for unauthenticated calls
    Default,
    /// The video service, authorized with a short-lived service-auth token
    /// scoped to `lxm` and minted for `audience`
    Video {
        /// Lexicon method the token is bound to
        lxm: &'static str,
        /// Intended recipient of the token
        audience: Audience,
    },
}

/// A typed XRPC method
pub trait Endpoint {
    /// Namespaced method id, e.g. `app.bsky.actor.getProfile`
    const NSID: &'static str;

    /// GET for queries, POST for procedures
    const METHOD: HttpMethod;

    /// Session requirement
    const AUTH: AuthRequirement;

    /// Whether the dispatcher may re-send on transient failure
    const IDEMPOTENCY: Idempotency = Idempotency::for_method(Self::METHOD);

    /// Serving host
    const SERVICE: ServiceTarget = ServiceTarget::Default;

    /// Decoded response
    type Output: DeserializeOwned;

    /// Query parameters, limits already clamped
    fn query(&self) -> QueryItems {
        QueryItems::new()
    }

    /// Request body
    fn body(&self) -> Result<Body, serde_json::Error> {
        Ok(Body::Empty)
    }
}

/// Declare a limit-style builder that clamps on the way in
macro_rules! limit_setter {
    ($min:expr, $max:expr) => {
        /// Set the page size, clamped to the documented range
        pub fn limit(mut self, limit: i64) -> Self {
            self.limit = Some($crate::xrpc::clamp_limit(limit, $min, $max));
            self
        }
    };
}

pub(crate) use limit_setter;
