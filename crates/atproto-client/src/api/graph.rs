//! `app.bsky.graph.*`: follows, followers and mutes

use super::actor::ProfileView;
use super::{limit_setter, AuthRequirement, Endpoint};
use crate::agent::BskyAgent;
use crate::xrpc::{Body, HttpMethod, Idempotency, QueryItems};
use crate::Result;
use serde::{Deserialize, Serialize};

/// `app.bsky.graph.getFollows`
#[derive(Debug, Clone)]
pub struct GetFollows {
    /// DID or handle
    pub actor: String,
    /// Page size, within `[1, 100]`
    pub limit: Option<i64>,
    /// Pagination cursor
    pub cursor: Option<String>,
}

impl GetFollows {
    /// Accounts `actor` follows
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            limit: None,
            cursor: None,
        }
    }

    limit_setter!(1, 100);
}

/// A page of follows
#[derive(Debug, Clone, Deserialize)]
pub struct FollowsPage {
    /// The actor whose follows are listed
    pub subject: ProfileView,
    /// Cursor for the next page
    #[serde(default)]
    pub cursor: Option<String>,
    /// Followed accounts
    pub follows: Vec<ProfileView>,
}

impl Endpoint for GetFollows {
    const NSID: &'static str = "app.bsky.graph.getFollows";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Optional;
    type Output = FollowsPage;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with("actor", &self.actor)
            .with_opt("limit", self.limit)
            .with_opt("cursor", self.cursor.as_deref())
    }
}

/// `app.bsky.graph.getFollowers`
#[derive(Debug, Clone)]
pub struct GetFollowers {
    /// DID or handle
    pub actor: String,
    /// Page size, within `[1, 100]`
    pub limit: Option<i64>,
    /// Pagination cursor
    pub cursor: Option<String>,
}

impl GetFollowers {
    /// Accounts following `actor`
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            limit: None,
            cursor: None,
        }
    }

    limit_setter!(1, 100);
}

/// A page of followers
#[derive(Debug, Clone, Deserialize)]
pub struct FollowersPage {
    /// The actor whose followers are listed
    pub subject: ProfileView,
    /// Cursor for the next page
    #[serde(default)]
    pub cursor: Option<String>,
    /// Following accounts
    pub followers: Vec<ProfileView>,
}

impl Endpoint for GetFollowers {
    const NSID: &'static str = "app.bsky.graph.getFollowers";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Optional;
    type Output = FollowersPage;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with("actor", &self.actor)
            .with_opt("limit", self.limit)
            .with_opt("cursor", self.cursor.as_deref())
    }
}

#[derive(Serialize)]
struct ActorInput<'a> {
    actor: &'a str,
}

/// `app.bsky.graph.muteActor`
#[derive(Debug, Clone)]
pub struct MuteActor {
    /// DID or handle
    pub actor: String,
}

impl Endpoint for MuteActor {
    const NSID: &'static str = "app.bsky.graph.muteActor";
    const METHOD: HttpMethod = HttpMethod::Post;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    const IDEMPOTENCY: Idempotency = Idempotency::Idempotent;
    type Output = serde::de::IgnoredAny;

    fn body(&self) -> std::result::Result<Body, serde_json::Error> {
        Body::json(&ActorInput { actor: &self.actor })
    }
}

/// `app.bsky.graph.unmuteActor`
#[derive(Debug, Clone)]
pub struct UnmuteActor {
    /// DID or handle
    pub actor: String,
}

impl Endpoint for UnmuteActor {
    const NSID: &'static str = "app.bsky.graph.unmuteActor";
    const METHOD: HttpMethod = HttpMethod::Post;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    const IDEMPOTENCY: Idempotency = Idempotency::Idempotent;
    type Output = serde::de::IgnoredAny;

    fn body(&self) -> std::result::Result<Body, serde_json::Error> {
        Body::json(&ActorInput { actor: &self.actor })
    }
}

impl BskyAgent {
    /// Accounts an actor follows
    pub async fn get_follows(&self, actor: impl Into<String>, limit: i64) -> Result<FollowsPage> {
        self.call(&GetFollows::new(actor).limit(limit)).await
    }

    /// Accounts following an actor
    pub async fn get_followers(
        &self,
        actor: impl Into<String>,
        limit: i64,
    ) -> Result<FollowersPage> {
        self.call(&GetFollowers::new(actor).limit(limit)).await
    }

    /// Mute an account
    pub async fn mute_actor(&self, actor: impl Into<String>) -> Result<()> {
        self.call(&MuteActor { actor: actor.into() }).await?;
        Ok(())
    }

    /// Unmute an account
    pub async fn unmute_actor(&self, actor: impl Into<String>) -> Result<()> {
        self.call(&UnmuteActor { actor: actor.into() }).await?;
        Ok(())
    }
}
