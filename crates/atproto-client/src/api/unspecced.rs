//! `app.bsky.unspecced.*`: discovery endpoints without a stable lexicon

use super::actor::ProfileView;
use super::{limit_setter, AuthRequirement, Endpoint};
use crate::agent::BskyAgent;
use crate::xrpc::{HttpMethod, QueryItems};
use crate::Result;
use serde::Deserialize;

/// A feed generator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorView {
    /// Generator record URI
    pub uri: String,
    /// Generator record CID
    pub cid: String,
    /// Service DID of the generator
    pub did: String,
    /// Account that published it
    pub creator: ProfileView,
    /// Display name
    pub display_name: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// Likes
    #[serde(default)]
    pub like_count: Option<u64>,
    /// When it was indexed
    pub indexed_at: String,
}

/// `app.bsky.unspecced.getPopularFeedGenerators`
#[derive(Debug, Clone, Default)]
pub struct GetPopularFeedGenerators {
    /// Page size, within `[1, 100]`
    pub limit: Option<i64>,
    /// Pagination cursor
    pub cursor: Option<String>,
    /// Text filter
    pub query: Option<String>,
}

impl GetPopularFeedGenerators {
    limit_setter!(1, 100);
}

/// A page of feed generators
#[derive(Debug, Clone, Deserialize)]
pub struct FeedGeneratorsPage {
    /// Cursor for the next page
    #[serde(default)]
    pub cursor: Option<String>,
    /// Generators on this page
    pub feeds: Vec<GeneratorView>,
}

impl Endpoint for GetPopularFeedGenerators {
    const NSID: &'static str = "app.bsky.unspecced.getPopularFeedGenerators";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Optional;
    type Output = FeedGeneratorsPage;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with_opt("limit", self.limit)
            .with_opt("cursor", self.cursor.as_deref())
            .with_opt("query", self.query.as_deref())
    }
}

/// A trending topic
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingTopic {
    /// Topic text
    pub topic: String,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Relative link to the topic feed
    pub link: String,
}

/// `app.bsky.unspecced.getTrendingTopics`
#[derive(Debug, Clone, Default)]
pub struct GetTrendingTopics {
    /// DID used for personalization
    pub viewer: Option<String>,
    /// Number of topics, within `[1, 25]`
    pub limit: Option<i64>,
}

impl GetTrendingTopics {
    limit_setter!(1, 25);
}

/// Output of `getTrendingTopics`
#[derive(Debug, Clone, Deserialize)]
pub struct TrendingTopics {
    /// Trending topics
    pub topics: Vec<TrendingTopic>,
    /// Suggested topics
    #[serde(default)]
    pub suggested: Vec<TrendingTopic>,
}

impl Endpoint for GetTrendingTopics {
    const NSID: &'static str = "app.bsky.unspecced.getTrendingTopics";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::None;
    type Output = TrendingTopics;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with_opt("viewer", self.viewer.as_deref())
            .with_opt("limit", self.limit)
    }
}

impl BskyAgent {
    /// Popular feed generators
    pub async fn get_popular_feed_generators(&self, limit: i64) -> Result<FeedGeneratorsPage> {
        self.call(&GetPopularFeedGenerators::default().limit(limit))
            .await
    }

    /// Trending topics, personalized for the logged-in account when there is one
    pub async fn get_trending_topics(&self, limit: i64) -> Result<TrendingTopics> {
        let viewer = self.session().map(|s| s.did.clone());
        self.call(&GetTrendingTopics { viewer, limit: None }.limit(limit))
            .await
    }
}
