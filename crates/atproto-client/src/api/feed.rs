//! `app.bsky.feed.*`: timelines, author feeds, threads and likes

use super::actor::{ProfileView, ProfileViewBasic};
use super::{limit_setter, AuthRequirement, Endpoint};
use crate::agent::BskyAgent;
use crate::open_union;
use crate::union::Union;
use crate::xrpc::{clamp_limit, HttpMethod, QueryItems};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Maximum URIs per `getPosts` call
pub const MAX_POSTS: usize = 25;

/// Width/height ratio hint for media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectRatio {
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

/// One image of an images embed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewImage {
    /// Thumbnail URL
    pub thumb: String,
    /// Full size URL
    pub fullsize: String,
    /// Alt text
    pub alt: String,
    /// Aspect ratio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
}

/// `app.bsky.embed.images#view`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesView {
    /// Images in order
    pub images: Vec<ViewImage>,
}

/// Link card contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewExternal {
    /// Link target
    pub uri: String,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Thumbnail URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

/// `app.bsky.embed.external#view`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalView {
    /// The link card
    pub external: ViewExternal,
}

/// `app.bsky.embed.record#view`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    /// The quoted record view (itself a union of record view kinds)
    pub record: serde_json::Value,
}

/// `app.bsky.embed.recordWithMedia#view`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordWithMediaView {
    /// The quoted record view
    pub record: serde_json::Value,
    /// The attached media view
    pub media: serde_json::Value,
}

/// `app.bsky.embed.video#view`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoView {
    /// Video blob CID
    pub cid: String,
    /// HLS playlist URL
    pub playlist: String,
    /// Poster image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Alt text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    /// Aspect ratio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
}

open_union! {
    /// Embed views this client understands
    #[derive(Debug, Clone, PartialEq)]
    pub enum KnownEmbedView {
        /// Images
        Images(ImagesView) = "app.bsky.embed.images#view",
        /// Link card
        External(ExternalView) = "app.bsky.embed.external#view",
        /// Quote
        Record(RecordView) = "app.bsky.embed.record#view",
        /// Quote with media
        RecordWithMedia(RecordWithMediaView) = "app.bsky.embed.recordWithMedia#view",
        /// Video
        Video(VideoView) = "app.bsky.embed.video#view",
    }
}

/// Hydrated post embed
pub type EmbedView = Union<KnownEmbedView>;

/// A hydrated post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    /// Post URI
    pub uri: String,
    /// Post CID
    pub cid: String,
    /// Author
    pub author: ProfileViewBasic,
    /// The raw `app.bsky.feed.post` record
    pub record: serde_json::Value,
    /// Hydrated embed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<EmbedView>,
    /// Replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u64>,
    /// Reposts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repost_count: Option<u64>,
    /// Likes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    /// Quotes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_count: Option<u64>,
    /// When the post was indexed
    pub indexed_at: String,
    /// Viewer state (like/repost URIs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<serde_json::Value>,
    /// Moderation labels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<serde_json::Value>,
}

/// `app.bsky.feed.defs#reasonRepost`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonRepost {
    /// Who reposted
    pub by: ProfileViewBasic,
    /// When the repost was indexed
    pub indexed_at: String,
}

/// `app.bsky.feed.defs#reasonPin`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonPin {}

open_union! {
    /// Reasons a post appears in a feed
    #[derive(Debug, Clone, PartialEq)]
    pub enum KnownFeedReason {
        /// Reposted by someone
        Repost(ReasonRepost) = "app.bsky.feed.defs#reasonRepost",
        /// Pinned by the author
        Pin(ReasonPin) = "app.bsky.feed.defs#reasonPin",
    }
}

/// Why a post is in a feed
pub type FeedReason = Union<KnownFeedReason>;

/// One feed entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedViewPost {
    /// The post
    pub post: PostView,
    /// Reply context (root and parent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<serde_json::Value>,
    /// Why the post is here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FeedReason>,
    /// Opaque context from the feed generator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_context: Option<String>,
}

/// A page of feed entries
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPage {
    /// Cursor for the next page
    #[serde(default)]
    pub cursor: Option<String>,
    /// Entries on this page
    pub feed: Vec<FeedViewPost>,
}

/// `app.bsky.feed.defs#threadViewPost`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadViewPost {
    /// The post at this node
    pub post: PostView,
    /// Parent node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<ThreadNode>>,
    /// Child nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<ThreadNode>>,
}

/// `app.bsky.feed.defs#notFoundPost`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundPost {
    /// URI of the missing post
    pub uri: String,
    /// Always true
    pub not_found: bool,
}

/// `app.bsky.feed.defs#blockedPost`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedPost {
    /// URI of the blocked post
    pub uri: String,
    /// Always true
    pub blocked: bool,
    /// Blocked author
    pub author: serde_json::Value,
}

open_union! {
    /// Thread node kinds this client understands
    #[derive(Debug, Clone, PartialEq)]
    pub enum KnownThreadNode {
        /// A visible post
        Post(ThreadViewPost) = "app.bsky.feed.defs#threadViewPost",
        /// A deleted or unknown post
        NotFound(NotFoundPost) = "app.bsky.feed.defs#notFoundPost",
        /// A post hidden by a block
        Blocked(BlockedPost) = "app.bsky.feed.defs#blockedPost",
    }
}

/// A node of a post thread
pub type ThreadNode = Union<KnownThreadNode>;

/// `app.bsky.feed.getTimeline`
#[derive(Debug, Clone, Default)]
pub struct GetTimeline {
    /// Timeline algorithm
    pub algorithm: Option<String>,
    /// Page size, within `[1, 100]`
    pub limit: Option<i64>,
    /// Pagination cursor
    pub cursor: Option<String>,
}

impl GetTimeline {
    limit_setter!(1, 100);

    /// Continue from a previous page
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

impl Endpoint for GetTimeline {
    const NSID: &'static str = "app.bsky.feed.getTimeline";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    type Output = FeedPage;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with_opt("algorithm", self.algorithm.as_deref())
            .with_opt("limit", self.limit)
            .with_opt("cursor", self.cursor.as_deref())
    }
}

/// `app.bsky.feed.getAuthorFeed`
#[derive(Debug, Clone)]
pub struct GetAuthorFeed {
    /// DID or handle
    pub actor: String,
    /// Page size, within `[1, 100]`
    pub limit: Option<i64>,
    /// Pagination cursor
    pub cursor: Option<String>,
    /// `posts_with_replies`, `posts_no_replies`, `posts_with_media`, ...
    pub filter: Option<String>,
    /// Put pinned posts first
    pub include_pins: Option<bool>,
}

impl GetAuthorFeed {
    /// Feed of `actor`
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            limit: None,
            cursor: None,
            filter: None,
            include_pins: None,
        }
    }

    limit_setter!(1, 100);

    /// Continue from a previous page
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Restrict the kinds of posts returned
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

impl Endpoint for GetAuthorFeed {
    const NSID: &'static str = "app.bsky.feed.getAuthorFeed";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Optional;
    type Output = FeedPage;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with("actor", &self.actor)
            .with_opt("limit", self.limit)
            .with_opt("cursor", self.cursor.as_deref())
            .with_opt("filter", self.filter.as_deref())
            .with_opt("includePins", self.include_pins)
    }
}

/// `app.bsky.feed.getPostThread`
#[derive(Debug, Clone)]
pub struct GetPostThread {
    /// Post URI
    pub uri: String,
    /// Reply depth, within `[0, 1000]`
    pub depth: Option<i64>,
    /// Parent height, within `[0, 1000]`
    pub parent_height: Option<i64>,
}

impl GetPostThread {
    /// Thread around `uri`
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            depth: None,
            parent_height: None,
        }
    }

    /// Set the reply depth
    pub fn depth(mut self, depth: i64) -> Self {
        self.depth = Some(clamp_limit(depth, 0, 1000));
        self
    }

    /// Set the parent height
    pub fn parent_height(mut self, height: i64) -> Self {
        self.parent_height = Some(clamp_limit(height, 0, 1000));
        self
    }
}

/// Output of `getPostThread`
#[derive(Debug, Clone, Deserialize)]
pub struct PostThread {
    /// Root node of the returned thread
    pub thread: ThreadNode,
}

impl Endpoint for GetPostThread {
    const NSID: &'static str = "app.bsky.feed.getPostThread";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Optional;
    type Output = PostThread;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with("uri", &self.uri)
            .with_opt("depth", self.depth)
            .with_opt("parentHeight", self.parent_height)
    }
}

/// `app.bsky.feed.getPosts`
#[derive(Debug, Clone)]
pub struct GetPosts {
    /// Post URIs; only the first 25 are sent
    pub uris: Vec<String>,
}

/// Output of `getPosts`
#[derive(Debug, Clone, Deserialize)]
pub struct Posts {
    /// Posts that could be hydrated
    pub posts: Vec<PostView>,
}

impl Endpoint for GetPosts {
    const NSID: &'static str = "app.bsky.feed.getPosts";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Optional;
    type Output = Posts;

    fn query(&self) -> QueryItems {
        QueryItems::new().with_all("uris", self.uris.iter().take(MAX_POSTS))
    }
}

/// `app.bsky.feed.getLikes`
#[derive(Debug, Clone)]
pub struct GetLikes {
    /// Subject URI
    pub uri: String,
    /// Subject CID, to pin a version
    pub cid: Option<String>,
    /// Page size, within `[1, 100]`
    pub limit: Option<i64>,
    /// Pagination cursor
    pub cursor: Option<String>,
}

impl GetLikes {
    /// Likes of `uri`
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            cid: None,
            limit: None,
            cursor: None,
        }
    }

    limit_setter!(1, 100);
}

/// One like
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    /// When the like was indexed
    pub indexed_at: String,
    /// When the like was created
    pub created_at: String,
    /// Who liked
    pub actor: ProfileView,
}

/// A page of likes
#[derive(Debug, Clone, Deserialize)]
pub struct LikesPage {
    /// Subject URI
    pub uri: String,
    /// Subject CID
    #[serde(default)]
    pub cid: Option<String>,
    /// Cursor for the next page
    #[serde(default)]
    pub cursor: Option<String>,
    /// Likes on this page
    pub likes: Vec<Like>,
}

impl Endpoint for GetLikes {
    const NSID: &'static str = "app.bsky.feed.getLikes";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Optional;
    type Output = LikesPage;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with("uri", &self.uri)
            .with_opt("cid", self.cid.as_deref())
            .with_opt("limit", self.limit)
            .with_opt("cursor", self.cursor.as_deref())
    }
}

impl BskyAgent {
    /// Home timeline of the logged-in account
    pub async fn get_timeline(&self, limit: i64, cursor: Option<String>) -> Result<FeedPage> {
        let endpoint = GetTimeline {
            cursor,
            ..GetTimeline::default()
        }
        .limit(limit);
        self.call(&endpoint).await
    }

    /// Posts by one actor
    pub async fn get_author_feed(&self, actor: impl Into<String>, limit: i64) -> Result<FeedPage> {
        self.call(&GetAuthorFeed::new(actor).limit(limit)).await
    }

    /// Thread around a post
    pub async fn get_post_thread(&self, uri: impl Into<String>) -> Result<ThreadNode> {
        Ok(self.call(&GetPostThread::new(uri)).await?.thread)
    }

    /// Hydrate up to 25 posts
    pub async fn get_posts(&self, uris: Vec<String>) -> Result<Vec<PostView>> {
        Ok(self.call(&GetPosts { uris }).await?.posts)
    }

    /// Likes of a post
    pub async fn get_likes(&self, uri: impl Into<String>, limit: i64) -> Result<LikesPage> {
        self.call(&GetLikes::new(uri).limit(limit)).await
    }
}
