//! `app.bsky.actor.*`: profiles, preferences and actor search

use super::{limit_setter, AuthRequirement, Endpoint};
use crate::agent::BskyAgent;
use crate::open_union;
use crate::union::Union;
use crate::xrpc::{Body, HttpMethod, QueryItems};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Maximum actors per `getProfiles` call
pub const MAX_PROFILES: usize = 25;

/// Minimal profile, as embedded in posts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileViewBasic {
    /// Account DID
    pub did: String,
    /// Account handle
    pub handle: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Viewer relationship state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<serde_json::Value>,
    /// Moderation labels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<serde_json::Value>,
}

/// Profile with description, as listed in search and graph results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    /// Account DID
    pub did: String,
    /// Account handle
    pub handle: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Profile description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// When the profile was indexed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<String>,
    /// Viewer relationship state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<serde_json::Value>,
    /// Moderation labels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<serde_json::Value>,
}

/// Full profile with counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileViewDetailed {
    /// Account DID
    pub did: String,
    /// Account handle
    pub handle: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Profile description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Banner URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    /// Followers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers_count: Option<u64>,
    /// Follows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follows_count: Option<u64>,
    /// Posts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts_count: Option<u64>,
    /// When the profile was indexed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<String>,
    /// Account creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Viewer relationship state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<serde_json::Value>,
    /// Moderation labels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<serde_json::Value>,
}

/// Adult content toggle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdultContentPref {
    /// Whether adult content is shown
    pub enabled: bool,
}

/// Visibility of one moderation label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentLabelPref {
    /// Labeler the preference applies to; global when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labeler_did: Option<String>,
    /// Label value
    pub label: String,
    /// `ignore`, `show`, `warn` or `hide`
    pub visibility: String,
}

/// One saved or pinned feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFeed {
    /// Stable id of the entry
    pub id: String,
    /// `feed`, `list` or `timeline`
    #[serde(rename = "type")]
    pub kind: String,
    /// Feed or list URI
    pub value: String,
    /// Whether the feed is pinned
    pub pinned: bool,
}

/// Saved feeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFeedsPrefV2 {
    /// Entries in display order
    pub items: Vec<SavedFeed>,
}

/// Personal details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDetailsPref {
    /// Birth date (ISO 8601)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
}

/// Per-feed display options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedViewPref {
    /// Feed URI or `home`
    pub feed: String,
    /// Hide replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_replies: Option<bool>,
    /// Hide reposts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_reposts: Option<bool>,
    /// Hide quote posts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_quote_posts: Option<bool>,
}

/// Thread display options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadViewPref {
    /// Reply sort order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

/// One muted word or tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutedWord {
    /// The word or tag
    pub value: String,
    /// Where it is matched: `content` and/or `tag`
    pub targets: Vec<String>,
    /// Expiry (ISO 8601)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Muted words
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutedWordsPref {
    /// Muted entries
    pub items: Vec<MutedWord>,
}

/// Hidden posts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenPostsPref {
    /// Post URIs
    pub items: Vec<String>,
}

open_union! {
    /// Preference kinds this client understands
    #[derive(Debug, Clone, PartialEq)]
    pub enum KnownPreference {
        /// `#adultContentPref`
        AdultContent(AdultContentPref) = "app.bsky.actor.defs#adultContentPref",
        /// `#contentLabelPref`
        ContentLabel(ContentLabelPref) = "app.bsky.actor.defs#contentLabelPref",
        /// `#savedFeedsPrefV2`
        SavedFeeds(SavedFeedsPrefV2) = "app.bsky.actor.defs#savedFeedsPrefV2",
        /// `#personalDetailsPref`
        PersonalDetails(PersonalDetailsPref) = "app.bsky.actor.defs#personalDetailsPref",
        /// `#feedViewPref`
        FeedView(FeedViewPref) = "app.bsky.actor.defs#feedViewPref",
        /// `#threadViewPref`
        ThreadView(ThreadViewPref) = "app.bsky.actor.defs#threadViewPref",
        /// `#mutedWordsPref`
        MutedWords(MutedWordsPref) = "app.bsky.actor.defs#mutedWordsPref",
        /// `#hiddenPostsPref`
        HiddenPosts(HiddenPostsPref) = "app.bsky.actor.defs#hiddenPostsPref",
    }
}

/// An account preference; unknown kinds round-trip untouched
pub type Preference = Union<KnownPreference>;

/// `app.bsky.actor.getProfile`
#[derive(Debug, Clone)]
pub struct GetProfile {
    /// DID or handle
    pub actor: String,
}

impl Endpoint for GetProfile {
    const NSID: &'static str = "app.bsky.actor.getProfile";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Optional;
    type Output = ProfileViewDetailed;

    fn query(&self) -> QueryItems {
        QueryItems::new().with("actor", &self.actor)
    }
}

/// `app.bsky.actor.getProfiles`
#[derive(Debug, Clone)]
pub struct GetProfiles {
    /// DIDs or handles; only the first 25 are sent
    pub actors: Vec<String>,
}

/// Output of `getProfiles`
#[derive(Debug, Clone, Deserialize)]
pub struct GetProfilesOutput {
    /// Profiles, in no guaranteed order
    pub profiles: Vec<ProfileViewDetailed>,
}

impl Endpoint for GetProfiles {
    const NSID: &'static str = "app.bsky.actor.getProfiles";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Optional;
    type Output = GetProfilesOutput;

    fn query(&self) -> QueryItems {
        QueryItems::new().with_all("actors", self.actors.iter().take(MAX_PROFILES))
    }
}

/// `app.bsky.actor.getPreferences`
#[derive(Debug, Clone, Default)]
pub struct GetPreferences;

/// Preferences list, shared by get and put
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesBody {
    /// All preferences of the account
    pub preferences: Vec<Preference>,
}

impl Endpoint for GetPreferences {
    const NSID: &'static str = "app.bsky.actor.getPreferences";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    type Output = PreferencesBody;
}

/// `app.bsky.actor.putPreferences`
///
/// Replaces the whole preference list, so unknown preferences read with
/// `getPreferences` must be written back to be kept.
#[derive(Debug, Clone)]
pub struct PutPreferences {
    /// Complete preference list
    pub preferences: Vec<Preference>,
}

impl Endpoint for PutPreferences {
    const NSID: &'static str = "app.bsky.actor.putPreferences";
    const METHOD: HttpMethod = HttpMethod::Post;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    const IDEMPOTENCY: crate::xrpc::Idempotency = crate::xrpc::Idempotency::Idempotent;
    type Output = serde::de::IgnoredAny;

    fn body(&self) -> std::result::Result<Body, serde_json::Error> {
        #[derive(Serialize)]
        struct Input<'a> {
            preferences: &'a [Preference],
        }

        Body::json(&Input {
            preferences: &self.preferences,
        })
    }
}

/// `app.bsky.actor.searchActors`
#[derive(Debug, Clone)]
pub struct SearchActors {
    /// Search query
    pub q: String,
    /// Page size, within `[1, 100]`
    pub limit: Option<i64>,
    /// Pagination cursor
    pub cursor: Option<String>,
}

impl SearchActors {
    /// Search for `q`
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            limit: None,
            cursor: None,
        }
    }

    limit_setter!(1, 100);

    /// Continue from a previous page
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

/// A page of actors
#[derive(Debug, Clone, Deserialize)]
pub struct ActorsPage {
    /// Cursor for the next page
    #[serde(default)]
    pub cursor: Option<String>,
    /// Actors on this page
    pub actors: Vec<ProfileView>,
}

impl Endpoint for SearchActors {
    const NSID: &'static str = "app.bsky.actor.searchActors";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Optional;
    type Output = ActorsPage;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with("q", &self.q)
            .with_opt("limit", self.limit)
            .with_opt("cursor", self.cursor.as_deref())
    }
}

/// `app.bsky.actor.getSuggestions`
#[derive(Debug, Clone, Default)]
pub struct GetSuggestions {
    /// Page size, within `[1, 100]`
    pub limit: Option<i64>,
    /// Pagination cursor
    pub cursor: Option<String>,
}

impl GetSuggestions {
    limit_setter!(1, 100);
}

impl Endpoint for GetSuggestions {
    const NSID: &'static str = "app.bsky.actor.getSuggestions";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    type Output = ActorsPage;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with_opt("limit", self.limit)
            .with_opt("cursor", self.cursor.as_deref())
    }
}

impl BskyAgent {
    /// Fetch a profile by DID or handle
    pub async fn get_profile(&self, actor: impl Into<String>) -> Result<ProfileViewDetailed> {
        self.call(&GetProfile { actor: actor.into() }).await
    }

    /// Fetch up to 25 profiles at once
    pub async fn get_profiles(&self, actors: Vec<String>) -> Result<Vec<ProfileViewDetailed>> {
        Ok(self.call(&GetProfiles { actors }).await?.profiles)
    }

    /// Fetch the account preferences
    pub async fn get_preferences(&self) -> Result<Vec<Preference>> {
        Ok(self.call(&GetPreferences).await?.preferences)
    }

    /// Replace the account preferences
    pub async fn put_preferences(&self, preferences: Vec<Preference>) -> Result<()> {
        self.call(&PutPreferences { preferences }).await?;
        Ok(())
    }

    /// Search for actors
    pub async fn search_actors(&self, q: impl Into<String>, limit: i64) -> Result<ActorsPage> {
        self.call(&SearchActors::new(q).limit(limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_actors_clamps_limit() {
        let query = SearchActors::new("rust").limit(500).query();
        assert_eq!(query.get_all("limit").collect::<Vec<_>>(), vec!["100"]);

        let query = SearchActors::new("rust").limit(0).query();
        assert_eq!(query.get_all("limit").collect::<Vec<_>>(), vec!["1"]);
    }

    #[test]
    fn test_get_profiles_caps_actor_count() {
        let actors = (0..30).map(|i| format!("user{}.test", i)).collect();
        let query = GetProfiles { actors }.query();
        assert_eq!(query.get_all("actors").count(), MAX_PROFILES);
    }

    #[test]
    fn test_preferences_decode_mixed() {
        let body: PreferencesBody = serde_json::from_value(json!({
            "preferences": [
                {"$type": "app.bsky.actor.defs#adultContentPref", "enabled": false},
                {
                    "$type": "app.bsky.actor.defs#savedFeedsPrefV2",
                    "items": [{"id": "1", "type": "timeline", "value": "following", "pinned": true}]
                },
                {"$type": "app.bsky.actor.defs#someFuturePref", "shiny": [1, 2]}
            ]
        }))
        .unwrap();

        assert_eq!(
            body.preferences[0].known(),
            Some(&KnownPreference::AdultContent(AdultContentPref { enabled: false }))
        );
        assert!(matches!(
            body.preferences[1].known(),
            Some(KnownPreference::SavedFeeds(saved)) if saved.items[0].kind == "timeline"
        ));
        assert!(body.preferences[2].is_unknown());
    }

    #[test]
    fn test_put_preferences_writes_unknown_back() {
        let future = json!({"$type": "app.bsky.actor.defs#someFuturePref", "x": {"y": true}});
        let endpoint = PutPreferences {
            preferences: vec![serde_json::from_value(future.clone()).unwrap()],
        };

        let body = endpoint.body().unwrap();
        let sent: serde_json::Value = serde_json::from_slice(body.as_bytes().unwrap()).unwrap();

        assert_eq!(sent, json!({ "preferences": [future] }));
    }
}
