//! `app.bsky.notification.*`

use super::actor::ProfileView;
use super::{limit_setter, AuthRequirement, Endpoint};
use crate::agent::BskyAgent;
use crate::xrpc::{Body, HttpMethod, Idempotency, QueryItems};
use crate::Result;
use serde::{Deserialize, Serialize};

/// One notification
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// URI of the record that caused it
    pub uri: String,
    /// CID of that record
    pub cid: String,
    /// Who caused it
    pub author: ProfileView,
    /// `like`, `repost`, `follow`, `mention`, `reply`, `quote`, ...
    pub reason: String,
    /// Subject of the reason (e.g. the liked post)
    #[serde(default)]
    pub reason_subject: Option<String>,
    /// The raw record
    pub record: serde_json::Value,
    /// Whether it was seen
    pub is_read: bool,
    /// When it was indexed
    pub indexed_at: String,
    /// Moderation labels
    #[serde(default)]
    pub labels: Vec<serde_json::Value>,
}

/// `app.bsky.notification.listNotifications`
#[derive(Debug, Clone, Default)]
pub struct ListNotifications {
    /// Page size, within `[1, 100]`
    pub limit: Option<i64>,
    /// Pagination cursor
    pub cursor: Option<String>,
    /// Only these reasons
    pub reasons: Vec<String>,
    /// Override the seen marker
    pub seen_at: Option<String>,
}

impl ListNotifications {
    limit_setter!(1, 100);
}

/// A page of notifications
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsPage {
    /// Cursor for the next page
    #[serde(default)]
    pub cursor: Option<String>,
    /// Notifications on this page
    pub notifications: Vec<Notification>,
    /// Current seen marker
    #[serde(default)]
    pub seen_at: Option<String>,
}

impl Endpoint for ListNotifications {
    const NSID: &'static str = "app.bsky.notification.listNotifications";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    type Output = NotificationsPage;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with_opt("limit", self.limit)
            .with_opt("cursor", self.cursor.as_deref())
            .with_all("reasons", &self.reasons)
            .with_opt("seenAt", self.seen_at.as_deref())
    }
}

/// `app.bsky.notification.getUnreadCount`
#[derive(Debug, Clone, Default)]
pub struct GetUnreadCount {
    /// Override the seen marker
    pub seen_at: Option<String>,
}

/// Output of `getUnreadCount`
#[derive(Debug, Clone, Deserialize)]
pub struct UnreadCount {
    /// Unread notifications
    pub count: u64,
}

impl Endpoint for GetUnreadCount {
    const NSID: &'static str = "app.bsky.notification.getUnreadCount";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    type Output = UnreadCount;

    fn query(&self) -> QueryItems {
        QueryItems::new().with_opt("seenAt", self.seen_at.as_deref())
    }
}

/// `app.bsky.notification.updateSeen`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSeen {
    /// New seen marker (RFC 3339)
    pub seen_at: String,
}

impl Endpoint for UpdateSeen {
    const NSID: &'static str = "app.bsky.notification.updateSeen";
    const METHOD: HttpMethod = HttpMethod::Post;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    const IDEMPOTENCY: Idempotency = Idempotency::Idempotent;
    type Output = serde::de::IgnoredAny;

    fn body(&self) -> std::result::Result<Body, serde_json::Error> {
        Body::json(self)
    }
}

impl BskyAgent {
    /// List notifications
    pub async fn list_notifications(
        &self,
        limit: i64,
        cursor: Option<String>,
    ) -> Result<NotificationsPage> {
        let endpoint = ListNotifications {
            cursor,
            ..ListNotifications::default()
        }
        .limit(limit);
        self.call(&endpoint).await
    }

    /// Number of unread notifications
    pub async fn get_unread_count(&self) -> Result<u64> {
        Ok(self.call(&GetUnreadCount::default()).await?.count)
    }

    /// Mark notifications as seen up to now
    pub async fn update_seen(&self) -> Result<()> {
        let seen_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        self.call(&UpdateSeen { seen_at }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_are_repeated() {
        let query = ListNotifications {
            reasons: vec!["like".to_string(), "follow".to_string()],
            ..Default::default()
        }
        .limit(50)
        .query();

        let pairs: Vec<_> = query.iter().collect();
        assert_eq!(
            pairs,
            vec![("limit", "50"), ("reasons", "like"), ("reasons", "follow")]
        );
    }

    #[test]
    fn test_update_seen_body() {
        let body = UpdateSeen {
            seen_at: "2024-01-01T00:00:00.000Z".to_string(),
        }
        .body()
        .unwrap();

        assert_eq!(
            body.as_bytes(),
            Some(br#"{"seenAt":"2024-01-01T00:00:00.000Z"}"#.as_slice())
        );
    }
}
