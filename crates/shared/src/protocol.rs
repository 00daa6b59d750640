use serde::{Deserialize, Serialize};

use crate::domain::{
    snowflake_timestamp_ms, AccountIdentity, ChannelId, ChannelKind, GuildId, MessageId, UserId,
};

/// Largest page the list-messages route hands out.
pub const MESSAGE_PAGE_LIMIT: usize = 100;

const DEFAULT_RETRY_AFTER_SECS: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUser {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_name: Option<String>,
}

impl RawUser {
    pub fn into_identity(self) -> AccountIdentity {
        let display_name = match self.global_name {
            Some(name) if !name.trim().is_empty() => name,
            _ if !self.username.trim().is_empty() => self.username,
            _ => format!("user {}", self.id),
        };
        AccountIdentity {
            id: self.id,
            display_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChannel {
    pub id: ChannelId,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<GuildId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<RawUser>,
}

impl RawChannel {
    /// Unix ms of the newest message, or of channel creation when it has none.
    pub fn recency_key(&self) -> u64 {
        let raw = self.last_message_id.map_or(self.id.0, |id| id.0);
        snowflake_timestamp_ms(raw)
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => self.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawGuild {
    pub id: GuildId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: MessageId,
    pub author: RawUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: MessageId,
    pub author_id: UserId,
}

impl From<RawMessage> for MessageSummary {
    fn from(message: RawMessage) -> Self {
        Self {
            id: message.id,
            author_id: message.author.id,
        }
    }
}

/// One newest-first slice of channel history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<MessageSummary>,
}

impl MessagePage {
    pub fn new(messages: Vec<MessageSummary>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn authored_by(&self, author_id: UserId) -> impl Iterator<Item = &MessageSummary> {
        self.messages
            .iter()
            .filter(move |message| message.author_id == author_id)
    }

    /// Cursor for the next older page, or `None` once a short page shows history is exhausted.
    pub fn next_cursor(&self) -> Option<MessageId> {
        if self.messages.len() < MESSAGE_PAGE_LIMIT {
            return None;
        }
        self.messages.last().map(|message| message.id)
    }
}

impl From<Vec<RawMessage>> for MessagePage {
    fn from(messages: Vec<RawMessage>) -> Self {
        Self::new(messages.into_iter().map(MessageSummary::from).collect())
    }
}

/// Body of a 429 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitBody {
    #[serde(default = "default_retry_after")]
    pub retry_after: f64,
    #[serde(default)]
    pub global: bool,
}

fn default_retry_after() -> f64 {
    DEFAULT_RETRY_AFTER_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PLATFORM_EPOCH_MS;

    fn summary(id: u64, author: u64) -> MessageSummary {
        MessageSummary {
            id: MessageId(id),
            author_id: UserId(author),
        }
    }

    #[test]
    fn short_page_has_no_cursor() {
        let page = MessagePage::new((0..99).map(|i| summary(1_000 - i, 1)).collect());
        assert_eq!(page.next_cursor(), None);
        assert_eq!(MessagePage::default().next_cursor(), None);
    }

    #[test]
    fn full_page_continues_from_last_message() {
        let page = MessagePage::new((0..100).map(|i| summary(1_000 - i, 1)).collect());
        assert_eq!(page.next_cursor(), Some(MessageId(901)));
    }

    #[test]
    fn authored_by_filters_other_authors() {
        let page = MessagePage::new(vec![summary(5, 1), summary(4, 2), summary(3, 1)]);
        let own: Vec<_> = page.authored_by(UserId(1)).map(|m| m.id).collect();
        assert_eq!(own, vec![MessageId(5), MessageId(3)]);
    }

    #[test]
    fn recency_prefers_last_message_id() {
        let channel: RawChannel = serde_json::from_value(serde_json::json!({
            "id": (7u64 << 22).to_string(),
            "type": 1,
            "last_message_id": (42u64 << 22).to_string(),
        }))
        .expect("channel");
        assert_eq!(channel.recency_key(), PLATFORM_EPOCH_MS + 42);

        let quiet: RawChannel = serde_json::from_value(serde_json::json!({
            "id": (7u64 << 22).to_string(),
            "type": 3,
            "last_message_id": null,
        }))
        .expect("channel");
        assert_eq!(quiet.recency_key(), PLATFORM_EPOCH_MS + 7);
    }

    #[test]
    fn rate_limit_body_defaults_retry_after() {
        let body: RateLimitBody = serde_json::from_str("{\"message\":\"slow down\"}").expect("body");
        assert_eq!(body.retry_after, 1.0);
        assert!(!body.global);
    }

    #[test]
    fn identity_falls_back_through_names() {
        let user: RawUser =
            serde_json::from_str("{\"id\":\"9\",\"username\":\"alice\",\"global_name\":null}")
                .expect("user");
        assert_eq!(user.into_identity().display_name, "alice");

        let anonymous: RawUser = serde_json::from_str("{\"id\":\"9\"}").expect("user");
        assert_eq!(anonymous.into_identity().display_name, "user 9");
    }
}
