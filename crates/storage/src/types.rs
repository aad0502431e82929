use {
    hermod_common::types::MediaKind,
    serde::{Deserialize, Serialize},
};

/// A conversation thread, keyed by its rendered address.
#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub address: String,
    pub name: String,
    /// Unix seconds of the most recent message observed in this chat.
    pub last_message_time: i64,
}

/// A persisted message. Identity is `(id, chat_address)`; the platform
/// reuses message ids across chats.
#[derive(Debug, Clone, Default)]
pub struct StoredMessage {
    pub id: String,
    pub chat_address: String,
    pub sender: String,
    pub sender_display_name: String,
    pub text: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub is_from_me: bool,
    pub media_kind: Option<MediaKind>,
    pub media_filename: String,
    pub media_url: String,
    pub media_key: Vec<u8>,
    pub media_sha256: Vec<u8>,
    pub media_enc_sha256: Vec<u8>,
    pub media_length: i64,
}

impl StoredMessage {
    /// True when there is nothing worth persisting: no text and no media.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.media_kind.is_none()
    }
}

// ── Webhook configuration ───────────────────────────────────────────────────

/// What part of a message a trigger inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    All,
    Chat,
    Sender,
    Keyword,
    MediaKind,
}

impl TriggerType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Chat => "chat",
            Self::Sender => "sender",
            Self::Keyword => "keyword",
            Self::MediaKind => "media_kind",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(Self::All),
            "chat" => Some(Self::Chat),
            "sender" => Some(Self::Sender),
            "keyword" => Some(Self::Keyword),
            "media_kind" => Some(Self::MediaKind),
            _ => None,
        }
    }
}

/// How a trigger value is compared against the inspected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Contains,
    Regex,
}

impl MatchType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Contains => "contains",
            Self::Regex => "regex",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(Self::Exact),
            "contains" => Some(Self::Contains),
            "regex" => Some(Self::Regex),
            _ => None,
        }
    }
}

/// One rule attached to a webhook config.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookTrigger {
    pub id: i64,
    pub config_id: i64,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub value: String,
    pub match_type: MatchType,
    pub enabled: bool,
}

/// A webhook endpoint with its triggers. The secret never leaves the store
/// through the public API surface; views expose only `has_secret`.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub id: i64,
    pub name: String,
    pub target_url: String,
    pub secret: Option<String>,
    pub enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub triggers: Vec<WebhookTrigger>,
}

/// One delivery attempt, recorded whether it succeeded or not.
/// `delivered_at` is set only when the attempt got a 2xx response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WebhookDeliveryLog {
    pub id: i64,
    pub config_id: i64,
    pub message_id: String,
    pub chat_address: String,
    pub trigger_type: String,
    pub trigger_value: String,
    pub payload_json: String,
    pub response_status: i64,
    pub response_body: String,
    pub attempt_count: i64,
    pub delivered_at: Option<i64>,
    pub created_at: i64,
}
