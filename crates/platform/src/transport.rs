//! Contract with the underlying platform client.
//!
//! The vendor side (wire protocol, crypto sessions, retransmits) is opaque.
//! What the rest of the bridge sees is this trait: a broadcast event feed,
//! a send surface, and a reconnect-decision hook the client calls after
//! each failed reconnect attempt.

use std::sync::Arc;

use {
    async_trait::async_trait,
    hermod_common::types::MediaKind,
    tokio::sync::broadcast,
};

use crate::{address::ChatAddress, error::Result, media::VoiceNoteMeta};

/// Decision callback consulted after each failed reconnect attempt.
/// Returning `true` asks the client to try again; `false` gives up.
pub type ReconnectHook = Arc<dyn Fn() -> bool + Send + Sync>;

// ── Events ──────────────────────────────────────────────────────────────────

/// Everything the platform pushes at us.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    Message(IncomingMessage),
    HistorySync(HistorySync),
    Connected,
    Disconnected,
    LoggedOut,
    /// A login QR code to render for the operator.
    QrCode(String),
    PairSuccess,
    PairError { reason: String },
    KeepAliveTimeout,
    StreamError { message: String },
}

/// A message as the platform hands it over, before normalization.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: String,
    pub chat: ChatAddress,
    /// `None` when the platform does not know the original sender, which
    /// happens for some historic group messages.
    pub sender: Option<ChatAddress>,
    pub push_name: String,
    pub is_from_me: bool,
    /// Unix seconds. Historic messages occasionally arrive without one.
    pub timestamp: Option<i64>,
    pub content: MessageContent,
}

/// Raw message content variants. The platform has many more; only the ones
/// the bridge persists are surfaced here.
#[derive(Debug, Clone, Default)]
pub struct MessageContent {
    pub conversation: Option<String>,
    pub extended_text: Option<String>,
    pub media: Option<MediaPart>,
}

impl MessageContent {
    /// Text of the message: the plain variant wins over the extended one.
    #[must_use]
    pub fn text(&self) -> &str {
        self.conversation
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.extended_text.as_deref())
            .unwrap_or("")
    }
}

/// An attachment reference. The payload itself stays on the platform CDN;
/// we keep what is needed to fetch and decrypt it later.
#[derive(Debug, Clone)]
pub struct MediaPart {
    pub kind: MediaKind,
    pub filename: Option<String>,
    pub url: String,
    pub media_key: Vec<u8>,
    pub sha256: Vec<u8>,
    pub enc_sha256: Vec<u8>,
    pub length: u64,
}

/// A bulk backfill of past conversations.
#[derive(Debug, Clone, Default)]
pub struct HistorySync {
    pub conversations: Vec<HistoryConversation>,
}

/// One conversation inside a history sync. Vendor payloads disagree on which
/// field carries the human-readable name, so both candidates are kept and
/// exposed through accessors that filter out empty strings.
#[derive(Debug, Clone, Default)]
pub struct HistoryConversation {
    pub address: String,
    display_name: Option<String>,
    name: Option<String>,
    pub messages: Vec<IncomingMessage>,
}

impl HistoryConversation {
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        display_name: Option<String>,
        name: Option<String>,
        messages: Vec<IncomingMessage>,
    ) -> Self {
        Self {
            address: address.into(),
            display_name,
            name,
            messages,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref().filter(|n| !n.is_empty())
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

// ── Send-side types ─────────────────────────────────────────────────────────

/// Receipt for an accepted outbound message.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message_id: String,
    /// Unix seconds at which the platform accepted the message.
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct GroupInfo {
    pub name: String,
    pub participant_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Available,
    Unavailable,
}

impl Presence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Typing indicator state for a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Composing,
    Paused,
}

impl ChatState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Composing => "composing",
            Self::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

impl ParticipantAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Promote => "promote",
            Self::Demote => "demote",
        }
    }
}

/// History backfill preferences, applied before the session is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryPrefs {
    pub days_limit: Option<u32>,
    pub size_mb: Option<u32>,
    pub storage_quota_mb: Option<u32>,
}

/// A fully prepared outbound attachment.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub kind: MediaKind,
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
    pub caption: String,
    /// Present only for voice notes.
    pub voice: Option<VoiceNoteMeta>,
}

// ── The transport trait ─────────────────────────────────────────────────────

/// The opaque platform client, as seen from the bridge.
#[async_trait]
pub trait PlatformTransport: Send + Sync {
    /// Establish the link to the platform. Idempotent.
    async fn connect(&self) -> Result<()>;

    /// Tear the link down. Idempotent.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Whether stored credentials for a paired device exist.
    fn has_identity(&self) -> bool;

    /// Install the reconnect-decision hook. The client calls it after each
    /// failed reconnect attempt.
    fn set_reconnect_hook(&self, hook: ReconnectHook);

    /// Subscribe to the event feed. Every subscriber sees every event.
    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent>;

    /// Apply history preferences. Must happen before the device session is
    /// created to take effect.
    async fn apply_history_prefs(&self, prefs: HistoryPrefs) -> Result<()>;

    /// Request an 8-character pairing code for the given phone number.
    async fn request_pair_code(&self, phone: &str) -> Result<String>;

    async fn send_text(&self, to: &ChatAddress, text: &str) -> Result<SendReceipt>;

    async fn send_reaction(&self, to: &ChatAddress, message_id: &str, emoji: &str) -> Result<()>;

    async fn edit_message(&self, to: &ChatAddress, message_id: &str, text: &str) -> Result<()>;

    async fn revoke_message(&self, to: &ChatAddress, message_id: &str) -> Result<()>;

    async fn create_poll(
        &self,
        to: &ChatAddress,
        question: &str,
        options: &[String],
        selectable: u32,
    ) -> Result<SendReceipt>;

    async fn mark_read(
        &self,
        chat: &ChatAddress,
        sender: &ChatAddress,
        message_ids: &[String],
    ) -> Result<()>;

    async fn send_presence(&self, presence: Presence) -> Result<()>;

    async fn send_chat_state(&self, to: &ChatAddress, state: ChatState) -> Result<()>;

    async fn group_info(&self, group: &ChatAddress) -> Result<GroupInfo>;

    async fn create_group(
        &self,
        subject: &str,
        participants: &[ChatAddress],
    ) -> Result<ChatAddress>;

    async fn update_group_participants(
        &self,
        group: &ChatAddress,
        members: &[ChatAddress],
        action: ParticipantAction,
    ) -> Result<()>;

    async fn leave_group(&self, group: &ChatAddress) -> Result<()>;

    async fn set_blocked(&self, contact: &ChatAddress, blocked: bool) -> Result<()>;

    async fn follow_newsletter(&self, newsletter: &ChatAddress, follow: bool) -> Result<()>;

    /// Ask the platform to push another batch of history.
    async fn request_history(&self, count: u32) -> Result<()>;

    async fn send_media(&self, to: &ChatAddress, upload: MediaUpload) -> Result<SendReceipt>;

    /// Full name from the platform's contact store, if known.
    async fn contact_name(&self, contact: &ChatAddress) -> Result<Option<String>>;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_prefers_plain_variant() {
        let content = MessageContent {
            conversation: Some("plain".into()),
            extended_text: Some("extended".into()),
            media: None,
        };
        assert_eq!(content.text(), "plain");
    }

    #[test]
    fn text_falls_back_to_extended_then_empty() {
        let content = MessageContent {
            conversation: Some(String::new()),
            extended_text: Some("extended".into()),
            media: None,
        };
        assert_eq!(content.text(), "extended");
        assert_eq!(MessageContent::default().text(), "");
    }

    #[test]
    fn conversation_name_accessors_filter_empty() {
        let conv = HistoryConversation::new(
            "1@group",
            Some(String::new()),
            Some("Team".into()),
            Vec::new(),
        );
        assert_eq!(conv.display_name(), None);
        assert_eq!(conv.name(), Some("Team"));
    }
}
