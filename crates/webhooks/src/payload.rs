//! Outbound payload assembly. One payload is built per (config, message)
//! pair; the delivery loop re-stamps the attempt number before each send.

use {
    chrono::{DateTime, Utc},
    hermod_common::types::MediaKind,
    hermod_platform::GroupInfo,
    hermod_storage::{StoredMessage, WebhookConfig, WebhookTrigger},
    serde::Serialize,
};

pub const EVENT_MESSAGE_RECEIVED: &str = "message_received";
pub const EVENT_TEST: &str = "test";

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event_type: String,
    pub timestamp: String,
    pub webhook_config: ConfigRef,
    pub trigger: TriggerRef,
    pub message: MessageBlock,
    pub metadata: PayloadMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerRef {
    #[serde(rename = "type")]
    pub trigger_type: String,
    pub value: String,
    pub match_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageBlock {
    pub id: String,
    pub chat_address: String,
    pub chat_name: String,
    pub sender: String,
    pub sender_name: String,
    pub content: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    pub is_from_me: bool,
    pub media_type: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_download_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayloadMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_info: Option<GroupBlock>,
    pub delivery_attempt: u32,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupBlock {
    pub is_group: bool,
    pub group_name: String,
    pub participant_count: usize,
}

/// Build the payload for a matched live message.
#[allow(clippy::too_many_arguments)]
pub(crate) fn assemble(
    config: &WebhookConfig,
    trigger: &WebhookTrigger,
    message: &StoredMessage,
    chat_name: &str,
    push_name: &str,
    group: Option<&GroupInfo>,
    download_url_base: &str,
    processing_time_ms: u64,
) -> WebhookPayload {
    let media_type = message
        .media_kind
        .map(MediaKind::as_str)
        .unwrap_or("")
        .to_string();
    let media_download_url = message.media_kind.map(|_| {
        format!(
            "{}/{}/{}",
            download_url_base.trim_end_matches('/'),
            message.chat_address,
            message.id
        )
    });

    WebhookPayload {
        event_type: EVENT_MESSAGE_RECEIVED.to_string(),
        timestamp: rfc3339(message.timestamp),
        webhook_config: ConfigRef {
            id: config.id,
            name: config.name.clone(),
        },
        trigger: TriggerRef {
            trigger_type: trigger.trigger_type.as_str().to_string(),
            value: trigger.value.clone(),
            match_type: trigger.match_type.as_str().to_string(),
        },
        message: MessageBlock {
            id: message.id.clone(),
            chat_address: message.chat_address.clone(),
            chat_name: chat_name.to_string(),
            sender: message.sender.clone(),
            sender_name: message.sender_display_name.clone(),
            content: message.text.clone(),
            timestamp: rfc3339(message.timestamp),
            push_name: (!push_name.is_empty()).then(|| push_name.to_string()),
            is_from_me: message.is_from_me,
            media_type,
            filename: message.media_filename.clone(),
            media_download_url,
        },
        metadata: PayloadMetadata {
            group_info: group.map(|info| GroupBlock {
                is_group: true,
                group_name: info.name.clone(),
                participant_count: info.participant_count,
            }),
            delivery_attempt: 1,
            processing_time_ms,
        },
    }
}

/// Fixed synthetic payload for operator-initiated test sends.
pub(crate) fn test_payload(config: &WebhookConfig) -> WebhookPayload {
    WebhookPayload {
        event_type: EVENT_TEST.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        webhook_config: ConfigRef {
            id: config.id,
            name: config.name.clone(),
        },
        trigger: TriggerRef {
            trigger_type: "test".to_string(),
            value: String::new(),
            match_type: "exact".to_string(),
        },
        message: MessageBlock {
            id: "test-message-id".to_string(),
            chat_address: "000@individual".to_string(),
            chat_name: "Test Chat".to_string(),
            sender: "000@individual".to_string(),
            sender_name: "Test Sender".to_string(),
            content: "This is a test delivery.".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            push_name: None,
            is_from_me: false,
            media_type: String::new(),
            filename: String::new(),
            media_download_url: None,
        },
        metadata: PayloadMetadata {
            group_info: None,
            delivery_attempt: 1,
            processing_time_ms: 0,
        },
    }
}

fn rfc3339(unix_seconds: i64) -> String {
    DateTime::from_timestamp(unix_seconds, 0)
        .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use hermod_storage::{MatchType, TriggerType};

    use super::*;

    fn fixtures() -> (WebhookConfig, WebhookTrigger, StoredMessage) {
        let trigger = WebhookTrigger {
            id: 7,
            config_id: 3,
            trigger_type: TriggerType::Keyword,
            value: "urgent".into(),
            match_type: MatchType::Contains,
            enabled: true,
        };
        let config = WebhookConfig {
            id: 3,
            name: "alerts".into(),
            target_url: "https://hooks.example/x".into(),
            secret: None,
            enabled: true,
            created_at: 0,
            updated_at: 0,
            triggers: vec![trigger.clone()],
        };
        let message = StoredMessage {
            id: "m1".into(),
            chat_address: "111@individual".into(),
            sender: "222@individual".into(),
            sender_display_name: "Alice".into(),
            text: "This is urgent!".into(),
            timestamp: 1_700_000_000,
            ..StoredMessage::default()
        };
        (config, trigger, message)
    }

    #[test]
    fn payload_shape_for_a_text_message() {
        let (config, trigger, message) = fixtures();
        let payload = assemble(
            &config,
            &trigger,
            &message,
            "Alice",
            "Alice",
            None,
            "http://localhost:8080/api/download",
            12,
        );
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["event_type"], "message_received");
        assert_eq!(value["webhook_config"]["id"], 3);
        assert_eq!(value["trigger"]["type"], "keyword");
        assert_eq!(value["trigger"]["value"], "urgent");
        assert_eq!(value["trigger"]["match_type"], "contains");
        assert_eq!(value["message"]["content"], "This is urgent!");
        assert_eq!(value["message"]["chat_address"], "111@individual");
        assert_eq!(value["message"]["sender_name"], "Alice");
        assert!(value["message"]["timestamp"]
            .as_str()
            .unwrap()
            .starts_with("2023-11-14T22:13:20"));
        assert_eq!(value["metadata"]["delivery_attempt"], 1);
        assert_eq!(value["metadata"]["processing_time_ms"], 12);
        // No media: the download URL must be absent, not null.
        assert!(value["message"].get("media_download_url").is_none());
        assert!(value["metadata"].get("group_info").is_none());
    }

    #[test]
    fn media_messages_carry_a_download_url() {
        let (config, trigger, mut message) = fixtures();
        message.media_kind = Some(MediaKind::Image);
        message.media_filename = "photo.jpg".into();

        let payload = assemble(
            &config,
            &trigger,
            &message,
            "Alice",
            "",
            None,
            "http://localhost:8080/api/download/",
            0,
        );
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["message"]["media_type"], "image");
        assert_eq!(
            value["message"]["media_download_url"],
            "http://localhost:8080/api/download/111@individual/m1"
        );
        // Empty push name is omitted.
        assert!(value["message"].get("push_name").is_none());
    }

    #[test]
    fn group_metadata_is_attached_when_known() {
        let (config, trigger, message) = fixtures();
        let group = GroupInfo {
            name: "Engineering".into(),
            participant_count: 12,
        };
        let payload = assemble(
            &config, &trigger, &message, "Engineering", "Alice", Some(&group), "http://x", 0,
        );
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["metadata"]["group_info"]["is_group"], true);
        assert_eq!(value["metadata"]["group_info"]["participant_count"], 12);
    }

    #[test]
    fn test_payload_is_marked_as_test() {
        let (config, _, _) = fixtures();
        let value = serde_json::to_value(test_payload(&config)).unwrap();
        assert_eq!(value["event_type"], "test");
        assert_eq!(value["webhook_config"]["name"], "alerts");
        assert_eq!(value["message"]["id"], "test-message-id");
    }
}
