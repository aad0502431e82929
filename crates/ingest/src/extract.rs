//! Normalization of raw platform messages into stored rows.

use {
    chrono::DateTime,
    hermod_platform::{ChatAddress, IncomingMessage},
    hermod_storage::StoredMessage,
};

use hermod_common::types::MediaKind;

/// Build the row to persist for a message, or `None` when there is nothing
/// worth keeping (no text and no media).
pub(crate) fn build_stored(
    msg: &IncomingMessage,
    sender: &ChatAddress,
    sender_display_name: &str,
    timestamp: i64,
) -> Option<StoredMessage> {
    let text = msg.content.text().to_string();
    let media = msg.content.media.as_ref();
    if text.is_empty() && media.is_none() {
        return None;
    }

    let mut stored = StoredMessage {
        id: msg.id.clone(),
        chat_address: msg.chat.to_string(),
        sender: sender.to_string(),
        sender_display_name: sender_display_name.to_string(),
        text,
        timestamp,
        is_from_me: msg.is_from_me,
        ..StoredMessage::default()
    };

    if let Some(part) = media {
        stored.media_kind = Some(part.kind);
        stored.media_filename = part
            .filename
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| synthetic_filename(part.kind, timestamp));
        stored.media_url = part.url.clone();
        stored.media_key = part.media_key.clone();
        stored.media_sha256 = part.sha256.clone();
        stored.media_enc_sha256 = part.enc_sha256.clone();
        stored.media_length = part.length as i64;
    }

    Some(stored)
}

/// Filename for media that arrived without one: `<kind>_<YYYYMMDD_HHMMSS>`
/// plus the kind's extension. Documents carry no extension.
pub(crate) fn synthetic_filename(kind: MediaKind, timestamp: i64) -> String {
    let stamp = DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| "00000000_000000".to_string());
    let ext = kind.extension();
    if ext.is_empty() {
        format!("{kind}_{stamp}")
    } else {
        format!("{kind}_{stamp}.{ext}")
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use hermod_platform::{MediaPart, MessageContent};

    use super::*;

    fn message_with(content: MessageContent) -> IncomingMessage {
        IncomingMessage {
            id: "m1".into(),
            chat: "111@individual".parse().unwrap(),
            sender: Some("222@individual".parse().unwrap()),
            push_name: "Alice".into(),
            is_from_me: false,
            timestamp: Some(1_700_000_000),
            content,
        }
    }

    fn media_part(kind: MediaKind, filename: Option<&str>) -> MediaPart {
        MediaPart {
            kind,
            filename: filename.map(String::from),
            url: "https://cdn.example/x".into(),
            media_key: vec![1],
            sha256: vec![2],
            enc_sha256: vec![3],
            length: 99,
        }
    }

    #[test]
    fn text_only_message_is_kept() {
        let msg = message_with(MessageContent {
            conversation: Some("hello".into()),
            ..MessageContent::default()
        });
        let sender = msg.sender.clone().unwrap();
        let stored = build_stored(&msg, &sender, "Alice", 1_700_000_000).unwrap();
        assert_eq!(stored.text, "hello");
        assert_eq!(stored.sender, "222@individual");
        assert!(stored.media_kind.is_none());
    }

    #[test]
    fn empty_message_is_dropped() {
        let msg = message_with(MessageContent::default());
        let sender = msg.sender.clone().unwrap();
        assert!(build_stored(&msg, &sender, "Alice", 1_700_000_000).is_none());
    }

    #[test]
    fn media_without_filename_gets_a_synthetic_one() {
        let msg = message_with(MessageContent {
            media: Some(media_part(MediaKind::Image, None)),
            ..MessageContent::default()
        });
        let sender = msg.sender.clone().unwrap();
        // 2023-11-14 22:13:20 UTC.
        let stored = build_stored(&msg, &sender, "Alice", 1_700_000_000).unwrap();
        assert_eq!(stored.media_filename, "image_20231114_221320.jpg");
        assert_eq!(stored.media_length, 99);
    }

    #[test]
    fn carried_filename_wins_over_synthesis() {
        let msg = message_with(MessageContent {
            media: Some(media_part(MediaKind::Document, Some("report.pdf"))),
            ..MessageContent::default()
        });
        let sender = msg.sender.clone().unwrap();
        let stored = build_stored(&msg, &sender, "Alice", 1_700_000_000).unwrap();
        assert_eq!(stored.media_filename, "report.pdf");
    }

    #[test]
    fn synthetic_document_filename_has_no_extension() {
        assert_eq!(
            synthetic_filename(MediaKind::Document, 1_700_000_000),
            "document_20231114_221320"
        );
        assert_eq!(
            synthetic_filename(MediaKind::Audio, 1_700_000_000),
            "audio_20231114_221320.ogg"
        );
        assert_eq!(
            synthetic_filename(MediaKind::Video, 1_700_000_000),
            "video_20231114_221320.mp4"
        );
    }
}
