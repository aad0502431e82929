use std::path::Path;

use {
    hermod_common::types::MediaKind,
    sqlx::{
        Row, SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    },
    tracing::debug,
};

use crate::{
    error::{Error, Result},
    schema,
    types::{Chat, StoredMessage},
};

/// Name of the embedded store file under the store directory. The platform
/// client keeps its own session file next to it.
const STORE_FILE: &str = "hermod.db";

/// Shared handle to the embedded store.
pub struct Storage {
    pub(crate) pool: SqlitePool,
}

impl Storage {
    /// Open (or create) the store under `store_dir` and bring the schema up
    /// to date. Any failure here is fatal for startup.
    pub async fn open(store_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(store_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(store_dir, std::fs::Permissions::from_mode(0o755))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(store_dir.join(STORE_FILE))
            .create_if_missing(true);

        // One connection: every caller serializes through the pool, which
        // keeps per-chat write order identical to arrival order.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        schema::init_schema(&pool).await?;
        schema::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// In-memory store for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        schema::init_schema(&pool).await?;
        schema::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    // ── Chats ───────────────────────────────────────────────────────────────

    /// Upsert a chat. An empty incoming name never clears a stored one, and
    /// `last_message_time` only moves forward.
    pub async fn store_chat(&self, address: &str, name: &str, last_activity: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO chats (address, name, last_message_time) VALUES (?, ?, ?)
             ON CONFLICT(address) DO UPDATE SET
               name = CASE WHEN excluded.name <> '' THEN excluded.name ELSE chats.name END,
               last_message_time = MAX(chats.last_message_time, excluded.last_message_time)",
        )
        .bind(address)
        .bind(name)
        .bind(last_activity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stored display name for a chat, if any.
    pub async fn get_chat_name(&self, address: &str) -> Result<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM chats WHERE address = ?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name.filter(|n| !n.is_empty()))
    }

    /// Most recently active chats.
    pub async fn list_chats(&self, limit: u32) -> Result<Vec<Chat>> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT address, name, last_message_time FROM chats
             ORDER BY last_message_time DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(address, name, last_message_time)| Chat {
                address,
                name,
                last_message_time,
            })
            .collect())
    }

    pub async fn count_chats(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chats")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    // ── Messages ────────────────────────────────────────────────────────────

    /// Upsert a message by `(id, chat_address)`. A message with neither text
    /// nor media is dropped without touching the store. An empty sender
    /// display name falls back to the sender address.
    pub async fn store_message(&self, msg: &StoredMessage) -> Result<()> {
        if msg.is_empty() {
            debug!(id = %msg.id, chat = %msg.chat_address, "dropping message without text or media");
            return Ok(());
        }

        let display_name = if msg.sender_display_name.is_empty() {
            msg.sender.as_str()
        } else {
            msg.sender_display_name.as_str()
        };

        sqlx::query(
            "INSERT INTO messages
               (id, chat_address, sender, sender_display_name, content, timestamp, is_from_me,
                media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id, chat_address) DO UPDATE SET
               sender = excluded.sender,
               sender_display_name = excluded.sender_display_name,
               content = excluded.content,
               timestamp = excluded.timestamp,
               is_from_me = excluded.is_from_me,
               media_type = excluded.media_type,
               filename = excluded.filename,
               url = excluded.url,
               media_key = excluded.media_key,
               file_sha256 = excluded.file_sha256,
               file_enc_sha256 = excluded.file_enc_sha256,
               file_length = excluded.file_length",
        )
        .bind(&msg.id)
        .bind(&msg.chat_address)
        .bind(&msg.sender)
        .bind(display_name)
        .bind(&msg.text)
        .bind(msg.timestamp)
        .bind(msg.is_from_me)
        .bind(msg.media_kind.map(MediaKind::as_str))
        .bind(&msg.media_filename)
        .bind(&msg.media_url)
        .bind(&msg.media_key)
        .bind(&msg.media_sha256)
        .bind(&msg.media_enc_sha256)
        .bind(msg.media_length)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Messages in one chat, newest first.
    pub async fn get_messages(&self, chat_address: &str, limit: u32) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            "SELECT id, chat_address, sender, sender_display_name, content, timestamp,
                    is_from_me, media_type, filename, url, media_key, file_sha256,
                    file_enc_sha256, file_length
             FROM messages
             WHERE chat_address = ?
             ORDER BY timestamp DESC
             LIMIT ?",
        )
        .bind(chat_address)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    pub async fn count_messages(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// Timestamp of the newest stored message, if any.
    pub async fn latest_message_timestamp(&self) -> Result<Option<i64>> {
        Ok(
            sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(timestamp) FROM messages")
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

fn message_from_row(row: &SqliteRow) -> Result<StoredMessage> {
    let media_kind = row
        .get::<Option<String>, _>("media_type")
        .map(|value| {
            MediaKind::parse(&value).ok_or(Error::Unrecognized {
                what: "media_type",
                value,
            })
        })
        .transpose()?;

    Ok(StoredMessage {
        id: row.get("id"),
        chat_address: row.get("chat_address"),
        sender: row.get("sender"),
        sender_display_name: row.get("sender_display_name"),
        text: row.get("content"),
        timestamp: row.get("timestamp"),
        is_from_me: row.get("is_from_me"),
        media_kind,
        media_filename: row.get("filename"),
        media_url: row.get("url"),
        media_key: row.get::<Option<Vec<u8>>, _>("media_key").unwrap_or_default(),
        media_sha256: row
            .get::<Option<Vec<u8>>, _>("file_sha256")
            .unwrap_or_default(),
        media_enc_sha256: row
            .get::<Option<Vec<u8>>, _>("file_enc_sha256")
            .unwrap_or_default(),
        media_length: row.get("file_length"),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message(id: &str, chat: &str) -> StoredMessage {
        StoredMessage {
            id: id.into(),
            chat_address: chat.into(),
            sender: "222@individual".into(),
            sender_display_name: "Alice".into(),
            text: "hello".into(),
            timestamp: 1_700_000_000,
            ..StoredMessage::default()
        }
    }

    #[tokio::test]
    async fn open_creates_store_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        let storage = Storage::open(&store_dir).await.unwrap();
        assert!(store_dir.join(STORE_FILE).exists());
        assert_eq!(storage.count_messages().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn migration_is_idempotent() {
        let storage = Storage::in_memory().await.unwrap();
        // A second run must treat the existing column as a no-op.
        schema::run_migrations(&storage.pool).await.unwrap();
    }

    #[tokio::test]
    async fn store_message_is_idempotent_by_identity() {
        let storage = Storage::in_memory().await.unwrap();
        let mut msg = sample_message("m1", "111@individual");
        storage.store_message(&msg).await.unwrap();

        msg.text = "hello again".into();
        storage.store_message(&msg).await.unwrap();

        let messages = storage.get_messages("111@individual", 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hello again");
    }

    #[tokio::test]
    async fn same_id_in_different_chats_stores_two_rows() {
        let storage = Storage::in_memory().await.unwrap();
        storage
            .store_message(&sample_message("m1", "111@individual"))
            .await
            .unwrap();
        storage
            .store_message(&sample_message("m1", "222@group"))
            .await
            .unwrap();
        assert_eq!(storage.count_messages().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_message_is_dropped() {
        let storage = Storage::in_memory().await.unwrap();
        let msg = StoredMessage {
            id: "m1".into(),
            chat_address: "111@individual".into(),
            sender: "222@individual".into(),
            timestamp: 1_700_000_000,
            ..StoredMessage::default()
        };
        storage.store_message(&msg).await.unwrap();
        assert_eq!(storage.count_messages().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_display_name_falls_back_to_sender() {
        let storage = Storage::in_memory().await.unwrap();
        let mut msg = sample_message("m1", "111@individual");
        msg.sender_display_name = String::new();
        storage.store_message(&msg).await.unwrap();

        let messages = storage.get_messages("111@individual", 1).await.unwrap();
        assert_eq!(messages[0].sender_display_name, "222@individual");
    }

    #[tokio::test]
    async fn messages_come_back_newest_first() {
        let storage = Storage::in_memory().await.unwrap();
        for i in 0..5 {
            let mut msg = sample_message(&format!("m{i}"), "111@individual");
            msg.timestamp = 1_700_000_000 + i;
            storage.store_message(&msg).await.unwrap();
        }

        let messages = storage.get_messages("111@individual", 3).await.unwrap();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].timestamp > messages[1].timestamp);
        assert_eq!(
            storage.latest_message_timestamp().await.unwrap(),
            Some(1_700_000_004)
        );
    }

    #[tokio::test]
    async fn media_round_trips() {
        let storage = Storage::in_memory().await.unwrap();
        let msg = StoredMessage {
            id: "m1".into(),
            chat_address: "111@individual".into(),
            sender: "222@individual".into(),
            timestamp: 1_700_000_000,
            media_kind: Some(MediaKind::Image),
            media_filename: "photo.jpg".into(),
            media_url: "https://cdn.example/abc".into(),
            media_key: vec![1, 2, 3],
            media_sha256: vec![4, 5],
            media_enc_sha256: vec![6],
            media_length: 1024,
            ..StoredMessage::default()
        };
        storage.store_message(&msg).await.unwrap();

        let back = &storage.get_messages("111@individual", 1).await.unwrap()[0];
        assert_eq!(back.media_kind, Some(MediaKind::Image));
        assert_eq!(back.media_key, vec![1, 2, 3]);
        assert_eq!(back.media_length, 1024);
    }

    #[tokio::test]
    async fn chat_upsert_keeps_existing_name_and_advances_time() {
        let storage = Storage::in_memory().await.unwrap();
        storage
            .store_chat("111@individual", "Alice", 1_700_000_000)
            .await
            .unwrap();
        // Empty name and an older timestamp must change nothing.
        storage
            .store_chat("111@individual", "", 1_600_000_000)
            .await
            .unwrap();

        let chats = storage.list_chats(10).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].name, "Alice");
        assert_eq!(chats[0].last_message_time, 1_700_000_000);

        storage
            .store_chat("111@individual", "Alice P.", 1_800_000_000)
            .await
            .unwrap();
        let chats = storage.list_chats(10).await.unwrap();
        assert_eq!(chats[0].name, "Alice P.");
        assert_eq!(chats[0].last_message_time, 1_800_000_000);
        assert_eq!(storage.count_chats().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn get_chat_name_filters_empty() {
        let storage = Storage::in_memory().await.unwrap();
        storage
            .store_chat("111@individual", "", 1_700_000_000)
            .await
            .unwrap();
        assert_eq!(storage.get_chat_name("111@individual").await.unwrap(), None);
        assert_eq!(storage.get_chat_name("missing@individual").await.unwrap(), None);

        storage
            .store_chat("111@individual", "Alice", 1_700_000_000)
            .await
            .unwrap();
        assert_eq!(
            storage.get_chat_name("111@individual").await.unwrap(),
            Some("Alice".into())
        );
    }
}
