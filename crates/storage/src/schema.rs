//! Schema bootstrap and forward-only migrations.

use sqlx::SqlitePool;

use crate::error::Result;

pub(crate) async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chats (
            address           TEXT PRIMARY KEY,
            name              TEXT    NOT NULL DEFAULT '',
            last_message_time INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS messages (
            id              TEXT    NOT NULL,
            chat_address    TEXT    NOT NULL,
            sender          TEXT    NOT NULL,
            content         TEXT    NOT NULL DEFAULT '',
            timestamp       INTEGER NOT NULL,
            is_from_me      INTEGER NOT NULL DEFAULT 0,
            media_type      TEXT,
            filename        TEXT    NOT NULL DEFAULT '',
            url             TEXT    NOT NULL DEFAULT '',
            media_key       BLOB,
            file_sha256     BLOB,
            file_enc_sha256 BLOB,
            file_length     INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (id, chat_address)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_chat_time
         ON messages (chat_address, timestamp DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS webhook_configs (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            name       TEXT    NOT NULL,
            target_url TEXT    NOT NULL,
            secret     TEXT,
            enabled    INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS webhook_triggers (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            config_id    INTEGER NOT NULL,
            trigger_type TEXT    NOT NULL,
            value        TEXT    NOT NULL DEFAULT '',
            match_type   TEXT    NOT NULL,
            enabled      INTEGER NOT NULL DEFAULT 1
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_webhook_triggers_config
         ON webhook_triggers (config_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS webhook_logs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            config_id       INTEGER NOT NULL,
            message_id      TEXT    NOT NULL,
            chat_address    TEXT    NOT NULL,
            trigger_type    TEXT    NOT NULL,
            trigger_value   TEXT    NOT NULL DEFAULT '',
            payload_json    TEXT    NOT NULL,
            response_status INTEGER NOT NULL DEFAULT 0,
            response_body   TEXT    NOT NULL DEFAULT '',
            attempt_count   INTEGER NOT NULL,
            delivered_at    INTEGER,
            created_at      INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_webhook_logs_config_created
         ON webhook_logs (config_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Forward-only additive migrations. Each step must be safe to re-run
/// against a store that already has it applied.
pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // sender_display_name arrived after the first release shipped.
    let result = sqlx::query(
        "ALTER TABLE messages ADD COLUMN sender_display_name TEXT NOT NULL DEFAULT ''",
    )
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_duplicate_column(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn is_duplicate_column(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|db| db.message().contains("duplicate column name"))
}
