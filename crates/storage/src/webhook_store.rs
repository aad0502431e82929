//! Webhook configuration, trigger, and delivery-log persistence.

use {
    chrono::Utc,
    sqlx::{Row, Sqlite, Transaction, sqlite::SqliteRow},
};

use crate::{
    error::{Error, Result},
    store::Storage,
    types::{MatchType, TriggerType, WebhookConfig, WebhookDeliveryLog, WebhookTrigger},
};

impl Storage {
    /// Insert a config with its triggers. Returns the stored config with
    /// database ids filled in.
    pub async fn store_webhook_config(&self, cfg: &WebhookConfig) -> Result<WebhookConfig> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO webhook_configs (name, target_url, secret, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&cfg.name)
        .bind(&cfg.target_url)
        .bind(&cfg.secret)
        .bind(cfg.enabled)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let config_id = result.last_insert_rowid();
        insert_triggers(&mut tx, config_id, &cfg.triggers).await?;
        tx.commit().await?;

        self.get_webhook_config(config_id).await
    }

    /// Replace a config row and its whole trigger set atomically. Rolls back
    /// on any failure; fails with not-found when the id does not exist.
    pub async fn update_webhook_config(&self, cfg: &WebhookConfig) -> Result<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE webhook_configs
             SET name = ?, target_url = ?, secret = ?, enabled = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&cfg.name)
        .bind(&cfg.target_url)
        .bind(&cfg.secret)
        .bind(cfg.enabled)
        .bind(now)
        .bind(cfg.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Error::ConfigNotFound { id: cfg.id });
        }

        sqlx::query("DELETE FROM webhook_triggers WHERE config_id = ?")
            .bind(cfg.id)
            .execute(&mut *tx)
            .await?;
        insert_triggers(&mut tx, cfg.id, &cfg.triggers).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete a config and everything hanging off it: logs, then triggers,
    /// then the config row, in one transaction.
    pub async fn delete_webhook_config(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM webhook_configs WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if exists == 0 {
            tx.rollback().await?;
            return Err(Error::ConfigNotFound { id });
        }

        sqlx::query("DELETE FROM webhook_logs WHERE config_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM webhook_triggers WHERE config_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM webhook_configs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_webhook_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let result =
            sqlx::query("UPDATE webhook_configs SET enabled = ?, updated_at = ? WHERE id = ?")
                .bind(enabled)
                .bind(Utc::now().timestamp())
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(Error::ConfigNotFound { id });
        }
        Ok(())
    }

    pub async fn get_webhook_config(&self, id: i64) -> Result<WebhookConfig> {
        let row = sqlx::query(
            "SELECT id, name, target_url, secret, enabled, created_at, updated_at
             FROM webhook_configs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::ConfigNotFound { id })?;

        let mut cfg = config_from_row(&row);
        cfg.triggers = self.triggers_for(id).await?;
        Ok(cfg)
    }

    pub async fn list_webhook_configs(&self) -> Result<Vec<WebhookConfig>> {
        let rows = sqlx::query(
            "SELECT id, name, target_url, secret, enabled, created_at, updated_at
             FROM webhook_configs ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut configs = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut cfg = config_from_row(row);
            cfg.triggers = self.triggers_for(cfg.id).await?;
            configs.push(cfg);
        }
        Ok(configs)
    }

    async fn triggers_for(&self, config_id: i64) -> Result<Vec<WebhookTrigger>> {
        let rows = sqlx::query(
            "SELECT id, config_id, trigger_type, value, match_type, enabled
             FROM webhook_triggers WHERE config_id = ? ORDER BY id",
        )
        .bind(config_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trigger_from_row).collect()
    }

    // ── Delivery logs ───────────────────────────────────────────────────────

    pub async fn store_webhook_log(&self, log: &WebhookDeliveryLog) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO webhook_logs
               (config_id, message_id, chat_address, trigger_type, trigger_value,
                payload_json, response_status, response_body, attempt_count,
                delivered_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(log.config_id)
        .bind(&log.message_id)
        .bind(&log.chat_address)
        .bind(&log.trigger_type)
        .bind(&log.trigger_value)
        .bind(&log.payload_json)
        .bind(log.response_status)
        .bind(&log.response_body)
        .bind(log.attempt_count)
        .bind(log.delivered_at)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Delivery logs, newest first. `config_id = 0` means across all configs.
    pub async fn get_webhook_logs(
        &self,
        config_id: i64,
        limit: u32,
    ) -> Result<Vec<WebhookDeliveryLog>> {
        let rows = if config_id == 0 {
            sqlx::query(
                "SELECT id, config_id, message_id, chat_address, trigger_type, trigger_value,
                        payload_json, response_status, response_body, attempt_count,
                        delivered_at, created_at
                 FROM webhook_logs ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, config_id, message_id, chat_address, trigger_type, trigger_value,
                        payload_json, response_status, response_body, attempt_count,
                        delivered_at, created_at
                 FROM webhook_logs WHERE config_id = ?
                 ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(config_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows.iter().map(log_from_row).collect())
    }
}

async fn insert_triggers(
    tx: &mut Transaction<'_, Sqlite>,
    config_id: i64,
    triggers: &[WebhookTrigger],
) -> Result<()> {
    for trigger in triggers {
        sqlx::query(
            "INSERT INTO webhook_triggers (config_id, trigger_type, value, match_type, enabled)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(config_id)
        .bind(trigger.trigger_type.as_str())
        .bind(&trigger.value)
        .bind(trigger.match_type.as_str())
        .bind(trigger.enabled)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn config_from_row(row: &SqliteRow) -> WebhookConfig {
    WebhookConfig {
        id: row.get("id"),
        name: row.get("name"),
        target_url: row.get("target_url"),
        secret: row.get("secret"),
        enabled: row.get("enabled"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        triggers: Vec::new(),
    }
}

fn trigger_from_row(row: &SqliteRow) -> Result<WebhookTrigger> {
    let trigger_type: String = row.get("trigger_type");
    let match_type: String = row.get("match_type");
    Ok(WebhookTrigger {
        id: row.get("id"),
        config_id: row.get("config_id"),
        trigger_type: TriggerType::parse(&trigger_type).ok_or(Error::Unrecognized {
            what: "trigger_type",
            value: trigger_type,
        })?,
        value: row.get("value"),
        match_type: MatchType::parse(&match_type).ok_or(Error::Unrecognized {
            what: "match_type",
            value: match_type,
        })?,
        enabled: row.get("enabled"),
    })
}

fn log_from_row(row: &SqliteRow) -> WebhookDeliveryLog {
    WebhookDeliveryLog {
        id: row.get("id"),
        config_id: row.get("config_id"),
        message_id: row.get("message_id"),
        chat_address: row.get("chat_address"),
        trigger_type: row.get("trigger_type"),
        trigger_value: row.get("trigger_value"),
        payload_json: row.get("payload_json"),
        response_status: row.get("response_status"),
        response_body: row.get("response_body"),
        attempt_count: row.get("attempt_count"),
        delivered_at: row.get("delivered_at"),
        created_at: row.get("created_at"),
    }
}
