//! Configuration CRUD and the live fan-out path.
//!
//! The manager keeps an in-memory snapshot of all configs behind a
//! read-write lock. Mutations write through storage and then rebuild the
//! snapshot in full; readers clone the `Arc` and never observe a half
//! mutation.

use std::{
    sync::{Arc, RwLock as StdRwLock},
    time::Instant,
};

use {
    async_trait::async_trait,
    hermod_common::audit::{AuditEvent, AuditKind, AuditLog, AuditStatus},
    hermod_ingest::MessageSink,
    hermod_platform::{BridgeClient, ChatAddress, GroupInfo},
    hermod_storage::{MatchType, Storage, StoredMessage, TriggerType, WebhookConfig,
                     WebhookDeliveryLog, WebhookTrigger},
    serde::Deserialize,
    tracing::debug,
};

use crate::{
    delivery::{self, DeliveryTarget, TestOutcome},
    error::{Error, Result},
    matching::{self, MatchInput},
    payload, ssrf, validate,
};

/// Who asked for a mutation, for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Incoming config shape for create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWebhook {
    pub name: String,
    pub target_url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub triggers: Vec<NewTrigger>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTrigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub value: String,
    pub match_type: MatchType,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct WebhookOptions {
    /// Base URL for `media_download_url` in payloads.
    pub download_url_base: String,
    /// When false, target URLs are stored without the SSRF check
    /// (`DISABLE_SSRF_CHECK`).
    pub ssrf_check: bool,
}

impl Default for WebhookOptions {
    fn default() -> Self {
        Self {
            download_url_base: "http://localhost:8080/api/download".to_string(),
            ssrf_check: true,
        }
    }
}

pub struct WebhookManager {
    storage: Arc<Storage>,
    client: Arc<BridgeClient>,
    snapshot: StdRwLock<Arc<Vec<WebhookConfig>>>,
    http: reqwest::Client,
    audit: AuditLog,
    options: WebhookOptions,
}

impl WebhookManager {
    pub async fn new(
        storage: Arc<Storage>,
        client: Arc<BridgeClient>,
        audit: AuditLog,
        options: WebhookOptions,
    ) -> Result<Arc<Self>> {
        let manager = Arc::new(Self {
            storage,
            client,
            snapshot: StdRwLock::new(Arc::new(Vec::new())),
            http: delivery::build_http_client(),
            audit,
            options,
        });
        manager.load().await?;
        Ok(manager)
    }

    /// Rebuild the snapshot from storage. Called after every mutation.
    pub async fn load(&self) -> Result<()> {
        let configs = self.storage.list_webhook_configs().await?;
        let mut snapshot = self.snapshot.write().unwrap_or_else(|p| p.into_inner());
        *snapshot = Arc::new(configs);
        Ok(())
    }

    /// Current snapshot. Readers work against this immutable copy.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<WebhookConfig>> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|p| p.into_inner()))
    }

    async fn check_target(&self, target_url: &str, actor: &Actor) -> Result<()> {
        if !self.options.ssrf_check {
            debug!("ssrf check disabled by configuration");
            return Ok(());
        }
        if let Err(rejection) = ssrf::check_url(target_url).await {
            let mut event = AuditEvent::new(
                AuditKind::SsrfBlocked,
                "webhook_config",
                "validate_target",
                AuditStatus::Blocked,
            )
            .details(rejection.to_string());
            event.client_ip = actor.ip.clone();
            event.user_agent = actor.user_agent.clone();
            self.audit.emit(event);
            return Err(Error::Validation(rejection.to_string()));
        }
        Ok(())
    }

    pub async fn create(&self, req: NewWebhook, actor: &Actor) -> Result<WebhookConfig> {
        validate::validate(&req)?;
        self.check_target(&req.target_url, actor).await?;

        let stored = self
            .storage
            .store_webhook_config(&config_from_request(0, &req))
            .await?;
        self.load().await?;

        let mut event = AuditEvent::new(
            AuditKind::WebhookCreated,
            format!("webhook_config:{}", stored.id),
            "create",
            AuditStatus::Success,
        )
        .details(format!("name={} target={}", stored.name, stored.target_url));
        event.client_ip = actor.ip.clone();
        event.user_agent = actor.user_agent.clone();
        self.audit.emit(event);

        Ok(stored)
    }

    pub async fn update(&self, id: i64, req: NewWebhook, actor: &Actor) -> Result<WebhookConfig> {
        validate::validate(&req)?;
        self.check_target(&req.target_url, actor).await?;

        self.storage
            .update_webhook_config(&config_from_request(id, &req))
            .await?;
        self.load().await?;

        let mut event = AuditEvent::new(
            AuditKind::WebhookUpdated,
            format!("webhook_config:{id}"),
            "update",
            AuditStatus::Success,
        );
        event.client_ip = actor.ip.clone();
        event.user_agent = actor.user_agent.clone();
        self.audit.emit(event);

        self.get(id).await
    }

    pub async fn delete(&self, id: i64, actor: &Actor) -> Result<()> {
        self.storage.delete_webhook_config(id).await?;
        self.load().await?;

        let mut event = AuditEvent::new(
            AuditKind::WebhookDeleted,
            format!("webhook_config:{id}"),
            "delete",
            AuditStatus::Success,
        );
        event.client_ip = actor.ip.clone();
        event.user_agent = actor.user_agent.clone();
        self.audit.emit(event);
        Ok(())
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        self.storage.set_webhook_enabled(id, enabled).await?;
        self.load().await
    }

    pub async fn get(&self, id: i64) -> Result<WebhookConfig> {
        Ok(self.storage.get_webhook_config(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<WebhookConfig>> {
        Ok(self.storage.list_webhook_configs().await?)
    }

    pub async fn logs(&self, config_id: i64, limit: u32) -> Result<Vec<WebhookDeliveryLog>> {
        Ok(self.storage.get_webhook_logs(config_id, limit).await?)
    }

    /// One-shot synthetic delivery: no retries, no log row.
    pub async fn test(&self, id: i64) -> Result<TestOutcome> {
        let config = self.storage.get_webhook_config(id).await?;
        let target = DeliveryTarget {
            config_id: config.id,
            target_url: config.target_url.clone(),
            secret: config.secret.clone(),
        };
        delivery::send_test(&self.http, &target, &payload::test_payload(&config)).await
    }
}

fn config_from_request(id: i64, req: &NewWebhook) -> WebhookConfig {
    WebhookConfig {
        id,
        name: req.name.clone(),
        target_url: req.target_url.clone(),
        secret: req.secret.clone().filter(|s| !s.is_empty()),
        enabled: req.enabled,
        created_at: 0,
        updated_at: 0,
        triggers: req
            .triggers
            .iter()
            .map(|t| WebhookTrigger {
                id: 0,
                config_id: id,
                trigger_type: t.trigger_type,
                value: t.value.clone(),
                match_type: t.match_type,
                enabled: t.enabled,
            })
            .collect(),
    }
}

#[async_trait]
impl MessageSink for WebhookManager {
    async fn on_message(&self, message: StoredMessage, chat_name: String, push_name: String) {
        let started = Instant::now();
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return;
        }

        let sender_user = message
            .sender
            .rsplit_once('@')
            .map(|(user, _)| user)
            .unwrap_or(message.sender.as_str());
        let media_kind = message
            .media_kind
            .map(hermod_common::types::MediaKind::as_str)
            .unwrap_or("");
        let input = MatchInput {
            chat_address: &message.chat_address,
            sender_address: &message.sender,
            sender_user,
            text: &message.text,
            media_kind,
        };

        // Group metadata is fetched at most once per message, and only when
        // some config actually matched.
        let mut group: Option<GroupInfo> = None;
        let mut group_resolved = false;

        for config in snapshot.iter() {
            let Some(trigger) = matching::first_match(config, &input) else {
                continue;
            };

            if !group_resolved {
                group_resolved = true;
                if let Ok(chat) = message.chat_address.parse::<ChatAddress>()
                    && chat.is_group()
                {
                    group = self.client.group_info(&chat).await.ok();
                }
            }

            let payload = payload::assemble(
                config,
                trigger,
                &message,
                &chat_name,
                &push_name,
                group.as_ref(),
                &self.options.download_url_base,
                started.elapsed().as_millis() as u64,
            );
            debug!(
                config_id = config.id,
                trigger_id = trigger.id,
                message_id = %message.id,
                "webhook matched, spawning delivery"
            );
            delivery::spawn_delivery(
                self.http.clone(),
                Arc::clone(&self.storage),
                DeliveryTarget {
                    config_id: config.id,
                    target_url: config.target_url.clone(),
                    secret: config.secret.clone(),
                },
                payload,
            );
        }
    }
}
