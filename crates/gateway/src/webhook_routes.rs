//! Webhook configuration CRUD, test sends, and delivery-log retrieval.

use std::net::SocketAddr;

use {
    axum::{
        Json,
        extract::{ConnectInfo, Path, Query, State},
        http::HeaderMap,
    },
    hermod_storage::{WebhookConfig, WebhookDeliveryLog},
    hermod_webhooks::{Actor, NewWebhook, TestOutcome},
    serde::{Deserialize, Serialize},
};

use crate::{error::ApiError, state::AppState};

/// Public shape of a config. The secret itself never leaves the store;
/// callers only learn whether one is set.
#[derive(Debug, Serialize)]
pub struct WebhookView {
    pub id: i64,
    pub name: String,
    pub target_url: String,
    pub has_secret: bool,
    pub enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub triggers: Vec<TriggerView>,
}

#[derive(Debug, Serialize)]
pub struct TriggerView {
    pub id: i64,
    #[serde(rename = "type")]
    pub trigger_type: String,
    pub value: String,
    pub match_type: String,
    pub enabled: bool,
}

impl From<WebhookConfig> for WebhookView {
    fn from(config: WebhookConfig) -> Self {
        Self {
            id: config.id,
            name: config.name,
            target_url: config.target_url,
            has_secret: config.secret.is_some(),
            enabled: config.enabled,
            created_at: config.created_at,
            updated_at: config.updated_at,
            triggers: config
                .triggers
                .into_iter()
                .map(|t| TriggerView {
                    id: t.id,
                    trigger_type: t.trigger_type.as_str().to_string(),
                    value: t.value,
                    match_type: t.match_type.as_str().to_string(),
                    enabled: t.enabled,
                })
                .collect(),
        }
    }
}

fn actor(addr: SocketAddr, headers: &HeaderMap) -> Actor {
    Actor {
        ip: Some(addr.ip().to_string()),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<WebhookView>>, ApiError> {
    let configs = state.webhooks.list().await?;
    Ok(Json(configs.into_iter().map(WebhookView::from).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<NewWebhook>,
) -> Result<Json<WebhookView>, ApiError> {
    let created = state
        .webhooks
        .create(request, &actor(addr, &headers))
        .await?;
    Ok(Json(created.into()))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<WebhookView>, ApiError> {
    Ok(Json(state.webhooks.get(id).await?.into()))
}

pub async fn update(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(mut request): Json<NewWebhook>,
) -> Result<Json<WebhookView>, ApiError> {
    // An omitted secret keeps the stored one; an empty string clears it.
    if request.secret.is_none() {
        request.secret = state.webhooks.get(id).await?.secret;
    } else if request.secret.as_deref() == Some("") {
        request.secret = None;
    }

    let updated = state
        .webhooks
        .update(id, request, &actor(addr, &headers))
        .await?;
    Ok(Json(updated.into()))
}

pub async fn delete(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.webhooks.delete(id, &actor(addr, &headers)).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

pub async fn enable(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<WebhookView>, ApiError> {
    state.webhooks.set_enabled(id, true).await?;
    Ok(Json(state.webhooks.get(id).await?.into()))
}

pub async fn disable(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<WebhookView>, ApiError> {
    state.webhooks.set_enabled(id, false).await?;
    Ok(Json(state.webhooks.get(id).await?.into()))
}

pub async fn test(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TestOutcome>, ApiError> {
    Ok(Json(state.webhooks.test(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// `0` (the default) means across all configs.
    #[serde(default)]
    pub config_id: i64,
    #[serde(default = "default_log_limit")]
    pub limit: u32,
}

fn default_log_limit() -> u32 {
    50
}

pub async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<WebhookDeliveryLog>>, ApiError> {
    Ok(Json(
        state.webhooks.logs(query.config_id, query.limit).await?,
    ))
}
