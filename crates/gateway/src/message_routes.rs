//! Message operations beyond plain sending: reactions, edits, revokes,
//! polls, read receipts, chat state, presence, and history backfill
//! requests. Each is a thin shim over the client wrapper.

use {
    axum::{
        Json,
        extract::{Query, State},
    },
    hermod_platform::{ChatState, Presence},
    serde::Deserialize,
};

use crate::{error::ApiError, state::AppState};

fn ok() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub recipient: String,
    pub message_id: String,
    pub emoji: String,
}

pub async fn send_reaction(
    State(state): State<AppState>,
    Json(request): Json<ReactionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .client
        .send_reaction(&request.recipient, &request.message_id, &request.emoji)
        .await?;
    Ok(ok())
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub recipient: String,
    pub message_id: String,
    pub text: String,
}

pub async fn edit_message(
    State(state): State<AppState>,
    Json(request): Json<EditRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .client
        .edit_message(&request.recipient, &request.message_id, &request.text)
        .await?;
    Ok(ok())
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub recipient: String,
    pub message_id: String,
}

pub async fn revoke_message(
    State(state): State<AppState>,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .client
        .revoke_message(&request.recipient, &request.message_id)
        .await?;
    Ok(ok())
}

#[derive(Debug, Deserialize)]
pub struct PollRequest {
    pub recipient: String,
    pub question: String,
    pub options: Vec<String>,
    #[serde(default = "default_selectable")]
    pub selectable: u32,
}

fn default_selectable() -> u32 {
    1
}

pub async fn create_poll(
    State(state): State<AppState>,
    Json(request): Json<PollRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.options.len() < 2 {
        return Err(ApiError::BadRequest(
            "a poll needs at least two options".into(),
        ));
    }
    let receipt = state
        .client
        .create_poll(
            &request.recipient,
            &request.question,
            &request.options,
            request.selectable,
        )
        .await?;
    Ok(Json(serde_json::json!({
        "message_id": receipt.message_id,
        "timestamp": receipt.timestamp,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub chat: String,
    pub sender: String,
    pub message_ids: Vec<String>,
}

pub async fn mark_read(
    State(state): State<AppState>,
    Json(request): Json<MarkReadRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.message_ids.is_empty() {
        return Err(ApiError::BadRequest("message_ids is required".into()));
    }
    state
        .client
        .mark_read(&request.chat, &request.sender, &request.message_ids)
        .await?;
    Ok(ok())
}

#[derive(Debug, Deserialize)]
pub struct ChatStateRequest {
    pub recipient: String,
    /// `composing` or `paused`.
    pub state: String,
}

pub async fn send_chat_state(
    State(state): State<AppState>,
    Json(request): Json<ChatStateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let chat_state = match request.state.as_str() {
        "composing" => ChatState::Composing,
        "paused" => ChatState::Paused,
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown chat state: {other}"
            )));
        },
    };
    state
        .client
        .send_chat_state(&request.recipient, chat_state)
        .await?;
    Ok(ok())
}

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    /// `available` or `unavailable`.
    pub presence: String,
}

pub async fn send_presence(
    State(state): State<AppState>,
    Json(request): Json<PresenceRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let presence = match request.presence.as_str() {
        "available" => Presence::Available,
        "unavailable" => Presence::Unavailable,
        other => {
            return Err(ApiError::BadRequest(format!("unknown presence: {other}")));
        },
    };
    state.client.send_presence(presence).await?;
    Ok(ok())
}

#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    #[serde(default = "default_history_count")]
    pub count: u32,
}

fn default_history_count() -> u32 {
    50
}

pub async fn request_history(
    State(state): State<AppState>,
    Json(request): Json<HistoryRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.client.request_history(request.count).await?;
    Ok(ok())
}

// ── Stored data ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatsQuery {
    #[serde(default = "default_list_limit")]
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub chat: String,
    #[serde(default = "default_list_limit")]
    pub limit: u32,
}

fn default_list_limit() -> u32 {
    50
}

pub async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ChatsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let chats = state.storage.list_chats(query.limit).await?;
    Ok(Json(serde_json::json!({ "chats": chats })))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let messages = state.storage.get_messages(&query.chat, query.limit).await?;
    let messages: Vec<serde_json::Value> = messages
        .into_iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "chat_address": m.chat_address,
                "sender": m.sender,
                "sender_name": m.sender_display_name,
                "content": m.text,
                "timestamp": m.timestamp,
                "is_from_me": m.is_from_me,
                "media_type": m.media_kind.map(|k| k.as_str()),
                "filename": m.media_filename,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "messages": messages })))
}
