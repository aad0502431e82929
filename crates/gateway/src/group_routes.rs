//! Group, blocklist, and newsletter operations.

use {
    axum::{
        Json,
        extract::{Path, State},
    },
    hermod_platform::{ChatAddress, ParticipantAction},
    serde::Deserialize,
};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub subject: String,
    pub participants: Vec<String>,
}

pub async fn create_group(
    State(state): State<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.subject.is_empty() {
        return Err(ApiError::BadRequest("subject is required".into()));
    }
    if request.participants.is_empty() {
        return Err(ApiError::BadRequest("participants is required".into()));
    }
    let address = state
        .client
        .create_group(&request.subject, &request.participants)
        .await?;
    Ok(Json(serde_json::json!({ "group": address.to_string() })))
}

#[derive(Debug, Deserialize)]
pub struct ParticipantsRequest {
    pub group: String,
    pub members: Vec<String>,
    /// `add`, `remove`, `promote`, or `demote`.
    pub action: String,
}

pub async fn update_participants(
    State(state): State<AppState>,
    Json(request): Json<ParticipantsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let action = match request.action.as_str() {
        "add" => ParticipantAction::Add,
        "remove" => ParticipantAction::Remove,
        "promote" => ParticipantAction::Promote,
        "demote" => ParticipantAction::Demote,
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown participant action: {other}"
            )));
        },
    };
    state
        .client
        .update_group_participants(&request.group, &request.members, action)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct LeaveGroupRequest {
    pub group: String,
}

pub async fn leave_group(
    State(state): State<AppState>,
    Json(request): Json<LeaveGroupRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.client.leave_group(&request.group).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn group_info(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address: ChatAddress = group
        .parse()
        .map_err(hermod_platform::Error::from)?;
    let info = state.client.group_info(&address).await?;
    Ok(Json(serde_json::json!({
        "group": address.to_string(),
        "name": info.name,
        "participant_count": info.participant_count,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub contact: String,
    pub blocked: bool,
}

pub async fn set_blocked(
    State(state): State<AppState>,
    Json(request): Json<BlockRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .client
        .set_blocked(&request.contact, request.blocked)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct NewsletterRequest {
    pub newsletter: String,
    pub follow: bool,
}

pub async fn follow_newsletter(
    State(state): State<AppState>,
    Json(request): Json<NewsletterRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .client
        .follow_newsletter(&request.newsletter, request.follow)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
