//! Outbound message sending.

use std::net::SocketAddr;

use {
    axum::{
        Json,
        extract::{ConnectInfo, State},
        http::HeaderMap,
    },
    hermod_common::audit::{AuditEvent, AuditKind, AuditStatus},
    hermod_platform::{Error as PlatformError, SendReceipt},
    serde::{Deserialize, Serialize},
};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub recipient: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub message_id: String,
    pub timestamp: i64,
}

pub async fn send_message(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let text = request.text.as_deref().unwrap_or("");
    let media_path = request.media_path.as_deref().unwrap_or("");
    if text.is_empty() && media_path.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one of text or media_path is required".into(),
        ));
    }

    let result: Result<SendReceipt, PlatformError> = if media_path.is_empty() {
        state.client.send_text(&request.recipient, text).await
    } else {
        state
            .client
            .send_media(&request.recipient, media_path, text)
            .await
    };

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    match result {
        Ok(receipt) => {
            let mut event = AuditEvent::new(
                AuditKind::MessageSent,
                request.recipient.clone(),
                "send",
                AuditStatus::Success,
            )
            .client_ip(addr.ip().to_string());
            if let Some(agent) = user_agent {
                event = event.user_agent(agent);
            }
            state.audit.emit(event);

            Ok(Json(SendResponse {
                message_id: receipt.message_id,
                timestamp: receipt.timestamp,
            }))
        },
        Err(error) => {
            let (kind, status) = match &error {
                PlatformError::MediaPath(_) => {
                    (AuditKind::PathTraversalBlocked, AuditStatus::Blocked)
                },
                _ => (AuditKind::MessageSent, AuditStatus::Failure),
            };
            let mut event = AuditEvent::new(kind, request.recipient.clone(), "send", status)
                .details(error.to_string())
                .client_ip(addr.ip().to_string());
            if let Some(agent) = user_agent {
                event = event.user_agent(agent);
            }
            state.audit.emit(event);

            Err(error.into())
        },
    }
}
