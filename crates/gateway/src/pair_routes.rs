//! Device pairing over the API (phone-number flow).

use std::net::SocketAddr;

use {
    axum::{
        Json,
        extract::{ConnectInfo, State},
    },
    hermod_common::audit::{AuditEvent, AuditKind, AuditStatus},
    hermod_platform::PairingStatus,
    serde::{Deserialize, Serialize},
};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct PhonePairRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct PhonePairResponse {
    pub code: String,
    pub expires_in_seconds: u64,
}

pub async fn start_phone_pairing(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<PhonePairRequest>,
) -> Result<Json<PhonePairResponse>, ApiError> {
    if request.phone.is_empty() {
        return Err(ApiError::BadRequest("phone is required".into()));
    }

    let code = state.client.begin_phone_pairing(&request.phone).await?;

    state.audit.emit(
        AuditEvent::new(
            AuditKind::PairingStarted,
            "pairing",
            "phone_pair",
            AuditStatus::Success,
        )
        .client_ip(addr.ip().to_string()),
    );

    Ok(Json(PhonePairResponse {
        code,
        expires_in_seconds: 160,
    }))
}

pub async fn pairing_status(State(state): State<AppState>) -> Json<PairingStatus> {
    Json(state.client.pairing_status().await)
}
