//! API-key authentication middleware.

use std::net::SocketAddr;

use {
    axum::{
        extract::{ConnectInfo, State},
        http::{HeaderMap, StatusCode},
        middleware::Next,
        response::{IntoResponse, Json, Response},
    },
    hermod_common::audit::{AuditEvent, AuditKind, AuditStatus},
    tracing::debug,
};

use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Middleware protecting the `/api` routes. Compares `X-API-Key` against
/// the configured key in constant time; every outcome is audited.
pub async fn require_api_key(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    if state.settings.disable_auth_check {
        debug!("api auth disabled by configuration");
        return next.run(request).await;
    }

    let path = request.uri().path().to_owned();
    let user_agent = header_value(request.headers(), axum::http::header::USER_AGENT.as_str());
    let presented = header_value(request.headers(), API_KEY_HEADER);

    let authorized = match (&state.settings.api_key, &presented) {
        (Some(expected), Some(presented)) => constant_time_eq(expected, presented),
        _ => false,
    };

    let mut event = AuditEvent::new(
        if authorized {
            AuditKind::AuthSuccess
        } else {
            AuditKind::AuthFailure
        },
        path,
        "api_request",
        if authorized {
            AuditStatus::Success
        } else {
            AuditStatus::Failure
        },
    )
    .client_ip(addr.ip().to_string());
    if let Some(agent) = user_agent {
        event = event.user_agent(agent);
    }
    state.audit.emit(event);

    if authorized {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid or missing API key" })),
        )
            .into_response()
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Constant-time string comparison.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_agrees_with_equality() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secreT"));
        assert!(!constant_time_eq("secret", "secre"));
        assert!(!constant_time_eq("", "x"));
        assert!(constant_time_eq("", ""));
    }
}
