//! Process-local security event log.
//!
//! Every security-relevant outcome is written as one JSON object per line on
//! stdout, prefixed with `[AUDIT]`, so an external log collector can pick the
//! stream apart without touching the main tracing output. The log is
//! constructed once in the composition root and injected wherever it is
//! needed; there is no global registration.

use std::sync::{Arc, Mutex};

use {
    chrono::{SecondsFormat, Utc},
    serde::Serialize,
    tracing::warn,
};

/// Kinds of auditable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    AuthSuccess,
    AuthFailure,
    RateLimitExceeded,
    WebhookCreated,
    WebhookUpdated,
    WebhookDeleted,
    SsrfBlocked,
    PathTraversalBlocked,
    MessageSent,
    PairingStarted,
}

/// Outcome of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
    Blocked,
}

/// One auditable event. The timestamp is stamped at emit time.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: AuditKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub resource: String,
    pub action: String,
    pub status: AuditStatus,
    pub details: String,
}

impl AuditEvent {
    #[must_use]
    pub fn new(
        event: AuditKind,
        resource: impl Into<String>,
        action: impl Into<String>,
        status: AuditStatus,
    ) -> Self {
        Self {
            event,
            client_ip: None,
            user_agent: None,
            resource: resource.into(),
            action: action.into(),
            status,
            details: String::new(),
        }
    }

    #[must_use]
    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

#[derive(Serialize)]
struct AuditLine<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Handle to the audit stream. Cloning is cheap; all clones write to the
/// same destination.
#[derive(Clone, Default)]
pub struct AuditLog {
    capture: Option<Arc<Mutex<Vec<String>>>>,
}

impl AuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture emitted lines in memory instead of writing to stdout.
    /// Test support.
    #[must_use]
    pub fn capturing() -> (Self, Arc<Mutex<Vec<String>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                capture: Some(Arc::clone(&buffer)),
            },
            buffer,
        )
    }

    pub fn emit(&self, event: AuditEvent) {
        let line = AuditLine {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event: &event,
        };
        let json = match serde_json::to_string(&line) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize audit event");
                return;
            },
        };
        match &self.capture {
            Some(buffer) => {
                let mut lines = buffer.lock().unwrap_or_else(|p| p.into_inner());
                lines.push(format!("[AUDIT] {json}"));
            },
            None => println!("[AUDIT] {json}"),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitted_line_is_prefixed_json() {
        let (log, buffer) = AuditLog::capturing();
        log.emit(
            AuditEvent::new(
                AuditKind::SsrfBlocked,
                "webhook_config",
                "create",
                AuditStatus::Blocked,
            )
            .client_ip("203.0.113.9")
            .details("target resolves to a private address"),
        );

        let lines = buffer.lock().unwrap();
        assert_eq!(lines.len(), 1);
        let json = lines[0].strip_prefix("[AUDIT] ").unwrap();
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["event"], "ssrf_blocked");
        assert_eq!(value["status"], "blocked");
        assert_eq!(value["client_ip"], "203.0.113.9");
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
        // user_agent was not set and must be absent, not null.
        assert!(value.get("user_agent").is_none());
    }

    #[test]
    fn kinds_serialize_snake_case() {
        let json = serde_json::to_string(&AuditKind::PathTraversalBlocked).unwrap();
        assert_eq!(json, "\"path_traversal_blocked\"");
        let json = serde_json::to_string(&AuditKind::RateLimitExceeded).unwrap();
        assert_eq!(json, "\"rate_limit_exceeded\"");
    }
}
