//! Asynchronous signed delivery with retry.
//!
//! Each (config, payload) pair becomes an independent task; there is no
//! ordering guarantee across deliveries. Every attempt writes a log row,
//! with `delivered_at` stamped only on a 2xx response. In-flight deliveries
//! do not survive a process restart.

use std::{sync::Arc, time::Duration};

use {
    chrono::Utc,
    hermod_storage::{Storage, WebhookDeliveryLog},
    hmac::{Hmac, Mac},
    serde::Serialize,
    sha2::Sha256,
    tracing::{debug, warn},
};

use crate::{error::Result, payload::WebhookPayload};

type HmacSha256 = Hmac<Sha256>;

pub(crate) const MAX_ATTEMPTS: u32 = 5;

/// Seconds slept between attempt `k` and `k + 1`.
pub(crate) const BACKOFF_SECS: [u64; 5] = [1, 2, 4, 8, 16];

/// Hard per-attempt timeout, enforced by the HTTP client.
pub(crate) const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Stored response bodies are cut at this many bytes.
pub(crate) const RESPONSE_BODY_LIMIT: usize = 1024;

pub(crate) const USER_AGENT: &str = "Hermod-Webhook/1.0";

/// What the delivery loop needs to know about the target.
#[derive(Debug, Clone)]
pub(crate) struct DeliveryTarget {
    pub config_id: i64,
    pub target_url: String,
    pub secret: Option<String>,
}

/// Outcome of the one-shot test send.
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub success: bool,
    pub status: u16,
    pub response_body: String,
}

/// HMAC-SHA256 over the exact serialized body, hex-encoded. The receiver
/// verifies against the byte-identical request body.
#[must_use]
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length; this arm is unreachable.
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub(crate) fn truncate_body(bytes: &[u8]) -> String {
    let cut = bytes.len().min(RESPONSE_BODY_LIMIT);
    String::from_utf8_lossy(&bytes[..cut]).into_owned()
}

struct AttemptOutcome {
    /// HTTP status, or 0 when the request never produced a response.
    status: u16,
    body: String,
}

async fn attempt_once(
    http: &reqwest::Client,
    target: &DeliveryTarget,
    body: &str,
) -> AttemptOutcome {
    let mut request = http
        .post(&target.target_url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .body(body.to_string());

    if let Some(secret) = &target.secret {
        request = request.header(
            "X-Webhook-Signature",
            format!("sha256={}", sign_body(secret, body.as_bytes())),
        );
    }

    match request.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let bytes = response.bytes().await.unwrap_or_default();
            AttemptOutcome {
                status,
                body: truncate_body(&bytes),
            }
        },
        Err(e) => AttemptOutcome {
            status: 0,
            body: truncate_body(e.to_string().as_bytes()),
        },
    }
}

/// Spawn the retry loop for one matched (config, message) pair.
pub(crate) fn spawn_delivery(
    http: reqwest::Client,
    storage: Arc<Storage>,
    target: DeliveryTarget,
    payload: WebhookPayload,
) {
    tokio::spawn(async move {
        deliver(&http, &storage, &target, payload, &BACKOFF_SECS).await;
    });
}

/// The retry loop. The backoff schedule is a parameter so tests can run it
/// without real sleeps.
pub(crate) async fn deliver(
    http: &reqwest::Client,
    storage: &Storage,
    target: &DeliveryTarget,
    mut payload: WebhookPayload,
    backoff_secs: &[u64; 5],
) {
    for attempt in 1..=MAX_ATTEMPTS {
        payload.metadata.delivery_attempt = attempt;
        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(config_id = target.config_id, error = %e, "payload serialization failed, abandoning delivery");
                return;
            },
        };

        let outcome = attempt_once(http, target, &body).await;
        let success = (200..300).contains(&outcome.status);

        let log = WebhookDeliveryLog {
            id: 0,
            config_id: target.config_id,
            message_id: payload.message.id.clone(),
            chat_address: payload.message.chat_address.clone(),
            trigger_type: payload.trigger.trigger_type.clone(),
            trigger_value: payload.trigger.value.clone(),
            payload_json: body,
            response_status: i64::from(outcome.status),
            response_body: outcome.body,
            attempt_count: i64::from(attempt),
            delivered_at: success.then(|| Utc::now().timestamp()),
            created_at: Utc::now().timestamp(),
        };
        if let Err(e) = storage.store_webhook_log(&log).await {
            warn!(config_id = target.config_id, error = %e, "failed to store delivery log");
        }

        if success {
            debug!(
                config_id = target.config_id,
                attempt, "webhook delivered"
            );
            return;
        }

        warn!(
            config_id = target.config_id,
            attempt,
            status = outcome.status,
            "webhook attempt failed"
        );
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(Duration::from_secs(
                backoff_secs[(attempt - 1) as usize],
            ))
            .await;
        }
    }

    warn!(
        config_id = target.config_id,
        attempts = MAX_ATTEMPTS,
        "webhook delivery abandoned"
    );
}

/// One unlogged send for operator-initiated tests.
pub(crate) async fn send_test(
    http: &reqwest::Client,
    target: &DeliveryTarget,
    payload: &WebhookPayload,
) -> Result<TestOutcome> {
    let body = serde_json::to_string(payload)?;
    let outcome = attempt_once(http, target, &body).await;
    Ok(TestOutcome {
        success: (200..300).contains(&outcome.status),
        status: outcome.status,
        response_body: outcome.body,
    })
}

/// The shared HTTP client for all deliveries. Redirects are disabled so a
/// vetted target cannot bounce us somewhere else.
pub(crate) fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(ATTEMPT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_default()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use hermod_storage::{MatchType, TriggerType, WebhookConfig, WebhookTrigger};

    use super::*;
    use crate::payload;

    fn target(url: String, secret: Option<&str>) -> DeliveryTarget {
        DeliveryTarget {
            config_id: 1,
            target_url: url,
            secret: secret.map(String::from),
        }
    }

    fn sample_payload() -> WebhookPayload {
        let trigger = WebhookTrigger {
            id: 1,
            config_id: 1,
            trigger_type: TriggerType::Keyword,
            value: "urgent".into(),
            match_type: MatchType::Contains,
            enabled: true,
        };
        let config = WebhookConfig {
            id: 1,
            name: "alerts".into(),
            target_url: String::new(),
            secret: None,
            enabled: true,
            created_at: 0,
            updated_at: 0,
            triggers: vec![trigger.clone()],
        };
        let message = hermod_storage::StoredMessage {
            id: "m1".into(),
            chat_address: "111@individual".into(),
            sender: "222@individual".into(),
            sender_display_name: "Alice".into(),
            text: "This is urgent!".into(),
            timestamp: 1_700_000_000,
            ..hermod_storage::StoredMessage::default()
        };
        payload::assemble(&config, &trigger, &message, "Alice", "Alice", None, "http://x", 0)
    }

    #[test]
    fn signature_verifies_against_the_exact_body() {
        let body = br#"{"event_type":"message_received"}"#;
        let signature = sign_body("s", body);

        let mut mac = HmacSha256::new_from_slice(b"s").unwrap();
        mac.update(body);
        assert_eq!(signature, hex::encode(mac.finalize().into_bytes()));

        // One flipped byte breaks it.
        assert_ne!(signature, sign_body("s", br#"{"event_type":"message_receiveD"}"#));
    }

    #[test]
    fn truncation_is_exact_at_the_limit() {
        let long = vec![b'a'; 2048];
        assert_eq!(truncate_body(&long).len(), RESPONSE_BODY_LIMIT);
        assert_eq!(truncate_body(b"short"), "short");
    }

    #[test]
    fn backoff_schedule_is_monotonic() {
        for pair in BACKOFF_SECS.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_eq!(BACKOFF_SECS, [1, 2, 4, 8, 16]);
    }

    #[tokio::test]
    async fn first_attempt_success_writes_one_delivered_row() {
        let storage = Storage::in_memory().await.unwrap();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .match_header("user-agent", USER_AGENT)
            .match_header(
                "x-webhook-signature",
                mockito::Matcher::Regex("^sha256=[0-9a-f]{64}$".into()),
            )
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let http = build_http_client();
        deliver(
            &http,
            &storage,
            &target(format!("{}/hook", server.url()), Some("s3cret")),
            sample_payload(),
            &[0; 5],
        )
        .await;

        mock.assert_async().await;
        let logs = storage.get_webhook_logs(1, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].attempt_count, 1);
        assert_eq!(logs[0].response_status, 200);
        assert_eq!(logs[0].response_body, "ok");
        assert!(logs[0].delivered_at.is_some());
    }

    #[tokio::test]
    async fn failures_retry_up_to_five_times_with_a_row_each() {
        let storage = Storage::in_memory().await.unwrap();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .with_body("boom")
            .expect(5)
            .create_async()
            .await;

        let http = build_http_client();
        deliver(
            &http,
            &storage,
            &target(format!("{}/hook", server.url()), None),
            sample_payload(),
            &[0; 5],
        )
        .await;

        mock.assert_async().await;
        let logs = storage.get_webhook_logs(1, 10).await.unwrap();
        assert_eq!(logs.len(), 5);
        assert!(logs.iter().all(|l| l.delivered_at.is_none()));
        assert!(logs.iter().all(|l| l.response_status == 500));

        let mut attempts: Vec<i64> = logs.iter().map(|l| l.attempt_count).collect();
        attempts.sort_unstable();
        assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn attempt_number_is_stamped_into_each_body() {
        let storage = Storage::in_memory().await.unwrap();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(500)
            .expect(5)
            .create_async()
            .await;

        let http = build_http_client();
        deliver(
            &http,
            &storage,
            &target(format!("{}/hook", server.url()), None),
            sample_payload(),
            &[0; 5],
        )
        .await;

        let logs = storage.get_webhook_logs(1, 10).await.unwrap();
        for log in logs {
            let value: serde_json::Value = serde_json::from_str(&log.payload_json).unwrap();
            assert_eq!(
                value["metadata"]["delivery_attempt"],
                serde_json::json!(log.attempt_count)
            );
        }
    }

    #[tokio::test]
    async fn oversized_response_bodies_are_cut_at_1024_bytes() {
        let storage = Storage::in_memory().await.unwrap();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(500)
            .with_body("x".repeat(2048))
            .expect(5)
            .create_async()
            .await;

        let http = build_http_client();
        deliver(
            &http,
            &storage,
            &target(format!("{}/hook", server.url()), None),
            sample_payload(),
            &[0; 5],
        )
        .await;

        let logs = storage.get_webhook_logs(1, 10).await.unwrap();
        assert!(logs.iter().all(|l| l.response_body.len() == 1024));
    }

    #[tokio::test]
    async fn network_errors_log_status_zero() {
        let storage = Storage::in_memory().await.unwrap();
        // Nothing listens here; connections fail immediately.
        let http = build_http_client();
        deliver(
            &http,
            &storage,
            &target("http://127.0.0.1:1/hook".into(), None),
            sample_payload(),
            &[0; 5],
        )
        .await;

        let logs = storage.get_webhook_logs(1, 10).await.unwrap();
        assert_eq!(logs.len(), 5);
        assert!(logs.iter().all(|l| l.response_status == 0));
        assert!(logs.iter().all(|l| !l.response_body.is_empty()));
    }

    #[tokio::test]
    async fn unsigned_configs_send_no_signature_header() {
        let storage = Storage::in_memory().await.unwrap();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("x-webhook-signature", mockito::Matcher::Missing)
            .with_status(204)
            .create_async()
            .await;

        let http = build_http_client();
        deliver(
            &http,
            &storage,
            &target(format!("{}/hook", server.url()), None),
            sample_payload(),
            &[0; 5],
        )
        .await;

        mock.assert_async().await;
        let logs = storage.get_webhook_logs(1, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        // 204 is inside [200, 300).
        assert!(logs[0].delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_send_is_one_shot_and_unlogged() {
        let storage = Storage::in_memory().await.unwrap();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .with_body("nope")
            .expect(1)
            .create_async()
            .await;

        let config = WebhookConfig {
            id: 9,
            name: "t".into(),
            target_url: format!("{}/hook", server.url()),
            secret: None,
            enabled: true,
            created_at: 0,
            updated_at: 0,
            triggers: Vec::new(),
        };
        let http = build_http_client();
        let outcome = send_test(
            &http,
            &target(config.target_url.clone(), None),
            &payload::test_payload(&config),
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert!(!outcome.success);
        assert_eq!(outcome.status, 500);
        assert_eq!(outcome.response_body, "nope");
        // No log row for test sends.
        assert!(storage.get_webhook_logs(0, 10).await.unwrap().is_empty());
    }
}
