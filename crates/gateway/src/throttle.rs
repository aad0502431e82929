//! Per-IP fixed-window rate limiting.
//!
//! Windows are reset lazily on access; stale buckets are swept every few
//! hundred requests rather than on a timer.

use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    axum::{
        extract::{ConnectInfo, State},
        http::StatusCode,
        middleware::Next,
        response::{IntoResponse, Json, Response},
    },
    dashmap::{DashMap, mapref::entry::Entry},
    hermod_common::audit::{AuditEvent, AuditKind, AuditStatus},
};

use crate::state::AppState;

const CLEANUP_EVERY_REQUESTS: u64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ThrottleScope {
    Pair,
    Api,
}

impl ThrottleScope {
    fn from_path(path: &str) -> Option<Self> {
        if path.starts_with("/api/pair/") {
            return Some(Self::Pair);
        }
        if path.starts_with("/api/") {
            return Some(Self::Api);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ThrottleKey {
    ip: IpAddr,
    scope: ThrottleScope,
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    started_at: Instant,
    count: usize,
}

#[derive(Debug, Clone, Copy)]
struct RateLimit {
    max_requests: usize,
    window: Duration,
}

#[derive(Debug, Clone, Copy)]
struct ThrottleLimits {
    pair: RateLimit,
    api: RateLimit,
}

impl Default for ThrottleLimits {
    fn default() -> Self {
        Self {
            // Pairing endpoints talk to the platform; keep them scarce.
            pair: RateLimit {
                max_requests: 10,
                window: Duration::from_secs(60),
            },
            api: RateLimit {
                max_requests: 120,
                window: Duration::from_secs(60),
            },
        }
    }
}

enum ThrottleDecision {
    Allowed,
    Denied { retry_after: Duration },
}

pub struct RequestThrottle {
    limits: ThrottleLimits,
    buckets: Arc<DashMap<ThrottleKey, WindowState>>,
    requests_seen: Arc<AtomicU64>,
}

impl RequestThrottle {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(ThrottleLimits::default())
    }

    fn with_limits(limits: ThrottleLimits) -> Self {
        Self {
            limits,
            buckets: Arc::new(DashMap::new()),
            requests_seen: Arc::new(AtomicU64::new(0)),
        }
    }

    fn limit_for(&self, scope: ThrottleScope) -> RateLimit {
        match scope {
            ThrottleScope::Pair => self.limits.pair,
            ThrottleScope::Api => self.limits.api,
        }
    }

    fn check(&self, ip: IpAddr, scope: ThrottleScope) -> ThrottleDecision {
        self.check_at(ip, scope, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, scope: ThrottleScope, now: Instant) -> ThrottleDecision {
        let limit = self.limit_for(scope);
        let key = ThrottleKey { ip, scope };

        let decision = match self.buckets.entry(key) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                let elapsed = now.duration_since(state.started_at);
                if elapsed >= limit.window {
                    state.started_at = now;
                    state.count = 1;
                    ThrottleDecision::Allowed
                } else if state.count < limit.max_requests {
                    state.count += 1;
                    ThrottleDecision::Allowed
                } else {
                    ThrottleDecision::Denied {
                        retry_after: limit.window.saturating_sub(elapsed),
                    }
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(WindowState {
                    started_at: now,
                    count: 1,
                });
                ThrottleDecision::Allowed
            },
        };

        self.cleanup_if_needed(now);
        decision
    }

    fn cleanup_if_needed(&self, now: Instant) {
        let seen = self.requests_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if !seen.is_multiple_of(CLEANUP_EVERY_REQUESTS) {
            return;
        }
        let stale_after = self
            .limits
            .pair
            .window
            .max(self.limits.api.window)
            .saturating_mul(3);
        self.buckets
            .retain(|_, state| now.duration_since(state.started_at) <= stale_after);
    }
}

impl Default for RequestThrottle {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn throttle_gate(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let Some(scope) = ThrottleScope::from_path(&path) else {
        return next.run(request).await;
    };

    match state.throttle.check(addr.ip(), scope) {
        ThrottleDecision::Allowed => next.run(request).await,
        ThrottleDecision::Denied { retry_after } => {
            state.audit.emit(
                AuditEvent::new(
                    AuditKind::RateLimitExceeded,
                    path,
                    "api_request",
                    AuditStatus::Blocked,
                )
                .client_ip(addr.ip().to_string()),
            );
            rate_limited_response(retry_after)
        },
    }
}

fn rate_limited_response(retry_after: Duration) -> Response {
    let retry_after_secs = retry_after.as_secs().max(1);
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "too many requests",
            "retry_after_seconds": retry_after_secs
        })),
    )
        .into_response();

    if let Ok(value) = retry_after_secs.to_string().parse() {
        response
            .headers_mut()
            .insert(axum::http::header::RETRY_AFTER, value);
    }
    response
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_paths() {
        assert_eq!(
            ThrottleScope::from_path("/api/pair/phone"),
            Some(ThrottleScope::Pair)
        );
        assert_eq!(
            ThrottleScope::from_path("/api/webhooks"),
            Some(ThrottleScope::Api)
        );
        assert_eq!(ThrottleScope::from_path("/health"), None);
    }

    #[test]
    fn window_limits_requests_and_resets_lazily() {
        let throttle = RequestThrottle::with_limits(ThrottleLimits {
            pair: RateLimit {
                max_requests: 2,
                window: Duration::from_secs(10),
            },
            api: RateLimit {
                max_requests: 100,
                window: Duration::from_secs(10),
            },
        });

        let ip = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        let now = Instant::now();

        assert!(matches!(
            throttle.check_at(ip, ThrottleScope::Pair, now),
            ThrottleDecision::Allowed
        ));
        assert!(matches!(
            throttle.check_at(ip, ThrottleScope::Pair, now),
            ThrottleDecision::Allowed
        ));

        match throttle.check_at(ip, ThrottleScope::Pair, now) {
            ThrottleDecision::Denied { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(10));
            },
            ThrottleDecision::Allowed => panic!("expected the third request to be throttled"),
        }

        // The expired window is reset on the next access.
        assert!(matches!(
            throttle.check_at(ip, ThrottleScope::Pair, now + Duration::from_secs(11)),
            ThrottleDecision::Allowed
        ));
    }

    #[test]
    fn scopes_and_ips_are_isolated() {
        let throttle = RequestThrottle::with_limits(ThrottleLimits {
            pair: RateLimit {
                max_requests: 1,
                window: Duration::from_secs(10),
            },
            api: RateLimit {
                max_requests: 1,
                window: Duration::from_secs(10),
            },
        });

        let a = IpAddr::V4(std::net::Ipv4Addr::new(203, 0, 113, 1));
        let b = IpAddr::V4(std::net::Ipv4Addr::new(203, 0, 113, 2));
        let now = Instant::now();

        assert!(matches!(
            throttle.check_at(a, ThrottleScope::Api, now),
            ThrottleDecision::Allowed
        ));
        // Same IP, different scope: its own bucket.
        assert!(matches!(
            throttle.check_at(a, ThrottleScope::Pair, now),
            ThrottleDecision::Allowed
        ));
        // Different IP: unaffected.
        assert!(matches!(
            throttle.check_at(b, ThrottleScope::Api, now),
            ThrottleDecision::Allowed
        ));
        assert!(matches!(
            throttle.check_at(a, ThrottleScope::Api, now),
            ThrottleDecision::Denied { .. }
        ));
    }
}
