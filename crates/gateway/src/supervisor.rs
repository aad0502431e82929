//! Long-running lifecycle loops: the disconnection watchdog, the periodic
//! presence ping, and an informational stats tick.
//!
//! The watchdog deliberately terminates the whole process after a sustained
//! outage instead of attempting deep recovery; the surrounding orchestrator
//! is expected to restart it.

use std::{sync::Arc, time::Duration};

use {
    hermod_platform::{BridgeClient, Presence},
    tracing::{debug, error, info},
};

pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(30);

/// How long the link may stay down before the process exits.
pub const MAX_DOWNTIME: Duration = Duration::from_secs(3 * 60);

pub const PRESENCE_INTERVAL: Duration = Duration::from_secs(3 * 60);

pub const STATS_INTERVAL: Duration = Duration::from_secs(30);

pub fn spawn_all(client: Arc<BridgeClient>) {
    tokio::spawn(watchdog(Arc::clone(&client)));
    tokio::spawn(presence_loop(Arc::clone(&client)));
    tokio::spawn(stats_loop(client));
}

/// Whether a given outage duration warrants termination.
#[must_use]
pub fn should_terminate(down_for: Option<Duration>) -> bool {
    down_for.is_some_and(|d| d > MAX_DOWNTIME)
}

async fn watchdog(client: Arc<BridgeClient>) {
    let mut interval = tokio::time::interval(WATCHDOG_INTERVAL);
    interval.tick().await; // immediate first tick
    loop {
        interval.tick().await;
        let snapshot = client.connection_snapshot();
        let down_for = snapshot.down_for_seconds.map(Duration::from_secs);
        if should_terminate(down_for) {
            error!(
                down_for_seconds = snapshot.down_for_seconds,
                "platform connection lost beyond the recovery window, exiting for external restart"
            );
            std::process::exit(1);
        }
    }
}

async fn presence_loop(client: Arc<BridgeClient>) {
    let mut interval = tokio::time::interval(PRESENCE_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        if !client.is_connected() {
            continue;
        }
        if let Err(e) = client.send_presence(Presence::Available).await {
            debug!(error = %e, "periodic presence ping failed");
        }
    }
}

async fn stats_loop(client: Arc<BridgeClient>) {
    let mut interval = tokio::time::interval(STATS_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        let snapshot = client.connection_snapshot();
        debug!(
            connected = snapshot.connected,
            uptime_seconds = snapshot.uptime_seconds,
            reconnect_errors = snapshot.reconnect_errors,
            has_identity = client.has_identity(),
            "bridge stats"
        );
    }
}

/// Wait for SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            info!("ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(_) => {
                ctrl_c.await;
                return;
            },
        };
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_threshold_is_three_minutes() {
        assert!(!should_terminate(None));
        assert!(!should_terminate(Some(Duration::from_secs(0))));
        assert!(!should_terminate(Some(Duration::from_secs(179))));
        assert!(!should_terminate(Some(MAX_DOWNTIME)));
        assert!(should_terminate(Some(Duration::from_secs(181))));
    }
}
