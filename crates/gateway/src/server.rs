//! Composition root and HTTP server.

use std::{net::SocketAddr, sync::Arc};

use {
    anyhow::Context,
    axum::{
        Json, Router,
        extract::State,
        http::{HeaderValue, Method, StatusCode},
        middleware,
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    hermod_common::audit::AuditLog,
    hermod_config::Settings,
    hermod_ingest::{Ingestor, MessageSink},
    hermod_platform::{
        BridgeClient, HistoryPrefs, MediaPathGuard, PlatformTransport, sidecar::SidecarTransport,
    },
    hermod_storage::Storage,
    hermod_webhooks::{WebhookManager, WebhookOptions},
    tower_http::cors::{AllowOrigin, CorsLayer},
    tracing::{info, warn},
};

use crate::{
    auth, group_routes, message_routes, pair_routes, send_routes, state::AppState, supervisor,
    throttle, throttle::RequestThrottle, webhook_routes,
};

/// Build the bridge and serve until shutdown. Any error here is fatal for
/// startup and must exit the process with a non-zero status.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    settings.validate().context("configuration invalid")?;
    let settings = Arc::new(settings);
    let audit = AuditLog::new();

    let storage = Arc::new(
        Storage::open(&settings.store_dir)
            .await
            .context("opening the embedded store")?,
    );

    let transport: Arc<dyn PlatformTransport> =
        Arc::new(SidecarTransport::new(settings.sidecar_url.clone()));
    let media_guard = MediaPathGuard::new(
        settings.media_allowed_roots.clone(),
        !settings.disable_path_check,
    );
    let client = BridgeClient::new(Arc::clone(&transport), media_guard, None);

    // History preferences must reach the platform before a device session
    // is created.
    client
        .apply_history_prefs(HistoryPrefs {
            days_limit: settings.history_sync_days_limit,
            size_mb: settings.history_sync_size_mb,
            storage_quota_mb: settings.storage_quota_mb,
        })
        .await
        .ok();

    let webhooks = WebhookManager::new(
        Arc::clone(&storage),
        Arc::clone(&client),
        audit.clone(),
        WebhookOptions {
            download_url_base: settings.download_url_base.clone(),
            ssrf_check: !settings.disable_ssrf_check,
        },
    )
    .await
    .context("loading webhook configuration")?;

    let ingestor = Arc::new(
        Ingestor::new(Arc::clone(&storage), Arc::clone(&client))
            .with_sink(Arc::clone(&webhooks) as Arc<dyn MessageSink>),
    );
    tokio::spawn(Arc::clone(&ingestor).run());

    if let Err(e) = client.connect().await {
        // Not fatal: the watchdog bounds how long we run disconnected.
        warn!(error = %e, "initial platform connection failed");
    }

    supervisor::spawn_all(Arc::clone(&client));

    {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            supervisor::shutdown_signal().await;
            info!("shutdown signal received, disconnecting");
            client.disconnect().await;
            std::process::exit(0);
        });
    }

    let state = AppState {
        settings: Arc::clone(&settings),
        storage,
        client,
        webhooks,
        throttle: Arc::new(RequestThrottle::new()),
        audit,
    };

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.api_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "bridge API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("serving HTTP")?;
    Ok(())
}

/// Explicit route table. `/health` stays open; everything under `/api` is
/// behind the throttle and API-key gates.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/send", post(send_routes::send_message))
        .route("/api/reaction", post(message_routes::send_reaction))
        .route("/api/edit", post(message_routes::edit_message))
        .route("/api/revoke", post(message_routes::revoke_message))
        .route("/api/poll", post(message_routes::create_poll))
        .route("/api/markread", post(message_routes::mark_read))
        .route("/api/chatstate", post(message_routes::send_chat_state))
        .route("/api/presence", post(message_routes::send_presence))
        .route("/api/history/request", post(message_routes::request_history))
        .route("/api/chats", get(message_routes::list_chats))
        .route("/api/messages", get(message_routes::list_messages))
        .route("/api/group", post(group_routes::create_group))
        .route(
            "/api/group/participants",
            post(group_routes::update_participants),
        )
        .route("/api/group/leave", post(group_routes::leave_group))
        .route("/api/group/{group}", get(group_routes::group_info))
        .route("/api/block", post(group_routes::set_blocked))
        .route(
            "/api/newsletter/follow",
            post(group_routes::follow_newsletter),
        )
        .route(
            "/api/webhooks",
            get(webhook_routes::list).post(webhook_routes::create),
        )
        .route("/api/webhooks/logs", get(webhook_routes::logs))
        .route(
            "/api/webhooks/{id}",
            get(webhook_routes::get_one)
                .put(webhook_routes::update)
                .delete(webhook_routes::delete),
        )
        .route("/api/webhooks/{id}/test", post(webhook_routes::test))
        .route("/api/webhooks/{id}/enable", post(webhook_routes::enable))
        .route("/api/webhooks/{id}/disable", post(webhook_routes::disable))
        .route("/api/pair/phone", post(pair_routes::start_phone_pairing))
        .route("/api/pair/status", get(pair_routes::pairing_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            throttle::throttle_gate,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .merge(api)
        .layer(cors_layer(&state.settings))
        .with_state(state)
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static(auth::API_KEY_HEADER),
        ])
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// 200 with sync stats while connected, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.client.connection_snapshot();
    let messages = state.storage.count_messages().await.unwrap_or(0);
    let chats = state.storage.count_chats().await.unwrap_or(0);
    let latest = state
        .storage
        .latest_message_timestamp()
        .await
        .unwrap_or(None);

    let body = serde_json::json!({
        "connected": snapshot.connected,
        "uptime_seconds": snapshot.uptime_seconds,
        "last_connected_time": snapshot.last_connected_time,
        "down_for_seconds": snapshot.down_for_seconds,
        "messages": messages,
        "chats": chats,
        "latest_message_time": latest,
    });

    let status = if snapshot.connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}
