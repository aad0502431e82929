use std::sync::Arc;

use {
    hermod_common::audit::AuditLog, hermod_config::Settings, hermod_platform::BridgeClient,
    hermod_storage::Storage, hermod_webhooks::WebhookManager,
};

use crate::throttle::RequestThrottle;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub storage: Arc<Storage>,
    pub client: Arc<BridgeClient>,
    pub webhooks: Arc<WebhookManager>,
    pub throttle: Arc<RequestThrottle>,
    pub audit: AuditLog,
}
