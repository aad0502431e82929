//! Platform event ingestion.
//!
//! One long-running task consumes the transport's event feed: live messages
//! and history backfills are normalized and written through storage, and
//! live messages are additionally handed to an optional [`MessageSink`]
//! without ever blocking the dispatch loop. Connection events feed the
//! client wrapper's bookkeeping.

mod extract;
mod resolve;

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use {
    async_trait::async_trait,
    chrono::Utc,
    hermod_platform::{
        BridgeClient, ChatAddress, HistorySync, IncomingMessage, PlatformEvent, Presence,
    },
    hermod_storage::{Storage, StoredMessage},
    tokio::sync::broadcast,
    tracing::{debug, info, warn},
};

/// Force a reconnect cycle after this many keepalive timeouts in a row.
const MAX_KEEPALIVE_TIMEOUTS: u32 = 3;

/// Subscriber for live inbound messages. The ingestion loop depends only on
/// this trait; the concrete webhook engine is wired in at construction time.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn on_message(&self, message: StoredMessage, chat_name: String, push_name: String);
}

/// The ingestion task. Create one, then spawn [`Ingestor::run`].
pub struct Ingestor {
    storage: Arc<Storage>,
    client: Arc<BridgeClient>,
    sink: Option<Arc<dyn MessageSink>>,
    keepalive_timeouts: AtomicU32,
}

impl Ingestor {
    pub fn new(storage: Arc<Storage>, client: Arc<BridgeClient>) -> Self {
        Self {
            storage,
            client,
            sink: None,
            keepalive_timeouts: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Consume the event feed until it closes.
    pub async fn run(self: Arc<Self>) {
        let mut events = self.client.subscribe();
        loop {
            match events.recv().await {
                Ok(event) => self.handle_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event feed lagged, messages were dropped");
                },
                Err(broadcast::error::RecvError::Closed) => {
                    info!("event feed closed, ingestion stopping");
                    return;
                },
            }
        }
    }

    pub async fn handle_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::Message(message) => self.handle_live_message(message).await,
            PlatformEvent::HistorySync(sync) => self.handle_history_sync(sync).await,
            PlatformEvent::Connected => {
                info!("platform session connected");
                self.client.mark_connected();
                self.keepalive_timeouts.store(0, Ordering::Relaxed);
                // Session-refresh hint; failures are logged, never fatal.
                let client = Arc::clone(&self.client);
                tokio::spawn(async move {
                    if let Err(e) = client.send_presence(Presence::Available).await {
                        debug!(error = %e, "presence refresh after connect failed");
                    }
                });
            },
            PlatformEvent::Disconnected => {
                warn!("platform session disconnected");
                self.client.mark_disconnected();
            },
            PlatformEvent::LoggedOut => {
                warn!("device was logged out by the platform");
                self.client.mark_disconnected();
            },
            PlatformEvent::QrCode(_) => {
                // Consumed by the QR pairing flow.
            },
            PlatformEvent::PairSuccess => {
                info!("pairing completed");
                self.client.note_pair_success().await;
            },
            PlatformEvent::PairError { reason } => {
                warn!(reason = %reason, "pairing failed");
                self.client.note_pair_error(&reason).await;
            },
            PlatformEvent::KeepAliveTimeout => {
                let count = self.keepalive_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(consecutive = count, "platform keepalive timed out");
                if count >= MAX_KEEPALIVE_TIMEOUTS {
                    self.keepalive_timeouts.store(0, Ordering::Relaxed);
                    warn!("keepalive timeouts exceeded threshold, forcing reconnect");
                    if let Err(e) = self.client.force_reconnect().await {
                        warn!(error = %e, "forced reconnect failed");
                    }
                }
            },
            PlatformEvent::StreamError { message } => {
                warn!(message = %message, "platform stream error");
            },
        }
    }

    async fn handle_live_message(&self, message: IncomingMessage) {
        self.keepalive_timeouts.store(0, Ordering::Relaxed);

        let Some(sender) = message.sender.clone() else {
            warn!(id = %message.id, chat = %message.chat, "live message without sender, dropping");
            return;
        };
        let timestamp = message
            .timestamp
            .unwrap_or_else(|| Utc::now().timestamp());

        let chat_name = resolve::resolve_chat_name(
            &self.storage,
            &self.client,
            &message.chat,
            None,
            &message.push_name,
        )
        .await;

        if let Err(e) = self
            .storage
            .store_chat(&message.chat.to_string(), &chat_name, timestamp)
            .await
        {
            warn!(chat = %message.chat, error = %e, "failed to store chat");
        }

        let Some(stored) =
            extract::build_stored(&message, &sender, &message.push_name, timestamp)
        else {
            debug!(id = %message.id, "message has neither text nor media, skipping");
            return;
        };

        if let Err(e) = self.storage.store_message(&stored).await {
            warn!(id = %stored.id, error = %e, "failed to store message");
        }

        if let Some(sink) = &self.sink {
            let sink = Arc::clone(sink);
            let push_name = message.push_name.clone();
            tokio::spawn(async move {
                sink.on_message(stored, chat_name, push_name).await;
            });
        }
    }

    async fn handle_history_sync(&self, sync: HistorySync) {
        info!(
            conversations = sync.conversations.len(),
            "processing history sync"
        );

        for conv in &sync.conversations {
            let chat: ChatAddress = match conv.address.parse() {
                Ok(address) => address,
                Err(e) => {
                    warn!(address = %conv.address, error = %e, "skipping conversation with malformed address");
                    continue;
                },
            };

            let chat_name = resolve::resolve_chat_name(
                &self.storage,
                &self.client,
                &chat,
                Some(conv),
                "",
            )
            .await;

            if let Some(latest) = conv.messages.iter().filter_map(|m| m.timestamp).max()
                && let Err(e) = self
                    .storage
                    .store_chat(&chat.to_string(), &chat_name, latest)
                    .await
            {
                warn!(chat = %chat, error = %e, "failed to store chat from history");
            }

            for message in &conv.messages {
                let Some(timestamp) = message.timestamp else {
                    debug!(id = %message.id, "history message without timestamp, skipping");
                    continue;
                };

                // The platform sometimes omits the original sender of a
                // historic group message. Substitute the group address and
                // leave the display name empty so the two cases stay
                // distinguishable downstream.
                let (sender, display_name) = match &message.sender {
                    Some(sender) => (sender.clone(), message.push_name.as_str()),
                    None => (chat.clone(), ""),
                };

                let Some(stored) =
                    extract::build_stored(message, &sender, display_name, timestamp)
                else {
                    continue;
                };

                if let Err(e) = self.storage.store_message(&stored).await {
                    warn!(id = %stored.id, error = %e, "failed to store history message");
                }
            }
        }
    }
}
