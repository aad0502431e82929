//! Transport implementation over the platform sidecar.
//!
//! The vendor protocol (encryption, session store, retransmits) runs in a
//! separate sidecar process; we speak line-oriented JSON to it over a local
//! WebSocket. Commands that expect an answer carry a request id and are
//! matched to their response through a oneshot table; everything the
//! platform pushes at us arrives as an event frame and is fanned out on the
//! broadcast feed.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex as StdMutex, RwLock as StdRwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    chrono::Utc,
    futures::{SinkExt, StreamExt},
    serde::{Deserialize, Serialize},
    tokio::sync::{Mutex, broadcast, oneshot},
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, error, warn},
};

use crate::{
    address::ChatAddress,
    error::{Error, Result},
    media::VoiceNoteMeta,
    transport::{
        ChatState, GroupInfo, HistoryConversation, HistoryPrefs, HistorySync, IncomingMessage,
        MediaPart, MediaUpload, MessageContent, ParticipantAction, PlatformEvent,
        PlatformTransport, Presence, ReconnectHook, SendReceipt,
    },
};

use hermod_common::types::MediaKind;

/// Delay between redial attempts after the sidecar socket drops.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// How long to wait for the sidecar to answer a single request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, Message>;
type WsSource = futures::stream::SplitStream<WsStream>;

// ── Wire protocol ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command<'a> {
    Login,
    Logout,
    HistoryPrefs {
        days_limit: Option<u32>,
        size_mb: Option<u32>,
        storage_quota_mb: Option<u32>,
    },
    PairCode {
        id: &'a str,
        phone: &'a str,
    },
    SendText {
        id: &'a str,
        to: String,
        text: &'a str,
    },
    SendReaction {
        id: &'a str,
        to: String,
        message_id: &'a str,
        emoji: &'a str,
    },
    EditMessage {
        id: &'a str,
        to: String,
        message_id: &'a str,
        text: &'a str,
    },
    RevokeMessage {
        id: &'a str,
        to: String,
        message_id: &'a str,
    },
    CreatePoll {
        id: &'a str,
        to: String,
        question: &'a str,
        options: &'a [String],
        selectable: u32,
    },
    MarkRead {
        id: &'a str,
        chat: String,
        sender: String,
        message_ids: &'a [String],
    },
    SetPresence {
        id: &'a str,
        presence: &'a str,
    },
    ChatState {
        id: &'a str,
        to: String,
        state: &'a str,
    },
    GroupInfo {
        id: &'a str,
        group: String,
    },
    CreateGroup {
        id: &'a str,
        subject: &'a str,
        participants: Vec<String>,
    },
    GroupParticipants {
        id: &'a str,
        group: String,
        members: Vec<String>,
        action: &'a str,
    },
    LeaveGroup {
        id: &'a str,
        group: String,
    },
    SetBlocked {
        id: &'a str,
        contact: String,
        blocked: bool,
    },
    FollowNewsletter {
        id: &'a str,
        newsletter: String,
        follow: bool,
    },
    RequestHistory {
        id: &'a str,
        count: u32,
    },
    SendMedia {
        id: &'a str,
        to: String,
        kind: &'a str,
        filename: &'a str,
        mime_type: &'a str,
        caption: &'a str,
        bytes_b64: String,
        voice: Option<WireVoice>,
    },
    ContactName {
        id: &'a str,
        contact: String,
    },
}

#[derive(Debug, Serialize)]
struct WireVoice {
    duration_seconds: u32,
    waveform_b64: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WireEvent {
    /// Sent by the sidecar right after login with the stored-identity state.
    Session {
        has_identity: bool,
    },
    Qr {
        code: String,
    },
    PairSuccess,
    PairError {
        #[serde(default)]
        reason: String,
    },
    Connected,
    Disconnected,
    LoggedOut,
    KeepAliveTimeout,
    StreamError {
        #[serde(default)]
        message: String,
    },
    Message(WireMessage),
    HistorySync {
        conversations: Vec<WireConversation>,
    },
    Response(WireResponse),
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    chat: String,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    push_name: String,
    #[serde(default)]
    is_from_me: bool,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    extended_text: Option<String>,
    #[serde(default)]
    media: Option<WireMedia>,
}

#[derive(Debug, Deserialize)]
struct WireMedia {
    kind: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    media_key_b64: String,
    #[serde(default)]
    sha256_b64: String,
    #[serde(default)]
    enc_sha256_b64: String,
    #[serde(default)]
    length: u64,
}

#[derive(Debug, Deserialize)]
struct WireConversation {
    address: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: String,
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    participant_count: Option<usize>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    contact_name: Option<String>,
}

// ── Transport ───────────────────────────────────────────────────────────────

struct Shared {
    url: String,
    events: broadcast::Sender<PlatformEvent>,
    writer: Mutex<Option<WsSink>>,
    socket_up: AtomicBool,
    session_connected: AtomicBool,
    has_identity: AtomicBool,
    shutdown: AtomicBool,
    /// Bumped by every explicit `connect`; a socket task whose generation
    /// is stale stops instead of redialing over a newer task.
    generation: AtomicU64,
    hook: StdRwLock<Option<ReconnectHook>>,
    pending: StdMutex<HashMap<String, oneshot::Sender<WireResponse>>>,
    history_prefs: StdMutex<HistoryPrefs>,
}

/// [`PlatformTransport`] over the sidecar WebSocket.
pub struct SidecarTransport {
    shared: Arc<Shared>,
}

impl SidecarTransport {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                events,
                writer: Mutex::new(None),
                socket_up: AtomicBool::new(false),
                session_connected: AtomicBool::new(false),
                has_identity: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                hook: StdRwLock::new(None),
                pending: StdMutex::new(HashMap::new()),
                history_prefs: StdMutex::new(HistoryPrefs::default()),
            }),
        }
    }

    async fn request(&self, id: String, command: Command<'_>) -> Result<WireResponse> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id.clone(), tx);

        if let Err(e) = self.shared.write_frame(&command).await {
            self.shared
                .pending
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) if response.ok => Ok(response),
            Ok(Ok(response)) => Err(Error::platform_message(
                response
                    .error
                    .unwrap_or_else(|| "sidecar rejected the request".to_string()),
            )),
            Ok(Err(_)) => Err(Error::platform_message(
                "sidecar connection dropped before answering",
            )),
            Err(_) => {
                self.shared
                    .pending
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .remove(&id);
                Err(Error::platform_message("sidecar request timed out"))
            },
        }
    }
}

impl Shared {
    async fn write_frame(&self, command: &Command<'_>) -> Result<()> {
        let json = serde_json::to_string(command)
            .map_err(|e| Error::platform("encoding sidecar command", e))?;
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(sink) => sink
                .send(Message::text(json))
                .await
                .map_err(|e| Error::platform("writing to sidecar socket", e)),
            None => Err(Error::NotConnected),
        }
    }

    /// Commands re-issued every time the socket comes up: history
    /// preferences first (they must precede device creation), then login.
    async fn send_bootstrap(&self) -> Result<()> {
        let prefs = *self.history_prefs.lock().unwrap_or_else(|p| p.into_inner());
        self.write_frame(&Command::HistoryPrefs {
            days_limit: prefs.days_limit,
            size_mb: prefs.size_mb,
            storage_quota_mb: prefs.storage_quota_mb,
        })
        .await?;
        self.write_frame(&Command::Login).await
    }

    fn handle_frame(&self, text: &str) {
        let event = match serde_json::from_str::<WireEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "unrecognized sidecar frame");
                return;
            },
        };

        match event {
            WireEvent::Session { has_identity } => {
                self.has_identity.store(has_identity, Ordering::SeqCst);
            },
            WireEvent::Qr { code } => {
                let _ = self.events.send(PlatformEvent::QrCode(code));
            },
            WireEvent::PairSuccess => {
                self.has_identity.store(true, Ordering::SeqCst);
                let _ = self.events.send(PlatformEvent::PairSuccess);
            },
            WireEvent::PairError { reason } => {
                let _ = self.events.send(PlatformEvent::PairError { reason });
            },
            WireEvent::Connected => {
                self.session_connected.store(true, Ordering::SeqCst);
                self.has_identity.store(true, Ordering::SeqCst);
                let _ = self.events.send(PlatformEvent::Connected);
            },
            WireEvent::Disconnected => {
                self.session_connected.store(false, Ordering::SeqCst);
                let _ = self.events.send(PlatformEvent::Disconnected);
            },
            WireEvent::LoggedOut => {
                self.session_connected.store(false, Ordering::SeqCst);
                self.has_identity.store(false, Ordering::SeqCst);
                let _ = self.events.send(PlatformEvent::LoggedOut);
            },
            WireEvent::KeepAliveTimeout => {
                let _ = self.events.send(PlatformEvent::KeepAliveTimeout);
            },
            WireEvent::StreamError { message } => {
                let _ = self.events.send(PlatformEvent::StreamError { message });
            },
            WireEvent::Message(wire) => match into_incoming(wire) {
                Some(message) => {
                    let _ = self.events.send(PlatformEvent::Message(message));
                },
                None => warn!("dropping inbound message with malformed chat address"),
            },
            WireEvent::HistorySync { conversations } => {
                let sync = HistorySync {
                    conversations: conversations.into_iter().map(into_conversation).collect(),
                };
                let _ = self.events.send(PlatformEvent::HistorySync(sync));
            },
            WireEvent::Response(response) => {
                let waiter = self
                    .pending
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .remove(&response.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    },
                    None => debug!(id = %response.id, "response for unknown request"),
                }
            },
        }
    }

    /// Drop every in-flight request; their callers get a dropped-connection
    /// error from the oneshot.
    fn fail_pending(&self) {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

fn into_incoming(wire: WireMessage) -> Option<IncomingMessage> {
    let chat: ChatAddress = wire.chat.parse().ok()?;
    let sender = match wire.sender {
        Some(raw) => match raw.parse() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!(sender = %raw, error = %e, "inbound message sender unparseable");
                None
            },
        },
        None => None,
    };

    let media = wire.media.and_then(|m| {
        let kind = match MediaKind::parse(&m.kind) {
            Some(kind) => kind,
            None => {
                debug!(kind = %m.kind, "ignoring unsupported media kind");
                return None;
            },
        };
        Some(MediaPart {
            kind,
            filename: m.filename,
            url: m.url,
            media_key: BASE64.decode(&m.media_key_b64).unwrap_or_default(),
            sha256: BASE64.decode(&m.sha256_b64).unwrap_or_default(),
            enc_sha256: BASE64.decode(&m.enc_sha256_b64).unwrap_or_default(),
            length: m.length,
        })
    });

    Some(IncomingMessage {
        id: wire.id,
        chat,
        sender,
        push_name: wire.push_name,
        is_from_me: wire.is_from_me,
        timestamp: wire.timestamp,
        content: MessageContent {
            conversation: wire.text,
            extended_text: wire.extended_text,
            media,
        },
    })
}

fn into_conversation(wire: WireConversation) -> HistoryConversation {
    let messages = wire
        .messages
        .into_iter()
        .filter_map(into_incoming)
        .collect();
    HistoryConversation::new(wire.address, wire.display_name, wire.name, messages)
}

/// Drains the socket, reconnecting with the decision hook in the loop until
/// shut down, superseded by a newer connect, or the hook gives up.
async fn socket_task(shared: Arc<Shared>, mut read: WsSource, generation: u64) {
    let stale = |shared: &Shared| {
        shared.shutdown.load(Ordering::SeqCst)
            || shared.generation.load(Ordering::SeqCst) != generation
    };

    loop {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => shared.handle_frame(text.as_str()),
                Ok(Message::Close(_)) => break,
                Ok(_) => {},
                Err(e) => {
                    warn!(error = %e, "sidecar socket error");
                    break;
                },
            }
        }

        if stale(&shared) {
            return;
        }

        shared.socket_up.store(false, Ordering::SeqCst);
        shared.session_connected.store(false, Ordering::SeqCst);
        *shared.writer.lock().await = None;
        shared.fail_pending();
        let _ = shared.events.send(PlatformEvent::Disconnected);

        loop {
            tokio::time::sleep(RECONNECT_DELAY).await;
            if stale(&shared) {
                return;
            }
            match connect_async(shared.url.as_str()).await {
                Ok((stream, _)) => {
                    let (sink, new_read) = stream.split();
                    *shared.writer.lock().await = Some(sink);
                    shared.socket_up.store(true, Ordering::SeqCst);
                    if let Err(e) = shared.send_bootstrap().await {
                        warn!(error = %e, "sidecar bootstrap after reconnect failed");
                    }
                    read = new_read;
                    break;
                },
                Err(e) => {
                    debug!(error = %e, "sidecar reconnect attempt failed");
                    let retry = {
                        let hook = shared.hook.read().unwrap_or_else(|p| p.into_inner());
                        hook.as_ref().map(|h| h()).unwrap_or(true)
                    };
                    if !retry {
                        error!("reconnect attempts exhausted, leaving recovery to the watchdog");
                        return;
                    }
                },
            }
        }
    }
}

#[async_trait]
impl PlatformTransport for SidecarTransport {
    async fn connect(&self) -> Result<()> {
        if self.shared.socket_up.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.shutdown.store(false, Ordering::SeqCst);

        let (stream, _) = connect_async(self.shared.url.as_str())
            .await
            .map_err(|e| Error::platform("connecting to platform sidecar", e))?;
        let (sink, read) = stream.split();
        *self.shared.writer.lock().await = Some(sink);
        self.shared.socket_up.store(true, Ordering::SeqCst);

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(socket_task(Arc::clone(&self.shared), read, generation));

        self.shared.send_bootstrap().await
    }

    async fn disconnect(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.session_connected.store(false, Ordering::SeqCst);
        self.shared.socket_up.store(false, Ordering::SeqCst);
        let mut writer = self.shared.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            let _ = sink.close().await;
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.session_connected.load(Ordering::SeqCst)
    }

    fn has_identity(&self) -> bool {
        self.shared.has_identity.load(Ordering::SeqCst)
    }

    fn set_reconnect_hook(&self, hook: ReconnectHook) {
        *self.shared.hook.write().unwrap_or_else(|p| p.into_inner()) = Some(hook);
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.shared.events.subscribe()
    }

    async fn apply_history_prefs(&self, prefs: HistoryPrefs) -> Result<()> {
        *self
            .shared
            .history_prefs
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = prefs;
        if self.shared.socket_up.load(Ordering::SeqCst) {
            self.shared
                .write_frame(&Command::HistoryPrefs {
                    days_limit: prefs.days_limit,
                    size_mb: prefs.size_mb,
                    storage_quota_mb: prefs.storage_quota_mb,
                })
                .await?;
        }
        Ok(())
    }

    async fn request_pair_code(&self, phone: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let response = self
            .request(id.clone(), Command::PairCode { id: &id, phone })
            .await?;
        response
            .code
            .ok_or_else(|| Error::platform_message("sidecar returned no pairing code"))
    }

    async fn send_text(&self, to: &ChatAddress, text: &str) -> Result<SendReceipt> {
        let id = uuid::Uuid::new_v4().to_string();
        let response = self
            .request(
                id.clone(),
                Command::SendText {
                    id: &id,
                    to: to.to_string(),
                    text,
                },
            )
            .await?;
        Ok(receipt_from(response))
    }

    async fn send_reaction(&self, to: &ChatAddress, message_id: &str, emoji: &str) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.request(
            id.clone(),
            Command::SendReaction {
                id: &id,
                to: to.to_string(),
                message_id,
                emoji,
            },
        )
        .await?;
        Ok(())
    }

    async fn edit_message(&self, to: &ChatAddress, message_id: &str, text: &str) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.request(
            id.clone(),
            Command::EditMessage {
                id: &id,
                to: to.to_string(),
                message_id,
                text,
            },
        )
        .await?;
        Ok(())
    }

    async fn revoke_message(&self, to: &ChatAddress, message_id: &str) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.request(
            id.clone(),
            Command::RevokeMessage {
                id: &id,
                to: to.to_string(),
                message_id,
            },
        )
        .await?;
        Ok(())
    }

    async fn create_poll(
        &self,
        to: &ChatAddress,
        question: &str,
        options: &[String],
        selectable: u32,
    ) -> Result<SendReceipt> {
        let id = uuid::Uuid::new_v4().to_string();
        let response = self
            .request(
                id.clone(),
                Command::CreatePoll {
                    id: &id,
                    to: to.to_string(),
                    question,
                    options,
                    selectable,
                },
            )
            .await?;
        Ok(receipt_from(response))
    }

    async fn mark_read(
        &self,
        chat: &ChatAddress,
        sender: &ChatAddress,
        message_ids: &[String],
    ) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.request(
            id.clone(),
            Command::MarkRead {
                id: &id,
                chat: chat.to_string(),
                sender: sender.to_string(),
                message_ids,
            },
        )
        .await?;
        Ok(())
    }

    async fn send_presence(&self, presence: Presence) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.request(
            id.clone(),
            Command::SetPresence {
                id: &id,
                presence: presence.as_str(),
            },
        )
        .await?;
        Ok(())
    }

    async fn send_chat_state(&self, to: &ChatAddress, state: ChatState) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.request(
            id.clone(),
            Command::ChatState {
                id: &id,
                to: to.to_string(),
                state: state.as_str(),
            },
        )
        .await?;
        Ok(())
    }

    async fn group_info(&self, group: &ChatAddress) -> Result<GroupInfo> {
        let id = uuid::Uuid::new_v4().to_string();
        let response = self
            .request(
                id.clone(),
                Command::GroupInfo {
                    id: &id,
                    group: group.to_string(),
                },
            )
            .await?;
        Ok(GroupInfo {
            name: response.name.unwrap_or_default(),
            participant_count: response.participant_count.unwrap_or(0),
        })
    }

    async fn create_group(
        &self,
        subject: &str,
        participants: &[ChatAddress],
    ) -> Result<ChatAddress> {
        let id = uuid::Uuid::new_v4().to_string();
        let response = self
            .request(
                id.clone(),
                Command::CreateGroup {
                    id: &id,
                    subject,
                    participants: participants.iter().map(ChatAddress::to_string).collect(),
                },
            )
            .await?;
        let address = response
            .address
            .ok_or_else(|| Error::platform_message("sidecar returned no group address"))?;
        Ok(address.parse()?)
    }

    async fn update_group_participants(
        &self,
        group: &ChatAddress,
        members: &[ChatAddress],
        action: ParticipantAction,
    ) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.request(
            id.clone(),
            Command::GroupParticipants {
                id: &id,
                group: group.to_string(),
                members: members.iter().map(ChatAddress::to_string).collect(),
                action: action.as_str(),
            },
        )
        .await?;
        Ok(())
    }

    async fn leave_group(&self, group: &ChatAddress) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.request(
            id.clone(),
            Command::LeaveGroup {
                id: &id,
                group: group.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    async fn set_blocked(&self, contact: &ChatAddress, blocked: bool) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.request(
            id.clone(),
            Command::SetBlocked {
                id: &id,
                contact: contact.to_string(),
                blocked,
            },
        )
        .await?;
        Ok(())
    }

    async fn follow_newsletter(&self, newsletter: &ChatAddress, follow: bool) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.request(
            id.clone(),
            Command::FollowNewsletter {
                id: &id,
                newsletter: newsletter.to_string(),
                follow,
            },
        )
        .await?;
        Ok(())
    }

    async fn request_history(&self, count: u32) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.request(id.clone(), Command::RequestHistory { id: &id, count })
            .await?;
        Ok(())
    }

    async fn send_media(&self, to: &ChatAddress, upload: MediaUpload) -> Result<SendReceipt> {
        let id = uuid::Uuid::new_v4().to_string();
        let response = self
            .request(
                id.clone(),
                Command::SendMedia {
                    id: &id,
                    to: to.to_string(),
                    kind: upload.kind.as_str(),
                    filename: &upload.filename,
                    mime_type: &upload.mime_type,
                    caption: &upload.caption,
                    bytes_b64: BASE64.encode(&upload.bytes),
                    voice: upload.voice.as_ref().map(|v: &VoiceNoteMeta| WireVoice {
                        duration_seconds: v.duration_seconds,
                        waveform_b64: BASE64.encode(v.waveform),
                    }),
                },
            )
            .await?;
        Ok(receipt_from(response))
    }

    async fn contact_name(&self, contact: &ChatAddress) -> Result<Option<String>> {
        let id = uuid::Uuid::new_v4().to_string();
        let response = self
            .request(
                id.clone(),
                Command::ContactName {
                    id: &id,
                    contact: contact.to_string(),
                },
            )
            .await?;
        Ok(response.contact_name.filter(|n| !n.is_empty()))
    }
}

fn receipt_from(response: WireResponse) -> SendReceipt {
    SendReceipt {
        message_id: response.message_id.unwrap_or_default(),
        timestamp: response.timestamp.unwrap_or_else(|| Utc::now().timestamp()),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frames_carry_the_op_tag() {
        let json = serde_json::to_string(&Command::SendText {
            id: "req-1",
            to: "111@individual".into(),
            text: "hi",
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["op"], "send_text");
        assert_eq!(value["to"], "111@individual");
        assert_eq!(value["id"], "req-1");
    }

    #[test]
    fn message_frame_converts_to_incoming() {
        let frame = serde_json::json!({
            "event": "message",
            "id": "m1",
            "chat": "111@individual",
            "sender": "222@individual",
            "push_name": "Alice",
            "timestamp": 1_700_000_000i64,
            "text": "hello",
            "media": {
                "kind": "image",
                "url": "https://cdn.example/x",
                "media_key_b64": BASE64.encode(b"key"),
                "sha256_b64": BASE64.encode(b"plain"),
                "enc_sha256_b64": BASE64.encode(b"enc"),
                "length": 42
            }
        });

        let event: WireEvent = serde_json::from_value(frame).unwrap();
        let WireEvent::Message(wire) = event else {
            panic!("expected a message frame");
        };
        let incoming = into_incoming(wire).unwrap();
        assert_eq!(incoming.id, "m1");
        assert_eq!(incoming.chat.to_string(), "111@individual");
        assert_eq!(incoming.sender.unwrap().to_string(), "222@individual");
        assert_eq!(incoming.content.text(), "hello");
        let media = incoming.content.media.unwrap();
        assert_eq!(media.kind, MediaKind::Image);
        assert_eq!(media.media_key, b"key");
        assert_eq!(media.length, 42);
    }

    #[test]
    fn message_without_sender_stays_senderless() {
        let frame = serde_json::json!({
            "event": "message",
            "id": "m1",
            "chat": "g1@group",
            "text": "old group message"
        });
        let event: WireEvent = serde_json::from_value(frame).unwrap();
        let WireEvent::Message(wire) = event else {
            panic!("expected a message frame");
        };
        let incoming = into_incoming(wire).unwrap();
        assert!(incoming.sender.is_none());
        assert!(incoming.timestamp.is_none());
    }

    #[test]
    fn malformed_chat_address_drops_the_message() {
        let wire = WireMessage {
            id: "m1".into(),
            chat: "not-an-address".into(),
            sender: None,
            push_name: String::new(),
            is_from_me: false,
            timestamp: None,
            text: Some("x".into()),
            extended_text: None,
            media: None,
        };
        assert!(into_incoming(wire).is_none());
    }

    #[test]
    fn history_frame_keeps_both_name_candidates() {
        let frame = serde_json::json!({
            "event": "history_sync",
            "conversations": [{
                "address": "g1@group",
                "display_name": "",
                "name": "Team",
                "messages": []
            }]
        });
        let event: WireEvent = serde_json::from_value(frame).unwrap();
        let WireEvent::HistorySync { conversations } = event else {
            panic!("expected a history frame");
        };
        let conv = into_conversation(conversations.into_iter().next().unwrap());
        assert_eq!(conv.display_name(), None);
        assert_eq!(conv.name(), Some("Team"));
    }

    #[test]
    fn response_frames_parse_with_partial_fields() {
        let frame = serde_json::json!({
            "event": "response",
            "id": "req-1",
            "ok": false,
            "error": "not connected"
        });
        let event: WireEvent = serde_json::from_value(frame).unwrap();
        let WireEvent::Response(response) = event else {
            panic!("expected a response frame");
        };
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("not connected"));
    }
}
