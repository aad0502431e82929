//! Client wrapper: connection bookkeeping, pairing flows, and the outbound
//! send surface.
//!
//! The wrapper never propagates caller cancellation into the platform
//! client: every operation runs to completion so session state stays
//! unambiguous. Connection state and pairing state live behind separate
//! locks: the pairing mutex is held across awaits, the connection lock
//! never is.

use std::{
    sync::{Arc, RwLock as StdRwLock},
    time::{Duration, Instant},
};

use {
    chrono::Utc,
    hermod_common::types::MediaKind,
    serde::Serialize,
    tokio::sync::{Mutex, broadcast},
    tracing::{debug, warn},
};

use crate::{
    address::ChatAddress,
    error::{Error, Result},
    media::{AudioAnalyzer, MediaPathGuard, media_kind_for_path, mime_type_for_path},
    transport::{
        ChatState, GroupInfo, HistoryPrefs, MediaUpload, ParticipantAction, PlatformEvent,
        PlatformTransport, Presence, SendReceipt,
    },
};

/// Give up on automatic reconnection after this many consecutive failures
/// and let the watchdog terminate the process instead.
const MAX_RECONNECT_ATTEMPTS: u32 = 30;

/// Lifetime of a phone pairing code.
const PAIR_CODE_TTL: Duration = Duration::from_secs(160);

/// Overall deadline for the QR pairing flow.
const QR_PAIR_TIMEOUT: Duration = Duration::from_secs(180);

// ── Connection bookkeeping ──────────────────────────────────────────────────

#[derive(Debug)]
struct ConnectionState {
    process_start: Instant,
    last_connected: Option<i64>,
    disconnected_since: Option<Instant>,
    consecutive_reconnect_errors: u32,
}

impl ConnectionState {
    fn new() -> Self {
        // The process boots disconnected; the outage clock starts
        // immediately so the watchdog also covers a link that never
        // comes up.
        Self {
            process_start: Instant::now(),
            last_connected: None,
            disconnected_since: Some(Instant::now()),
            consecutive_reconnect_errors: 0,
        }
    }
}

/// Point-in-time view of the connection, for health checks and the
/// supervisor loops.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub connected: bool,
    pub uptime_seconds: u64,
    pub last_connected_time: Option<i64>,
    pub down_for_seconds: Option<u64>,
    pub reconnect_errors: u32,
}

// ── Pairing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PairingSession {
    in_progress: bool,
    code: Option<String>,
    expires_at: Option<Instant>,
    complete: bool,
    error: Option<String>,
}

impl PairingSession {
    /// An expired code leaves the session in progress but no longer blocks
    /// a fresh code request.
    fn blocks_new_attempt(&self) -> bool {
        self.in_progress && self.expires_at.is_some_and(|at| Instant::now() < at)
    }
}

/// Serializable view of the pairing state machine.
#[derive(Debug, Clone, Serialize)]
pub struct PairingStatus {
    pub in_progress: bool,
    pub code: Option<String>,
    pub expires_in_seconds: Option<u64>,
    pub complete: bool,
    pub error: Option<String>,
}

// ── The wrapper ─────────────────────────────────────────────────────────────

pub struct BridgeClient {
    transport: Arc<dyn PlatformTransport>,
    connection: Arc<StdRwLock<ConnectionState>>,
    pairing: Mutex<PairingSession>,
    media_guard: MediaPathGuard,
    audio: Option<Arc<dyn AudioAnalyzer>>,
}

impl BridgeClient {
    pub fn new(
        transport: Arc<dyn PlatformTransport>,
        media_guard: MediaPathGuard,
        audio: Option<Arc<dyn AudioAnalyzer>>,
    ) -> Arc<Self> {
        let connection = Arc::new(StdRwLock::new(ConnectionState::new()));

        // The transport calls this after every failed reconnect attempt.
        let hook_state = Arc::clone(&connection);
        transport.set_reconnect_hook(Arc::new(move || {
            let mut state = hook_state.write().unwrap_or_else(|p| p.into_inner());
            state.consecutive_reconnect_errors += 1;
            let retry = state.consecutive_reconnect_errors < MAX_RECONNECT_ATTEMPTS;
            if !retry {
                warn!(
                    errors = state.consecutive_reconnect_errors,
                    "giving up on automatic reconnection; the watchdog will restart the process"
                );
            }
            retry
        }));

        Arc::new(Self {
            transport,
            connection,
            pairing: Mutex::new(PairingSession::default()),
            media_guard,
            audio,
        })
    }

    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    /// Disconnect and immediately reconnect. Used after repeated keepalive
    /// timeouts; deliberately does not reset the reconnect error counter.
    pub async fn force_reconnect(&self) -> Result<()> {
        self.transport.disconnect().await;
        self.transport.connect().await
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    #[must_use]
    pub fn has_identity(&self) -> bool {
        self.transport.has_identity()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.transport.subscribe()
    }

    pub async fn apply_history_prefs(&self, prefs: HistoryPrefs) -> Result<()> {
        self.transport.apply_history_prefs(prefs).await
    }

    /// Record a successful connection: clears the outage clock and the
    /// reconnect error counter.
    pub fn mark_connected(&self) {
        let mut state = self.connection.write().unwrap_or_else(|p| p.into_inner());
        state.last_connected = Some(Utc::now().timestamp());
        state.disconnected_since = None;
        state.consecutive_reconnect_errors = 0;
    }

    /// Record a disconnection. Only the first transition starts the outage
    /// clock, so "down for" spans the whole outage.
    pub fn mark_disconnected(&self) {
        let mut state = self.connection.write().unwrap_or_else(|p| p.into_inner());
        if state.disconnected_since.is_none() {
            state.disconnected_since = Some(Instant::now());
        }
    }

    #[must_use]
    pub fn connection_snapshot(&self) -> ConnectionSnapshot {
        let state = self.connection.read().unwrap_or_else(|p| p.into_inner());
        ConnectionSnapshot {
            connected: self.transport.is_connected(),
            uptime_seconds: state.process_start.elapsed().as_secs(),
            last_connected_time: state.last_connected,
            down_for_seconds: state.disconnected_since.map(|t| t.elapsed().as_secs()),
            reconnect_errors: state.consecutive_reconnect_errors,
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.transport.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    // ── Pairing flows ───────────────────────────────────────────────────────

    /// Phone-number pairing. Rejected while another pairing attempt runs or
    /// when the device already holds an identity. Returns the code to type
    /// on the primary device.
    pub async fn begin_phone_pairing(&self, phone: &str) -> Result<String> {
        let mut session = self.pairing.lock().await;
        if session.blocks_new_attempt() {
            return Err(Error::PairingInProgress);
        }
        if self.transport.has_identity() {
            return Err(Error::AlreadyPaired);
        }

        if !self.transport.is_connected() {
            self.transport.connect().await?;
        }

        let code = self.transport.request_pair_code(phone).await?;
        session.in_progress = true;
        session.code = Some(code.clone());
        session.expires_at = Some(Instant::now() + PAIR_CODE_TTL);
        session.complete = false;
        session.error = None;
        Ok(code)
    }

    pub async fn pairing_status(&self) -> PairingStatus {
        let session = self.pairing.lock().await;
        PairingStatus {
            in_progress: session.in_progress,
            code: session.code.clone(),
            expires_in_seconds: session
                .expires_at
                .map(|at| at.saturating_duration_since(Instant::now()).as_secs()),
            complete: session.complete,
            error: session.error.clone(),
        }
    }

    /// Feed a pairing success event into the state machine.
    pub async fn note_pair_success(&self) {
        let mut session = self.pairing.lock().await;
        session.in_progress = false;
        session.complete = true;
        session.code = None;
        session.expires_at = None;
        session.error = None;
    }

    /// Feed a pairing failure event into the state machine.
    pub async fn note_pair_error(&self, reason: &str) {
        let mut session = self.pairing.lock().await;
        session.in_progress = false;
        session.complete = false;
        session.error = Some(reason.to_string());
    }

    /// QR pairing: connect without an identity, render each code the
    /// platform pushes, and wait for the pairing outcome. The whole flow is
    /// bounded by a three-minute deadline.
    pub async fn pair_with_qr<F>(&self, mut render: F) -> Result<()>
    where
        F: FnMut(&str) + Send,
    {
        if self.transport.has_identity() {
            return Err(Error::AlreadyPaired);
        }

        let mut events = self.transport.subscribe();
        self.transport.connect().await?;

        let outcome = tokio::time::timeout(QR_PAIR_TIMEOUT, async {
            loop {
                match events.recv().await {
                    Ok(PlatformEvent::QrCode(code)) => render(&code),
                    Ok(PlatformEvent::PairSuccess) => return Ok(()),
                    Ok(PlatformEvent::PairError { reason }) => {
                        return Err(Error::PairingFailed { reason });
                    },
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "event feed lagged during QR pairing");
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(Error::platform_message("event feed closed during pairing"));
                    },
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::PairingTimeout),
        }
    }

    // ── Send surface ────────────────────────────────────────────────────────

    pub async fn send_text(&self, recipient: &str, text: &str) -> Result<SendReceipt> {
        let to: ChatAddress = recipient.parse()?;
        self.ensure_connected()?;
        self.transport.send_text(&to, text).await
    }

    pub async fn send_reaction(
        &self,
        recipient: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let to: ChatAddress = recipient.parse()?;
        self.ensure_connected()?;
        self.transport.send_reaction(&to, message_id, emoji).await
    }

    pub async fn edit_message(&self, recipient: &str, message_id: &str, text: &str) -> Result<()> {
        let to: ChatAddress = recipient.parse()?;
        self.ensure_connected()?;
        self.transport.edit_message(&to, message_id, text).await
    }

    pub async fn revoke_message(&self, recipient: &str, message_id: &str) -> Result<()> {
        let to: ChatAddress = recipient.parse()?;
        self.ensure_connected()?;
        self.transport.revoke_message(&to, message_id).await
    }

    pub async fn create_poll(
        &self,
        recipient: &str,
        question: &str,
        options: &[String],
        selectable: u32,
    ) -> Result<SendReceipt> {
        let to: ChatAddress = recipient.parse()?;
        self.ensure_connected()?;
        self.transport
            .create_poll(&to, question, options, selectable)
            .await
    }

    pub async fn mark_read(
        &self,
        chat: &str,
        sender: &str,
        message_ids: &[String],
    ) -> Result<()> {
        let chat: ChatAddress = chat.parse()?;
        let sender: ChatAddress = sender.parse()?;
        self.ensure_connected()?;
        self.transport.mark_read(&chat, &sender, message_ids).await
    }

    pub async fn send_presence(&self, presence: Presence) -> Result<()> {
        self.ensure_connected()?;
        self.transport.send_presence(presence).await
    }

    pub async fn send_chat_state(&self, recipient: &str, state: ChatState) -> Result<()> {
        let to: ChatAddress = recipient.parse()?;
        self.ensure_connected()?;
        self.transport.send_chat_state(&to, state).await
    }

    pub async fn group_info(&self, group: &ChatAddress) -> Result<GroupInfo> {
        self.ensure_connected()?;
        self.transport.group_info(group).await
    }

    pub async fn create_group(
        &self,
        subject: &str,
        participants: &[String],
    ) -> Result<ChatAddress> {
        let members = parse_addresses(participants)?;
        self.ensure_connected()?;
        self.transport.create_group(subject, &members).await
    }

    pub async fn update_group_participants(
        &self,
        group: &str,
        members: &[String],
        action: ParticipantAction,
    ) -> Result<()> {
        let group: ChatAddress = group.parse()?;
        let members = parse_addresses(members)?;
        self.ensure_connected()?;
        self.transport
            .update_group_participants(&group, &members, action)
            .await
    }

    pub async fn leave_group(&self, group: &str) -> Result<()> {
        let group: ChatAddress = group.parse()?;
        self.ensure_connected()?;
        self.transport.leave_group(&group).await
    }

    pub async fn set_blocked(&self, contact: &str, blocked: bool) -> Result<()> {
        let contact: ChatAddress = contact.parse()?;
        self.ensure_connected()?;
        self.transport.set_blocked(&contact, blocked).await
    }

    pub async fn follow_newsletter(&self, newsletter: &str, follow: bool) -> Result<()> {
        let newsletter: ChatAddress = newsletter.parse()?;
        self.ensure_connected()?;
        self.transport.follow_newsletter(&newsletter, follow).await
    }

    pub async fn request_history(&self, count: u32) -> Result<()> {
        self.ensure_connected()?;
        self.transport.request_history(count).await
    }

    pub async fn contact_name(&self, contact: &ChatAddress) -> Result<Option<String>> {
        self.ensure_connected()?;
        self.transport.contact_name(contact).await
    }

    /// Send a file from the local filesystem. The path guard runs before
    /// anything is read; audio files additionally go through the analyzer
    /// to pick up duration and waveform metadata.
    pub async fn send_media(
        &self,
        recipient: &str,
        path: &str,
        caption: &str,
    ) -> Result<SendReceipt> {
        let to: ChatAddress = recipient.parse()?;
        self.ensure_connected()?;

        let canonical = self.media_guard.check(path)?;
        let bytes = tokio::fs::read(&canonical)
            .await
            .map_err(|source| Error::MediaRead {
                path: path.to_string(),
                source,
            })?;

        let kind = media_kind_for_path(&canonical);
        let voice = if kind == MediaKind::Audio {
            match &self.audio {
                Some(analyzer) => Some(
                    analyzer
                        .analyze(&bytes)
                        .map_err(|e| Error::AudioAnalysis(e.to_string()))?,
                ),
                None => None,
            }
        } else {
            None
        };

        let filename = canonical
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();

        let upload = MediaUpload {
            kind,
            mime_type: mime_type_for_path(&canonical).to_string(),
            bytes,
            filename,
            caption: caption.to_string(),
            voice,
        };
        self.transport.send_media(&to, upload).await
    }
}

fn parse_addresses(raw: &[String]) -> Result<Vec<ChatAddress>> {
    raw.iter()
        .map(|s| s.parse().map_err(Error::from))
        .collect()
}
