//! In-memory transport for tests. Records every call and lets the test
//! drive the event feed by hand.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock as StdRwLock,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use {async_trait::async_trait, tokio::sync::broadcast};

use crate::{
    address::ChatAddress,
    error::{Error, Result},
    transport::{
        ChatState, GroupInfo, HistoryPrefs, MediaUpload, ParticipantAction, PlatformEvent,
        PlatformTransport, Presence, ReconnectHook, SendReceipt,
    },
};

pub struct MockTransport {
    pub connected: AtomicBool,
    pub identity: AtomicBool,
    pub connect_calls: AtomicU32,
    pub disconnect_calls: AtomicU32,
    pub sent_texts: Mutex<Vec<(String, String)>>,
    pub sent_media: Mutex<Vec<MediaUpload>>,
    pub presence_updates: Mutex<Vec<Presence>>,
    pub history_prefs: Mutex<Option<HistoryPrefs>>,
    pub group_names: Mutex<HashMap<String, GroupInfo>>,
    pub contact_names: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<PlatformEvent>,
    hook: StdRwLock<Option<ReconnectHook>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            connected: AtomicBool::new(false),
            identity: AtomicBool::new(false),
            connect_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
            sent_texts: Mutex::new(Vec::new()),
            sent_media: Mutex::new(Vec::new()),
            presence_updates: Mutex::new(Vec::new()),
            history_prefs: Mutex::new(None),
            group_names: Mutex::new(HashMap::new()),
            contact_names: Mutex::new(HashMap::new()),
            events,
            hook: StdRwLock::new(None),
        })
    }

    /// Push an event to every subscriber.
    pub fn emit(&self, event: PlatformEvent) {
        let _ = self.events.send(event);
    }

    /// Simulate one failed reconnect attempt. Returns the hook's decision,
    /// or `None` if no hook is installed.
    pub fn fire_reconnect_hook(&self) -> Option<bool> {
        let hook = self.hook.read().unwrap_or_else(|p| p.into_inner());
        hook.as_ref().map(|h| h())
    }
}

#[async_trait]
impl PlatformTransport for MockTransport {
    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn has_identity(&self) -> bool {
        self.identity.load(Ordering::SeqCst)
    }

    fn set_reconnect_hook(&self, hook: ReconnectHook) {
        *self.hook.write().unwrap_or_else(|p| p.into_inner()) = Some(hook);
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events.subscribe()
    }

    async fn apply_history_prefs(&self, prefs: HistoryPrefs) -> Result<()> {
        *self.history_prefs.lock().unwrap_or_else(|p| p.into_inner()) = Some(prefs);
        Ok(())
    }

    async fn request_pair_code(&self, _phone: &str) -> Result<String> {
        Ok("QRST1234".to_string())
    }

    async fn send_text(&self, to: &ChatAddress, text: &str) -> Result<SendReceipt> {
        self.sent_texts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((to.to_string(), text.to_string()));
        Ok(SendReceipt {
            message_id: format!("mock-{}", uuid::Uuid::new_v4()),
            timestamp: 1_700_000_000,
        })
    }

    async fn send_reaction(&self, _to: &ChatAddress, _message_id: &str, _emoji: &str) -> Result<()> {
        Ok(())
    }

    async fn edit_message(&self, _to: &ChatAddress, _message_id: &str, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn revoke_message(&self, _to: &ChatAddress, _message_id: &str) -> Result<()> {
        Ok(())
    }

    async fn create_poll(
        &self,
        _to: &ChatAddress,
        _question: &str,
        _options: &[String],
        _selectable: u32,
    ) -> Result<SendReceipt> {
        Ok(SendReceipt {
            message_id: "mock-poll".into(),
            timestamp: 1_700_000_000,
        })
    }

    async fn mark_read(
        &self,
        _chat: &ChatAddress,
        _sender: &ChatAddress,
        _message_ids: &[String],
    ) -> Result<()> {
        Ok(())
    }

    async fn send_presence(&self, presence: Presence) -> Result<()> {
        self.presence_updates
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(presence);
        Ok(())
    }

    async fn send_chat_state(&self, _to: &ChatAddress, _state: ChatState) -> Result<()> {
        Ok(())
    }

    async fn group_info(&self, group: &ChatAddress) -> Result<GroupInfo> {
        self.group_names
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&group.to_string())
            .cloned()
            .ok_or_else(|| Error::platform_message("group not found"))
    }

    async fn create_group(
        &self,
        _subject: &str,
        _participants: &[ChatAddress],
    ) -> Result<ChatAddress> {
        Ok("new-group@group".parse()?)
    }

    async fn update_group_participants(
        &self,
        _group: &ChatAddress,
        _members: &[ChatAddress],
        _action: ParticipantAction,
    ) -> Result<()> {
        Ok(())
    }

    async fn leave_group(&self, _group: &ChatAddress) -> Result<()> {
        Ok(())
    }

    async fn set_blocked(&self, _contact: &ChatAddress, _blocked: bool) -> Result<()> {
        Ok(())
    }

    async fn follow_newsletter(&self, _newsletter: &ChatAddress, _follow: bool) -> Result<()> {
        Ok(())
    }

    async fn request_history(&self, _count: u32) -> Result<()> {
        Ok(())
    }

    async fn send_media(&self, _to: &ChatAddress, upload: MediaUpload) -> Result<SendReceipt> {
        self.sent_media
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(upload);
        Ok(SendReceipt {
            message_id: "mock-media".into(),
            timestamp: 1_700_000_000,
        })
    }

    async fn contact_name(&self, contact: &ChatAddress) -> Result<Option<String>> {
        Ok(self
            .contact_names
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&contact.to_string())
            .cloned())
    }
}
