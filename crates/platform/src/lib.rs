//! The platform side of the bridge.
//!
//! The encrypted wire protocol lives in an external sidecar process; this
//! crate owns everything above it: the address model, the transport
//! contract, connection and pairing bookkeeping, the outbound send surface,
//! and the media-path guard.

pub mod address;
pub mod client;
pub mod error;
pub mod media;
pub mod sidecar;
pub mod testing;
pub mod transport;

pub use {
    address::{AddressError, AddressServer, ChatAddress},
    client::{BridgeClient, ConnectionSnapshot, PairingStatus},
    error::{Error, Result},
    media::{AudioAnalyzer, MediaPathGuard, PathError, VoiceNoteMeta},
    transport::{
        ChatState, GroupInfo, HistoryConversation, HistoryPrefs, HistorySync, IncomingMessage,
        MediaPart, MediaUpload, MessageContent, ParticipantAction, PlatformEvent,
        PlatformTransport, Presence, ReconnectHook, SendReceipt,
    },
};
