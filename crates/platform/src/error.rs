use std::error::Error as StdError;

use crate::{address::AddressError, media::PathError};

pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors for everything that touches the platform.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The session is not connected; the operation was not attempted.
    #[error("not connected to the platform")]
    NotConnected,

    #[error(transparent)]
    Address(#[from] AddressError),

    /// A pairing attempt is already running.
    #[error("pairing already in progress")]
    PairingInProgress,

    /// Stored credentials exist; pairing again would orphan them.
    #[error("device is already paired")]
    AlreadyPaired,

    #[error("pairing timed out")]
    PairingTimeout,

    #[error("pairing failed: {reason}")]
    PairingFailed { reason: String },

    #[error(transparent)]
    MediaPath(#[from] PathError),

    #[error("media file unreadable: {path}: {source}")]
    MediaRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("audio analysis failed: {0}")]
    AudioAnalysis(String),

    /// Wrapped rejection from the underlying client.
    #[error("platform operation failed: {context}: {source}")]
    Platform {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// Rejection from the underlying client that carries only a message.
    #[error("platform operation failed: {0}")]
    PlatformMessage(String),
}

impl Error {
    #[must_use]
    pub fn platform(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Platform {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn platform_message(message: impl Into<String>) -> Self {
        Self::PlatformMessage(message.into())
    }
}
