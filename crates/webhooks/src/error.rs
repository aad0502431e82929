pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad operator input: rejected before anything is written.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] hermod_storage::Error),

    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
