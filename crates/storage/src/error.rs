pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A webhook config id that does not exist in the store.
    #[error("webhook config not found: {id}")]
    ConfigNotFound { id: i64 },

    /// A persisted enum column holds a value this build does not know.
    #[error("unrecognized {what} value: {value}")]
    Unrecognized { what: &'static str, value: String },

    #[error("store directory unusable: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
