use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The index is outside `0..=MAX_INDEX`.
    #[error("Index {0} is out of range")]
    OutOfRange(i64),

    #[error("'{0}' is not an integer index")]
    NotAnIndex(String),

    #[error("{store} is unavailable: {reason}")]
    StoreUnavailable { store: &'static str, reason: String },

    #[error("Cannot compute a value for payload '{payload}': {reason}")]
    ComputationFailure { payload: String, reason: String },

    #[error("Connection to {0} lost")]
    ConnectionLost(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cli(#[from] clap::Error),

    #[error(transparent)]
    Builder(#[from] fieldx::error::FieldXError),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn store_unavailable<E: std::fmt::Display>(store: &'static str, err: E) -> Self {
        Self::StoreUnavailable {
            store,
            reason: err.to_string(),
        }
    }

    /// Errors that must be shown to the client as a rejected submission.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::OutOfRange(_) | Self::NotAnIndex(_))
    }
}
