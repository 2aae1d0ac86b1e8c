use thiserror::Error;

/// Failures of the local medium. Never surfaced to callers of the adapters;
/// the store logs them and degrades to defaults.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Counter out of range: {0}")]
    OutOfRange(i64),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Failures talking to the remote counter table.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Atomic increment RPC is not available")]
    RpcUnavailable,

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Status { status: 404, .. } | RemoteError::RpcUnavailable)
    }
}
