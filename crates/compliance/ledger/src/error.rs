use compliance_core::{CanonicalError, LogFileError};
use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-layer errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The append did not reach disk; the chain is unchanged.
    #[error("storage write failed: {0}")]
    StorageWrite(#[source] LogFileError),

    #[error("storage read failed: {0}")]
    StorageRead(#[source] LogFileError),

    /// The persisted tail cannot be linked to. Appends are refused until
    /// the chain is reset.
    #[error("chain discontinuity in {log}: {reason}")]
    ChainDiscontinuity { log: String, reason: String },

    #[error("content tamper detected in record {record_id}: {reason}")]
    ContentTamper { record_id: String, reason: String },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[cfg(feature = "encryption")]
    #[error("crypto error: {0}")]
    Crypto(#[from] compliance_crypto::CryptoError),
}

impl From<CanonicalError> for LedgerError {
    fn from(e: CanonicalError) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}
