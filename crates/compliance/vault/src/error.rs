use chrono::{DateTime, Utc};
use compliance_core::LogFileError;
use compliance_crypto::CryptoError;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault storage error: {0}")]
    Storage(#[from] LogFileError),

    #[error("vault crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A field needs tokenizing but the record names no claim to scope it to.
    #[error("field `{field}` needs tokenizing but the record has no claim_id")]
    MissingClaim { field: String },

    /// The claim's key was destroyed; nothing new may be stored for it.
    #[error("claim {claim_id} was shredded at {shredded_at}")]
    Shredded {
        claim_id: String,
        shredded_at: DateTime<Utc>,
    },

    #[error("invalid field rule `{pattern}`: {reason}")]
    InvalidRule { pattern: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}
