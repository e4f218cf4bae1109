use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Tag check failed: wrong key, wrong associated data, or altered bytes.
    #[error("authentication failed: ciphertext or associated data was altered")]
    Authentication,

    #[error("unknown key-encryption key `{0}`")]
    UnknownKek(String),

    #[error("invalid key material: {0}")]
    KeyMaterial(String),

    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<base64::DecodeError> for CryptoError {
    fn from(e: base64::DecodeError) -> Self {
        CryptoError::Malformed(format!("base64: {e}"))
    }
}
