use compliance_crypto::CryptoError;
use compliance_ledger::LedgerError;
use compliance_vault::VaultError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Compliance recording is switched off; there is no vault to act on.
    #[error("compliance recording is disabled")]
    Disabled,

    #[error("telemetry error: {0}")]
    Telemetry(String),
}
