//! Hash-chained, append-only compliance ledger.
//!
//! Two logs are kept per deployment: one for automated claim decisions and
//! one for LLM calls. Each record carries the hash of its predecessor, so any
//! edit, reorder, insertion, or interior deletion is detectable by
//! [`ComplianceLog::verify`].
//!
//! Variants:
//! - [`PlainChainLog`]: canonical JSON lines
//! - `EncryptedChainLog`: envelope-encrypted bodies with clear chain fields
//!   (cargo feature `encryption`, on by default)
//! - [`NullLog`]: accepts and discards writes
//!
//! [`StorageFactory`] picks the variant from a [`LedgerConfig`].

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod chain_log;
pub mod codec;
pub mod error;
pub mod factory;
pub mod store;
pub mod verifier;

#[cfg(feature = "encryption")]
pub use chain_log::EncryptedChainLog;
pub use chain_log::{HashChainLog, PlainChainLog};
#[cfg(feature = "encryption")]
pub use codec::EnvelopeCodec;
pub use codec::{ChainHeader, JsonLineCodec, LineFault, RecordCodec};
pub use error::{LedgerError, LedgerResult};
pub use factory::{open_log, LedgerConfig, StorageFactory};
pub use store::{BackendKind, ComplianceLog, NullLog, QueryFailure, QueryPage};
pub use verifier::{verify_lines, FindingKind, IntegrityFinding, IntegrityReport, VerifyMode};
