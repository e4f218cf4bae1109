//! Compliance store for automated claim processing.
//!
//! Wires the hash-chained ledger, envelope encryption and the PII vault
//! behind one explicitly constructed [`ComplianceService`], configured from
//! TOML plus `CLAIMS_COMPLIANCE_*` environment overrides.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;

pub use config::{ComplianceConfig, EncryptionConfig, LoggingConfig, PiiConfig, StorageConfig};
pub use error::{ServiceError, ServiceResult};
pub use service::{ComplianceReport, ComplianceService};
pub use telemetry::init_tracing;

pub use compliance_core::{
    DecisionRecord, DecisionType, LlmCallRecord, LlmMessage, MessageRole, QueryWindow, Rationale,
    RecordFilter, GENESIS_HASH,
};
pub use compliance_ledger::{BackendKind, ComplianceLog, IntegrityReport, QueryPage};
pub use compliance_vault::{FieldRule, ResolveOutcome, ShredReceipt};
