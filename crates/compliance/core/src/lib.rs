//! Compliance core: record model, canonical hashing, and durable line storage.
//!
//! This crate provides:
//! - the immutable `DecisionRecord` / `LlmCallRecord` value types
//! - deterministic canonical JSON encoding used for every chain hash
//! - the genesis constant and the hash-chain link computation
//! - a line-oriented log file with atomic append and torn-tail detection
//!
//! Ledger, encryption, and vault crates build on these primitives.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod canonical;
pub mod chain;
pub mod error;
pub mod log_file;
pub mod model;

pub use chain::{
    compute_record_hash, compute_value_hash, link_record, CHAIN_FORMAT_VERSION, GENESIS_HASH,
};
pub use error::{CanonicalError, LogFileError};
pub use log_file::{write_atomic, Durability, LogFile, LogLine, Tail};
pub use model::{
    apply_window, now_micros, ChainRecord, DecisionRecord, DecisionType, LlmCallRecord,
    LlmMessage, MessageRole, QueryWindow, Rationale, RecordFilter, RecordKind,
};
