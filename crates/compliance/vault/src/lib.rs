//! PII vault for compliance records.
//!
//! Personal data found in record payloads is either redacted outright or
//! sealed into the vault and replaced by an opaque token. Every tokenized
//! value is encrypted under a data key belonging to its claim, so deleting
//! that one key (`shred`) makes all of the claim's personal data
//! unrecoverable while the hash-chained ledger stays intact.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod matcher;
pub mod vault;

pub use error::{VaultError, VaultResult};
pub use matcher::{FieldMatcher, FieldRule, Handling, MatchKind, REDACTED};
pub use vault::{is_token, PiiVault, ResolveOutcome, ShredReceipt, VaultConfig, VaultEntry};
