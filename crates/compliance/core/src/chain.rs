//! Hash-chain link computation.
//!
//! `record_hash = BLAKE3(prev_hash || canonical(record without record_hash))`,
//! hex encoded. The first record of every chain links to [`GENESIS_HASH`].

use serde_json::Value;

use crate::canonical::to_canonical_bytes;
use crate::error::CanonicalError;
use crate::model::ChainRecord;

/// Version of the chain format. Bump together with [`GENESIS_HASH`].
pub const CHAIN_FORMAT_VERSION: u32 = 1;

/// Predecessor hash of the first record in any chain (format version 1).
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Compute the hash a record should carry given its current `prev_hash`.
pub fn compute_record_hash<R: ChainRecord>(record: &R) -> Result<String, CanonicalError> {
    let value = serde_json::to_value(record)?;
    compute_value_hash(&value)
}

/// Compute the chain hash of a record that is already in JSON form.
///
/// Used by the verifier, which hashes exactly what is on disk rather than a
/// re-serialized typed record.
pub fn compute_value_hash(value: &Value) -> Result<String, CanonicalError> {
    let mut body = value.as_object().ok_or(CanonicalError::NotAnObject)?.clone();
    body.remove("record_hash");
    let prev_hash = body
        .get("prev_hash")
        .and_then(Value::as_str)
        .ok_or(CanonicalError::MissingField("prev_hash"))?
        .to_owned();

    let bytes = to_canonical_bytes(&Value::Object(body))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(&bytes);
    Ok(hasher.finalize().to_hex().to_string())
}

/// Link `record` after `prev_hash`, filling in both chain fields.
pub fn link_record<R: ChainRecord>(record: &mut R, prev_hash: &str) -> Result<(), CanonicalError> {
    record.set_chain_link(prev_hash.to_owned(), String::new());
    let hash = compute_record_hash(record)?;
    record.set_chain_link(prev_hash.to_owned(), hash);
    Ok(())
}
