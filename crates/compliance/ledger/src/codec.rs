//! Line codecs: how a linked record becomes one log line and back.

use compliance_core::canonical::canonical_json;
use compliance_core::{compute_value_hash, ChainRecord};
use serde_json::Value;

use crate::error::{LedgerError, LedgerResult};
use crate::store::BackendKind;
use crate::verifier::FindingKind;

/// Chain fields readable from a line without decoding the record body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainHeader {
    pub record_id: String,
    pub prev_hash: String,
    pub record_hash: String,
}

/// Why a line's content hash could not be computed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineFault {
    pub kind: FindingKind,
    pub detail: String,
}

impl LineFault {
    fn malformed(detail: impl Into<String>) -> Self {
        Self {
            kind: FindingKind::MalformedRecord,
            detail: detail.into(),
        }
    }
}

pub trait RecordCodec<R: ChainRecord>: Send + Sync + 'static {
    fn backend(&self) -> BackendKind;

    /// Encode a record whose chain fields are already set.
    fn encode(&self, record: &R) -> LedgerResult<String>;

    fn header(&self, line: &str) -> LedgerResult<ChainHeader>;

    fn decode(&self, line: &str) -> LedgerResult<R>;

    /// Hash of the stored content, recomputed from the line itself.
    fn content_hash(&self, line: &str, header: &ChainHeader) -> Result<String, LineFault>;
}

/// Plaintext codec: each line is the canonical JSON of the record.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLineCodec;

impl<R: ChainRecord> RecordCodec<R> for JsonLineCodec {
    fn backend(&self) -> BackendKind {
        BackendKind::Plain
    }

    fn encode(&self, record: &R) -> LedgerResult<String> {
        Ok(canonical_json(record)?)
    }

    fn header(&self, line: &str) -> LedgerResult<ChainHeader> {
        let value: Value = serde_json::from_str(line)?;
        header_from_value(&value, R::KIND.id_field())
    }

    fn decode(&self, line: &str) -> LedgerResult<R> {
        Ok(serde_json::from_str(line)?)
    }

    fn content_hash(&self, line: &str, _header: &ChainHeader) -> Result<String, LineFault> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| LineFault::malformed(e.to_string()))?;
        compute_value_hash(&value).map_err(|e| LineFault::malformed(e.to_string()))
    }
}

fn header_from_value(value: &Value, id_field: &'static str) -> LedgerResult<ChainHeader> {
    let field = |name: &'static str| -> LedgerResult<String> {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| LedgerError::Serialization(format!("line is missing `{name}`")))
    };
    Ok(ChainHeader {
        record_id: field(id_field)?,
        prev_hash: field("prev_hash")?,
        record_hash: field("record_hash")?,
    })
}

#[cfg(feature = "encryption")]
pub use self::encrypted::EnvelopeCodec;

#[cfg(feature = "encryption")]
mod encrypted {
    use chrono::{DateTime, Utc};
    use compliance_core::canonical::canonical_json;
    use compliance_core::{compute_value_hash, ChainRecord};
    use compliance_crypto::{CryptoError, Envelope, EnvelopeCipher};
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use super::{ChainHeader, LineFault, RecordCodec};
    use crate::error::{LedgerError, LedgerResult};
    use crate::store::BackendKind;
    use crate::verifier::FindingKind;

    /// On-disk form of an encrypted record. Chain fields stay in the clear.
    #[derive(Debug, Serialize, Deserialize)]
    struct EnvelopeLine {
        record_id: String,
        created_at: DateTime<Utc>,
        prev_hash: String,
        record_hash: String,
        envelope: Envelope,
    }

    /// Encrypting codec: the record body is sealed in an [`Envelope`] bound
    /// to the record id and hash.
    #[derive(Clone, Debug)]
    pub struct EnvelopeCodec {
        cipher: EnvelopeCipher,
    }

    impl EnvelopeCodec {
        pub fn new(cipher: EnvelopeCipher) -> Self {
            Self { cipher }
        }

        fn parse(line: &str) -> LedgerResult<EnvelopeLine> {
            Ok(serde_json::from_str(line)?)
        }

        fn open(&self, line: &EnvelopeLine) -> Result<Vec<u8>, CryptoError> {
            let aad = record_aad(&line.record_id, &line.record_hash);
            self.cipher.decrypt(&line.envelope, &aad)
        }
    }

    fn record_aad(record_id: &str, record_hash: &str) -> Vec<u8> {
        format!("{record_id}\n{record_hash}").into_bytes()
    }

    impl<R: ChainRecord> RecordCodec<R> for EnvelopeCodec {
        fn backend(&self) -> BackendKind {
            BackendKind::Encrypted
        }

        fn encode(&self, record: &R) -> LedgerResult<String> {
            let plaintext = canonical_json(record)?;
            let aad = record_aad(record.record_id(), record.record_hash());
            let envelope = self.cipher.encrypt(plaintext.as_bytes(), &aad)?;
            let line = EnvelopeLine {
                record_id: record.record_id().to_owned(),
                created_at: record.created_at(),
                prev_hash: record.prev_hash().to_owned(),
                record_hash: record.record_hash().to_owned(),
                envelope,
            };
            Ok(canonical_json(&line)?)
        }

        fn header(&self, line: &str) -> LedgerResult<ChainHeader> {
            let line = Self::parse(line)?;
            Ok(ChainHeader {
                record_id: line.record_id,
                prev_hash: line.prev_hash,
                record_hash: line.record_hash,
            })
        }

        fn decode(&self, line: &str) -> LedgerResult<R> {
            let line = Self::parse(line)?;
            let plaintext = self.open(&line).map_err(|e| match e {
                CryptoError::Authentication => LedgerError::ContentTamper {
                    record_id: line.record_id.clone(),
                    reason: "envelope authentication failed".into(),
                },
                other => LedgerError::Crypto(other),
            })?;
            let record: R = serde_json::from_slice(&plaintext)?;
            if record.record_id() != line.record_id
                || record.record_hash() != line.record_hash
                || record.prev_hash() != line.prev_hash
                || record.created_at() != line.created_at
            {
                return Err(LedgerError::ContentTamper {
                    record_id: line.record_id,
                    reason: "clear chain fields differ from the sealed record".into(),
                });
            }
            Ok(record)
        }

        fn content_hash(&self, line: &str, header: &ChainHeader) -> Result<String, LineFault> {
            let parsed = Self::parse(line).map_err(|e| LineFault::malformed(e.to_string()))?;
            let plaintext = self.open(&parsed).map_err(|e| match e {
                CryptoError::Authentication => LineFault {
                    kind: FindingKind::AuthenticationFailure,
                    detail: "envelope authentication failed".into(),
                },
                CryptoError::UnknownKek(id) => LineFault {
                    kind: FindingKind::KeyUnavailable,
                    detail: format!("key-encryption key `{id}` is not in the key ring"),
                },
                other => LineFault::malformed(other.to_string()),
            })?;
            let value: Value = serde_json::from_slice(&plaintext)
                .map_err(|e| LineFault::malformed(e.to_string()))?;
            if value.get("prev_hash").and_then(Value::as_str) != Some(header.prev_hash.as_str()) {
                return Err(LineFault {
                    kind: FindingKind::ContentHashMismatch,
                    detail: "clear prev_hash differs from the sealed record".into(),
                });
            }
            let sealed_created_at = value
                .get("created_at")
                .cloned()
                .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok());
            if sealed_created_at != Some(parsed.created_at) {
                return Err(LineFault {
                    kind: FindingKind::ContentHashMismatch,
                    detail: "clear created_at differs from the sealed record".into(),
                });
            }
            compute_value_hash(&value).map_err(|e| LineFault::malformed(e.to_string()))
        }
    }
}
