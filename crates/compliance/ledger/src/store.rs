use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;

use chrono::SubsecRound;
use compliance_core::{link_record, ChainRecord, QueryWindow, RecordFilter, GENESIS_HASH};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::verifier::IntegrityReport;

/// Which storage variant backs a log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Plain,
    Encrypted,
    Null,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Plain => "plain",
            BackendKind::Encrypted => "encrypted",
            BackendKind::Null => "null",
        })
    }
}

/// A line that could not be decoded while answering a query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub index: usize,
    pub record_id: Option<String>,
    pub error: String,
}

/// One page of query results.
#[derive(Clone, Debug)]
pub struct QueryPage<R> {
    pub records: Vec<R>,
    /// Lines skipped because they failed to decode or decrypt.
    pub failures: Vec<QueryFailure>,
}

impl<R> Default for QueryPage<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Storage interface for one hash-chained compliance log.
pub trait ComplianceLog<R: ChainRecord>: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Validate, link, and durably persist `record`. Returns the stored
    /// record with its id and chain hashes filled in.
    fn append(&self, record: R) -> LedgerResult<R>;

    fn get_by_id(&self, id: &str) -> LedgerResult<R>;

    /// AND-combined filter in chain order (or reversed), then windowed.
    fn query(&self, filter: &RecordFilter, window: QueryWindow) -> LedgerResult<QueryPage<R>>;

    /// Full verification: linkage plus recomputed content hashes.
    fn verify(&self) -> LedgerResult<IntegrityReport>;

    /// Linkage-only verification from the clear chain fields.
    fn verify_chain_only(&self) -> LedgerResult<IntegrityReport>;

    /// Hash of the last record, the anchor for the next append.
    fn latest_hash(&self) -> LedgerResult<Option<String>>;

    fn len(&self) -> LedgerResult<usize>;

    fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Archive the current log and restart the chain from genesis.
    fn reset_chain(&self, reason: &str) -> LedgerResult<Option<PathBuf>>;
}

/// Log that accepts and discards every write.
pub struct NullLog<R> {
    _record: PhantomData<fn() -> R>,
}

impl<R> NullLog<R> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<R> Default for NullLog<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ChainRecord> ComplianceLog<R> for NullLog<R> {
    fn backend(&self) -> BackendKind {
        BackendKind::Null
    }

    fn append(&self, mut record: R) -> LedgerResult<R> {
        record.validate().map_err(LedgerError::InvalidInput)?;
        if record.record_id().is_empty() {
            record.set_record_id(R::KIND.generate_id());
        }
        record.set_created_at(record.created_at().trunc_subsecs(6));
        link_record(&mut record, GENESIS_HASH)?;
        debug!(kind = %R::KIND, record_id = record.record_id(), "Discarded record");
        Ok(record)
    }

    fn get_by_id(&self, id: &str) -> LedgerResult<R> {
        Err(LedgerError::NotFound(id.to_owned()))
    }

    fn query(&self, _filter: &RecordFilter, _window: QueryWindow) -> LedgerResult<QueryPage<R>> {
        Ok(QueryPage::default())
    }

    fn verify(&self) -> LedgerResult<IntegrityReport> {
        Ok(IntegrityReport::empty())
    }

    fn verify_chain_only(&self) -> LedgerResult<IntegrityReport> {
        Ok(IntegrityReport::empty())
    }

    fn latest_hash(&self) -> LedgerResult<Option<String>> {
        Ok(None)
    }

    fn len(&self) -> LedgerResult<usize> {
        Ok(0)
    }

    fn reset_chain(&self, _reason: &str) -> LedgerResult<Option<PathBuf>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliance_core::{DecisionRecord, DecisionType, Rationale};
    use serde_json::json;

    #[test]
    fn null_log_accepts_and_forgets() {
        let log: NullLog<DecisionRecord> = NullLog::new();
        let stored = log
            .append(DecisionRecord::new(
                DecisionType::Routing,
                Rationale::new("route to adjuster", 0.6),
                json!({"queue": "adjusters"}),
            ))
            .unwrap();
        assert!(stored.decision_id.starts_with("dec-"));
        assert_eq!(stored.prev_hash, GENESIS_HASH);
        assert!(matches!(
            log.get_by_id(&stored.decision_id),
            Err(LedgerError::NotFound(_))
        ));
        assert!(log.verify().unwrap().valid);
        assert_eq!(log.len().unwrap(), 0);
        assert_eq!(log.backend(), BackendKind::Null);
    }

    #[test]
    fn null_log_still_validates() {
        let log: NullLog<DecisionRecord> = NullLog::new();
        let bad = DecisionRecord::new(DecisionType::Other, Rationale::new("", 0.5), json!(null));
        assert!(matches!(log.append(bad), Err(LedgerError::InvalidInput(_))));
    }
}
