//! Full-chain integrity verification.
//!
//! Walks a log from its first record, recomputing every record's hash from
//! the bytes on disk and checking each `prev_hash` against its predecessor.
//! Findings are collected into an [`IntegrityReport`]; nothing is thrown
//! mid-scan.

use compliance_core::{ChainRecord, LogLine, GENESIS_HASH};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::codec::RecordCodec;

/// What went wrong with one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// The line could not be parsed or lacks chain fields.
    MalformedRecord,
    /// Stored content does not hash to the stored `record_hash`.
    ContentHashMismatch,
    /// `prev_hash` does not match the predecessor (reorder, delete, insert).
    LinkMismatch,
    /// Ciphertext or its bound identifiers were altered.
    AuthenticationFailure,
    /// The key needed to decrypt the record is not in the key ring.
    KeyUnavailable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityFinding {
    /// Position of the record in the log, starting at 0.
    pub index: usize,
    pub record_id: Option<String>,
    pub kind: FindingKind,
    pub detail: String,
}

/// Result of verifying one log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub total_records: usize,
    pub first_broken_index: Option<usize>,
    pub errors: Vec<IntegrityFinding>,
}

impl IntegrityReport {
    /// Report for a log with no records.
    pub fn empty() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.valid
    }

    fn record(&mut self, finding: IntegrityFinding) {
        self.valid = false;
        self.first_broken_index = Some(match self.first_broken_index {
            Some(current) => current.min(finding.index),
            None => finding.index,
        });
        self.errors.push(finding);
    }
}

/// How much of each record to check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyMode {
    /// Linkage plus content hashes (decrypting when needed).
    Full,
    /// Linkage only, from the clear chain fields.
    ChainOnly,
}

/// Verify `lines` as one chain.
///
/// Linkage is checked until the first mismatch, with an edited record's
/// recomputed hash as what its successor must link to. Content hashes are
/// checked for every record regardless.
pub fn verify_lines<R, C>(log: &str, lines: &[LogLine], codec: &C, mode: VerifyMode) -> IntegrityReport
where
    R: ChainRecord,
    C: RecordCodec<R> + ?Sized,
{
    let mut report = IntegrityReport::empty();
    report.total_records = lines.len();
    let mut expected_prev = GENESIS_HASH.to_string();
    let mut linkage_intact = true;

    for line in lines {
        let header = match codec.header(&line.text) {
            Ok(header) => header,
            Err(e) => {
                report.record(IntegrityFinding {
                    index: line.index,
                    record_id: None,
                    kind: FindingKind::MalformedRecord,
                    detail: e.to_string(),
                });
                linkage_intact = false;
                continue;
            }
        };

        if !is_hex_hash(&header.record_hash) {
            report.record(IntegrityFinding {
                index: line.index,
                record_id: Some(header.record_id.clone()),
                kind: FindingKind::MalformedRecord,
                detail: "record_hash is not a 64-character hex digest".into(),
            });
        }

        // An edited record no longer hashes to what its successor links to.
        let mut recomputed = None;
        if mode == VerifyMode::Full {
            match codec.content_hash(&line.text, &header) {
                Ok(computed) if computed == header.record_hash => {}
                Ok(computed) => {
                    report.record(IntegrityFinding {
                        index: line.index,
                        record_id: Some(header.record_id.clone()),
                        kind: FindingKind::ContentHashMismatch,
                        detail: format!(
                            "stored {} but content hashes to {}",
                            header.record_hash, computed
                        ),
                    });
                    recomputed = Some(computed);
                }
                Err(fault) => report.record(IntegrityFinding {
                    index: line.index,
                    record_id: Some(header.record_id.clone()),
                    kind: fault.kind,
                    detail: fault.detail,
                }),
            }
        }

        if linkage_intact {
            if header.prev_hash == expected_prev {
                expected_prev = recomputed.unwrap_or(header.record_hash);
            } else {
                report.record(IntegrityFinding {
                    index: line.index,
                    record_id: Some(header.record_id),
                    kind: FindingKind::LinkMismatch,
                    detail: format!(
                        "prev_hash {} does not match predecessor {}",
                        header.prev_hash, expected_prev
                    ),
                });
                linkage_intact = false;
            }
        }
    }

    if report.valid {
        info!(log = %log, records = report.total_records, ?mode, "Chain verified");
    } else {
        warn!(
            log = %log,
            records = report.total_records,
            findings = report.errors.len(),
            first_broken_index = ?report.first_broken_index,
            "Chain verification found integrity violations"
        );
    }
    report
}

fn is_hex_hash(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
