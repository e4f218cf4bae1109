//! The composed compliance store handle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use compliance_core::{
    now_micros, ChainRecord, DecisionRecord, LlmCallRecord, QueryWindow, RecordFilter,
};
use compliance_crypto::KeyRing;
use compliance_ledger::{BackendKind, ComplianceLog, IntegrityReport, QueryPage, StorageFactory};
use compliance_vault::{FieldMatcher, PiiVault, ResolveOutcome, ShredReceipt};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::ComplianceConfig;
use crate::error::{ServiceError, ServiceResult};

/// Verification results for both logs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub valid: bool,
    pub decisions: IntegrityReport,
    pub llm_calls: IntegrityReport,
    pub checked_at: DateTime<Utc>,
}

/// Decision log, LLM-call log and PII vault opened from one configuration.
///
/// Records pass through the vault before they are appended, so personal
/// data never reaches the hash chain.
pub struct ComplianceService {
    config: ComplianceConfig,
    backend: BackendKind,
    decisions: Arc<dyn ComplianceLog<DecisionRecord>>,
    llm_calls: Arc<dyn ComplianceLog<LlmCallRecord>>,
    vault: Option<PiiVault>,
    matcher: FieldMatcher,
}

impl ComplianceService {
    pub fn open(config: ComplianceConfig) -> ServiceResult<Self> {
        config.validate()?;
        let matcher = config.field_matcher()?;

        let ledger_config = config.ledger_config();
        let factory = match (ledger_config.enabled, ledger_config.key_file.clone()) {
            (true, Some(path)) => {
                let keyring = KeyRing::from_file(&path).map_err(|e| {
                    ServiceError::Configuration(format!(
                        "cannot load key file {}: {e}",
                        path.display()
                    ))
                })?;
                StorageFactory::with_keyring(ledger_config, Arc::new(keyring))
            }
            _ => StorageFactory::new(ledger_config)?,
        };

        let decisions = factory.open::<DecisionRecord>()?;
        let llm_calls = factory.open::<LlmCallRecord>()?;
        let vault = if config.enabled {
            Some(PiiVault::open(&config.vault_config(), factory.keyring())?)
        } else {
            None
        };

        info!(
            root = %config.storage.root.display(),
            backend = %factory.variant(),
            pii_rules = matcher.len(),
            "Compliance service opened"
        );
        Ok(Self {
            backend: factory.variant(),
            config,
            decisions,
            llm_calls,
            vault,
            matcher,
        })
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn decisions(&self) -> &Arc<dyn ComplianceLog<DecisionRecord>> {
        &self.decisions
    }

    pub fn llm_calls(&self) -> &Arc<dyn ComplianceLog<LlmCallRecord>> {
        &self.llm_calls
    }

    pub fn vault(&self) -> Option<&PiiVault> {
        self.vault.as_ref()
    }

    /// Tokenize PII in the outcome, then append to the decision log.
    pub fn append_decision(&self, record: DecisionRecord) -> ServiceResult<DecisionRecord> {
        let record = self.tokenize(record)?;
        Ok(self.decisions.append(record)?)
    }

    /// Tokenize PII in the metadata, then append to the LLM-call log.
    pub fn append_llm_call(&self, record: LlmCallRecord) -> ServiceResult<LlmCallRecord> {
        let record = self.tokenize(record)?;
        Ok(self.llm_calls.append(record)?)
    }

    pub fn get_decision(&self, decision_id: &str) -> ServiceResult<DecisionRecord> {
        Ok(self.decisions.get_by_id(decision_id)?)
    }

    pub fn get_llm_call(&self, call_id: &str) -> ServiceResult<LlmCallRecord> {
        Ok(self.llm_calls.get_by_id(call_id)?)
    }

    pub fn query_decisions(
        &self,
        filter: &RecordFilter,
        window: QueryWindow,
    ) -> ServiceResult<QueryPage<DecisionRecord>> {
        Ok(self.decisions.query(filter, window)?)
    }

    pub fn query_llm_calls(
        &self,
        filter: &RecordFilter,
        window: QueryWindow,
    ) -> ServiceResult<QueryPage<LlmCallRecord>> {
        Ok(self.llm_calls.query(filter, window)?)
    }

    /// Verify both logs.
    pub fn verify_all(&self) -> ServiceResult<ComplianceReport> {
        let decisions = self.decisions.verify()?;
        let llm_calls = self.llm_calls.verify()?;
        let valid = decisions.valid && llm_calls.valid;
        if !valid {
            error!(
                decisions_broken_at = ?decisions.first_broken_index,
                llm_calls_broken_at = ?llm_calls.first_broken_index,
                "Compliance ledger failed verification"
            );
        }
        Ok(ComplianceReport {
            valid,
            decisions,
            llm_calls,
            checked_at: now_micros(),
        })
    }

    /// Apply the configured PII rules without appending.
    pub fn tokenize<R: ChainRecord>(&self, record: R) -> ServiceResult<R> {
        match &self.vault {
            Some(vault) => Ok(vault.tokenize(record, &self.matcher)?),
            None => Ok(record),
        }
    }

    pub fn resolve(&self, token: &str) -> ServiceResult<ResolveOutcome> {
        match &self.vault {
            Some(vault) => Ok(vault.resolve(token)?),
            None => Ok(ResolveOutcome::NotFound),
        }
    }

    /// Crypto-shred all PII stored for a claim. Ledger records are untouched.
    pub fn shred(&self, claim_id: &str) -> ServiceResult<ShredReceipt> {
        let vault = self.vault.as_ref().ok_or(ServiceError::Disabled)?;
        Ok(vault.shred(claim_id)?)
    }

    pub fn is_shredded(&self, claim_id: &str) -> ServiceResult<bool> {
        match &self.vault {
            Some(vault) => Ok(vault.is_shredded(claim_id)?),
            None => Ok(false),
        }
    }

    pub fn shutdown(self) {
        info!(root = %self.config.storage.root.display(), "Compliance service closed");
    }
}
