use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which log a record type belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Decision,
    LlmCall,
}

impl RecordKind {
    /// File stem of the log holding this kind of record.
    pub fn log_name(self) -> &'static str {
        match self {
            RecordKind::Decision => "decisions",
            RecordKind::LlmCall => "llm_calls",
        }
    }

    /// JSON field carrying the record identifier.
    pub fn id_field(self) -> &'static str {
        match self {
            RecordKind::Decision => "decision_id",
            RecordKind::LlmCall => "call_id",
        }
    }

    fn id_prefix(self) -> &'static str {
        match self {
            RecordKind::Decision => "dec",
            RecordKind::LlmCall => "llm",
        }
    }

    /// Generate a fresh identifier for a record of this kind.
    pub fn generate_id(self) -> String {
        format!("{}-{}", self.id_prefix(), uuid::Uuid::new_v4())
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.log_name())
    }
}

/// Category of an automated decision taken while processing a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Classification,
    Extraction,
    Coverage,
    Assessment,
    Validation,
    Routing,
    HumanReview,
    Other,
}

/// Why a decision was taken.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub summary: String,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

impl Rationale {
    pub fn new(summary: impl Into<String>, confidence: f64) -> Self {
        Self {
            summary: summary.into(),
            confidence,
        }
    }
}

/// Ledger entry for one automated decision.
///
/// Immutable once appended. `decision_id` may be left empty; the appender
/// assigns one. `prev_hash` / `record_hash` are set by the appender.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    #[serde(default)]
    pub decision_id: String,
    pub decision_type: DecisionType,
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub claim_id: Option<String>,
    pub rationale: Rationale,
    /// Structured result; schema depends on `decision_type`.
    #[serde(default)]
    pub outcome: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub prev_hash: String,
    #[serde(default)]
    pub record_hash: String,
}

impl DecisionRecord {
    pub fn new(decision_type: DecisionType, rationale: Rationale, outcome: Value) -> Self {
        Self {
            decision_id: String::new(),
            decision_type,
            doc_id: None,
            claim_id: None,
            rationale,
            outcome,
            created_at: now_micros(),
            prev_hash: String::new(),
            record_hash: String::new(),
        }
    }

    pub fn with_claim(mut self, claim_id: impl Into<String>) -> Self {
        self.claim_id = Some(claim_id.into());
        self
    }

    pub fn with_doc(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    pub fn with_id(mut self, decision_id: impl Into<String>) -> Self {
        self.decision_id = decision_id.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Role of a message in an LLM conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ledger entry for one call made to a language model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmCallRecord {
    #[serde(default)]
    pub call_id: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub messages: Vec<LlmMessage>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub decision_id: Option<String>,
    #[serde(default)]
    pub claim_id: Option<String>,
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    /// Free-form structured call context (request parameters, tool payloads).
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub prev_hash: String,
    #[serde(default)]
    pub record_hash: String,
}

impl LlmCallRecord {
    pub fn new(model: impl Into<String>, messages: Vec<LlmMessage>) -> Self {
        Self {
            call_id: String::new(),
            model: model.into(),
            temperature: 0.0,
            max_tokens: 1024,
            messages,
            response: None,
            decision_id: None,
            claim_id: None,
            doc_id: None,
            prompt_tokens: 0,
            completion_tokens: 0,
            latency_ms: None,
            metadata: Value::Null,
            created_at: now_micros(),
            prev_hash: String::new(),
            record_hash: String::new(),
        }
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.prompt_tokens = prompt_tokens;
        self.completion_tokens = completion_tokens;
        self
    }

    pub fn with_decision(mut self, decision_id: impl Into<String>) -> Self {
        self.decision_id = Some(decision_id.into());
        self
    }

    pub fn with_claim(mut self, claim_id: impl Into<String>) -> Self {
        self.claim_id = Some(claim_id.into());
        self
    }

    pub fn with_doc(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Common surface of every record type stored in a hash-chained log.
pub trait ChainRecord:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    const KIND: RecordKind;

    fn record_id(&self) -> &str;
    fn set_record_id(&mut self, id: String);
    fn prev_hash(&self) -> &str;
    fn record_hash(&self) -> &str;
    fn set_chain_link(&mut self, prev_hash: String, record_hash: String);
    fn created_at(&self) -> DateTime<Utc>;
    fn set_created_at(&mut self, created_at: DateTime<Utc>);
    fn claim_id(&self) -> Option<&str>;

    /// Structured payloads that may carry personal data.
    fn payloads_mut(&mut self) -> Vec<(&'static str, &mut Value)>;

    /// Check that required business fields are populated.
    fn validate(&self) -> Result<(), String>;

    fn matches(&self, filter: &RecordFilter) -> bool;
}

impl ChainRecord for DecisionRecord {
    const KIND: RecordKind = RecordKind::Decision;

    fn record_id(&self) -> &str {
        &self.decision_id
    }

    fn set_record_id(&mut self, id: String) {
        self.decision_id = id;
    }

    fn prev_hash(&self) -> &str {
        &self.prev_hash
    }

    fn record_hash(&self) -> &str {
        &self.record_hash
    }

    fn set_chain_link(&mut self, prev_hash: String, record_hash: String) {
        self.prev_hash = prev_hash;
        self.record_hash = record_hash;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_created_at(&mut self, created_at: DateTime<Utc>) {
        self.created_at = created_at;
    }

    fn claim_id(&self) -> Option<&str> {
        self.claim_id.as_deref()
    }

    fn payloads_mut(&mut self) -> Vec<(&'static str, &mut Value)> {
        vec![("outcome", &mut self.outcome)]
    }

    fn validate(&self) -> Result<(), String> {
        if self.rationale.summary.trim().is_empty() {
            return Err("rationale summary must not be empty".into());
        }
        let confidence = self.rationale.confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence {confidence} is outside [0, 1]"));
        }
        Ok(())
    }

    fn matches(&self, filter: &RecordFilter) -> bool {
        if filter.model.is_some() {
            return false;
        }
        if let Some(decision_type) = filter.decision_type {
            if self.decision_type != decision_type {
                return false;
            }
        }
        if let Some(decision_id) = &filter.decision_id {
            if &self.decision_id != decision_id {
                return false;
            }
        }
        filter.matches_common(self.claim_id.as_deref(), self.doc_id.as_deref(), self.created_at)
    }
}

impl ChainRecord for LlmCallRecord {
    const KIND: RecordKind = RecordKind::LlmCall;

    fn record_id(&self) -> &str {
        &self.call_id
    }

    fn set_record_id(&mut self, id: String) {
        self.call_id = id;
    }

    fn prev_hash(&self) -> &str {
        &self.prev_hash
    }

    fn record_hash(&self) -> &str {
        &self.record_hash
    }

    fn set_chain_link(&mut self, prev_hash: String, record_hash: String) {
        self.prev_hash = prev_hash;
        self.record_hash = record_hash;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_created_at(&mut self, created_at: DateTime<Utc>) {
        self.created_at = created_at;
    }

    fn claim_id(&self) -> Option<&str> {
        self.claim_id.as_deref()
    }

    fn payloads_mut(&mut self) -> Vec<(&'static str, &mut Value)> {
        vec![("metadata", &mut self.metadata)]
    }

    fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model identifier must not be empty".into());
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(format!("temperature {} is invalid", self.temperature));
        }
        Ok(())
    }

    fn matches(&self, filter: &RecordFilter) -> bool {
        if filter.decision_type.is_some() {
            return false;
        }
        if let Some(model) = &filter.model {
            if &self.model != model {
                return false;
            }
        }
        if let Some(decision_id) = &filter.decision_id {
            if self.decision_id.as_ref() != Some(decision_id) {
                return false;
            }
        }
        filter.matches_common(self.claim_id.as_deref(), self.doc_id.as_deref(), self.created_at)
    }
}

/// Conjunctive query filter over a compliance log.
///
/// `since` is inclusive, `until` exclusive. Filters that do not apply to a
/// record type (e.g. `model` on decisions) never match it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub decision_type: Option<DecisionType>,
    pub doc_id: Option<String>,
    pub claim_id: Option<String>,
    pub decision_id: Option<String>,
    pub model: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Reverse chain order in the result.
    #[serde(default)]
    pub newest_first: bool,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decision_type(mut self, decision_type: DecisionType) -> Self {
        self.decision_type = Some(decision_type);
        self
    }

    pub fn doc(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    pub fn claim(mut self, claim_id: impl Into<String>) -> Self {
        self.claim_id = Some(claim_id.into());
        self
    }

    pub fn decision(mut self, decision_id: impl Into<String>) -> Self {
        self.decision_id = Some(decision_id.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    fn matches_common(
        &self,
        claim_id: Option<&str>,
        doc_id: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> bool {
        if let Some(expected) = &self.claim_id {
            if claim_id != Some(expected.as_str()) {
                return false;
            }
        }
        if let Some(expected) = &self.doc_id {
            if doc_id != Some(expected.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if created_at >= until {
                return false;
            }
        }
        true
    }
}

/// Paged read window. `limit == 0` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    pub fn all() -> Self {
        Self::default()
    }
}

pub fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

/// Current time truncated to the precision persisted in the log.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
