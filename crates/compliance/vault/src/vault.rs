//! Claim-scoped PII vault.
//!
//! Values matched by a [`FieldMatcher`] are sealed under one data key per
//! claim and replaced in the record by opaque tokens. Shredding a claim
//! destroys only its data key: the sealed entries stay on disk as evidence
//! that something was stored, but can never be opened again.
//!
//! On disk:
//! - `claim_keys.json`: per-claim keys (wrapped by the KEK when a key ring
//!   is configured) and shred tombstones, rewritten atomically
//! - `entries.jsonl`: sealed values, append-only

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use compliance_core::{now_micros, write_atomic, ChainRecord, Durability, LogFile, LogFileError};
use compliance_crypto::{open, seal, DataKey, EnvelopeCipher, KeyRing, SealedBox, WrappedKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{VaultError, VaultResult};
use crate::matcher::{FieldMatcher, Handling, REDACTED};

const TOKEN_PREFIX: &str = "pii_";
const KEYS_FILE: &str = "claim_keys.json";
const ENTRIES_FILE: &str = "entries.jsonl";
const KEYS_VERSION: u32 = 1;

/// Where the vault keeps its files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub durability: Durability,
}

impl VaultConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            durability: Durability::default(),
        }
    }
}

/// One sealed value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub token: String,
    pub claim_id: String,
    /// Path of the matched field, e.g. `outcome.claimant.email`.
    pub field: String,
    pub key_ref: String,
    #[serde(flatten)]
    pub sealed: SealedBox,
    pub created_at: DateTime<Utc>,
}

/// Result of resolving a token.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolveOutcome {
    Value(Value),
    /// The token existed but its claim was crypto-shredded.
    Shredded { shredded_at: DateTime<Utc> },
    NotFound,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShredReceipt {
    pub claim_id: String,
    pub shredded_at: DateTime<Utc>,
    /// Entries made permanently unreadable.
    pub entries: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ClaimKeyRecord {
    key_ref: String,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wrapped: Option<WrappedKey>,
    /// Unwrapped key, only when no key ring is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shredded_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ClaimKeyDoc {
    version: u32,
    claims: BTreeMap<String, ClaimKeyRecord>,
}

impl Default for ClaimKeyDoc {
    fn default() -> Self {
        Self {
            version: KEYS_VERSION,
            claims: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
struct VaultState {
    keys: ClaimKeyDoc,
    entries: HashMap<String, VaultEntry>,
    by_claim: HashMap<String, Vec<String>>,
}

impl VaultState {
    fn insert_entry(&mut self, entry: VaultEntry) {
        self.by_claim
            .entry(entry.claim_id.clone())
            .or_default()
            .push(entry.token.clone());
        self.entries.insert(entry.token.clone(), entry);
    }
}

struct Pending {
    token: String,
    field: String,
    value: Value,
}

pub struct PiiVault {
    keys_path: PathBuf,
    entries: LogFile,
    cipher: Option<EnvelopeCipher>,
    state: Mutex<VaultState>,
    claim_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PiiVault {
    /// Open the vault in `config.dir`, loading keys and entries.
    ///
    /// With a key ring, new claim keys are wrapped by its active KEK.
    pub fn open(config: &VaultConfig, keyring: Option<Arc<KeyRing>>) -> VaultResult<Self> {
        let entries = LogFile::open(config.dir.join(ENTRIES_FILE), config.durability)?;
        let keys_path = config.dir.join(KEYS_FILE);
        let keys = load_keys(&keys_path)?;

        let mut state = VaultState {
            keys,
            ..VaultState::default()
        };
        for line in entries.read_lines()? {
            match serde_json::from_str::<VaultEntry>(&line.text) {
                Ok(entry) => state.insert_entry(entry),
                Err(e) => warn!(index = line.index, error = %e, "Skipping malformed vault entry"),
            }
        }

        if keyring.is_none() {
            warn!(
                dir = %config.dir.display(),
                "PII vault has no key ring; claim keys are stored unwrapped"
            );
        }
        info!(
            dir = %config.dir.display(),
            claims = state.keys.claims.len(),
            entries = state.entries.len(),
            wrapped = keyring.is_some(),
            "PII vault opened"
        );

        Ok(Self {
            keys_path,
            entries,
            cipher: keyring.map(EnvelopeCipher::new),
            state: Mutex::new(state),
            claim_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Replace every matching field in the record's structured payloads.
    ///
    /// Tokenized values are sealed under the claim's data key, which is
    /// created on first use. Fails without storing anything if a field
    /// needs tokenizing and the record has no claim id, or if the claim
    /// has been shredded.
    pub fn tokenize<R: ChainRecord>(&self, mut record: R, matcher: &FieldMatcher) -> VaultResult<R> {
        if matcher.is_empty() {
            return Ok(record);
        }

        let mut pending = Vec::new();
        let mut redacted = 0usize;
        for (root, payload) in record.payloads_mut() {
            walk(payload, root.to_string(), matcher, &mut pending, &mut redacted);
        }
        if pending.is_empty() {
            if redacted > 0 {
                debug!(kind = %R::KIND, redacted, "Redacted fields");
            }
            return Ok(record);
        }

        let claim_id = match record.claim_id() {
            Some(id) if !id.trim().is_empty() => id.to_owned(),
            _ => {
                return Err(VaultError::MissingClaim {
                    field: pending[0].field.clone(),
                })
            }
        };
        let tokenized = pending.len();
        self.store_values(&claim_id, pending)?;
        debug!(kind = %R::KIND, claim_id = %claim_id, tokenized, redacted, "Tokenized fields");
        Ok(record)
    }

    pub fn resolve(&self, token: &str) -> VaultResult<ResolveOutcome> {
        let entry = match self.lock_state()?.entries.get(token) {
            Some(entry) => entry.clone(),
            None => return Ok(ResolveOutcome::NotFound),
        };

        let lock = self.claim_lock(&entry.claim_id)?;
        let _claim = lock.lock().map_err(|_| poisoned("claim"))?;
        let record = self
            .lock_state()?
            .keys
            .claims
            .get(&entry.claim_id)
            .cloned()
            .ok_or_else(|| {
                VaultError::Backend(format!("no key record for claim {}", entry.claim_id))
            })?;

        if let Some(shredded_at) = record.shredded_at {
            return Ok(ResolveOutcome::Shredded { shredded_at });
        }
        if record.key_ref != entry.key_ref {
            return Err(VaultError::Backend(format!(
                "entry {} references key {} but claim {} uses {}",
                entry.token, entry.key_ref, entry.claim_id, record.key_ref
            )));
        }

        let dek = self.data_key(&record)?;
        let aad = entry_aad(&entry.token, &entry.claim_id, &entry.field);
        let plaintext = open(&dek, &entry.sealed, &aad)?;
        Ok(ResolveOutcome::Value(serde_json::from_slice(&plaintext)?))
    }

    /// Destroy the claim's data key, leaving a tombstone. Idempotent.
    pub fn shred(&self, claim_id: &str) -> VaultResult<ShredReceipt> {
        let lock = self.claim_lock(claim_id)?;
        let _claim = lock.lock().map_err(|_| poisoned("claim"))?;
        let mut state = self.lock_state()?;

        let previous = state
            .keys
            .claims
            .get(claim_id)
            .and_then(|record| record.shredded_at);
        let shredded_at = match previous {
            Some(at) => at,
            None => {
                let now = now_micros();
                let mut doc = state.keys.clone();
                let record = doc
                    .claims
                    .entry(claim_id.to_owned())
                    .or_insert_with(|| ClaimKeyRecord {
                        key_ref: new_key_ref(),
                        created_at: now,
                        wrapped: None,
                        raw: None,
                        shredded_at: None,
                    });
                record.wrapped = None;
                record.raw = None;
                record.shredded_at = Some(now);
                self.persist_keys(&doc)?;
                state.keys = doc;
                now
            }
        };

        let entries = state.by_claim.get(claim_id).map_or(0, Vec::len);
        info!(
            claim_id,
            entries,
            shredded_at = %shredded_at,
            already = previous.is_some(),
            "Claim crypto-shredded"
        );
        Ok(ShredReceipt {
            claim_id: claim_id.to_owned(),
            shredded_at,
            entries,
        })
    }

    pub fn is_shredded(&self, claim_id: &str) -> VaultResult<bool> {
        Ok(self.shredded_at(claim_id)?.is_some())
    }

    pub fn shredded_at(&self, claim_id: &str) -> VaultResult<Option<DateTime<Utc>>> {
        Ok(self
            .lock_state()?
            .keys
            .claims
            .get(claim_id)
            .and_then(|record| record.shredded_at))
    }

    /// Entries stored for a claim, oldest first. Still listed after a shred.
    pub fn entries_for_claim(&self, claim_id: &str) -> VaultResult<Vec<VaultEntry>> {
        let state = self.lock_state()?;
        Ok(state
            .by_claim
            .get(claim_id)
            .into_iter()
            .flatten()
            .filter_map(|token| state.entries.get(token).cloned())
            .collect())
    }

    fn store_values(&self, claim_id: &str, pending: Vec<Pending>) -> VaultResult<()> {
        let lock = self.claim_lock(claim_id)?;
        let _claim = lock.lock().map_err(|_| poisoned("claim"))?;
        let mut state = self.lock_state()?;

        let existing = state.keys.claims.get(claim_id).cloned();
        let (key_ref, dek) = match existing {
            Some(record) => {
                if let Some(shredded_at) = record.shredded_at {
                    return Err(VaultError::Shredded {
                        claim_id: claim_id.to_owned(),
                        shredded_at,
                    });
                }
                let dek = self.data_key(&record)?;
                (record.key_ref, dek)
            }
            None => {
                let (record, dek) = self.new_key_record()?;
                let key_ref = record.key_ref.clone();
                let mut doc = state.keys.clone();
                doc.claims.insert(claim_id.to_owned(), record);
                self.persist_keys(&doc)?;
                state.keys = doc;
                info!(claim_id, key_ref = %key_ref, "Claim data key created");
                (key_ref, dek)
            }
        };

        // Seal everything before writing so a failure leaves no partial batch.
        let mut entries = Vec::with_capacity(pending.len());
        let mut lines = Vec::with_capacity(pending.len());
        for item in pending {
            let plaintext = serde_json::to_vec(&item.value)?;
            let sealed = seal(&dek, &plaintext, &entry_aad(&item.token, claim_id, &item.field))?;
            let entry = VaultEntry {
                token: item.token,
                claim_id: claim_id.to_owned(),
                field: item.field,
                key_ref: key_ref.clone(),
                sealed,
                created_at: now_micros(),
            };
            lines.push(serde_json::to_string(&entry)?);
            entries.push(entry);
        }
        self.entries.append_lines(&lines)?;
        for entry in entries {
            state.insert_entry(entry);
        }
        Ok(())
    }

    fn new_key_record(&self) -> VaultResult<(ClaimKeyRecord, DataKey)> {
        let dek = DataKey::generate();
        let (wrapped, raw) = match &self.cipher {
            Some(cipher) => (Some(cipher.wrap_key(&dek)?), None),
            None => (None, Some(dek.to_base64())),
        };
        let record = ClaimKeyRecord {
            key_ref: new_key_ref(),
            created_at: now_micros(),
            wrapped,
            raw,
            shredded_at: None,
        };
        Ok((record, dek))
    }

    fn data_key(&self, record: &ClaimKeyRecord) -> VaultResult<DataKey> {
        match (&record.wrapped, &record.raw, &self.cipher) {
            (Some(wrapped), _, Some(cipher)) => Ok(cipher.unwrap_key(wrapped)?),
            (Some(wrapped), _, None) => Err(VaultError::Configuration(format!(
                "claim key {} is wrapped by {} but no key ring is configured",
                record.key_ref, wrapped.kek_id
            ))),
            (None, Some(raw), _) => Ok(DataKey::from_base64(raw)?),
            (None, None, _) => Err(VaultError::Backend(format!(
                "claim key {} has no key material",
                record.key_ref
            ))),
        }
    }

    fn persist_keys(&self, doc: &ClaimKeyDoc) -> VaultResult<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        write_atomic(&self.keys_path, &bytes)?;
        Ok(())
    }

    fn lock_state(&self) -> VaultResult<MutexGuard<'_, VaultState>> {
        self.state.lock().map_err(|_| poisoned("state"))
    }

    fn claim_lock(&self, claim_id: &str) -> VaultResult<Arc<Mutex<()>>> {
        let mut locks = self.claim_locks.lock().map_err(|_| poisoned("claim table"))?;
        Ok(locks.entry(claim_id.to_owned()).or_default().clone())
    }
}

fn load_keys(path: &Path) -> VaultResult<ClaimKeyDoc> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ClaimKeyDoc::default()),
        Err(source) => Err(VaultError::Storage(LogFileError::Io {
            path: path.to_path_buf(),
            source,
        })),
    }
}

fn walk(
    value: &mut Value,
    path: String,
    matcher: &FieldMatcher,
    pending: &mut Vec<Pending>,
    redacted: &mut usize,
) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let child_path = format!("{path}.{key}");
                match matcher.handling_for(key) {
                    Some(_) if child.is_null() => {}
                    Some(_) if child.as_str().is_some_and(is_token) => {}
                    Some(Handling::Tokenize) => {
                        let token = new_token();
                        let original = std::mem::replace(child, Value::String(token.clone()));
                        pending.push(Pending {
                            token,
                            field: child_path,
                            value: original,
                        });
                    }
                    Some(Handling::Redact) => {
                        *child = Value::String(REDACTED.to_string());
                        *redacted += 1;
                    }
                    None => walk(child, child_path, matcher, pending, redacted),
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                walk(item, format!("{path}[{i}]"), matcher, pending, redacted);
            }
        }
        _ => {}
    }
}

fn entry_aad(token: &str, claim_id: &str, field: &str) -> Vec<u8> {
    format!("{token}\n{claim_id}\n{field}").into_bytes()
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn new_token() -> String {
    format!("{TOKEN_PREFIX}{}", random_hex(16))
}

fn new_key_ref() -> String {
    format!("ck-{}", random_hex(8))
}

fn poisoned(what: &str) -> VaultError {
    VaultError::Backend(format!("vault {what} lock poisoned"))
}

/// Whether `value` has the shape of a vault token.
pub fn is_token(value: &str) -> bool {
    value.len() == TOKEN_PREFIX.len() + 32
        && value.starts_with(TOKEN_PREFIX)
        && value[TOKEN_PREFIX.len()..]
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::FieldRule;
    use compliance_core::{DecisionRecord, DecisionType, LlmCallRecord, LlmMessage, MessageRole, Rationale};
    use compliance_crypto::Kek;
    use serde_json::json;

    fn matcher() -> FieldMatcher {
        FieldMatcher::new(&[
            FieldRule::regex(r"(?i)^(claimant_)?(name|email)$"),
            FieldRule::exact("policy_holder"),
            FieldRule::exact("ssn").redact(),
        ])
        .unwrap()
    }

    fn decision(claim: Option<&str>) -> DecisionRecord {
        let record = DecisionRecord::new(
            DecisionType::Coverage,
            Rationale::new("policy active on loss date", 0.88),
            json!({
                "covered": true,
                "claimant_name": "Jane Doe",
                "ssn": "123-45-6789",
                "parties": [
                    {"role": "witness", "email": "w@example.com"},
                    {"role": "insurer", "email": null}
                ],
                "policy_holder": {"first": "Jane", "last": "Doe", "age": 41}
            }),
        );
        match claim {
            Some(claim) => record.with_claim(claim),
            None => record,
        }
    }

    fn open_vault(dir: &Path, keyring: Option<Arc<KeyRing>>) -> PiiVault {
        PiiVault::open(&VaultConfig::new(dir), keyring).unwrap()
    }

    fn resolve_value(vault: &PiiVault, token: &Value) -> Value {
        match vault.resolve(token.as_str().unwrap()).unwrap() {
            ResolveOutcome::Value(value) => value,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn tokenize_replaces_matches_and_resolve_restores_them() {
        let dir = tempfile::tempdir().unwrap();
        let vault = open_vault(dir.path(), None);
        let record = vault.tokenize(decision(Some("C1")), &matcher()).unwrap();
        let outcome = &record.outcome;

        assert_eq!(outcome["covered"], json!(true));
        assert_eq!(outcome["ssn"], json!(REDACTED));
        assert_eq!(outcome["parties"][1]["email"], Value::Null);
        assert!(is_token(outcome["claimant_name"].as_str().unwrap()));
        assert!(is_token(outcome["parties"][0]["email"].as_str().unwrap()));

        assert_eq!(resolve_value(&vault, &outcome["claimant_name"]), json!("Jane Doe"));
        assert_eq!(
            resolve_value(&vault, &outcome["policy_holder"]),
            json!({"first": "Jane", "last": "Doe", "age": 41})
        );

        let entries = vault.entries_for_claim("C1").unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.key_ref == entries[0].key_ref));
        assert!(entries.iter().any(|e| e.field == "outcome.parties[0].email"));
        let on_disk = fs::read_to_string(dir.path().join(ENTRIES_FILE)).unwrap();
        assert!(!on_disk.contains("Jane Doe"));
        assert!(!on_disk.contains("123-45-6789"));
    }

    #[test]
    fn tokenizing_twice_leaves_tokens_alone() {
        let dir = tempfile::tempdir().unwrap();
        let vault = open_vault(dir.path(), None);
        let once = vault.tokenize(decision(Some("C1")), &matcher()).unwrap();
        let twice = vault.tokenize(once.clone(), &matcher()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(vault.entries_for_claim("C1").unwrap().len(), 3);
    }

    #[test]
    fn llm_metadata_is_tokenized() {
        let dir = tempfile::tempdir().unwrap();
        let vault = open_vault(dir.path(), None);
        let call = LlmCallRecord::new("m", vec![LlmMessage::new(MessageRole::User, "hi")])
            .with_claim("C7")
            .with_metadata(json!({"request": {"claimant_email": "a@b.c"}}));
        let call = vault.tokenize(call, &matcher()).unwrap();
        let token = call.metadata["request"]["claimant_email"].clone();
        assert_eq!(resolve_value(&vault, &token), json!("a@b.c"));
    }

    #[test]
    fn matches_without_claim_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let vault = open_vault(dir.path(), None);
        let err = vault.tokenize(decision(None), &matcher()).unwrap_err();
        assert!(matches!(err, VaultError::MissingClaim { .. }));
        assert!(!dir.path().join(KEYS_FILE).exists());

        // Redaction alone needs no claim.
        let redact_only = FieldMatcher::new(&[FieldRule::exact("ssn").redact()]).unwrap();
        let record = vault.tokenize(decision(None), &redact_only).unwrap();
        assert_eq!(record.outcome["ssn"], json!(REDACTED));
    }

    #[test]
    fn shred_destroys_only_that_claim() {
        let dir = tempfile::tempdir().unwrap();
        let vault = open_vault(dir.path(), None);
        let c1 = vault.tokenize(decision(Some("C1")), &matcher()).unwrap();
        let c2 = vault.tokenize(decision(Some("C2")), &matcher()).unwrap();

        let receipt = vault.shred("C1").unwrap();
        assert_eq!(receipt.entries, 3);
        assert!(vault.is_shredded("C1").unwrap());
        assert!(!vault.is_shredded("C2").unwrap());

        let token = c1.outcome["claimant_name"].as_str().unwrap();
        assert_eq!(
            vault.resolve(token).unwrap(),
            ResolveOutcome::Shredded {
                shredded_at: receipt.shredded_at
            }
        );
        assert_eq!(resolve_value(&vault, &c2.outcome["claimant_name"]), json!("Jane Doe"));
        assert_eq!(vault.resolve("pii_0000").unwrap(), ResolveOutcome::NotFound);

        // Ciphertext rows stay; key material does not.
        assert_eq!(vault.entries_for_claim("C1").unwrap().len(), 3);
        let keys: Value =
            serde_json::from_slice(&fs::read(dir.path().join(KEYS_FILE)).unwrap()).unwrap();
        let c1_keys = &keys["claims"]["C1"];
        assert!(c1_keys.get("raw").is_none());
        assert!(c1_keys.get("wrapped").is_none());
        assert!(c1_keys["shredded_at"].is_string());

        let again = vault.shred("C1").unwrap();
        assert_eq!(again.shredded_at, receipt.shredded_at);

        let err = vault.tokenize(decision(Some("C1")), &matcher()).unwrap_err();
        assert!(matches!(err, VaultError::Shredded { claim_id, .. } if claim_id == "C1"));
    }

    #[test]
    fn shredding_an_unknown_claim_blocks_future_tokenization() {
        let dir = tempfile::tempdir().unwrap();
        let vault = open_vault(dir.path(), None);
        assert_eq!(vault.shred("C-new").unwrap().entries, 0);
        assert!(matches!(
            vault.tokenize(decision(Some("C-new")), &matcher()),
            Err(VaultError::Shredded { .. })
        ));
    }

    #[test]
    fn wrapped_keys_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let ring = Arc::new(KeyRing::new(Kek::new("kek-vault", DataKey::generate())));
        let record = {
            let vault = open_vault(dir.path(), Some(ring.clone()));
            vault.tokenize(decision(Some("C1")), &matcher()).unwrap()
        };

        let keys = fs::read_to_string(dir.path().join(KEYS_FILE)).unwrap();
        assert!(keys.contains("kek-vault"));
        assert!(!keys.contains("\"raw\""));

        let vault = open_vault(dir.path(), Some(ring));
        assert_eq!(
            resolve_value(&vault, &record.outcome["claimant_name"]),
            json!("Jane Doe")
        );

        let without_ring = open_vault(dir.path(), None);
        assert!(matches!(
            without_ring.resolve(record.outcome["claimant_name"].as_str().unwrap()),
            Err(VaultError::Configuration(_))
        ));
    }

    #[test]
    fn poisoned_state_lock_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let vault = open_vault(dir.path(), None);
        std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                let _guard = vault.state.lock().unwrap();
                panic!("writer died holding the vault state");
            });
            assert!(handle.join().is_err());
        });

        assert!(matches!(vault.is_shredded("C1"), Err(VaultError::Backend(_))));
        assert!(matches!(
            vault.tokenize(decision(Some("C1")), &matcher()),
            Err(VaultError::Backend(_))
        ));
    }

    #[test]
    fn tokenized_batch_lands_in_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let vault = open_vault(dir.path(), None);
        vault.tokenize(decision(Some("C1")), &matcher()).unwrap();

        let reopened = open_vault(dir.path(), None);
        let entries = reopened.entries_for_claim("C1").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries, vault.entries_for_claim("C1").unwrap());
    }

    #[test]
    fn token_shape() {
        let token = new_token();
        assert!(is_token(&token));
        assert_eq!(token.len(), 36);
        assert!(!is_token("pii_XYZ"));
        assert!(!is_token("Jane Doe"));
    }
}
