//! PII tokenization through the service and crypto-shredding per claim.

use std::fs;
use std::path::Path;
use std::sync::{Barrier, Mutex};

use compliance_crypto::KeyRing;
use compliance_service::{
    ComplianceConfig, ComplianceService, DecisionRecord, DecisionType, FieldRule, LlmCallRecord,
    LlmMessage, MessageRole, Rationale, ResolveOutcome, ServiceError,
};
use compliance_vault::VaultError;
use serde_json::{json, Value};

fn config(root: &Path) -> ComplianceConfig {
    let mut config = ComplianceConfig::with_root(root);
    config.pii.rules = vec![
        FieldRule::regex(r"(?i)^(claimant_)?(name|email|phone)$"),
        FieldRule::exact("iban").redact(),
    ];
    config
}

fn coverage(claim: &str, name: &str) -> DecisionRecord {
    DecisionRecord::new(
        DecisionType::Coverage,
        Rationale::new("policy in force on date of loss", 0.93),
        json!({
            "covered": true,
            "claimant_name": name,
            "contacts": [{"email": format!("{claim}@example.com")}],
            "payout": {"iban": "DE89370400440532013000", "amount": 1200}
        }),
    )
    .with_claim(claim)
}

fn resolved(service: &ComplianceService, token: &Value) -> ResolveOutcome {
    service.resolve(token.as_str().unwrap()).unwrap()
}

#[test]
fn ledger_holds_tokens_not_pii() {
    let dir = tempfile::tempdir().unwrap();
    let service = ComplianceService::open(config(dir.path())).unwrap();
    let stored = service.append_decision(coverage("C1", "Jane Doe")).unwrap();

    assert_eq!(stored.outcome["payout"]["iban"], json!("[REDACTED]"));
    assert_eq!(stored.outcome["payout"]["amount"], json!(1200));
    assert_eq!(
        resolved(&service, &stored.outcome["claimant_name"]),
        ResolveOutcome::Value(json!("Jane Doe"))
    );
    assert_eq!(
        resolved(&service, &stored.outcome["contacts"][0]["email"]),
        ResolveOutcome::Value(json!("C1@example.com"))
    );

    let ledger = fs::read_to_string(dir.path().join("decisions.jsonl")).unwrap();
    assert!(!ledger.contains("Jane Doe"));
    assert!(!ledger.contains("DE89370400440532013000"));
    assert!(service.verify_all().unwrap().valid);
}

#[test]
fn shred_affects_only_the_target_claim() {
    let dir = tempfile::tempdir().unwrap();
    let service = ComplianceService::open(config(dir.path())).unwrap();
    let c1 = service.append_decision(coverage("C1", "Jane Doe")).unwrap();
    let c2 = service.append_decision(coverage("C2", "John Roe")).unwrap();
    let call = service
        .append_llm_call(
            LlmCallRecord::new(
                "claims-extractor-v2",
                vec![LlmMessage::new(MessageRole::User, "summarize")],
            )
            .with_claim("C1")
            .with_metadata(json!({"claimant_phone": "+49 30 1234567"})),
        )
        .unwrap();

    let receipt = service.shred("C1").unwrap();
    assert_eq!(receipt.entries, 3);
    assert!(service.is_shredded("C1").unwrap());

    for token in [
        &c1.outcome["claimant_name"],
        &c1.outcome["contacts"][0]["email"],
        &call.metadata["claimant_phone"],
    ] {
        assert_eq!(
            resolved(&service, token),
            ResolveOutcome::Shredded {
                shredded_at: receipt.shredded_at
            }
        );
    }
    assert_eq!(
        resolved(&service, &c2.outcome["claimant_name"]),
        ResolveOutcome::Value(json!("John Roe"))
    );

    // The hash chain is unaffected by shredding.
    assert!(service.verify_all().unwrap().valid);

    let refused = service.append_decision(coverage("C1", "Jane Doe")).unwrap_err();
    assert!(matches!(
        refused,
        ServiceError::Vault(VaultError::Shredded { .. })
    ));
    assert_eq!(service.decisions().len().unwrap(), 2);
}

#[test]
fn shred_survives_restart_with_wrapped_keys() {
    let dir = tempfile::tempdir().unwrap();
    let key_file = dir.path().join("kek.toml");
    KeyRing::generate_key_file(&key_file).unwrap();
    let mut config = config(&dir.path().join("store"));
    config.encryption.enabled = true;
    config.encryption.key_file = Some(key_file);

    let (c1, c2) = {
        let service = ComplianceService::open(config.clone()).unwrap();
        let c1 = service.append_decision(coverage("C1", "Jane Doe")).unwrap();
        let c2 = service.append_decision(coverage("C2", "John Roe")).unwrap();
        service.shred("C1").unwrap();
        service.shutdown();
        (c1, c2)
    };

    let service = ComplianceService::open(config).unwrap();
    assert!(matches!(
        resolved(&service, &c1.outcome["claimant_name"]),
        ResolveOutcome::Shredded { .. }
    ));
    assert_eq!(
        resolved(&service, &c2.outcome["claimant_name"]),
        ResolveOutcome::Value(json!("John Roe"))
    );
    assert_eq!(service.get_decision(&c1.decision_id).unwrap(), c1);
    assert_eq!(service.vault().unwrap().entries_for_claim("C1").unwrap().len(), 2);
}

#[test]
fn pii_without_claim_is_rejected_before_append() {
    let dir = tempfile::tempdir().unwrap();
    let service = ComplianceService::open(config(dir.path())).unwrap();
    let record = DecisionRecord::new(
        DecisionType::Classification,
        Rationale::new("looks like a medical invoice", 0.71),
        json!({"claimant_email": "x@example.com"}),
    );

    let err = service.append_decision(record).unwrap_err();
    assert!(matches!(err, ServiceError::Vault(VaultError::MissingClaim { .. })));
    assert_eq!(service.decisions().len().unwrap(), 0);
}

#[test]
fn shred_is_serialized_with_concurrent_tokenization() {
    const WRITERS: usize = 4;
    const PER_WRITER: usize = 15;

    let dir = tempfile::tempdir().unwrap();
    let service = ComplianceService::open(config(dir.path())).unwrap();
    let barrier = Barrier::new(WRITERS + 1);
    let issued = Mutex::new(Vec::new());

    let receipt = std::thread::scope(|scope| {
        for w in 0..WRITERS {
            let (service, barrier, issued) = (&service, &barrier, &issued);
            scope.spawn(move || {
                barrier.wait();
                for i in 0..PER_WRITER {
                    match service.append_decision(coverage("C1", &format!("W{w} #{i}"))) {
                        Ok(record) => {
                            let token = record.outcome["claimant_name"].clone();
                            match resolved(service, &token) {
                                ResolveOutcome::Value(value) => {
                                    assert_eq!(value, json!(format!("W{w} #{i}")))
                                }
                                ResolveOutcome::Shredded { .. } => {}
                                ResolveOutcome::NotFound => panic!("issued token not found"),
                            }
                            issued.lock().unwrap().push(token);
                        }
                        Err(ServiceError::Vault(VaultError::Shredded { .. })) => {}
                        Err(other) => panic!("unexpected append failure: {other}"),
                    }
                }
            });
        }
        barrier.wait();
        service.shred("C1").unwrap()
    });

    let issued = issued.into_inner().unwrap();
    for token in &issued {
        assert_eq!(
            resolved(&service, token),
            ResolveOutcome::Shredded {
                shredded_at: receipt.shredded_at
            }
        );
    }

    // Nothing was sealed for the claim once its key was gone.
    let entries = service.vault().unwrap().entries_for_claim("C1").unwrap();
    assert_eq!(entries.len(), receipt.entries);
    assert_eq!(entries.len(), issued.len() * 2);
    assert!(entries.iter().all(|e| e.created_at <= receipt.shredded_at));
    assert_eq!(service.decisions().len().unwrap(), issued.len());
    assert!(service.verify_all().unwrap().valid);
}
