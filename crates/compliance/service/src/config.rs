//! Configuration for the compliance store

use std::fs;
use std::path::{Path, PathBuf};

use compliance_core::Durability;
use compliance_ledger::LedgerConfig;
use compliance_vault::{FieldMatcher, FieldRule, VaultConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

pub const ENV_ENABLED: &str = "CLAIMS_COMPLIANCE_ENABLED";
pub const ENV_ROOT: &str = "CLAIMS_COMPLIANCE_ROOT";
pub const ENV_ENCRYPTION: &str = "CLAIMS_COMPLIANCE_ENCRYPTION";
pub const ENV_KEY_FILE: &str = "CLAIMS_COMPLIANCE_KEY_FILE";
pub const ENV_DURABILITY: &str = "CLAIMS_COMPLIANCE_DURABILITY";

/// Main compliance configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Record anything at all; when false every log discards its writes
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Envelope encryption configuration
    #[serde(default)]
    pub encryption: EncryptionConfig,

    /// PII handling rules
    #[serde(default)]
    pub pii: PiiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage: StorageConfig::default(),
            encryption: EncryptionConfig::default(),
            pii: PiiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding both logs and the vault
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default)]
    pub durability: Durability,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            durability: Durability::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub enabled: bool,

    /// TOML key file or a single base64 line
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiConfig {
    /// Evaluated in order; the first match decides
    #[serde(default)]
    pub rules: Vec<FieldRule>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_root() -> PathBuf {
    PathBuf::from("./compliance")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ComplianceConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                root: root.into(),
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> ServiceResult<Self> {
        toml::from_str(text).map_err(|e| ServiceError::Configuration(e.to_string()))
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> ServiceResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            ServiceError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> ServiceResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `CLAIMS_COMPLIANCE_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ServiceResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_ENABLED) {
            self.enabled = parse_bool(ENV_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_ROOT) {
            self.storage.root = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_ENCRYPTION) {
            self.encryption.enabled = parse_bool(ENV_ENCRYPTION, &value)?;
        }
        if let Some(value) = lookup(ENV_KEY_FILE) {
            self.encryption.key_file = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_DURABILITY) {
            self.storage.durability = match value.trim().to_ascii_lowercase().as_str() {
                "atomic_replace" => Durability::AtomicReplace,
                "append_fsync" => Durability::AppendFsync,
                other => {
                    return Err(ServiceError::Configuration(format!(
                        "{ENV_DURABILITY}: unknown durability mode `{other}`"
                    )))
                }
            };
        }
        Ok(())
    }

    /// Startup checks. Nothing is created on disk.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.storage.root.as_os_str().is_empty() {
            return Err(ServiceError::Configuration(
                "storage.root must not be empty".into(),
            ));
        }
        if self.enabled && self.encryption.enabled {
            match &self.encryption.key_file {
                None => {
                    return Err(ServiceError::Configuration(
                        "encryption is enabled but encryption.key_file is not set".into(),
                    ))
                }
                Some(path) if !path.is_file() => {
                    return Err(ServiceError::Configuration(format!(
                        "key file {} does not exist",
                        path.display()
                    )))
                }
                Some(_) => {}
            }
        }
        self.field_matcher()?;
        Ok(())
    }

    pub fn field_matcher(&self) -> ServiceResult<FieldMatcher> {
        FieldMatcher::new(&self.pii.rules).map_err(|e| ServiceError::Configuration(e.to_string()))
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            root: self.storage.root.clone(),
            enabled: self.enabled,
            key_file: self
                .encryption
                .enabled
                .then(|| self.encryption.key_file.clone())
                .flatten(),
            durability: self.storage.durability,
        }
    }

    pub fn vault_config(&self) -> VaultConfig {
        VaultConfig {
            dir: self.storage.root.join("vault"),
            durability: self.storage.durability,
        }
    }
}

fn parse_bool(name: &str, value: &str) -> ServiceResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ServiceError::Configuration(format!(
            "{name}: expected a boolean, got `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliance_vault::Handling;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ComplianceConfig::default();
        assert!(config.enabled);
        assert!(!config.encryption.enabled);
        assert_eq!(config.storage.durability, Durability::AtomicReplace);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let config = ComplianceConfig::from_toml_str(
            r#"
            enabled = true

            [storage]
            root = "/var/lib/claims/compliance"
            durability = "append_fsync"

            [encryption]
            enabled = true
            key_file = "/etc/claims/kek.toml"

            [[pii.rules]]
            pattern = "(?i)^(claimant_)?(name|email|phone)$"
            kind = "regex"

            [[pii.rules]]
            pattern = "ssn"
            handling = "redact"

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.root, PathBuf::from("/var/lib/claims/compliance"));
        assert_eq!(config.storage.durability, Durability::AppendFsync);
        assert_eq!(config.pii.rules.len(), 2);
        assert_eq!(config.pii.rules[1].handling, Handling::Redact);
        assert!(config.logging.json);

        let ledger = config.ledger_config();
        assert_eq!(ledger.key_file, Some(PathBuf::from("/etc/claims/kek.toml")));
        assert_eq!(
            config.vault_config().dir,
            PathBuf::from("/var/lib/claims/compliance/vault")
        );
    }

    #[test]
    fn test_key_file_ignored_when_encryption_off() {
        let mut config = ComplianceConfig::with_root("/tmp/c");
        config.encryption.key_file = Some(PathBuf::from("/etc/kek"));
        assert_eq!(config.ledger_config().key_file, None);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_ENABLED, "false"),
            (ENV_ROOT, "/data/compliance"),
            (ENV_ENCRYPTION, "on"),
            (ENV_KEY_FILE, "/keys/kek"),
            (ENV_DURABILITY, "APPEND_FSYNC"),
        ]
        .into_iter()
        .collect();

        let mut config = ComplianceConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert!(!config.enabled);
        assert_eq!(config.storage.root, PathBuf::from("/data/compliance"));
        assert!(config.encryption.enabled);
        assert_eq!(config.encryption.key_file, Some(PathBuf::from("/keys/kek")));
        assert_eq!(config.storage.durability, Durability::AppendFsync);

        let err = config
            .apply_overrides(|name| (name == ENV_ENABLED).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ComplianceConfig::default();
        config.encryption.enabled = true;
        assert!(matches!(config.validate(), Err(ServiceError::Configuration(_))));

        config.encryption.key_file = Some(PathBuf::from("/nonexistent/kek.toml"));
        assert!(matches!(config.validate(), Err(ServiceError::Configuration(_))));

        let mut config = ComplianceConfig::default();
        config.pii.rules.push(FieldRule::regex("(broken"));
        assert!(matches!(config.validate(), Err(ServiceError::Configuration(_))));
    }
}
