//! Storage variant selection.

use std::path::PathBuf;
use std::sync::Arc;

use compliance_core::{ChainRecord, Durability};
#[cfg(feature = "encryption")]
use compliance_crypto::{EnvelopeCipher, KeyRing};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chain_log::HashChainLog;
#[cfg(feature = "encryption")]
use crate::codec::EnvelopeCodec;
use crate::codec::JsonLineCodec;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{BackendKind, ComplianceLog, NullLog};

/// Where and how the compliance logs are stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub root: PathBuf,
    /// When false every log is the discarding null variant.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Key file for the encrypted variant; `None` stores plaintext.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub durability: Durability,
}

fn default_enabled() -> bool {
    true
}

impl LedgerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            enabled: true,
            key_file: None,
            durability: Durability::default(),
        }
    }

    pub fn with_key_file(mut self, key_file: impl Into<PathBuf>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Builds logs of one configured variant.
pub struct StorageFactory {
    config: LedgerConfig,
    variant: BackendKind,
    #[cfg(feature = "encryption")]
    keyring: Option<Arc<KeyRing>>,
}

impl StorageFactory {
    /// Resolve the variant, loading key material when a key file is set.
    pub fn new(config: LedgerConfig) -> LedgerResult<Self> {
        if !config.enabled {
            return Ok(Self::with_variant(config, BackendKind::Null));
        }
        match config.key_file.clone() {
            None => Ok(Self::with_variant(config, BackendKind::Plain)),
            #[cfg(feature = "encryption")]
            Some(path) => {
                let keyring = KeyRing::from_file(&path).map_err(|e| {
                    LedgerError::Configuration(format!(
                        "cannot load key file {}: {e}",
                        path.display()
                    ))
                })?;
                Ok(Self::with_keyring(config, Arc::new(keyring)))
            }
            #[cfg(not(feature = "encryption"))]
            Some(path) => Err(LedgerError::Configuration(format!(
                "key file {} configured but encryption support is not compiled in",
                path.display()
            ))),
        }
    }

    /// Encrypted variant over an already loaded key ring.
    #[cfg(feature = "encryption")]
    pub fn with_keyring(config: LedgerConfig, keyring: Arc<KeyRing>) -> Self {
        if !config.enabled {
            return Self::with_variant(config, BackendKind::Null);
        }
        Self {
            config,
            variant: BackendKind::Encrypted,
            keyring: Some(keyring),
        }
    }

    fn with_variant(config: LedgerConfig, variant: BackendKind) -> Self {
        Self {
            config,
            variant,
            #[cfg(feature = "encryption")]
            keyring: None,
        }
    }

    pub fn variant(&self) -> BackendKind {
        self.variant
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    #[cfg(feature = "encryption")]
    pub fn keyring(&self) -> Option<Arc<KeyRing>> {
        self.keyring.clone()
    }

    /// Open the log for record type `R` under the configured root.
    pub fn open<R: ChainRecord>(&self) -> LedgerResult<Arc<dyn ComplianceLog<R>>> {
        let log: Arc<dyn ComplianceLog<R>> = match self.variant {
            BackendKind::Null => Arc::new(NullLog::<R>::new()),
            BackendKind::Plain => Arc::new(HashChainLog::<R, _>::open(
                &self.config.root,
                JsonLineCodec,
                self.config.durability,
            )?),
            BackendKind::Encrypted => self.open_encrypted::<R>()?,
        };
        info!(kind = %R::KIND, variant = %self.variant, "Compliance log ready");
        Ok(log)
    }

    #[cfg(feature = "encryption")]
    fn open_encrypted<R: ChainRecord>(&self) -> LedgerResult<Arc<dyn ComplianceLog<R>>> {
        let keyring = self.keyring.clone().ok_or_else(|| {
            LedgerError::Configuration("encrypted storage requires key material".into())
        })?;
        let codec = EnvelopeCodec::new(EnvelopeCipher::new(keyring));
        Ok(Arc::new(HashChainLog::<R, _>::open(
            &self.config.root,
            codec,
            self.config.durability,
        )?))
    }

    #[cfg(not(feature = "encryption"))]
    fn open_encrypted<R: ChainRecord>(&self) -> LedgerResult<Arc<dyn ComplianceLog<R>>> {
        Err(LedgerError::Configuration(
            "encryption support is not compiled in".into(),
        ))
    }
}

/// Open one log straight from configuration.
pub fn open_log<R: ChainRecord>(config: &LedgerConfig) -> LedgerResult<Arc<dyn ComplianceLog<R>>> {
    StorageFactory::new(config.clone())?.open()
}
