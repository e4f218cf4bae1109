//! Key material: data keys, key-encryption keys, and the key ring.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// A 256-bit symmetric key. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; KEY_LEN]);

impl DataKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::KeyMaterial(format!(
                "expected {KEY_LEN} key bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::KeyMaterial(format!("base64: {e}")))?;
        let key = Self::from_slice(&raw);
        raw.zeroize();
        key
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Short stable identifier derived from the key bytes.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        hash.to_hex().as_str()[..8].to_string()
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(<redacted>)")
    }
}

/// A named key-encryption key.
#[derive(Clone, Debug)]
pub struct Kek {
    pub id: String,
    pub key: DataKey,
}

impl Kek {
    pub fn new(id: impl Into<String>, key: DataKey) -> Self {
        Self { id: id.into(), key }
    }
}

/// On-disk key file.
#[derive(Debug, Serialize, Deserialize)]
struct KeyFileDoc {
    active: String,
    keys: BTreeMap<String, String>,
}

/// One active KEK used for new wraps plus previous KEKs kept for unwrapping.
#[derive(Clone, Debug)]
pub struct KeyRing {
    active: Kek,
    previous: Vec<Kek>,
}

impl KeyRing {
    pub fn new(active: Kek) -> Self {
        Self {
            active,
            previous: Vec::new(),
        }
    }

    /// Add a retired KEK that may still be needed to unwrap old data keys.
    pub fn with_previous(mut self, kek: Kek) -> Self {
        if kek.id != self.active.id && self.get(&kek.id).is_none() {
            self.previous.push(kek);
        }
        self
    }

    /// Parse key-file text.
    ///
    /// Accepts either a TOML document (`active = "<id>"` plus a `[keys]`
    /// table of base64 keys) or a single line holding one base64 key, whose
    /// id is derived from its fingerprint.
    pub fn parse(text: &str) -> Result<Self, CryptoError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CryptoError::KeyMaterial("key file is empty".into()));
        }

        if is_bare_base64(trimmed) {
            let key = DataKey::from_base64(trimmed)?;
            let id = format!("kek-{}", key.fingerprint());
            return Ok(Self::new(Kek::new(id, key)));
        }

        let doc: KeyFileDoc = toml::from_str(trimmed)
            .map_err(|e| CryptoError::KeyMaterial(format!("key file: {e}")))?;
        let mut active = None;
        let mut previous = Vec::new();
        for (id, encoded) in &doc.keys {
            let key = DataKey::from_base64(encoded)
                .map_err(|e| CryptoError::KeyMaterial(format!("key `{id}`: {e}")))?;
            if *id == doc.active {
                active = Some(Kek::new(id.clone(), key));
            } else {
                previous.push(Kek::new(id.clone(), key));
            }
        }
        let active = active.ok_or_else(|| {
            CryptoError::KeyMaterial(format!("active key `{}` is not in [keys]", doc.active))
        })?;
        Ok(Self { active, previous })
    }

    pub fn from_file(path: &Path) -> Result<Self, CryptoError> {
        let text = fs::read_to_string(path).map_err(|source| CryptoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ring = Self::parse(&text)?;
        info!(
            path = %path.display(),
            active = %ring.active.id,
            previous = ring.previous.len(),
            "Key ring loaded"
        );
        Ok(ring)
    }

    /// Create a new key file holding one freshly generated KEK.
    ///
    /// Fails if the file already exists. On unix the file is readable by
    /// its owner only.
    pub fn generate_key_file(path: &Path) -> Result<Self, CryptoError> {
        let key = DataKey::generate();
        let id = format!("kek-{}", key.fingerprint());
        let mut keys = BTreeMap::new();
        keys.insert(id.clone(), key.to_base64());
        let doc = KeyFileDoc {
            active: id.clone(),
            keys,
        };
        let text = toml::to_string(&doc)
            .map_err(|e| CryptoError::KeyMaterial(format!("encode key file: {e}")))?;

        let io_err = |source| CryptoError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)
            .map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }
        file.write_all(text.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        info!(path = %path.display(), kek_id = %id, "Key file generated");
        Ok(Self::new(Kek::new(id, key)))
    }

    pub fn active(&self) -> &Kek {
        &self.active
    }

    pub fn get(&self, id: &str) -> Option<&Kek> {
        if self.active.id == id {
            return Some(&self.active);
        }
        self.previous.iter().find(|kek| kek.id == id)
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.active.id.as_str()).chain(self.previous.iter().map(|k| k.id.as_str()))
    }
}

fn is_bare_base64(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
}
