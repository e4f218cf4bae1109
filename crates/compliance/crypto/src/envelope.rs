//! AES-256-GCM sealing and the two-level envelope.

use std::sync::Arc;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::{DataKey, KeyRing};

/// Envelope layout version written into every envelope.
pub const ENVELOPE_VERSION: u8 = 1;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Output of one AES-256-GCM seal with the tag kept apart from the body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
}

/// A data key sealed under a named KEK.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub kek_id: String,
    #[serde(flatten)]
    pub sealed: SealedBox,
}

/// A payload sealed under a one-off DEK, plus that DEK wrapped by a KEK.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u8,
    pub kek_id: String,
    pub wrapped_dek: SealedBox,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
}

impl Envelope {
    fn body(&self) -> SealedBox {
        SealedBox {
            nonce: self.nonce.clone(),
            ciphertext: self.ciphertext.clone(),
            tag: self.tag.clone(),
        }
    }
}

/// Seal `plaintext` under `key` with a fresh random nonce.
pub fn seal(key: &DataKey, plaintext: &[u8], aad: &[u8]) -> Result<SealedBox, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::KeyMaterial(e.to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Malformed("encryption failed".into()))?;
    let tag = ciphertext.split_off(ciphertext.len() - TAG_LEN);

    Ok(SealedBox {
        nonce: nonce.to_vec(),
        ciphertext,
        tag,
    })
}

/// Open a box sealed by [`seal`]. Any mismatch of key, data, or `aad` is
/// reported as [`CryptoError::Authentication`].
pub fn open(key: &DataKey, sealed: &SealedBox, aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.nonce.len() != NONCE_LEN {
        return Err(CryptoError::Malformed(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            sealed.nonce.len()
        )));
    }
    if sealed.tag.len() != TAG_LEN {
        return Err(CryptoError::Malformed(format!(
            "tag must be {TAG_LEN} bytes, got {}",
            sealed.tag.len()
        )));
    }
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::KeyMaterial(e.to_string()))?;

    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.tag);
    cipher
        .decrypt(
            Nonce::from_slice(&sealed.nonce),
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| CryptoError::Authentication)
}

fn wrap_aad(kek_id: &str) -> Vec<u8> {
    format!("claims-compliance/dek/v{ENVELOPE_VERSION}/{kek_id}").into_bytes()
}

/// Envelope encryption against a key ring.
#[derive(Clone, Debug)]
pub struct EnvelopeCipher {
    keyring: Arc<KeyRing>,
}

impl EnvelopeCipher {
    pub fn new(keyring: Arc<KeyRing>) -> Self {
        Self { keyring }
    }

    pub fn keyring(&self) -> &KeyRing {
        &self.keyring
    }

    /// Wrap a data key under the active KEK.
    pub fn wrap_key(&self, key: &DataKey) -> Result<WrappedKey, CryptoError> {
        let kek = self.keyring.active();
        let sealed = seal(&kek.key, key.as_bytes(), &wrap_aad(&kek.id))?;
        Ok(WrappedKey {
            kek_id: kek.id.clone(),
            sealed,
        })
    }

    /// Unwrap a data key with whichever KEK in the ring wrapped it.
    pub fn unwrap_key(&self, wrapped: &WrappedKey) -> Result<DataKey, CryptoError> {
        let kek = self
            .keyring
            .get(&wrapped.kek_id)
            .ok_or_else(|| CryptoError::UnknownKek(wrapped.kek_id.clone()))?;
        let raw = Zeroizing::new(open(&kek.key, &wrapped.sealed, &wrap_aad(&kek.id))?);
        DataKey::from_slice(&raw)
    }

    /// Seal `plaintext` under a fresh DEK bound to `aad`.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Envelope, CryptoError> {
        let dek = DataKey::generate();
        let body = seal(&dek, plaintext, aad)?;
        let wrapped = self.wrap_key(&dek)?;
        Ok(Envelope {
            version: ENVELOPE_VERSION,
            kek_id: wrapped.kek_id,
            wrapped_dek: wrapped.sealed,
            nonce: body.nonce,
            ciphertext: body.ciphertext,
            tag: body.tag,
        })
    }

    pub fn decrypt(&self, envelope: &Envelope, aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if envelope.version != ENVELOPE_VERSION {
            return Err(CryptoError::Malformed(format!(
                "unsupported envelope version {}",
                envelope.version
            )));
        }
        let dek = self.unwrap_key(&WrappedKey {
            kek_id: envelope.kek_id.clone(),
            sealed: envelope.wrapped_dek.clone(),
        })?;
        open(&dek, &envelope.body(), aad)
    }
}

mod b64 {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded.as_bytes()).map_err(de::Error::custom)
    }
}
