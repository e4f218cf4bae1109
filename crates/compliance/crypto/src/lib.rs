//! Envelope encryption primitives.
//!
//! Every protected payload is sealed with a fresh 256-bit data key (DEK)
//! under AES-256-GCM. The DEK is in turn sealed ("wrapped") by a
//! key-encryption key (KEK) held in a [`KeyRing`]. Rotating the KEK only
//! requires keeping the previous key in the ring for decryption.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod envelope;
pub mod error;
pub mod keys;

pub use envelope::{open, seal, Envelope, EnvelopeCipher, SealedBox, WrappedKey, ENVELOPE_VERSION};
pub use error::CryptoError;
pub use keys::{DataKey, Kek, KeyRing, KEY_LEN};
