//! # Veilgate Core
//!
//! Shared primitives for the Veilgate confidential contracts:
//!
//! - [`Principal`], [`Selector`] and [`Timestamp`] newtypes
//! - [`Account`] key material (Ed25519 identity, X25519 decryption)
//! - [`Clock`] sources, including a [`ManualClock`] for tests
//! - the [`ConfidentialBackend`] capability and two implementations:
//!   [`ClearBackend`] (plaintext) and [`SealedBackend`] (encrypting)
//!
//! Contracts never observe plaintext confidential values. They hold
//! [`SealedValue`]s and combine them through the backend.

pub mod account;
pub mod clear;
pub mod clock;
pub mod confidential;
pub mod crypto;
pub mod error;
pub mod sealed;
pub mod types;

pub use account::Account;
pub use clear::ClearBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use confidential::{
    ConfidentialBackend, EncryptedInput, InputBinding, Op, SealedValue, UserCiphertext,
};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, SigningKeypair, X25519PublicKey};
pub use error::{CoreError, Result};
pub use sealed::SealedBackend;
pub use types::{Principal, Selector, Timestamp, PRINCIPAL_LEN};

/// Encode a value to canonical CBOR bytes.
pub fn to_cbor<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// Decode a value from CBOR bytes.
pub fn from_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}
