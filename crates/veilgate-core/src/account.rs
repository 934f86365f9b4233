//! Client-side account key material.

use std::fmt;

use crate::crypto::{Ed25519PublicKey, SigningKeypair, X25519PublicKey, X25519StaticSecret};
use crate::types::Principal;

/// An externally owned account.
///
/// Holds an Ed25519 keypair (identity, input binding) and an X25519 secret
/// (decrypting values the network re-encrypts for this account). The
/// account's [`Principal`] is derived from the Ed25519 public key.
#[derive(Clone)]
pub struct Account {
    signing: SigningKeypair,
    encryption: X25519StaticSecret,
    principal: Principal,
}

impl Account {
    /// Generate fresh random keys.
    pub fn generate() -> Self {
        Self::from_keys(SigningKeypair::generate(), X25519StaticSecret::generate())
    }

    /// Derive both keys deterministically from a seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let encryption_seed = blake3::derive_key("veilgate-account-v0 encryption seed", &seed);
        Self::from_keys(
            SigningKeypair::from_seed(&seed),
            X25519StaticSecret::from_bytes(encryption_seed),
        )
    }

    fn from_keys(signing: SigningKeypair, encryption: X25519StaticSecret) -> Self {
        let principal = Principal::from_public_key(&signing.public_key());
        Self {
            signing,
            encryption,
            principal,
        }
    }

    /// The account address.
    pub fn principal(&self) -> Principal {
        self.principal
    }

    /// The Ed25519 signing keypair.
    pub fn signing(&self) -> &SigningKeypair {
        &self.signing
    }

    /// The Ed25519 public key.
    pub fn signing_public(&self) -> Ed25519PublicKey {
        self.signing.public_key()
    }

    /// The X25519 secret used to open ciphertexts addressed to this account.
    pub fn encryption_secret(&self) -> &X25519StaticSecret {
        &self.encryption
    }

    /// The X25519 public key the network encrypts to.
    pub fn encryption_public(&self) -> X25519PublicKey {
        self.encryption.public_key()
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}
