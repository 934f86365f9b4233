//! An encrypting backend that simulates the confidential network in-process.
//!
//! State values are sealed under a network symmetric key. Client inputs are
//! encrypted to the network's X25519 key with a key derived from the input
//! binding, and values handed back to users are encrypted to the user's
//! registered X25519 key with a key derived from the user's principal.
//!
//! Ciphertext layouts:
//! - sealed value: `nonce || aead(value_be)`
//! - input / user ciphertext: `ephemeral_public(32) || nonce || aead(value_be)`

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::account::Account;
use crate::confidential::{
    decode_u64, ConfidentialBackend, EncryptedInput, InputBinding, Op, SealedValue, UserCiphertext,
};
use crate::crypto::{EphemeralKeyPair, SymmetricKey, X25519PublicKey, X25519StaticSecret};
use crate::error::{CoreError, Result};
use crate::types::Principal;

const EPHEMERAL_LEN: usize = 32;

/// An in-process confidential network.
pub struct SealedBackend {
    network_secret: X25519StaticSecret,
    network_public: X25519PublicKey,
    state_key: SymmetricKey,
    accounts: RwLock<HashMap<Principal, X25519PublicKey>>,
}

impl SealedBackend {
    /// Create a network with fresh random keys.
    pub fn generate() -> Self {
        Self::from_keys(X25519StaticSecret::generate(), SymmetricKey::generate())
    }

    /// Create a network with deterministic keys.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = blake3::derive_key("veilgate-network-v0 exchange secret", &seed);
        let state = blake3::derive_key("veilgate-network-v0 state key", &seed);
        Self::from_keys(
            X25519StaticSecret::from_bytes(secret),
            SymmetricKey::from_bytes(state),
        )
    }

    fn from_keys(network_secret: X25519StaticSecret, state_key: SymmetricKey) -> Self {
        let network_public = network_secret.public_key();
        Self {
            network_secret,
            network_public,
            state_key,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// The key clients encrypt inputs to.
    pub fn network_public_key(&self) -> X25519PublicKey {
        self.network_public
    }

    fn open_state(&self, value: &SealedValue) -> Result<u64> {
        decode_u64(&self.state_key.open(value.as_bytes())?)
    }

    fn account_key(&self, principal: &Principal) -> Result<X25519PublicKey> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| CoreError::DecryptionError("account registry poisoned".into()))?;
        accounts
            .get(principal)
            .copied()
            .ok_or(CoreError::UnknownAccount(*principal))
    }
}

impl std::fmt::Debug for SealedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedBackend")
            .field("network_public", &self.network_public)
            .finish_non_exhaustive()
    }
}

/// Encrypt to `recipient` under an ephemeral agreement bound to `context`.
fn encrypt_to(recipient: &X25519PublicKey, context: &[u8], value: u64) -> Result<Vec<u8>> {
    let ephemeral = EphemeralKeyPair::generate();
    let ephemeral_public = ephemeral.public_key();
    let key = ephemeral.diffie_hellman(recipient).derive_key(context);
    let sealed = key.seal(&value.to_be_bytes())?;

    let mut out = Vec::with_capacity(EPHEMERAL_LEN + sealed.len());
    out.extend_from_slice(&ephemeral_public.0);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Inverse of [`encrypt_to`].
fn decrypt_from(secret: &X25519StaticSecret, context: &[u8], ciphertext: &[u8]) -> Result<u64> {
    if ciphertext.len() < EPHEMERAL_LEN {
        return Err(CoreError::MalformedCiphertext(format!(
            "expected at least {EPHEMERAL_LEN} bytes, got {}",
            ciphertext.len()
        )));
    }
    let (ephemeral, sealed) = ciphertext.split_at(EPHEMERAL_LEN);
    let mut peer = [0u8; EPHEMERAL_LEN];
    peer.copy_from_slice(ephemeral);
    let key = secret
        .diffie_hellman(&X25519PublicKey(peer))
        .derive_key(context);
    decode_u64(&key.open(sealed)?)
}

impl ConfidentialBackend for SealedBackend {
    fn encrypt_input(
        &self,
        account: &Account,
        value: u64,
        binding: &InputBinding,
    ) -> Result<EncryptedInput> {
        let ciphertext = encrypt_to(&self.network_public, &binding.context_bytes(), value)?;
        Ok(EncryptedInput::sign(account, ciphertext, binding))
    }

    fn decrypt_output(&self, account: &Account, ciphertext: &UserCiphertext) -> Result<u64> {
        decrypt_from(
            account.encryption_secret(),
            account.principal().as_bytes(),
            ciphertext.as_bytes(),
        )
    }

    fn register_account(&self, principal: Principal, key: X25519PublicKey) {
        match self.accounts.write() {
            Ok(mut accounts) => {
                accounts.insert(principal, key);
            }
            Err(_) => tracing::warn!(%principal, "account registry poisoned, key not registered"),
        }
    }

    fn validate_input(&self, input: &EncryptedInput, binding: &InputBinding) -> Result<SealedValue> {
        input.verify_binding(binding)?;
        let value = decrypt_from(&self.network_secret, &binding.context_bytes(), &input.ciphertext)?;
        self.seal(value)
    }

    fn seal(&self, value: u64) -> Result<SealedValue> {
        Ok(SealedValue(Bytes::from(self.state_key.seal(&value.to_be_bytes())?)))
    }

    fn reveal(&self, value: &SealedValue) -> Result<u64> {
        self.open_state(value)
    }

    fn encrypt_for(&self, value: &SealedValue, recipient: &Principal) -> Result<UserCiphertext> {
        let key = self.account_key(recipient)?;
        let plain = self.open_state(value)?;
        let ciphertext = encrypt_to(&key, recipient.as_bytes(), plain)?;
        Ok(UserCiphertext(Bytes::from(ciphertext)))
    }

    fn apply(&self, op: Op, operands: &[&SealedValue]) -> Result<SealedValue> {
        let values = operands
            .iter()
            .map(|v| self.open_state(v))
            .collect::<Result<Vec<_>>>()?;
        self.seal(op.evaluate(&values)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_with(accounts: &[&Account]) -> SealedBackend {
        let backend = SealedBackend::from_seed([9; 32]);
        for account in accounts {
            backend.register_account(account.principal(), account.encryption_public());
        }
        backend
    }

    #[test]
    fn test_input_to_user_ciphertext() {
        let alice = Account::from_seed([1; 32]);
        let backend = network_with(&[&alice]);
        let contract = Principal::from_bytes([5; 20]);
        let binding = InputBinding::new(alice.principal(), contract, "transfer(address,uint64)");

        let input = backend.encrypt_input(&alice, 77, &binding).unwrap();
        let sealed = backend.validate_input(&input, &binding).unwrap();
        let out = backend.encrypt_for(&sealed, &alice.principal()).unwrap();
        assert_eq!(backend.decrypt_output(&alice, &out).unwrap(), 77);
    }

    #[test]
    fn test_user_ciphertext_unreadable_by_others() {
        let alice = Account::from_seed([1; 32]);
        let bob = Account::from_seed([2; 32]);
        let backend = network_with(&[&alice, &bob]);

        let sealed = backend.seal(1234).unwrap();
        let for_alice = backend.encrypt_for(&sealed, &alice.principal()).unwrap();
        assert!(backend.decrypt_output(&bob, &for_alice).is_err());
    }

    #[test]
    fn test_encrypt_for_unknown_account() {
        let backend = SealedBackend::generate();
        let sealed = backend.seal(1).unwrap();
        let stranger = Principal::from_bytes([8; 20]);
        assert!(matches!(
            backend.encrypt_for(&sealed, &stranger),
            Err(CoreError::UnknownAccount(p)) if p == stranger
        ));
    }

    #[test]
    fn test_input_rebound_to_other_function_fails() {
        let alice = Account::from_seed([1; 32]);
        let backend = network_with(&[&alice]);
        let contract = Principal::from_bytes([5; 20]);
        let approve = InputBinding::new(alice.principal(), contract, "approve(address,uint64)");
        let transfer = InputBinding::new(alice.principal(), contract, "transfer(address,uint64)");

        let input = backend.encrypt_input(&alice, 10, &approve).unwrap();
        assert!(backend.validate_input(&input, &transfer).is_err());
    }

    #[test]
    fn test_sealed_values_are_randomized() {
        let backend = SealedBackend::generate();
        let a = backend.seal(5).unwrap();
        let b = backend.seal(5).unwrap();
        assert_ne!(a, b);
        let eq = backend.eq(&a, &b).unwrap();
        assert_eq!(backend.reveal(&eq).unwrap(), 1);
    }

    #[test]
    fn test_foreign_network_cannot_open_state() {
        let a = SealedBackend::from_seed([1; 32]);
        let b = SealedBackend::from_seed([2; 32]);
        let sealed = a.seal(99).unwrap();
        assert!(b.reveal(&sealed).is_err());
    }
}
