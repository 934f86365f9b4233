//! Plaintext stand-in for the confidential network.
//!
//! Values are carried as 8-byte big-endian integers. Input bindings are
//! still verified, so authorization behaves the same as with
//! [`crate::sealed::SealedBackend`].

use bytes::Bytes;

use crate::account::Account;
use crate::confidential::{
    decode_u64, ConfidentialBackend, EncryptedInput, InputBinding, Op, SealedValue, UserCiphertext,
};
use crate::crypto::X25519PublicKey;
use crate::error::Result;
use crate::types::Principal;

/// A backend that performs no encryption.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearBackend;

impl ClearBackend {
    pub fn new() -> Self {
        Self
    }
}

fn encode(value: u64) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes())
}

impl ConfidentialBackend for ClearBackend {
    fn encrypt_input(
        &self,
        account: &Account,
        value: u64,
        binding: &InputBinding,
    ) -> Result<EncryptedInput> {
        Ok(EncryptedInput::sign(account, value.to_be_bytes().to_vec(), binding))
    }

    fn decrypt_output(&self, _account: &Account, ciphertext: &UserCiphertext) -> Result<u64> {
        decode_u64(ciphertext.as_bytes())
    }

    fn register_account(&self, _principal: Principal, _key: X25519PublicKey) {}

    fn validate_input(&self, input: &EncryptedInput, binding: &InputBinding) -> Result<SealedValue> {
        input.verify_binding(binding)?;
        let value = decode_u64(&input.ciphertext)?;
        Ok(SealedValue(encode(value)))
    }

    fn seal(&self, value: u64) -> Result<SealedValue> {
        Ok(SealedValue(encode(value)))
    }

    fn reveal(&self, value: &SealedValue) -> Result<u64> {
        decode_u64(value.as_bytes())
    }

    fn encrypt_for(&self, value: &SealedValue, _recipient: &Principal) -> Result<UserCiphertext> {
        Ok(UserCiphertext(value.0.clone()))
    }

    fn apply(&self, op: Op, operands: &[&SealedValue]) -> Result<SealedValue> {
        let values = operands
            .iter()
            .map(|v| decode_u64(v.as_bytes()))
            .collect::<Result<Vec<_>>>()?;
        self.seal(op.evaluate(&values)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn test_clear_arithmetic() {
        let backend = ClearBackend::new();
        let a = backend.seal(100).unwrap();
        let b = backend.seal(5).unwrap();

        assert_eq!(backend.reveal(&backend.div(&a, &b).unwrap()).unwrap(), 20);
        assert_eq!(backend.reveal(&backend.add(&a, &b).unwrap()).unwrap(), 105);
        assert_eq!(backend.reveal(&backend.max(&a, &b).unwrap()).unwrap(), 100);
        assert_eq!(backend.reveal(&backend.ge(&b, &a).unwrap()).unwrap(), 0);
    }

    #[test]
    fn test_clear_validate_checks_binding() {
        let backend = ClearBackend::new();
        let alice = Account::from_seed([1; 32]);
        let contract = Principal::from_bytes([2; 20]);
        let binding = InputBinding::new(alice.principal(), contract, "setItem(string,uint64)");

        let input = backend.encrypt_input(&alice, 42, &binding).unwrap();
        let sealed = backend.validate_input(&input, &binding).unwrap();
        assert_eq!(backend.reveal(&sealed).unwrap(), 42);

        let other_contract = InputBinding::new(alice.principal(), Principal::from_bytes([3; 20]), "setItem(string,uint64)");
        assert!(backend.validate_input(&input, &other_contract).is_err());
    }

    #[test]
    fn test_clear_malformed_value() {
        let backend = ClearBackend::new();
        let bad = SealedValue(Bytes::from_static(&[1, 2, 3]));
        assert!(matches!(
            backend.reveal(&bad),
            Err(CoreError::MalformedCiphertext(_))
        ));
    }
}
