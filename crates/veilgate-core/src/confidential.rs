//! The confidential value capability.
//!
//! Contracts never see plaintext. They hold [`SealedValue`]s, combine them
//! through a [`ConfidentialBackend`], and hand results back to users as
//! [`UserCiphertext`]s that only the addressed account can open. Client
//! inputs arrive as [`EncryptedInput`]s bound to a sender, a contract and a
//! function selector.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::Account;
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, X25519PublicKey};
use crate::error::{CoreError, Result};
use crate::types::{Principal, Selector};

/// A confidential scalar held in contract state.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedValue(pub Bytes);

impl SealedValue {
    /// Get the raw ciphertext.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SealedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedValue({} bytes)", self.0.len())
    }
}

/// A value re-encrypted for a single principal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCiphertext(pub Bytes);

impl UserCiphertext {
    /// Get the raw ciphertext.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for UserCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserCiphertext({} bytes)", self.0.len())
    }
}

/// What an encrypted input is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBinding {
    /// The account submitting the input.
    pub sender: Principal,
    /// The contract that will consume it.
    pub contract: Principal,
    /// The function that will consume it.
    pub selector: Selector,
}

impl InputBinding {
    /// Bind an input to `sender` calling `signature` on `contract`.
    pub fn new(sender: Principal, contract: Principal, signature: &str) -> Self {
        Self {
            sender,
            contract,
            selector: Selector::of(signature),
        }
    }

    /// Domain-separated bytes identifying this binding.
    pub fn context_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + 20 + 20 + 4);
        out.extend_from_slice(b"veilgate-input-v0");
        out.extend_from_slice(self.sender.as_bytes());
        out.extend_from_slice(self.contract.as_bytes());
        out.extend_from_slice(self.selector.as_bytes());
        out
    }

    fn signed_message(&self, ciphertext: &[u8]) -> Vec<u8> {
        let mut message = self.context_bytes();
        message.extend_from_slice(ciphertext);
        message
    }
}

/// A client ciphertext plus a signature binding it to an [`InputBinding`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInput {
    /// Backend-specific ciphertext.
    pub ciphertext: Bytes,
    /// Key that produced `signature`; must own the binding's sender.
    pub signer: Ed25519PublicKey,
    /// Signature over the binding context followed by the ciphertext.
    pub signature: Ed25519Signature,
}

impl EncryptedInput {
    /// Sign `ciphertext` for `binding` with the account's key.
    pub fn sign(account: &Account, ciphertext: Vec<u8>, binding: &InputBinding) -> Self {
        let signature = account.signing().sign(&binding.signed_message(&ciphertext));
        Self {
            ciphertext: Bytes::from(ciphertext),
            signer: account.signing_public(),
            signature,
        }
    }

    /// Check that the input was produced by the binding's sender for the
    /// binding's contract and selector.
    pub fn verify_binding(&self, binding: &InputBinding) -> Result<()> {
        if Principal::from_public_key(&self.signer) != binding.sender {
            return Err(CoreError::SignerMismatch(binding.sender));
        }
        self.signer
            .verify(&binding.signed_message(&self.ciphertext), &self.signature)
    }
}

/// An operation evaluated by the confidential network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Checked addition; overflow is an error, never a wrap.
    Add,
    /// Wrapping subtraction. Callers guard it with a comparison and
    /// [`Op::Mux`] so a wrapped result is never committed.
    Sub,
    /// Integer division; division by zero is an error.
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    /// Boolean conjunction of two 0/1 values.
    And,
    /// `mux(cond, if_true, if_false)`: `if_true` when `cond` is non-zero.
    Mux,
}

impl Op {
    /// Number of operands the operation takes.
    pub fn arity(self) -> usize {
        match self {
            Op::Mux => 3,
            _ => 2,
        }
    }

    /// Evaluate over plaintext operands. Only backends call this, after
    /// opening their ciphertexts.
    pub fn evaluate(self, operands: &[u64]) -> Result<u64> {
        if operands.len() != self.arity() {
            return Err(CoreError::MalformedCiphertext(format!(
                "{:?} takes {} operands, got {}",
                self,
                self.arity(),
                operands.len()
            )));
        }
        let (a, b) = (operands[0], operands[1]);
        let value = match self {
            Op::Add => a.checked_add(b).ok_or(CoreError::ArithmeticOverflow)?,
            Op::Sub => a.wrapping_sub(b),
            Op::Div => a.checked_div(b).ok_or(CoreError::DivisionByZero)?,
            Op::Lt => u64::from(a < b),
            Op::Le => u64::from(a <= b),
            Op::Gt => u64::from(a > b),
            Op::Ge => u64::from(a >= b),
            Op::Eq => u64::from(a == b),
            Op::And => u64::from(a != 0 && b != 0),
            Op::Mux => {
                if a != 0 {
                    b
                } else {
                    operands[2]
                }
            }
        };
        Ok(value)
    }
}

/// The external confidential-value capability.
///
/// The client half (`encrypt_input`, `decrypt_output`) runs with an
/// account's keys. The network half runs inside contract calls and never
/// returns plaintext except through [`ConfidentialBackend::reveal`].
pub trait ConfidentialBackend: Send + Sync {
    /// Encrypt `value` as an input bound to `binding`.
    fn encrypt_input(&self, account: &Account, value: u64, binding: &InputBinding)
        -> Result<EncryptedInput>;

    /// Open a ciphertext addressed to `account`.
    fn decrypt_output(&self, account: &Account, ciphertext: &UserCiphertext) -> Result<u64>;

    /// Register the key the network uses when re-encrypting for `principal`.
    fn register_account(&self, principal: Principal, key: X25519PublicKey);

    /// Verify an input's binding and convert it into a sealed value.
    fn validate_input(&self, input: &EncryptedInput, binding: &InputBinding) -> Result<SealedValue>;

    /// Seal a public constant.
    fn seal(&self, value: u64) -> Result<SealedValue>;

    /// Decrypt a sealed value to clear.
    fn reveal(&self, value: &SealedValue) -> Result<u64>;

    /// Re-encrypt a sealed value so only `recipient` can open it.
    fn encrypt_for(&self, value: &SealedValue, recipient: &Principal) -> Result<UserCiphertext>;

    /// Evaluate `op` over sealed operands.
    fn apply(&self, op: Op, operands: &[&SealedValue]) -> Result<SealedValue>;

    fn add(&self, a: &SealedValue, b: &SealedValue) -> Result<SealedValue> {
        self.apply(Op::Add, &[a, b])
    }

    fn sub(&self, a: &SealedValue, b: &SealedValue) -> Result<SealedValue> {
        self.apply(Op::Sub, &[a, b])
    }

    fn div(&self, a: &SealedValue, b: &SealedValue) -> Result<SealedValue> {
        self.apply(Op::Div, &[a, b])
    }

    fn lt(&self, a: &SealedValue, b: &SealedValue) -> Result<SealedValue> {
        self.apply(Op::Lt, &[a, b])
    }

    fn le(&self, a: &SealedValue, b: &SealedValue) -> Result<SealedValue> {
        self.apply(Op::Le, &[a, b])
    }

    fn gt(&self, a: &SealedValue, b: &SealedValue) -> Result<SealedValue> {
        self.apply(Op::Gt, &[a, b])
    }

    fn ge(&self, a: &SealedValue, b: &SealedValue) -> Result<SealedValue> {
        self.apply(Op::Ge, &[a, b])
    }

    fn eq(&self, a: &SealedValue, b: &SealedValue) -> Result<SealedValue> {
        self.apply(Op::Eq, &[a, b])
    }

    fn and(&self, a: &SealedValue, b: &SealedValue) -> Result<SealedValue> {
        self.apply(Op::And, &[a, b])
    }

    fn mux(
        &self,
        cond: &SealedValue,
        if_true: &SealedValue,
        if_false: &SealedValue,
    ) -> Result<SealedValue> {
        self.apply(Op::Mux, &[cond, if_true, if_false])
    }

    /// Larger of two sealed values.
    fn max(&self, a: &SealedValue, b: &SealedValue) -> Result<SealedValue> {
        let a_wins = self.gt(a, b)?;
        self.mux(&a_wins, a, b)
    }
}

/// Decode the 8-byte big-endian encoding both backends use for scalars.
pub(crate) fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| CoreError::MalformedCiphertext(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}
