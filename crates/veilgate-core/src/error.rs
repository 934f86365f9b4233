//! Error types for Veilgate core.

use thiserror::Error;

use crate::types::Principal;

/// Errors raised by account keys and confidential backends.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    /// The encrypted input was signed by a key that does not own the sender.
    #[error("input signer does not match sender {0}")]
    SignerMismatch(Principal),

    /// The backend has no encryption key registered for this principal.
    #[error("no encryption key registered for {0}")]
    UnknownAccount(Principal),

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("decryption error: {0}")]
    DecryptionError(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
