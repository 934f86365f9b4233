//! Strong type definitions for Veilgate.
//!
//! Addresses, function selectors and timestamps are newtypes so that a
//! principal can never be passed where a selector is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::Ed25519PublicKey;

/// Length of a principal address in bytes.
pub const PRINCIPAL_LEN: usize = 20;

/// A 20-byte account or contract address.
///
/// Account principals are derived from an Ed25519 public key, contract
/// principals from the deployer and the contract name. Two addresses are
/// reserved: [`Principal::ZERO`] (the null address, never a valid concrete
/// principal) and [`Principal::ALL`] (the wildcard principal used by
/// permission rules).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal(pub [u8; PRINCIPAL_LEN]);

impl Principal {
    /// The null address.
    pub const ZERO: Self = Self([0u8; PRINCIPAL_LEN]);

    /// The wildcard principal, `0x0000000000000000000000000000000000000001`.
    pub const ALL: Self = {
        let mut bytes = [0u8; PRINCIPAL_LEN];
        bytes[PRINCIPAL_LEN - 1] = 1;
        Self(bytes)
    };

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; PRINCIPAL_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; PRINCIPAL_LEN] {
        &self.0
    }

    /// Derive the account principal owning an Ed25519 key.
    ///
    /// The address is the last 20 bytes of `Blake3(domain || public_key)`.
    pub fn from_public_key(public_key: &Ed25519PublicKey) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"veilgate-account-v0:");
        hasher.update(public_key.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; PRINCIPAL_LEN];
        bytes.copy_from_slice(&digest.as_bytes()[32 - PRINCIPAL_LEN..]);
        Self(bytes)
    }

    /// Derive the address of a contract deployed by `deployer`.
    ///
    /// `nonce` distinguishes several deployments of the same contract name.
    pub fn derive_contract(deployer: &Principal, name: &str, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"veilgate-contract-v0:");
        hasher.update(&deployer.0);
        hasher.update(b":");
        hasher.update(name.as_bytes());
        hasher.update(&nonce.to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; PRINCIPAL_LEN];
        bytes.copy_from_slice(&digest.as_bytes()[32 - PRINCIPAL_LEN..]);
        Self(bytes)
    }

    /// Whether this is the null address.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Whether this is the wildcard principal.
    pub fn is_wildcard(&self) -> bool {
        *self == Self::ALL
    }

    /// Convert to a `0x`-prefixed hex string.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from a hex string, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)?;
        if bytes.len() != PRINCIPAL_LEN {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; PRINCIPAL_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.to_hex())
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Principal {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; PRINCIPAL_LEN]> for Principal {
    fn from(bytes: [u8; PRINCIPAL_LEN]) -> Self {
        Self(bytes)
    }
}

/// A 4-byte function selector.
///
/// Encrypted inputs are bound to the selector of the function that consumes
/// them, so a ciphertext prepared for `approve` cannot be replayed into
/// `transfer`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector(pub [u8; 4]);

impl Selector {
    /// Compute the selector of a function signature such as
    /// `"transfer(address,(uint256,bytes))"`.
    pub fn of(signature: &str) -> Self {
        let digest = blake3::hash(signature.as_bytes());
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&digest.as_bytes()[..4]);
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector(0x{})", hex::encode(self.0))
    }
}

/// Seconds since the Unix epoch, as observed by the executing call.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The epoch. Also used by validity windows to mean "unbounded".
    pub const ZERO: Self = Self(0);

    /// Create from whole seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Get whole seconds.
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Add a number of seconds, saturating at the maximum timestamp.
    pub fn saturating_add_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
