//! Configuration.
//!
//! Every struct has sensible defaults and can be loaded from JSON; missing
//! fields take their default.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VeilError};

/// Configuration for a [`crate::Runtime`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Store namespace for snapshots and the journal.
    pub namespace: String,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Write a snapshot after every committed call.
    pub persist_snapshots: bool,
    /// Append a journal entry after every committed call.
    pub record_journal: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            event_capacity: 1024,
            persist_snapshots: true,
            record_journal: true,
        }
    }
}

impl RuntimeConfig {
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }
}

/// Token metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "Private Token".to_string(),
            symbol: "PTOK".to_string(),
            decimals: 6,
        }
    }
}

/// Identity registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Lowest registrar level allowed to write identifiers.
    pub min_registrar_level: u8,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_registrar_level: 1,
        }
    }
}

/// Auction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
    /// Bidding period, starting at deployment.
    pub bidding_time_secs: u64,
    /// Whether the owner may end bidding early.
    pub stoppable: bool,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            bidding_time_secs: 60 * 60 * 24,
            stoppable: true,
        }
    }
}

/// Parse any configuration struct from JSON.
pub fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| VeilError::Config(e.to_string()))
}
