//! # Veilgate
//!
//! Confidential contracts whose values stay encrypted end to end, with
//! access governed by the Data Privacy Framework.
//!
//! ## Overview
//!
//! - [`ConfidentialDatabase`]: a key/value store of sealed values. Reads are
//!   re-encrypted for the caller or, where policy allows, revealed in clear.
//! - [`IdentityRegistry`]: registrars attach sealed attributes to onboarded
//!   subjects; subjects choose who may read them.
//! - [`PrivateToken`]: a ledger with sealed balances and allowances.
//! - [`PrivateAuction`]: a sealed-bid auction settled in a [`PrivateToken`],
//!   deployed together as an [`AuctionHouse`].
//!
//! Contracts are plain values. A [`Runtime`] hosts one of them, runs each
//! call against a clone of the committed state and commits it atomically,
//! optionally persisting snapshots through a
//! [`SnapshotStore`](veilgate_store::SnapshotStore).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use veilgate::{ConfidentialDatabase, Runtime, RuntimeConfig};
//! use veilgate::core::{Account, ClearBackend, ConfidentialBackend, Principal, SystemClock};
//!
//! async fn example() {
//!     let owner = Account::generate();
//!     let backend: Arc<dyn ConfidentialBackend> = Arc::new(ClearBackend::new());
//!     let address = Principal::derive_contract(&owner.principal(), "OnChainDatabase", 0);
//!     let db = ConfidentialDatabase::deploy_prices(owner.principal(), address, backend.as_ref())
//!         .unwrap();
//!
//!     let runtime = Runtime::new(db, RuntimeConfig::default(), backend, Arc::new(SystemClock));
//!     let outcome = runtime
//!         .execute(owner.principal(), |db, ctx| db.get_clear_coti_usd_price(ctx))
//!         .await
//!         .unwrap();
//!     assert_eq!(outcome.value, 5);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `veilgate::core` - principals, accounts, clocks and confidential backends
//! - `veilgate::policy` - the Data Privacy Framework
//! - `veilgate::store` - snapshot and journal persistence

pub mod auction;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod events;
pub mod identity;
pub mod runtime;
pub mod token;

pub use auction::{AuctionHouse, PrivateAuction};
pub use config::{AuctionConfig, RegistryConfig, RuntimeConfig, TokenConfig};
pub use context::CallContext;
pub use database::ConfidentialDatabase;
pub use error::{PrincipalRole, Result, VeilError};
pub use events::{Disclosure, Event, EventRecord};
pub use identity::{AttributeRecord, IdentityRegistry};
pub use runtime::{JournalRecord, Outcome, Runtime};
pub use token::{AllowanceView, PrivateToken};

pub use veilgate_core as core;
pub use veilgate_policy as policy;
pub use veilgate_store as store;
