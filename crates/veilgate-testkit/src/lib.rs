//! # Veilgate Testkit
//!
//! Testing utilities for Veilgate.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a deterministic encrypting network with registered
//!   accounts, and one-line deployments of every contract into a runtime
//! - **Generators**: Proptest strategies for principals, operations,
//!   validity windows and permission rules
//!
//! The integration tests under `tests/` exercise the end-to-end scenarios
//! and the policy and ledger properties; `benches/evaluator.rs` measures
//! rule resolution.
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use veilgate_policy::DataPrivacyFramework;
//! use veilgate_testkit::generators::{operation, principal, timestamp};
//!
//! proptest! {
//!     #[test]
//!     fn empty_framework_denies(caller in principal(), op in operation(), now in timestamp()) {
//!         let dpf = DataPrivacyFramework::new();
//!         prop_assert!(!dpf.is_operation_allowed(&caller, &op, now));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use veilgate_testkit::fixtures::TestNetwork;
//!
//! let network = TestNetwork::new();
//! let prices = network.deploy_prices();
//! assert_eq!(prices.height(), 0);
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{account, accounts, TestNetwork, GENESIS};
