//! # Veilgate Policy
//!
//! The Data Privacy Framework (DPF): per-caller, per-operation permission
//! rules with wildcards, validity windows and auxiliary parameters.
//!
//! ## Resolution
//!
//! For a `(caller, operation)` pair at time `now`, the first rule found in
//! this order whose validity window contains `now` decides:
//!
//! 1. `(caller, operation)`
//! 2. `(caller, "*")`
//! 3. `(ALL, operation)`
//! 4. `(ALL, "*")`
//!
//! If none is found the operation is denied. A rule outside its window is
//! skipped, so a rule that has not started yet or has expired never decides.
//! An in-window rule with `active = false` denies.
//!
//! ## Usage
//!
//! ```rust
//! use veilgate_core::{Principal, Timestamp};
//! use veilgate_policy::{DataPrivacyFramework, PermissionRule};
//!
//! let owner = Principal::from_bytes([1; 20]);
//! let alice = Principal::from_bytes([2; 20]);
//! let now = Timestamp::from_secs(1_000);
//!
//! let mut dpf = DataPrivacyFramework::with_owner(owner).unwrap();
//! dpf.set_permission(&owner, now, PermissionRule::allow(Principal::ALL, "*")).unwrap();
//! dpf.set_permission(&owner, now, PermissionRule::deny(alice, "op_read")).unwrap();
//!
//! assert!(!dpf.is_operation_allowed(&alice, "op_read", now));
//! assert!(dpf.is_operation_allowed(&alice, "op_write", now));
//! ```

pub mod book;
pub mod error;
pub mod evaluator;
pub mod framework;
pub mod rule;

pub use book::{RuleBook, RuleLevel};
pub use error::{PolicyError, Result};
pub use evaluator::{Evaluator, Resolution};
pub use framework::DataPrivacyFramework;
pub use rule::{
    ParameterQuery, PermissionRule, RuleParameters, ValidityWindow, OP_SET_PERMISSION,
    WILDCARD_OPERATION,
};
