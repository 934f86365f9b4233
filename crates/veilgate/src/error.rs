//! Error types for Veilgate contracts and the runtime.

use std::fmt;

use thiserror::Error;

use veilgate_core::{CoreError, Principal};
use veilgate_policy::PolicyError;
use veilgate_store::StoreError;

/// Which argument carried an unusable principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalRole {
    Receiver,
    Sender,
    Spender,
    Registrar,
    Subject,
    Grantee,
    Beneficiary,
    RuleCaller,
}

impl fmt::Display for PrincipalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            PrincipalRole::Receiver => "receiver",
            PrincipalRole::Sender => "sender",
            PrincipalRole::Spender => "spender",
            PrincipalRole::Registrar => "registrar",
            PrincipalRole::Subject => "subject",
            PrincipalRole::Grantee => "grantee",
            PrincipalRole::Beneficiary => "beneficiary",
            PrincipalRole::RuleCaller => "rule caller",
        };
        f.write_str(role)
    }
}

/// Errors that abort a call.
#[derive(Debug, Error)]
pub enum VeilError {
    /// The policy evaluator denied the operation.
    #[error("No Permission!")]
    PolicyDenied { operation: String },

    /// The caller is neither the attribute's subject nor a grantee.
    #[error("User didn't give you permission to access this identifier.")]
    AttributeAccessDenied { subject: Principal, name: String },

    #[error("invalid {role}: {principal}")]
    InvalidPrincipal {
        role: PrincipalRole,
        principal: Principal,
    },

    #[error("subject {0} is not onboarded")]
    NotOnboarded(Principal),

    #[error("{0} is not a registrar")]
    NotRegistrar(Principal),

    #[error("registrar {registrar} has level {level}, at least {required} required")]
    InsufficientRegistrarLevel {
        registrar: Principal,
        level: u8,
        required: u8,
    },

    #[error("registrar level must be at least 1")]
    InvalidRegistrarLevel,

    #[error("identifier {name:?} is not set for {subject}")]
    IdentifierNotSet { subject: Principal, name: String },

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("auction has not ended")]
    AuctionNotEnded,

    #[error("auction has ended")]
    AuctionEnded,

    #[error("auction is not stoppable")]
    NotStoppable,

    #[error("{0} has no bid")]
    NoBid(Principal),

    #[error("{0} does not hold the highest bid")]
    NotHighestBidder(Principal),

    #[error("auction already claimed")]
    AlreadyClaimed,

    #[error("auction not claimed yet")]
    NotClaimed,

    #[error("auction already settled")]
    AlreadySettled,

    #[error("the winner cannot withdraw")]
    WinnerCannotWithdraw,

    /// The auction was handed a token other than the one it settles in.
    #[error("auction settles in {expected}, got token {actual}")]
    WrongToken {
        expected: Principal,
        actual: Principal,
    },

    #[error("total supply overflow")]
    SupplyOverflow,

    /// A policy error other than a denial (malformed rule).
    #[error("policy error: {0}")]
    Policy(PolicyError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A different snapshot or journal entry is already stored at the height
    /// being committed.
    #[error("commit conflict in {namespace} at height {height}")]
    CommitConflict { namespace: String, height: u64 },

    /// The store holds no snapshot to restore from.
    #[error("no snapshot stored for namespace {0}")]
    NoSnapshot(String),

    /// Calls were journaled after the latest snapshot, so restoring from it
    /// would drop them.
    #[error("journal of {namespace} reaches height {journal} but the latest snapshot is at {snapshot}")]
    JournalAhead {
        namespace: String,
        snapshot: u64,
        journal: u64,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<PolicyError> for VeilError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::Denied { operation } => VeilError::PolicyDenied { operation },
            PolicyError::ZeroCaller => VeilError::InvalidPrincipal {
                role: PrincipalRole::RuleCaller,
                principal: Principal::ZERO,
            },
            other => VeilError::Policy(other),
        }
    }
}

/// Result type for Veilgate operations.
pub type Result<T> = std::result::Result<T, VeilError>;
