//! The policy evaluator.
//!
//! Stateless: a decision depends only on the rule book and the timestamp it
//! is evaluated at. Resolution walks the four key spaces most specific first
//! and stops at the first rule whose window contains `now`. That rule's
//! `active` flag is the decision. With no such rule the answer is deny.

use veilgate_core::{Principal, Timestamp};

use crate::book::{RuleBook, RuleLevel};
use crate::rule::{ParameterQuery, PermissionRule};

/// The outcome of resolving a `(caller, operation)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    /// Whether the operation is allowed.
    pub allowed: bool,
    /// The level of the deciding rule; `None` for default deny.
    pub level: Option<RuleLevel>,
    /// The deciding rule.
    pub rule: Option<&'a PermissionRule>,
}

impl Resolution<'_> {
    const DEFAULT_DENY: Self = Resolution {
        allowed: false,
        level: None,
        rule: None,
    };
}

/// Evaluates rules at a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    book: &'a RuleBook,
    now: Timestamp,
}

impl<'a> Evaluator<'a> {
    pub fn new(book: &'a RuleBook, now: Timestamp) -> Self {
        Self { book, now }
    }

    /// The time decisions are made at.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Find the deciding rule for `(caller, operation)`.
    pub fn resolve(&self, caller: &Principal, operation: &str) -> Resolution<'a> {
        let resolution = RuleLevel::PRECEDENCE
            .iter()
            .find_map(|&level| {
                self.book
                    .at_level(level, caller, operation)
                    .filter(|rule| rule.is_in_force(self.now))
                    .map(|rule| Resolution {
                        allowed: rule.active,
                        level: Some(level),
                        rule: Some(rule),
                    })
            })
            .unwrap_or(Resolution::DEFAULT_DENY);

        tracing::debug!(
            %caller,
            operation,
            level = ?resolution.level,
            allowed = resolution.allowed,
            "policy decision"
        );
        resolution
    }

    pub fn is_operation_allowed(&self, caller: &Principal, operation: &str) -> bool {
        self.resolve(caller, operation).allowed
    }

    /// Like [`Evaluator::is_operation_allowed`], and additionally require
    /// the deciding rule's set parameters to match `query`.
    pub fn is_operation_allowed_with(
        &self,
        caller: &Principal,
        operation: &str,
        query: &ParameterQuery,
    ) -> bool {
        let resolution = self.resolve(caller, operation);
        resolution.allowed && resolution.rule.is_some_and(|rule| rule.params.admits(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleParameters, ValidityWindow};

    fn alice() -> Principal {
        Principal::from_bytes([0xa1; 20])
    }

    fn bob() -> Principal {
        Principal::from_bytes([0xb0; 20])
    }

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_empty_book_denies() {
        let book = RuleBook::new();
        let evaluator = Evaluator::new(&book, ts(1));
        let resolution = evaluator.resolve(&alice(), "op_read");
        assert!(!resolution.allowed);
        assert_eq!(resolution.level, None);
    }

    #[test]
    fn test_specific_deny_beats_global_allow() {
        let mut book = RuleBook::new();
        book.upsert(PermissionRule::allow(Principal::ALL, "*"));
        book.upsert(PermissionRule::deny(alice(), "op_read"));

        let evaluator = Evaluator::new(&book, ts(1));
        assert!(!evaluator.is_operation_allowed(&alice(), "op_read"));
        assert!(evaluator.is_operation_allowed(&alice(), "op_write"));
        assert!(evaluator.is_operation_allowed(&bob(), "op_read"));
    }

    #[test]
    fn test_precedence_order() {
        let mut book = RuleBook::new();
        book.upsert(PermissionRule::deny(Principal::ALL, "*"));
        book.upsert(PermissionRule::allow(Principal::ALL, "op_read"));
        book.upsert(PermissionRule::deny(alice(), "*"));

        let evaluator = Evaluator::new(&book, ts(1));
        // caller wildcard outranks operation wildcard
        let resolution = evaluator.resolve(&alice(), "op_read");
        assert!(!resolution.allowed);
        assert_eq!(resolution.level, Some(RuleLevel::CallerWildcard));

        let resolution = evaluator.resolve(&bob(), "op_read");
        assert!(resolution.allowed);
        assert_eq!(resolution.level, Some(RuleLevel::OperationWildcard));

        let resolution = evaluator.resolve(&bob(), "op_write");
        assert!(!resolution.allowed);
        assert_eq!(resolution.level, Some(RuleLevel::Global));
    }

    #[test]
    fn test_not_yet_valid_rule_falls_through() {
        let mut book = RuleBook::new();
        book.upsert(PermissionRule::allow(Principal::ALL, "*"));
        book.upsert(
            PermissionRule::deny(alice(), "op_read")
                .with_window(ValidityWindow::starting(ts(1000))),
        );

        assert!(Evaluator::new(&book, ts(999)).is_operation_allowed(&alice(), "op_read"));
        assert!(!Evaluator::new(&book, ts(1000)).is_operation_allowed(&alice(), "op_read"));
    }

    #[test]
    fn test_expired_rule_falls_through() {
        let mut book = RuleBook::new();
        book.upsert(
            PermissionRule::allow(alice(), "op_read").with_window(ValidityWindow::until(ts(100))),
        );

        assert!(Evaluator::new(&book, ts(99)).is_operation_allowed(&alice(), "op_read"));
        let late = Evaluator::new(&book, ts(100)).resolve(&alice(), "op_read");
        assert!(!late.allowed);
        assert_eq!(late.level, None);
    }

    #[test]
    fn test_inactive_unbounded_rule_is_authoritative() {
        let mut book = RuleBook::new();
        book.upsert(PermissionRule::allow(alice(), "*"));
        book.upsert(PermissionRule::deny(alice(), "op_read"));

        let resolution = Evaluator::new(&book, ts(5)).resolve(&alice(), "op_read");
        assert!(!resolution.allowed);
        assert_eq!(resolution.level, Some(RuleLevel::Exact));
    }

    #[test]
    fn test_parameter_constraints() {
        let mut book = RuleBook::new();
        book.upsert(
            PermissionRule::allow(alice(), "op_get_item")
                .with_params(RuleParameters::string("oil_usd_price")),
        );

        let evaluator = Evaluator::new(&book, ts(1));
        assert!(evaluator.is_operation_allowed_with(
            &alice(),
            "op_get_item",
            &ParameterQuery::string("oil_usd_price")
        ));
        assert!(!evaluator.is_operation_allowed_with(
            &alice(),
            "op_get_item",
            &ParameterQuery::string("coti_usd_price")
        ));
        // the plain check ignores parameters
        assert!(evaluator.is_operation_allowed(&alice(), "op_get_item"));
    }

    #[test]
    fn test_parameter_constraints_never_rescue_a_denial() {
        let mut book = RuleBook::new();
        book.upsert(PermissionRule::deny(alice(), "op_get_item"));
        let evaluator = Evaluator::new(&book, ts(1));
        assert!(!evaluator.is_operation_allowed_with(
            &alice(),
            "op_get_item",
            &ParameterQuery::default()
        ));
    }
}
