//! Rule storage.
//!
//! Rules live in four independent key spaces so that a wildcard rule can
//! never shadow or overwrite a concrete one:
//!
//! | space | caller | operation |
//! |-------|--------|-----------|
//! | exact | concrete | concrete |
//! | caller wildcard | concrete | `*` |
//! | operation wildcard | `ALL` | concrete |
//! | global | `ALL` | `*` |
//!
//! Each space holds at most one rule per key. Maps are ordered so iteration
//! and serialized snapshots are deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use veilgate_core::Principal;

use crate::rule::{PermissionRule, WILDCARD_OPERATION};

/// The key space a rule occupies, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleLevel {
    /// `(caller, operation)`.
    Exact,
    /// `(caller, "*")`.
    CallerWildcard,
    /// `(ALL, operation)`.
    OperationWildcard,
    /// `(ALL, "*")`.
    Global,
}

impl RuleLevel {
    /// All levels, most specific first.
    pub const PRECEDENCE: [RuleLevel; 4] = [
        RuleLevel::Exact,
        RuleLevel::CallerWildcard,
        RuleLevel::OperationWildcard,
        RuleLevel::Global,
    ];

    /// The level a `(caller, operation)` pair belongs to.
    pub fn classify(caller: &Principal, operation: &str) -> Self {
        match (caller.is_wildcard(), operation == WILDCARD_OPERATION) {
            (false, false) => RuleLevel::Exact,
            (false, true) => RuleLevel::CallerWildcard,
            (true, false) => RuleLevel::OperationWildcard,
            (true, true) => RuleLevel::Global,
        }
    }
}

impl fmt::Display for RuleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleLevel::Exact => "exact",
            RuleLevel::CallerWildcard => "caller-wildcard",
            RuleLevel::OperationWildcard => "operation-wildcard",
            RuleLevel::Global => "global",
        };
        f.write_str(name)
    }
}

/// The permission record store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBook {
    exact: BTreeMap<Principal, BTreeMap<String, PermissionRule>>,
    caller_wildcard: BTreeMap<Principal, PermissionRule>,
    operation_wildcard: BTreeMap<String, PermissionRule>,
    global: Option<PermissionRule>,
}

impl RuleBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the rule for the rule's `(caller, operation)` key.
    ///
    /// Returns the rule that was replaced, if any. Does not validate; see
    /// [`PermissionRule::validate`].
    pub fn upsert(&mut self, rule: PermissionRule) -> Option<PermissionRule> {
        match RuleLevel::classify(&rule.caller, &rule.operation) {
            RuleLevel::Exact => self
                .exact
                .entry(rule.caller)
                .or_default()
                .insert(rule.operation.clone(), rule),
            RuleLevel::CallerWildcard => self.caller_wildcard.insert(rule.caller, rule),
            RuleLevel::OperationWildcard => {
                self.operation_wildcard.insert(rule.operation.clone(), rule)
            }
            RuleLevel::Global => self.global.replace(rule),
        }
    }

    /// The rule stored under exactly this key, without any fallback.
    pub fn get(&self, caller: &Principal, operation: &str) -> Option<&PermissionRule> {
        self.at_level(RuleLevel::classify(caller, operation), caller, operation)
    }

    /// The rule that would apply to `(caller, operation)` at `level`.
    pub fn at_level(
        &self,
        level: RuleLevel,
        caller: &Principal,
        operation: &str,
    ) -> Option<&PermissionRule> {
        match level {
            RuleLevel::Exact => self.exact.get(caller).and_then(|ops| ops.get(operation)),
            RuleLevel::CallerWildcard => self.caller_wildcard.get(caller),
            RuleLevel::OperationWildcard => self.operation_wildcard.get(operation),
            RuleLevel::Global => self.global.as_ref(),
        }
    }

    /// Iterate all rules: exact first, then caller wildcards, operation
    /// wildcards and the global rule, each in key order.
    pub fn iter(&self) -> impl Iterator<Item = &PermissionRule> {
        self.exact
            .values()
            .flat_map(|ops| ops.values())
            .chain(self.caller_wildcard.values())
            .chain(self.operation_wildcard.values())
            .chain(self.global.iter())
    }

    /// Number of stored rules.
    pub fn len(&self) -> usize {
        self.exact.values().map(BTreeMap::len).sum::<usize>()
            + self.caller_wildcard.len()
            + self.operation_wildcard.len()
            + usize::from(self.global.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Principal {
        Principal::from_bytes([0xa1; 20])
    }

    #[test]
    fn test_classify() {
        assert_eq!(RuleLevel::classify(&alice(), "op_read"), RuleLevel::Exact);
        assert_eq!(RuleLevel::classify(&alice(), "*"), RuleLevel::CallerWildcard);
        assert_eq!(
            RuleLevel::classify(&Principal::ALL, "op_read"),
            RuleLevel::OperationWildcard
        );
        assert_eq!(RuleLevel::classify(&Principal::ALL, "*"), RuleLevel::Global);
    }

    #[test]
    fn test_key_spaces_are_independent() {
        let mut book = RuleBook::new();
        book.upsert(PermissionRule::allow(alice(), "op_read"));
        book.upsert(PermissionRule::deny(alice(), "*"));
        book.upsert(PermissionRule::allow(Principal::ALL, "op_read"));
        book.upsert(PermissionRule::deny(Principal::ALL, "*"));

        assert_eq!(book.len(), 4);
        assert!(book.get(&alice(), "op_read").unwrap().active);
        assert!(!book.get(&alice(), "*").unwrap().active);
        assert!(book.get(&Principal::ALL, "op_read").unwrap().active);
        assert!(!book.get(&Principal::ALL, "*").unwrap().active);
    }

    #[test]
    fn test_upsert_replaces() {
        let mut book = RuleBook::new();
        assert!(book.upsert(PermissionRule::allow(alice(), "op_read")).is_none());
        let previous = book.upsert(PermissionRule::deny(alice(), "op_read"));

        assert!(previous.unwrap().active);
        assert_eq!(book.len(), 1);
        assert!(!book.get(&alice(), "op_read").unwrap().active);
    }

    #[test]
    fn test_iteration_order_is_deterministic() {
        let mut a = RuleBook::new();
        let mut b = RuleBook::new();
        let rules = [
            PermissionRule::allow(Principal::ALL, "*"),
            PermissionRule::allow(alice(), "op_b"),
            PermissionRule::allow(alice(), "op_a"),
            PermissionRule::allow(Principal::ALL, "op_c"),
        ];
        for rule in rules.iter() {
            a.upsert(rule.clone());
        }
        for rule in rules.iter().rev() {
            b.upsert(rule.clone());
        }

        let ops: Vec<_> = a.iter().map(|r| r.operation.as_str()).collect();
        assert_eq!(ops, vec!["op_a", "op_b", "op_c", "*"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_book_cbor_roundtrip() {
        let mut book = RuleBook::new();
        book.upsert(PermissionRule::allow(alice(), "op_read"));
        book.upsert(PermissionRule::allow(Principal::ALL, "*"));

        let mut buf = Vec::new();
        ciborium::into_writer(&book, &mut buf).unwrap();
        let decoded: RuleBook = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(book, decoded);
    }
}
