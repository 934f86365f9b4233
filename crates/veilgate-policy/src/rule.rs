//! Permission rules.
//!
//! A rule says whether `caller` may perform `operation`, during which time
//! window, and carries an opaque parameter payload that consumers may use to
//! narrow the rule (for example to a single key).

use serde::{Deserialize, Serialize};

use veilgate_core::{Principal, Timestamp};

use crate::error::{PolicyError, Result};

/// The operation name that matches every operation.
pub const WILDCARD_OPERATION: &str = "*";

/// The reserved operation that gates changes to the rule set itself.
pub const OP_SET_PERMISSION: &str = "op_set_permission";

/// When a rule is in force.
///
/// Bounds are seconds since the epoch; zero leaves that side unbounded.
/// The interval is half-open: `[not_before, not_after)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub not_before: Timestamp,
    pub not_after: Timestamp,
}

impl ValidityWindow {
    /// A window that is always in force.
    pub const UNBOUNDED: Self = Self {
        not_before: Timestamp::ZERO,
        not_after: Timestamp::ZERO,
    };

    pub const fn new(not_before: Timestamp, not_after: Timestamp) -> Self {
        Self {
            not_before,
            not_after,
        }
    }

    /// In force from `not_before` onwards.
    pub const fn starting(not_before: Timestamp) -> Self {
        Self::new(not_before, Timestamp::ZERO)
    }

    /// In force until just before `not_after`.
    pub const fn until(not_after: Timestamp) -> Self {
        Self::new(Timestamp::ZERO, not_after)
    }

    /// Whether neither side is bounded.
    pub fn is_unbounded(&self) -> bool {
        self.not_before == Timestamp::ZERO && self.not_after == Timestamp::ZERO
    }

    /// Whether `now` falls inside the window.
    pub fn contains(&self, now: Timestamp) -> bool {
        let started = self.not_before == Timestamp::ZERO || now >= self.not_before;
        let not_expired = self.not_after == Timestamp::ZERO || now < self.not_after;
        started && not_expired
    }

    fn validate(&self) -> Result<()> {
        if self.not_before != Timestamp::ZERO
            && self.not_after != Timestamp::ZERO
            && self.not_before >= self.not_after
        {
            return Err(PolicyError::InvalidWindow {
                not_before: self.not_before,
                not_after: self.not_after,
            });
        }
        Ok(())
    }
}

/// Auxiliary rule data.
///
/// The evaluator never reads it. [`RuleParameters::admits`] lets a consumer
/// treat the non-flag fields as constraints: a field that is set (non-zero
/// number, non-zero address, non-empty string) must equal the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleParameters {
    pub flag_a: bool,
    pub flag_b: bool,
    pub uint_parameter: u64,
    pub address_parameter: Principal,
    pub string_parameter: String,
}

impl Default for RuleParameters {
    fn default() -> Self {
        Self {
            flag_a: false,
            flag_b: false,
            uint_parameter: 0,
            address_parameter: Principal::ZERO,
            string_parameter: String::new(),
        }
    }
}

impl RuleParameters {
    /// Parameters restricting a rule to one string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            string_parameter: value.into(),
            ..Self::default()
        }
    }

    pub fn with_uint(mut self, value: u64) -> Self {
        self.uint_parameter = value;
        self
    }

    pub fn with_address(mut self, value: Principal) -> Self {
        self.address_parameter = value;
        self
    }

    pub fn with_flags(mut self, flag_a: bool, flag_b: bool) -> Self {
        self.flag_a = flag_a;
        self.flag_b = flag_b;
        self
    }

    /// Whether every set parameter equals the query's value.
    pub fn admits(&self, query: &ParameterQuery) -> bool {
        (self.uint_parameter == 0 || self.uint_parameter == query.uint_parameter)
            && (self.address_parameter.is_zero()
                || self.address_parameter == query.address_parameter)
            && (self.string_parameter.is_empty()
                || self.string_parameter == query.string_parameter)
    }
}

/// The concrete values a caller is acting on, checked against
/// [`RuleParameters`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterQuery {
    pub uint_parameter: u64,
    pub address_parameter: Principal,
    pub string_parameter: String,
}

impl Default for ParameterQuery {
    fn default() -> Self {
        Self {
            uint_parameter: 0,
            address_parameter: Principal::ZERO,
            string_parameter: String::new(),
        }
    }
}

impl ParameterQuery {
    /// A query naming only a string, such as an item key.
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            string_parameter: value.into(),
            ..Self::default()
        }
    }

    pub fn with_uint(mut self, value: u64) -> Self {
        self.uint_parameter = value;
        self
    }

    pub fn with_address(mut self, value: Principal) -> Self {
        self.address_parameter = value;
        self
    }
}

/// A single permission rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionRule {
    /// A concrete principal or [`Principal::ALL`].
    pub caller: Principal,

    /// An operation name or [`WILDCARD_OPERATION`].
    pub operation: String,

    /// `false` is a standing denial, not an absent rule.
    pub active: bool,

    pub window: ValidityWindow,

    pub params: RuleParameters,
}

impl PermissionRule {
    /// An always-in-force allow rule.
    pub fn allow(caller: Principal, operation: impl Into<String>) -> Self {
        Self {
            caller,
            operation: operation.into(),
            active: true,
            window: ValidityWindow::UNBOUNDED,
            params: RuleParameters::default(),
        }
    }

    /// An always-in-force deny rule.
    pub fn deny(caller: Principal, operation: impl Into<String>) -> Self {
        Self {
            active: false,
            ..Self::allow(caller, operation)
        }
    }

    pub fn with_window(mut self, window: ValidityWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_params(mut self, params: RuleParameters) -> Self {
        self.params = params;
        self
    }

    /// Whether the rule applies to any caller.
    pub fn is_caller_wildcard(&self) -> bool {
        self.caller.is_wildcard()
    }

    /// Whether the rule applies to any operation.
    pub fn is_operation_wildcard(&self) -> bool {
        self.operation == WILDCARD_OPERATION
    }

    /// Whether the rule's window contains `now`. An inactive rule can be in
    /// force; it then denies.
    pub fn is_in_force(&self, now: Timestamp) -> bool {
        self.window.contains(now)
    }

    /// Check the rule is well formed.
    pub fn validate(&self) -> Result<()> {
        if self.caller.is_zero() {
            return Err(PolicyError::ZeroCaller);
        }
        if self.operation.is_empty() {
            return Err(PolicyError::EmptyOperation);
        }
        self.window.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_window_is_half_open() {
        let window = ValidityWindow::new(ts(100), ts(200));
        assert!(!window.contains(ts(99)));
        assert!(window.contains(ts(100)));
        assert!(window.contains(ts(199)));
        assert!(!window.contains(ts(200)));
    }

    #[test]
    fn test_window_zero_is_unbounded() {
        assert!(ValidityWindow::UNBOUNDED.contains(ts(0)));
        assert!(ValidityWindow::UNBOUNDED.contains(ts(u64::MAX)));
        assert!(ValidityWindow::starting(ts(50)).contains(ts(u64::MAX)));
        assert!(ValidityWindow::until(ts(50)).contains(ts(1)));
        assert!(!ValidityWindow::until(ts(50)).contains(ts(50)));
    }

    #[test]
    fn test_validate_rejects_zero_caller() {
        let rule = PermissionRule::allow(Principal::ZERO, "op_read");
        assert_eq!(rule.validate(), Err(PolicyError::ZeroCaller));
    }

    #[test]
    fn test_validate_rejects_empty_operation() {
        let rule = PermissionRule::allow(Principal::ALL, "");
        assert_eq!(rule.validate(), Err(PolicyError::EmptyOperation));
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let rule = PermissionRule::allow(Principal::ALL, "op_read")
            .with_window(ValidityWindow::new(ts(200), ts(100)));
        assert!(matches!(rule.validate(), Err(PolicyError::InvalidWindow { .. })));

        let empty = PermissionRule::allow(Principal::ALL, "op_read")
            .with_window(ValidityWindow::new(ts(100), ts(100)));
        assert!(empty.validate().is_err());

        let open = PermissionRule::allow(Principal::ALL, "op_read")
            .with_window(ValidityWindow::starting(ts(100)));
        assert!(open.validate().is_ok());
    }

    #[test]
    fn test_unset_parameters_admit_anything() {
        let query = ParameterQuery::string("price")
            .with_uint(7)
            .with_address(Principal::ALL);
        assert!(RuleParameters::default().admits(&query));
    }

    #[test]
    fn test_set_parameters_must_match() {
        let params = RuleParameters::string("price").with_uint(7);
        assert!(params.admits(&ParameterQuery::string("price").with_uint(7)));
        assert!(!params.admits(&ParameterQuery::string("price").with_uint(8)));
        assert!(!params.admits(&ParameterQuery::string("volume").with_uint(7)));
    }

    #[test]
    fn test_flags_are_not_constraints() {
        let params = RuleParameters::default().with_flags(true, true);
        assert!(params.admits(&ParameterQuery::default()));
    }
}
