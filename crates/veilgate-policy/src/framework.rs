//! The Data Privacy Framework: a rule book plus its administration surface.
//!
//! Every component owns one framework. Changing rules is itself an operation
//! gated by the framework ([`OP_SET_PERMISSION`]), so whoever may administer
//! policy is decided by policy. The deployer gets no implicit bypass; owner
//! privileges are ordinary rules seeded at construction.

use serde::{Deserialize, Serialize};

use veilgate_core::{Principal, Timestamp};

use crate::book::RuleBook;
use crate::error::{PolicyError, Result};
use crate::evaluator::{Evaluator, Resolution};
use crate::rule::{ParameterQuery, PermissionRule, OP_SET_PERMISSION};

/// A per-component policy instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPrivacyFramework {
    rules: RuleBook,
}

impl DataPrivacyFramework {
    /// A framework with no rules; everything is denied.
    pub fn new() -> Self {
        Self::default()
    }

    /// A framework where `owner` may administer rules.
    pub fn with_owner(owner: Principal) -> Result<Self> {
        let mut framework = Self::new();
        framework.seed(PermissionRule::allow(owner, OP_SET_PERMISSION))?;
        Ok(framework)
    }

    /// Install a rule without the administration check.
    ///
    /// Used while a component is being constructed, before anyone can hold
    /// [`OP_SET_PERMISSION`].
    pub fn seed(&mut self, rule: PermissionRule) -> Result<()> {
        rule.validate()?;
        self.rules.upsert(rule);
        Ok(())
    }

    /// Insert or replace a rule on behalf of `caller`.
    ///
    /// `caller` must be allowed [`OP_SET_PERMISSION`] at `now`.
    pub fn set_permission(
        &mut self,
        caller: &Principal,
        now: Timestamp,
        rule: PermissionRule,
    ) -> Result<()> {
        self.require(caller, OP_SET_PERMISSION, now)?;
        rule.validate()?;

        tracing::info!(
            %caller,
            rule_caller = %rule.caller,
            operation = %rule.operation,
            active = rule.active,
            "setting permission"
        );
        self.rules.upsert(rule);
        Ok(())
    }

    /// The rule stored under exactly `(caller, operation)`.
    pub fn get_permission(&self, caller: &Principal, operation: &str) -> Option<&PermissionRule> {
        self.rules.get(caller, operation)
    }

    /// All rules in deterministic order.
    pub fn permissions(&self) -> impl Iterator<Item = &PermissionRule> {
        self.rules.iter()
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    /// An evaluator over this framework's rules at `now`.
    pub fn evaluator(&self, now: Timestamp) -> Evaluator<'_> {
        Evaluator::new(&self.rules, now)
    }

    pub fn resolve(&self, caller: &Principal, operation: &str, now: Timestamp) -> Resolution<'_> {
        self.evaluator(now).resolve(caller, operation)
    }

    pub fn is_operation_allowed(&self, caller: &Principal, operation: &str, now: Timestamp) -> bool {
        self.evaluator(now).is_operation_allowed(caller, operation)
    }

    pub fn is_operation_allowed_with(
        &self,
        caller: &Principal,
        operation: &str,
        query: &ParameterQuery,
        now: Timestamp,
    ) -> bool {
        self.evaluator(now)
            .is_operation_allowed_with(caller, operation, query)
    }

    /// Fail with [`PolicyError::Denied`] unless `caller` may perform
    /// `operation`.
    pub fn require(&self, caller: &Principal, operation: &str, now: Timestamp) -> Result<()> {
        if self.is_operation_allowed(caller, operation, now) {
            Ok(())
        } else {
            Err(PolicyError::Denied {
                operation: operation.to_string(),
            })
        }
    }

    /// Like [`DataPrivacyFramework::require`] with parameter constraints.
    pub fn require_with(
        &self,
        caller: &Principal,
        operation: &str,
        query: &ParameterQuery,
        now: Timestamp,
    ) -> Result<()> {
        if self.is_operation_allowed_with(caller, operation, query, now) {
            Ok(())
        } else {
            Err(PolicyError::Denied {
                operation: operation.to_string(),
            })
        }
    }
}
