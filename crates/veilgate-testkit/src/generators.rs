//! Proptest generators for property-based testing.

use proptest::prelude::*;

use veilgate_core::{Principal, Timestamp, PRINCIPAL_LEN};
use veilgate_policy::{PermissionRule, RuleParameters, ValidityWindow, WILDCARD_OPERATION};

/// A concrete, non-zero, non-wildcard principal.
pub fn principal() -> impl Strategy<Value = Principal> {
    any::<[u8; PRINCIPAL_LEN]>()
        .prop_map(Principal::from_bytes)
        .prop_filter("concrete principal", |p| !p.is_zero() && !p.is_wildcard())
}

/// A rule caller: usually concrete, sometimes [`Principal::ALL`].
pub fn rule_caller() -> impl Strategy<Value = Principal> {
    prop_oneof![4 => principal(), 1 => Just(Principal::ALL)]
}

/// A concrete operation name.
pub fn operation() -> impl Strategy<Value = String> {
    "op_[a-z][a-z_]{0,15}".prop_map(String::from)
}

/// A rule operation: usually concrete, sometimes the wildcard.
pub fn rule_operation() -> impl Strategy<Value = String> {
    prop_oneof![4 => operation(), 1 => Just(WILDCARD_OPERATION.to_string())]
}

/// A time well away from both ends of the range.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    (1_000u64..=4_000_000_000u64).prop_map(Timestamp::from_secs)
}

/// A well-formed validity window.
pub fn window() -> impl Strategy<Value = ValidityWindow> {
    prop_oneof![
        Just(ValidityWindow::UNBOUNDED),
        timestamp().prop_map(ValidityWindow::starting),
        timestamp().prop_map(ValidityWindow::until),
        (timestamp(), 1u64..=1_000_000).prop_map(|(start, len)| {
            ValidityWindow::new(start, start.saturating_add_secs(len))
        }),
    ]
}

/// A well-formed rule without parameter constraints.
pub fn rule() -> impl Strategy<Value = PermissionRule> {
    (rule_caller(), rule_operation(), any::<bool>(), window()).prop_map(
        |(caller, operation, active, window)| {
            let rule = if active {
                PermissionRule::allow(caller, operation)
            } else {
                PermissionRule::deny(caller, operation)
            };
            rule.with_window(window)
        },
    )
}

/// A rule constrained to a string parameter, as database items use.
pub fn keyed_rule() -> impl Strategy<Value = (PermissionRule, String)> {
    (rule(), "[a-z]{1,8}").prop_map(|(rule, key)| {
        let rule = rule.with_params(RuleParameters::string(key.clone()));
        (rule, key)
    })
}

/// A book of up to `max` rules.
pub fn rules(max: usize) -> impl Strategy<Value = Vec<PermissionRule>> {
    prop::collection::vec(rule(), 0..=max)
}
