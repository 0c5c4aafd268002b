//! Rule matching for one resource policy and one action
//!
//! A rule is a candidate for action `a` when all of these hold:
//!
//! * `a` or `*` is in `rule.actions`
//! * `rule.roles` is empty or intersects the effective roles
//! * `rule.derivedRoles` is empty or intersects the derived roles
//! * `rule.condition` is absent or evaluates to `true`
//!
//! The first deny candidate wins outright. Otherwise the last allow
//! candidate wins. No candidate means default deny.

use crate::cel::{Engine as CelEngine, EvalContext};
use crate::policy::{PolicyRule, ResourcePolicy};
use std::collections::BTreeSet;

/// Evaluates the rules of a resource policy in declared order
#[derive(Debug, Clone, Copy)]
pub struct RuleMatcher<'a> {
    cel: &'a CelEngine,
}

impl<'a> RuleMatcher<'a> {
    pub fn new(cel: &'a CelEngine) -> Self {
        Self { cel }
    }

    /// Winning rule for the action, or `None` for default deny
    pub fn decide<'p>(
        &self,
        policy: &'p ResourcePolicy,
        action: &str,
        effective_roles: &BTreeSet<String>,
        derived_roles: &BTreeSet<String>,
        ctx: &EvalContext,
    ) -> Option<&'p PolicyRule> {
        let mut last_allow = None;

        for rule in policy.rules() {
            if !self.is_candidate(rule, action, effective_roles, derived_roles, ctx) {
                continue;
            }

            if rule.effect.is_allow() {
                last_allow = Some(rule);
            } else {
                return Some(rule);
            }
        }

        last_allow
    }

    /// Whether a rule applies to the action for this request
    ///
    /// The condition is evaluated last, only after the cheap checks pass.
    pub fn is_candidate(
        &self,
        rule: &PolicyRule,
        action: &str,
        effective_roles: &BTreeSet<String>,
        derived_roles: &BTreeSet<String>,
        ctx: &EvalContext,
    ) -> bool {
        if !rule.covers_action(action) {
            return false;
        }

        if !rule.roles.is_empty() && rule.roles.is_disjoint(effective_roles) {
            return false;
        }

        if !rule.derived_roles.is_empty() && rule.derived_roles.is_disjoint(derived_roles) {
            return false;
        }

        match &rule.condition {
            Some(condition) => self.cel.evaluate_boolean(condition.expression(), ctx),
            None => true,
        }
    }
}
