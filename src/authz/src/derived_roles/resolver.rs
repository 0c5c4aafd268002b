//! Per-request derived role resolution
//!
//! For every definition of every loaded [`DerivedRolesPolicy`]:
//!
//! 1. the definition is a candidate if its `parentRoles` is empty or one of
//!    them matches a principal role (wildcard patterns allowed);
//! 2. a candidate's condition is evaluated fail-closed;
//! 3. on success the definition name joins the result set.
//!
//! Results are never cached: resource attributes and aux data change per
//! request.

use super::pattern::any_role_matches;
use crate::cel::{Engine as CelEngine, EvalContext};
use crate::policy::DerivedRolesPolicy;
use crate::types::{Attributes, Principal, Resource};
use std::collections::BTreeSet;
use tracing::trace;

/// Computes the derived roles a principal holds for one request
#[derive(Debug, Clone, Default)]
pub struct DerivedRolesResolver {
    cel: CelEngine,
}

impl DerivedRolesResolver {
    /// Create a resolver evaluating conditions with the given engine
    pub fn new(cel: CelEngine) -> Self {
        Self { cel }
    }

    /// Resolve derived roles for a principal/resource pair
    ///
    /// # Arguments
    /// * `principal` - Requesting principal
    /// * `resource` - Target resource
    /// * `aux_data` - Optional per-request context
    /// * `policies` - Loaded derived roles policies
    pub fn resolve<'a, I>(
        &self,
        principal: &Principal,
        resource: &Resource,
        aux_data: Option<&Attributes>,
        policies: I,
    ) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a DerivedRolesPolicy>,
    {
        let ctx = EvalContext::for_request(principal, resource, aux_data);
        self.resolve_in_context(&principal.roles, &ctx, policies)
    }

    /// Resolve against a prebuilt evaluation context
    pub fn resolve_in_context<'a, I>(
        &self,
        principal_roles: &BTreeSet<String>,
        ctx: &EvalContext,
        policies: I,
    ) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a DerivedRolesPolicy>,
    {
        let mut derived = BTreeSet::new();

        for policy in policies {
            for definition in policy.definitions() {
                if derived.contains(&definition.name) {
                    continue;
                }

                if !any_role_matches(principal_roles, &definition.parent_roles) {
                    continue;
                }

                let granted = definition
                    .condition
                    .as_ref()
                    .map(|condition| self.cel.evaluate_boolean(condition.expression(), ctx))
                    .unwrap_or(true);

                if granted {
                    trace!(
                        policy = policy.name(),
                        derived_role = %definition.name,
                        "Derived role granted"
                    );
                    derived.insert(definition.name.clone());
                }
            }
        }

        derived
    }
}
