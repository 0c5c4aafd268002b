//! Immutable policy index read by `check`
//!
//! An index is built once and never mutated. Writers build a replacement
//! and publish it with a single pointer swap.

use crate::policy::{DerivedRolesPolicy, ResourcePolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// The complete set of active policies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySet {
    #[serde(default)]
    pub resource_policies: Vec<ResourcePolicy>,

    #[serde(default)]
    pub derived_roles_policies: Vec<DerivedRolesPolicy>,
}

impl PolicySet {
    pub fn new(
        resource_policies: Vec<ResourcePolicy>,
        derived_roles_policies: Vec<DerivedRolesPolicy>,
    ) -> Self {
        Self {
            resource_policies,
            derived_roles_policies,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resource_policies.is_empty() && self.derived_roles_policies.is_empty()
    }

    /// Total number of policies in the set
    pub fn len(&self) -> usize {
        self.resource_policies.len() + self.derived_roles_policies.len()
    }
}

/// Engine statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub resource_policies: usize,
    pub derived_roles_policies: usize,

    /// Resource kinds with a policy, sorted
    pub resources: Vec<String>,

    /// Publication counter, incremented on every index swap
    pub generation: u64,
}

/// Resource kind → policy lookup plus the derived roles policies
#[derive(Debug, Default)]
pub struct PolicyIndex {
    by_kind: BTreeMap<String, ResourcePolicy>,
    derived_roles: Vec<DerivedRolesPolicy>,
    generation: u64,
}

impl PolicyIndex {
    /// Build an index from a policy set
    ///
    /// When several resource policies target the same kind, the one loaded
    /// last replaces the others.
    pub fn build(set: PolicySet, generation: u64) -> Self {
        let mut by_kind = BTreeMap::new();

        for policy in set.resource_policies {
            let kind = policy.resource().to_string();
            if let Some(previous) = by_kind.insert(kind.clone(), policy) {
                warn!(
                    resource = %kind,
                    replaced = previous.name(),
                    "Multiple resource policies for one resource kind, keeping the last"
                );
            }
        }

        Self {
            by_kind,
            derived_roles: set.derived_roles_policies,
            generation,
        }
    }

    pub fn resource_policy(&self, kind: &str) -> Option<&ResourcePolicy> {
        self.by_kind.get(kind)
    }

    pub fn derived_roles_policies(&self) -> &[DerivedRolesPolicy] {
        &self.derived_roles
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Copy of the indexed policies, resource policies ordered by kind
    pub fn to_policy_set(&self) -> PolicySet {
        PolicySet {
            resource_policies: self.by_kind.values().cloned().collect(),
            derived_roles_policies: self.derived_roles.clone(),
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            resource_policies: self.by_kind.len(),
            derived_roles_policies: self.derived_roles.len(),
            resources: self.by_kind.keys().cloned().collect(),
            generation: self.generation,
        }
    }
}
