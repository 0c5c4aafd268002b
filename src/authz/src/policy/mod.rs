//! Policy documents, stored envelopes, and the policy store interface
//!
//! Documents use a Cerbos-style JSON layout:
//!
//! ```json
//! {
//!   "apiVersion": "api.authz.dev/v1",
//!   "kind": "ResourcePolicy",
//!   "metadata": { "name": "document-policy" },
//!   "spec": {
//!     "resource": "document",
//!     "rules": [
//!       { "name": "owner-edit", "actions": ["edit"], "effect": "allow",
//!         "derivedRoles": ["owner"] }
//!     ]
//!   }
//! }
//! ```

pub mod store;
pub mod stored;
pub mod validation;

pub use store::{
    ChangeHandler, ChangeType, InMemoryPolicyStore, PolicyChangeEvent, PolicyPage, PolicyQuery,
    PolicyStore,
};
pub use stored::{PolicyKind, PolicyPayload, StoredPolicy};
pub use validation::{validate_candidate, validate_policy, ValidationIssue, ValidationReport};

use crate::types::Effect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default `apiVersion` for documents built in code
pub const API_VERSION: &str = "api.authz.dev/v1";

/// Document `kind` of resource policies
pub const RESOURCE_POLICY_KIND: &str = "ResourcePolicy";

/// Document `kind` of derived roles policies
pub const DERIVED_ROLES_KIND: &str = "DerivedRoles";

/// Rule or definition condition
///
/// Accepts either a bare expression string or `{"match": {"expr": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Expression(String),
    Match {
        #[serde(rename = "match")]
        matcher: MatchExpr,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchExpr {
    pub expr: String,
}

impl Condition {
    pub fn new(expr: impl Into<String>) -> Self {
        Condition::Expression(expr.into())
    }

    /// Expression source
    pub fn expression(&self) -> &str {
        match self {
            Condition::Expression(expr) => expr,
            Condition::Match { matcher } => &matcher.expr,
        }
    }
}

/// Document metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PolicyMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// One decision clause of a resource policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Actions the rule covers; `*` covers every action
    pub actions: BTreeSet<String>,

    pub effect: Effect,

    /// Static or derived roles; empty means any role
    #[serde(default)]
    pub roles: BTreeSet<String>,

    /// Derived roles; empty means no derived role is required
    #[serde(default)]
    pub derived_roles: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl PolicyRule {
    pub fn new<I, S>(effect: Effect, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            actions: actions.into_iter().map(Into::into).collect(),
            effect,
            roles: BTreeSet::new(),
            derived_roles: BTreeSet::new(),
            condition: None,
        }
    }

    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Effect::Allow, actions)
    }

    pub fn deny<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Effect::Deny, actions)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_derived_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.derived_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_condition(mut self, expr: impl Into<String>) -> Self {
        self.condition = Some(Condition::new(expr));
        self
    }

    /// Whether the rule lists the action or the `*` wildcard
    pub fn covers_action(&self, action: &str) -> bool {
        self.actions.contains(action) || self.actions.contains("*")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePolicySpec {
    /// Resource kind this policy governs
    pub resource: String,

    #[serde(default = "default_policy_version")]
    pub version: String,

    /// Rules, evaluated in declared order
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// All rules for one resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePolicy {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_resource_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: PolicyMetadata,

    pub spec: ResourcePolicySpec,
}

impl ResourcePolicy {
    /// Create an empty policy for a resource kind
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_resource_kind(),
            metadata: PolicyMetadata::default(),
            spec: ResourcePolicySpec {
                resource: resource.into(),
                version: default_policy_version(),
                rules: Vec::new(),
            },
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = Some(name.into());
        self
    }

    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.spec.rules.push(rule);
        self
    }

    /// Policy name, falling back to the resource kind
    pub fn name(&self) -> &str {
        self.metadata
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.spec.resource)
    }

    pub fn resource(&self) -> &str {
        &self.spec.resource
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.spec.rules
    }
}

/// A computed role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedRoleDefinition {
    pub name: String,

    /// Roles (or role patterns) the principal must hold one of; empty
    /// means no role requirement
    #[serde(default)]
    pub parent_roles: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl DerivedRoleDefinition {
    pub fn new<I, S>(name: impl Into<String>, parent_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            parent_roles: parent_roles.into_iter().map(Into::into).collect(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, expr: impl Into<String>) -> Self {
        self.condition = Some(Condition::new(expr));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedRolesSpec {
    pub name: String,

    #[serde(default)]
    pub definitions: Vec<DerivedRoleDefinition>,
}

/// Group of derived role definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedRolesPolicy {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_derived_roles_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: PolicyMetadata,

    pub spec: DerivedRolesSpec,
}

impl DerivedRolesPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            api_version: default_api_version(),
            kind: default_derived_roles_kind(),
            metadata: PolicyMetadata::named(name.clone()),
            spec: DerivedRolesSpec {
                name,
                definitions: Vec::new(),
            },
        }
    }

    pub fn with_definition(mut self, definition: DerivedRoleDefinition) -> Self {
        self.spec.definitions.push(definition);
        self
    }

    /// Policy name, falling back to `spec.name`
    pub fn name(&self) -> &str {
        self.metadata
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.spec.name)
    }

    pub fn definitions(&self) -> &[DerivedRoleDefinition] {
        &self.spec.definitions
    }
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_resource_kind() -> String {
    RESOURCE_POLICY_KIND.to_string()
}

fn default_derived_roles_kind() -> String {
    DERIVED_ROLES_KIND.to_string()
}

fn default_policy_version() -> String {
    "default".to_string()
}
