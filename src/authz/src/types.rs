//! Core authorization types: check requests and responses

use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Policy id reported when no policy or rule produced a decision
pub const DEFAULT_DENY_POLICY: &str = "default-deny";

/// Free-form attribute map attached to principals, resources and aux data
pub type Attributes = HashMap<String, Value>;

/// Outcome of a rule match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Allow the action
    #[serde(alias = "EFFECT_ALLOW", alias = "ALLOW")]
    Allow,
    /// Deny the action
    #[serde(alias = "EFFECT_DENY", alias = "DENY")]
    Deny,
}

impl Effect {
    pub fn is_allow(self) -> bool {
        self == Effect::Allow
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
        }
    }
}

/// Principal (user, service account) making the request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier (e.g., "alice", "svc:billing")
    pub id: String,

    /// Statically assigned roles
    #[serde(default)]
    pub roles: BTreeSet<String>,

    /// Additional attributes (department, clearance, ...)
    #[serde(default, alias = "attr")]
    pub attributes: Attributes,
}

impl Principal {
    /// Create a new principal without roles
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
            attributes: HashMap::new(),
        }
    }

    /// Add a role to the principal
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Add several roles at once
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Add an attribute to the principal
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Resource being accessed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource kind, selects the resource policy (e.g., "document")
    pub kind: String,

    /// Resource instance identifier
    #[serde(default)]
    pub id: String,

    /// Additional attributes (ownerId, status, ...)
    #[serde(default, alias = "attr")]
    pub attributes: Attributes,
}

impl Resource {
    /// Create a new resource of the given kind
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add an attribute to the resource
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// One authorization evaluation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    /// Caller supplied request id, generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Who is making the request
    pub principal: Principal,

    /// What resource is being accessed
    pub resource: Resource,

    /// Requested actions, duplicates are evaluated once
    pub actions: Vec<String>,

    /// Optional per-request context (JWT claims, request metadata, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_data: Option<Attributes>,
}

impl CheckRequest {
    pub fn new<I, S>(principal: Principal, resource: Resource, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            request_id: None,
            principal,
            resource,
            actions: actions.into_iter().map(Into::into).collect(),
            aux_data: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_aux_data(mut self, aux_data: Attributes) -> Self {
        self.aux_data = Some(aux_data);
        self
    }

    /// Reject malformed requests before evaluation begins
    pub fn validate(&self) -> Result<()> {
        if self.principal.id.trim().is_empty() {
            return Err(AuthzError::InvalidRequest(
                "principal.id must not be empty".to_string(),
            ));
        }

        if self.resource.kind.trim().is_empty() {
            return Err(AuthzError::InvalidRequest(
                "resource.kind must not be empty".to_string(),
            ));
        }

        if self.actions.is_empty() {
            return Err(AuthzError::InvalidRequest(
                "actions must contain at least one action".to_string(),
            ));
        }

        if let Some(pos) = self.actions.iter().position(|a| a.trim().is_empty()) {
            return Err(AuthzError::InvalidRequest(format!(
                "action at index {} is empty",
                pos
            )));
        }

        Ok(())
    }

    /// Distinct actions in first-occurrence order
    pub fn unique_actions(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.actions
            .iter()
            .map(String::as_str)
            .filter(|a| seen.insert(*a))
            .collect()
    }
}

/// Per-action evaluation metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMeta {
    /// Name of the rule that decided the action, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,

    /// Derived roles the principal held for this request
    #[serde(default)]
    pub effective_derived_roles: Vec<String>,
}

/// Per-action outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub effect: Effect,

    /// Policy that produced the decision, or `default-deny`
    pub policy: String,

    #[serde(default)]
    pub meta: ActionMeta,
}

impl ActionResult {
    pub fn default_deny(effective_derived_roles: Vec<String>) -> Self {
        Self {
            effect: Effect::Deny,
            policy: DEFAULT_DENY_POLICY.to_string(),
            meta: ActionMeta {
                matched_rule: None,
                effective_derived_roles,
            },
        }
    }
}

/// Response-level metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    /// Wall-clock evaluation time in microseconds
    pub evaluation_duration_us: u64,

    /// Policies consulted while evaluating the request
    #[serde(default)]
    pub policies_evaluated: Vec<String>,
}

/// Engine output, one result per distinct requested action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub request_id: String,
    pub results: BTreeMap<String, ActionResult>,
    #[serde(default)]
    pub meta: ResponseMeta,
}

impl CheckResponse {
    /// Whether the action was allowed; unknown actions are denied
    pub fn is_allowed(&self, action: &str) -> bool {
        self.results
            .get(action)
            .map(|r| r.effect.is_allow())
            .unwrap_or(false)
    }

    /// Effect of an action, if it was part of the request
    pub fn effect(&self, action: &str) -> Option<Effect> {
        self.results.get(action).map(|r| r.effect)
    }
}
