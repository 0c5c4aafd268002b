//! Persisted policy envelope

use super::{DerivedRolesPolicy, ResourcePolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of policy stored in an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PolicyKind {
    ResourcePolicy,
    DerivedRolesPolicy,
}

impl PolicyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::ResourcePolicy => "ResourcePolicy",
            PolicyKind::DerivedRolesPolicy => "DerivedRolesPolicy",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedded policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyPayload {
    Resource(ResourcePolicy),
    DerivedRoles(DerivedRolesPolicy),
}

impl PolicyPayload {
    /// Envelope kind matching the payload variant
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicyPayload::Resource(_) => PolicyKind::ResourcePolicy,
            PolicyPayload::DerivedRoles(_) => PolicyKind::DerivedRolesPolicy,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PolicyPayload::Resource(policy) => policy.name(),
            PolicyPayload::DerivedRoles(policy) => policy.name(),
        }
    }

    /// BLAKE3 digest of the serialized document, hex encoded
    pub fn content_hash(&self) -> String {
        // serde_json emits struct fields in declaration order and the
        // collections are ordered, so the encoding is stable
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

impl From<ResourcePolicy> for PolicyPayload {
    fn from(policy: ResourcePolicy) -> Self {
        PolicyPayload::Resource(policy)
    }
}

impl From<DerivedRolesPolicy> for PolicyPayload {
    fn from(policy: DerivedRolesPolicy) -> Self {
        PolicyPayload::DerivedRoles(policy)
    }
}

/// Policy record as held by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPolicy {
    pub id: String,
    pub kind: PolicyKind,
    pub name: String,

    /// Incremented on every update
    pub version: u64,

    /// Content hash of the payload
    pub hash: String,

    pub enabled: bool,
    pub payload: PolicyPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredPolicy {
    /// Wrap a document in a fresh, enabled envelope at version 1
    pub fn new(id: impl Into<String>, payload: impl Into<PolicyPayload>) -> Self {
        let payload = payload.into();
        let now = Utc::now();
        Self {
            id: id.into(),
            kind: payload.kind(),
            name: payload.name().to_string(),
            version: 1,
            hash: payload.content_hash(),
            enabled: true,
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn as_resource_policy(&self) -> Option<&ResourcePolicy> {
        match &self.payload {
            PolicyPayload::Resource(policy) => Some(policy),
            PolicyPayload::DerivedRoles(_) => None,
        }
    }

    pub fn as_derived_roles_policy(&self) -> Option<&DerivedRolesPolicy> {
        match &self.payload {
            PolicyPayload::DerivedRoles(policy) => Some(policy),
            PolicyPayload::Resource(_) => None,
        }
    }
}
