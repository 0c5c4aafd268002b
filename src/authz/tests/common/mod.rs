//! Shared fixtures for integration tests

#![allow(dead_code)]

use authz_policy_engine::{
    CheckRequest, DerivedRoleDefinition, DerivedRolesPolicy, PolicyRule, Principal, Resource,
    ResourcePolicy,
};
use tracing_subscriber::EnvFilter;

/// Install a test subscriber once; later calls are ignored
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Document policy used across tests
///
/// * `viewer` may read
/// * `owner` (derived) may edit
/// * nobody may delete an archived document
pub fn document_policy() -> ResourcePolicy {
    ResourcePolicy::new("document")
        .with_name("document-policy")
        .with_rule(PolicyRule::allow(["read"]).with_roles(["viewer"]).named("viewer-read"))
        .with_rule(
            PolicyRule::allow(["edit"])
                .with_derived_roles(["owner"])
                .named("owner-edit"),
        )
        .with_rule(
            PolicyRule::deny(["delete"])
                .with_condition("resource.attributes.status == 'archived'")
                .named("no-archived-delete"),
        )
        .with_rule(PolicyRule::allow(["delete"]).with_derived_roles(["owner"]).named("owner-delete"))
}

pub fn owner_roles() -> DerivedRolesPolicy {
    DerivedRolesPolicy::new("common-roles").with_definition(
        DerivedRoleDefinition::new("owner", ["viewer"])
            .with_condition("resource.attributes.ownerId == principal.id"),
    )
}

pub fn document_request(principal: &str, owner: &str, actions: &[&str]) -> CheckRequest {
    CheckRequest::new(
        Principal::new(principal).with_role("viewer"),
        Resource::new("document", "doc-1")
            .with_attribute("ownerId", owner)
            .with_attribute("status", "active"),
        actions.to_vec(),
    )
}
