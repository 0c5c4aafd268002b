//! Resolver tests covering parent role gating, conditions, and set semantics

use super::resolver::DerivedRolesResolver;
use crate::policy::{DerivedRoleDefinition, DerivedRolesPolicy};
use crate::types::{Principal, Resource};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};

fn owner_policy() -> DerivedRolesPolicy {
    DerivedRolesPolicy::new("common-roles").with_definition(
        DerivedRoleDefinition::new("owner", ["user"])
            .with_condition("resource.attributes.ownerId == principal.id"),
    )
}

fn names(roles: &BTreeSet<String>) -> Vec<&str> {
    roles.iter().map(String::as_str).collect()
}

// ============================================================================
// Gating
// ============================================================================

#[test]
fn test_owner_requires_parent_role_and_condition() {
    let resolver = DerivedRolesResolver::default();
    let policy = owner_policy();
    let doc = Resource::new("document", "d1").with_attribute("ownerId", "alice");

    let user = Principal::new("alice").with_role("user");
    assert_eq!(names(&resolver.resolve(&user, &doc, None, [&policy])), vec!["owner"]);

    // condition passes, parent role missing
    let guest = Principal::new("alice").with_role("guest");
    assert!(resolver.resolve(&guest, &doc, None, [&policy]).is_empty());

    // parent role present, condition fails
    let other_doc = Resource::new("document", "d1").with_attribute("ownerId", "bob");
    assert!(resolver.resolve(&user, &other_doc, None, [&policy]).is_empty());
}

#[test]
fn test_empty_parent_roles_is_unconditional_on_roles() {
    let resolver = DerivedRolesResolver::default();
    let policy = DerivedRolesPolicy::new("roles").with_definition(
        DerivedRoleDefinition::new("internal", Vec::<String>::new())
            .with_condition("auxData.network == 'corp'"),
    );

    let nobody = Principal::new("svc");
    let resource = Resource::new("report", "r1");
    let mut aux = HashMap::new();
    aux.insert("network".to_string(), json!("corp"));

    let roles = resolver.resolve(&nobody, &resource, Some(&aux), [&policy]);
    assert!(roles.contains("internal"));
    assert!(resolver.resolve(&nobody, &resource, None, [&policy]).is_empty());
}

#[test]
fn test_definition_without_condition() {
    let resolver = DerivedRolesResolver::default();
    let policy = DerivedRolesPolicy::new("roles")
        .with_definition(DerivedRoleDefinition::new("staff", ["employee", "contractor"]));

    let contractor = Principal::new("c1").with_role("contractor");
    let roles = resolver.resolve(&contractor, &Resource::new("x", "1"), None, [&policy]);
    assert_eq!(names(&roles), vec!["staff"]);
}

#[test]
fn test_wildcard_parent_roles() {
    let resolver = DerivedRolesResolver::default();
    let policy = DerivedRolesPolicy::new("roles")
        .with_definition(DerivedRoleDefinition::new("org_admin", ["admin:*"]))
        .with_definition(DerivedRoleDefinition::new("any_viewer", ["*:viewer"]));

    let principal = Principal::new("p").with_roles(["admin:billing", "project:viewer"]);
    let roles = resolver.resolve(&principal, &Resource::new("x", "1"), None, [&policy]);
    assert_eq!(names(&roles), vec!["any_viewer", "org_admin"]);

    let plain = Principal::new("p").with_role("admin");
    assert!(resolver.resolve(&plain, &Resource::new("x", "1"), None, [&policy]).is_empty());
}

// ============================================================================
// Set semantics and failure handling
// ============================================================================

#[test]
fn test_duplicate_names_across_policies_collapse() {
    let resolver = DerivedRolesResolver::default();
    let first = owner_policy();
    let second = DerivedRolesPolicy::new("more-roles")
        .with_definition(DerivedRoleDefinition::new("owner", ["admin"]));

    let principal = Principal::new("alice").with_roles(["user", "admin"]);
    let doc = Resource::new("document", "d1").with_attribute("ownerId", "alice");

    let roles = resolver.resolve(&principal, &doc, None, [&first, &second]);
    assert_eq!(roles.len(), 1);
}

#[test]
fn test_broken_condition_never_grants() {
    let resolver = DerivedRolesResolver::default();
    let policy = DerivedRolesPolicy::new("roles")
        .with_definition(DerivedRoleDefinition::new("bad_syntax", ["user"]).with_condition("((("))
        .with_definition(
            DerivedRoleDefinition::new("missing_path", ["user"])
                .with_condition("resource.attributes.a.b.c == principal.id"),
        )
        .with_definition(
            DerivedRoleDefinition::new("type_error", ["user"])
                .with_condition("principal.id > 3"),
        );

    let principal = Principal::new("alice").with_role("user");
    let roles = resolver.resolve(&principal, &Resource::new("doc", "1"), None, [&policy]);
    assert!(roles.is_empty());
}

#[test]
fn test_no_policies_no_roles() {
    let resolver = DerivedRolesResolver::default();
    let principal = Principal::new("alice").with_role("user");
    let roles = resolver.resolve(&principal, &Resource::new("doc", "1"), None, Vec::<&DerivedRolesPolicy>::new());
    assert!(roles.is_empty());
}
