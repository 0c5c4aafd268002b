//! Derived roles module
//!
//! Derived roles are computed per request from a principal's static roles
//! and a condition over the request context.
//!
//! # Features
//!
//! - **Pattern Matching**: parent roles accept wildcards (`*`, `prefix:*`, `*:suffix`)
//! - **ANY Logic**: one matching parent role makes a definition a candidate
//! - **Fail-closed conditions**: a broken condition never grants a role
//!
//! # Example
//!
//! ```rust
//! use authz_policy_engine::derived_roles::DerivedRolesResolver;
//! use authz_policy_engine::policy::{DerivedRoleDefinition, DerivedRolesPolicy};
//! use authz_policy_engine::types::{Principal, Resource};
//!
//! let policy = DerivedRolesPolicy::new("common").with_definition(
//!     DerivedRoleDefinition::new("owner", ["user"])
//!         .with_condition("resource.attributes.ownerId == principal.id"),
//! );
//!
//! let resolver = DerivedRolesResolver::default();
//! let alice = Principal::new("alice").with_role("user");
//! let doc = Resource::new("document", "d1").with_attribute("ownerId", "alice");
//!
//! let roles = resolver.resolve(&alice, &doc, None, [&policy]);
//! assert!(roles.contains("owner"));
//! ```

pub mod pattern;
pub mod resolver;

#[cfg(test)]
mod tests;

pub use pattern::{any_role_matches, matches_pattern};
pub use resolver::DerivedRolesResolver;
