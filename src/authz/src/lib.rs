//! # Authorization Policy Engine
//!
//! Policy decision point with derived roles, CEL conditions and hot policy
//! reload.
//!
//! ## Features
//!
//! - **Resource policies** with ordered allow/deny rules
//! - **Derived roles** granted at request time from parent roles and conditions
//! - **CEL conditions** (via `cel-interpreter`) for rules and derived roles, with a compiled program cache
//! - **Fail-closed evaluation**: no policy, no matching rule, or a failing
//!   condition all end in deny
//! - **Atomic policy publication**: `check` never sees a half-loaded policy set
//! - **Hot reload** from a [`PolicyStore`] with debouncing, validation and rollback
//!
//! ## Example
//!
//! ```rust
//! use authz_policy_engine::{
//!     CheckRequest, DecisionEngine, PolicyRule, Principal, Resource, ResourcePolicy,
//! };
//!
//! let engine = DecisionEngine::new();
//! engine.load_resource_policies(vec![ResourcePolicy::new("document")
//!     .with_name("document-policy")
//!     .with_rule(PolicyRule::allow(["read"]).with_roles(["viewer"]))]);
//!
//! let request = CheckRequest::new(
//!     Principal::new("alice").with_role("viewer"),
//!     Resource::new("document", "doc-1"),
//!     ["read", "delete"],
//! );
//!
//! let response = engine.check(&request).unwrap();
//! assert!(response.is_allowed("read"));
//! assert!(!response.is_allowed("delete"));
//! ```

pub mod cel;
pub mod derived_roles;
pub mod engine;
pub mod error;
pub mod observer;
pub mod policy;
pub mod reload;
pub mod types;

// Re-export commonly used types
pub use types::{
    ActionMeta, ActionResult, Attributes, CheckRequest, CheckResponse, Effect, Principal,
    Resource, ResponseMeta, DEFAULT_DENY_POLICY,
};
pub use engine::{DecisionEngine, EngineConfig, EngineMetrics, EngineStats, PolicySet};
pub use policy::{
    DerivedRoleDefinition, DerivedRolesPolicy, InMemoryPolicyStore, PolicyChangeEvent,
    PolicyKind, PolicyQuery, PolicyRule, PolicyStore, ResourcePolicy, StoredPolicy,
};
pub use derived_roles::DerivedRolesResolver;
pub use observer::{ObserverRegistry, Subscription};
pub use reload::{
    HotReloadConfig, HotReloadManager, ReloadEvent, ReloadEventType, ReloadOutcome, ReloadStats,
};
pub use error::{AuthzError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
