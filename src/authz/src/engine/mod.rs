//! Decision engine
//!
//! Owns the active policy index and answers `check` requests by composing
//! derived role resolution with rule matching.
//!
//! # Architecture
//!
//! ```text
//! CheckRequest → validate → index (Arc snapshot) → DerivedRolesResolver
//!                                                        ↓
//!                   CheckResponse ← per action ← RuleMatcher → CEL
//! ```
//!
//! `check` clones the current `Arc<PolicyIndex>` once and works on that
//! snapshot for the whole request. Writers build a complete replacement
//! index and publish it with one pointer swap, so a concurrent `check`
//! sees either the old or the new policy set, never an empty one in between.

pub mod index;
pub mod matcher;
pub mod metrics;

pub use index::{EngineStats, PolicyIndex, PolicySet};
pub use matcher::RuleMatcher;
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::cel::{Engine as CelEngine, EvalContext};
use crate::derived_roles::DerivedRolesResolver;
use crate::error::Result;
use crate::policy::{DerivedRolesPolicy, ResourcePolicy};
use crate::types::{
    ActionMeta, ActionResult, CheckRequest, CheckResponse, ResponseMeta, DEFAULT_DENY_POLICY,
};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Decision engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Log every per-action decision at debug level
    pub log_decisions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            log_decisions: false,
        }
    }
}

/// Authorization decision engine
pub struct DecisionEngine {
    /// Active index; replaced wholesale, never mutated in place
    index: RwLock<Arc<PolicyIndex>>,

    /// Serializes writers so read-modify-publish sequences do not interleave
    writer: Mutex<()>,

    /// CEL expression evaluator with program caching
    cel: CelEngine,

    resolver: DerivedRolesResolver,

    metrics: Option<MetricsCollector>,

    config: EngineConfig,
}

impl DecisionEngine {
    /// Create an engine with an empty policy index
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let cel = CelEngine::new();
        let metrics = config.enable_metrics.then(MetricsCollector::new);

        info!(metrics = config.enable_metrics, "DecisionEngine initialized");

        Self {
            index: RwLock::new(Arc::new(PolicyIndex::default())),
            writer: Mutex::new(()),
            resolver: DerivedRolesResolver::new(cel.clone()),
            cel,
            metrics,
            config,
        }
    }

    /// Evaluate every distinct action of a request
    ///
    /// Never blocks on I/O. Malformed requests are rejected with
    /// [`AuthzError::InvalidRequest`](crate::AuthzError::InvalidRequest)
    /// before any policy is consulted.
    pub fn check(&self, request: &CheckRequest) -> Result<CheckResponse> {
        let start = Instant::now();

        if let Err(e) = request.validate() {
            if let Some(metrics) = &self.metrics {
                metrics.record_invalid_request();
            }
            return Err(e);
        }

        let index = self.policy_index();
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let actions = request.unique_actions();

        let mut results = BTreeMap::new();
        let mut policies_evaluated = Vec::new();

        match index.resource_policy(&request.resource.kind) {
            None => {
                debug!(
                    request_id = %request_id,
                    resource = %request.resource.kind,
                    "No resource policy registered, default deny"
                );
                for action in actions {
                    results.insert(action.to_string(), ActionResult::default_deny(Vec::new()));
                }
            }
            Some(policy) => {
                policies_evaluated.push(policy.name().to_string());

                let ctx = EvalContext::for_request(
                    &request.principal,
                    &request.resource,
                    request.aux_data.as_ref(),
                );
                let derived = self.resolver.resolve_in_context(
                    &request.principal.roles,
                    &ctx,
                    index.derived_roles_policies(),
                );
                let effective: BTreeSet<String> =
                    request.principal.roles.union(&derived).cloned().collect();
                let derived_list: Vec<String> = derived.iter().cloned().collect();

                let matcher = RuleMatcher::new(&self.cel);
                for action in actions {
                    let result = match matcher.decide(policy, action, &effective, &derived, &ctx) {
                        Some(rule) => ActionResult {
                            effect: rule.effect,
                            policy: policy.name().to_string(),
                            meta: ActionMeta {
                                matched_rule: rule.name.clone(),
                                effective_derived_roles: derived_list.clone(),
                            },
                        },
                        None => ActionResult::default_deny(derived_list.clone()),
                    };

                    if self.config.log_decisions {
                        debug!(
                            request_id = %request_id,
                            principal = %request.principal.id,
                            resource = %request.resource.kind,
                            action = %action,
                            effect = %result.effect,
                            policy = %result.policy,
                            rule = ?result.meta.matched_rule,
                            "Action decided"
                        );
                    }

                    results.insert(action.to_string(), result);
                }
            }
        }

        let elapsed = start.elapsed();
        if let Some(metrics) = &self.metrics {
            for result in results.values() {
                metrics.record_action(
                    result.effect.is_allow(),
                    result.meta.matched_rule.is_none()
                        && result.policy == DEFAULT_DENY_POLICY,
                );
            }
            metrics.record_check(elapsed);
        }

        Ok(CheckResponse {
            request_id,
            results,
            meta: ResponseMeta {
                evaluation_duration_us: elapsed.as_micros() as u64,
                policies_evaluated,
            },
        })
    }

    /// Remove every policy
    pub fn clear_policies(&self) {
        let _writer = self.writer.lock();
        self.publish(PolicySet::default(), "clear");
    }

    /// Add resource policies to the active set
    ///
    /// A policy for an already indexed resource kind replaces it.
    pub fn load_resource_policies(&self, policies: Vec<ResourcePolicy>) {
        let _writer = self.writer.lock();
        let mut set = self.policy_index().to_policy_set();
        set.resource_policies.extend(policies);
        self.publish(set, "load_resource_policies");
    }

    /// Add derived roles policies to the active set
    pub fn load_derived_roles_policies(&self, policies: Vec<DerivedRolesPolicy>) {
        let _writer = self.writer.lock();
        let mut set = self.policy_index().to_policy_set();
        set.derived_roles_policies.extend(policies);
        self.publish(set, "load_derived_roles_policies");
    }

    /// Replace the whole policy set in one swap
    pub fn replace_policies(&self, set: PolicySet) {
        let _writer = self.writer.lock();
        self.publish(set, "replace_policies");
    }

    /// Copy of the active policies
    pub fn snapshot(&self) -> PolicySet {
        self.policy_index().to_policy_set()
    }

    pub fn get_stats(&self) -> EngineStats {
        self.policy_index().stats()
    }

    /// Current index snapshot
    pub fn policy_index(&self) -> Arc<PolicyIndex> {
        self.index.read().clone()
    }

    /// Get engine metrics, if enabled
    pub fn metrics(&self) -> Option<EngineMetrics> {
        self.metrics.as_ref().map(MetricsCollector::snapshot)
    }

    /// Expression engine shared by rule and derived role conditions
    pub fn cel(&self) -> &CelEngine {
        &self.cel
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build and swap in a new index; caller holds the writer lock
    fn publish(&self, set: PolicySet, operation: &str) {
        let generation = self.index.read().generation() + 1;
        let next = Arc::new(PolicyIndex::build(set, generation));
        let stats = next.stats();

        *self.index.write() = next;
        self.cel.clear_cache();

        info!(
            operation,
            generation,
            resource_policies = stats.resource_policies,
            derived_roles_policies = stats.derived_roles_policies,
            "Policy index published"
        );
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("stats", &self.get_stats())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DerivedRoleDefinition, PolicyRule};
    use crate::types::{Effect, Principal, Resource};

    fn document_policy() -> ResourcePolicy {
        ResourcePolicy::new("document")
            .with_name("document-policy")
            .with_rule(PolicyRule::allow(["read"]).with_roles(["user"]).named("user-read"))
            .with_rule(
                PolicyRule::allow(["edit"])
                    .with_derived_roles(["owner"])
                    .named("owner-edit"),
            )
    }

    fn owner_roles() -> DerivedRolesPolicy {
        DerivedRolesPolicy::new("common-roles").with_definition(
            DerivedRoleDefinition::new("owner", ["user"])
                .with_condition("resource.attributes.ownerId == principal.id"),
        )
    }

    fn request(actions: &[&str]) -> CheckRequest {
        CheckRequest::new(
            Principal::new("alice").with_role("user"),
            Resource::new("document", "d1").with_attribute("ownerId", "alice"),
            actions.to_vec(),
        )
    }

    #[test]
    fn test_engine_creation() {
        let engine = DecisionEngine::new();
        assert_eq!(engine.get_stats(), EngineStats::default());
        assert!(engine.metrics().is_some());

        let quiet = DecisionEngine::with_config(EngineConfig {
            enable_metrics: false,
            ..EngineConfig::default()
        });
        assert!(quiet.metrics().is_none());
    }

    #[test]
    fn test_check_with_policies() {
        let engine = DecisionEngine::new();
        engine.load_resource_policies(vec![document_policy()]);
        engine.load_derived_roles_policies(vec![owner_roles()]);

        let response = engine
            .check(&request(&["read", "edit", "delete", "read"]).with_request_id("req-1"))
            .unwrap();

        assert_eq!(response.request_id, "req-1");
        assert_eq!(response.results.len(), 3);
        assert!(response.is_allowed("read"));
        assert!(response.is_allowed("edit"));
        assert!(!response.is_allowed("delete"));

        let edit = &response.results["edit"];
        assert_eq!(edit.policy, "document-policy");
        assert_eq!(edit.meta.matched_rule.as_deref(), Some("owner-edit"));
        assert_eq!(edit.meta.effective_derived_roles, vec!["owner".to_string()]);

        let delete = &response.results["delete"];
        assert_eq!(delete.policy, DEFAULT_DENY_POLICY);
        assert_eq!(delete.effect, Effect::Deny);
        assert_eq!(response.meta.policies_evaluated, vec!["document-policy".to_string()]);
    }

    #[test]
    fn test_default_deny_without_policy() {
        let engine = DecisionEngine::new();
        let response = engine.check(&request(&["read"])).unwrap();

        assert!(!response.request_id.is_empty());
        assert_eq!(response.results["read"], ActionResult::default_deny(Vec::new()));
        assert!(response.meta.policies_evaluated.is_empty());
    }

    #[test]
    fn test_invalid_request_rejected() {
        let engine = DecisionEngine::new();
        let err = engine.check(&request(&[])).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(engine.metrics().unwrap().invalid_requests, 1);
    }

    #[test]
    fn test_writes_bump_generation() {
        let engine = DecisionEngine::new();
        engine.load_resource_policies(vec![document_policy()]);
        engine.load_derived_roles_policies(vec![owner_roles()]);
        assert_eq!(engine.get_stats().generation, 2);

        let snapshot = engine.snapshot();
        engine.clear_policies();
        assert_eq!(engine.get_stats().resource_policies, 0);
        assert_eq!(engine.get_stats().generation, 3);

        engine.replace_policies(snapshot);
        let stats = engine.get_stats();
        assert_eq!(stats.resource_policies, 1);
        assert_eq!(stats.derived_roles_policies, 1);
        assert_eq!(stats.resources, vec!["document".to_string()]);
        assert_eq!(stats.generation, 4);
    }

    #[test]
    fn test_held_snapshot_survives_swap() {
        let engine = DecisionEngine::new();
        engine.load_resource_policies(vec![document_policy()]);

        let held = engine.policy_index();
        engine.clear_policies();

        assert!(held.resource_policy("document").is_some());
        assert!(engine.policy_index().resource_policy("document").is_none());
    }

    #[test]
    fn test_metrics_record_actions() {
        let engine = DecisionEngine::new();
        engine.load_resource_policies(vec![document_policy()]);

        engine.check(&request(&["read", "delete"])).unwrap();
        let metrics = engine.metrics().unwrap();
        assert_eq!(metrics.total_checks, 1);
        assert_eq!(metrics.allowed_actions, 1);
        assert_eq!(metrics.denied_actions, 1);
        assert_eq!(metrics.default_denials, 1);
    }
}
