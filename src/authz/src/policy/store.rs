//! Policy store interface and in-memory implementation

use super::stored::{PolicyKind, PolicyPayload, StoredPolicy};
use crate::error::{AuthzError, Result};
use crate::observer::{ObserverRegistry, Subscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Filter and page selection for [`PolicyStore::query`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PolicyKind>,

    #[serde(default)]
    pub include_disabled: bool,

    #[serde(default)]
    pub offset: usize,

    /// Page size; `None` returns everything after `offset`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl PolicyQuery {
    /// Enabled policies of one kind
    pub fn of_kind(kind: PolicyKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn including_disabled(mut self) -> Self {
        self.include_disabled = true;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPage {
    pub policies: Vec<StoredPolicy>,

    /// Matching policies across all pages
    pub total: usize,

    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
    Enabled,
    Disabled,
}

/// Notification emitted by a store after a mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyChangeEvent {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub policy_id: String,
    pub policy_name: String,
    pub policy_kind: PolicyKind,
    pub timestamp: DateTime<Utc>,
}

impl PolicyChangeEvent {
    pub fn new(change_type: ChangeType, policy: &StoredPolicy) -> Self {
        Self {
            change_type,
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            policy_kind: policy.kind,
            timestamp: Utc::now(),
        }
    }
}

/// Callback registered through [`PolicyStore::watch`]
pub type ChangeHandler = Box<dyn Fn(&PolicyChangeEvent) + Send + Sync>;

/// External policy store consumed by the reload manager
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Fetch one page of policies matching the query
    async fn query(&self, query: &PolicyQuery) -> Result<PolicyPage>;

    /// Subscribe to change notifications
    fn watch(&self, handler: ChangeHandler) -> Subscription;
}

/// In-memory policy store
///
/// Mutations notify watchers synchronously, in mutation order.
pub struct InMemoryPolicyStore {
    policies: Arc<RwLock<BTreeMap<String, StoredPolicy>>>,
    watchers: ObserverRegistry<PolicyChangeEvent>,
    query_failure: parking_lot::Mutex<Option<String>>,
    queries: AtomicU64,
}

impl InMemoryPolicyStore {
    /// Create a new in-memory policy store
    pub fn new() -> Self {
        Self {
            policies: Arc::new(RwLock::new(BTreeMap::new())),
            watchers: ObserverRegistry::new(),
            query_failure: parking_lot::Mutex::new(None),
            queries: AtomicU64::new(0),
        }
    }

    /// Create or update a policy document
    ///
    /// Updates keep `created_at`, bump `version`, and refresh the hash.
    pub async fn put(&self, id: impl Into<String>, payload: impl Into<PolicyPayload>) -> Result<StoredPolicy> {
        self.insert(StoredPolicy::new(id, payload)).await
    }

    /// Store an envelope as given, apart from version and timestamps
    ///
    /// The envelope is not checked against its payload, so stores can hold
    /// records the reload path must reject.
    pub async fn insert(&self, mut policy: StoredPolicy) -> Result<StoredPolicy> {
        if policy.id.trim().is_empty() {
            return Err(AuthzError::InvalidPolicy("policy id must not be empty".to_string()));
        }

        let mut policies = self.policies.write().await;
        let change_type = match policies.get(&policy.id) {
            Some(existing) => {
                policy.version = existing.version + 1;
                policy.created_at = existing.created_at;
                policy.updated_at = Utc::now();
                ChangeType::Updated
            }
            None => ChangeType::Created,
        };

        debug!(policy_id = %policy.id, version = policy.version, ?change_type, "Stored policy");
        policies.insert(policy.id.clone(), policy.clone());
        self.watchers.emit(&PolicyChangeEvent::new(change_type, &policy));

        Ok(policy)
    }

    /// Delete a policy; returns `false` if it did not exist
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut policies = self.policies.write().await;
        match policies.remove(id) {
            Some(removed) => {
                self.watchers.emit(&PolicyChangeEvent::new(ChangeType::Deleted, &removed));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Enable or disable a policy; returns `false` if nothing changed
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let mut policies = self.policies.write().await;
        let policy = policies
            .get_mut(id)
            .ok_or_else(|| AuthzError::Store(format!("policy not found: {}", id)))?;

        if policy.enabled == enabled {
            return Ok(false);
        }

        policy.enabled = enabled;
        policy.updated_at = Utc::now();
        let change_type = if enabled {
            ChangeType::Enabled
        } else {
            ChangeType::Disabled
        };
        self.watchers.emit(&PolicyChangeEvent::new(change_type, policy));

        Ok(true)
    }

    pub async fn get(&self, id: &str) -> Option<StoredPolicy> {
        self.policies.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.policies.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.policies.read().await.is_empty()
    }

    /// Make every subsequent query fail until cleared with `None`
    pub fn set_query_failure(&self, message: Option<String>) {
        *self.query_failure.lock() = message;
    }

    /// Number of `query` calls served or failed
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Number of active watchers
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn query(&self, query: &PolicyQuery) -> Result<PolicyPage> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let failure = self.query_failure.lock().clone();
        if let Some(message) = failure {
            return Err(AuthzError::Store(message));
        }

        let policies = self.policies.read().await;
        let matching: Vec<&StoredPolicy> = policies
            .values()
            .filter(|p| query.kind.map_or(true, |kind| p.kind == kind))
            .filter(|p| query.include_disabled || p.enabled)
            .collect();

        let total = matching.len();
        let page: Vec<StoredPolicy> = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        let has_more = query.offset.saturating_add(page.len()) < total;

        Ok(PolicyPage {
            policies: page,
            total,
            has_more,
        })
    }

    fn watch(&self, handler: ChangeHandler) -> Subscription {
        self.watchers.subscribe(handler)
    }
}
