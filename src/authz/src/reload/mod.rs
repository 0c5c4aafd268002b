//! Hot policy reload
//!
//! [`HotReloadManager`] watches a [`PolicyStore`] and keeps a
//! [`DecisionEngine`] in sync with it:
//!
//! ```text
//! store.watch ──▶ pending count ──▶ debounce task ──▶ execute_reload
//!                                   (debounce / max)    fetch → validate → swap
//!                                                              │ failure
//!                                                              ▼
//!                                                   rollback to last good set
//! ```
//!
//! Reloads never patch the engine. Each successful reload publishes the
//! complete fetched set with one `replace_policies` swap, so `check` callers
//! keep reading the previous index until the new one is in place.

pub mod config;
pub mod events;
pub mod state;

pub use config::{HotReloadConfig, LogLevel};
pub use events::{ReloadEvent, ReloadEventType};
pub use state::{transition, InvalidTransition, ReloadInput, ReloadPhase, ReloadState};

use crate::engine::{DecisionEngine, EngineStats, PolicySet};
use crate::error::{AuthzError, Result};
use crate::observer::{ObserverRegistry, Subscription};
use crate::policy::{
    validate_candidate, PolicyChangeEvent, PolicyKind, PolicyQuery, PolicyStore, StoredPolicy,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Records requested per store query while fetching a candidate set
const FETCH_PAGE_SIZE: usize = 100;

/// Emit a tracing event only when the configured level lets it through
macro_rules! reload_log {
    ($config:expr, $level:ident, $macro:ident, $($arg:tt)+) => {
        if $config.log_level.allows(LogLevel::$level) {
            tracing::$macro!($($arg)+);
        }
    };
}

/// What caused a reload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadTrigger {
    /// Quiet period after the last change elapsed
    Debounce,
    /// Burst lasted longer than the max debounce window
    MaxDebounce,
    /// Explicit [`HotReloadManager::reload`] call
    Manual,
}

impl fmt::Display for ReloadTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReloadTrigger::Debounce => "debounce",
            ReloadTrigger::MaxDebounce => "max_debounce",
            ReloadTrigger::Manual => "manual",
        })
    }
}

/// Result of one reload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Completed { policies_loaded: usize },
    Failed { error: String, rolled_back: bool },
    /// Another reload was in flight
    Skipped,
}

impl ReloadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ReloadOutcome::Completed { .. })
    }
}

/// Manager statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadStats {
    pub enabled: bool,
    pub last_reload: Option<DateTime<Utc>>,
    pub reload_count: u64,
    pub pending_changes: usize,
    pub is_reloading: bool,
    pub phase: ReloadPhase,
}

/// State shared between the manager handle, the watch callback and the
/// debounce task
struct Shared {
    engine: Arc<DecisionEngine>,
    store: Arc<dyn PolicyStore>,
    config: HotReloadConfig,
    state: Mutex<ReloadState>,
    events: ObserverRegistry<ReloadEvent>,
    /// Last set this manager published successfully; only read for rollback
    last_good: Mutex<Option<PolicySet>>,
    reload_count: AtomicU64,
    last_reload: Mutex<Option<DateTime<Utc>>>,
    baseline: Mutex<Option<EngineStats>>,
}

/// Handles owned while the manager is started
struct Running {
    subscription: Subscription,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Keeps a decision engine in sync with a policy store
pub struct HotReloadManager {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl HotReloadManager {
    /// Create a stopped manager
    ///
    /// Fails when the configured timers are unusable.
    pub fn new(
        engine: Arc<DecisionEngine>,
        store: Arc<dyn PolicyStore>,
        config: HotReloadConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| AuthzError::Config(e.to_string()))?;

        Ok(Self {
            shared: Arc::new(Shared {
                engine,
                store,
                config,
                state: Mutex::new(ReloadState::new()),
                events: ObserverRegistry::new(),
                last_good: Mutex::new(None),
                reload_count: AtomicU64::new(0),
                last_reload: Mutex::new(None),
                baseline: Mutex::new(None),
            }),
            running: Mutex::new(None),
        })
    }

    /// Subscribe to the store and spawn the debounce task
    ///
    /// Does nothing when reload is disabled or the manager is already
    /// started. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let shared = &self.shared;
        if !shared.config.enabled {
            reload_log!(shared.config, Info, info, "Hot reload disabled, not watching policy store");
            return Ok(());
        }

        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AuthzError::Internal(format!("hot reload needs a tokio runtime: {}", e)))?;

        let baseline = shared.engine.get_stats();
        *shared.baseline.lock() = Some(baseline.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let weak: Weak<Shared> = Arc::downgrade(shared);
        let subscription = shared.store.watch(Box::new(move |change: &PolicyChangeEvent| {
            if let Some(shared) = weak.upgrade() {
                shared.on_change(change);
                // the receiver is gone once stop() has run
                let _ = tx.send(());
            }
        }));

        let cancel = CancellationToken::new();
        let task = runtime.spawn(run_debouncer(Arc::clone(shared), rx, cancel.clone()));

        *running = Some(Running {
            subscription,
            cancel,
            task,
        });

        reload_log!(
            shared.config,
            Info,
            info,
            debounce_ms = shared.config.debounce_ms,
            max_debounce_ms = shared.config.max_debounce_ms,
            baseline_resource_policies = baseline.resource_policies,
            baseline_derived_roles_policies = baseline.derived_roles_policies,
            "Hot reload started"
        );

        Ok(())
    }

    /// Unsubscribe, cancel pending timers and discard pending changes
    ///
    /// A reload already in flight runs to completion before this returns.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };

        running.subscription.unsubscribe();
        running.cancel.cancel();
        self.shared.state.lock().stop();

        if let Err(e) = running.task.await {
            tracing::warn!(error = %e, "Debounce task ended abnormally");
        }

        reload_log!(self.shared.config, Info, info, "Hot reload stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Reload now, bypassing the debounce window
    pub async fn reload(&self) -> ReloadOutcome {
        self.shared.execute_reload(ReloadTrigger::Manual).await
    }

    /// Fetch, validate and publish the store's enabled policies
    ///
    /// Skipped, not queued, when another reload is in flight.
    pub async fn execute_reload(&self, trigger: ReloadTrigger) -> ReloadOutcome {
        self.shared.execute_reload(trigger).await
    }

    /// Register a listener for reload lifecycle events
    pub fn on_reload_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ReloadEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(handler)
    }

    pub fn get_stats(&self) -> ReloadStats {
        let state = self.shared.state.lock();
        ReloadStats {
            enabled: self.shared.config.enabled,
            last_reload: *self.shared.last_reload.lock(),
            reload_count: self.shared.reload_count.load(Ordering::SeqCst),
            pending_changes: state.pending_changes(),
            is_reloading: state.phase().is_busy(),
            phase: state.phase(),
        }
    }

    /// Engine stats captured by `start`
    pub fn baseline_stats(&self) -> Option<EngineStats> {
        self.shared.baseline.lock().clone()
    }

    pub fn config(&self) -> &HotReloadConfig {
        &self.shared.config
    }
}

impl Drop for HotReloadManager {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.subscription.unsubscribe();
            running.cancel.cancel();
        }
    }
}

impl fmt::Debug for HotReloadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotReloadManager")
            .field("config", &self.shared.config)
            .field("stats", &self.get_stats())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Shared {
    fn on_change(&self, change: &PolicyChangeEvent) {
        if let Err(e) = self.state.lock().record_change() {
            tracing::error!(error = %e, "Change notification rejected by reload state");
            return;
        }

        reload_log!(
            self.config,
            Debug,
            debug,
            policy_id = %change.policy_id,
            policy_kind = %change.policy_kind,
            change_type = ?change.change_type,
            "Policy change received"
        );

        self.events.emit(&ReloadEvent::policy_changed(change.clone()));
    }

    async fn execute_reload(&self, trigger: ReloadTrigger) -> ReloadOutcome {
        let absorbed = match self.state.lock().begin() {
            Ok(changes) => changes,
            Err(_) => {
                reload_log!(self.config, Debug, debug, %trigger, "Reload already in flight, skipping");
                return ReloadOutcome::Skipped;
            }
        };

        reload_log!(self.config, Info, info, %trigger, pending_changes = absorbed, "Policy reload started");
        self.events.emit(&ReloadEvent::started());
        let start = Instant::now();

        match self.load_candidate().await {
            Ok(set) => {
                let policies_loaded = set.len();
                self.engine.replace_policies(set.clone());
                *self.last_good.lock() = Some(set);
                self.reload_count.fetch_add(1, Ordering::SeqCst);
                *self.last_reload.lock() = Some(Utc::now());
                if let Err(e) = self.state.lock().succeed() {
                    tracing::error!(error = %e, "Reload state out of sync");
                }

                let duration_ms = start.elapsed().as_millis() as u64;
                reload_log!(
                    self.config,
                    Info,
                    info,
                    %trigger,
                    policies_loaded,
                    duration_ms,
                    generation = self.engine.get_stats().generation,
                    "Policy reload completed"
                );
                self.events.emit(&ReloadEvent::completed(policies_loaded, duration_ms));

                ReloadOutcome::Completed { policies_loaded }
            }
            Err(e) => {
                let error = e.to_string();
                let duration_ms = start.elapsed().as_millis() as u64;
                reload_log!(self.config, Error, error, %trigger, error = %error, "Policy reload failed");
                self.events.emit(&ReloadEvent::failed(error.clone(), duration_ms));

                let rolled_back = self.roll_back();
                ReloadOutcome::Failed { error, rolled_back }
            }
        }
    }

    /// Re-publish the last good set when configured and available
    fn roll_back(&self) -> bool {
        let snapshot = if self.config.rollback_on_failure {
            self.last_good.lock().clone()
        } else {
            None
        };

        let Some(snapshot) = snapshot else {
            if let Err(e) = self.state.lock().fail(false) {
                tracing::error!(error = %e, "Reload state out of sync");
            }
            reload_log!(self.config, Warn, warn, "Keeping current policies after failed reload");
            return false;
        };

        if let Err(e) = self.state.lock().fail(true) {
            tracing::error!(error = %e, "Reload state out of sync");
        }

        let restored = snapshot.len();
        self.engine.replace_policies(snapshot);

        if let Err(e) = self.state.lock().finish_rollback() {
            tracing::error!(error = %e, "Reload state out of sync");
        }

        reload_log!(
            self.config,
            Warn,
            warn,
            policies_restored = restored,
            "Rolled back to last known good policies"
        );
        true
    }

    /// Fetch every enabled policy of both kinds and build the candidate set
    async fn load_candidate(&self) -> Result<PolicySet> {
        let resources = self.fetch_all(PolicyKind::ResourcePolicy).await?;
        let derived = self.fetch_all(PolicyKind::DerivedRolesPolicy).await?;

        if self.config.validate_before_load {
            let mut report = validate_candidate(PolicyKind::ResourcePolicy, &resources);
            report.merge(validate_candidate(PolicyKind::DerivedRolesPolicy, &derived));
            report.into_result()?;
        }

        let mut set = PolicySet::default();
        for record in &resources {
            match record.as_resource_policy() {
                Some(policy) => set.resource_policies.push(policy.clone()),
                None => skip_mismatched(record),
            }
        }
        for record in &derived {
            match record.as_derived_roles_policy() {
                Some(policy) => set.derived_roles_policies.push(policy.clone()),
                None => skip_mismatched(record),
            }
        }

        Ok(set)
    }

    async fn fetch_all(&self, kind: PolicyKind) -> Result<Vec<StoredPolicy>> {
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let query = PolicyQuery::of_kind(kind).page(offset, FETCH_PAGE_SIZE);
            let page = self.store.query(&query).await?;
            let fetched = page.policies.len();
            records.extend(page.policies);

            if !page.has_more || fetched == 0 {
                break;
            }
            offset += fetched;
        }

        Ok(records)
    }
}

fn skip_mismatched(record: &StoredPolicy) {
    tracing::warn!(
        policy_id = %record.id,
        kind = %record.kind,
        payload_kind = %record.payload.kind(),
        "Skipping policy whose payload does not match its kind"
    );
}

/// Owns the debounce and max-debounce deadlines for one started manager
async fn run_debouncer(
    shared: Arc<Shared>,
    mut changes: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
) {
    let debounce = shared.config.debounce();
    let max_debounce = shared.config.max_debounce();

    let mut debounce_at: Option<Instant> = None;
    let mut max_at: Option<Instant> = None;

    loop {
        let deadline = match (debounce_at, max_at) {
            (Some(d), Some(m)) => Some(d.min(m)),
            (d, m) => d.or(m),
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            received = changes.recv() => match received {
                Some(()) => {
                    let now = Instant::now();
                    debounce_at = Some(now + debounce);
                    max_at.get_or_insert(now + max_debounce);
                }
                None => break,
            },

            _ = wait_for(deadline) => {
                let trigger = match (debounce_at, max_at) {
                    (Some(d), Some(m)) if m < d => ReloadTrigger::MaxDebounce,
                    _ => ReloadTrigger::Debounce,
                };
                debounce_at = None;
                max_at = None;

                if shared.execute_reload(trigger).await == ReloadOutcome::Skipped {
                    debounce_at = Some(Instant::now() + debounce);
                }
            }
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
