//! Events published by the hot reload manager

use crate::policy::PolicyChangeEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadEventType {
    PolicyChanged,
    ReloadStarted,
    ReloadCompleted,
    ReloadFailed,
}

impl fmt::Display for ReloadEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReloadEventType::PolicyChanged => "policy_changed",
            ReloadEventType::ReloadStarted => "reload_started",
            ReloadEventType::ReloadCompleted => "reload_completed",
            ReloadEventType::ReloadFailed => "reload_failed",
        })
    }
}

/// Reload lifecycle notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadEvent {
    #[serde(rename = "type")]
    pub event_type: ReloadEventType,

    pub timestamp: DateTime<Utc>,

    /// Failure reason, set on `reload_failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Policies published, set on `reload_completed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies_loaded: Option<usize>,

    /// Reload duration, set on `reload_completed` and `reload_failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Store notification, set on `policy_changed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<PolicyChangeEvent>,
}

impl ReloadEvent {
    fn new(event_type: ReloadEventType) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            error: None,
            policies_loaded: None,
            duration_ms: None,
            change: None,
        }
    }

    pub fn policy_changed(change: PolicyChangeEvent) -> Self {
        Self {
            change: Some(change),
            ..Self::new(ReloadEventType::PolicyChanged)
        }
    }

    pub fn started() -> Self {
        Self::new(ReloadEventType::ReloadStarted)
    }

    pub fn completed(policies_loaded: usize, duration_ms: u64) -> Self {
        Self {
            policies_loaded: Some(policies_loaded),
            duration_ms: Some(duration_ms),
            ..Self::new(ReloadEventType::ReloadCompleted)
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            error: Some(error.into()),
            duration_ms: Some(duration_ms),
            ..Self::new(ReloadEventType::ReloadFailed)
        }
    }
}
