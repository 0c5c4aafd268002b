//! Reload state machine
//!
//! ```text
//! Idle ──change──▶ Debouncing ──begin──▶ Reloading ──completed──▶ Idle | Debouncing
//!                                            │
//!                                            └─failed─▶ RollingBack ──done──▶ Idle | Debouncing
//! ```
//!
//! Changes that arrive while a reload runs are counted; the machine settles
//! in `Debouncing` instead of `Idle` when the count is non-zero. Only the
//! count is kept, so a slow fetch under heavy churn holds no event payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPhase {
    Idle,
    Debouncing,
    Reloading,
    RollingBack,
}

impl ReloadPhase {
    /// A reload or rollback is running
    pub fn is_busy(self) -> bool {
        matches!(self, ReloadPhase::Reloading | ReloadPhase::RollingBack)
    }

    fn settle(pending: bool) -> Self {
        if pending {
            ReloadPhase::Debouncing
        } else {
            ReloadPhase::Idle
        }
    }
}

impl Default for ReloadPhase {
    fn default() -> Self {
        ReloadPhase::Idle
    }
}

impl fmt::Display for ReloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReloadPhase::Idle => "idle",
            ReloadPhase::Debouncing => "debouncing",
            ReloadPhase::Reloading => "reloading",
            ReloadPhase::RollingBack => "rolling_back",
        })
    }
}

/// Inputs that drive [`transition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadInput {
    ChangeReceived,
    BeginReload,
    ReloadSucceeded { pending: bool },
    ReloadFailed { rollback: bool, pending: bool },
    RollbackFinished { pending: bool },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid reload transition: {input:?} in phase {phase}")]
pub struct InvalidTransition {
    pub phase: ReloadPhase,
    pub input: ReloadInput,
}

/// Next phase for an input, or an error when the input is not allowed
pub fn transition(phase: ReloadPhase, input: ReloadInput) -> Result<ReloadPhase, InvalidTransition> {
    use ReloadInput::*;
    use ReloadPhase::*;

    let next = match (phase, input) {
        (Idle | Debouncing, ChangeReceived) => Debouncing,
        (Reloading | RollingBack, ChangeReceived) => phase,

        (Idle | Debouncing, BeginReload) => Reloading,

        (Reloading, ReloadSucceeded { pending }) => ReloadPhase::settle(pending),
        (Reloading, ReloadFailed { rollback: true, .. }) => RollingBack,
        (Reloading, ReloadFailed { rollback: false, pending }) => ReloadPhase::settle(pending),
        (RollingBack, RollbackFinished { pending }) => ReloadPhase::settle(pending),

        (Idle | Debouncing, Stop) => Idle,
        (Reloading | RollingBack, Stop) => phase,

        _ => return Err(InvalidTransition { phase, input }),
    };

    Ok(next)
}

/// Current phase plus the number of changes received since the last reload began
#[derive(Debug, Clone, Default)]
pub struct ReloadState {
    phase: ReloadPhase,
    pending: usize,
}

impl ReloadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ReloadPhase {
        self.phase
    }

    pub fn pending_changes(&self) -> usize {
        self.pending
    }

    pub fn record_change(&mut self) -> Result<ReloadPhase, InvalidTransition> {
        self.apply(ReloadInput::ChangeReceived)?;
        self.pending = self.pending.saturating_add(1);
        Ok(self.phase)
    }

    /// Enter `Reloading`, returning how many pending changes it absorbs
    pub fn begin(&mut self) -> Result<usize, InvalidTransition> {
        self.apply(ReloadInput::BeginReload)?;
        Ok(std::mem::take(&mut self.pending))
    }

    pub fn succeed(&mut self) -> Result<ReloadPhase, InvalidTransition> {
        let pending = self.pending > 0;
        self.apply(ReloadInput::ReloadSucceeded { pending })
    }

    pub fn fail(&mut self, rollback: bool) -> Result<ReloadPhase, InvalidTransition> {
        let pending = self.pending > 0;
        self.apply(ReloadInput::ReloadFailed { rollback, pending })
    }

    pub fn finish_rollback(&mut self) -> Result<ReloadPhase, InvalidTransition> {
        let pending = self.pending > 0;
        self.apply(ReloadInput::RollbackFinished { pending })
    }

    /// Discard pending changes; an in-flight reload keeps its phase
    pub fn stop(&mut self) -> ReloadPhase {
        self.pending = 0;
        // Stop is accepted in every phase
        if let Ok(next) = transition(self.phase, ReloadInput::Stop) {
            self.phase = next;
        }
        self.phase
    }

    fn apply(&mut self, input: ReloadInput) -> Result<ReloadPhase, InvalidTransition> {
        self.phase = transition(self.phase, input)?;
        Ok(self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReloadPhase::*;

    #[test]
    fn test_change_and_begin_transitions() {
        assert_eq!(transition(Idle, ReloadInput::ChangeReceived), Ok(Debouncing));
        assert_eq!(transition(Debouncing, ReloadInput::ChangeReceived), Ok(Debouncing));
        assert_eq!(transition(Reloading, ReloadInput::ChangeReceived), Ok(Reloading));
        assert_eq!(transition(RollingBack, ReloadInput::ChangeReceived), Ok(RollingBack));

        assert_eq!(transition(Idle, ReloadInput::BeginReload), Ok(Reloading));
        assert_eq!(transition(Debouncing, ReloadInput::BeginReload), Ok(Reloading));
        assert!(transition(Reloading, ReloadInput::BeginReload).is_err());
        assert!(transition(RollingBack, ReloadInput::BeginReload).is_err());
    }

    #[test]
    fn test_completion_transitions() {
        assert_eq!(
            transition(Reloading, ReloadInput::ReloadSucceeded { pending: false }),
            Ok(Idle)
        );
        assert_eq!(
            transition(Reloading, ReloadInput::ReloadSucceeded { pending: true }),
            Ok(Debouncing)
        );
        assert_eq!(
            transition(Reloading, ReloadInput::ReloadFailed { rollback: true, pending: false }),
            Ok(RollingBack)
        );
        assert_eq!(
            transition(Reloading, ReloadInput::ReloadFailed { rollback: false, pending: true }),
            Ok(Debouncing)
        );
        assert_eq!(
            transition(RollingBack, ReloadInput::RollbackFinished { pending: false }),
            Ok(Idle)
        );
    }

    #[test]
    fn test_rejected_transitions() {
        let err = transition(Idle, ReloadInput::ReloadSucceeded { pending: false }).unwrap_err();
        assert_eq!(err.phase, Idle);
        assert!(err.to_string().contains("idle"));

        assert!(transition(Debouncing, ReloadInput::RollbackFinished { pending: false }).is_err());
        assert!(transition(RollingBack, ReloadInput::ReloadFailed { rollback: true, pending: false }).is_err());
    }

    #[test]
    fn test_stop_transitions() {
        assert_eq!(transition(Debouncing, ReloadInput::Stop), Ok(Idle));
        assert_eq!(transition(Reloading, ReloadInput::Stop), Ok(Reloading));
    }

    #[test]
    fn test_state_counts_changes_during_reload() {
        let mut state = ReloadState::new();
        state.record_change().unwrap();
        state.record_change().unwrap();
        assert_eq!(state.phase(), Debouncing);
        assert_eq!(state.pending_changes(), 2);

        assert_eq!(state.begin().unwrap(), 2);
        assert_eq!(state.pending_changes(), 0);
        assert!(state.phase().is_busy());

        // second begin while reloading is refused
        assert!(state.begin().is_err());

        state.record_change().unwrap();
        assert_eq!(state.phase(), Reloading);
        assert_eq!(state.succeed().unwrap(), Debouncing);
        assert_eq!(state.pending_changes(), 1);
    }

    #[test]
    fn test_state_rollback_path_and_stop() {
        let mut state = ReloadState::new();
        assert_eq!(state.begin().unwrap(), 0);
        assert_eq!(state.fail(true).unwrap(), RollingBack);
        assert_eq!(state.finish_rollback().unwrap(), Idle);

        state.record_change().unwrap();
        assert_eq!(state.stop(), Idle);
        assert_eq!(state.pending_changes(), 0);
    }

    #[test]
    fn test_churn_during_slow_reload_is_only_counted() {
        let mut state = ReloadState::new();
        state.begin().unwrap();

        for _ in 0..10_000 {
            state.record_change().unwrap();
        }
        assert_eq!(state.phase(), Reloading);
        assert_eq!(state.pending_changes(), 10_000);

        assert_eq!(state.succeed().unwrap(), Debouncing);
        assert_eq!(state.begin().unwrap(), 10_000);
        assert_eq!(state.pending_changes(), 0);
    }
}
