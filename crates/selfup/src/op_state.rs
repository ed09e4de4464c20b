//! Operation state machine.
//!
//! Guards mutual exclusion between the engine's operations. All long
//! operations start from `Idle` and hold a busy state until their RAII guard
//! drops; the precondition check and the transition into the busy state
//! happen under a single lock acquisition, before any suspension point, so
//! two racing calls can never both observe `Idle`.

use crate::error::{Result, UpdateError};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Process-wide engine state. Exactly one long operation may run at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Idle,
    Checking,
    Downloading,
    Installing,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::Checking => "checking",
            EngineState::Downloading => "downloading",
            EngineState::Installing => "installing",
        };
        f.write_str(s)
    }
}

/// The engine's operations, as named in conflict errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Check,
    Download,
    Install,
    Rollback,
    ClearDownloads,
    ClearBackups,
}

impl Operation {
    /// Busy state held while this operation runs. Rollback restores the
    /// project tree, so it shares the install envelope.
    fn busy_state(self) -> EngineState {
        match self {
            Operation::Check => EngineState::Checking,
            Operation::Download => EngineState::Downloading,
            Operation::Install | Operation::Rollback => EngineState::Installing,
            // Maintenance operations never hold a busy state.
            Operation::ClearDownloads | Operation::ClearBackups => EngineState::Idle,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Check => "check",
            Operation::Download => "download",
            Operation::Install => "install",
            Operation::Rollback => "rollback",
            Operation::ClearDownloads => "clear-downloads",
            Operation::ClearBackups => "clear-backups",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
struct Current {
    state: EngineState,
    active: Option<Operation>,
}

/// Check-and-set guard over the engine state.
#[derive(Debug, Clone, Default)]
pub struct OperationStateMachine {
    current: Arc<Mutex<Current>>,
}

impl OperationStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Current> {
        // A poisoned state lock only means a panic mid-operation; the state
        // itself is still a plain enum, so recover the guard.
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> EngineState {
        self.lock().state
    }

    /// Atomically verify `Idle` and transition into the operation's busy
    /// state. The returned guard restores `Idle` on drop.
    pub fn begin(&self, op: Operation) -> Result<OpGuard> {
        let mut cur = self.lock();
        if cur.state != EngineState::Idle {
            return Err(UpdateError::StateConflict {
                requested: op,
                active: cur.active.unwrap_or(op),
            });
        }
        cur.state = op.busy_state();
        cur.active = Some(op);
        drop(cur);
        Ok(OpGuard {
            current: Arc::clone(&self.current),
        })
    }

    /// Guard for the maintenance operations, which do not hold a busy state:
    /// `clear-downloads` is rejected while downloading or installing,
    /// `clear-backups` only while installing.
    pub fn check_maintenance(&self, op: Operation) -> Result<()> {
        let cur = self.lock();
        let blocked = match op {
            Operation::ClearDownloads => matches!(
                cur.state,
                EngineState::Downloading | EngineState::Installing
            ),
            Operation::ClearBackups => cur.state == EngineState::Installing,
            _ => cur.state != EngineState::Idle,
        };
        if blocked {
            return Err(UpdateError::StateConflict {
                requested: op,
                active: cur.active.unwrap_or(op),
            });
        }
        Ok(())
    }
}

/// Held for the duration of a long operation; restores `Idle` when dropped,
/// on success and failure alike.
pub struct OpGuard {
    current: Arc<Mutex<Current>>,
}

impl std::fmt::Debug for OpGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpGuard").finish_non_exhaustive()
    }
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        let mut cur = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cur.state = EngineState::Idle;
        cur.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_are_mutually_exclusive() {
        let machine = OperationStateMachine::new();
        let guard = machine.begin(Operation::Check).unwrap();
        assert_eq!(machine.state(), EngineState::Checking);

        let err = machine.begin(Operation::Download).unwrap_err();
        match err {
            UpdateError::StateConflict { requested, active } => {
                assert_eq!(requested, Operation::Download);
                assert_eq!(active, Operation::Check);
            }
            other => panic!("expected StateConflict, got {other:?}"),
        }

        drop(guard);
        assert_eq!(machine.state(), EngineState::Idle);
        machine.begin(Operation::Download).unwrap();
    }

    #[test]
    fn guard_restores_idle_after_failure_paths_too() {
        let machine = OperationStateMachine::new();
        {
            let _guard = machine.begin(Operation::Install).unwrap();
            assert_eq!(machine.state(), EngineState::Installing);
        }
        assert_eq!(machine.state(), EngineState::Idle);
    }

    #[test]
    fn rollback_holds_the_install_envelope() {
        let machine = OperationStateMachine::new();
        let _guard = machine.begin(Operation::Rollback).unwrap();
        assert_eq!(machine.state(), EngineState::Installing);
        assert!(machine.begin(Operation::Rollback).is_err());
    }

    #[test]
    fn clear_downloads_guard() {
        let machine = OperationStateMachine::new();

        // Allowed while idle and while checking.
        machine.check_maintenance(Operation::ClearDownloads).unwrap();
        let guard = machine.begin(Operation::Check).unwrap();
        machine.check_maintenance(Operation::ClearDownloads).unwrap();
        drop(guard);

        let guard = machine.begin(Operation::Download).unwrap();
        assert!(machine.check_maintenance(Operation::ClearDownloads).is_err());
        drop(guard);

        let _guard = machine.begin(Operation::Install).unwrap();
        assert!(machine.check_maintenance(Operation::ClearDownloads).is_err());
    }

    #[test]
    fn clear_backups_rejected_only_while_installing() {
        let machine = OperationStateMachine::new();

        machine.check_maintenance(Operation::ClearBackups).unwrap();

        let guard = machine.begin(Operation::Download).unwrap();
        machine.check_maintenance(Operation::ClearBackups).unwrap();
        drop(guard);

        let guard = machine.begin(Operation::Install).unwrap();
        let err = machine.check_maintenance(Operation::ClearBackups).unwrap_err();
        assert!(matches!(err, UpdateError::StateConflict { .. }));
        drop(guard);

        machine.check_maintenance(Operation::ClearBackups).unwrap();
    }
}
