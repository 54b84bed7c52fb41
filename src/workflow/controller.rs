use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Maximum number of workflow runs in flight per controller.
///
/// Always 1: runs share the history file and the profile store, and a second trigger
/// while a run is active is dropped rather than queued.
pub const MAX_CONCURRENT_RUNS: usize = 1;

/// Whether a controller's run slot is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// Single-flight guard shared by everything that can trigger a workflow run.
///
/// Create one per process (or per test) and hand clones to each workflow; clones
/// share the same slot. Acquisition never waits: [`try_begin`](Self::try_begin)
/// either takes the slot immediately or returns `None`.
#[derive(Debug, Clone)]
pub struct WorkflowController {
    slot: Arc<Semaphore>,
}

impl WorkflowController {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(MAX_CONCURRENT_RUNS)),
        }
    }

    /// Take the run slot if it is free.
    ///
    /// The slot is released when the returned [`RunPermit`] is dropped, including
    /// during unwinding.
    pub fn try_begin(&self) -> Option<RunPermit> {
        Arc::clone(&self.slot)
            .try_acquire_owned()
            .ok()
            .map(|permit| RunPermit { _permit: permit })
    }

    pub fn state(&self) -> RunState {
        if self.slot.available_permits() == 0 {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }
}

impl Default for WorkflowController {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of holding a controller's run slot; dropping it returns the controller to idle
#[derive(Debug)]
pub struct RunPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::AssertUnwindSafe;

    #[test]
    fn test_single_flight() {
        let controller = WorkflowController::new();
        assert_eq!(controller.state(), RunState::Idle);

        let permit = controller.try_begin().unwrap();
        assert!(controller.is_running());
        assert!(controller.try_begin().is_none());
        assert!(controller.clone().try_begin().is_none());

        drop(permit);
        assert_eq!(controller.state(), RunState::Idle);
        assert!(controller.try_begin().is_some());
    }

    #[test]
    fn test_independent_controllers() {
        let first = WorkflowController::new();
        let second = WorkflowController::new();

        let _held = first.try_begin().unwrap();
        assert!(second.try_begin().is_some());
    }

    #[test]
    fn test_released_on_panic() {
        let controller = WorkflowController::new();
        let inner = controller.clone();

        let result = std::panic::catch_unwind(AssertUnwindSafe(move || {
            let _permit = inner.try_begin().unwrap();
            panic!("step blew up");
        }));

        assert!(result.is_err());
        assert!(!controller.is_running());
    }
}
