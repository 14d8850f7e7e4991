//! The fixture lifecycle state machine.

use parking_lot::Mutex;

/// Lifecycle state of a fixture.
///
/// Legal transitions: Stopped → Starting → Running → Stopping → Stopped,
/// plus Failed from Starting or Running (and from Stopping, when teardown
/// itself leaves resources behind). A fixture in Failed must not re-enter
/// Starting without an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Disposition of a teardown request against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopOutcome {
    /// Already fully stopped; teardown is a no-op.
    AlreadyStopped,
    /// Another teardown is in flight; this call is a no-op.
    AlreadyStopping,
    /// The state moved to Stopping; proceed with resource release.
    Stopping,
}

/// Guarded cell enforcing the fixture state machine.
///
/// Transitions that are not legal from the current state are rejected and
/// the cell is left untouched.
#[derive(Debug)]
pub(crate) struct StateCell {
    inner: Mutex<FixtureState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(FixtureState::Stopped),
        }
    }

    pub(crate) fn get(&self) -> FixtureState {
        *self.inner.lock()
    }

    /// Stopped → Starting. Returns the offending state on rejection.
    pub(crate) fn begin_setup(&self) -> Result<(), FixtureState> {
        let mut state = self.inner.lock();
        match *state {
            FixtureState::Stopped => {
                *state = FixtureState::Starting;
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Starting → Running.
    pub(crate) fn mark_running(&self) -> Result<(), FixtureState> {
        let mut state = self.inner.lock();
        match *state {
            FixtureState::Starting => {
                *state = FixtureState::Running;
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Starting | Running → Failed. From any other state this is a no-op:
    /// a teardown that is already in flight owns the state.
    pub(crate) fn mark_failed(&self) {
        let mut state = self.inner.lock();
        if matches!(*state, FixtureState::Starting | FixtureState::Running) {
            *state = FixtureState::Failed;
        }
    }

    /// Request the Stopping transition, reporting how the request landed.
    pub(crate) fn begin_stop(&self) -> StopOutcome {
        let mut state = self.inner.lock();
        match *state {
            FixtureState::Stopped => StopOutcome::AlreadyStopped,
            FixtureState::Stopping => StopOutcome::AlreadyStopping,
            _ => {
                *state = FixtureState::Stopping;
                StopOutcome::Stopping
            }
        }
    }

    /// Stopping → Stopped when clean, Stopping → Failed otherwise.
    pub(crate) fn finish_stop(&self, clean: bool) {
        let mut state = self.inner.lock();
        if *state == FixtureState::Stopping {
            *state = if clean {
                FixtureState::Stopped
            } else {
                FixtureState::Failed
            };
        }
    }

    /// The explicit Failed → Stopped reset.
    pub(crate) fn reset(&self) -> Result<(), FixtureState> {
        let mut state = self.inner.lock();
        match *state {
            FixtureState::Failed => {
                *state = FixtureState::Stopped;
                Ok(())
            }
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), FixtureState::Stopped);

        cell.begin_setup().unwrap();
        assert_eq!(cell.get(), FixtureState::Starting);

        cell.mark_running().unwrap();
        assert_eq!(cell.get(), FixtureState::Running);

        assert_eq!(cell.begin_stop(), StopOutcome::Stopping);
        cell.finish_stop(true);
        assert_eq!(cell.get(), FixtureState::Stopped);
    }

    #[test]
    fn test_setup_rejected_when_not_stopped() {
        let cell = StateCell::new();
        cell.begin_setup().unwrap();
        assert_eq!(cell.begin_setup(), Err(FixtureState::Starting));
    }

    #[test]
    fn test_failed_requires_explicit_reset() {
        let cell = StateCell::new();
        cell.begin_setup().unwrap();
        cell.mark_failed();
        assert_eq!(cell.get(), FixtureState::Failed);

        // Starting cannot be re-entered from Failed.
        assert_eq!(cell.begin_setup(), Err(FixtureState::Failed));

        cell.reset().unwrap();
        assert_eq!(cell.get(), FixtureState::Stopped);
        cell.begin_setup().unwrap();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let cell = StateCell::new();
        assert_eq!(cell.begin_stop(), StopOutcome::AlreadyStopped);

        cell.begin_setup().unwrap();
        cell.mark_running().unwrap();
        assert_eq!(cell.begin_stop(), StopOutcome::Stopping);
        assert_eq!(cell.begin_stop(), StopOutcome::AlreadyStopping);
        cell.finish_stop(true);
        assert_eq!(cell.begin_stop(), StopOutcome::AlreadyStopped);
    }

    #[test]
    fn test_unclean_stop_lands_in_failed() {
        let cell = StateCell::new();
        cell.begin_setup().unwrap();
        cell.mark_running().unwrap();
        assert_eq!(cell.begin_stop(), StopOutcome::Stopping);
        cell.finish_stop(false);
        assert_eq!(cell.get(), FixtureState::Failed);
        cell.reset().unwrap();
    }

    #[test]
    fn test_mark_failed_does_not_override_stopping() {
        let cell = StateCell::new();
        cell.begin_setup().unwrap();
        assert_eq!(cell.begin_stop(), StopOutcome::Stopping);
        cell.mark_failed();
        assert_eq!(cell.get(), FixtureState::Stopping);
    }
}
