//! The uniform lifecycle contract every topology variant satisfies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use corral_logging::ContextLogger;

use crate::error::FixtureError;
use crate::state::FixtureState;

/// Cadence for readiness polling loops.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A managed, disposable test-environment topology.
///
/// Callers drive a fixture through setup → await_ready → (test execution,
/// external) → teardown. A fixture is exclusively driven by one caller
/// through its whole lifecycle, with one sanctioned exception: `teardown`
/// may be invoked while `await_ready` is in flight, and the wait must then
/// return promptly with a cancellation outcome instead of continuing to
/// poll a process that is being killed.
#[async_trait]
pub trait Fixture: Send + Sync {
    /// Registry kind identifier of this variant.
    fn kind(&self) -> &str;

    /// Stable display identifier, also used to name this fixture's logger.
    fn short_name(&self) -> &str;

    /// The fixture's owned contextual logger, for callers that need to
    /// attribute their own records to this fixture.
    fn logger(&self) -> &Arc<ContextLogger>;

    /// Snapshot of the current lifecycle state.
    fn state(&self) -> FixtureState;

    /// Begin bringing the topology up (Stopped → Starting).
    ///
    /// For a leaf this launches the underlying process. For a composite this
    /// invokes children's `setup` in variant-specific order; on a child
    /// failure every already-started child is torn down before the error
    /// propagates, so no process leaks.
    async fn setup(&self) -> Result<(), FixtureError>;

    /// Wait until the topology is usable (Starting → Running).
    ///
    /// `timeout` is the caller-supplied wall-clock budget for this call;
    /// there is no default. On expiry the fixture transitions to Failed and
    /// the caller is responsible for teardown.
    async fn await_ready(&self, timeout: Duration) -> Result<(), FixtureError>;

    /// Release all owned resources (→ Stopping → Stopped).
    ///
    /// Idempotent: invoking it on an already-stopped fixture is a no-op.
    /// For a composite, children release in reverse dependency order and
    /// every child's teardown is attempted even when a sibling's fails;
    /// failures are collected into one aggregated error. `force` selects
    /// the abrupt release path (kill) over a graceful shutdown request.
    async fn teardown(&self, force: bool) -> Result<(), FixtureError>;

    /// Non-blocking query of `state == Running`. Composites additionally
    /// require every child to report running; staleness up to the last
    /// observed state is acceptable.
    fn is_running(&self) -> bool {
        self.state() == FixtureState::Running
    }

    /// The explicit Failed → Stopped transition required before a failed
    /// fixture may be driven through setup again.
    fn reset(&self) -> Result<(), FixtureError>;
}

/// Teardown-to-await_ready cancellation signal.
///
/// Each fixture owns the sender half; readiness waits subscribe and select
/// against it.
#[derive(Debug)]
pub(crate) struct ShutdownFlag {
    tx: watch::Sender<bool>,
}

impl ShutdownFlag {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub(crate) fn signal(&self) {
        let _ = self.tx.send(true);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub(crate) fn is_signalled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl std::fmt::Debug for dyn Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("kind", &self.kind())
            .field("short_name", &self.short_name())
            .field("state", &self.state())
            .finish()
    }
}

/// Resolves once the flag is signalled (or the owner is gone).
pub(crate) async fn signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signalled_resolves_after_signal() {
        let flag = ShutdownFlag::new();
        let mut rx = flag.subscribe();
        assert!(!flag.is_signalled());

        flag.signal();
        signalled(&mut rx).await;
        assert!(flag.is_signalled());
    }

    #[tokio::test]
    async fn test_signalled_pending_until_signal() {
        let flag = ShutdownFlag::new();
        let mut rx = flag.subscribe();
        let pending = tokio::time::timeout(Duration::from_millis(20), signalled(&mut rx)).await;
        assert!(pending.is_err());
    }
}
