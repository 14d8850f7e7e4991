//! The deliberate null topology.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use corral_logging::ContextLogger;

use crate::error::FixtureError;
use crate::interface::Fixture;
use crate::registry::{CreateContext, FixtureRegistry};
use crate::state::{FixtureState, StateCell, StopOutcome};

pub const KIND: &str = "noop";
pub(crate) const SHORT_NAME: &str = "noop";

/// A fixture that manages no processes at all.
///
/// Intentionally registrable: tests that need the lifecycle contract without
/// a topology behind it (dry runs, scheduler tests) drive this variant. It
/// is trivially always-ready and always-stoppable.
pub struct NoopFixture {
    logger: Arc<ContextLogger>,
    state: StateCell,
}

impl NoopFixture {
    pub fn new(logger: Arc<ContextLogger>) -> Self {
        Self {
            logger,
            state: StateCell::new(),
        }
    }
}

pub(crate) fn construct(
    _registry: &FixtureRegistry,
    _ctx: &CreateContext,
    logger: Arc<ContextLogger>,
    _params: serde_json::Value,
) -> Result<Arc<dyn Fixture>, FixtureError> {
    Ok(Arc::new(NoopFixture::new(logger)))
}

#[async_trait]
impl Fixture for NoopFixture {
    fn kind(&self) -> &str {
        KIND
    }

    fn short_name(&self) -> &str {
        SHORT_NAME
    }

    fn logger(&self) -> &Arc<ContextLogger> {
        &self.logger
    }

    fn state(&self) -> FixtureState {
        self.state.get()
    }

    async fn setup(&self) -> Result<(), FixtureError> {
        self.state
            .begin_setup()
            .map_err(|from| FixtureError::invalid_state(SHORT_NAME, from, "setup"))?;
        self.logger.debug("noop fixture starting");
        Ok(())
    }

    async fn await_ready(&self, _timeout: Duration) -> Result<(), FixtureError> {
        self.state
            .mark_running()
            .map_err(|from| FixtureError::invalid_state(SHORT_NAME, from, "await readiness"))?;
        self.logger.debug("noop fixture running");
        Ok(())
    }

    async fn teardown(&self, _force: bool) -> Result<(), FixtureError> {
        match self.state.begin_stop() {
            StopOutcome::AlreadyStopped | StopOutcome::AlreadyStopping => return Ok(()),
            StopOutcome::Stopping => {}
        }
        self.state.finish_stop(true);
        self.logger.debug("noop fixture stopped");
        Ok(())
    }

    fn reset(&self) -> Result<(), FixtureError> {
        self.state
            .reset()
            .map_err(|from| FixtureError::invalid_state(SHORT_NAME, from, "reset"))
    }
}
