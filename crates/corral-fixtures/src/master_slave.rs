//! Master/slave pair topology.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use corral_logging::ContextLogger;

use crate::error::{FixtureError, TeardownFailure};
use crate::interface::{signalled, Fixture, ShutdownFlag};
use crate::registry::{CreateContext, FixtureRegistry, FixtureSpec};
use crate::state::{FixtureState, StateCell, StopOutcome};

pub const KIND: &str = "master_slave";
pub(crate) const SHORT_NAME: &str = "ms";

#[derive(Debug, Clone, Deserialize)]
pub struct MasterSlaveParams {
    pub master: FixtureSpec,
    pub slave: FixtureSpec,
}

/// A replication pair. The slave depends on the master: it starts after it,
/// becomes ready after it, and is stopped before it.
pub struct MasterSlaveFixture {
    logger: Arc<ContextLogger>,
    state: StateCell,
    shutdown: ShutdownFlag,
    master: Arc<dyn Fixture>,
    slave: Arc<dyn Fixture>,
}

pub(crate) fn construct(
    registry: &FixtureRegistry,
    ctx: &CreateContext,
    logger: Arc<ContextLogger>,
    params: serde_json::Value,
) -> Result<Arc<dyn Fixture>, FixtureError> {
    let params: MasterSlaveParams = serde_json::from_value(params)
        .map_err(|err| FixtureError::invalid_config(SHORT_NAME, err))?;

    let child_ctx = ctx.for_children(&logger);
    let master = registry.create(&params.master.kind, &child_ctx, params.master.params.clone())?;
    let slave = registry.create(&params.slave.kind, &child_ctx, params.slave.params.clone())?;

    Ok(Arc::new(MasterSlaveFixture {
        logger,
        state: StateCell::new(),
        shutdown: ShutdownFlag::new(),
        master,
        slave,
    }))
}

#[async_trait]
impl Fixture for MasterSlaveFixture {
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
        self.logger.info("starting master/slave pair");

        if let Err(err) = self.master.setup().await {
            self.state.mark_failed();
            return Err(FixtureError::startup(SHORT_NAME, err));
        }
        if let Err(err) = self.slave.setup().await {
            self.logger
                .warn("slave failed to start; rolling back master");
            if let Err(cleanup) = self.master.teardown(true).await {
                self.logger.error(format!(
                    "cleanup of master failed after startup error: {cleanup}"
                ));
            }
            self.state.mark_failed();
            return Err(FixtureError::startup(SHORT_NAME, err));
        }
        Ok(())
    }

    async fn await_ready(&self, timeout: Duration) -> Result<(), FixtureError> {
        let state = self.state.get();
        if state != FixtureState::Starting {
            return Err(FixtureError::invalid_state(
                SHORT_NAME,
                state,
                "await readiness",
            ));
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        let work = async {
            // The slave cannot begin replicating until the master serves.
            self.master.await_ready(timeout).await?;
            self.slave.await_ready(timeout).await?;
            Ok::<(), FixtureError>(())
        };

        tokio::select! {
            outcome = tokio::time::timeout(timeout, work) => match outcome {
                Ok(Ok(())) => {
                    if let Err(from) = self.state.mark_running() {
                        if self.shutdown.is_signalled() {
                            return Err(FixtureError::cancelled(SHORT_NAME, timeout));
                        }
                        return Err(FixtureError::invalid_state(SHORT_NAME, from, "mark running"));
                    }
                    self.logger.info("master/slave pair ready");
                    Ok(())
                }
                Ok(Err(err)) => {
                    self.state.mark_failed();
                    Err(err)
                }
                Err(_elapsed) => {
                    self.logger
                        .error(format!("master/slave pair not ready after {timeout:?}"));
                    self.state.mark_failed();
                    Err(FixtureError::timeout(SHORT_NAME, timeout))
                }
            },
            _ = signalled(&mut shutdown_rx) => {
                self.logger.debug("readiness wait cancelled by teardown");
                Err(FixtureError::cancelled(SHORT_NAME, timeout))
            }
        }
    }

    async fn teardown(&self, force: bool) -> Result<(), FixtureError> {
        self.shutdown.signal();
        match self.state.begin_stop() {
            StopOutcome::AlreadyStopped | StopOutcome::AlreadyStopping => return Ok(()),
            StopOutcome::Stopping => {}
        }
        self.logger.info("stopping master/slave pair");

        // Reverse dependency order: the slave must not outlive the master it
        // replicates from. Both attempts run regardless of failures.
        let mut failures = Vec::new();
        if let Err(err) = self.slave.teardown(force).await {
            failures.push(TeardownFailure::new("slave", err));
        }
        if let Err(err) = self.master.teardown(force).await {
            failures.push(TeardownFailure::new("master", err));
        }

        let clean = failures.is_empty();
        self.state.finish_stop(clean);
        if clean {
            self.logger.info("stopped master/slave pair");
            Ok(())
        } else {
            self.logger.error(format!(
                "teardown of master/slave pair left {} failure(s)",
                failures.len()
            ));
            Err(FixtureError::teardown(SHORT_NAME, failures))
        }
    }

    fn is_running(&self) -> bool {
        self.state.get() == FixtureState::Running
            && self.master.is_running()
            && self.slave.is_running()
    }

    fn reset(&self) -> Result<(), FixtureError> {
        for child in [&self.master, &self.slave] {
            if child.state() == FixtureState::Failed {
                child.reset()?;
            }
        }
        self.state
            .reset()
            .map_err(|from| FixtureError::invalid_state(SHORT_NAME, from, "reset"))
    }
}
