//! Single-process (leaf) topology.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use corral_logging::ContextLogger;

use crate::error::{FixtureError, TeardownFailure};
use crate::interface::{Fixture, ShutdownFlag, POLL_INTERVAL};
use crate::probe::ReadinessProbe;
use crate::process::{LaunchSpec, ProcessDriver, ProcessHandle};
use crate::registry::{CreateContext, FixtureRegistry};
use crate::state::{FixtureState, StateCell, StopOutcome};

pub const KIND: &str = "standalone";
pub(crate) const SHORT_NAME: &str = "node";

/// Grace period for the process to exit after a terminate request.
const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct StandaloneParams {
    pub launch: LaunchSpec,
}

/// A single database node.
///
/// Owns exactly one process handle for its whole lifetime; readiness means
/// the process accepts connections, as observed through the probe.
pub struct StandaloneFixture {
    logger: Arc<ContextLogger>,
    state: StateCell,
    shutdown: ShutdownFlag,
    driver: Arc<dyn ProcessDriver>,
    probe: Arc<dyn ReadinessProbe>,
    launch: LaunchSpec,
    handle: Mutex<Option<Box<dyn ProcessHandle>>>,
}

enum WaitOutcome {
    Ready,
    Cancelled,
    Died,
}

impl StandaloneFixture {
    pub fn new(ctx: &CreateContext, logger: Arc<ContextLogger>, launch: LaunchSpec) -> Self {
        logger.set_attr("port", launch.port);
        let probe = ctx.probes.readiness_probe(&launch);
        Self {
            logger,
            state: StateCell::new(),
            shutdown: ShutdownFlag::new(),
            driver: ctx.driver.clone(),
            probe,
            launch,
            handle: Mutex::new(None),
        }
    }

    async fn handle_alive(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|h| h.is_alive())
            .unwrap_or(false)
    }
}

pub(crate) fn construct(
    _registry: &FixtureRegistry,
    ctx: &CreateContext,
    logger: Arc<ContextLogger>,
    params: serde_json::Value,
) -> Result<Arc<dyn Fixture>, FixtureError> {
    let params: StandaloneParams = serde_json::from_value(params)
        .map_err(|err| FixtureError::invalid_config(SHORT_NAME, err))?;
    Ok(Arc::new(StandaloneFixture::new(ctx, logger, params.launch)))
}

#[async_trait]
impl Fixture for StandaloneFixture {
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
        self.logger.info(format!(
            "starting {} on port {}",
            self.launch.program, self.launch.port
        ));

        match self.driver.launch(&self.launch).await {
            Ok(handle) => {
                *self.handle.lock().await = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.logger
                    .error(format!("failed to launch {}: {err}", self.launch.program));
                self.state.mark_failed();
                Err(FixtureError::startup(SHORT_NAME, err))
            }
        }
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
        let wait = async {
            loop {
                if *shutdown_rx.borrow() {
                    return WaitOutcome::Cancelled;
                }
                if !self.handle_alive().await {
                    return WaitOutcome::Died;
                }
                if self.probe.poll().await {
                    return WaitOutcome::Ready;
                }
                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(WaitOutcome::Ready) => {
                if let Err(from) = self.state.mark_running() {
                    // Teardown may have taken the state between the probe
                    // succeeding and this transition.
                    if self.shutdown.is_signalled() {
                        return Err(FixtureError::cancelled(SHORT_NAME, timeout));
                    }
                    return Err(FixtureError::invalid_state(SHORT_NAME, from, "mark running"));
                }
                self.logger
                    .info(format!("ready on port {}", self.launch.port));
                Ok(())
            }
            Ok(WaitOutcome::Cancelled) => {
                // Teardown owns the state from here.
                self.logger.debug("readiness wait cancelled by teardown");
                Err(FixtureError::cancelled(SHORT_NAME, timeout))
            }
            Ok(WaitOutcome::Died) => {
                if self.shutdown.is_signalled() {
                    return Err(FixtureError::cancelled(SHORT_NAME, timeout));
                }
                self.logger
                    .error("process exited before accepting connections");
                self.state.mark_failed();
                Err(FixtureError::startup(
                    SHORT_NAME,
                    std::io::Error::other("process exited before accepting connections"),
                ))
            }
            Err(_elapsed) => {
                self.logger.error(format!(
                    "not ready on port {} after {timeout:?}",
                    self.launch.port
                ));
                self.state.mark_failed();
                Err(FixtureError::timeout(SHORT_NAME, timeout))
            }
        }
    }

    async fn teardown(&self, force: bool) -> Result<(), FixtureError> {
        self.shutdown.signal();
        match self.state.begin_stop() {
            StopOutcome::AlreadyStopped | StopOutcome::AlreadyStopping => return Ok(()),
            StopOutcome::Stopping => {}
        }
        self.logger
            .info(format!("stopping node on port {}", self.launch.port));

        let mut failures = Vec::new();
        let handle = { self.handle.lock().await.take() };
        if let Some(handle) = handle {
            if let Err(err) = handle.terminate(force).await {
                failures.push(TeardownFailure::new(SHORT_NAME, err));
            } else if let Err(err) = handle.wait(STOP_GRACE).await {
                failures.push(TeardownFailure::new(SHORT_NAME, err));
            }
        }

        let clean = failures.is_empty();
        self.state.finish_stop(clean);
        if clean {
            self.logger
                .info(format!("stopped node on port {}", self.launch.port));
            Ok(())
        } else {
            self.logger
                .error(format!("failed to stop node on port {}", self.launch.port));
            Err(FixtureError::teardown(SHORT_NAME, failures))
        }
    }

    fn reset(&self) -> Result<(), FixtureError> {
        match self.handle.try_lock() {
            Ok(guard) if guard.is_none() => {}
            _ => {
                return Err(FixtureError::invalid_state(
                    SHORT_NAME,
                    self.state.get(),
                    "reset",
                ))
            }
        }
        self.state
            .reset()
            .map_err(|from| FixtureError::invalid_state(SHORT_NAME, from, "reset"))
    }
}
