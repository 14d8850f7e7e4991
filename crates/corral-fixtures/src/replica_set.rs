//! Replica-set topology: N members, optional arbiter, one elected primary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;

use corral_logging::ContextLogger;

use crate::error::{FixtureError, TeardownFailure};
use crate::interface::{signalled, Fixture, ShutdownFlag, POLL_INTERVAL};
use crate::probe::ReplicaSetControl;
use crate::registry::{CreateContext, FixtureRegistry, FixtureSpec};
use crate::state::{FixtureState, StateCell, StopOutcome};

pub const KIND: &str = "replica_set";
pub(crate) const SHORT_NAME: &str = "rs";

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaSetParams {
    pub set_name: String,
    /// Child specifications for the data-bearing members, in member order.
    pub members: Vec<FixtureSpec>,
    #[serde(default)]
    pub arbiter: Option<FixtureSpec>,
    /// Member index expected to win the election; any member wins if unset.
    #[serde(default)]
    pub expected_primary: Option<usize>,
}

/// A replica set built from member fixtures.
///
/// Readiness means: every member (and the arbiter) is reachable, the
/// replica-set configuration has been applied, and a primary has been
/// elected. Member reachability waits run concurrently; election waiting
/// only begins once all members report reachable.
pub struct ReplicaSetFixture {
    logger: Arc<ContextLogger>,
    state: StateCell,
    shutdown: ShutdownFlag,
    set_name: String,
    members: Vec<Arc<dyn Fixture>>,
    arbiter: Option<Arc<dyn Fixture>>,
    expected_primary: Option<usize>,
    control: Arc<dyn ReplicaSetControl>,
}

impl ReplicaSetFixture {
    /// Members followed by the arbiter; the setup order.
    fn children(&self) -> Vec<Arc<dyn Fixture>> {
        let mut children = self.members.clone();
        if let Some(arbiter) = &self.arbiter {
            children.push(arbiter.clone());
        }
        children
    }

    async fn rollback(&self, started_up_to: usize) {
        for child in self.children()[..=started_up_to].iter().rev() {
            if let Err(err) = child.teardown(true).await {
                self.logger.error(format!(
                    "cleanup of '{}' failed after startup error: {err}",
                    child.short_name()
                ));
            }
        }
    }
}

pub(crate) fn construct(
    registry: &FixtureRegistry,
    ctx: &CreateContext,
    logger: Arc<ContextLogger>,
    params: serde_json::Value,
) -> Result<Arc<dyn Fixture>, FixtureError> {
    let params: ReplicaSetParams = serde_json::from_value(params)
        .map_err(|err| FixtureError::invalid_config(SHORT_NAME, err))?;
    if params.members.is_empty() {
        return Err(FixtureError::invalid_config(
            SHORT_NAME,
            std::io::Error::other("a replica set needs at least one member"),
        ));
    }
    if let Some(idx) = params.expected_primary {
        if idx >= params.members.len() {
            return Err(FixtureError::invalid_config(
                SHORT_NAME,
                std::io::Error::other(format!(
                    "expected primary index {idx} is out of range for {} member(s)",
                    params.members.len()
                )),
            ));
        }
    }

    logger.set_attr("replset", params.set_name.clone());
    let child_ctx = ctx.for_children(&logger);
    let members = params
        .members
        .iter()
        .map(|spec| registry.create(&spec.kind, &child_ctx, spec.params.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    let arbiter = params
        .arbiter
        .as_ref()
        .map(|spec| registry.create(&spec.kind, &child_ctx, spec.params.clone()))
        .transpose()?;
    let control = ctx
        .probes
        .replica_set_control(&params.set_name, members.len());

    Ok(Arc::new(ReplicaSetFixture {
        logger,
        state: StateCell::new(),
        shutdown: ShutdownFlag::new(),
        set_name: params.set_name,
        members,
        arbiter,
        expected_primary: params.expected_primary,
        control,
    }))
}

#[async_trait]
impl Fixture for ReplicaSetFixture {
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
            "starting replica set '{}' with {} member(s)",
            self.set_name,
            self.members.len()
        ));

        for (idx, child) in self.children().iter().enumerate() {
            if let Err(err) = child.setup().await {
                self.logger.warn(format!(
                    "member {idx} of '{}' failed to start; rolling back",
                    self.set_name
                ));
                self.rollback(idx).await;
                self.state.mark_failed();
                return Err(FixtureError::startup(SHORT_NAME, err));
            }
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
            // Every member reachable, concurrently.
            let waits = self
                .children()
                .into_iter()
                .map(|child| async move { child.await_ready(timeout).await });
            for result in join_all(waits).await {
                result?;
            }

            // Configuration, then election.
            self.control
                .apply_config()
                .await
                .map_err(|err| FixtureError::startup(SHORT_NAME, err))?;
            loop {
                if let Some(primary) = self.control.primary().await {
                    match self.expected_primary {
                        None => break,
                        Some(expected) if expected == primary => break,
                        Some(_) => {}
                    }
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
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
                    self.logger.info(format!(
                        "replica set '{}' ready; primary elected",
                        self.set_name
                    ));
                    Ok(())
                }
                Ok(Err(err)) => {
                    self.state.mark_failed();
                    Err(err)
                }
                Err(_elapsed) => {
                    self.logger.error(format!(
                        "replica set '{}' not ready after {timeout:?}",
                        self.set_name
                    ));
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
        self.logger
            .info(format!("stopping replica set '{}'", self.set_name));

        // Members have no teardown-order dependency on each other; release
        // them concurrently and collect every failure.
        let attempts = self.children().into_iter().map(|child| async move {
            let name = child.short_name().to_string();
            (name, child.teardown(force).await)
        });
        let mut failures = Vec::new();
        for (name, result) in join_all(attempts).await {
            if let Err(err) = result {
                failures.push(TeardownFailure::new(name, err));
            }
        }

        let clean = failures.is_empty();
        self.state.finish_stop(clean);
        if clean {
            self.logger
                .info(format!("stopped replica set '{}'", self.set_name));
            Ok(())
        } else {
            self.logger.error(format!(
                "teardown of replica set '{}' left {} failure(s)",
                self.set_name,
                failures.len()
            ));
            Err(FixtureError::teardown(SHORT_NAME, failures))
        }
    }

    fn is_running(&self) -> bool {
        self.state.get() == FixtureState::Running
            && self.children().iter().all(|child| child.is_running())
    }

    fn reset(&self) -> Result<(), FixtureError> {
        for child in self.children() {
            if child.state() == FixtureState::Failed {
                child.reset()?;
            }
        }
        self.state
            .reset()
            .map_err(|from| FixtureError::invalid_state(SHORT_NAME, from, "reset"))
    }
}
