//! Sharded-cluster topology: config server, shards, routers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;

use corral_logging::ContextLogger;

use crate::error::{FixtureError, TeardownFailure};
use crate::interface::{signalled, Fixture, ShutdownFlag};
use crate::registry::{CreateContext, FixtureRegistry, FixtureSpec};
use crate::state::{FixtureState, StateCell, StopOutcome};

pub const KIND: &str = "sharded_cluster";
pub(crate) const SHORT_NAME: &str = "cluster";

#[derive(Debug, Clone, Deserialize)]
pub struct ShardedClusterParams {
    /// A standalone node or a small replica set.
    pub config_server: FixtureSpec,
    /// Each shard is a standalone node or a replica set.
    pub shards: Vec<FixtureSpec>,
    pub routers: Vec<FixtureSpec>,
}

/// A sharded cluster.
///
/// Startup dependencies are strict: shards may only become ready after the
/// config server is running, and routers only after every shard. Teardown
/// releases in the reverse order so no child outlives a resource it depends
/// on.
pub struct ShardedClusterFixture {
    logger: Arc<ContextLogger>,
    state: StateCell,
    shutdown: ShutdownFlag,
    config_server: Arc<dyn Fixture>,
    shards: Vec<Arc<dyn Fixture>>,
    routers: Vec<Arc<dyn Fixture>>,
}

impl ShardedClusterFixture {
    /// Config server, then shards, then routers; the setup order.
    fn children(&self) -> Vec<Arc<dyn Fixture>> {
        let mut children = vec![self.config_server.clone()];
        children.extend(self.shards.iter().cloned());
        children.extend(self.routers.iter().cloned());
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

    async fn teardown_group(
        group: &[Arc<dyn Fixture>],
        force: bool,
        failures: &mut Vec<TeardownFailure>,
    ) {
        let attempts = group.iter().map(|child| async move {
            let name = child.short_name().to_string();
            (name, child.teardown(force).await)
        });
        for (name, result) in join_all(attempts).await {
            if let Err(err) = result {
                failures.push(TeardownFailure::new(name, err));
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
    let params: ShardedClusterParams = serde_json::from_value(params)
        .map_err(|err| FixtureError::invalid_config(SHORT_NAME, err))?;
    if params.shards.is_empty() {
        return Err(FixtureError::invalid_config(
            SHORT_NAME,
            std::io::Error::other("a sharded cluster needs at least one shard"),
        ));
    }
    if params.routers.is_empty() {
        return Err(FixtureError::invalid_config(
            SHORT_NAME,
            std::io::Error::other("a sharded cluster needs at least one router"),
        ));
    }

    let child_ctx = ctx.for_children(&logger);
    let config_server = registry.create(
        &params.config_server.kind,
        &child_ctx,
        params.config_server.params.clone(),
    )?;
    let shards = params
        .shards
        .iter()
        .map(|spec| registry.create(&spec.kind, &child_ctx, spec.params.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    let routers = params
        .routers
        .iter()
        .map(|spec| registry.create(&spec.kind, &child_ctx, spec.params.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Arc::new(ShardedClusterFixture {
        logger,
        state: StateCell::new(),
        shutdown: ShutdownFlag::new(),
        config_server,
        shards,
        routers,
    }))
}

#[async_trait]
impl Fixture for ShardedClusterFixture {
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
            "starting sharded cluster: {} shard(s), {} router(s)",
            self.shards.len(),
            self.routers.len()
        ));

        for (idx, child) in self.children().iter().enumerate() {
            if let Err(err) = child.setup().await {
                self.logger.warn(format!(
                    "'{}' failed to start; rolling back",
                    child.short_name()
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
            // Config server first; shards and routers gate on it.
            self.config_server.await_ready(timeout).await?;

            // All shards concurrently, then routers.
            let shard_waits = self
                .shards
                .iter()
                .map(|shard| async move { shard.await_ready(timeout).await });
            for result in join_all(shard_waits).await {
                result?;
            }

            let router_waits = self
                .routers
                .iter()
                .map(|router| async move { router.await_ready(timeout).await });
            for result in join_all(router_waits).await {
                result?;
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
                    self.logger.info("sharded cluster ready");
                    Ok(())
                }
                Ok(Err(err)) => {
                    self.state.mark_failed();
                    Err(err)
                }
                Err(_elapsed) => {
                    self.logger
                        .error(format!("sharded cluster not ready after {timeout:?}"));
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
        self.logger.info("stopping sharded cluster");

        // Routers, then shards, then the config server; every attempt runs
        // and failures are collected across all of them.
        let mut failures = Vec::new();
        Self::teardown_group(&self.routers, force, &mut failures).await;
        Self::teardown_group(&self.shards, force, &mut failures).await;
        if let Err(err) = self.config_server.teardown(force).await {
            failures.push(TeardownFailure::new(
                self.config_server.short_name().to_string(),
                err,
            ));
        }

        let clean = failures.is_empty();
        self.state.finish_stop(clean);
        if clean {
            self.logger.info("stopped sharded cluster");
            Ok(())
        } else {
            self.logger.error(format!(
                "teardown of sharded cluster left {} failure(s)",
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
