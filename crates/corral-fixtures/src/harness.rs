//! The process-wide harness state object.

use std::sync::Arc;

use serde_json::Value;

use corral_logging::TopLevelLoggers;

use crate::error::FixtureError;
use crate::interface::Fixture;
use crate::probe::ProbeFactory;
use crate::process::ProcessDriver;
use crate::registry::{CreateContext, FixtureRegistry};

/// Owns the top-level loggers, the fixture registry, and the collaborator
/// handles.
///
/// Construction is the single explicit initialization point for the whole
/// subsystem: it creates the three well-known logger roots and registers the
/// built-in fixture kinds. Nothing here is global and nothing happens at
/// import time; initialization order is this constructor's contract.
pub struct Harness {
    loggers: TopLevelLoggers,
    registry: FixtureRegistry,
    driver: Arc<dyn ProcessDriver>,
    probes: Arc<dyn ProbeFactory>,
}

impl Harness {
    pub fn new(driver: Arc<dyn ProcessDriver>, probes: Arc<dyn ProbeFactory>) -> Self {
        Self {
            loggers: TopLevelLoggers::new(),
            registry: FixtureRegistry::builtin(),
            driver,
            probes,
        }
    }

    /// A harness over a caller-supplied registry (custom or restricted
    /// variant sets).
    pub fn with_registry(
        driver: Arc<dyn ProcessDriver>,
        probes: Arc<dyn ProbeFactory>,
        registry: FixtureRegistry,
    ) -> Self {
        Self {
            loggers: TopLevelLoggers::new(),
            registry,
            driver,
            probes,
        }
    }

    pub fn loggers(&self) -> &TopLevelLoggers {
        &self.loggers
    }

    pub fn registry(&self) -> &FixtureRegistry {
        &self.registry
    }

    /// Mutable registry access for registering additional kinds during
    /// initialization, before any fixture is created.
    pub fn registry_mut(&mut self) -> &mut FixtureRegistry {
        &mut self.registry
    }

    /// Create the fixture for a topology request.
    ///
    /// The fixture's logger is parented to the fixture-role top-level
    /// logger.
    pub fn create_fixture(
        &self,
        kind: &str,
        params: Value,
    ) -> Result<Arc<dyn Fixture>, FixtureError> {
        let ctx = CreateContext::new(
            self.driver.clone(),
            self.probes.clone(),
            self.loggers.fixture().clone(),
        );
        self.registry.create(kind, &ctx, params)
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("registry", &self.registry)
            .finish()
    }
}
