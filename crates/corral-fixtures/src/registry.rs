//! Kind-keyed fixture registry and factory.
//!
//! Maps a topology-kind identifier to a constructor and a short display
//! name. Built-in kinds are registered by one explicit call; there is no
//! module-global table and no import-time side effect.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use corral_logging::ContextLogger;

use crate::error::{FixtureError, RegistryError};
use crate::interface::Fixture;
use crate::probe::ProbeFactory;
use crate::process::ProcessDriver;
use crate::{master_slave, noop, replica_set, sharded_cluster, standalone};

/// Kind identifier of the null topology.
pub const NOOP_FIXTURE_KIND: &str = noop::KIND;

/// One embedded child specification inside a composite's parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureSpec {
    pub kind: String,
    #[serde(default)]
    pub params: Value,
}

impl FixtureSpec {
    pub fn new(kind: impl Into<String>, params: Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// Collaborators and logger parentage for one `create` call.
///
/// Composites derive a child context whose `parent_logger` is their own
/// logger, so nested fixtures inherit attributes down the composition tree.
#[derive(Clone)]
pub struct CreateContext {
    pub driver: Arc<dyn ProcessDriver>,
    pub probes: Arc<dyn ProbeFactory>,
    pub parent_logger: Arc<ContextLogger>,
}

impl CreateContext {
    pub fn new(
        driver: Arc<dyn ProcessDriver>,
        probes: Arc<dyn ProbeFactory>,
        parent_logger: Arc<ContextLogger>,
    ) -> Self {
        Self {
            driver,
            probes,
            parent_logger,
        }
    }

    pub(crate) fn for_children(&self, logger: &Arc<ContextLogger>) -> Self {
        Self {
            driver: self.driver.clone(),
            probes: self.probes.clone(),
            parent_logger: logger.clone(),
        }
    }
}

/// Constructor invoked by [`FixtureRegistry::create`] once the kind is
/// resolved and the fixture's logger has been derived.
pub type FixtureConstructor = Box<
    dyn Fn(&FixtureRegistry, &CreateContext, Arc<ContextLogger>, Value) -> Result<Arc<dyn Fixture>, FixtureError>
        + Send
        + Sync,
>;

struct RegistryEntry {
    short_name: String,
    constructor: FixtureConstructor,
}

/// Registry mapping kind identifiers to fixture constructors.
pub struct FixtureRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl FixtureRegistry {
    /// An empty registry, for embedders that supply their own variant set.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// A registry with the closed built-in set: noop, standalone,
    /// replica set, master/slave pair, sharded cluster.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, &str, FixtureConstructor); 5] = [
            (noop::KIND, "noop", Box::new(noop::construct)),
            (standalone::KIND, "node", Box::new(standalone::construct)),
            (replica_set::KIND, "rs", Box::new(replica_set::construct)),
            (master_slave::KIND, "ms", Box::new(master_slave::construct)),
            (
                sharded_cluster::KIND,
                "cluster",
                Box::new(sharded_cluster::construct),
            ),
        ];
        for (kind, short_name, constructor) in builtins {
            if registry.register(kind, short_name, constructor).is_err() {
                unreachable!("builtin fixture kinds are distinct");
            }
        }
        registry
    }

    /// Associate a kind identifier with a constructor and short display
    /// name. Re-registering an existing kind is an error.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        short_name: impl Into<String>,
        constructor: FixtureConstructor,
    ) -> Result<(), RegistryError> {
        let kind = kind.into();
        if self.entries.contains_key(&kind) {
            return Err(RegistryError::AlreadyRegistered { kind });
        }
        self.entries.insert(
            kind,
            RegistryEntry {
                short_name: short_name.into(),
                constructor,
            },
        );
        Ok(())
    }

    /// Instantiate the fixture for `kind`.
    ///
    /// The fixture's logger is derived from `ctx.parent_logger` with the
    /// kind's short name merged into its attributes; composite constructors
    /// recursively call `create` for each embedded child specification.
    pub fn create(
        &self,
        kind: &str,
        ctx: &CreateContext,
        params: Value,
    ) -> Result<Arc<dyn Fixture>, FixtureError> {
        let entry = self
            .entries
            .get(kind)
            .ok_or_else(|| FixtureError::UnknownKind {
                kind: kind.to_string(),
            })?;

        let mut overrides = BTreeMap::new();
        overrides.insert("fixture".to_string(), Value::from(entry.short_name.clone()));
        let logger = ctx.parent_logger.child(entry.short_name.clone(), overrides);
        (entry.constructor)(self, ctx, logger, params)
    }

    /// Short display name for `kind`; pure lookup.
    pub fn short_name_for(&self, kind: &str) -> Result<&str, RegistryError> {
        self.entries
            .get(kind)
            .map(|entry| entry.short_name.as_str())
            .ok_or_else(|| RegistryError::UnknownKind {
                kind: kind.to_string(),
            })
    }

    /// Registered kind identifiers, sorted for stable output.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for FixtureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FixtureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
