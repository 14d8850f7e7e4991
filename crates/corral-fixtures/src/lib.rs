//! Disposable database test-topology fixtures.
//!
//! This crate provisions and supervises test topologies (a standalone node,
//! a replica set, a master/slave pair, a sharded cluster) behind one uniform
//! lifecycle contract: setup, readiness wait, teardown, plus a non-blocking
//! health query. Composites own child fixtures and implement
//! the contract by sequencing and aggregating child operations; every
//! fixture carries a contextual logger derived from its parent's, so records
//! stay attributable however deep the composition nests.
//!
//! Spawning individual OS processes and speaking the database wire protocol
//! are external collaborators, consumed through the [`process::ProcessDriver`]
//! and [`probe`] trait seams.
//!
//! # Example
//!
//! ```rust,ignore
//! use corral_fixtures::{Harness, FixtureSpec};
//! use serde_json::json;
//!
//! let harness = Harness::new(driver, probes);
//! let fixture = harness.create_fixture("replica_set", json!({
//!     "set_name": "rs0",
//!     "members": [
//!         {"kind": "standalone", "params": {"launch": {"program": "dbnode", "port": 27017}}},
//!         {"kind": "standalone", "params": {"launch": {"program": "dbnode", "port": 27018}}},
//!     ],
//! }))?;
//!
//! fixture.setup().await?;
//! fixture.await_ready(std::time::Duration::from_secs(60)).await?;
//! // run tests against the topology, then:
//! fixture.teardown(false).await?;
//! ```

pub mod error;
pub mod harness;
pub mod interface;
pub mod master_slave;
pub mod noop;
pub mod probe;
pub mod process;
pub mod registry;
pub mod replica_set;
pub mod sharded_cluster;
pub mod standalone;
pub mod state;
pub mod testing;

pub use error::{BoxError, FixtureError, RegistryError, TeardownFailure};
pub use harness::Harness;
pub use interface::Fixture;
pub use master_slave::{MasterSlaveFixture, MasterSlaveParams};
pub use noop::NoopFixture;
pub use probe::{ProbeFactory, ReadinessProbe, ReplicaSetControl};
pub use process::{LaunchSpec, ProcessDriver, ProcessError, ProcessHandle};
pub use registry::{
    CreateContext, FixtureConstructor, FixtureRegistry, FixtureSpec, NOOP_FIXTURE_KIND,
};
pub use replica_set::{ReplicaSetFixture, ReplicaSetParams};
pub use sharded_cluster::{ShardedClusterFixture, ShardedClusterParams};
pub use standalone::{StandaloneFixture, StandaloneParams};
pub use state::FixtureState;
