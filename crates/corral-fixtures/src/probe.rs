//! Readiness-observation collaborator seams.
//!
//! Wire-protocol knowledge (what "accepts connections" means, how a replica
//! set's configuration is applied, how an election is observed) lives behind
//! these traits; the fixture layer only sequences and aggregates.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::process::LaunchSpec;

/// Observes whether one node accepts connections.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// One non-blocking-ish observation; the fixture supplies the polling
    /// cadence and the budget.
    async fn poll(&self) -> bool;
}

/// Replica-set configuration and election observation.
#[async_trait]
pub trait ReplicaSetControl: Send + Sync {
    /// Apply the replica-set configuration to the reachable members.
    async fn apply_config(&self) -> Result<(), BoxError>;

    /// Index of the currently elected primary, if any.
    async fn primary(&self) -> Option<usize>;
}

/// Supplies probes and controls for the nodes of a topology.
///
/// Implemented by the embedding test runner; scripted implementations live
/// in [`crate::testing`].
pub trait ProbeFactory: Send + Sync {
    fn readiness_probe(&self, spec: &LaunchSpec) -> Arc<dyn ReadinessProbe>;

    fn replica_set_control(&self, set_name: &str, members: usize) -> Arc<dyn ReplicaSetControl>;
}
