//! Error types for fixture lifecycle operations.

use std::time::Duration;

use thiserror::Error;

use crate::state::FixtureState;

/// Boxed error source used across collaborator seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from the registry surface itself.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Lookup miss; always a caller or configuration bug, never retried.
    #[error("unknown fixture kind '{kind}'")]
    UnknownKind { kind: String },

    /// A kind identifier was registered twice.
    #[error("fixture kind '{kind}' is already registered")]
    AlreadyRegistered { kind: String },
}

/// One child that failed to release cleanly during teardown.
///
/// Collected across all children rather than raised on the first failure, so
/// the caller always learns the full extent of leaked resources.
#[derive(Debug, Error)]
#[error("teardown of '{fixture}' failed")]
pub struct TeardownFailure {
    pub fixture: String,
    #[source]
    pub source: BoxError,
}

impl TeardownFailure {
    pub fn new(fixture: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            fixture: fixture.into(),
            source: source.into(),
        }
    }
}

/// Errors surfaced by the fixture lifecycle contract.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// Requested topology kind is not registered. No fixture and no process
    /// is created.
    #[error("unknown fixture kind '{kind}'")]
    UnknownKind { kind: String },

    /// A process failed to launch or a composite's child construction
    /// failed. Partially-started children are torn down before this
    /// surfaces.
    #[error("fixture '{fixture}' failed to start")]
    Startup {
        fixture: String,
        #[source]
        source: BoxError,
    },

    /// The readiness condition did not hold within the caller's budget, or
    /// the wait was cancelled by a concurrent teardown.
    #[error("fixture '{fixture}' did not become ready within {waited:?} (cancelled: {cancelled})")]
    Timeout {
        fixture: String,
        waited: Duration,
        cancelled: bool,
    },

    /// One or more children failed to release cleanly.
    #[error("fixture '{fixture}' teardown left {} failure(s)", .failures.len())]
    Teardown {
        fixture: String,
        failures: Vec<TeardownFailure>,
    },

    /// The operation is not legal from the fixture's current state.
    #[error("fixture '{fixture}' cannot {operation} while {from:?}")]
    InvalidState {
        fixture: String,
        from: FixtureState,
        operation: &'static str,
    },

    /// The parameter structure for this kind did not deserialize or failed
    /// validation. Surfaced before any process launches.
    #[error("invalid configuration for fixture '{fixture}'")]
    InvalidConfig {
        fixture: String,
        #[source]
        source: BoxError,
    },
}

impl FixtureError {
    pub fn startup(fixture: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Startup {
            fixture: fixture.into(),
            source: source.into(),
        }
    }

    pub fn timeout(fixture: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            fixture: fixture.into(),
            waited,
            cancelled: false,
        }
    }

    /// A readiness wait that was interrupted by teardown rather than by its
    /// own budget expiring.
    pub fn cancelled(fixture: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            fixture: fixture.into(),
            waited,
            cancelled: true,
        }
    }

    pub fn teardown(fixture: impl Into<String>, failures: Vec<TeardownFailure>) -> Self {
        Self::Teardown {
            fixture: fixture.into(),
            failures,
        }
    }

    pub fn invalid_state(
        fixture: impl Into<String>,
        from: FixtureState,
        operation: &'static str,
    ) -> Self {
        Self::InvalidState {
            fixture: fixture.into(),
            from,
            operation,
        }
    }

    pub fn invalid_config(fixture: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::InvalidConfig {
            fixture: fixture.into(),
            source: source.into(),
        }
    }

    /// Whether this is the cancellation flavor of a readiness-wait failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Timeout { cancelled: true, .. })
    }
}
