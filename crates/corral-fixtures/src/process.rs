//! The process-driver collaborator seam.
//!
//! Spawning and supervising individual OS processes is an external concern.
//! The fixture layer consumes a [`ProcessDriver`] that, given a launch
//! specification, returns an opaque [`ProcessHandle`]; it never inspects
//! process internals beyond these calls.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::BoxError;

/// Already-parsed launch parameters for one node.
///
/// `port` doubles as the node's identity attribute on its logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub port: u16,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>, port: u16) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            port,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Errors from the process driver.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch '{program}'")]
    Launch {
        program: String,
        #[source]
        source: BoxError,
    },

    #[error("process did not exit within {waited:?}")]
    WaitTimeout { waited: Duration },

    #[error("failed to terminate process")]
    Terminate {
        #[source]
        source: BoxError,
    },
}

/// Launches processes on behalf of fixtures.
#[async_trait]
pub trait ProcessDriver: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>, ProcessError>;
}

/// Handle to one running process.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Whether the process is still running, as of the last observation.
    fn is_alive(&self) -> bool;

    /// Wait for the process to exit, returning its exit code.
    async fn wait(&self, timeout: Duration) -> Result<i32, ProcessError>;

    /// Stop the process: a graceful shutdown request, or a kill signal when
    /// `force` is set.
    async fn terminate(&self, force: bool) -> Result<(), ProcessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_spec_builder() {
        let spec = LaunchSpec::new("dbnode", 27017)
            .with_args(vec!["--quiet".to_string()])
            .with_working_dir("/tmp/node0")
            .with_env("DB_LOG", "debug");

        assert_eq!(spec.program, "dbnode");
        assert_eq!(spec.port, 27017);
        assert_eq!(spec.args, vec!["--quiet".to_string()]);
        assert_eq!(spec.env.get("DB_LOG").map(String::as_str), Some("debug"));
    }

    #[test]
    fn test_launch_spec_deserializes_with_defaults() {
        let spec: LaunchSpec =
            serde_json::from_value(serde_json::json!({"program": "dbnode", "port": 27017}))
                .unwrap();
        assert!(spec.args.is_empty());
        assert!(spec.working_dir.is_none());
        assert!(spec.env.is_empty());
    }
}
