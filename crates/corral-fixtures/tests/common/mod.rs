//! Shared rig for integration tests: a harness wired to scripted
//! collaborators that share one event log.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};

use corral_fixtures::testing::{EventLog, ScriptedDriver, ScriptedProbes};
use corral_fixtures::Harness;
use corral_logging::TracingSink;

pub struct Rig {
    pub harness: Harness,
    pub driver: Arc<ScriptedDriver>,
    pub probes: Arc<ScriptedProbes>,
    pub events: EventLog,
}

fn rig(default_ready: bool) -> Rig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "corral=warn".into()),
        )
        .try_init();

    let events = EventLog::new();
    let driver = ScriptedDriver::with_events(events.clone());
    let probes = ScriptedProbes::with_events(events.clone(), default_ready);
    let harness = Harness::new(driver.clone(), probes.clone());
    // Fixture records also flow into the tracing pipeline, visible with
    // --nocapture.
    harness.loggers().fixture().attach_sink(Arc::new(TracingSink::new()));
    Rig {
        harness,
        driver,
        probes,
        events,
    }
}

/// Every node reports ready on its first probe poll.
pub fn rig_ready() -> Rig {
    rig(true)
}

/// Nodes stay not-ready until the test flips them.
pub fn rig_manual() -> Rig {
    rig(false)
}

pub fn standalone_params(port: u16) -> Value {
    json!({"launch": {"program": "dbnode", "port": port}})
}

pub fn standalone_spec(port: u16) -> Value {
    json!({"kind": "standalone", "params": standalone_params(port)})
}

pub fn replica_set_params(set_name: &str, ports: &[u16]) -> Value {
    json!({
        "set_name": set_name,
        "members": ports.iter().map(|p| standalone_spec(*p)).collect::<Vec<_>>(),
    })
}

pub fn replica_set_spec(set_name: &str, ports: &[u16]) -> Value {
    json!({"kind": "replica_set", "params": replica_set_params(set_name, ports)})
}
