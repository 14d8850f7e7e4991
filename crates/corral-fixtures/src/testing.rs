//! Scripted in-memory collaborators for driving fixtures in tests.
//!
//! These doubles stand in for the process driver and the wire-protocol
//! probes: launches are recorded instead of spawned, readiness is a flag the
//! test flips, elections resolve on request. The shared [`EventLog`] gives
//! tests a total order over launches, readiness observations, and
//! replica-set control calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::BoxError;
use crate::probe::{ProbeFactory, ReadinessProbe, ReplicaSetControl};
use crate::process::{LaunchSpec, ProcessDriver, ProcessError, ProcessHandle};

/// Ordered record of observable actions across all scripted collaborators.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Index of the first occurrence of `event`, if any.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == event)
    }
}

/// A recorded, never-spawned process.
#[derive(Debug)]
pub struct ScriptedHandle {
    port: u16,
    alive: AtomicBool,
    terminated: AtomicBool,
    forced: AtomicBool,
    fail_terminate: AtomicBool,
}

impl ScriptedHandle {
    fn new(port: u16) -> Self {
        Self {
            port,
            alive: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            forced: AtomicBool::new(false),
            fail_terminate: AtomicBool::new(false),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn was_forced(&self) -> bool {
        self.forced.load(Ordering::SeqCst)
    }

    /// Simulate the process dying on its own.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Make every subsequent terminate request fail, simulating a stuck
    /// process.
    pub fn fail_terminate(&self) {
        self.fail_terminate.store(true, Ordering::SeqCst);
    }
}

struct HandleRef(Arc<ScriptedHandle>);

#[async_trait]
impl ProcessHandle for HandleRef {
    fn is_alive(&self) -> bool {
        self.0.alive.load(Ordering::SeqCst)
    }

    async fn wait(&self, _timeout: Duration) -> Result<i32, ProcessError> {
        Ok(0)
    }

    async fn terminate(&self, force: bool) -> Result<(), ProcessError> {
        if self.0.fail_terminate.load(Ordering::SeqCst) {
            return Err(ProcessError::Terminate {
                source: std::io::Error::other("scripted terminate failure").into(),
            });
        }
        self.0.alive.store(false, Ordering::SeqCst);
        self.0.terminated.store(true, Ordering::SeqCst);
        if force {
            self.0.forced.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Process driver that records launches instead of spawning anything.
#[derive(Default)]
pub struct ScriptedDriver {
    launches: Mutex<Vec<u16>>,
    handles: Mutex<Vec<Arc<ScriptedHandle>>>,
    fail_ports: Mutex<HashSet<u16>>,
    events: EventLog,
}

impl ScriptedDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_events(events: EventLog) -> Arc<Self> {
        Arc::new(Self {
            events,
            ..Self::default()
        })
    }

    /// Make launching on `port` fail with a scripted error.
    pub fn fail_port(&self, port: u16) {
        self.fail_ports.lock().insert(port);
    }

    /// Let every port launch again.
    pub fn clear_failures(&self) {
        self.fail_ports.lock().clear();
    }

    /// Ports launched so far, in launch order.
    pub fn launched_ports(&self) -> Vec<u16> {
        self.launches.lock().clone()
    }

    pub fn handles(&self) -> Vec<Arc<ScriptedHandle>> {
        self.handles.lock().clone()
    }

    pub fn handle_for(&self, port: u16) -> Option<Arc<ScriptedHandle>> {
        self.handles.lock().iter().find(|h| h.port() == port).cloned()
    }
}

#[async_trait]
impl ProcessDriver for ScriptedDriver {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        self.events.push(format!("launch:{}", spec.port));
        if self.fail_ports.lock().contains(&spec.port) {
            return Err(ProcessError::Launch {
                program: spec.program.clone(),
                source: std::io::Error::other("scripted launch failure").into(),
            });
        }
        let handle = Arc::new(ScriptedHandle::new(spec.port));
        self.launches.lock().push(spec.port);
        self.handles.lock().push(handle.clone());
        Ok(Box::new(HandleRef(handle)))
    }
}

struct PortProbe {
    port: u16,
    flag: Arc<AtomicBool>,
    reported: AtomicBool,
    events: EventLog,
}

#[async_trait]
impl ReadinessProbe for PortProbe {
    async fn poll(&self) -> bool {
        let ready = self.flag.load(Ordering::SeqCst);
        if ready && !self.reported.swap(true, Ordering::SeqCst) {
            self.events.push(format!("ready:{}", self.port));
        }
        ready
    }
}

/// Scripted replica-set configuration and election.
pub struct ScriptedReplicaSetControl {
    set_name: String,
    applied: AtomicBool,
    polled: AtomicBool,
    primary: Mutex<Option<usize>>,
    auto_elect: bool,
    events: EventLog,
}

impl ScriptedReplicaSetControl {
    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    pub fn config_applied(&self) -> bool {
        self.applied.load(Ordering::SeqCst)
    }

    /// Complete a held election with `index` as primary.
    pub fn elect(&self, index: usize) {
        *self.primary.lock() = Some(index);
    }
}

#[async_trait]
impl ReplicaSetControl for ScriptedReplicaSetControl {
    async fn apply_config(&self) -> Result<(), BoxError> {
        self.applied.store(true, Ordering::SeqCst);
        self.events.push(format!("rs_config:{}", self.set_name));
        Ok(())
    }

    async fn primary(&self) -> Option<usize> {
        if !self.polled.swap(true, Ordering::SeqCst) {
            self.events.push(format!("primary_poll:{}", self.set_name));
        }
        if !self.applied.load(Ordering::SeqCst) {
            return None;
        }
        if let Some(primary) = *self.primary.lock() {
            return Some(primary);
        }
        if self.auto_elect {
            Some(0)
        } else {
            None
        }
    }
}

/// Probe factory over per-port readiness switches.
pub struct ScriptedProbes {
    ready: Mutex<HashMap<u16, Arc<AtomicBool>>>,
    default_ready: bool,
    held_elections: Mutex<HashSet<String>>,
    preset_primaries: Mutex<HashMap<String, usize>>,
    controls: Mutex<Vec<Arc<ScriptedReplicaSetControl>>>,
    events: EventLog,
}

impl ScriptedProbes {
    /// Every node reports ready on the first poll; elections resolve to
    /// member 0 once the configuration is applied.
    pub fn ready_immediately() -> Arc<Self> {
        Arc::new(Self::build(EventLog::new(), true))
    }

    /// Nodes start not-ready; tests flip them with [`Self::set_ready`].
    pub fn manual() -> Arc<Self> {
        Arc::new(Self::build(EventLog::new(), false))
    }

    pub fn with_events(events: EventLog, default_ready: bool) -> Arc<Self> {
        Arc::new(Self::build(events, default_ready))
    }

    fn build(events: EventLog, default_ready: bool) -> Self {
        Self {
            ready: Mutex::new(HashMap::new()),
            default_ready,
            held_elections: Mutex::new(HashSet::new()),
            preset_primaries: Mutex::new(HashMap::new()),
            controls: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn events(&self) -> EventLog {
        self.events.clone()
    }

    pub fn set_ready(&self, port: u16, ready: bool) {
        self.ready_flag(port).store(ready, Ordering::SeqCst);
    }

    /// Keep the named set's election unresolved until a control's `elect`
    /// call.
    pub fn hold_election(&self, set_name: impl Into<String>) {
        self.held_elections.lock().insert(set_name.into());
    }

    /// Pre-resolve the named set's election to `index`.
    pub fn set_primary(&self, set_name: impl Into<String>, index: usize) {
        self.preset_primaries.lock().insert(set_name.into(), index);
    }

    /// Controls handed out so far, in creation order.
    pub fn controls(&self) -> Vec<Arc<ScriptedReplicaSetControl>> {
        self.controls.lock().clone()
    }

    fn ready_flag(&self, port: u16) -> Arc<AtomicBool> {
        self.ready
            .lock()
            .entry(port)
            .or_insert_with(|| Arc::new(AtomicBool::new(self.default_ready)))
            .clone()
    }
}

impl ProbeFactory for ScriptedProbes {
    fn readiness_probe(&self, spec: &LaunchSpec) -> Arc<dyn ReadinessProbe> {
        Arc::new(PortProbe {
            port: spec.port,
            flag: self.ready_flag(spec.port),
            reported: AtomicBool::new(false),
            events: self.events.clone(),
        })
    }

    fn replica_set_control(&self, set_name: &str, _members: usize) -> Arc<dyn ReplicaSetControl> {
        let control = Arc::new(ScriptedReplicaSetControl {
            set_name: set_name.to_string(),
            applied: AtomicBool::new(false),
            polled: AtomicBool::new(false),
            primary: Mutex::new(self.preset_primaries.lock().get(set_name).copied()),
            auto_elect: !self.held_elections.lock().contains(set_name),
            events: self.events.clone(),
        });
        self.controls.lock().push(control.clone());
        control
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_driver_records_and_fails() {
        let driver = ScriptedDriver::new();
        driver.fail_port(27018);

        let ok = driver.launch(&LaunchSpec::new("dbnode", 27017)).await;
        assert!(ok.is_ok());
        let err = driver.launch(&LaunchSpec::new("dbnode", 27018)).await;
        assert!(err.is_err());

        assert_eq!(driver.launched_ports(), vec![27017]);
        assert!(driver.handle_for(27017).is_some());
        assert!(driver.handle_for(27018).is_none());
    }

    #[tokio::test]
    async fn test_scripted_probe_flips() {
        let probes = ScriptedProbes::manual();
        let probe = probes.readiness_probe(&LaunchSpec::new("dbnode", 27017));
        assert!(!probe.poll().await);

        probes.set_ready(27017, true);
        assert!(probe.poll().await);
        assert_eq!(probes.events().position("ready:27017"), Some(0));
    }

    #[tokio::test]
    async fn test_scripted_election_gates_on_config() {
        let probes = ScriptedProbes::ready_immediately();
        let control = probes.replica_set_control("shard0", 3);
        assert_eq!(control.primary().await, None);

        control.apply_config().await.unwrap();
        assert_eq!(control.primary().await, Some(0));
    }
}
