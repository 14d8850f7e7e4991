//! Context-carrying loggers with copy-on-create attribute inheritance.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::record::{LogLevel, LogRecord};
use crate::sink::LogSink;

/// A logger carrying an inheritable mapping of context attributes.
///
/// A child logger's effective attribute set is the parent's attributes at
/// creation time, overlaid with the overrides supplied at child creation;
/// keys in the override always win. The attribute map is copied, never
/// aliased, so mutating the parent afterwards does not change the child.
///
/// Records emitted through a child are offered to the child's own sinks and
/// then to every ancestor's sinks (handler chaining). The parent reference is
/// shared for propagation only; it carries no lifecycle control.
pub struct ContextLogger {
    name: String,
    extra: RwLock<BTreeMap<String, Value>>,
    parent: Option<Arc<ContextLogger>>,
    sinks: RwLock<Vec<Arc<dyn LogSink>>>,
}

impl ContextLogger {
    /// Create a top-level logger with no parent and no attributes.
    pub fn root(name: impl Into<String>) -> Arc<Self> {
        Self::root_with(name, BTreeMap::new())
    }

    /// Create a top-level logger with an initial attribute mapping.
    pub fn root_with(name: impl Into<String>, extra: BTreeMap<String, Value>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            extra: RwLock::new(extra),
            parent: None,
            sinks: RwLock::new(Vec::new()),
        })
    }

    /// Derive a child logger from this one.
    ///
    /// The child's attributes are this logger's current attributes overlaid
    /// with `overrides`; the child propagates its records to this logger's
    /// sinks but does not copy the sink list. Construction never fails.
    pub fn child(
        self: &Arc<Self>,
        name: impl Into<String>,
        overrides: BTreeMap<String, Value>,
    ) -> Arc<Self> {
        let mut extra = self.extra.read().clone();
        extra.extend(overrides);
        Arc::new(Self {
            name: name.into(),
            extra: RwLock::new(extra),
            parent: Some(Arc::clone(self)),
            sinks: RwLock::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the effective attribute mapping.
    pub fn extra(&self) -> BTreeMap<String, Value> {
        self.extra.read().clone()
    }

    /// Set one attribute on this logger.
    ///
    /// Only affects this logger and children created afterwards; existing
    /// children keep the attributes they copied at creation.
    pub fn set_attr(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.extra.write().insert(key.into(), value.into());
    }

    /// Attach an output sink. Sinks attached to a logger also see records
    /// emitted through any of its descendants.
    pub fn attach_sink(&self, sink: Arc<dyn LogSink>) {
        self.sinks.write().push(sink);
    }

    /// Emit a record at the given level.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_with(level, message, BTreeMap::new());
    }

    /// Emit a record with one-off extra fields merged over the logger's
    /// attributes for this record only.
    pub fn log_with(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        fields: BTreeMap<String, Value>,
    ) {
        let mut effective = self.extra.read().clone();
        effective.extend(fields);
        let record = LogRecord {
            logger: self.name.clone(),
            level,
            message: message.into(),
            fields: effective,
        };
        self.dispatch(&record);
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    // Offer the record to this logger's sinks, then walk the parent chain.
    fn dispatch(&self, record: &LogRecord) {
        for sink in self.sinks.read().iter() {
            if sink.enabled(record.level) {
                sink.emit(record);
            }
        }
        let mut current = self.parent.clone();
        while let Some(logger) = current {
            for sink in logger.sinks.read().iter() {
                if sink.enabled(record.level) {
                    sink.emit(record);
                }
            }
            current = logger.parent.clone();
        }
    }
}

impl std::fmt::Debug for ContextLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLogger")
            .field("name", &self.name)
            .field("extra", &*self.extra.read())
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferSink;

    fn attrs(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_child_inherits_and_overrides() {
        let parent = ContextLogger::root_with(
            "fixture",
            attrs(&[("a", Value::from(0)), ("b", Value::from(2))]),
        );
        let child = parent.child("node", attrs(&[("a", Value::from(1))]));

        let effective = child.extra();
        assert_eq!(effective.get("a"), Some(&Value::from(1)));
        assert_eq!(effective.get("b"), Some(&Value::from(2)));
    }

    #[test]
    fn test_parent_mutation_is_not_retroactive() {
        let parent = ContextLogger::root_with("fixture", attrs(&[("a", Value::from(0))]));
        let child = parent.child("node", BTreeMap::new());

        parent.set_attr("a", Value::from(99));
        parent.set_attr("late", Value::from(true));

        let effective = child.extra();
        assert_eq!(effective.get("a"), Some(&Value::from(0)));
        assert!(!effective.contains_key("late"));

        // A child created after the mutation sees the new values.
        let later = parent.child("node2", BTreeMap::new());
        assert_eq!(later.extra().get("a"), Some(&Value::from(99)));
    }

    #[test]
    fn test_records_propagate_to_ancestor_sinks() {
        let root = ContextLogger::root("fixture");
        let buffer = Arc::new(BufferSink::new());
        root.attach_sink(buffer.clone());

        let child = root.child("rs", attrs(&[("fixture", Value::from("rs"))]));
        let grandchild = child.child("node", attrs(&[("port", Value::from(27017))]));
        grandchild.info("ready");

        let records = buffer.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].logger, "node");
        assert_eq!(records[0].field_str("fixture"), Some("rs"));
        assert_eq!(records[0].field_u64("port"), Some(27017));
    }

    #[test]
    fn test_child_does_not_copy_parent_sinks() {
        let root = ContextLogger::root("fixture");
        let child = root.child("node", BTreeMap::new());

        let child_buffer = Arc::new(BufferSink::new());
        child.attach_sink(child_buffer.clone());

        // Records emitted on the parent do not reach the child's sink.
        root.info("parent only");
        assert!(child_buffer.records().is_empty());

        child.info("child");
        assert_eq!(child_buffer.records().len(), 1);
    }

    #[test]
    fn test_one_off_fields_do_not_stick() {
        let logger = ContextLogger::root("fixture");
        let buffer = Arc::new(BufferSink::new());
        logger.attach_sink(buffer.clone());

        logger.log_with(
            LogLevel::Warn,
            "child failed",
            attrs(&[("child", Value::from("node"))]),
        );
        logger.info("next");

        let records = buffer.records();
        assert_eq!(records[0].field_str("child"), Some("node"));
        assert!(!records[1].fields.contains_key("child"));
    }
}
