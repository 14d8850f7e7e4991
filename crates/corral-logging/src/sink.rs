//! Output sinks for structured records.

use parking_lot::Mutex;

use crate::record::{LogLevel, LogRecord};

/// Receiver of structured records.
///
/// A sink attached to a logger sees every record emitted by that logger or
/// any of its descendants. Severity filtering happens here, not in the
/// logger: `enabled` defaults to accepting everything.
pub trait LogSink: Send + Sync {
    /// Whether this sink wants records at `level`.
    fn enabled(&self, _level: LogLevel) -> bool {
        true
    }

    /// Deliver one record. Must not block for long; remote shipping belongs
    /// behind a channel, not in this call.
    fn emit(&self, record: &LogRecord);
}

/// Sink that forwards records into the `tracing` pipeline, preserving the
/// emitting logger's name and structured fields.
#[derive(Debug, Default)]
pub struct TracingSink {
    threshold: Option<LogLevel>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self { threshold: None }
    }

    /// Only forward records at or above `level`.
    pub fn with_threshold(level: LogLevel) -> Self {
        Self {
            threshold: Some(level),
        }
    }
}

impl LogSink for TracingSink {
    fn enabled(&self, level: LogLevel) -> bool {
        self.threshold.map(|t| level >= t).unwrap_or(true)
    }

    fn emit(&self, record: &LogRecord) {
        let fields = serde_json::Value::Object(
            record
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        match record.level {
            LogLevel::Trace => {
                tracing::trace!(target: "corral", logger = %record.logger, fields = %fields, "{}", record.message);
            }
            LogLevel::Debug => {
                tracing::debug!(target: "corral", logger = %record.logger, fields = %fields, "{}", record.message);
            }
            LogLevel::Info => {
                tracing::info!(target: "corral", logger = %record.logger, fields = %fields, "{}", record.message);
            }
            LogLevel::Warn => {
                tracing::warn!(target: "corral", logger = %record.logger, fields = %fields, "{}", record.message);
            }
            LogLevel::Error => {
                tracing::error!(target: "corral", logger = %record.logger, fields = %fields, "{}", record.message);
            }
        }
    }
}

/// In-memory sink that captures records in emission order.
///
/// Used by tests and by record consumers that want to inspect the stream
/// without attaching an external handler.
#[derive(Debug, Default)]
pub struct BufferSink {
    threshold: Option<LogLevel>,
    records: Mutex<Vec<LogRecord>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only capture records at or above `level`.
    pub fn with_threshold(level: LogLevel) -> Self {
        Self {
            threshold: Some(level),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of everything captured so far, in emission order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl LogSink for BufferSink {
    fn enabled(&self, level: LogLevel) -> bool {
        self.threshold.map(|t| level >= t).unwrap_or(true)
    }

    fn emit(&self, record: &LogRecord) {
        self.records.lock().push(record.clone());
    }
}
