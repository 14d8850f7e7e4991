//! Structured log records and severity levels.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// Severity of a log record.
///
/// Loggers themselves do not filter by level; sinks do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lowercase name of the level, as it appears in rendered output.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emitted record: message plus the full effective attribute mapping of
/// the logger that emitted it.
///
/// Attributes travel as structured fields, not as message text, so a
/// downstream consumer can filter or group by any attribute (fixture name,
/// node port, test name) without parsing strings.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Name of the emitting logger.
    pub logger: String,
    pub level: LogLevel,
    pub message: String,
    /// Effective attribute mapping at emission time.
    pub fields: BTreeMap<String, Value>,
}

impl LogRecord {
    /// Convenience accessor for a string-valued field.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Convenience accessor for an integer-valued field.
    pub fn field_u64(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(Value::as_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_field_accessors() {
        let mut fields = BTreeMap::new();
        fields.insert("fixture".to_string(), Value::from("rs"));
        fields.insert("port".to_string(), Value::from(27017u64));
        let record = LogRecord {
            logger: "node".to_string(),
            level: LogLevel::Info,
            message: "ready".to_string(),
            fields,
        };

        assert_eq!(record.field_str("fixture"), Some("rs"));
        assert_eq!(record.field_u64("port"), Some(27017));
        assert_eq!(record.field_str("missing"), None);
    }
}
