//! The well-known top-level loggers.
//!
//! Three roots exist for the lifetime of the process: one for the
//! test-execution orchestrator, one for fixtures, one for test bodies. Every
//! other logger is a descendant of one of these, directly or transitively.
//! They are created by one explicit constructor; there is no import-time
//! side effect and no module-global instance.

use std::sync::Arc;

use crate::logger::ContextLogger;

pub const EXECUTOR_LOGGER_NAME: &str = "executor";
pub const FIXTURE_LOGGER_NAME: &str = "fixture";
pub const TESTS_LOGGER_NAME: &str = "tests";
pub const FALLBACK_LOGGER_NAME: &str = "fallback";

/// The process-lifetime logger roots.
///
/// `fallback` receives records when a remote shipping handler is unavailable;
/// it is not a parent of anything.
#[derive(Debug)]
pub struct TopLevelLoggers {
    executor: Arc<ContextLogger>,
    fixture: Arc<ContextLogger>,
    tests: Arc<ContextLogger>,
    fallback: Arc<ContextLogger>,
}

impl TopLevelLoggers {
    pub fn new() -> Self {
        Self {
            executor: ContextLogger::root(EXECUTOR_LOGGER_NAME),
            fixture: ContextLogger::root(FIXTURE_LOGGER_NAME),
            tests: ContextLogger::root(TESTS_LOGGER_NAME),
            fallback: ContextLogger::root(FALLBACK_LOGGER_NAME),
        }
    }

    pub fn executor(&self) -> &Arc<ContextLogger> {
        &self.executor
    }

    pub fn fixture(&self) -> &Arc<ContextLogger> {
        &self.fixture
    }

    pub fn tests(&self) -> &Arc<ContextLogger> {
        &self.tests
    }

    pub fn fallback(&self) -> &Arc<ContextLogger> {
        &self.fallback
    }

    /// Look up a top-level logger by its well-known name.
    pub fn by_name(&self, name: &str) -> Option<&Arc<ContextLogger>> {
        match name {
            EXECUTOR_LOGGER_NAME => Some(&self.executor),
            FIXTURE_LOGGER_NAME => Some(&self.fixture),
            TESTS_LOGGER_NAME => Some(&self.tests),
            FALLBACK_LOGGER_NAME => Some(&self.fallback),
            _ => None,
        }
    }
}

impl Default for TopLevelLoggers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name_resolves_all_roots() {
        let loggers = TopLevelLoggers::new();
        for name in [
            EXECUTOR_LOGGER_NAME,
            FIXTURE_LOGGER_NAME,
            TESTS_LOGGER_NAME,
            FALLBACK_LOGGER_NAME,
        ] {
            let logger = loggers.by_name(name).unwrap();
            assert_eq!(logger.name(), name);
        }
        assert!(loggers.by_name("nope").is_none());
    }

    #[test]
    fn test_roots_start_without_attributes() {
        let loggers = TopLevelLoggers::new();
        assert!(loggers.fixture().extra().is_empty());
    }
}
