//! Hierarchical contextual logging for corral test topologies.
//!
//! Every component inside a topology gets a [`ContextLogger`] carrying an
//! inheritable mapping of structured attributes (which fixture, which node),
//! so records stay attributable as topologies nest. Child loggers copy their
//! parent's attributes at creation time and chain to the parent's sinks for
//! record propagation; they never share a live attribute map, so later
//! mutation of a parent cannot retroactively alter a child.
//!
//! Severity is fixed to capture-everything at the logger level. Filtering to
//! a human-visible threshold is the concern of attached [`LogSink`]s.

pub mod logger;
pub mod record;
pub mod roots;
pub mod sink;

pub use logger::ContextLogger;
pub use record::{LogLevel, LogRecord};
pub use roots::{
    TopLevelLoggers, EXECUTOR_LOGGER_NAME, FALLBACK_LOGGER_NAME, FIXTURE_LOGGER_NAME,
    TESTS_LOGGER_NAME,
};
pub use sink::{BufferSink, LogSink, TracingSink};
