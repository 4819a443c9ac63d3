//! Observability for aquaserver
//!
//! Structured JSON logs, one line per event. The coordinator also keeps
//! a `lastErrorString` sink surfaced through `/aquaserver/status`; the
//! logger here is the stdout/stderr side of the same events.

mod logger;

pub use logger::{Logger, Severity};
