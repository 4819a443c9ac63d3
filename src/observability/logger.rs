//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` key first, then `severity`, then fields alphabetically
//! - Synchronous writes, errors to stderr

use std::fmt::{self, Write as _};
use std::io::{self, Write};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Normal operations
    Info = 0,
    /// Recoverable issues
    Warn = 1,
    /// Operation failures
    Error = 2,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append `"text"` with JSON string escaping. Keys and values go
/// through the same path, so a field name is as safe as its value.
fn push_escaped(line: &mut String, text: &str) {
    line.push('"');
    for c in text.chars() {
        match c {
            '"' | '\\' => {
                line.push('\\');
                line.push(c);
            }
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            '\t' => line.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(line, "\\u{:04x}", c as u32);
            }
            c => line.push(c),
        }
    }
    line.push('"');
}

/// Append one `"key":"value"` pair, opening the object on first use
fn push_pair(line: &mut String, key: &str, value: &str) {
    line.push(if line.is_empty() { '{' } else { ',' });
    push_escaped(line, key);
    line.push(':');
    push_escaped(line, value);
}

/// One event as a JSON line, `event` first, fields sorted by key
fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut sorted = fields.to_vec();
    sorted.sort_by_key(|&(key, _)| key);

    let mut line = String::new();
    push_pair(&mut line, "event", event);
    push_pair(&mut line, "severity", severity.as_str());
    for (key, value) in sorted {
        push_pair(&mut line, key, value);
    }
    line.push('}');
    line.push('\n');
    line
}

/// A structured logger that outputs JSON lines
pub struct Logger;

impl Logger {
    /// Log an event with the given severity and fields
    ///
    /// Fields are output in deterministic order (alphabetical by key)
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let line = render(severity, event, fields);
        // One write_all per event; the trailing newline flushes the
        // line-buffered stdout, stderr is unbuffered
        if severity == Severity::Error {
            let _ = io::stderr().write_all(line.as_bytes());
        } else {
            let _ = io::stdout().write_all(line.as_bytes());
        }
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}
