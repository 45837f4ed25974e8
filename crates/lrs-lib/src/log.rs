//! Log collaborator for route update runs
//!
//! The core reports what it did through a [`LogSink`]. It never formats or persists logs
//! itself; [`RunLog`] keeps the entries of one run in memory and mirrors them to `tracing`.

use std::fmt;

/// Severity of a log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    Inform,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Inform => "INFORM",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        })
    }
}

/// Receiver of log messages emitted during validation and synchronization
pub trait LogSink {
    fn log(&mut self, severity: Severity, message: &str);

    fn inform(&mut self, message: &str) {
        self.log(Severity::Inform, message);
    }

    fn warning(&mut self, message: &str) {
        self.log(Severity::Warning, message);
    }

    fn error(&mut self, message: &str) {
        self.log(Severity::Error, message);
    }
}

#[inline]
fn emit(severity: Severity, message: &str) {
    match severity {
        Severity::Inform => tracing::info!(target: "lrs", "{message}"),
        Severity::Warning => tracing::warn!(target: "lrs", "{message}"),
        Severity::Error => tracing::error!(target: "lrs", "{message}"),
    }
}

/// Sink that only forwards to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log(&mut self, severity: Severity, message: &str) {
        emit(severity, message);
    }
}

/// A single recorded message
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
}

/// In-memory log of one run with warning and error counters
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunLog {
    entries: Vec<LogEntry>,
    warnings: usize,
    errors: usize,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[inline]
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    #[inline]
    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Whether any entry contains `needle` at the given severity
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity == severity && entry.message.contains(needle))
    }

    /// One line summary, e.g. `Warnings: 0 / Errors: 2`
    pub fn summary(&self) -> String {
        format!("Warnings: {} / Errors: {}", self.warnings, self.errors)
    }
}

impl LogSink for RunLog {
    fn log(&mut self, severity: Severity, message: &str) {
        emit(severity, message);
        match severity {
            Severity::Warning => self.warnings += 1,
            Severity::Error => self.errors += 1,
            Severity::Inform => {}
        }
        self.entries.push(LogEntry {
            severity,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_log_counts() {
        let mut log = RunLog::new();
        log.inform("route inserted");
        log.warning("suspicious");
        log.error("broken");
        log.error("broken again");
        assert_eq!(log.entries().len(), 4);
        assert_eq!(log.warnings(), 1);
        assert_eq!(log.errors(), 2);
        assert_eq!(log.summary(), "Warnings: 1 / Errors: 2");
        assert!(log.contains(Severity::Error, "again"));
        assert!(!log.contains(Severity::Inform, "broken"));
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Inform.to_string(), "INFORM");
        assert_eq!(Severity::Error.to_string(), "ERROR");
    }
}
