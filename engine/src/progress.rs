//! Progress reporting and event recording.
//!
//! The engine never talks to a UI directly. It writes to a [`StatusSink`]
//! owned by the caller and records structured [`Event`]s through an
//! [`EventLog`]. Both are called from worker threads, so implementations must
//! be `Send + Sync` and cheap.

use chrono::Local;

/// Receives progress from a running task.
pub trait StatusSink: Send + Sync {
    /// Latest status text plus the byte counters behind the percentage.
    fn report(&self, status: &str, moved_bytes: u64, total_bytes: u64);

    /// A line for the task log (already timestamped).
    fn task_log(&self, _line: &str) {}
}

/// A sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn report(&self, _status: &str, _moved_bytes: u64, _total_bytes: u64) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    /// Engine-wide faults not tied to a game
    Engine,
    /// Per-game file activity
    App,
    /// Library-level activity
    Library,
    /// Task lifecycle
    TaskManager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// A structured log entry. `context` identifies the game or task the message
/// is about and is resolved by the caller into plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub category: EventCategory,
    pub severity: Severity,
    pub message: String,
    pub context: String,
}

impl Event {
    pub fn new(
        category: EventCategory,
        severity: Severity,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event {
            category,
            severity,
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn info(category: EventCategory, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(category, Severity::Info, context, message)
    }

    pub fn warn(category: EventCategory, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(category, Severity::Warn, context, message)
    }

    pub fn error(category: EventCategory, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(category, Severity::Error, context, message)
    }
}

/// Records engine events.
pub trait EventLog: Send + Sync {
    fn record(&self, event: Event);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn record(&self, event: Event) {
        let category = format!("{:?}", event.category);
        match event.severity {
            Severity::Debug => {
                tracing::debug!(category = %category, context = %event.context, "{}", event.message)
            }
            Severity::Info => {
                tracing::info!(category = %category, context = %event.context, "{}", event.message)
            }
            Severity::Warn => {
                tracing::warn!(category = %category, context = %event.context, "{}", event.message)
            }
            Severity::Error => {
                tracing::error!(category = %category, context = %event.context, "{}", event.message)
            }
        }
    }
}

/// Prefix a task log line with the local wall-clock time.
pub fn timestamped(text: &str) -> String {
    format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), text)
}

/// Human-readable byte count (binary units).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures everything for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub reports: Mutex<Vec<(String, u64, u64)>>,
        pub lines: Mutex<Vec<String>>,
    }

    impl StatusSink for RecordingSink {
        fn report(&self, status: &str, moved_bytes: u64, total_bytes: u64) {
            self.reports
                .lock()
                .unwrap()
                .push((status.to_string(), moved_bytes, total_bytes));
        }

        fn task_log(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }

    #[derive(Debug, Default)]
    pub struct RecordingLog {
        pub events: Mutex<Vec<Event>>,
    }

    impl RecordingLog {
        pub fn count(&self, severity: Severity) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.severity == severity)
                .count()
        }
    }

    impl EventLog for RecordingLog {
        fn record(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(10), "10.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(50 * 1024 * 1024), "50.00 MB");
    }

    #[test]
    fn test_timestamped_prefix() {
        let line = timestamped("hello");
        assert!(line.starts_with('['));
        assert!(line.ends_with("] hello"));
    }

    #[test]
    fn test_event_constructors() {
        let event = Event::warn(EventCategory::App, "[G][1][m]", "locked");
        assert_eq!(event.severity, Severity::Warn);
        assert_eq!(event.context, "[G][1][m]");
        TracingEventLog.record(event);
    }
}
