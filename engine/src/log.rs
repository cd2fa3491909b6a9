// log.rs — Logging collaborator
//
// The engine never decides where diagnostics go. It reports outcomes to an
// injected `LogSink`; `TracingLog` forwards them to `tracing`.

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Severity levels, least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{name}")
    }
}

/// One diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub severity: Severity,
    /// Block instance that produced the event.
    pub component: String,
    /// Argument being set, if any.
    pub argument: Option<String>,
    pub message: String,
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] [{}]", self.severity, self.component)?;
        if let Some(arg) = &self.argument {
            write!(f, " [{}]", arg)?;
        }
        write!(f, " {}", self.message)
    }
}

pub trait LogSink: Send + Sync {
    fn log(&self, event: LogEvent);

    /// Lets callers skip building events nobody will see.
    fn enabled(&self, _severity: Severity) -> bool {
        true
    }
}

/// Forwards events to the `tracing` dispatcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log(&self, event: LogEvent) {
        let block = event.component.as_str();
        let arg = event.argument.as_deref().unwrap_or("");
        let message = event.message.as_str();
        match event.severity {
            Severity::Trace => tracing::trace!(block, arg, "{}", message),
            Severity::Debug => tracing::debug!(block, arg, "{}", message),
            Severity::Info => tracing::info!(block, arg, "{}", message),
            Severity::Warning => tracing::warn!(block, arg, "{}", message),
            Severity::Error | Severity::Fatal => tracing::error!(block, arg, "{}", message),
        }
    }

    fn enabled(&self, severity: Severity) -> bool {
        match severity {
            Severity::Trace => tracing::enabled!(tracing::Level::TRACE),
            Severity::Debug => tracing::enabled!(tracing::Level::DEBUG),
            _ => true,
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl LogSink for NullLog {
    fn log(&self, _event: LogEvent) {}

    fn enabled(&self, _severity: Severity) -> bool {
        false
    }
}

/// Keeps events at or above a threshold in memory.
#[derive(Debug)]
pub struct MemoryLog {
    threshold: Severity,
    events: Mutex<Vec<LogEvent>>,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new(Severity::Info)
    }
}

impl MemoryLog {
    pub fn new(threshold: Severity) -> Self {
        MemoryLog {
            threshold,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemoryLog {
    fn log(&self, event: LogEvent) {
        if event.severity >= self.threshold {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
        }
    }

    fn enabled(&self, severity: Severity) -> bool {
        severity >= self.threshold
    }
}
