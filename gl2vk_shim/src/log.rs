//! Diagnostics for the shim
//!
//! Every component reports through one global `Logger`: the facade on the
//! caller's thread, the recording nodes on their own threads and the
//! backends wherever they are called from. Entries carry a severity, a
//! `gl2vk::*` source tag and, for errors, the `file:line` that raised them.
//!
//! Protocol misuse and liveness problems are warnings; only fatal backend
//! failures are errors.

use colored::*;
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Destination for shim diagnostics
///
/// Called concurrently from the recording nodes, hence `Send + Sync`.
///
/// # Example
///
/// ```no_run
/// use gl2vk_shim::gl2vk::log::{Logger, LogEntry, LogSeverity};
///
/// /// Forwards only failures to the host's own reporting
/// struct HostLogger;
///
/// impl Logger for HostLogger {
///     fn log(&self, entry: &LogEntry) {
///         if entry.severity >= LogSeverity::Warn {
///             eprintln!("{}: {}", entry.source, entry.message);
///         }
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

/// One diagnostic record
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: LogSeverity,

    /// Wall-clock time the record was produced
    pub timestamp: SystemTime,

    /// Component tag, e.g. "gl2vk::CommandNode" or "gl2vk::vulkan"
    pub source: String,

    pub message: String,

    /// Raising file, set by `shim_error!` / `shim_err!`
    pub file: Option<&'static str>,

    /// Raising line, set with `file`
    pub line: Option<u32>,
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    /// Per-command tracing (very verbose)
    Trace,

    Debug,

    /// Lifecycle events (startup, shutdown, pipeline creation)
    Info,

    /// Recoverable problems: protocol misuse, liveness warnings
    Warn,

    /// Fatal backend errors (with file:line details)
    Error,
}

/// Name shown for the thread a record was logged from
///
/// Recording nodes are named `gl2vk-node-N`; unnamed threads show their id.
pub fn thread_label() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}

/// Colored console logger
///
/// Lines read `[time] [SEVERITY] [thread] [source] message`, with
/// `(file:line)` appended when known. Warnings and errors go to stderr,
/// everything else to stdout.
pub struct DefaultLogger;

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let time: DateTime<Local> = entry.timestamp.into();
        let time = time.format("%H:%M:%S%.3f");

        let tag = match entry.severity {
            LogSeverity::Trace => "TRACE".bright_black(),
            LogSeverity::Debug => "DEBUG".cyan(),
            LogSeverity::Info => "INFO ".green(),
            LogSeverity::Warn => "WARN ".yellow(),
            LogSeverity::Error => "ERROR".red().bold(),
        };

        let mut line = format!(
            "[{}] [{}] [{}] [{}] {}",
            time,
            tag,
            thread_label().dimmed(),
            entry.source.bright_blue(),
            entry.message
        );
        if let (Some(file), Some(line_number)) = (entry.file, entry.line) {
            line.push_str(&format!(" ({}:{})", file, line_number));
        }

        if entry.severity >= LogSeverity::Warn {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

// ===== LOGGING MACROS =====

/// Log a TRACE message (one line per recorded command)
///
/// # Example
///
/// ```ignore
/// shim_trace!("gl2vk::Node", "node {} executing {:?}", id, op);
/// ```
#[macro_export]
macro_rules! shim_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::gl2vk::Shim::log(
            $crate::gl2vk::log::LogSeverity::Trace,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a DEBUG message
#[macro_export]
macro_rules! shim_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::gl2vk::Shim::log(
            $crate::gl2vk::log::LogSeverity::Debug,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an INFO message (node and pipeline lifecycle)
#[macro_export]
macro_rules! shim_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::gl2vk::Shim::log(
            $crate::gl2vk::log::LogSeverity::Info,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a WARN message (misuse, stalls, stale surfaces)
#[macro_export]
macro_rules! shim_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::gl2vk::Shim::log(
            $crate::gl2vk::log::LogSeverity::Warn,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an ERROR message tagged with the caller's file:line
#[macro_export]
macro_rules! shim_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::gl2vk::Shim::log_detailed(
            $crate::gl2vk::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

/// Log an ERROR message and build the matching `Error::BackendError`
///
/// # Example
///
/// ```ignore
/// let pool = device.create_command_pool(&info, None)
///     .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to create command pool: {:?}", e))?;
/// ```
#[macro_export]
macro_rules! shim_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::gl2vk::Shim::log_detailed(
            $crate::gl2vk::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        $crate::gl2vk::Error::BackendError(message)
    }};
}

/// Log an ERROR message and return `Err(Error::BackendError)` from the caller
#[macro_export]
macro_rules! shim_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::shim_err!($source, $($arg)*))
    };
}

/// Log a non-fatal error as a WARN and evaluate to it
///
/// Used for protocol misuse and missing resources: the offending call
/// becomes a no-op, the caller still receives the error.
///
/// # Example
///
/// ```ignore
/// return Err(shim_warn_err!("gl2vk::Frontend", Error::ProtocolMisuse("no frame".to_string())));
/// ```
#[macro_export]
macro_rules! shim_warn_err {
    ($source:expr, $error:expr) => {{
        let error: $crate::gl2vk::Error = $error;
        $crate::gl2vk::Shim::log(
            $crate::gl2vk::log::LogSeverity::Warn,
            $source,
            error.to_string()
        );
        error
    }};
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
