//! Unit tests for log.rs

use crate::log::{thread_label, DefaultLogger, LogEntry, LogSeverity, Logger};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::SystemTime;

fn record(severity: LogSeverity, location: Option<(&'static str, u32)>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "gl2vk::CommandNode".to_string(),
        message: "node 2 skipped EndRecording".to_string(),
        file: location.map(|(file, _)| file),
        line: location.map(|(_, line)| line),
    }
}

/// Keeps the sources and thread labels it was called with
struct Capture(Mutex<Vec<(String, String)>>);

impl Logger for Capture {
    fn log(&self, entry: &LogEntry) {
        self.0.lock().unwrap().push((entry.source.clone(), thread_label()));
    }
}

// ============================================================================
// SEVERITY
// ============================================================================

#[test]
fn test_warn_and_error_rank_above_lifecycle_levels() {
    let mut levels = vec![
        LogSeverity::Error,
        LogSeverity::Info,
        LogSeverity::Trace,
        LogSeverity::Warn,
        LogSeverity::Debug,
    ];
    levels.sort();
    assert_eq!(
        levels,
        vec![
            LogSeverity::Trace,
            LogSeverity::Debug,
            LogSeverity::Info,
            LogSeverity::Warn,
            LogSeverity::Error,
        ]
    );
    assert!(LogSeverity::Warn >= LogSeverity::Warn);
    assert!(LogSeverity::Info < LogSeverity::Warn);
}

// ============================================================================
// ENTRIES
// ============================================================================

#[test]
fn test_entry_location_is_optional() {
    let located = record(LogSeverity::Error, Some(("vulkan_backend.rs", 42)));
    assert_eq!(located.file, Some("vulkan_backend.rs"));
    assert_eq!(located.line, Some(42));

    let plain = record(LogSeverity::Warn, None).clone();
    assert_eq!(plain.source, "gl2vk::CommandNode");
    assert!(plain.file.is_none() && plain.line.is_none());
}

// ============================================================================
// THREAD LABELS
// ============================================================================

#[test]
fn test_thread_label_uses_thread_name() {
    let label = thread::Builder::new()
        .name("gl2vk-node-3".to_string())
        .spawn(thread_label)
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(label, "gl2vk-node-3");
}

#[test]
fn test_thread_label_falls_back_to_thread_id() {
    let label = thread::Builder::new().spawn(thread_label).unwrap().join().unwrap();
    assert!(label.starts_with("ThreadId("), "{}", label);
}

#[test]
fn test_logger_is_usable_from_worker_threads() {
    let capture = Arc::new(Capture(Mutex::new(Vec::new())));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let capture = Arc::clone(&capture);
            thread::Builder::new()
                .name(format!("gl2vk-node-{}", i))
                .spawn(move || capture.log(&record(LogSeverity::Warn, None)))
                .unwrap()
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut labels: Vec<String> = capture.0.lock().unwrap().iter().map(|(_, t)| t.clone()).collect();
    labels.sort();
    assert_eq!(labels, vec!["gl2vk-node-0", "gl2vk-node-1", "gl2vk-node-2", "gl2vk-node-3"]);
}

// ============================================================================
// DEFAULT LOGGER
// ============================================================================

#[test]
fn test_default_logger_accepts_every_severity() {
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        DefaultLogger.log(&record(severity, None));
    }
    DefaultLogger.log(&record(LogSeverity::Error, Some(("command_node.rs", 123))));
}
