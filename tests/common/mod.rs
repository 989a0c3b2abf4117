//! Shared test utilities: tracing setup and stress-test sizing.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     // ... test code with tracing::info!, tracing::debug!, etc.
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: Filter directives (e.g., `bytetree=debug,bytetree::tree::lock_coupling=trace`)
//! - `BYTETREE_LOG_DIR`: Log directory (default: `logs/`)
//! - `BYTETREE_LOG_CONSOLE`: Set to "0" to disable console output
//! - `BYTETREE_STRESS_THREADS`: Thread count for stress tests (default: 8)
//! - `BYTETREE_STRESS_KEYS`: Keys per thread for stress tests (default: 2000)
//!
//! # Log Files
//!
//! Logs are written to `logs/bytetree.jsonl` as newline-delimited JSON (NDJSON).
//! Use `jq` for pretty-printing and filtering:
//!
//! ```bash
//! # Pretty-print all logs
//! cat logs/bytetree.jsonl | jq .
//!
//! # Convert to JSON array
//! cat logs/bytetree.jsonl | jq -s .
//!
//! # Contention events from the lock-free variant
//! cat logs/bytetree.jsonl | jq 'select(.target == "bytetree::tree::lock_free")'
//!
//! # Show only errors
//! cat logs/bytetree.jsonl | jq 'select(.level == "ERROR")'
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Ensures tracing is only initialized once across all tests.
static INIT: Once = Once::new();

/// Initialize the tracing subscriber with file and console logging.
///
/// Safe to call multiple times - only the first call takes effect.
/// Logs are written to `logs/bytetree.jsonl` as NDJSON.
pub fn init_tracing() {
    INIT.call_once(|| {
        setup_tracing();
    });
}

/// Configuration for tracing setup.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Directory for log files.
    pub log_dir: PathBuf,
    /// Log file name.
    pub log_file: String,
    /// Enable console output.
    pub console_enabled: bool,
    /// Default log level if RUST_LOG is not set.
    pub default_level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_file: "bytetree.jsonl".to_string(),
            console_enabled: true,
            default_level: Level::INFO,
        }
    }
}

impl TracingConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("BYTETREE_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if env::var("BYTETREE_LOG_CONSOLE").is_ok_and(|v| v == "0") {
            config.console_enabled = false;
        }

        config
    }
}

/// Create an EnvFilter from RUST_LOG or use default level.
fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{default_level}")))
}

#[expect(clippy::expect_used)]
fn setup_tracing() {
    let config = TracingConfig::from_env();

    // Create log directory
    std::fs::create_dir_all(&config.log_dir).expect("Failed to create log directory");

    let log_path = config.log_dir.join(&config.log_file);

    // Open file in append mode (nextest runs tests in separate processes)
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .expect("Failed to open log file");

    // === Console Layer ===
    let console_layer = if config.console_enabled {
        Some(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(true)
                .compact()
                .with_filter(make_filter(config.default_level)),
        )
    } else {
        None
    };

    // === File Layer (NDJSON format) ===
    // Writes one JSON object per line. Use `jq` for pretty-printing.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .json()
        .with_filter(make_filter(config.default_level));

    // Compose and install subscriber (use try_init to avoid panic if lib already set one)
    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

// ============================================================================
//  Stress sizing
// ============================================================================

/// Default thread count for stress tests.
pub const DEFAULT_STRESS_THREADS: usize = 8;

/// Default number of keys each stress thread inserts.
pub const DEFAULT_STRESS_KEYS: usize = 2_000;

/// Thread and per-thread key counts for stress tests.
#[derive(Debug, Clone, Copy)]
pub struct StressConfig {
    /// Concurrent writer threads.
    pub threads: usize,
    /// Keys inserted by each thread.
    pub keys_per_thread: usize,
}

impl StressConfig {
    /// Read `BYTETREE_STRESS_THREADS` / `BYTETREE_STRESS_KEYS`, falling back
    /// to the defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        Self {
            threads: env_usize("BYTETREE_STRESS_THREADS", DEFAULT_STRESS_THREADS),
            keys_per_thread: env_usize("BYTETREE_STRESS_KEYS", DEFAULT_STRESS_KEYS),
        }
    }

    /// Total distinct keys inserted across all threads.
    pub const fn total(&self) -> usize {
        self.threads * self.keys_per_thread
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_init() {
        init_tracing();
        tracing::info!("Tracing initialized successfully");
        tracing::debug!(key = "test_key", value = 42, "Debug event");
        tracing::trace!(thread = ?std::thread::current().id(), "Trace event");
    }

    #[test]
    fn test_stress_config_defaults() {
        let config = StressConfig {
            threads: DEFAULT_STRESS_THREADS,
            keys_per_thread: DEFAULT_STRESS_KEYS,
        };
        assert_eq!(config.total(), 16_000);
        assert_eq!(env_usize("BYTETREE_UNSET_FOR_TEST", 7), 7);
    }
}
