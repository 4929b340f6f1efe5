//! Configuration sections: store, proxy, timeline, scoring, telemetry, logging
//!
//! Each section has a runtime struct with defaults and a `File*` twin used
//! only for deserialization, merged through `from_file()`.

use serde::Deserialize;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Event Store Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Event store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the JSONL event streams
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            // The host-side convention: audit streams live next to the IDE's
            // own MCP state under the user's home directory.
            data_dir: dirs::home_dir()
                .map(|p| p.join(".cursor"))
                .unwrap_or_else(|| PathBuf::from(".cursor")),
        }
    }
}

/// Store settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileStoreConfig {
    pub data_dir: Option<String>,
}

impl StoreConfig {
    pub fn from_file(file: Option<FileStoreConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            data_dir: file
                .data_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stdio Proxy Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Stdio proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Lines above this size are forwarded but not captured (bytes)
    pub max_capture_bytes: usize,
    /// How long to wait before declaring a clean child spawn (milliseconds)
    pub spawn_probe_ms: u64,
    /// Bounded wait for in-flight capture work at shutdown (seconds)
    pub drain_timeout_secs: u64,
    /// Capture queue depth between forwarding tasks and the capture worker
    pub capture_queue_depth: usize,
    /// Most recent decision sessions retained in memory (LRU beyond this)
    pub session_capacity: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_capture_bytes: 1024 * 1024,
            spawn_probe_ms: 100,
            drain_timeout_secs: 5,
            capture_queue_depth: 1000,
            session_capacity: 64,
        }
    }
}

/// Proxy settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileProxyConfig {
    pub max_capture_bytes: Option<usize>,
    pub spawn_probe_ms: Option<u64>,
    pub drain_timeout_secs: Option<u64>,
    pub capture_queue_depth: Option<usize>,
    pub session_capacity: Option<usize>,
}

impl ProxyConfig {
    pub fn from_file(file: Option<FileProxyConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            max_capture_bytes: file.max_capture_bytes.unwrap_or(defaults.max_capture_bytes),
            spawn_probe_ms: file.spawn_probe_ms.unwrap_or(defaults.spawn_probe_ms),
            drain_timeout_secs: file.drain_timeout_secs.unwrap_or(defaults.drain_timeout_secs),
            capture_queue_depth: file
                .capture_queue_depth
                .unwrap_or(defaults.capture_queue_depth),
            session_capacity: file.session_capacity.unwrap_or(defaults.session_capacity),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Timeline Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Timeline correlation configuration
#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Events within this window are considered part of the same flow
    pub time_window_seconds: i64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            time_window_seconds: 30,
        }
    }
}

/// Timeline settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileTimelineConfig {
    pub time_window_seconds: Option<i64>,
}

impl TimelineConfig {
    pub fn from_file(file: Option<FileTimelineConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            time_window_seconds: file
                .time_window_seconds
                .unwrap_or(defaults.time_window_seconds),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scoring Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Cognitive scoring configuration
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Expected smooth request-response time used as the latency reference
    pub baseline_latency_ms: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            baseline_latency_ms: 15_000,
        }
    }
}

/// Scoring settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileScoringConfig {
    pub baseline_latency_ms: Option<i64>,
}

impl ScoringConfig {
    pub fn from_file(file: Option<FileScoringConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            baseline_latency_ms: file
                .baseline_latency_ms
                .unwrap_or(defaults.baseline_latency_ms),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Telemetry export configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Whether the export loop runs alongside the proxy
    pub enabled: bool,
    /// Seconds between export iterations
    pub export_interval_secs: u64,
    /// Analysis window re-derived each iteration (hours)
    pub window_hours: f64,
    /// How many of the most recent message events get interaction counters
    pub recent_message_count: usize,
    /// Service name stamped on exported telemetry
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false, // Opt-in feature
            export_interval_secs: 5,
            window_hours: 1.0,
            recent_message_count: 10,
            service_name: "mcpspy".to_string(),
        }
    }
}

/// Telemetry settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileTelemetryConfig {
    pub enabled: Option<bool>,
    pub export_interval_secs: Option<u64>,
    pub window_hours: Option<f64>,
    pub recent_message_count: Option<usize>,
    pub service_name: Option<String>,
}

impl TelemetryConfig {
    pub fn from_file(file: Option<FileTelemetryConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            enabled: file.enabled.unwrap_or(defaults.enabled),
            export_interval_secs: file
                .export_interval_secs
                .unwrap_or(defaults.export_interval_secs),
            window_hours: file.window_hours.unwrap_or(defaults.window_hours),
            recent_message_count: file
                .recent_message_count
                .unwrap_or(defaults.recent_message_count),
            service_name: file.service_name.unwrap_or(defaults.service_name),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration
///
/// The proxy's stdout belongs to the forwarded wire, so logs go to stderr
/// and, when enabled, a daily-rotated file.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Enable file logging (in addition to stderr)
    pub file_enabled: bool,
    /// Directory for log files
    pub file_dir: PathBuf,
    /// Prefix for log file names (e.g., "mcpspy" -> "mcpspy.2024-01-15.log")
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false, // Opt-in feature
            file_dir: PathBuf::from("./logs"),
            file_prefix: "mcpspy".to_string(),
        }
    }
}

/// Logging settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileLogging {
    pub level: Option<String>,
    pub file_enabled: Option<bool>,
    pub file_dir: Option<String>,
    pub file_prefix: Option<String>,
}

impl LoggingConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileLogging>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            level: file.level.unwrap_or(defaults.level),
            file_enabled: file.file_enabled.unwrap_or(defaults.file_enabled),
            file_dir: file
                .file_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.file_dir),
            file_prefix: file.file_prefix.unwrap_or(defaults.file_prefix),
        }
    }
}
