//! Configuration for the audit proxy
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/mcpspy/config.toml)
//! 3. Built-in defaults (lowest priority)

use serde::Deserialize;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod sections;
mod serialization;


pub use sections::{
    FileLogging, FileProxyConfig, FileScoringConfig, FileStoreConfig, FileTelemetryConfig,
    FileTimelineConfig, LoggingConfig, ProxyConfig, ScoringConfig, StoreConfig, TelemetryConfig,
    TimelineConfig,
};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Event store settings (data directory)
    pub store: StoreConfig,

    /// Stdio proxy settings (capture cap, spawn probe, drain timeout)
    pub proxy: ProxyConfig,

    /// Timeline correlation settings (flow gap window)
    pub timeline: TimelineConfig,

    /// Cognitive scoring settings (baseline latency)
    pub scoring: ScoringConfig,

    /// Telemetry export settings
    pub telemetry: TelemetryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            proxy: ProxyConfig::default(),
            timeline: TimelineConfig::default(),
            scoring: ScoringConfig::default(),
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure (subset of Config that makes sense to persist)
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    /// Optional [store] section
    pub store: Option<FileStoreConfig>,

    /// Optional [proxy] section
    pub proxy: Option<FileProxyConfig>,

    /// Optional [timeline] section
    pub timeline: Option<FileTimelineConfig>,

    /// Optional [scoring] section
    pub scoring: Option<FileScoringConfig>,

    /// Optional [telemetry] section
    pub telemetry: Option<FileTelemetryConfig>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/mcpspy/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("mcpspy").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    /// Called during startup to help users discover configuration options
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        // Don't overwrite existing config
        if path.exists() {
            return;
        }

        // Create parent directory
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Silently fail - config is optional
            }
        }

        // Use Config::default().to_toml() as single source of truth
        let template = Self::default().to_toml();

        // Write config (ignore errors - config is optional)
        let _ = std::fs::write(&path, template);
    }

    /// Load file config if it exists
    ///
    /// A broken config fails fast with a clear error rather than silently
    /// falling back to defaults while the user debugs the wrong thing.
    fn load_file_config() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("mcpspy: failed to parse config file {}", path.display());
                    eprintln!("  Error: {}", e);
                    eprintln!("  To reset, delete the file or run: mcpspy config --reset");
                    std::process::exit(1);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                eprintln!("mcpspy: cannot read config file {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
    }

    /// Load configuration: env vars -> file -> defaults
    pub fn from_env() -> Self {
        let file = Self::load_file_config();

        let mut store = StoreConfig::from_file(file.store);
        // Data directory: env > file > default
        if let Ok(dir) = std::env::var("MCPSPY_DATA_DIR") {
            store.data_dir = PathBuf::from(dir);
        }

        let proxy = ProxyConfig::from_file(file.proxy);

        let mut timeline = TimelineConfig::from_file(file.timeline);
        if let Some(window) = std::env::var("MCPSPY_TIME_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            timeline.time_window_seconds = window;
        }

        let scoring = ScoringConfig::from_file(file.scoring);

        let mut telemetry = TelemetryConfig::from_file(file.telemetry);
        if let Some(interval) = std::env::var("MCPSPY_EXPORT_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            telemetry.export_interval_secs = interval;
        }

        let logging = LoggingConfig::from_file(file.logging);

        Self {
            store,
            proxy,
            timeline,
            scoring,
            telemetry,
            logging,
        }
    }
}
