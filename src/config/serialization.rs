//! Config serialization to TOML
//!
//! Single source of truth for config file format. The generated template is
//! what `ensure_config_exists()` and `config --reset` write.

use super::Config;

impl Config {
    /// Generate the full config file contents with comments
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# mcpspy configuration\n");
        output.push_str("# Precedence: environment variables > this file > built-in defaults\n");
        output.push('\n');

        output.push_str("[store]\n");
        output.push_str("# Directory holding the JSONL event streams\n");
        output.push_str(&format!(
            "data_dir = \"{}\"\n",
            self.store.data_dir.display()
        ));
        output.push('\n');

        output.push_str("[proxy]\n");
        output.push_str("# Lines above this size are forwarded but not captured\n");
        output.push_str(&format!(
            "max_capture_bytes = {}\n",
            self.proxy.max_capture_bytes
        ));
        output.push_str(&format!("spawn_probe_ms = {}\n", self.proxy.spawn_probe_ms));
        output.push_str(&format!(
            "drain_timeout_secs = {}\n",
            self.proxy.drain_timeout_secs
        ));
        output.push_str(&format!(
            "capture_queue_depth = {}\n",
            self.proxy.capture_queue_depth
        ));
        output.push_str(&format!(
            "session_capacity = {}\n",
            self.proxy.session_capacity
        ));
        output.push('\n');

        output.push_str("[timeline]\n");
        output.push_str("# Events within this window belong to the same interaction flow\n");
        output.push_str(&format!(
            "time_window_seconds = {}\n",
            self.timeline.time_window_seconds
        ));
        output.push('\n');

        output.push_str("[scoring]\n");
        output.push_str("# Expected smooth request-response time (latency reference)\n");
        output.push_str(&format!(
            "baseline_latency_ms = {}\n",
            self.scoring.baseline_latency_ms
        ));
        output.push('\n');

        output.push_str("[telemetry]\n");
        output.push_str(&format!("enabled = {}\n", self.telemetry.enabled));
        output.push_str(&format!(
            "export_interval_secs = {}\n",
            self.telemetry.export_interval_secs
        ));
        output.push_str(&format!(
            "window_hours = {:.1}\n",
            self.telemetry.window_hours
        ));
        output.push_str(&format!(
            "recent_message_count = {}\n",
            self.telemetry.recent_message_count
        ));
        output.push_str(&format!(
            "service_name = \"{}\"\n",
            self.telemetry.service_name
        ));
        output.push('\n');

        output.push_str("[logging]\n");
        output.push_str("# Log level: trace, debug, info, warn, error\n");
        output.push_str(&format!("level = \"{}\"\n", self.logging.level));
        output.push_str(&format!("file_enabled = {}\n", self.logging.file_enabled));
        output.push_str(&format!(
            "file_dir = \"{}\"\n",
            self.logging.file_dir.display()
        ));
        output.push_str(&format!(
            "file_prefix = \"{}\"\n",
            self.logging.file_prefix
        ));

        output
    }
}
