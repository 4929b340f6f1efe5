// Error taxonomy for capture, setup, and export paths
//
// Forwarding paths never surface these: a capture failure is logged and the
// bytes keep flowing. Setup-time operations (spawn, config rewriting) and the
// export loop return them to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Typed errors for everything outside the forwarding hot path.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Disk or pipe failure during capture/append.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Target server could not start or exited immediately.
    #[error("failed to spawn target server `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    /// Unparseable JSON or timestamp. Recovered by skipping, never surfaced
    /// past the capture worker.
    #[error("parse error: {0}")]
    Parse(String),

    /// Config rewriter could not find the named server entry.
    #[error("server `{0}` not found in host config")]
    NotFound(String),

    /// Idempotency guard: the entry already launches the proxy.
    #[error("server `{0}` is already proxied")]
    AlreadyProxied(String),

    /// Background task received a shutdown signal mid-operation.
    #[error("cancelled")]
    Cancelled,

    /// Exporter backend refused or timed out on a call.
    #[allow(dead_code)] // Constructed by fallible backends (otel feature)
    #[error("telemetry backend error: {0}")]
    Backend(String),
}

impl AuditError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
