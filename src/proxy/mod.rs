// Stdio proxy - transparent forwarding between host and MCP server
//
// The host launches this process in place of the real server. We spawn the
// real server as a child and shuttle newline-delimited JSON-RPC between the
// host's stdio and the child's, byte-for-byte. Capture happens on copies of
// each line, handed to a bounded queue consumed by the capture worker, so
// forwarding latency never depends on parsing or disk writes.
//
// Architecture:
//
//   host stdin  ──→ in-path task  ──→ child stdin      ┐
//   child stdout ─→ out-path task ──→ host stdout      ├─ copies → capture queue
//   child stderr ─→ err-path task ──→ log (stderr)     ┘              │
//                                                           capture worker
//                                                      (parse, match, persist)

pub mod capture;
pub mod prompt;

use crate::config::Config;
use crate::decision::DecisionRecorder;
use crate::error::{AuditError, Result};
use crate::events::Direction;
use crate::store::EventStore;
use capture::{CaptureWorker, CapturedLine};
use chrono::Utc;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Launch parameters for one proxy instance.
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub target_command: String,
    pub target_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub server_name: String,
}

/// Lifecycle of a proxy instance. Only `Running` accepts capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyState {
    Idle,
    Spawning,
    Running,
    Draining,
    Terminated,
}

/// Why the forwarding phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownCause {
    ChildExited,
    HostClosed,
    Signal,
}

/// Run the proxy until the session ends.
///
/// Spawns the target, forwards all three streams, captures a copy of every
/// line, and drains cleanly on child exit, host EOF, or Ctrl-C. Returns
/// `AuditError::Spawn` when the target cannot start or dies within the
/// probe window; broken pipes mid-session are an orderly shutdown, not an
/// error.
pub async fn run(config: &Config, opts: ProxyOptions) -> Result<()> {
    let mut state = ProxyState::Idle;
    tracing::debug!("proxy state: {:?}", state);
    tracing::info!(
        "starting proxy for [{}]: {} {}",
        opts.server_name,
        opts.target_command,
        opts.target_args.join(" ")
    );

    state = ProxyState::Spawning;
    tracing::debug!("proxy state: {:?}", state);

    let mut cmd = Command::new(&opts.target_command);
    cmd.args(&opts.target_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &opts.working_dir {
        cmd.current_dir(dir);
        tracing::debug!("target working directory: {}", dir.display());
    }

    let mut child = cmd.spawn().map_err(|e| AuditError::Spawn {
        command: opts.target_command.clone(),
        reason: e.to_string(),
    })?;

    // Probe window: a child that dies immediately is a launch failure, not a
    // session. Surface its stderr so the user sees why.
    tokio::time::sleep(Duration::from_millis(config.proxy.spawn_probe_ms)).await;
    if let Ok(Some(status)) = child.try_wait() {
        let mut stderr_output = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = timeout(
                Duration::from_millis(200),
                stderr.read_to_string(&mut stderr_output),
            )
            .await;
        }
        return Err(AuditError::Spawn {
            command: opts.target_command.clone(),
            reason: format!(
                "exited immediately with {status}: {}",
                stderr_output.trim()
            ),
        });
    }

    let child_stdin = child.stdin.take().ok_or_else(|| AuditError::Spawn {
        command: opts.target_command.clone(),
        reason: "child stdin not piped".to_string(),
    })?;
    let child_stdout = child.stdout.take().ok_or_else(|| AuditError::Spawn {
        command: opts.target_command.clone(),
        reason: "child stdout not piped".to_string(),
    })?;
    let child_stderr = child.stderr.take().ok_or_else(|| AuditError::Spawn {
        command: opts.target_command.clone(),
        reason: "child stderr not piped".to_string(),
    })?;

    // Capture side: store, decision recorder, and the worker that owns both
    let store = EventStore::new(&config.store.data_dir)?;
    let recorder = DecisionRecorder::new(store.clone(), config.proxy.session_capacity);
    let (capture_tx, capture_rx) = mpsc::channel(config.proxy.capture_queue_depth);
    let worker = CaptureWorker::new(store, recorder, opts.server_name.clone());
    let worker_handle = tokio::spawn(worker.run(capture_rx));

    state = ProxyState::Running;
    tracing::debug!("proxy state: {:?}", state);

    let max_capture = config.proxy.max_capture_bytes;

    // In-path: host stdin → child stdin
    let in_tx = capture_tx.clone();
    let mut in_task = tokio::spawn(async move {
        let mut host_stdin = BufReader::new(tokio::io::stdin());
        let mut child_stdin = child_stdin;
        let mut line = String::new();
        loop {
            line.clear();
            match host_stdin.read_line(&mut line).await {
                Ok(0) => break, // host closed our stdin
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("error reading host stdin: {}", e);
                    break;
                }
            }
            if child_stdin.write_all(line.as_bytes()).await.is_err() {
                break; // child went away
            }
            if child_stdin.flush().await.is_err() {
                break;
            }
            enqueue_capture(&in_tx, &line, Direction::HostToServer, max_capture);
        }
        // Dropping child stdin delivers EOF so the server can exit cleanly
    });

    // Out-path: child stdout → host stdout
    let out_tx = capture_tx.clone();
    let mut out_task = tokio::spawn(async move {
        let mut child_stdout = BufReader::new(child_stdout);
        let mut host_stdout = tokio::io::stdout();
        let mut line = String::new();
        loop {
            line.clear();
            match child_stdout.read_line(&mut line).await {
                Ok(0) => break, // child exited / closed stdout
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("error reading child stdout: {}", e);
                    break;
                }
            }
            if host_stdout.write_all(line.as_bytes()).await.is_err() {
                break; // host went away
            }
            if host_stdout.flush().await.is_err() {
                break;
            }
            enqueue_capture(&out_tx, &line, Direction::ServerToHost, max_capture);
        }
    });

    // Err-path: child stderr → our stderr via the log layer, severity by
    // substring the way server authors actually write their failures
    let server_label = opts.server_name.clone();
    let mut err_task = tokio::spawn(async move {
        let mut child_stderr = BufReader::new(child_stderr);
        let mut line = String::new();
        loop {
            line.clear();
            match child_stderr.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(_) => break,
            }
            let msg = line.trim_end();
            if msg.is_empty() {
                continue;
            }
            let lowered = msg.to_lowercase();
            if lowered.contains("error") || lowered.contains("failed") {
                tracing::error!("[{}] {}", server_label, msg);
            } else {
                tracing::warn!("[{}] {}", server_label, msg);
            }
        }
    });

    // Forward until one side goes away or we are told to stop
    let cause = tokio::select! {
        _ = &mut out_task => ShutdownCause::ChildExited,
        _ = &mut in_task => ShutdownCause::HostClosed,
        _ = tokio::signal::ctrl_c() => ShutdownCause::Signal,
    };

    state = ProxyState::Draining;
    tracing::debug!("proxy state: {:?} (cause: {:?})", state, cause);

    let drain = Duration::from_secs(config.proxy.drain_timeout_secs);

    // When the host hung up, the child sees stdin EOF; give it the drain
    // window to flush remaining output before tearing the path down.
    if cause == ShutdownCause::HostClosed {
        let _ = timeout(drain, &mut out_task).await;
    }

    in_task.abort();
    out_task.abort();
    let _ = timeout(drain, &mut err_task).await;
    err_task.abort();

    // Let the worker finish whatever is queued, bounded. Undelivered
    // capture events past the deadline are abandoned.
    drop(capture_tx);
    if timeout(drain, worker_handle).await.is_err() {
        tracing::warn!("capture drain after {:?}: {}", drain, AuditError::Cancelled);
    }

    // Reap the child; escalate to kill only if it ignores EOF
    match timeout(drain, child.wait()).await {
        Ok(Ok(status)) => tracing::info!("target server exited with {}", status),
        Ok(Err(e)) => tracing::warn!("error waiting for target server: {}", e),
        Err(_) => {
            tracing::warn!("target server did not exit, killing");
            let _ = child.kill().await;
        }
    }

    state = ProxyState::Terminated;
    tracing::debug!("proxy state: {:?}", state);
    Ok(())
}

/// Queue a line copy for capture. Never blocks: a full queue drops the
/// capture, the forward already happened.
fn enqueue_capture(
    tx: &mpsc::Sender<CapturedLine>,
    line: &str,
    direction: Direction,
    max_capture_bytes: usize,
) {
    if line.len() > max_capture_bytes {
        tracing::trace!(
            "capture dropped: {} byte line exceeds cap on {} path",
            line.len(),
            direction.as_str()
        );
        return;
    }
    let captured = CapturedLine {
        line: line.to_string(),
        direction,
        timestamp: Utc::now(),
    };
    if tx.try_send(captured).is_err() {
        tracing::trace!("capture backpressure: dropped line");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_lines_are_not_queued() {
        let (tx, mut rx) = mpsc::channel(4);
        let big = "x".repeat(100);
        enqueue_capture(&tx, &big, Direction::HostToServer, 10);
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        enqueue_capture(&tx, "a\n", Direction::HostToServer, 1024);
        // Queue is full now; this must return immediately without blocking
        enqueue_capture(&tx, "b\n", Direction::HostToServer, 1024);
        drop(tx);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.line, "a\n");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn spawn_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.data_dir = dir.path().to_path_buf();

        let err = run(
            &config,
            ProxyOptions {
                target_command: "/nonexistent/definitely-not-a-server".to_string(),
                target_args: vec![],
                working_dir: None,
                server_name: "test".to_string(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AuditError::Spawn { .. }));
    }
}
