// Event store - append-only JSON Lines files, one per stream
//
// JSON Lines (JSONL) format writes one JSON object per line, making it easy to:
// - Stream process large files
// - Grep/search with standard tools
// - Parse with jq or other JSON tools
//
// Streams are single-writer within a process; readers open-then-scan and
// tolerate a partial trailing line (the writer may be mid-flush).

use crate::error::{AuditError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// The event streams this system writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Every JSON-RPC message observed by the proxy.
    McpAuditMessages,
    /// Reasoning markers from the decision recorder.
    LlmDecisionTrace,
    /// User prompts, explicit or inferred.
    UserPrompts,
    /// Conversation context records synthesized alongside inferred prompts.
    ConversationContext,
}

impl Stream {
    pub fn file_name(&self) -> &'static str {
        match self {
            Stream::McpAuditMessages => "mcp_audit_messages.jsonl",
            Stream::LlmDecisionTrace => "llm_decision_trace.jsonl",
            Stream::UserPrompts => "user_prompts.jsonl",
            Stream::ConversationContext => "conversation_context.jsonl",
        }
    }
}

/// Append-only store rooted at a per-user data directory.
#[derive(Debug, Clone)]
pub struct EventStore {
    data_dir: PathBuf,
}

impl EventStore {
    /// Create a store rooted at `data_dir`, creating the directory if needed.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|e| AuditError::io(&data_dir, e))?;
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, stream: Stream) -> PathBuf {
        self.data_dir.join(stream.file_name())
    }

    /// Serialize `record` to one line of JSON and append it.
    ///
    /// Flushes per line so records are visible even if the process crashes;
    /// fsync is intentionally not required.
    pub fn append<T: Serialize>(&self, stream: Stream, record: &T) -> Result<()> {
        let path = self.path_for(stream);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::io(&path, e))?;

        let json = serde_json::to_string(record)
            .map_err(|e| AuditError::Parse(format!("serialize record: {e}")))?;

        writeln!(file, "{}", json).map_err(|e| AuditError::io(&path, e))?;
        file.flush().map_err(|e| AuditError::io(&path, e))?;

        Ok(())
    }

    /// Read records in file order, skipping invalid lines with a warning.
    ///
    /// A missing file yields an empty list: streams come into existence on
    /// first append. When `since` is given, records are filtered by the
    /// timestamp `extract` pulls out of each record; records with no usable
    /// timestamp are discarded.
    pub fn read<T, F>(
        &self,
        stream: Stream,
        since: Option<DateTime<Utc>>,
        extract: F,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> Option<DateTime<Utc>>,
    {
        let path = self.path_for(stream);
        read_jsonl(&path, since, extract)
    }
}

/// Scan one JSONL file. Shared with tests that point at arbitrary paths.
fn read_jsonl<T, F>(path: &Path, since: Option<DateTime<Utc>>, extract: F) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Option<DateTime<Utc>>,
{
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AuditError::io(path, e)),
    };

    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                // Partial trailing line or transient read failure: stop here,
                // everything read so far is valid.
                tracing::warn!("stopping scan of {:?} at line {}: {}", path, line_no + 1, e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<T>(&line) {
            Ok(record) => {
                match extract(&record) {
                    Some(ts) => {
                        if let Some(cutoff) = since {
                            if ts < cutoff {
                                continue;
                            }
                        }
                    }
                    None => {
                        tracing::warn!(
                            "skipping record with unparseable timestamp at {:?}:{}",
                            path,
                            line_no + 1
                        );
                        continue;
                    }
                }
                records.push(record);
            }
            Err(e) => {
                // Invalid lines are expected at the tail (writer mid-flush)
                // and recoverable anywhere else.
                tracing::warn!("skipping invalid line at {:?}:{}: {}", path, line_no + 1, e);
            }
        }
    }

    Ok(records)
}
