// Capture worker - turns forwarded lines into persisted events
//
// Forwarding tasks push raw line copies onto a bounded queue; this worker
// consumes it and does everything expensive: JSON parsing, latency matching,
// enhanced-context derivation, prompt inference, decision hooks, and store
// appends. The forwarding paths never wait on any of this (T1).

use crate::decision::{DecisionRecorder, SessionKind};
use crate::events::{
    ConversationContextRecord, Direction, EnhancedContext, MCPEvent, PromptSource,
    UserPromptEvent, PROTOCOL_JSON_RPC,
};
use crate::proxy::prompt;
use crate::store::{EventStore, Stream};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;

/// Pending requests kept for latency matching are capped; a host that never
/// receives responses must not grow the map without bound.
const PENDING_CAP: usize = 256;

/// One line copied off a forwarding path, stamped at the capture point.
#[derive(Debug)]
pub struct CapturedLine {
    pub line: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

/// A request awaiting its response, remembered by JSON-RPC id.
#[derive(Debug, Clone)]
struct PendingRequest {
    timestamp: DateTime<Utc>,
    method: String,
    tool_name: Option<String>,
}

/// Serialized owner of all capture-side state.
pub struct CaptureWorker {
    store: EventStore,
    recorder: DecisionRecorder,
    server_name: String,
    pid: u32,
    pending: HashMap<String, PendingRequest>,
    pending_order: VecDeque<String>,
}

impl CaptureWorker {
    pub fn new(store: EventStore, recorder: DecisionRecorder, server_name: String) -> Self {
        Self {
            store,
            recorder,
            server_name,
            pid: std::process::id(),
            pending: HashMap::new(),
            pending_order: VecDeque::new(),
        }
    }

    /// Drain the capture queue until all senders hang up.
    pub async fn run(mut self, mut rx: mpsc::Receiver<CapturedLine>) {
        tracing::debug!("capture worker started for [{}]", self.server_name);
        while let Some(captured) = rx.recv().await {
            self.process(captured);
        }
        tracing::debug!(
            "capture worker stopped ({} sessions open)",
            self.recorder.open_session_count()
        );
    }

    /// Process one captured line. Never fails: anything that goes wrong is
    /// logged and the line is dropped (T3).
    fn process(&mut self, captured: CapturedLine) {
        let trimmed = captured.line.trim();
        if trimmed.is_empty() {
            return;
        }

        // Non-JSON log text is not a captured event
        let payload: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => {
                tracing::trace!(
                    "non-JSON line on {} path ({} bytes)",
                    captured.direction.as_str(),
                    trimmed.len()
                );
                return;
            }
        };

        let mut event = MCPEvent {
            timestamp: captured.timestamp,
            server_name: self.server_name.clone(),
            server_process_id: self.pid,
            direction: captured.direction,
            protocol: PROTOCOL_JSON_RPC.into(),
            payload,
            latency_ms: None,
            error_code: None,
            enhanced_context: EnhancedContext::default(),
        };

        event.error_code = derive_error_code(&event.payload);
        self.match_latency(&mut event);

        event.enhanced_context = EnhancedContext {
            llm_initiated: event.direction == Direction::HostToServer,
            tool_method: event.method().map(String::from),
            tool_name: event.tool_name().map(String::from),
        };

        if event.direction == Direction::HostToServer && event.method() == Some("tools/call") {
            self.infer_prompt(&event);
        }

        if let Err(e) = self.store.append(Stream::McpAuditMessages, &event) {
            tracing::error!("failed to persist captured message: {}", e);
        }

        tracing::debug!(
            "captured [{}] {}: {}",
            self.server_name,
            event.direction.as_str(),
            event.method().unwrap_or("response")
        );

        self.dispatch_decision_hooks(&event);
    }

    /// Remember requests and stamp responses with the wall-clock delta from
    /// their matching request (by JSON-RPC id, opposite path).
    fn match_latency(&mut self, event: &mut MCPEvent) {
        let Some(id) = event.id() else {
            return;
        };
        let key = id_key(id);

        if event.method().is_some() {
            // Request: remember it for the eventual response
            if self.pending.len() >= PENDING_CAP {
                if let Some(oldest) = self.pending_order.pop_front() {
                    self.pending.remove(&oldest);
                }
            }
            let method = event.method().unwrap_or_default().to_string();
            self.pending.insert(
                key.clone(),
                PendingRequest {
                    timestamp: event.timestamp,
                    method,
                    tool_name: event.tool_name().map(String::from),
                },
            );
            self.pending_order.push_back(key);
        } else if event.is_response() {
            if let Some(request) = self.pending.remove(&key) {
                self.pending_order.retain(|k| k != &key);
                let delta = (event.timestamp - request.timestamp).num_milliseconds();
                event.latency_ms = Some(delta.max(0));
                tracing::trace!(
                    "matched response id={} to {} after {}ms",
                    key,
                    request.method,
                    delta
                );
            }
        }
    }

    /// Synthesize a user prompt and conversation context for a tool call.
    fn infer_prompt(&mut self, event: &MCPEvent) {
        let Some(tool_name) = event.tool_name() else {
            return;
        };
        let inferred = prompt::infer_user_prompt(tool_name, event.tool_arguments());
        let conversation_id =
            prompt::conversation_id(&self.server_name, tool_name, event.timestamp);

        let prompt_event = UserPromptEvent {
            timestamp: event.timestamp,
            user_prompt: inferred.clone(),
            conversation_id: conversation_id.clone(),
            source: PromptSource::Inferred,
            server_name: self.server_name.clone(),
        };
        if let Err(e) = self.store.append(Stream::UserPrompts, &prompt_event) {
            tracing::error!("failed to persist inferred prompt: {}", e);
        }

        let context = ConversationContextRecord {
            timestamp: event.timestamp,
            user_prompt: inferred.clone(),
            conversation_id,
            tools_available: vec![tool_name.to_string()],
            host_interface: "ide".to_string(),
        };
        if let Err(e) = self.store.append(Stream::ConversationContext, &context) {
            tracing::error!("failed to persist conversation context: {}", e);
        }

        tracing::debug!("inferred user prompt: \"{}\"", inferred);
    }

    /// Translate observed protocol traffic into decision-recorder calls.
    fn dispatch_decision_hooks(&mut self, event: &MCPEvent) {
        match event.direction {
            Direction::HostToServer => match event.method() {
                Some("tools/list") => {
                    self.recorder.begin_reasoning(
                        SessionKind::Discovery,
                        "[Tool Discovery] exploring available tools",
                        &["tools/list".to_string()],
                    );
                }
                Some("tools/call") => {
                    let Some(tool_name) = event.tool_name().map(String::from) else {
                        return;
                    };
                    let args = event.tool_arguments().cloned().unwrap_or(Value::Null);

                    // Attach to an open discovery session when one exists
                    let decision_id = self.recorder.open_discovery().unwrap_or_else(|| {
                        self.recorder.begin_reasoning(
                            SessionKind::Execution,
                            "[Inferred] User request requiring tool usage",
                            std::slice::from_ref(&tool_name),
                        )
                    });

                    self.recorder.record_selection(
                        &decision_id,
                        vec![tool_name.clone()],
                        Some(format!("Selected {tool_name} to handle the user request")),
                        Some(0.8),
                    );
                    self.recorder.record_tool_call(
                        &decision_id,
                        &tool_name,
                        args,
                        Some(event.timestamp),
                    );
                }
                Some("initialize") => {
                    let capabilities: Vec<String> = event
                        .payload
                        .get("params")
                        .and_then(|p| p.get("capabilities"))
                        .and_then(Value::as_object)
                        .map(|o| o.keys().cloned().collect())
                        .unwrap_or_default();

                    let decision_id = self.recorder.begin_reasoning(
                        SessionKind::Initialization,
                        "[System] MCP connection initialization",
                        &capabilities,
                    );
                    self.recorder.record_selection(
                        &decision_id,
                        vec!["MCP_SETUP".to_string()],
                        Some("Initializing MCP connection for tool access".to_string()),
                        None,
                    );
                }
                _ => {}
            },
            Direction::ServerToHost => {
                if !event.is_response() {
                    return;
                }
                if let Some(decision_id) = self.recorder.most_recent_open() {
                    let success = event.error().is_none() && event.result().is_some();
                    let reasoning = if success {
                        "Tool execution succeeded"
                    } else {
                        "Tool execution failed"
                    };
                    self.recorder
                        .complete(&decision_id, success, Some(reasoning.to_string()));
                }
            }
        }
    }
}

/// Stable map key for a JSON-RPC id (number, string, or anything else).
fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Derive an error code from a JSON-RPC error member.
///
/// Servers frequently tunnel HTTP status codes through the error message
/// ("401 Unauthorized"); those win over the JSON-RPC code because the
/// scoring rules key on HTTP classes.
fn derive_error_code(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;

    if let Some(message) = error.get("message").and_then(Value::as_str) {
        let mut digits = String::new();
        for c in message.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else {
                if let Some(code) = http_status(&digits) {
                    return Some(code);
                }
                digits.clear();
            }
        }
        if let Some(code) = http_status(&digits) {
            return Some(code);
        }
    }

    match error.get("code") {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
        None => Some("error".to_string()),
    }
}

fn http_status(digits: &str) -> Option<String> {
    if digits.len() != 3 {
        return None;
    }
    let n: u16 = digits.parse().ok()?;
    (400..=599).contains(&n).then(|| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn worker() -> (CaptureWorker, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path()).unwrap();
        let recorder = DecisionRecorder::new(store.clone(), 64);
        (
            CaptureWorker::new(store, recorder, "weather".to_string()),
            dir,
        )
    }

    fn captured(line: &str, direction: Direction, at: DateTime<Utc>) -> CapturedLine {
        CapturedLine {
            line: line.to_string(),
            direction,
            timestamp: at,
        }
    }

    fn read_messages(w: &CaptureWorker) -> Vec<MCPEvent> {
        w.store
            .read(Stream::McpAuditMessages, None, |e: &MCPEvent| {
                Some(e.timestamp)
            })
            .unwrap()
    }

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn non_json_lines_are_not_captured() {
        let (mut w, _dir) = worker();
        w.process(captured("this is not json", Direction::ServerToHost, ts(0)));
        assert!(read_messages(&w).is_empty());
    }

    #[test]
    fn latency_matches_request_to_response_by_id() {
        let (mut w, _dir) = worker();
        w.process(captured(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"get_weather","arguments":{"city":"London"}}}"#,
            Direction::HostToServer,
            ts(0),
        ));
        w.process(captured(
            r#"{"jsonrpc":"2.0","id":1,"result":{"temp":15}}"#,
            Direction::ServerToHost,
            ts(120),
        ));

        let messages = read_messages(&w);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].latency_ms, None);
        assert_eq!(messages[1].latency_ms, Some(120));
    }

    #[test]
    fn unmatched_response_has_no_latency() {
        let (mut w, _dir) = worker();
        w.process(captured(
            r#"{"jsonrpc":"2.0","id":99,"result":{}}"#,
            Direction::ServerToHost,
            ts(0),
        ));
        assert_eq!(read_messages(&w)[0].latency_ms, None);
    }

    #[test]
    fn error_code_prefers_http_status_in_message() {
        let code = derive_error_code(&json!({
            "error": {"code": -32001, "message": "401 Unauthorized"}
        }));
        assert_eq!(code, Some("401".to_string()));

        let code = derive_error_code(&json!({
            "error": {"code": -32600, "message": "Invalid Request"}
        }));
        assert_eq!(code, Some("-32600".to_string()));

        assert_eq!(derive_error_code(&json!({"result": {}})), None);
    }

    #[test]
    fn tool_call_synthesizes_prompt_and_context() {
        let (mut w, _dir) = worker();
        w.process(captured(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"get_weather","arguments":{"city":"London"}}}"#,
            Direction::HostToServer,
            ts(0),
        ));

        let prompts: Vec<UserPromptEvent> = w
            .store
            .read(Stream::UserPrompts, None, |e: &UserPromptEvent| {
                Some(e.timestamp)
            })
            .unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].user_prompt, "use get_weather tool");
        assert_eq!(prompts[0].source, PromptSource::Inferred);

        let contexts: Vec<ConversationContextRecord> = w
            .store
            .read(
                Stream::ConversationContext,
                None,
                |e: &ConversationContextRecord| Some(e.timestamp),
            )
            .unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].conversation_id, prompts[0].conversation_id);
    }

    #[test]
    fn enhanced_context_marks_host_initiated_tool_calls() {
        let (mut w, _dir) = worker();
        w.process(captured(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"search_docs","arguments":{}}}"#,
            Direction::HostToServer,
            ts(0),
        ));

        let event = &read_messages(&w)[0];
        assert!(event.enhanced_context.llm_initiated);
        assert_eq!(
            event.enhanced_context.tool_method.as_deref(),
            Some("tools/call")
        );
        assert_eq!(
            event.enhanced_context.tool_name.as_deref(),
            Some("search_docs")
        );
    }

    #[test]
    fn response_closes_open_decision_session() {
        let (mut w, _dir) = worker();
        w.process(captured(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"get_weather","arguments":{}}}"#,
            Direction::HostToServer,
            ts(0),
        ));
        assert_eq!(w.recorder.open_session_count(), 1);

        w.process(captured(
            r#"{"jsonrpc":"2.0","id":1,"result":{"temp":15}}"#,
            Direction::ServerToHost,
            ts(120),
        ));
        assert_eq!(w.recorder.open_session_count(), 0);
    }

    #[test]
    fn tools_list_opens_discovery_that_next_call_attaches_to() {
        let (mut w, _dir) = worker();
        w.process(captured(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
            Direction::HostToServer,
            ts(0),
        ));
        assert_eq!(w.recorder.open_session_count(), 1);

        w.process(captured(
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"search","arguments":{}}}"#,
            Direction::HostToServer,
            ts(50),
        ));
        // Attached, not a second session
        assert_eq!(w.recorder.open_session_count(), 1);
    }
}
