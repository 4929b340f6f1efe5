// Events captured by the proxy and merged by the timeline correlator
//
// Three streams flow into the store: MCP protocol messages observed on the
// wire, synthesized LLM decision markers, and user prompts (explicit or
// inferred). Each is an explicit serde struct so downstream consumers never
// reach into untyped maps; the JSON-RPC payload itself stays an opaque
// `serde_json::Value` with narrow accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport protocol label stamped on every captured message.
pub const PROTOCOL_JSON_RPC: &str = "JSON-RPC";

/// Direction of an observed MCP message.
///
/// Serialized with the semantic labels the analysis side keys on: the host
/// side of the wire is the LLM client, the child side is the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Host (IDE / LLM client) → target server. In-path of the proxy.
    #[serde(rename = "llm_to_mcp_client", alias = "llm→mcp_client")]
    HostToServer,
    /// Target server → host. Out-path of the proxy.
    #[serde(rename = "mcp_client_to_server", alias = "mcp_client→server")]
    ServerToHost,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::HostToServer => "llm_to_mcp_client",
            Direction::ServerToHost => "mcp_client_to_server",
        }
    }
}

/// Derived fields attached to every captured MCP message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancedContext {
    /// True when the host side initiated the message.
    pub llm_initiated: bool,
    /// The JSON-RPC method, when the payload carries one.
    pub tool_method: Option<String>,
    /// Tool name from `params.name`, only for `tools/call` requests.
    pub tool_name: Option<String>,
}

/// One JSON-RPC message observed by the proxy.
///
/// Immutable once written. The timestamp is generated at the capture point,
/// never parsed out of the message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPEvent {
    pub timestamp: DateTime<Utc>,
    /// Logical identifier of the target server (from launch env).
    pub server_name: String,
    /// OS pid of the proxy process that captured this message.
    pub server_process_id: u32,
    pub direction: Direction,
    pub protocol: String,
    /// The parsed JSON-RPC object, verbatim.
    pub payload: Value,
    /// Request→response wall-clock delta, set on response events only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
    /// Set when `payload.error` is present; an HTTP-status token from the
    /// error message when one exists, otherwise the JSON-RPC error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub enhanced_context: EnhancedContext,
}

impl MCPEvent {
    /// JSON-RPC method, if the payload carries one.
    pub fn method(&self) -> Option<&str> {
        self.payload.get("method").and_then(Value::as_str)
    }

    /// JSON-RPC id, if present. Requests and their responses share it.
    pub fn id(&self) -> Option<&Value> {
        self.payload.get("id")
    }

    /// The `error` member of the payload, if present.
    pub fn error(&self) -> Option<&Value> {
        self.payload.get("error")
    }

    /// The `result` member of the payload, if present.
    pub fn result(&self) -> Option<&Value> {
        self.payload.get("result")
    }

    /// Tool name for `tools/call` requests.
    pub fn tool_name(&self) -> Option<&str> {
        if self.method() != Some("tools/call") {
            return None;
        }
        self.payload
            .get("params")
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
    }

    /// Tool arguments for `tools/call` requests.
    pub fn tool_arguments(&self) -> Option<&Value> {
        if self.method() != Some("tools/call") {
            return None;
        }
        self.payload.get("params").and_then(|p| p.get("arguments"))
    }

    /// True for response frames: no method, but a result or error member.
    pub fn is_response(&self) -> bool {
        self.method().is_none() && (self.result().is_some() || self.error().is_some())
    }
}

/// Phase of an inferred LLM reasoning episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPhase {
    Discovery,
    ToolSelection,
    ToolCall,
    Completion,
}

/// One tool invocation recorded inside a decision session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionToolCall {
    pub tool_name: String,
    pub arguments: Value,
    pub timestamp: DateTime<Utc>,
    pub call_id: String,
}

/// Reasoning marker emitted by the decision recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMDecisionEvent {
    pub timestamp: DateTime<Utc>,
    pub decision_id: String,
    pub phase: DecisionPhase,
    /// May be synthesized ("[Inferred] ...") when no explicit prompt exists.
    pub user_prompt: String,
    #[serde(default)]
    pub tools_considered: Vec<String>,
    #[serde(default)]
    pub tools_selected: Vec<String>,
    #[serde(default)]
    pub tool_calls: Vec<DecisionToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// 0..1, estimated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<i64>,
    /// Only present on `completion` records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Where a user prompt entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    /// Logged explicitly by an external prompt logger.
    Manual,
    /// Synthesized by the proxy's prompt-inference subroutine.
    Inferred,
}

/// Explicit user prompt entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPromptEvent {
    pub timestamp: DateTime<Utc>,
    pub user_prompt: String,
    pub conversation_id: String,
    pub source: PromptSource,
    /// Server the capturing proxy was fronting (multi-server setups).
    pub server_name: String,
}

/// Conversation context synthesized alongside an inferred prompt.
///
/// Written to its own stream; correlates an inferred prompt with the tool
/// call that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContextRecord {
    pub timestamp: DateTime<Utc>,
    pub user_prompt: String,
    pub conversation_id: String,
    #[serde(default)]
    pub tools_available: Vec<String>,
    pub host_interface: String,
}

/// A merged-timeline entry: any of the three stream record types, tagged
/// with its source so flow construction can pattern-match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source")]
pub enum TimelineEvent {
    #[serde(rename = "mcp_audit")]
    Message(MCPEvent),
    #[serde(rename = "llm_decision")]
    Decision(LLMDecisionEvent),
    #[serde(rename = "user_prompt")]
    Prompt(UserPromptEvent),
}

impl TimelineEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TimelineEvent::Message(e) => e.timestamp,
            TimelineEvent::Decision(e) => e.timestamp,
            TimelineEvent::Prompt(e) => e.timestamp,
        }
    }

    pub fn server_name(&self) -> Option<&str> {
        match self {
            TimelineEvent::Message(e) => Some(&e.server_name),
            TimelineEvent::Prompt(e) => Some(&e.server_name),
            TimelineEvent::Decision(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(payload: Value, direction: Direction) -> MCPEvent {
        MCPEvent {
            timestamp: Utc::now(),
            server_name: "test".into(),
            server_process_id: 1,
            direction,
            protocol: PROTOCOL_JSON_RPC.into(),
            payload,
            latency_ms: None,
            error_code: None,
            enhanced_context: EnhancedContext::default(),
        }
    }

    #[test]
    fn tool_call_accessors() {
        let e = event(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {"name": "get_weather", "arguments": {"city": "London"}}
            }),
            Direction::HostToServer,
        );
        assert_eq!(e.method(), Some("tools/call"));
        assert_eq!(e.tool_name(), Some("get_weather"));
        assert_eq!(
            e.tool_arguments().and_then(|a| a.get("city")),
            Some(&json!("London"))
        );
        assert!(!e.is_response());
    }

    #[test]
    fn response_detection() {
        let ok = event(
            json!({"jsonrpc": "2.0", "id": 1, "result": {"temp": 15}}),
            Direction::ServerToHost,
        );
        assert!(ok.is_response());
        assert!(ok.error().is_none());

        let err = event(
            json!({"jsonrpc": "2.0", "id": 2, "error": {"code": -32001, "message": "401"}}),
            Direction::ServerToHost,
        );
        assert!(err.is_response());
        assert!(err.error().is_some());
    }

    #[test]
    fn direction_serializes_with_semantic_labels() {
        let s = serde_json::to_string(&Direction::HostToServer).unwrap();
        assert_eq!(s, "\"llm_to_mcp_client\"");
        let s = serde_json::to_string(&Direction::ServerToHost).unwrap();
        assert_eq!(s, "\"mcp_client_to_server\"");
    }

    #[test]
    fn timeline_event_roundtrip_keeps_source_tag() {
        let prompt = TimelineEvent::Prompt(UserPromptEvent {
            timestamp: Utc::now(),
            user_prompt: "get me the course status".into(),
            conversation_id: "abc".into(),
            source: PromptSource::Inferred,
            server_name: "mastra".into(),
        });
        let line = serde_json::to_string(&prompt).unwrap();
        assert!(line.contains("\"source\":\"user_prompt\""));
        let back: TimelineEvent = serde_json::from_str(&line).unwrap();
        assert!(matches!(back, TimelineEvent::Prompt(_)));
    }
}
