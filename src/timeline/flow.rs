// Flow model - one coherent interaction reconstructed from the timeline
//
// A flow is a maximal run of events whose consecutive timestamps stay within
// the gap window. Flows are transient: recomputed on every correlator
// invocation, never persisted.

use crate::events::{Direction, LLMDecisionEvent, MCPEvent, TimelineEvent};
use crate::util::truncate_utf8_safe;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// One tool invocation extracted from a flow.
#[derive(Debug, Clone, Serialize)]
pub struct FlowCall {
    pub timestamp: DateTime<Utc>,
    pub server: String,
    pub tool: Option<String>,
    pub args: Value,
}

/// Ordered event projection for display.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: &'static str,
    pub source: &'static str,
    pub server: Option<String>,
    pub content: String,
}

/// Summary of one interaction flow.
#[derive(Debug, Clone, Serialize)]
pub struct Flow {
    pub flow_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub event_count: usize,
    pub servers_involved: Vec<String>,
    pub cross_server_flow: bool,
    pub has_user_context: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_reasoning: Option<String>,
    pub llm_decisions: Vec<LLMDecisionEvent>,
    pub mcp_calls: Vec<FlowCall>,
    /// Repeat invocations of a (server, tool) pair within this flow.
    pub retry_count: usize,
    pub success: bool,
    pub timeline: Vec<TimelineEntry>,
    /// The raw events backing this flow; the scorer walks these.
    #[serde(skip)]
    pub events: Vec<TimelineEvent>,
}

impl Flow {
    /// Build the flow summary from one gap-delimited run of events.
    pub fn from_events(events: Vec<TimelineEvent>) -> Option<Flow> {
        let first = events.first()?;
        let last = events.last()?;
        let start_time = first.timestamp();
        let end_time = last.timestamp();

        let mut user_prompt: Option<String> = None;
        let mut user_timestamp: Option<DateTime<Utc>> = None;
        let mut decision_prompt: Option<(String, DateTime<Utc>)> = None;
        let mut llm_reasoning: Option<String> = None;
        let mut llm_decisions = Vec::new();
        let mut mcp_calls: Vec<FlowCall> = Vec::new();
        let mut servers = BTreeSet::new();
        let mut call_ids: Vec<Value> = Vec::new();

        for event in &events {
            match event {
                TimelineEvent::Prompt(p) => {
                    servers.insert(p.server_name.clone());
                    if user_prompt.is_none() {
                        user_prompt = Some(p.user_prompt.clone());
                        user_timestamp = Some(p.timestamp);
                    }
                }
                TimelineEvent::Decision(d) => {
                    llm_decisions.push(d.clone());
                    if decision_prompt.is_none() && !d.user_prompt.is_empty() {
                        decision_prompt = Some((d.user_prompt.clone(), d.timestamp));
                    }
                    if llm_reasoning.is_none() {
                        if let Some(r) = d.reasoning.as_ref().filter(|r| !r.is_empty()) {
                            llm_reasoning = Some(r.clone());
                        }
                    }
                }
                TimelineEvent::Message(m) => {
                    servers.insert(m.server_name.clone());
                    if m.direction == Direction::HostToServer
                        && m.method() == Some("tools/call")
                    {
                        mcp_calls.push(FlowCall {
                            timestamp: m.timestamp,
                            server: m.server_name.clone(),
                            tool: m.tool_name().map(String::from),
                            args: m
                                .tool_arguments()
                                .cloned()
                                .unwrap_or(Value::Object(Default::default())),
                        });
                        if let Some(id) = m.id() {
                            call_ids.push(id.clone());
                        }
                    }
                }
            }
        }

        // Explicit prompt wins over a decision-embedded one
        if user_prompt.is_none() {
            if let Some((prompt, ts)) = decision_prompt {
                user_prompt = Some(prompt);
                user_timestamp = Some(ts);
            }
        }

        let retry_count = count_retries(&mcp_calls);
        let success = determine_success(&events, &call_ids);
        let servers_involved: Vec<String> = servers.into_iter().collect();

        Some(Flow {
            flow_id: format!("flow_{}", start_time.timestamp()),
            start_time,
            end_time,
            duration_ms: (end_time - start_time).num_milliseconds(),
            event_count: events.len(),
            cross_server_flow: servers_involved.len() > 1,
            servers_involved,
            has_user_context: user_prompt.is_some(),
            user_prompt,
            user_timestamp,
            llm_reasoning,
            llm_decisions,
            mcp_calls,
            retry_count,
            success,
            timeline: events.iter().map(timeline_entry).collect(),
            events,
        })
    }

    /// Message events in this flow, in order.
    pub fn messages(&self) -> impl Iterator<Item = &MCPEvent> {
        self.events.iter().filter_map(|e| match e {
            TimelineEvent::Message(m) => Some(m),
            _ => None,
        })
    }
}

/// A call is a retry when its (server, tool) pair already appeared earlier
/// in the same flow.
fn count_retries(calls: &[FlowCall]) -> usize {
    let mut seen = BTreeSet::new();
    let mut retries = 0;
    for call in calls {
        let key = (call.server.clone(), call.tool.clone());
        if !seen.insert(key) {
            retries += 1;
        }
    }
    retries
}

/// A flow succeeded iff any decision completed successfully, or a tools/call
/// request got a corresponding non-error response (matched by id when the
/// response carries one).
fn determine_success(events: &[TimelineEvent], call_ids: &[Value]) -> bool {
    let decision_success = events.iter().any(|e| {
        matches!(e, TimelineEvent::Decision(d) if d.success == Some(true))
    });
    if decision_success {
        return true;
    }

    if call_ids.is_empty() {
        return false;
    }

    events.iter().any(|e| match e {
        TimelineEvent::Message(m) => {
            m.direction == Direction::ServerToHost
                && m.result().is_some()
                && m.error().is_none()
                && m.id().map(|id| call_ids.contains(id)).unwrap_or(false)
        }
        _ => false,
    })
}

/// Classify one event for the display timeline.
fn timeline_entry(event: &TimelineEvent) -> TimelineEntry {
    match event {
        TimelineEvent::Prompt(p) => TimelineEntry {
            timestamp: p.timestamp,
            kind: "user_prompt",
            source: "user_prompt",
            server: Some(p.server_name.clone()),
            content: truncate_utf8_safe(&p.user_prompt, 100).to_string(),
        },
        TimelineEvent::Decision(d) => {
            let kind = if d.user_prompt.contains("[Tool Discovery]") {
                "llm_tool_discovery"
            } else if !d.tools_selected.is_empty() {
                "llm_tool_selection"
            } else {
                "llm_reasoning"
            };
            let content = if d.tools_selected.is_empty() {
                d.reasoning.clone().unwrap_or_default()
            } else {
                format!(
                    "Selected {}: {}",
                    d.tools_selected.join(", "),
                    d.reasoning.as_deref().unwrap_or("")
                )
            };
            TimelineEntry {
                timestamp: d.timestamp,
                kind,
                source: "llm_decision",
                server: None,
                content: truncate_utf8_safe(&content, 100).to_string(),
            }
        }
        TimelineEvent::Message(m) => {
            let (kind, content) = match (m.direction, m.method()) {
                (Direction::HostToServer, Some("tools/call")) => (
                    "tool_call",
                    format!("Call {}", m.tool_name().unwrap_or("unknown")),
                ),
                (Direction::HostToServer, Some("initialize")) => {
                    ("initialization", "initialize".to_string())
                }
                (Direction::HostToServer, Some(method)) => ("llm_request", method.to_string()),
                (Direction::HostToServer, None) => ("llm_request", "request".to_string()),
                (Direction::ServerToHost, _) => (
                    "mcp_response",
                    m.method().unwrap_or("response").to_string(),
                ),
            };
            TimelineEntry {
                timestamp: m.timestamp,
                kind,
                source: "mcp_audit",
                server: Some(m.server_name.clone()),
                content: truncate_utf8_safe(&content, 100).to_string(),
            }
        }
    }
}
