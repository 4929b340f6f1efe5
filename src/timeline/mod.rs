// Timeline correlator - merges event streams and slices them into flows
//
// Correlation is deliberately simple: merge everything by capture timestamp,
// then cut a new flow wherever the gap between consecutive events exceeds
// the configured window. Timestamps are the source of truth; cross-stream
// ordering beyond them is not reconstructed.

mod flow;

pub use flow::{Flow, FlowCall, TimelineEntry};

use crate::events::{LLMDecisionEvent, MCPEvent, TimelineEvent, UserPromptEvent};
use crate::store::{EventStore, Stream};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Aggregate statistics over a flow set, consumed by the exporter and the
/// report assembler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowSetSummary {
    pub total_flows: usize,
    pub successful_flows: usize,
    pub cross_server_flows: usize,
    pub flows_with_user_context: usize,
    pub flows_with_llm_reasoning: usize,
    pub success_rate: f64,
    pub user_context_rate: f64,
    pub llm_reasoning_rate: f64,
    /// 1 − (successful user-context flows / user-context flows).
    pub abandonment_rate: f64,
    pub total_tool_calls: usize,
    pub total_llm_decisions: usize,
    /// Successful flows' tool calls over all tool calls.
    pub tool_usage_success_rate: f64,
    pub avg_flow_duration_ms: f64,
    pub servers_involved: Vec<String>,
}

/// Merges the event streams and reconstructs interaction flows.
#[derive(Debug, Clone)]
pub struct TimelineCorrelator {
    store: EventStore,
    time_window_seconds: i64,
}

impl TimelineCorrelator {
    pub fn new(store: EventStore, time_window_seconds: i64) -> Self {
        Self {
            store,
            time_window_seconds,
        }
    }

    /// Load events from all streams with `timestamp >= now - since_hours`,
    /// merged and sorted by timestamp (stable: ties keep stream order).
    pub fn load_events(&self, since_hours: f64) -> Vec<TimelineEvent> {
        let cutoff = Utc::now() - Duration::milliseconds((since_hours * 3_600_000.0) as i64);
        self.load_events_since(Some(cutoff))
    }

    /// Load and merge with an explicit cutoff (None = everything).
    pub fn load_events_since(&self, since: Option<DateTime<Utc>>) -> Vec<TimelineEvent> {
        let mut events: Vec<TimelineEvent> = Vec::new();

        match self
            .store
            .read(Stream::McpAuditMessages, since, |e: &MCPEvent| {
                Some(e.timestamp)
            }) {
            Ok(messages) => {
                tracing::debug!("loaded {} MCP messages", messages.len());
                events.extend(messages.into_iter().map(TimelineEvent::Message));
            }
            Err(e) => tracing::error!("failed to load MCP messages: {}", e),
        }

        match self
            .store
            .read(Stream::LlmDecisionTrace, since, |e: &LLMDecisionEvent| {
                Some(e.timestamp)
            }) {
            Ok(decisions) => {
                tracing::debug!("loaded {} LLM decisions", decisions.len());
                events.extend(decisions.into_iter().map(TimelineEvent::Decision));
            }
            Err(e) => tracing::error!("failed to load LLM decisions: {}", e),
        }

        match self
            .store
            .read(Stream::UserPrompts, since, |e: &UserPromptEvent| {
                Some(e.timestamp)
            }) {
            Ok(prompts) => {
                tracing::debug!("loaded {} user prompts", prompts.len());
                events.extend(prompts.into_iter().map(TimelineEvent::Prompt));
            }
            Err(e) => tracing::error!("failed to load user prompts: {}", e),
        }

        // Stable sort: identical timestamps preserve input order
        events.sort_by_key(TimelineEvent::timestamp);
        events
    }

    /// Partition merged events into flows by the gap rule: a new flow starts
    /// at the first event and wherever the gap to the previous event exceeds
    /// the window.
    pub fn group_into_flows(&self, events: Vec<TimelineEvent>) -> Vec<Flow> {
        let mut flows = Vec::new();
        let mut current: Vec<TimelineEvent> = Vec::new();

        for event in events {
            // Full-precision comparison: truncating to whole seconds would
            // keep a 30.9s gap inside a 30s window
            let gap_exceeded = current.last().map(|prev| {
                (event.timestamp() - prev.timestamp()).num_milliseconds()
                    > self.time_window_seconds * 1000
            });
            if gap_exceeded == Some(true) {
                if let Some(flow) = Flow::from_events(std::mem::take(&mut current)) {
                    flows.push(flow);
                }
            }
            current.push(event);
        }
        if let Some(flow) = Flow::from_events(current) {
            flows.push(flow);
        }

        tracing::debug!("grouped events into {} interaction flows", flows.len());
        flows
    }

    /// Convenience: load + group in one call.
    pub fn flows(&self, since_hours: f64) -> Vec<Flow> {
        let events = self.load_events(since_hours);
        self.group_into_flows(events)
    }

    /// Filter flows by server: exact name or comma-separated list; empty or
    /// "all" passes everything through.
    pub fn filter_by_server(flows: Vec<Flow>, server_filter: &str) -> Vec<Flow> {
        if server_filter.is_empty() || server_filter == "all" {
            return flows;
        }
        let wanted: Vec<&str> = server_filter.split(',').map(str::trim).collect();
        flows
            .into_iter()
            .filter(|f| {
                wanted
                    .iter()
                    .any(|w| f.servers_involved.iter().any(|s| s == w))
            })
            .collect()
    }

    /// Aggregate statistics over a flow set.
    pub fn summarize(flows: &[Flow]) -> FlowSetSummary {
        if flows.is_empty() {
            return FlowSetSummary {
                abandonment_rate: 1.0,
                ..FlowSetSummary::default()
            };
        }

        let total = flows.len();
        let successful = flows.iter().filter(|f| f.success).count();
        let cross_server = flows.iter().filter(|f| f.cross_server_flow).count();
        let with_context = flows.iter().filter(|f| f.has_user_context).count();
        let with_reasoning = flows.iter().filter(|f| f.llm_reasoning.is_some()).count();

        let user_flows: Vec<&Flow> = flows.iter().filter(|f| f.has_user_context).collect();
        let successful_completions = user_flows.iter().filter(|f| f.success).count();
        let abandonment_rate = if user_flows.is_empty() {
            1.0
        } else {
            1.0 - successful_completions as f64 / user_flows.len() as f64
        };

        let total_tool_calls: usize = flows.iter().map(|f| f.mcp_calls.len()).sum();
        let successful_tool_calls: usize = flows
            .iter()
            .filter(|f| f.success)
            .map(|f| f.mcp_calls.len())
            .sum();
        let tool_usage_success_rate = if total_tool_calls > 0 {
            successful_tool_calls as f64 / total_tool_calls as f64
        } else {
            0.0
        };

        let mut servers: Vec<String> = flows
            .iter()
            .flat_map(|f| f.servers_involved.iter().cloned())
            .collect();
        servers.sort();
        servers.dedup();

        FlowSetSummary {
            total_flows: total,
            successful_flows: successful,
            cross_server_flows: cross_server,
            flows_with_user_context: with_context,
            flows_with_llm_reasoning: with_reasoning,
            success_rate: successful as f64 / total as f64,
            user_context_rate: with_context as f64 / total as f64,
            llm_reasoning_rate: with_reasoning as f64 / total as f64,
            abandonment_rate,
            total_tool_calls,
            total_llm_decisions: flows.iter().map(|f| f.llm_decisions.len()).sum(),
            tool_usage_success_rate,
            avg_flow_duration_ms: flows.iter().map(|f| f.duration_ms as f64).sum::<f64>()
                / total as f64,
            servers_involved: servers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Direction, EnhancedContext, PromptSource, PROTOCOL_JSON_RPC};
    use serde_json::{json, Value};

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn message(
        at: i64,
        server: &str,
        direction: Direction,
        payload: Value,
    ) -> TimelineEvent {
        TimelineEvent::Message(MCPEvent {
            timestamp: ts(at),
            server_name: server.to_string(),
            server_process_id: 1,
            direction,
            protocol: PROTOCOL_JSON_RPC.into(),
            payload,
            latency_ms: None,
            error_code: None,
            enhanced_context: EnhancedContext::default(),
        })
    }

    fn tool_call(at: i64, server: &str, id: u64, tool: &str) -> TimelineEvent {
        message(
            at,
            server,
            Direction::HostToServer,
            json!({
                "jsonrpc": "2.0", "id": id, "method": "tools/call",
                "params": {"name": tool, "arguments": {}}
            }),
        )
    }

    fn response(at: i64, server: &str, id: u64) -> TimelineEvent {
        message(
            at,
            server,
            Direction::ServerToHost,
            json!({"jsonrpc": "2.0", "id": id, "result": {"ok": true}}),
        )
    }

    fn correlator(window: i64) -> (TimelineCorrelator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path()).unwrap();
        (TimelineCorrelator::new(store, window), dir)
    }

    #[test]
    fn single_call_and_response_form_one_successful_flow() {
        let (c, _dir) = correlator(30);
        let events = vec![
            tool_call(0, "weather", 1, "get_weather"),
            response(120, "weather", 1),
        ];
        let flows = c.group_into_flows(events);

        assert_eq!(flows.len(), 1);
        let flow = &flows[0];
        assert_eq!(flow.event_count, 2);
        assert!(flow.success);
        assert_eq!(flow.duration_ms, 120);
        assert_eq!(flow.mcp_calls.len(), 1);
        assert_eq!(flow.mcp_calls[0].tool.as_deref(), Some("get_weather"));
        assert_eq!(flow.retry_count, 0);
    }

    #[test]
    fn long_pause_splits_flows_at_the_gap_boundary() {
        let (c, _dir) = correlator(30);
        let events = vec![
            tool_call(0, "weather", 1, "get_weather"),
            response(50, "weather", 1),
            // 60 s later: beyond the 30 s window
            tool_call(60_050, "weather", 2, "get_weather"),
        ];
        let flows = c.group_into_flows(events);

        assert_eq!(flows.len(), 2);
        // Within a flow every consecutive gap is <= window; across the
        // boundary it exceeds it
        let gap = flows[1].start_time - flows[0].end_time;
        assert!(gap.num_seconds() > 30);
    }

    #[test]
    fn sub_second_gap_excess_still_splits() {
        let (c, _dir) = correlator(30);
        // 30.999s gap: over the window even though whole seconds say 30
        let events = vec![
            tool_call(0, "weather", 1, "get_weather"),
            tool_call(30_999, "weather", 2, "get_weather"),
        ];
        let flows = c.group_into_flows(events);
        assert_eq!(flows.len(), 2);

        // Exactly the window is still the same flow
        let events = vec![
            tool_call(0, "weather", 1, "get_weather"),
            tool_call(30_000, "weather", 2, "get_weather"),
        ];
        let flows = c.group_into_flows(events);
        assert_eq!(flows.len(), 1);
    }

    #[test]
    fn interleaved_servers_make_a_cross_server_flow() {
        let (c, _dir) = correlator(30);
        let events = vec![
            tool_call(0, "a", 1, "x"),
            tool_call(5_000, "b", 2, "y"),
            response(10_000, "a", 1),
        ];
        let flows = c.group_into_flows(events);

        assert_eq!(flows.len(), 1);
        assert!(flows[0].cross_server_flow);
        assert_eq!(flows[0].servers_involved, vec!["a", "b"]);
    }

    #[test]
    fn error_response_alone_is_not_success() {
        let (c, _dir) = correlator(30);
        let events = vec![
            tool_call(0, "weather", 1, "get_weather"),
            message(
                50,
                "weather",
                Direction::ServerToHost,
                json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32001, "message": "401"}}),
            ),
        ];
        let flows = c.group_into_flows(events);
        assert!(!flows[0].success);
    }

    #[test]
    fn retry_then_success_counts_one_retry_and_succeeds() {
        let (c, _dir) = correlator(30);
        let events = vec![
            tool_call(0, "weather", 1, "get_weather"),
            message(
                50,
                "weather",
                Direction::ServerToHost,
                json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32001, "message": "401"}}),
            ),
            tool_call(200, "weather", 2, "get_weather"),
            response(320, "weather", 2),
        ];
        let flows = c.group_into_flows(events);

        assert_eq!(flows.len(), 1);
        assert!(flows[0].success);
        assert_eq!(flows[0].retry_count, 1);
    }

    #[test]
    fn explicit_prompt_wins_over_decision_prompt() {
        let (c, _dir) = correlator(30);
        let decision = TimelineEvent::Decision(LLMDecisionEvent {
            timestamp: ts(10),
            decision_id: "d1".into(),
            phase: crate::events::DecisionPhase::Discovery,
            user_prompt: "[Inferred] User request requiring tool usage".into(),
            tools_considered: vec![],
            tools_selected: vec![],
            tool_calls: vec![],
            reasoning: Some("picked a tool".into()),
            confidence: None,
            processing_time_ms: None,
            success: None,
        });
        let prompt = TimelineEvent::Prompt(UserPromptEvent {
            timestamp: ts(20),
            user_prompt: "what's the weather in London".into(),
            conversation_id: "c1".into(),
            source: PromptSource::Manual,
            server_name: "weather".into(),
        });

        let flows = c.group_into_flows(vec![decision, prompt]);
        assert_eq!(
            flows[0].user_prompt.as_deref(),
            Some("what's the weather in London")
        );
        assert!(flows[0].has_user_context);
        assert_eq!(flows[0].llm_reasoning.as_deref(), Some("picked a tool"));
    }

    #[test]
    fn server_only_flow_without_prompt_has_no_user_context() {
        let (c, _dir) = correlator(30);
        let flows = c.group_into_flows(vec![response(0, "weather", 9)]);
        assert_eq!(flows.len(), 1);
        assert!(!flows[0].has_user_context);
        assert!(!flows[0].success);
    }

    #[test]
    fn grouping_is_deterministic() {
        let (c, _dir) = correlator(30);
        let events = vec![
            tool_call(0, "a", 1, "x"),
            response(100, "a", 1),
            tool_call(40_000, "a", 2, "y"),
        ];
        let once = serde_json::to_string(&c.group_into_flows(events.clone())).unwrap();
        let twice = serde_json::to_string(&c.group_into_flows(events)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn filter_by_server_accepts_comma_lists() {
        let (c, _dir) = correlator(30);
        let flows = c.group_into_flows(vec![
            tool_call(0, "a", 1, "x"),
            tool_call(60_000, "b", 2, "y"),
            tool_call(120_000, "c", 3, "z"),
        ]);
        assert_eq!(flows.len(), 3);

        let filtered = TimelineCorrelator::filter_by_server(flows.clone(), "a, c");
        assert_eq!(filtered.len(), 2);

        let all = TimelineCorrelator::filter_by_server(flows, "all");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn summary_rates_reflect_the_flow_set() {
        let (c, _dir) = correlator(30);
        let flows = c.group_into_flows(vec![
            tool_call(0, "a", 1, "x"),
            response(100, "a", 1),
            // Separate, failed flow
            tool_call(60_000, "a", 2, "y"),
        ]);
        let summary = TimelineCorrelator::summarize(&flows);

        assert_eq!(summary.total_flows, 2);
        assert_eq!(summary.successful_flows, 1);
        assert_eq!(summary.total_tool_calls, 2);
        assert!((summary.success_rate - 0.5).abs() < 1e-9);
        assert!((summary.tool_usage_success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn loaded_streams_merge_sorted_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path()).unwrap();
        let c = TimelineCorrelator::new(store.clone(), 30);

        let prompt = UserPromptEvent {
            timestamp: ts(500),
            user_prompt: "hello".into(),
            conversation_id: "c".into(),
            source: PromptSource::Manual,
            server_name: "a".into(),
        };
        store.append(Stream::UserPrompts, &prompt).unwrap();

        if let TimelineEvent::Message(m) = tool_call(0, "a", 1, "x") {
            store.append(Stream::McpAuditMessages, &m).unwrap();
        }
        if let TimelineEvent::Message(m) = response(900, "a", 1) {
            store.append(Stream::McpAuditMessages, &m).unwrap();
        }

        let events = c.load_events_since(None);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], TimelineEvent::Message(_)));
        assert!(matches!(events[1], TimelineEvent::Prompt(_)));
        assert!(matches!(events[2], TimelineEvent::Message(_)));
    }
}
