// Cognitive scorer - rule-based load analysis over interaction flows
//
// Five weighted sub-scores, each clamped to [0, 100], derived from heuristics
// over one flow: prompt complexity, context switching, retry frustration,
// configuration friction, and integration cognition. No ML anywhere; the
// scorer is a pure function of its input flow set.

pub mod issues;

use crate::events::Direction;
use crate::timeline::Flow;
use crate::util::json_object_depth;
use serde::Serialize;

// Weights sum to exactly 1.0. Retries and configuration issues dominate
// because they are the strongest signals of a user actually struggling.
pub const WEIGHT_PROMPT_COMPLEXITY: f64 = 0.15;
pub const WEIGHT_CONTEXT_SWITCHING: f64 = 0.20;
pub const WEIGHT_RETRY_FRUSTRATION: f64 = 0.30;
pub const WEIGHT_CONFIGURATION_FRICTION: f64 = 0.25;
pub const WEIGHT_INTEGRATION_COGNITION: f64 = 0.10;

const TECHNICAL_TERMS: &[&str] = &[
    "api", "config", "authentication", "parameter", "endpoint", "json", "xml", "database",
    "query", "schema", "token", "oauth", "webhook", "integration", "middleware", "proxy",
    "cache", "sync", "async", "batch", "stream",
];

const LOGIC_TERMS: &[&str] = &[
    "if", "when", "unless", "where", "filter", "sort", "group", "aggregate", "combine",
    "merge", "transform", "convert", "validate", "parse",
];

const ACTION_VERBS: &[&str] = &[
    "create", "update", "delete", "get", "set", "add", "remove", "modify", "send", "receive",
    "upload", "download", "import", "export", "backup", "restore", "sync", "copy", "move",
    "rename", "list", "search", "find",
];

const TIME_WORDS: &[&str] = &[
    "today", "tomorrow", "yesterday", "week", "month", "year", "hour", "minute", "day", "now",
    "later", "before", "after", "since", "until",
];

const QUANTIFIER_WORDS: &[&str] = &["all", "every", "each", "most", "some", "many", "few"];

const CONFIG_KEYWORDS: &[&str] = &["api key", "token", "auth", "config"];

/// Detailed breakdown of the retry-frustration calculation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetryBreakdown {
    pub base_score: f64,
    pub retry_penalty: f64,
    pub retry_count: usize,
    pub failure_penalty: f64,
    pub failed_interaction: bool,
    pub error_penalty: f64,
    pub actual_error_count: usize,
    pub latency_penalty: f64,
    pub latency_ms: i64,
    pub latency_threshold_ms: i64,
    pub explanations: Vec<String>,
}

/// Detailed breakdown of the configuration-friction calculation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigurationBreakdown {
    pub base_score: f64,
    pub auth_penalty: f64,
    pub param_penalty: f64,
    pub config_keyword_penalty: f64,
    pub latency_penalty: f64,
    pub latency_ms: i64,
    pub latency_threshold_ms: i64,
    pub explanations: Vec<String>,
}

/// Cognitive load metrics for a flow or an aggregated flow set.
#[derive(Debug, Clone, Serialize)]
pub struct CognitiveLoadMetrics {
    pub overall_score: f64,
    pub prompt_complexity: f64,
    pub context_switching: f64,
    pub retry_frustration: f64,
    pub configuration_friction: f64,
    pub integration_cognition: f64,
    pub grade: String,
    pub friction_points: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_breakdown: Option<RetryBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_breakdown: Option<ConfigurationBreakdown>,
}

/// Letter grade bands over the overall cognitive load score: lower is better.
pub fn grade(overall_score: f64) -> &'static str {
    if overall_score <= 20.0 {
        "A"
    } else if overall_score <= 40.0 {
        "B"
    } else if overall_score <= 60.0 {
        "C"
    } else if overall_score <= 80.0 {
        "D"
    } else {
        "F"
    }
}

/// Rule-based scorer. Construction only fixes the latency baseline; every
/// scoring call is pure.
#[derive(Debug, Clone)]
pub struct CognitiveScorer {
    baseline_latency_ms: i64,
}

impl CognitiveScorer {
    pub fn new(baseline_latency_ms: i64) -> Self {
        Self {
            baseline_latency_ms,
        }
    }

    /// Score one flow.
    pub fn analyze_flow(&self, flow: &Flow) -> CognitiveLoadMetrics {
        let prompt_complexity = self.prompt_complexity(flow);
        let context_switching = self.context_switching(flow);
        let (retry_frustration, retry_breakdown) = self.retry_frustration(flow);
        let (configuration_friction, configuration_breakdown) =
            self.configuration_friction(flow);
        let integration_cognition = self.integration_cognition(flow);

        let overall_score = overall(
            prompt_complexity,
            context_switching,
            retry_frustration,
            configuration_friction,
            integration_cognition,
        );

        CognitiveLoadMetrics {
            overall_score,
            prompt_complexity,
            context_switching,
            retry_frustration,
            configuration_friction,
            integration_cognition,
            grade: grade(overall_score).to_string(),
            friction_points: Vec::new(),
            retry_breakdown: Some(retry_breakdown),
            configuration_breakdown: Some(configuration_breakdown),
        }
    }

    /// Score a flow set: arithmetic mean of each sub-score across flows,
    /// overall from the weighted means, friction points for any dimension
    /// above 60. Returns None for an empty set.
    pub fn analyze_flows(&self, flows: &[Flow]) -> Option<CognitiveLoadMetrics> {
        if flows.is_empty() {
            return None;
        }

        let per_flow: Vec<CognitiveLoadMetrics> =
            flows.iter().map(|f| self.analyze_flow(f)).collect();
        let n = per_flow.len() as f64;

        let prompt_complexity = per_flow.iter().map(|m| m.prompt_complexity).sum::<f64>() / n;
        let context_switching = per_flow.iter().map(|m| m.context_switching).sum::<f64>() / n;
        let retry_frustration = per_flow.iter().map(|m| m.retry_frustration).sum::<f64>() / n;
        let configuration_friction =
            per_flow.iter().map(|m| m.configuration_friction).sum::<f64>() / n;
        let integration_cognition =
            per_flow.iter().map(|m| m.integration_cognition).sum::<f64>() / n;

        let overall_score = overall(
            prompt_complexity,
            context_switching,
            retry_frustration,
            configuration_friction,
            integration_cognition,
        );

        let mut friction_points = Vec::new();
        if prompt_complexity > 60.0 {
            friction_points.push("High prompt complexity detected".to_string());
        }
        if context_switching > 60.0 {
            friction_points.push("Frequent context switching required".to_string());
        }
        if retry_frustration > 60.0 {
            friction_points.push("Users experiencing retry frustration".to_string());
        }
        if configuration_friction > 60.0 {
            friction_points.push("Configuration complexity causing friction".to_string());
        }
        if integration_cognition > 60.0 {
            friction_points.push("Tool integration complexity".to_string());
        }
        if friction_points.is_empty() {
            friction_points.push("No significant friction points detected".to_string());
        }

        // Keep the most recent flow's breakdowns for the report drill-down
        let latest = per_flow.last();

        Some(CognitiveLoadMetrics {
            overall_score,
            prompt_complexity,
            context_switching,
            retry_frustration,
            configuration_friction,
            integration_cognition,
            grade: grade(overall_score).to_string(),
            friction_points,
            retry_breakdown: latest.and_then(|m| m.retry_breakdown.clone()),
            configuration_breakdown: latest.and_then(|m| m.configuration_breakdown.clone()),
        })
    }

    /// Sub-score 1: how demanding the user's prompt itself was.
    fn prompt_complexity(&self, flow: &Flow) -> f64 {
        let query = flow
            .user_prompt
            .as_deref()
            .unwrap_or("")
            .to_lowercase();

        // Inferred/placeholder prompts carry no signal: base score only
        if query.contains("[inferred]")
            || query.contains("user request requiring")
            || query.contains("unknown")
            || query.trim().len() < 3
        {
            return 20.0;
        }

        let mut score: f64 = 20.0;

        let words: Vec<&str> = query.split_whitespace().collect();
        let word_count = words.len();
        if word_count > 10 {
            score += 25.0;
        } else if word_count > 5 {
            score += 15.0;
        } else if word_count > 2 {
            score += 5.0;
        }

        let technical_count = TECHNICAL_TERMS.iter().filter(|t| query.contains(*t)).count();
        score += technical_count as f64 * 8.0;

        let logic_count = LOGIC_TERMS.iter().filter(|t| query.contains(*t)).count();
        score += logic_count as f64 * 10.0;

        let action_count = ACTION_VERBS.iter().filter(|v| query.contains(*v)).count();
        if action_count > 2 {
            score += (action_count - 1) as f64 * 12.0;
        }

        if TIME_WORDS.iter().any(|w| query.contains(w)) {
            score += 15.0;
        }

        if query.chars().any(|c| c.is_ascii_digit())
            || QUANTIFIER_WORDS.iter().any(|w| query.contains(w))
        {
            score += 10.0;
        }

        score.min(100.0)
    }

    /// Sub-score 2: direction changes and method transitions inside a flow.
    fn context_switching(&self, flow: &Flow) -> f64 {
        let messages: Vec<_> = flow.messages().collect();
        if messages.len() < 2 {
            return 20.0;
        }

        let mut score = 0.0;

        let mut direction_changes = 0;
        let mut last_direction: Option<Direction> = None;
        for message in &messages {
            if let Some(last) = last_direction {
                if message.direction != last {
                    direction_changes += 1;
                }
            }
            last_direction = Some(message.direction);
        }
        score += direction_changes as f64 * 10.0;

        // Method transitions cost more than direction flips
        let mut method_changes = 0;
        let mut last_method: Option<&str> = None;
        for message in &messages {
            if let Some(current) = message.method() {
                if let Some(last) = last_method {
                    if current != last {
                        method_changes += 1;
                    }
                }
                last_method = Some(current);
            }
        }
        score += method_changes as f64 * 15.0;

        // Floor for any multi-message flow
        if score == 0.0 {
            score = 5.0;
        }

        score.min(100.0)
    }

    /// Sub-score 3: retries, failures, hard errors, and slow responses.
    fn retry_frustration(&self, flow: &Flow) -> (f64, RetryBreakdown) {
        let mut score = 10.0;
        let mut breakdown = RetryBreakdown {
            base_score: 10.0,
            retry_count: flow.retry_count,
            failed_interaction: !flow.success,
            latency_ms: flow.duration_ms,
            latency_threshold_ms: self.baseline_latency_ms * 2,
            ..RetryBreakdown::default()
        };

        if flow.retry_count > 0 {
            let penalty = flow.retry_count as f64 * 25.0;
            score += penalty;
            breakdown.retry_penalty = penalty;
            breakdown.explanations.push(format!(
                "Retry attempts detected: {} retries x 25 points each",
                flow.retry_count
            ));
        }

        if !flow.success {
            score += 40.0;
            breakdown.failure_penalty = 40.0;
            breakdown
                .explanations
                .push("Interaction failed to complete successfully".to_string());
        }

        let error_count = flow
            .messages()
            .filter(|m| is_hard_error(m.error_code.as_deref()))
            .count();
        if error_count > 0 {
            let penalty = error_count as f64 * 20.0;
            score += penalty;
            breakdown.error_penalty = penalty;
            breakdown.actual_error_count = error_count;
            breakdown.explanations.push(format!(
                "Error responses detected: {error_count} x 20 points each"
            ));
        }

        // Users tolerate slow success better than slow failure
        if flow.duration_ms > 0 && flow.duration_ms > self.baseline_latency_ms * 2 {
            let penalty = if flow.success { 15.0 } else { 30.0 };
            score += penalty;
            breakdown.latency_penalty = penalty;
            breakdown.explanations.push(format!(
                "Slow response: {:.1}s exceeds {:.0}s threshold",
                flow.duration_ms as f64 / 1000.0,
                (self.baseline_latency_ms * 2) as f64 / 1000.0
            ));
        }

        (score.min(100.0), breakdown)
    }

    /// Sub-score 4: authentication and configuration trouble.
    fn configuration_friction(&self, flow: &Flow) -> (f64, ConfigurationBreakdown) {
        let mut score = 10.0;
        let mut breakdown = ConfigurationBreakdown {
            base_score: 10.0,
            latency_ms: flow.duration_ms,
            latency_threshold_ms: self.baseline_latency_ms * 3,
            ..ConfigurationBreakdown::default()
        };

        let mut auth_errors = 0;
        let mut param_errors = 0;
        for message in flow.messages() {
            match message.error_code.as_deref() {
                Some("401") | Some("403") => {
                    auth_errors += 1;
                    score += 50.0;
                    breakdown.auth_penalty += 50.0;
                }
                Some("400") | Some("422") => {
                    param_errors += 1;
                    score += 30.0;
                    breakdown.param_penalty += 30.0;
                }
                _ => {}
            }
        }
        if auth_errors > 0 {
            breakdown.explanations.push(format!(
                "Authentication errors: {auth_errors} auth failures (401/403) x 50 points each"
            ));
        }
        if param_errors > 0 {
            breakdown.explanations.push(format!(
                "Parameter validation errors: {param_errors} failures (400/422) x 30 points each"
            ));
        }

        // Config keywords only count inside error payloads
        let mut keyword_hits = 0;
        for message in flow.messages() {
            if message.error_code.is_none() {
                continue;
            }
            let payload_str = message.payload.to_string().to_lowercase();
            if CONFIG_KEYWORDS.iter().any(|k| payload_str.contains(k)) {
                keyword_hits += 1;
                score += 35.0;
                breakdown.config_keyword_penalty += 35.0;
            }
        }
        if keyword_hits > 0 {
            breakdown.explanations.push(format!(
                "Configuration keywords in errors: {keyword_hits} x 35 points each"
            ));
        }

        if flow.duration_ms > self.baseline_latency_ms * 3 {
            let penalty = if flow.success { 10.0 } else { 25.0 };
            score += penalty;
            breakdown.latency_penalty = penalty;
            breakdown.explanations.push(format!(
                "Slow response: {:.1}s exceeds {:.0}s threshold",
                flow.duration_ms as f64 / 1000.0,
                (self.baseline_latency_ms * 3) as f64 / 1000.0
            ));
        }

        (score.min(100.0), breakdown)
    }

    /// Sub-score 5: structural complexity of the integration itself.
    fn integration_cognition(&self, flow: &Flow) -> f64 {
        let mut score = 20.0;

        let protocols: std::collections::BTreeSet<&str> =
            flow.messages().map(|m| m.protocol.as_str()).collect();
        if protocols.len() > 1 {
            score += 20.0;
        }

        let directions: std::collections::BTreeSet<Direction> =
            flow.messages().map(|m| m.direction).collect();
        score += directions.len() as f64 * 10.0;

        for message in flow.messages() {
            if json_object_depth(&message.payload) > 3 {
                score += 15.0;
            }
        }

        score.min(100.0)
    }
}

/// Weighted overall score (weights sum to 1.0).
fn overall(
    prompt_complexity: f64,
    context_switching: f64,
    retry_frustration: f64,
    configuration_friction: f64,
    integration_cognition: f64,
) -> f64 {
    let score = prompt_complexity * WEIGHT_PROMPT_COMPLEXITY
        + context_switching * WEIGHT_CONTEXT_SWITCHING
        + retry_frustration * WEIGHT_RETRY_FRUSTRATION
        + configuration_friction * WEIGHT_CONFIGURATION_FRICTION
        + integration_cognition * WEIGHT_INTEGRATION_COGNITION;
    score.min(100.0)
}

/// Hard errors are HTTP 4xx/5xx classes or transport-level failures.
fn is_hard_error(error_code: Option<&str>) -> bool {
    match error_code {
        None => false,
        Some(code) => {
            code.starts_with('4')
                || code.starts_with('5')
                || matches!(code, "timeout" | "connection_error" | "parse_error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        Direction, EnhancedContext, MCPEvent, TimelineEvent, PROTOCOL_JSON_RPC,
    };
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn message(at: i64, direction: Direction, payload: Value) -> TimelineEvent {
        let error_code = payload
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(String::from);
        TimelineEvent::Message(MCPEvent {
            timestamp: ts(at),
            server_name: "weather".into(),
            server_process_id: 1,
            direction,
            protocol: PROTOCOL_JSON_RPC.into(),
            payload,
            latency_ms: None,
            error_code,
            enhanced_context: EnhancedContext::default(),
        })
    }

    fn call(at: i64, id: u64, tool: &str) -> TimelineEvent {
        message(
            at,
            Direction::HostToServer,
            json!({"jsonrpc": "2.0", "id": id, "method": "tools/call",
                   "params": {"name": tool, "arguments": {"city": "London"}}}),
        )
    }

    fn ok_response(at: i64, id: u64) -> TimelineEvent {
        message(
            at,
            Direction::ServerToHost,
            json!({"jsonrpc": "2.0", "id": id, "result": {"temp": 15}}),
        )
    }

    fn auth_error(at: i64, id: u64) -> TimelineEvent {
        message(
            at,
            Direction::ServerToHost,
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32001, "message": "401"}}),
        )
    }

    fn flow_of(events: Vec<TimelineEvent>) -> Flow {
        Flow::from_events(events).unwrap()
    }

    fn scorer() -> CognitiveScorer {
        CognitiveScorer::new(15_000)
    }

    #[test]
    fn weights_sum_to_one() {
        let sum = WEIGHT_PROMPT_COMPLEXITY
            + WEIGHT_CONTEXT_SWITCHING
            + WEIGHT_RETRY_FRUSTRATION
            + WEIGHT_CONFIGURATION_FRICTION
            + WEIGHT_INTEGRATION_COGNITION;
        assert!((sum - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn single_successful_call_grades_a() {
        let flow = flow_of(vec![call(0, 1, "get_weather"), ok_response(120, 1)]);
        let metrics = scorer().analyze_flows(std::slice::from_ref(&flow)).unwrap();

        assert_eq!(metrics.retry_frustration, 10.0);
        assert!(metrics.overall_score <= 20.0, "{:?}", metrics);
        assert_eq!(metrics.grade, "A");
        assert_eq!(
            metrics.friction_points,
            vec!["No significant friction points detected"]
        );
    }

    #[test]
    fn auth_failure_then_retry_raises_config_and_retry_scores() {
        let flow = flow_of(vec![
            call(0, 1, "get_weather"),
            auth_error(50, 1),
            call(200, 2, "get_weather"),
            ok_response(320, 2),
        ]);
        assert!(flow.success);
        assert_eq!(flow.retry_count, 1);

        let scorer = scorer();
        let metrics = scorer.analyze_flow(&flow);

        // One 401 hit: 10 base + 50 auth
        assert!(metrics.configuration_friction >= 60.0, "{:?}", metrics);
        // One retry + one hard error: 10 + 25 + 20; no failure penalty
        assert!(metrics.retry_frustration >= 35.0, "{:?}", metrics);
        assert!(metrics.retry_frustration < 100.0);

        let breakdown = metrics.retry_breakdown.unwrap();
        assert_eq!(breakdown.retry_count, 1);
        assert_eq!(breakdown.failure_penalty, 0.0);
        assert_eq!(breakdown.actual_error_count, 1);
    }

    #[test]
    fn failed_flow_takes_the_failure_penalty() {
        let flow = flow_of(vec![call(0, 1, "x"), auth_error(50, 1)]);
        assert!(!flow.success);

        let (score, breakdown) = scorer().retry_frustration(&flow);
        // 10 base + 40 failure + 20 hard error
        assert_eq!(score, 70.0);
        assert_eq!(breakdown.failure_penalty, 40.0);
    }

    #[test]
    fn all_scores_stay_in_bounds_under_extreme_input() {
        // Many retries, many errors, slow, failed: every clamp must hold
        let mut events = Vec::new();
        for i in 0..12 {
            events.push(call(i * 1_000, i as u64, "same_tool"));
            events.push(auth_error(i * 1_000 + 500, i as u64));
        }
        let flow = flow_of(events);
        let metrics = scorer().analyze_flow(&flow);

        for score in [
            metrics.overall_score,
            metrics.prompt_complexity,
            metrics.context_switching,
            metrics.retry_frustration,
            metrics.configuration_friction,
            metrics.integration_cognition,
        ] {
            assert!((0.0..=100.0).contains(&score), "{:?}", metrics);
        }
        assert_eq!(metrics.grade, grade(metrics.overall_score));
    }

    #[test]
    fn inferred_prompts_short_circuit_to_base_complexity() {
        let mut flow = flow_of(vec![call(0, 1, "x")]);
        flow.user_prompt = Some("[Inferred] User request requiring tool usage".into());
        assert_eq!(scorer().prompt_complexity(&flow), 20.0);

        flow.user_prompt = None;
        assert_eq!(scorer().prompt_complexity(&flow), 20.0);
    }

    #[test]
    fn rich_prompts_accumulate_complexity() {
        let mut flow = flow_of(vec![call(0, 1, "x")]);
        // 9 words, "api"+"token" technical, "filter" logic, temporal "today",
        // digits
        flow.user_prompt =
            Some("filter all api token usage from today and list 5 entries".into());
        let score = scorer().prompt_complexity(&flow);
        assert!(score > 60.0, "{score}");
        assert!(score <= 100.0);
    }

    #[test]
    fn context_switching_counts_directions_and_methods() {
        // call -> response -> list -> response: 3 direction changes, and
        // method transition tools/call -> tools/list
        let events = vec![
            call(0, 1, "x"),
            ok_response(100, 1),
            message(
                200,
                Direction::HostToServer,
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            ),
            ok_response(300, 2),
        ];
        let flow = flow_of(events);
        let score = scorer().context_switching(&flow);
        assert_eq!(score, 3.0 * 10.0 + 15.0);
    }

    #[test]
    fn single_message_flow_has_base_context_switching() {
        let flow = flow_of(vec![call(0, 1, "x")]);
        assert_eq!(scorer().context_switching(&flow), 20.0);
    }

    #[test]
    fn latency_penalty_kicks_in_past_twice_baseline() {
        let fast = CognitiveScorer::new(15_000);
        // 40 s duration, successful: over 2x baseline (30 s)
        let flow = flow_of(vec![call(0, 1, "x"), ok_response(40_000, 1)]);
        let (score, breakdown) = fast.retry_frustration(&flow);
        assert_eq!(breakdown.latency_penalty, 15.0);
        assert_eq!(score, 25.0);

        // Raising the baseline makes the same flow clean
        let lenient = CognitiveScorer::new(60_000);
        let (score, breakdown) = lenient.retry_frustration(&flow);
        assert_eq!(breakdown.latency_penalty, 0.0);
        assert_eq!(score, 10.0);
    }

    #[test]
    fn config_keywords_count_only_in_error_payloads() {
        // "auth" appears in a successful payload: no keyword penalty
        let ok_flow = flow_of(vec![
            call(0, 1, "x"),
            message(
                100,
                Direction::ServerToHost,
                json!({"jsonrpc": "2.0", "id": 1, "result": {"auth": "ok token"}}),
            ),
        ]);
        let (score, breakdown) = scorer().configuration_friction(&ok_flow);
        assert_eq!(breakdown.config_keyword_penalty, 0.0);
        assert_eq!(score, 10.0);

        // Same keyword inside an error payload does count
        let err_flow = flow_of(vec![
            call(0, 1, "x"),
            message(
                100,
                Direction::ServerToHost,
                json!({"jsonrpc": "2.0", "id": 1,
                       "error": {"code": -1, "message": "401 invalid api key"}}),
            ),
        ]);
        let (_, breakdown) = scorer().configuration_friction(&err_flow);
        assert_eq!(breakdown.config_keyword_penalty, 35.0);
        assert_eq!(breakdown.auth_penalty, 50.0);
    }

    #[test]
    fn deep_payloads_raise_integration_score() {
        let shallow = flow_of(vec![call(0, 1, "x"), ok_response(100, 1)]);
        let deep = flow_of(vec![
            message(
                0,
                Direction::HostToServer,
                json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                       "params": {"name": "x", "arguments": {"a": {"b": {"c": {"d": 1}}}}}}),
            ),
            ok_response(100, 1),
        ]);
        let scorer = scorer();
        assert!(
            scorer.integration_cognition(&deep) > scorer.integration_cognition(&shallow)
        );
    }

    #[test]
    fn scorer_is_pure() {
        let flow = flow_of(vec![call(0, 1, "x"), ok_response(100, 1)]);
        let scorer = scorer();
        let once = serde_json::to_string(&scorer.analyze_flow(&flow)).unwrap();
        let twice = serde_json::to_string(&scorer.analyze_flow(&flow)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn aggregate_is_component_mean() {
        let good = flow_of(vec![call(0, 1, "x"), ok_response(100, 1)]);
        let bad = flow_of(vec![call(0, 1, "x"), auth_error(50, 1)]);
        let scorer = scorer();

        let a = scorer.analyze_flow(&good);
        let b = scorer.analyze_flow(&bad);
        let agg = scorer.analyze_flows(&[good, bad]).unwrap();

        let expected = (a.retry_frustration + b.retry_frustration) / 2.0;
        assert!((agg.retry_frustration - expected).abs() < 1e-9);
    }

    #[test]
    fn empty_flow_set_has_no_metrics() {
        assert!(scorer().analyze_flows(&[]).is_none());
    }
}
