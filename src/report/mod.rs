// Report assembler - combines timeline and scoring results into one object
//
// Rendering is someone else's job: this module produces the typed report,
// the CLI prints it as JSON, and external formatters take it from there.

use crate::scoring::issues::{
    detect_issues, generate_recommendations, Recommendation, Severity, UsabilityIssue,
};
use crate::scoring::{CognitiveLoadMetrics, CognitiveScorer};
use crate::timeline::{Flow, TimelineCorrelator};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Summary of the monitored session window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub total_sessions: usize,
    pub successful_completions: usize,
    pub avg_session_duration_ms: f64,
    pub abandonment_rate: f64,
    pub common_abandonment_points: Vec<String>,
}

/// Analysis of communication patterns across flows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommunicationPatterns {
    pub avg_response_time_ms: f64,
    pub retry_rate: f64,
    pub confidence_decline: bool,
    pub common_confusion_triggers: Vec<String>,
    pub tool_discovery_success_rate: f64,
    pub first_attempt_success_rate: f64,
    pub avg_parameter_errors: f64,
    pub common_failure_points: Vec<String>,
}

/// Complete usability analysis report.
#[derive(Debug, Clone, Serialize)]
pub struct UsabilityReport {
    pub generated_at: DateTime<Utc>,
    pub analysis_window_hours: f64,
    pub server_name: String,
    /// 0..100, higher is better (unlike the cognitive load score).
    pub overall_usability_score: f64,
    pub grade: String,
    pub primary_concerns: Vec<String>,
    pub key_wins: Vec<String>,
    pub session_summary: SessionSummary,
    pub cognitive_load: Option<CognitiveLoadMetrics>,
    pub communication_patterns: CommunicationPatterns,
    pub detected_issues: Vec<UsabilityIssue>,
    pub recommendations: Vec<Recommendation>,
}

/// Usability grade bands: higher score is better, unlike the cognitive grade.
pub fn usability_grade(score: f64) -> &'static str {
    if score >= 90.0 {
        "A"
    } else if score >= 80.0 {
        "B"
    } else if score >= 70.0 {
        "C"
    } else if score >= 60.0 {
        "D"
    } else {
        "F"
    }
}

/// Assemble the full report from a flow set.
pub fn assemble(flows: &[Flow], scorer: &CognitiveScorer, window_hours: f64) -> UsabilityReport {
    let server_name = primary_server(flows);

    if flows.is_empty() {
        return UsabilityReport {
            generated_at: Utc::now(),
            analysis_window_hours: window_hours,
            server_name,
            overall_usability_score: 0.0,
            grade: "F".to_string(),
            primary_concerns: vec!["No interactions detected".to_string()],
            key_wins: Vec::new(),
            session_summary: SessionSummary {
                abandonment_rate: 1.0,
                ..SessionSummary::default()
            },
            cognitive_load: None,
            communication_patterns: CommunicationPatterns::default(),
            detected_issues: Vec::new(),
            recommendations: Vec::new(),
        };
    }

    let session_summary = session_summary(flows);
    let communication_patterns = communication_patterns(flows);
    let cognitive_load = scorer.analyze_flows(flows);
    let detected_issues = detect_issues(flows, scorer);
    let recommendations = generate_recommendations(&detected_issues, cognitive_load.as_ref());

    let overall_usability_score = usability_score(
        cognitive_load.as_ref(),
        &session_summary,
        &communication_patterns,
        &detected_issues,
    );
    let (primary_concerns, key_wins) = executive_summary(
        &detected_issues,
        &communication_patterns,
        cognitive_load.as_ref(),
    );

    UsabilityReport {
        generated_at: Utc::now(),
        analysis_window_hours: window_hours,
        server_name,
        grade: usability_grade(overall_usability_score).to_string(),
        overall_usability_score,
        primary_concerns,
        key_wins,
        session_summary,
        cognitive_load,
        communication_patterns,
        detected_issues,
        recommendations,
    }
}

/// The most frequently seen server across the flow set.
fn primary_server(flows: &[Flow]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for flow in flows {
        for server in &flow.servers_involved {
            *counts.entry(server.as_str()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn session_summary(flows: &[Flow]) -> SessionSummary {
    let total = flows.len();
    let successful = flows.iter().filter(|f| f.success).count();
    let avg_duration =
        flows.iter().map(|f| f.duration_ms as f64).sum::<f64>() / total.max(1) as f64;

    // Where did the failed flows stop?
    let mut abandonment: HashMap<String, usize> = HashMap::new();
    for flow in flows.iter().filter(|f| !f.success) {
        let point = match flow.messages().last() {
            Some(m) => match &m.error_code {
                Some(code) => format!("Error {code}"),
                None if m.payload.to_string().to_lowercase().contains("auth") => {
                    "Authentication".to_string()
                }
                None => "Unknown".to_string(),
            },
            None => "Unknown".to_string(),
        };
        *abandonment.entry(point).or_default() += 1;
    }
    let mut points: Vec<(String, usize)> = abandonment.into_iter().collect();
    points.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    SessionSummary {
        total_sessions: total,
        successful_completions: successful,
        avg_session_duration_ms: avg_duration,
        abandonment_rate: (total - successful) as f64 / total.max(1) as f64,
        common_abandonment_points: points.into_iter().take(3).map(|(p, _)| p).collect(),
    }
}

fn communication_patterns(flows: &[Flow]) -> CommunicationPatterns {
    let total = flows.len().max(1);

    let response_times: Vec<f64> = flows
        .iter()
        .filter(|f| f.duration_ms > 0)
        .map(|f| f.duration_ms as f64)
        .collect();
    let avg_response_time_ms = if response_times.is_empty() {
        0.0
    } else {
        response_times.iter().sum::<f64>() / response_times.len() as f64
    };

    let total_retries: usize = flows.iter().map(|f| f.retry_count).sum();
    let retry_rate = total_retries as f64 / total as f64;

    let first_attempt_successes = flows
        .iter()
        .filter(|f| f.success && f.retry_count == 0)
        .count();

    let mut discovery_attempts = 0;
    let mut discovery_successes = 0;
    for flow in flows {
        if flow.messages().any(|m| m.method() == Some("tools/list")) {
            discovery_attempts += 1;
            if flow.success {
                discovery_successes += 1;
            }
        }
    }
    let tool_discovery_success_rate =
        discovery_successes as f64 / discovery_attempts.max(1) as f64;

    let parameter_errors: usize = flows
        .iter()
        .flat_map(|f| f.messages())
        .filter(|m| matches!(m.error_code.as_deref(), Some("400") | Some("422")))
        .count();

    CommunicationPatterns {
        avg_response_time_ms,
        retry_rate,
        confidence_decline: retry_rate > 0.3,
        common_confusion_triggers: confusion_triggers(flows),
        tool_discovery_success_rate,
        first_attempt_success_rate: first_attempt_successes as f64 / total as f64,
        avg_parameter_errors: parameter_errors as f64 / total as f64,
        common_failure_points: failure_points(flows),
    }
}

fn confusion_triggers(flows: &[Flow]) -> Vec<String> {
    let mut patterns: HashMap<&'static str, usize> = HashMap::new();

    for flow in flows.iter().filter(|f| !f.success || f.retry_count > 1) {
        let query = flow
            .user_prompt
            .as_deref()
            .unwrap_or("")
            .to_lowercase();
        if query.contains("api key") || query.contains("token") {
            *patterns.entry("API key setup").or_default() += 1;
        } else if query.split_whitespace().count() > 8 {
            *patterns.entry("Complex queries").or_default() += 1;
        } else if ["format", "syntax", "parameter"]
            .iter()
            .any(|w| query.contains(w))
        {
            *patterns.entry("Parameter format").or_default() += 1;
        }
    }

    let mut sorted: Vec<(&str, usize)> = patterns.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    sorted
        .into_iter()
        .take(3)
        .map(|(p, _)| p.to_string())
        .collect()
}

fn failure_points(flows: &[Flow]) -> Vec<String> {
    let mut patterns: HashMap<&'static str, usize> = HashMap::new();

    for flow in flows.iter().filter(|f| !f.success) {
        let Some(code) = flow
            .messages()
            .find_map(|m| m.error_code.as_deref())
        else {
            continue;
        };
        let point = match code {
            "401" | "403" => "Authentication",
            "400" | "422" => "Invalid parameters",
            "404" => "Resource not found",
            "429" => "Rate limiting",
            _ => "Server error",
        };
        *patterns.entry(point).or_default() += 1;
    }

    let mut sorted: Vec<(&str, usize)> = patterns.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    sorted
        .into_iter()
        .take(3)
        .map(|(p, _)| p.to_string())
        .collect()
}

/// Overall usability: start from 100, subtract cognitive load, failures,
/// abandonment and issue penalties; reward strong first-attempt behavior.
fn usability_score(
    cognitive_load: Option<&CognitiveLoadMetrics>,
    session_summary: &SessionSummary,
    communication_patterns: &CommunicationPatterns,
    issues: &[UsabilityIssue],
) -> f64 {
    let mut score = 100.0;

    if let Some(load) = cognitive_load {
        score -= load.overall_score * 0.4;
    }

    let success_rate = session_summary.successful_completions as f64
        / session_summary.total_sessions.max(1) as f64;
    score -= (1.0 - success_rate) * 30.0;
    score -= session_summary.abandonment_rate * 20.0;

    for issue in issues {
        score -= match issue.severity {
            Severity::Critical => 15.0,
            Severity::High => 10.0,
            Severity::Medium => 5.0,
            Severity::Low => 2.0,
        };
    }

    if communication_patterns.first_attempt_success_rate > 0.8 {
        score += 5.0;
    }
    if communication_patterns.retry_rate < 0.1 {
        score += 5.0;
    }

    score.clamp(0.0, 100.0)
}

fn executive_summary(
    issues: &[UsabilityIssue],
    communication_patterns: &CommunicationPatterns,
    cognitive_load: Option<&CognitiveLoadMetrics>,
) -> (Vec<String>, Vec<String>) {
    let mut primary_concerns: Vec<String> =
        issues.iter().take(3).map(|i| i.description.clone()).collect();
    let mut key_wins = Vec::new();

    let overall = cognitive_load.map(|l| l.overall_score).unwrap_or(0.0);
    if overall > 80.0 {
        primary_concerns.push("High cognitive load affecting user experience".to_string());
    }
    if communication_patterns.retry_rate > 0.3 {
        primary_concerns.push("High retry rate indicates user confusion".to_string());
    }

    if communication_patterns.first_attempt_success_rate > 0.8 {
        key_wins.push("High first-attempt success rate".to_string());
    }
    if overall < 40.0 {
        key_wins.push("Low cognitive load provides smooth user experience".to_string());
    }
    if communication_patterns.avg_response_time_ms < 1000.0 {
        key_wins.push("Fast response times".to_string());
    }
    if issues.is_empty() {
        key_wins.push("No critical usability issues detected".to_string());
    }

    if primary_concerns.is_empty() {
        primary_concerns.push("No major usability issues identified".to_string());
    }
    if key_wins.is_empty() {
        key_wins.push("Basic functionality works as expected".to_string());
    }

    (primary_concerns, key_wins)
}

/// Assemble a report straight from the store: correlate, filter, score.
pub fn generate(
    correlator: &TimelineCorrelator,
    scorer: &CognitiveScorer,
    server_filter: &str,
    since_hours: f64,
) -> UsabilityReport {
    let flows = correlator.flows(since_hours);
    let flows = TimelineCorrelator::filter_by_server(flows, server_filter);
    assemble(&flows, scorer, since_hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        Direction, EnhancedContext, MCPEvent, TimelineEvent, PROTOCOL_JSON_RPC,
    };
    use serde_json::{json, Value};

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn msg(
        at: i64,
        server: &str,
        direction: Direction,
        payload: Value,
        error: Option<&str>,
    ) -> TimelineEvent {
        TimelineEvent::Message(MCPEvent {
            timestamp: ts(at),
            server_name: server.into(),
            server_process_id: 1,
            direction,
            protocol: PROTOCOL_JSON_RPC.into(),
            payload,
            latency_ms: None,
            error_code: error.map(String::from),
            enhanced_context: EnhancedContext::default(),
        })
    }

    fn good_flow(at: i64, server: &str) -> Flow {
        Flow::from_events(vec![
            msg(
                at,
                server,
                Direction::HostToServer,
                json!({"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"t","arguments":{}}}),
                None,
            ),
            msg(
                at + 100,
                server,
                Direction::ServerToHost,
                json!({"jsonrpc":"2.0","id":1,"result":{}}),
                None,
            ),
        ])
        .unwrap()
    }

    fn failed_flow(at: i64, server: &str, code: &str) -> Flow {
        Flow::from_events(vec![
            msg(
                at,
                server,
                Direction::HostToServer,
                json!({"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"t","arguments":{}}}),
                None,
            ),
            msg(
                at + 100,
                server,
                Direction::ServerToHost,
                json!({"jsonrpc":"2.0","id":1,"error":{"message":code}}),
                Some(code),
            ),
        ])
        .unwrap()
    }

    fn scorer() -> CognitiveScorer {
        CognitiveScorer::new(15_000)
    }

    #[test]
    fn empty_flow_set_yields_the_empty_report() {
        let report = assemble(&[], &scorer(), 1.0);
        assert_eq!(report.overall_usability_score, 0.0);
        assert_eq!(report.grade, "F");
        assert_eq!(report.session_summary.total_sessions, 0);
        assert_eq!(report.session_summary.abandonment_rate, 1.0);
        assert_eq!(report.primary_concerns, vec!["No interactions detected"]);
    }

    #[test]
    fn clean_session_grades_well() {
        let flows = vec![good_flow(0, "weather"), good_flow(60_000, "weather")];
        let report = assemble(&flows, &scorer(), 1.0);

        assert_eq!(report.server_name, "weather");
        assert_eq!(report.session_summary.total_sessions, 2);
        assert_eq!(report.session_summary.successful_completions, 2);
        assert_eq!(report.session_summary.abandonment_rate, 0.0);
        assert!(report.overall_usability_score >= 90.0, "{report:?}");
        assert_eq!(report.grade, "A");
        assert!(report.detected_issues.is_empty());
        assert!(report
            .key_wins
            .contains(&"High first-attempt success rate".to_string()));
    }

    #[test]
    fn auth_failures_drag_the_score_down() {
        let flows = vec![
            failed_flow(0, "weather", "401"),
            failed_flow(60_000, "weather", "401"),
        ];
        let report = assemble(&flows, &scorer(), 1.0);

        assert!(report.overall_usability_score < 60.0, "{report:?}");
        assert!(!report.detected_issues.is_empty());
        assert_eq!(
            report.communication_patterns.common_failure_points,
            vec!["Authentication"]
        );
        assert_eq!(
            report.session_summary.common_abandonment_points,
            vec!["Error 401"]
        );
    }

    #[test]
    fn usability_grade_bands_are_score_ascending() {
        assert_eq!(usability_grade(95.0), "A");
        assert_eq!(usability_grade(85.0), "B");
        assert_eq!(usability_grade(75.0), "C");
        assert_eq!(usability_grade(65.0), "D");
        assert_eq!(usability_grade(30.0), "F");
    }

    #[test]
    fn primary_server_is_the_most_frequent() {
        let flows = vec![
            good_flow(0, "a"),
            good_flow(60_000, "b"),
            good_flow(120_000, "b"),
        ];
        let report = assemble(&flows, &scorer(), 1.0);
        assert_eq!(report.server_name, "b");
    }
}
