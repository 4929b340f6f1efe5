// Usability issue detection and recommendations
//
// Pattern heuristics over a flow set: authentication friction, parameter
// confusion, stuck retry loops, cognitive overload, and tool-discovery
// problems. Each detected issue maps to an actionable recommendation.

use super::{CognitiveLoadMetrics, CognitiveScorer};
use crate::timeline::Flow;
use serde::Serialize;

/// Categories of usability issues this analyzer can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    AuthenticationFriction,
    ParameterConfusion,
    ErrorRecoveryIssues,
    CognitiveOverload,
    ToolDiscoveryProblems,
}

impl IssueType {
    pub fn category(&self) -> &'static str {
        match self {
            IssueType::AuthenticationFriction => "Authentication Friction",
            IssueType::ParameterConfusion => "Parameter Confusion",
            IssueType::ErrorRecoveryIssues => "Error Recovery Issues",
            IssueType::CognitiveOverload => "Cognitive Overload",
            IssueType::ToolDiscoveryProblems => "Tool Discovery Problems",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn weight(&self) -> u8 {
        match self {
            Severity::Critical => 4,
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
        }
    }
}

/// One detected usability issue.
#[derive(Debug, Clone, Serialize)]
pub struct UsabilityIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    pub frequency: usize,
    pub impact_description: String,
    pub suggested_fix: String,
    pub estimated_improvement: f64,
}

/// Actionable recommendation derived from issues and cognitive load.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub priority: Severity,
    pub category: String,
    pub issue: String,
    pub impact: String,
    pub effort: &'static str,
    pub recommendation: String,
    pub estimated_improvement: f64,
    pub implementation_steps: Vec<&'static str>,
}

/// Detect usability issues across a flow set.
pub fn detect_issues(flows: &[Flow], scorer: &CognitiveScorer) -> Vec<UsabilityIssue> {
    let mut issues = Vec::new();
    if flows.is_empty() {
        return issues;
    }

    issues.extend(detect_authentication_issues(flows));
    issues.extend(detect_parameter_issues(flows));
    issues.extend(detect_error_recovery_issues(flows));
    issues.extend(detect_cognitive_overload(flows, scorer));
    issues.extend(detect_tool_discovery_issues(flows));
    issues
}

fn flow_has_error_code(flow: &Flow, codes: &[&str]) -> bool {
    flow.messages()
        .any(|m| m.error_code.as_deref().map(|c| codes.contains(&c)).unwrap_or(false))
}

fn detect_authentication_issues(flows: &[Flow]) -> Vec<UsabilityIssue> {
    let auth_failures = flows
        .iter()
        .filter(|f| flow_has_error_code(f, &["401", "403"]))
        .count();
    if auth_failures == 0 {
        return Vec::new();
    }

    let failure_rate = auth_failures as f64 / flows.len() as f64;
    let (severity, description, suggested_fix) = if failure_rate > 0.5 {
        (
            Severity::Critical,
            format!("High authentication failure rate ({:.1}%)", failure_rate * 100.0),
            "Implement guided API key setup with validation",
        )
    } else if failure_rate > 0.2 {
        (
            Severity::High,
            format!("Moderate authentication failures ({:.1}%)", failure_rate * 100.0),
            "Add clear API key configuration instructions",
        )
    } else {
        (
            Severity::Medium,
            format!("Some authentication failures detected ({:.1}%)", failure_rate * 100.0),
            "Improve error messages for authentication failures",
        )
    };

    vec![UsabilityIssue {
        issue_type: IssueType::AuthenticationFriction,
        severity,
        description,
        frequency: auth_failures,
        impact_description: "Users cannot access core functionality".to_string(),
        suggested_fix: suggested_fix.to_string(),
        estimated_improvement: if severity == Severity::Critical { 30.0 } else { 20.0 },
    }]
}

fn detect_parameter_issues(flows: &[Flow]) -> Vec<UsabilityIssue> {
    let param_errors = flows
        .iter()
        .filter(|f| flow_has_error_code(f, &["400", "422"]))
        .count();
    if param_errors == 0 {
        return Vec::new();
    }

    let error_rate = param_errors as f64 / flows.len() as f64;
    if error_rate <= 0.3 {
        return Vec::new();
    }

    vec![UsabilityIssue {
        issue_type: IssueType::ParameterConfusion,
        severity: Severity::High,
        description: format!("High parameter error rate ({:.1}%)", error_rate * 100.0),
        frequency: param_errors,
        impact_description: "Users struggle with correct parameter format".to_string(),
        suggested_fix: "Add parameter validation and examples".to_string(),
        estimated_improvement: 25.0,
    }]
}

fn detect_error_recovery_issues(flows: &[Flow]) -> Vec<UsabilityIssue> {
    let high_retry = flows.iter().filter(|f| f.retry_count > 2).count();
    if high_retry == 0 {
        return Vec::new();
    }

    vec![UsabilityIssue {
        issue_type: IssueType::ErrorRecoveryIssues,
        severity: Severity::Medium,
        description: format!("{high_retry} interactions required excessive retries"),
        frequency: high_retry,
        impact_description: "Users get stuck in retry loops".to_string(),
        suggested_fix: "Improve error messages and recovery guidance".to_string(),
        estimated_improvement: 15.0,
    }]
}

fn detect_cognitive_overload(flows: &[Flow], scorer: &CognitiveScorer) -> Vec<UsabilityIssue> {
    let high_load = flows
        .iter()
        .filter(|f| scorer.analyze_flow(f).overall_score > 80.0)
        .count();
    // Only report when overload is systemic, not a single bad interaction
    if (high_load as f64) <= flows.len() as f64 * 0.4 {
        return Vec::new();
    }

    vec![UsabilityIssue {
        issue_type: IssueType::CognitiveOverload,
        severity: Severity::High,
        description: "High cognitive load detected in multiple interactions".to_string(),
        frequency: high_load,
        impact_description: "Users experience mental fatigue and confusion".to_string(),
        suggested_fix: "Simplify interaction patterns and reduce complexity".to_string(),
        estimated_improvement: 35.0,
    }]
}

fn detect_tool_discovery_issues(flows: &[Flow]) -> Vec<UsabilityIssue> {
    let mut discovery_flows = 0;
    let mut successful_call_flows = 0;

    for flow in flows {
        let has_list = flow.messages().any(|m| m.method() == Some("tools/list"));
        let has_successful_call = flow
            .messages()
            .any(|m| m.method() == Some("tools/call") && m.error_code.is_none())
            && flow.success;

        if has_list {
            discovery_flows += 1;
        }
        if has_successful_call {
            successful_call_flows += 1;
        }
    }

    if discovery_flows == 0 {
        return Vec::new();
    }
    let success_ratio = successful_call_flows as f64 / discovery_flows as f64;
    if success_ratio >= 0.5 {
        return Vec::new();
    }

    vec![UsabilityIssue {
        issue_type: IssueType::ToolDiscoveryProblems,
        severity: Severity::Medium,
        description: "Low success rate after tool discovery".to_string(),
        frequency: discovery_flows - successful_call_flows,
        impact_description: "Users can't effectively use discovered tools".to_string(),
        suggested_fix: "Improve tool documentation and examples".to_string(),
        estimated_improvement: 20.0,
    }]
}

/// Turn detected issues (plus overall load) into prioritized recommendations.
pub fn generate_recommendations(
    issues: &[UsabilityIssue],
    cognitive_load: Option<&CognitiveLoadMetrics>,
) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> =
        issues.iter().map(recommendation_for_issue).collect();

    if let Some(load) = cognitive_load {
        if load.overall_score > 80.0 {
            recommendations.push(Recommendation {
                priority: Severity::High,
                category: "Cognitive Load".to_string(),
                issue: format!("Overall cognitive load is high ({:.1})", load.overall_score),
                impact: "Users experience mental fatigue and reduced efficiency".to_string(),
                effort: "high",
                recommendation: "Redesign interaction flow to reduce cognitive burden"
                    .to_string(),
                estimated_improvement: 30.0,
                implementation_steps: vec![
                    "Analyze high-friction interaction patterns",
                    "Simplify parameter structures",
                    "Reduce context switching requirements",
                    "Add smart defaults for common use cases",
                ],
            });
        }
    }

    recommendations.sort_by(|a, b| {
        b.priority
            .weight()
            .cmp(&a.priority.weight())
            .then(b.estimated_improvement.total_cmp(&a.estimated_improvement))
    });
    recommendations
}

fn recommendation_for_issue(issue: &UsabilityIssue) -> Recommendation {
    let implementation_steps = match issue.issue_type {
        IssueType::AuthenticationFriction => vec![
            "Add API key validation on setup",
            "Provide clear error messages for auth failures",
            "Create guided setup wizard",
            "Add test connectivity feature",
        ],
        IssueType::ParameterConfusion => vec![
            "Add parameter validation with clear error messages",
            "Provide usage examples in documentation",
            "Add parameter format hints",
        ],
        IssueType::ErrorRecoveryIssues => vec![
            "Improve error message clarity",
            "Add suggested recovery actions",
            "Add contextual help for common errors",
        ],
        IssueType::CognitiveOverload | IssueType::ToolDiscoveryProblems => Vec::new(),
    };

    Recommendation {
        priority: issue.severity,
        category: issue.issue_type.category().to_string(),
        issue: issue.description.clone(),
        impact: issue.impact_description.clone(),
        effort: "medium",
        recommendation: issue.suggested_fix.clone(),
        estimated_improvement: issue.estimated_improvement,
        implementation_steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        Direction, EnhancedContext, MCPEvent, TimelineEvent, PROTOCOL_JSON_RPC,
    };
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn msg(at: i64, direction: Direction, payload: serde_json::Value, error: Option<&str>) -> TimelineEvent {
        TimelineEvent::Message(MCPEvent {
            timestamp: ts(at),
            server_name: "s".into(),
            server_process_id: 1,
            direction,
            protocol: PROTOCOL_JSON_RPC.into(),
            payload,
            latency_ms: None,
            error_code: error.map(String::from),
            enhanced_context: EnhancedContext::default(),
        })
    }

    fn failed_auth_flow(at: i64) -> Flow {
        Flow::from_events(vec![
            msg(
                at,
                Direction::HostToServer,
                json!({"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"x","arguments":{}}}),
                None,
            ),
            msg(
                at + 50,
                Direction::ServerToHost,
                json!({"jsonrpc":"2.0","id":1,"error":{"message":"401"}}),
                Some("401"),
            ),
        ])
        .unwrap()
    }

    fn clean_flow(at: i64) -> Flow {
        Flow::from_events(vec![
            msg(
                at,
                Direction::HostToServer,
                json!({"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"x","arguments":{}}}),
                None,
            ),
            msg(
                at + 50,
                Direction::ServerToHost,
                json!({"jsonrpc":"2.0","id":1,"result":{}}),
                None,
            ),
        ])
        .unwrap()
    }

    #[test]
    fn pervasive_auth_failures_are_critical() {
        let scorer = CognitiveScorer::new(15_000);
        let flows = vec![failed_auth_flow(0), failed_auth_flow(60_000)];
        let issues = detect_issues(&flows, &scorer);

        let auth = issues
            .iter()
            .find(|i| i.issue_type == IssueType::AuthenticationFriction)
            .unwrap();
        assert_eq!(auth.severity, Severity::Critical);
        assert_eq!(auth.frequency, 2);
    }

    #[test]
    fn occasional_auth_failures_stay_medium() {
        let scorer = CognitiveScorer::new(15_000);
        let mut flows = vec![failed_auth_flow(0)];
        for i in 1..10 {
            flows.push(clean_flow(i * 60_000));
        }
        let issues = detect_issues(&flows, &scorer);

        let auth = issues
            .iter()
            .find(|i| i.issue_type == IssueType::AuthenticationFriction)
            .unwrap();
        assert_eq!(auth.severity, Severity::Medium);
    }

    #[test]
    fn clean_flows_raise_no_issues() {
        let scorer = CognitiveScorer::new(15_000);
        let flows = vec![clean_flow(0), clean_flow(60_000)];
        assert!(detect_issues(&flows, &scorer).is_empty());
    }

    #[test]
    fn recommendations_sort_critical_first() {
        let issues = vec![
            UsabilityIssue {
                issue_type: IssueType::ErrorRecoveryIssues,
                severity: Severity::Medium,
                description: "retries".into(),
                frequency: 1,
                impact_description: "stuck".into(),
                suggested_fix: "fix".into(),
                estimated_improvement: 15.0,
            },
            UsabilityIssue {
                issue_type: IssueType::AuthenticationFriction,
                severity: Severity::Critical,
                description: "auth".into(),
                frequency: 3,
                impact_description: "blocked".into(),
                suggested_fix: "fix".into(),
                estimated_improvement: 30.0,
            },
        ];

        let recs = generate_recommendations(&issues, None);
        assert_eq!(recs[0].priority, Severity::Critical);
        assert_eq!(recs[1].priority, Severity::Medium);
    }

    #[test]
    fn high_overall_load_adds_a_recommendation() {
        let load = CognitiveLoadMetrics {
            overall_score: 85.0,
            prompt_complexity: 85.0,
            context_switching: 85.0,
            retry_frustration: 85.0,
            configuration_friction: 85.0,
            integration_cognition: 85.0,
            grade: "F".into(),
            friction_points: vec![],
            retry_breakdown: None,
            configuration_breakdown: None,
        };
        let recs = generate_recommendations(&[], Some(&load));
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].category, "Cognitive Load");
    }
}
