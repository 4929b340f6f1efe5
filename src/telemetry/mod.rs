// Telemetry exporter - periodically re-derives flows and publishes metrics
//
// The backend is a narrow trait so metric sinks can be swapped without
// touching capture or analysis code. The reference implementation is the
// OpenTelemetry backend behind the `otel` feature; the always-available
// fallback logs through tracing. Export is at-least-once: a failed
// iteration is logged and the loop keeps going.

#[cfg(feature = "otel")]
pub mod otel;

use crate::config::TelemetryConfig;
use crate::events::{MCPEvent, TimelineEvent};
use crate::report;
use crate::scoring::CognitiveScorer;
use crate::timeline::TimelineCorrelator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Opaque handle for an in-flight span.
pub type SpanHandle = u64;

/// Terminal status of a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    /// Failed analysis or export path, with a description for the trace.
    #[allow(dead_code)]
    Error(String),
}

/// Contract with the metric/trace sink.
///
/// Implementations must be cheap and non-blocking; the export loop calls
/// these inline. Setup must be idempotent.
pub trait ExporterBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn record_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]);
    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);
    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    fn start_span(&self, name: &str, attributes: &[(&str, &str)]) -> SpanHandle;
    fn end_span(&self, handle: SpanHandle, status: SpanStatus);
    fn add_span_event(&self, handle: SpanHandle, name: &str, attributes: &[(&str, &str)]);
}

/// Fallback backend: everything goes to the tracing layer at debug level.
/// Keeps the export loop exercisable without the `otel` feature.
pub struct LogBackend;

impl ExporterBackend for LogBackend {
    fn name(&self) -> &'static str {
        "log"
    }

    fn record_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]) {
        tracing::debug!(metric = name, value, ?labels, "counter");
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        tracing::debug!(metric = name, value, ?labels, "histogram");
    }

    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        tracing::debug!(metric = name, value, ?labels, "gauge");
    }

    fn start_span(&self, name: &str, attributes: &[(&str, &str)]) -> SpanHandle {
        tracing::debug!(span = name, ?attributes, "span start");
        0
    }

    fn end_span(&self, _handle: SpanHandle, status: SpanStatus) {
        tracing::debug!(?status, "span end");
    }

    fn add_span_event(&self, _handle: SpanHandle, name: &str, attributes: &[(&str, &str)]) {
        tracing::debug!(event = name, ?attributes, "span event");
    }
}

/// Owns the configured backend plus whatever flushing it needs at shutdown.
///
/// With the `otel` feature the OpenTelemetry backend is used; otherwise the
/// log backend keeps the loop observable.
pub struct BackendHandle {
    backend: Arc<dyn ExporterBackend>,
    #[cfg(feature = "otel")]
    otel: Arc<otel::OtelBackend>,
}

impl BackendHandle {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        #[cfg(feature = "otel")]
        {
            let otel = Arc::new(otel::OtelBackend::new(
                &config.service_name,
                crate::config::VERSION,
            ));
            Self {
                backend: otel.clone(),
                otel,
            }
        }
        #[cfg(not(feature = "otel"))]
        {
            let _ = config;
            Self {
                backend: Arc::new(LogBackend),
            }
        }
    }

    pub fn backend(&self) -> Arc<dyn ExporterBackend> {
        self.backend.clone()
    }

    /// Flush buffered telemetry before exit. No-op for the log backend.
    pub fn flush(&self) {
        #[cfg(feature = "otel")]
        self.otel.shutdown();
    }
}

/// Background exporter: every interval, re-run correlation and scoring over
/// the recent window and publish the metric catalogue.
pub struct TelemetryExporter {
    backend: Arc<dyn ExporterBackend>,
    correlator: TimelineCorrelator,
    scorer: CognitiveScorer,
    config: TelemetryConfig,
}

impl TelemetryExporter {
    pub fn new(
        backend: Arc<dyn ExporterBackend>,
        correlator: TimelineCorrelator,
        scorer: CognitiveScorer,
        config: TelemetryConfig,
    ) -> Self {
        Self {
            backend,
            correlator,
            scorer,
            config,
        }
    }

    /// Run until the shutdown signal fires. Individual iteration failures
    /// never escape the loop.
    pub async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.export_interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            "telemetry export started ({}s interval, backend: {})",
            self.config.export_interval_secs,
            self.backend.name()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.export_once();
                }
                _ = &mut shutdown_rx => {
                    tracing::info!("telemetry export cancelled");
                    break;
                }
            }
        }
    }

    /// One export iteration over the configured window.
    pub fn export_once(&self) {
        let events = self.correlator.load_events(self.config.window_hours);

        let recent_messages: Vec<MCPEvent> = events
            .iter()
            .filter_map(|e| match e {
                TimelineEvent::Message(m) => Some(m.clone()),
                _ => None,
            })
            .collect();

        let flows = self.correlator.group_into_flows(events);

        if flows.is_empty() {
            self.export_baseline(recent_messages.len());
            return;
        }

        let summary = TimelineCorrelator::summarize(&flows);
        let server = if summary.servers_involved.len() == 1 {
            summary.servers_involved[0].clone()
        } else {
            format!("multiple_servers({})", summary.servers_involved.len())
        };

        let usability = report::assemble(&flows, &self.scorer, self.config.window_hours);

        let span = self
            .backend
            .start_span("mcp_usability_analysis", &[("server", server.as_str())]);

        if let Some(load) = &usability.cognitive_load {
            let components = [
                ("prompt_complexity", load.prompt_complexity),
                ("context_switching", load.context_switching),
                ("retry_frustration", load.retry_frustration),
                ("configuration_friction", load.configuration_friction),
                ("integration_cognition", load.integration_cognition),
                ("overall", load.overall_score),
            ];
            for (component, value) in components {
                self.backend.record_histogram(
                    "mcp_cognitive_load_score",
                    value,
                    &[("server", server.as_str()), ("component", component)],
                );
            }
        }

        let server_label = [("server", server.as_str())];
        self.backend.record_gauge(
            "mcp_usability_score",
            usability.overall_usability_score,
            &server_label,
        );
        self.backend.record_counter(
            "mcp_usability_grade_total",
            1,
            &[("server", server.as_str()), ("grade", usability.grade.as_str())],
        );

        self.backend
            .record_counter("mcp_total_flows", summary.total_flows as u64, &server_label);
        self.backend.record_counter(
            "mcp_successful_flows",
            summary.successful_flows as u64,
            &server_label,
        );
        self.backend.record_counter(
            "mcp_cross_server_flows",
            summary.cross_server_flows as u64,
            &server_label,
        );

        self.backend.record_histogram(
            "mcp_flow_success_rate",
            summary.success_rate * 100.0,
            &server_label,
        );
        self.backend.record_histogram(
            "mcp_abandonment_rate",
            summary.abandonment_rate * 100.0,
            &server_label,
        );
        self.backend.record_histogram(
            "mcp_user_context_rate",
            summary.user_context_rate * 100.0,
            &server_label,
        );
        self.backend.record_histogram(
            "mcp_llm_reasoning_rate",
            summary.llm_reasoning_rate * 100.0,
            &server_label,
        );

        self.backend.record_counter(
            "mcp_tool_calls_total",
            summary.total_tool_calls as u64,
            &server_label,
        );
        self.backend.record_counter(
            "mcp_llm_decisions_total",
            summary.total_llm_decisions as u64,
            &server_label,
        );
        self.backend.record_histogram(
            "mcp_tool_usage_success_rate",
            summary.tool_usage_success_rate,
            &server_label,
        );
        self.backend.record_histogram(
            "mcp_avg_flow_duration_ms",
            summary.avg_flow_duration_ms,
            &server_label,
        );

        for issue in &usability.detected_issues {
            self.backend.add_span_event(
                span,
                "usability_issue_detected",
                &[
                    ("issue.description", issue.description.as_str()),
                    ("issue.severity", severity_label(issue)),
                ],
            );
        }
        self.backend.end_span(span, SpanStatus::Ok);

        self.export_interactions(&recent_messages);

        tracing::debug!(
            "exported metrics for {} ({} flows, grade {})",
            server,
            summary.total_flows,
            usability.grade
        );
    }

    /// Per-message interaction counters for the tail of the window.
    fn export_interactions(&self, messages: &[MCPEvent]) {
        let tail = messages
            .len()
            .saturating_sub(self.config.recent_message_count);
        for message in &messages[tail..] {
            let method = interaction_method(message);
            let direction = message.direction.as_str();

            self.backend.record_counter(
                "mcp_interactions_total",
                1,
                &[
                    ("server", message.server_name.as_str()),
                    ("direction", direction),
                    ("method", method.as_str()),
                ],
            );

            if let Some(latency) = message.latency_ms.filter(|l| *l > 0) {
                self.backend.record_histogram(
                    "mcp_interaction_duration_ms",
                    latency as f64,
                    &[
                        ("server", message.server_name.as_str()),
                        ("method", method.as_str()),
                    ],
                );
            }

            if let Some(code) = &message.error_code {
                self.backend.record_counter(
                    "mcp_errors_total",
                    1,
                    &[("error_code", code.as_str()), ("direction", direction)],
                );
            }
        }
    }

    /// Baseline emission: downstream time series must never go missing just
    /// because nothing happened.
    fn export_baseline(&self, message_count: usize) {
        let server = std::env::var("MCP_SERVER_NAME").unwrap_or_else(|_| "mcp_server".to_string());
        let labels = [("server", server.as_str())];

        self.backend.record_gauge("mcp_usability_score", 0.0, &labels);
        self.backend.record_counter("mcp_total_flows", 0, &labels);
        self.backend
            .record_histogram("mcp_cognitive_load_score", 0.0, &[
                ("server", server.as_str()),
                ("component", "overall"),
            ]);
        // No activity means nothing failed
        self.backend
            .record_histogram("mcp_flow_success_rate", 100.0, &labels);

        tracing::debug!(
            "exported baseline metrics for {} ({} recent messages)",
            server,
            message_count
        );
    }
}

fn severity_label(issue: &crate::scoring::issues::UsabilityIssue) -> &'static str {
    use crate::scoring::issues::Severity;
    match issue.severity {
        Severity::Critical => "critical",
        Severity::High => "high",
        Severity::Medium => "medium",
        Severity::Low => "low",
    }
}

/// Label value for the interaction counter: the method when present,
/// otherwise a response classification.
fn interaction_method(message: &MCPEvent) -> String {
    if let Some(method) = message.method() {
        return method.to_string();
    }
    if message.error().is_some() {
        return "error_response".to_string();
    }
    if message.result().is_some() {
        return "response".to_string();
    }
    message
        .enhanced_context
        .tool_method
        .clone()
        .unwrap_or_else(|| "unspecified_method".to_string())
}
