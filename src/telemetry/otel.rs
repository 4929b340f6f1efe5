//! OpenTelemetry exporter backend
//!
//! Reference implementation of the `ExporterBackend` contract on top of the
//! OpenTelemetry SDK. Metrics go through a periodic reader, spans through a
//! batch processor; both currently drain to the stdout exporters, which any
//! OTLP-compatible exporter can replace without touching the callers.
//!
//! # Feature Gate
//!
//! This module requires the `otel` feature to be enabled.

use super::{ExporterBackend, SpanHandle, SpanStatus};
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, MeterProvider as _};
use opentelemetry::trace::{Span, Status, Tracer, TracerProvider as _};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

/// Guards provider installation: repeated backend construction reuses the
/// globally installed providers instead of stacking new ones.
static PROVIDERS: OnceLock<(SdkMeterProvider, TracerProvider)> = OnceLock::new();

/// OpenTelemetry-backed metric/trace sink.
pub struct OtelBackend {
    meter: Meter,
    tracer: opentelemetry_sdk::trace::Tracer,
    // Instruments are cached per name; creation is not free in the SDK
    counters: Mutex<HashMap<String, Counter<u64>>>,
    histograms: Mutex<HashMap<String, Histogram<f64>>>,
    gauges: Mutex<HashMap<String, Gauge<f64>>>,
    // Live spans by handle
    spans: Mutex<HashMap<SpanHandle, opentelemetry_sdk::trace::Span>>,
    next_handle: AtomicU64,
}

impl OtelBackend {
    /// Install (or reuse) the global providers and hand out a backend.
    ///
    /// Must be called from within a tokio runtime: the batch span processor
    /// and periodic metric reader spawn background tasks on it.
    pub fn new(service_name: &str, service_version: &str) -> Self {
        let (meter_provider, tracer_provider) = PROVIDERS.get_or_init(|| {
            let resource = Resource::new([
                KeyValue::new("service.name", service_name.to_string()),
                KeyValue::new("service.version", service_version.to_string()),
            ]);

            let metric_reader = PeriodicReader::builder(
                opentelemetry_stdout::MetricExporter::default(),
                opentelemetry_sdk::runtime::Tokio,
            )
            .build();
            let meter_provider = SdkMeterProvider::builder()
                .with_reader(metric_reader)
                .with_resource(resource.clone())
                .build();
            global::set_meter_provider(meter_provider.clone());

            let tracer_provider = TracerProvider::builder()
                .with_batch_exporter(
                    opentelemetry_stdout::SpanExporter::default(),
                    opentelemetry_sdk::runtime::Tokio,
                )
                .with_resource(resource)
                .build();

            tracing::info!("OpenTelemetry providers initialized");
            (meter_provider, tracer_provider)
        });

        Self {
            meter: meter_provider.meter("mcpspy"),
            tracer: tracer_provider.tracer("mcpspy"),
            counters: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
            spans: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Flush buffered telemetry. Errors are logged; export is best-effort.
    pub fn shutdown(&self) {
        use crate::error::AuditError;
        if let Some((meter_provider, tracer_provider)) = PROVIDERS.get() {
            if let Err(e) = meter_provider.force_flush() {
                tracing::warn!("{}", AuditError::Backend(format!("metric flush: {e:?}")));
            }
            for result in tracer_provider.force_flush() {
                if let Err(e) = result {
                    tracing::warn!("{}", AuditError::Backend(format!("span flush: {e:?}")));
                }
            }
        }
    }
}

fn attributes(labels: &[(&str, &str)]) -> Vec<KeyValue> {
    labels
        .iter()
        .map(|(k, v)| KeyValue::new(k.to_string(), v.to_string()))
        .collect()
}

impl ExporterBackend for OtelBackend {
    fn name(&self) -> &'static str {
        "opentelemetry"
    }

    fn record_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]) {
        let mut counters = self.counters.lock().unwrap();
        let counter = counters
            .entry(name.to_string())
            .or_insert_with(|| self.meter.u64_counter(name.to_string()).build());
        counter.add(value, &attributes(labels));
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let mut histograms = self.histograms.lock().unwrap();
        let histogram = histograms
            .entry(name.to_string())
            .or_insert_with(|| self.meter.f64_histogram(name.to_string()).build());
        histogram.record(value, &attributes(labels));
    }

    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let mut gauges = self.gauges.lock().unwrap();
        let gauge = gauges
            .entry(name.to_string())
            .or_insert_with(|| self.meter.f64_gauge(name.to_string()).build());
        gauge.record(value, &attributes(labels));
    }

    fn start_span(&self, name: &str, attrs: &[(&str, &str)]) -> SpanHandle {
        let span = self
            .tracer
            .span_builder(name.to_string())
            .with_attributes(attributes(attrs))
            .start(&self.tracer);

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.spans.lock().unwrap().insert(handle, span);
        handle
    }

    fn end_span(&self, handle: SpanHandle, status: SpanStatus) {
        let Some(mut span) = self.spans.lock().unwrap().remove(&handle) else {
            return;
        };
        match status {
            SpanStatus::Ok => span.set_status(Status::Ok),
            SpanStatus::Error(message) => span.set_status(Status::error(message)),
        }
        span.end();
    }

    fn add_span_event(&self, handle: SpanHandle, name: &str, attrs: &[(&str, &str)]) {
        if let Some(span) = self.spans.lock().unwrap().get_mut(&handle) {
            span.add_event(name.to_string(), attributes(attrs));
        }
    }
}
