//! Metrics and tracing helpers.
//!
//! With the `metrics` feature, [`METRICS`] records binding operations, cascade
//! fan-out and resolution latency on the global OpenTelemetry meter `lineage`.
//! Call [`install_prometheus_exporter`] once at startup, before the first
//! inheritance operation, so the instruments bind to the Prometheus reader.
//!
//! With the `tracing` feature, [`tracing_helpers`] provides the spans used by
//! the executor, transactions and the inheritance engine.

#[cfg(feature = "metrics")]
pub use self::otel::{install_prometheus_exporter, LineageMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use crate::inheritance::CascadeReport;
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
        KeyValue,
    };
    use std::time::Duration;

    pub static METRICS: Lazy<LineageMetrics> = Lazy::new(LineageMetrics::init);

    pub struct LineageMetrics {
        pub binding_operations_total: Counter<u64>,
        pub cascade_steps_total: Counter<u64>,
        pub cascade_warnings_total: Counter<u64>,
        pub cascade_duration: Histogram<f64>,
        pub resolve_duration: Histogram<f64>,
        pub query_duration: Histogram<f64>,
        pub query_errors_total: Counter<u64>,
    }

    impl LineageMetrics {
        pub fn init() -> Self {
            let meter = global::meter("lineage");

            let binding_operations_total = meter
                .u64_counter("lineage_binding_operations_total")
                .with_description("Direct binding operations by kind")
                .build();

            let cascade_steps_total = meter
                .u64_counter("lineage_cascade_steps_total")
                .with_description("Descendant writes applied by cascades")
                .build();

            let cascade_warnings_total = meter
                .u64_counter("lineage_cascade_warnings_total")
                .with_description("Cascade steps that failed and were skipped")
                .build();

            let cascade_duration = meter
                .f64_histogram("lineage_cascade_duration_seconds")
                .with_description("Duration of a full cascade over a subtree")
                .build();

            let resolve_duration = meter
                .f64_histogram("lineage_resolve_duration_seconds")
                .with_description("Duration of effective attribute resolution")
                .build();

            let query_duration = meter
                .f64_histogram("lineage_query_duration_seconds")
                .with_description("Duration of store queries")
                .build();

            let query_errors_total = meter
                .u64_counter("lineage_query_errors_total")
                .with_description("Store queries that returned an error")
                .build();

            Self {
                binding_operations_total,
                cascade_steps_total,
                cascade_warnings_total,
                cascade_duration,
                resolve_duration,
                query_duration,
                query_errors_total,
            }
        }

        pub fn record_binding_operation(&self, operation: &'static str) {
            self.binding_operations_total
                .add(1, &[KeyValue::new("operation", operation)]);
        }

        pub fn record_cascade(&self, report: &CascadeReport, elapsed: Duration) {
            let op = KeyValue::new("operation", report.operation.as_str());
            self.cascade_steps_total
                .add(report.applied as u64, std::slice::from_ref(&op));
            self.cascade_warnings_total
                .add(report.warnings.len() as u64, std::slice::from_ref(&op));
            self.cascade_duration.record(elapsed.as_secs_f64(), &[op]);
        }

        pub fn record_resolve_duration(&self, elapsed: Duration) {
            self.resolve_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }
    }

    /// Install a Prometheus-backed meter provider as the global provider.
    ///
    /// Returns the registry to expose on a scrape endpoint.
    pub fn install_prometheus_exporter() -> Result<prometheus::Registry, String> {
        let registry = prometheus::Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| format!("failed to build prometheus exporter: {e}"))?;
        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();
        global::set_meter_provider(provider);
        Ok(registry)
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{span, Level, Span};

    pub fn execute_query_span(query: &str) -> Span {
        let statement = query.split_whitespace().next().unwrap_or("");
        span!(Level::TRACE, "lineage.query", statement = statement)
    }

    pub fn acquire_connection_span() -> Span {
        span!(Level::TRACE, "lineage.acquire_connection")
    }

    pub fn begin_transaction_span() -> Span {
        span!(Level::DEBUG, "lineage.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        span!(Level::DEBUG, "lineage.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        span!(Level::DEBUG, "lineage.transaction.rollback")
    }

    pub fn cascade_span(operation: &str, category_id: i64, attribute_id: i64) -> Span {
        span!(
            Level::DEBUG,
            "lineage.cascade",
            operation = operation,
            category_id = category_id,
            attribute_id = attribute_id
        )
    }

    pub fn resolve_span(category_id: i64) -> Span {
        span!(Level::DEBUG, "lineage.resolve", category_id = category_id)
    }
}
