//! Prometheus metrics for call and function observability.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct MethodLabel(pub &'static str);

impl EncodeLabelSet for MethodLabel {
    fn encode(&self, mut encoder: LabelSetEncoder) -> Result<(), std::fmt::Error> {
        ("method", self.0).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct FunctionLabel(pub String);

impl EncodeLabelSet for FunctionLabel {
    fn encode(&self, mut encoder: LabelSetEncoder) -> Result<(), std::fmt::Error> {
        ("function", self.0.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ServerMetrics {
    pub calls: Family<MethodLabel, Counter>,
    pub invocations: Family<FunctionLabel, Counter>,
    pub failures: Family<FunctionLabel, Counter>,
    pub rows_received: Counter,
    pub rows_emitted: Counter,
    pub in_flight: Gauge,
    pub registry: Arc<Registry>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let calls = Family::<MethodLabel, Counter>::default();
        registry.register("qsse_calls", "RPC calls received by method", calls.clone());

        let invocations = Family::<FunctionLabel, Counter>::default();
        registry.register(
            "qsse_function_invocations",
            "Function invocations by function name",
            invocations.clone(),
        );

        let failures = Family::<FunctionLabel, Counter>::default();
        registry.register(
            "qsse_function_failures",
            "Failed or timed out function invocations by function name",
            failures.clone(),
        );

        let rows_received = Counter::default();
        registry.register(
            "qsse_rows_received",
            "Input rows received on data calls",
            rows_received.clone(),
        );

        let rows_emitted = Counter::default();
        registry.register(
            "qsse_rows_emitted",
            "Result rows sent on data calls",
            rows_emitted.clone(),
        );

        let in_flight = Gauge::default();
        registry.register(
            "qsse_calls_in_flight",
            "Calls currently holding an execution permit",
            in_flight.clone(),
        );

        Self {
            calls,
            invocations,
            failures,
            rows_received,
            rows_emitted,
            in_flight,
            registry: Arc::new(registry),
        }
    }

    pub fn call(&self, method: &'static str) {
        self.calls.get_or_create(&MethodLabel(method)).inc();
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        buf
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_labelled_families() {
        let metrics = ServerMetrics::new();
        metrics.call("ExecuteFunction");
        metrics
            .invocations
            .get_or_create(&FunctionLabel("Directions".to_string()))
            .inc();
        metrics.rows_received.inc_by(3);

        let text = metrics.encode();
        assert!(text.contains("qsse_calls_total{method=\"ExecuteFunction\"} 1"));
        assert!(text.contains("qsse_function_invocations_total{function=\"Directions\"} 1"));
        assert!(text.contains("qsse_rows_received_total 3"));
    }

    #[test]
    fn test_in_flight_gauge() {
        let metrics = ServerMetrics::new();
        metrics.in_flight.inc();
        metrics.in_flight.inc();
        metrics.in_flight.dec();
        assert_eq!(metrics.in_flight.get(), 1);
    }
}
