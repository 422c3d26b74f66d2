use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    request_counter: Counter<u64>,
    prediction_counter: Counter<u64>,
    failure_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    upload_bytes: Histogram<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| format!("failed to build prometheus exporter: {}", e))?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("xray_classifier");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let prediction_counter = meter
            .u64_counter("predictions_total")
            .with_description("Successful predictions per label")
            .build();

        let failure_counter = meter
            .u64_counter("prediction_failures_total")
            .with_description("Failed prediction requests per error kind")
            .build();

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(generate_boundaries((10, 50, 100, 500, 2000)))
            .with_description("Duration of decode and inference in milliseconds")
            .build();

        let upload_bytes = meter
            .u64_histogram("upload_bytes")
            .with_boundaries(
                [16_384.0, 131_072.0, 1_048_576.0, 4_194_304.0, 16_777_216.0].to_vec(),
            )
            .with_description("Size of accepted uploads in bytes")
            .build();

        Ok(Metrics {
            request_counter,
            prediction_counter,
            failure_counter,
            prediction_duration,
            upload_bytes,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_prediction(&self, label: &str, duration_ms: u64) {
        let attributes = vec![KeyValue::new("label", label.to_string())];
        self.prediction_counter.add(1, &attributes);
        self.prediction_duration.record(duration_ms, &attributes);
    }

    pub fn record_failure(&self, kind: &str) {
        let attributes = vec![KeyValue::new("kind", kind.to_string())];
        self.failure_counter.add(1, &attributes);
    }

    pub fn record_upload(&self, size: usize) {
        self.upload_bytes.record(size as u64, &[]);
    }
}

/// Histogram buckets: fine steps for fast CPU inference, coarser towards the tail.
fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 25;
    let end_step: usize = 100;
    let tail_step: usize = 500;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_boundaries() {
        let get = generate_boundaries((10, 50, 100, 500, 2000));
        let expected = vec![
            10.0, 20.0, 30.0, 40.0, 50.0, 75.0, 100.0, 200.0, 300.0, 400.0, 500.0, 1000.0,
            1500.0, 2000.0,
        ];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_metrics_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("/predict");
        metrics.record_prediction("NORMAL", 42);
        metrics.record_failure("decode");

        let families = metrics.registry.gather();
        let names: Vec<String> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.iter().any(|n| n.starts_with("requests_total")));
        assert!(names.iter().any(|n| n.starts_with("predictions_total")));
        assert!(names.iter().any(|n| n.starts_with("prediction_duration_ms")));
    }
}
