//! Prometheus registry for request and generation telemetry.
//!
//! Label schemas are fixed when [`Metrics`] is built. Values only grow for
//! the lifetime of the process.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::error::ServiceError;

pub const GENERATE_ENDPOINT: &str = "generate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMetric {
    /// `http_requests_total{method,endpoint,status}`
    HttpRequests,
    /// `api_requests_total{endpoint}`
    ApiRequests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramMetric {
    /// `http_request_duration_seconds{method,endpoint}`
    HttpRequestDuration,
    /// `api_latency_seconds{endpoint}`
    ApiLatency,
}

pub struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    api_latency_seconds: HistogramVec,
    api_requests_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            ),
            &["method", "endpoint"],
        )?;
        let api_latency_seconds = HistogramVec::new(
            HistogramOpts::new("api_latency_seconds", "API endpoint latency in seconds"),
            &["endpoint"],
        )?;
        let api_requests_total = IntCounterVec::new(
            Opts::new(
                "api_requests_total",
                "Total number of API requests (throughput)",
            ),
            &["endpoint"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(api_latency_seconds.clone()))?;
        registry.register(Box::new(api_requests_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            api_latency_seconds,
            api_requests_total,
        })
    }

    fn counter(&self, metric: CounterMetric) -> &IntCounterVec {
        match metric {
            CounterMetric::HttpRequests => &self.http_requests_total,
            CounterMetric::ApiRequests => &self.api_requests_total,
        }
    }

    fn histogram(&self, metric: HistogramMetric) -> &HistogramVec {
        match metric {
            HistogramMetric::HttpRequestDuration => &self.http_request_duration_seconds,
            HistogramMetric::ApiLatency => &self.api_latency_seconds,
        }
    }

    /// Fails when `labels` does not match the metric's label schema.
    pub fn increment(&self, metric: CounterMetric, labels: &[&str]) -> Result<(), ServiceError> {
        self.counter(metric)
            .get_metric_with_label_values(labels)?
            .inc();
        Ok(())
    }

    pub fn observe(
        &self,
        metric: HistogramMetric,
        labels: &[&str],
        value: f64,
    ) -> Result<(), ServiceError> {
        self.histogram(metric)
            .get_metric_with_label_values(labels)?
            .observe(value);
        Ok(())
    }

    /// Generic accounting shared by every route.
    pub fn record_request(
        &self,
        method: &str,
        endpoint: &str,
        status: u16,
        latency_seconds: f64,
    ) -> Result<(), ServiceError> {
        let status = status.to_string();
        self.increment(CounterMetric::HttpRequests, &[method, endpoint, &status])?;
        self.observe(
            HistogramMetric::HttpRequestDuration,
            &[method, endpoint],
            latency_seconds,
        )
    }

    pub fn record_generation(&self, latency_seconds: f64) -> Result<(), ServiceError> {
        self.observe(
            HistogramMetric::ApiLatency,
            &[GENERATE_ENDPOINT],
            latency_seconds,
        )?;
        self.increment(CounterMetric::ApiRequests, &[GENERATE_ENDPOINT])
    }

    /// Current counter value. Probing a label set that was never recorded
    /// creates it at zero.
    pub fn counter_value(&self, metric: CounterMetric, labels: &[&str]) -> Result<u64, ServiceError> {
        Ok(self.counter(metric).get_metric_with_label_values(labels)?.get())
    }

    pub fn histogram_count(
        &self,
        metric: HistogramMetric,
        labels: &[&str],
    ) -> Result<u64, ServiceError> {
        Ok(self
            .histogram(metric)
            .get_metric_with_label_values(labels)?
            .get_sample_count())
    }

    /// Text exposition of every registered family.
    pub fn render(&self) -> Result<String, ServiceError> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ServiceError::MetricsExport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_request_updates_counter_and_histogram() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("GET", "health", 200, 0.01).unwrap();
        metrics.record_request("GET", "health", 200, 0.02).unwrap();

        assert_eq!(
            metrics
                .counter_value(CounterMetric::HttpRequests, &["GET", "health", "200"])
                .unwrap(),
            2
        );
        assert_eq!(
            metrics
                .histogram_count(HistogramMetric::HttpRequestDuration, &["GET", "health"])
                .unwrap(),
            2
        );
    }

    #[test]
    fn wrong_label_arity_is_an_error() {
        let metrics = Metrics::new().unwrap();
        let err = metrics
            .increment(CounterMetric::HttpRequests, &["GET"])
            .unwrap_err();
        assert!(matches!(err, ServiceError::MetricsExport(_)));
        assert!(
            metrics
                .observe(HistogramMetric::ApiLatency, &["a", "b"], 1.0)
                .is_err()
        );
    }

    #[test]
    fn render_exposes_labelled_samples() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("POST", "generate", 400, 0.003).unwrap();
        metrics.record_generation(0.003).unwrap();

        let text = metrics.render().unwrap();
        assert!(text.contains(
            r#"http_requests_total{endpoint="generate",method="POST",status="400"} 1"#
        ));
        assert!(text.contains(r#"api_requests_total{endpoint="generate"} 1"#));
        assert!(text.contains(r#"api_latency_seconds_count{endpoint="generate"} 1"#));
        assert!(text.contains("# TYPE http_request_duration_seconds histogram"));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let metrics = Metrics::new().unwrap();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        metrics.record_generation(0.1).unwrap();
                    }
                });
            }
        });
        assert_eq!(
            metrics
                .counter_value(CounterMetric::ApiRequests, &[GENERATE_ENDPOINT])
                .unwrap(),
            800
        );
    }
}
