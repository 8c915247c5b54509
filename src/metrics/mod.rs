//! Prometheus metrics owned by the runtime

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub http_requests_total: IntCounter,
    pub http_request_duration_seconds: Histogram,
    pub http_requests_in_flight: IntGauge,
    pub handler_failures_total: IntCounterVec,
    pub scheduled_invocations_total: IntCounter,
    pub queue_messages_processed_total: IntCounter,
    pub queue_messages_failed_total: IntCounter,
    pub poll_errors_total: IntCounter,
    pub tasks_run_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total =
            IntCounter::new("http_requests_total", "Total HTTP requests served")?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        ))?;
        let http_requests_in_flight =
            IntGauge::new("http_requests_in_flight", "HTTP requests currently being served")?;
        let handler_failures_total = IntCounterVec::new(
            Opts::new("handler_failures_total", "Handler invocations that failed"),
            &["kind"],
        )?;
        let scheduled_invocations_total = IntCounter::new(
            "scheduled_invocations_total",
            "Scheduled handler invocations",
        )?;
        let queue_messages_processed_total = IntCounter::new(
            "queue_messages_processed_total",
            "Queue messages handled and acknowledged",
        )?;
        let queue_messages_failed_total = IntCounter::new(
            "queue_messages_failed_total",
            "Queue messages left for redelivery after a handler failure",
        )?;
        let poll_errors_total =
            IntCounter::new("poll_errors_total", "Queue receive/delete failures")?;
        let tasks_run_total =
            IntCounter::new("tasks_run_total", "Background tasks picked up by a worker")?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(handler_failures_total.clone()))?;
        registry.register(Box::new(scheduled_invocations_total.clone()))?;
        registry.register(Box::new(queue_messages_processed_total.clone()))?;
        registry.register(Box::new(queue_messages_failed_total.clone()))?;
        registry.register(Box::new(poll_errors_total.clone()))?;
        registry.register(Box::new(tasks_run_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            handler_failures_total,
            scheduled_invocations_total,
            queue_messages_processed_total,
            queue_messages_failed_total,
            poll_errors_total,
            tasks_run_total,
        })
    }

    pub fn record_handler_failure(&self, kind: &str) {
        self.handler_failures_total.with_label_values(&[kind]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
