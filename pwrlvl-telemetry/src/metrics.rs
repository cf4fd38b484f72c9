//! ## pwrlvl-telemetry::metrics
//! **Prometheus exporter**
//!
//! Counters for control actions and process escalations, gauges mirrored from the event bus
//! at scrape time.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics registry error: {0}")]
    Registry(#[from] prometheus::Error),
    #[error("metrics output is not UTF-8")]
    Encoding,
}

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub operations_started: IntCounter,
    pub operations_failed: IntCounter,
    pub processes_killed: IntCounter,
    pub http_requests: IntCounter,
    pub events_published: IntGauge,
    pub events_dropped: IntGauge,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let operations_started = IntCounter::new(
            "pwrlvl_operations_started_total",
            "Operations accepted by the orchestrator",
        )?;
        let operations_failed = IntCounter::new(
            "pwrlvl_operations_failed_total",
            "Operation routines that ended with an error",
        )?;
        let processes_killed = IntCounter::new(
            "pwrlvl_processes_killed_total",
            "External processes that ignored the terminate signal and were killed",
        )?;
        let http_requests =
            IntCounter::new("pwrlvl_http_requests_total", "Parsed HTTP requests")?;
        let events_published =
            IntGauge::new("pwrlvl_events_published", "Events published on the bus")?;
        let events_dropped = IntGauge::new(
            "pwrlvl_events_dropped",
            "Deliveries dropped because a subscriber queue was full",
        )?;

        registry.register(Box::new(operations_started.clone()))?;
        registry.register(Box::new(operations_failed.clone()))?;
        registry.register(Box::new(processes_killed.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(events_published.clone()))?;
        registry.register(Box::new(events_dropped.clone()))?;

        Ok(Self {
            registry,
            operations_started,
            operations_failed,
            processes_killed,
            http_requests,
            events_published,
            events_dropped,
        })
    }

    /// Mirror the bus counters into the gauges.
    pub fn observe_bus(&self, published: u64, dropped: u64) {
        self.events_published.set(published as i64);
        self.events_dropped.set(dropped as i64);
    }

    pub fn gather_metrics(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|_| MetricsError::Encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathers_registered_metrics() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.operations_started.inc();
        metrics.observe_bus(7, 2);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("pwrlvl_operations_started_total 1"));
        assert!(text.contains("pwrlvl_events_published 7"));
        assert!(text.contains("pwrlvl_events_dropped 2"));
    }

    #[test]
    fn recorders_are_independent() {
        let a = MetricsRecorder::new().unwrap();
        let b = MetricsRecorder::new().unwrap();
        a.http_requests.inc();
        assert_eq!(b.http_requests.get(), 0);
    }
}
