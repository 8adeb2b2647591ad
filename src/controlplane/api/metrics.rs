//! API Metrics
//!
//! Prometheus counters for the REST front end, kept in a registry owned by
//! the router rather than the process-wide default.

use crate::error::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters exposed at `/metrics`
pub struct ApiMetrics {
    registry: Registry,
    requests: IntCounterVec,
    objects_created: IntCounter,
    objects_deleted: IntCounter,
    transitions: IntCounterVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("cdmi_http_requests_total", "HTTP requests by method and status"),
            &["method", "status"],
        )?;
        let objects_created = IntCounter::new(
            "cdmi_objects_created_total",
            "Containers, data objects and domains created",
        )?;
        let objects_deleted =
            IntCounter::new("cdmi_objects_deleted_total", "Objects deleted with their subtree")?;
        let transitions = IntCounterVec::new(
            Opts::new(
                "cdmi_qos_transitions_total",
                "QoS transition requests by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(objects_created.clone()))?;
        registry.register(Box::new(objects_deleted.clone()))?;
        registry.register(Box::new(transitions.clone()))?;

        Ok(Self {
            registry,
            requests,
            objects_created,
            objects_deleted,
            transitions,
        })
    }

    pub fn record_request(&self, method: &str, status: u16) {
        let status = status.to_string();
        self.requests
            .with_label_values(&[method, status.as_str()])
            .inc();
    }

    pub fn record_created(&self) {
        self.objects_created.inc();
    }

    pub fn record_deleted(&self) {
        self.objects_deleted.inc();
    }

    /// Count a transition request; `outcome` is `accepted` or `rejected`
    pub fn record_transition(&self, outcome: &str) {
        self.transitions.with_label_values(&[outcome]).inc();
    }

    /// Content type of [`ApiMetrics::render`]
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Render all counters in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
