//! Prometheus metrics for the controller messenger.
//!
//! All metrics follow the naming convention: `messenger_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Events published, by event name
    pub static ref EVENTS_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("messenger_events_published_total", "Events published through the messenger"),
        &["event"]
    ).expect("metric creation failed");

    /// Subscriber callbacks that failed or panicked during a publish
    pub static ref SUBSCRIBER_FAILURES: CounterVec = CounterVec::new(
        Opts::new("messenger_subscriber_failures_total", "Subscriber failures isolated during publish"),
        &["event"]
    ).expect("metric creation failed");

    /// Action calls by outcome
    pub static ref ACTION_CALLS: CounterVec = CounterVec::new(
        Opts::new("messenger_action_calls_total", "Action calls dispatched by the messenger"),
        &["action", "outcome"]  // outcome: dispatched/no_handler/failed
    ).expect("metric creation failed");

    /// Restricted view capability denials
    pub static ref CAPABILITY_DENIALS: CounterVec = CounterVec::new(
        Opts::new("messenger_capability_denials_total", "Calls rejected by a restricted messenger"),
        &["owner", "kind"]  // kind: action/event/namespace
    ).expect("metric creation failed");
}

/// Outcome label for `ACTION_CALLS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Dispatched,
    NoHandler,
    Failed,
}

impl CallOutcome {
    fn as_label(self) -> &'static str {
        match self {
            CallOutcome::Dispatched => "dispatched",
            CallOutcome::NoHandler => "no_handler",
            CallOutcome::Failed => "failed",
        }
    }
}

/// Handle proving metrics were registered.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Fails if called twice in the same process.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(SUBSCRIBER_FAILURES.clone()),
        Box::new(ACTION_CALLS.clone()),
        Box::new(CAPABILITY_DENIALS.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all registered metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

pub fn record_publish(event: &str) {
    EVENTS_PUBLISHED.with_label_values(&[event]).inc();
}

pub fn record_subscriber_failure(event: &str) {
    SUBSCRIBER_FAILURES.with_label_values(&[event]).inc();
}

pub fn record_action_call(action: &str, outcome: CallOutcome) {
    ACTION_CALLS
        .with_label_values(&[action, outcome.as_label()])
        .inc();
}

pub fn record_capability_denial(owner: &str, kind: &str) {
    CAPABILITY_DENIALS.with_label_values(&[owner, kind]).inc();
}
