//! Telemetry collaborator.
//!
//! The cache reports `added`, `updated` and `deleted` events for the
//! `datastore` object, and clients can forward their own UI events through
//! the hub. Where the events end up is the collaborator's business.

use async_trait::async_trait;
use std::collections::BTreeMap;

/// Extra key/value pairs attached to a telemetry event.
pub type EventExtra = BTreeMap<String, String>;

/// Sink for telemetry events.
#[async_trait]
pub trait Telemetry: Send + Sync {
    /// Record one event.
    async fn record_event(&self, method: &str, object: &str, extra: EventExtra);
}

/// Telemetry sink that emits each event as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

#[async_trait]
impl Telemetry for TracingTelemetry {
    async fn record_event(&self, method: &str, object: &str, extra: EventExtra) {
        tracing::info!(
            target: "credsync::telemetry",
            method,
            object,
            extra = ?extra,
            "telemetry event"
        );
    }
}

/// Telemetry sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

#[async_trait]
impl Telemetry for NoopTelemetry {
    async fn record_event(&self, _method: &str, _object: &str, _extra: EventExtra) {}
}
