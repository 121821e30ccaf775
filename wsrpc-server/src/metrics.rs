//! Server metrics
//!
//! OpenTelemetry instruments recorded by the accept loop, the serve loop and
//! the broadcast path. They are created only when the server is built with
//! observability enabled; exporting them is the meter provider's job (see
//! `wsrpc_core::init_telemetry`).
//!
//! # Metrics Collected
//!
//! - **wsrpc.server.connections.active**: live connections (gauge)
//! - **wsrpc.server.connections.total**: connections accepted (counter)
//! - **wsrpc.server.requests.total**: requests by method and status (counter)
//! - **wsrpc.server.request.duration**: dispatch latency in seconds (histogram)
//! - **wsrpc.server.events.total**: event writes by outcome (counter)
//! - **wsrpc.server.errors.total**: connection-ending errors by kind (counter)

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};
use wsrpc_core::Error;

pub struct ServerMetrics {
    connections_active: Gauge<i64>,
    connections_total: Counter<u64>,
    requests_total: Counter<u64>,
    request_duration: Histogram<f64>,
    events_total: Counter<u64>,
    errors_total: Counter<u64>,
}

impl ServerMetrics {
    /// Create instruments on the global meter named `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        let meter = global::meter_with_scope(
            opentelemetry::InstrumentationScope::builder(service_name.into()).build(),
        );
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connections_active: meter
                .i64_gauge("wsrpc.server.connections.active")
                .with_description("Number of live WebSocket connections")
                .build(),
            connections_total: meter
                .u64_counter("wsrpc.server.connections.total")
                .with_description("Total number of connections accepted")
                .build(),
            requests_total: meter
                .u64_counter("wsrpc.server.requests.total")
                .with_description("Total number of requests dispatched")
                .build(),
            request_duration: meter
                .f64_histogram("wsrpc.server.request.duration")
                .with_description("Dispatch duration in seconds")
                .with_unit("s")
                .build(),
            events_total: meter
                .u64_counter("wsrpc.server.events.total")
                .with_description("Total number of event writes")
                .build(),
            errors_total: meter
                .u64_counter("wsrpc.server.errors.total")
                .with_description("Total number of connection-ending errors")
                .build(),
        }
    }

    pub fn record_connection(&self, active: i64) {
        self.connections_active.record(active, &[]);
        self.connections_total.add(1, &[]);
    }

    pub fn record_disconnection(&self, active: i64) {
        self.connections_active.record(active, &[]);
    }

    /// `status` is "success" or "error"
    pub fn record_request(&self, method: &str, status: &'static str, duration_secs: f64) {
        let attrs = [
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status),
        ];
        self.requests_total.add(1, &attrs);
        self.request_duration.record(duration_secs, &attrs);
    }

    pub fn record_event(&self, event: &str, delivered: bool) {
        let outcome = if delivered { "delivered" } else { "failed" };
        self.events_total.add(
            1,
            &[
                KeyValue::new("event", event.to_string()),
                KeyValue::new("outcome", outcome),
            ],
        );
    }

    pub fn record_error(&self, error: &Error) {
        self.errors_total
            .add(1, &[KeyValue::new("kind", error_kind(error))]);
    }
}

/// Low-cardinality label for an error
fn error_kind(error: &Error) -> &'static str {
    match error {
        Error::JsonRpc(_) => "rpc",
        Error::Serialization(_) => "serialization",
        Error::WebSocket(_) => "websocket",
        Error::Io(_) => "io",
        Error::ConnectionClosed => "closed",
        Error::Cancelled => "cancelled",
        Error::DuplicateMethod(_) | Error::Config(_) => "config",
        Error::Internal(_) => "internal",
    }
}
