//! Prometheus metrics collection for pitboss.
//!
//! Exposed on the HTTP endpoint served by [`crate::http`].
//!
//! - `pitboss_ledger_operations_total{op,result}` - ledger operations by outcome
//! - `pitboss_broadcast_fanout` - recipients per room frame (histogram)
//! - `pitboss_messages_dropped_total` - frames not delivered to a member
//! - `pitboss_slow_consumers_total` - connections closed for a full send queue
//! - `pitboss_outbox_total{kind,result}` - notification delivery attempts

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Ledger operations by name and result code (`ok` on success).
pub static LEDGER_OPERATIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Authentication attempts by result.
pub static AUTH_ATTEMPTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Frames rejected by flood protection.
pub static RATE_LIMITED: OnceLock<IntCounter> = OnceLock::new();

/// Frames dropped because a member's queue was full or closed.
pub static MESSAGES_DROPPED: OnceLock<IntCounter> = OnceLock::new();

/// Connections closed because their send queue overflowed.
pub static SLOW_CONSUMERS: OnceLock<IntCounter> = OnceLock::new();

/// Outbox delivery attempts by kind and result.
pub static OUTBOX_DELIVERIES: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

/// Currently open connections.
pub static CONNECTED_CLIENTS: OnceLock<IntGauge> = OnceLock::new();

/// Rooms with a live actor.
pub static ACTIVE_ROOMS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Recipients per broadcast frame.
pub static BROADCAST_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(LEDGER_OPERATIONS, IntCounterVec::new(Opts::new("pitboss_ledger_operations_total", "Ledger operations by result"), &["op", "result"]));
    register!(AUTH_ATTEMPTS, IntCounterVec::new(Opts::new("pitboss_auth_attempts_total", "Authentication attempts by result"), &["result"]));
    register!(RATE_LIMITED, IntCounter::new("pitboss_rate_limited_total", "Frames rejected by flood protection"));
    register!(MESSAGES_DROPPED, IntCounter::new("pitboss_messages_dropped_total", "Frames not delivered to a member"));
    register!(SLOW_CONSUMERS, IntCounter::new("pitboss_slow_consumers_total", "Connections closed for a full send queue"));
    register!(OUTBOX_DELIVERIES, IntCounterVec::new(Opts::new("pitboss_outbox_total", "Notification delivery attempts"), &["kind", "result"]));
    register!(CONNECTED_CLIENTS, IntGauge::new("pitboss_connected_clients", "Currently open connections"));
    register!(ACTIVE_ROOMS, IntGauge::new("pitboss_active_rooms", "Rooms with a live actor"));
    register!(BROADCAST_FANOUT, Histogram::with_opts(
        HistogramOpts::new("pitboss_broadcast_fanout", "Recipients per broadcast frame")
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
    ));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers; all are no-ops until `init` has run.
// ============================================================================

#[inline]
pub fn record_ledger_op(op: &str, result: &str) {
    if let Some(c) = LEDGER_OPERATIONS.get() {
        c.with_label_values(&[op, result]).inc();
    }
}

#[inline]
pub fn record_auth(result: &str) {
    if let Some(c) = AUTH_ATTEMPTS.get() {
        c.with_label_values(&[result]).inc();
    }
}

#[inline]
pub fn record_rate_limited() {
    if let Some(c) = RATE_LIMITED.get() {
        c.inc();
    }
}

#[inline]
pub fn record_dropped(count: u64) {
    if let Some(c) = MESSAGES_DROPPED.get() {
        c.inc_by(count);
    }
}

#[inline]
pub fn record_slow_consumer() {
    if let Some(c) = SLOW_CONSUMERS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_outbox(kind: &str, result: &str) {
    if let Some(c) = OUTBOX_DELIVERIES.get() {
        c.with_label_values(&[kind, result]).inc();
    }
}

#[inline]
pub fn set_connected_clients(count: usize) {
    if let Some(g) = CONNECTED_CLIENTS.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn set_active_rooms(count: usize) {
    if let Some(g) = ACTIVE_ROOMS.get() {
        g.set(count as i64);
    }
}

/// Record how many members a room frame was delivered to.
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = BROADCAST_FANOUT.get() {
        h.observe(recipients as f64);
    }
}
