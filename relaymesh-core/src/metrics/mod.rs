//! Metrics for observability
//!
//! Counters and gauges are recorded through the `metrics` facade. Nothing is
//! exported unless the binary installs a recorder (the CLI can install a
//! Prometheus exporter); without one every call here is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

/// Initialize metrics with descriptions
pub fn init_metrics() {
    // Framing
    describe_counter!(
        "relay.frames.dropped",
        "Frames discarded by a reader, labelled by reason"
    );

    // Forwarding
    describe_counter!(
        "relay.messages.originated",
        "Messages encrypted and sent by this router"
    );
    describe_counter!(
        "relay.messages.forwarded",
        "Envelopes relayed to a next hop"
    );
    describe_counter!(
        "relay.messages.delivered",
        "Envelopes decrypted at their destination"
    );
    describe_counter!(
        "relay.messages.refused",
        "Envelopes dropped by the forwarding checks, labelled by reason"
    );

    // Routing tables
    describe_counter!(
        "relay.routes.pushed",
        "Route tables sent by the controller"
    );
    describe_counter!("relay.routes.stored", "Route tables persisted by a router");
    describe_histogram!(
        "relay.routes.compute_ms",
        "Time to compute every node's routes in milliseconds"
    );

    // Membership
    describe_counter!(
        "relay.nodes.evicted",
        "Routers removed for missing heartbeats"
    );
    describe_gauge!(
        "relay.nodes.connected",
        "Routers currently registered with the controller"
    );
}

pub fn frame_dropped(reason: &'static str) {
    counter!("relay.frames.dropped", "reason" => reason).increment(1);
}

pub fn message_originated() {
    counter!("relay.messages.originated").increment(1);
}

pub fn message_forwarded() {
    counter!("relay.messages.forwarded").increment(1);
}

pub fn message_delivered() {
    counter!("relay.messages.delivered").increment(1);
}

pub fn message_refused(reason: &'static str) {
    counter!("relay.messages.refused", "reason" => reason).increment(1);
}

pub fn routes_pushed(count: u64) {
    counter!("relay.routes.pushed").increment(count);
}

pub fn routes_stored() {
    counter!("relay.routes.stored").increment(1);
}

pub fn node_evicted() {
    counter!("relay.nodes.evicted").increment(1);
}

pub fn connected_nodes(count: usize) {
    gauge!("relay.nodes.connected").set(count as f64);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration in milliseconds
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}
