//! Tests for utility helpers

use prometheus_sequencer::util::init_tracing;

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!(target: "prometheus_sequencer", "tracing initialized twice without panicking");
}
