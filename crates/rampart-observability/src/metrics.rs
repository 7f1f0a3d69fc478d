//! Metric registration for Rampart.
//!
//! The engine records its counters through the `metrics` facade; this module
//! registers the descriptions once so an exporter installed by the embedder
//! (e.g. a Prometheus recorder) can present them.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Registers descriptions for every metric the engine emits.
pub fn describe_engine_metrics() {
    describe_counter!(
        "rampart_alerts_received",
        "Alerts accepted by intake validation"
    );
    describe_counter!(
        "rampart_alerts_rejected",
        "Alerts rejected by intake validation"
    );
    describe_counter!(
        "rampart_incidents_created",
        "Incidents opened by correlation or manual escalation"
    );
    describe_counter!("rampart_incidents_resolved", "Incidents resolved");
    describe_counter!(
        "rampart_rules_triggered",
        "Automation rule matches, counting re-fires"
    );
    describe_counter!(
        "rampart_actions_executed",
        "Response steps completed successfully"
    );
    describe_counter!("rampart_actions_failed", "Response steps failed or timed out");
    describe_counter!("rampart_escalations", "Escalations raised");
    describe_counter!("rampart_events_published", "Events published on the bus");

    describe_gauge!(
        "rampart_open_incidents",
        "Incidents in a non-terminal status"
    );

    describe_histogram!(
        "rampart_step_duration_seconds",
        "Playbook step execution duration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describing_metrics_is_infallible_without_a_recorder() {
        // The facade silently ignores descriptions when no recorder is
        // installed; this must not panic.
        describe_engine_metrics();
        describe_engine_metrics();
    }
}
