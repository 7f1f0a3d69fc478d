//! Engine configuration.

use std::time::Duration;

/// Configuration for the response engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of playbook execution workers.
    pub worker_count: usize,
    /// Trailing correlation window for grouping related alerts.
    pub correlation_window: Duration,
    /// Matched-set size at which a non-critical alert opens an incident.
    pub correlation_threshold: usize,
    /// Interval between background SLA/retention sweeps.
    pub sweep_interval: Duration,
    /// Capacity of the alert intake queue.
    pub alert_queue_capacity: usize,
    /// Capacity of the incident execution queue.
    pub execution_queue_capacity: usize,
    /// Event bus broadcast capacity.
    pub event_bus_capacity: usize,
    /// Event history ring-buffer size.
    pub event_history_size: usize,
    /// Execution budget for a single automation-rule action.
    pub action_budget: Duration,
    /// SLA total used by the sweep for incidents without a playbook.
    pub default_sla_total: Duration,
    /// Age past which resolved/escalated incidents are swept away.
    pub retention_age: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            correlation_window: Duration::from_secs(5 * 60),
            correlation_threshold: 3,
            sweep_interval: Duration::from_secs(30),
            alert_queue_capacity: 1024,
            execution_queue_capacity: 256,
            event_bus_capacity: 1024,
            event_history_size: 1000,
            action_budget: Duration::from_secs(5),
            default_sla_total: Duration::from_secs(60 * 60),
            retention_age: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_is_four_workers() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.correlation_window, Duration::from_secs(300));
        assert_eq!(config.correlation_threshold, 3);
    }
}
