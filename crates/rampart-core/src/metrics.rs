//! Read-side metrics projection.
//!
//! The aggregator owns no state of its own: every snapshot is recomputed
//! from the live alert/incident/escalation collections at query time.

use crate::engine::{SharedAlerts, SharedEscalations, SharedIncidents};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A point-in-time view over the engine's collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was computed.
    pub generated_at: DateTime<Utc>,
    /// Total alerts held.
    pub total_alerts: usize,
    /// Total incidents held.
    pub total_incidents: usize,
    /// Incidents in a non-terminal status.
    pub open_incidents: usize,
    /// Incident counts keyed by status name.
    pub incidents_by_status: HashMap<String, usize>,
    /// Incident counts keyed by severity name.
    pub incidents_by_severity: HashMap<String, usize>,
    /// Incident counts keyed by category name.
    pub incidents_by_category: HashMap<String, usize>,
    /// Mean time to resolution over resolved incidents, in milliseconds.
    pub mean_resolution_ms: Option<f64>,
    /// Fraction of incidents whose every recorded action was automated.
    pub automation_rate: f64,
    /// Fraction of incidents that ever reached escalated.
    pub escalation_rate: f64,
    /// Escalation records on the audit trail.
    pub escalations_recorded: usize,
}

/// Derives rolling counters from the engine's live collections.
pub struct MetricsAggregator {
    alerts: SharedAlerts,
    incidents: SharedIncidents,
    escalations: SharedEscalations,
}

impl MetricsAggregator {
    /// Creates an aggregator over the given collections.
    pub fn new(
        alerts: SharedAlerts,
        incidents: SharedIncidents,
        escalations: SharedEscalations,
    ) -> Self {
        Self {
            alerts,
            incidents,
            escalations,
        }
    }

    /// Computes a fresh snapshot.
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let alerts = self.alerts.read().await;
        let incidents = self.incidents.read().await;
        let escalations = self.escalations.read().await;

        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut by_severity: HashMap<String, usize> = HashMap::new();
        let mut by_category: HashMap<String, usize> = HashMap::new();
        let mut open = 0usize;
        let mut resolution_total_ms = 0i64;
        let mut resolved = 0usize;
        let mut fully_automated = 0usize;
        let mut escalated = 0usize;

        for incident in incidents.values() {
            *by_status.entry(incident.status.to_string()).or_insert(0) += 1;
            *by_severity
                .entry(incident.severity.to_string())
                .or_insert(0) += 1;
            *by_category
                .entry(incident.category.to_string())
                .or_insert(0) += 1;

            if !incident.status.is_terminal() {
                open += 1;
            }
            if let Some(ms) = incident.resolution_ms() {
                resolution_total_ms += ms;
                resolved += 1;
            }
            if !incident.actions.is_empty() && incident.actions.iter().all(|a| a.automated) {
                fully_automated += 1;
            }
            if incident.was_escalated() {
                escalated += 1;
            }
        }

        metrics::gauge!("rampart_open_incidents").set(open as f64);

        let total = incidents.len();
        let rate = |n: usize| {
            if total == 0 {
                0.0
            } else {
                n as f64 / total as f64
            }
        };

        MetricsSnapshot {
            generated_at: Utc::now(),
            total_alerts: alerts.len(),
            total_incidents: total,
            open_incidents: open,
            incidents_by_status: by_status,
            incidents_by_severity: by_severity,
            incidents_by_category: by_category,
            mean_resolution_ms: if resolved == 0 {
                None
            } else {
                Some(resolution_total_ms as f64 / resolved as f64)
            },
            automation_rate: rate(fully_automated),
            escalation_rate: rate(escalated),
            escalations_recorded: escalations.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertSource, Severity};
    use crate::incident::{
        ActionKind, ActionOutcome, Incident, IncidentAction, IncidentStatus,
    };
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use uuid::Uuid;

    fn aggregator_over(
        incidents: Vec<Incident>,
    ) -> MetricsAggregator {
        let map: HashMap<Uuid, Incident> =
            incidents.into_iter().map(|i| (i.id, i)).collect();
        MetricsAggregator::new(
            Arc::new(RwLock::new(HashMap::new())),
            Arc::new(RwLock::new(map)),
            Arc::new(RwLock::new(Vec::new())),
        )
    }

    fn incident(rule: &str, severity: Severity) -> Incident {
        Incident::open(
            rule,
            severity,
            AlertSource::new("edr", "sensor-1"),
            vec![Uuid::new_v4()],
        )
    }

    #[tokio::test]
    async fn empty_collections_produce_zero_rates() {
        let agg = aggregator_over(vec![]);
        let snap = agg.snapshot().await;
        assert_eq!(snap.total_incidents, 0);
        assert_eq!(snap.automation_rate, 0.0);
        assert_eq!(snap.escalation_rate, 0.0);
        assert!(snap.mean_resolution_ms.is_none());
    }

    #[tokio::test]
    async fn rates_and_counts() {
        let mut automated = incident("malware-beacon", Severity::High);
        let mut action = IncidentAction::new(ActionKind::Contain, "block_ip", true);
        action.start();
        action.complete(ActionOutcome {
            success: true,
            output: "blocked".into(),
            artifacts: vec![],
        });
        automated.append_action(action);
        automated.advance(IncidentStatus::Resolved).unwrap();

        let mut escalated = incident("brute-force-login", Severity::Medium);
        escalated.advance(IncidentStatus::Escalated).unwrap();

        let manual = incident("phishing-link", Severity::Low);

        let agg = aggregator_over(vec![automated, escalated, manual]);
        let snap = agg.snapshot().await;

        assert_eq!(snap.total_incidents, 3);
        assert_eq!(snap.open_incidents, 1);
        assert_eq!(snap.incidents_by_status["resolved"], 1);
        assert_eq!(snap.incidents_by_status["escalated"], 1);
        assert_eq!(snap.incidents_by_category["malware"], 1);
        assert!((snap.automation_rate - 1.0 / 3.0).abs() < f64::EPSILON);
        assert!((snap.escalation_rate - 1.0 / 3.0).abs() < f64::EPSILON);
        assert!(snap.mean_resolution_ms.unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn incidents_without_actions_are_not_counted_automated() {
        let agg = aggregator_over(vec![incident("odd-process-tree", Severity::Low)]);
        let snap = agg.snapshot().await;
        assert_eq!(snap.automation_rate, 0.0);
    }
}
