//! Escalation and SLA monitoring.
//!
//! Escalation is the designed hand-off to a human after a failure or SLA
//! breach: it appends an audit record, moves the incident to `escalated`,
//! and publishes an event. It never auto-resolves; de-escalation is a
//! manual, out-of-core action.

use crate::engine::{SharedAlerts, SharedEscalations, SharedIncidents};
use crate::events::{EngineEvent, EventBus};
use crate::incident::EscalationRecord;
use crate::playbook::{EscalationTrigger, PlaybookEscalationRule};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Target used for sweep-raised SLA breaches.
pub const SLA_BREACH_TARGET: &str = "on-call";

/// Watches incidents for explicit escalation-rule matches and SLA breaches.
pub struct EscalationMonitor {
    incidents: SharedIncidents,
    alerts: SharedAlerts,
    escalations: SharedEscalations,
    bus: Arc<EventBus>,
    /// SLA total applied to incidents without a selected playbook.
    default_sla_total: Duration,
}

impl EscalationMonitor {
    /// Creates a monitor over the engine's collections.
    pub fn new(
        incidents: SharedIncidents,
        alerts: SharedAlerts,
        escalations: SharedEscalations,
        bus: Arc<EventBus>,
        default_sla_total: Duration,
    ) -> Self {
        Self {
            incidents,
            alerts,
            escalations,
            bus,
            default_sla_total,
        }
    }

    /// Escalates an incident to a human target. Appends an
    /// [`EscalationRecord`], sets the incident status, flags linked alerts,
    /// and publishes an event. Returns false if the incident is already
    /// terminal (nothing to escalate).
    #[instrument(skip(self), fields(incident_id = %incident_id))]
    pub async fn escalate(
        &self,
        incident_id: Uuid,
        target: &str,
        reason: &str,
    ) -> bool {
        let alert_ids = {
            let mut incidents = self.incidents.write().await;
            let Some(incident) = incidents.get_mut(&incident_id) else {
                warn!("Escalation requested for unknown incident");
                return false;
            };
            if incident
                .advance(crate::incident::IncidentStatus::Escalated)
                .is_err()
            {
                debug!("Incident already terminal; escalation skipped");
                return false;
            }
            incident.alert_ids.clone()
        };

        {
            let mut alerts = self.alerts.write().await;
            for alert_id in &alert_ids {
                if let Some(alert) = alerts.get_mut(alert_id) {
                    alert.disposition.escalated = true;
                }
            }
        }

        self.escalations.write().await.push(EscalationRecord {
            incident_id,
            target: target.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });

        info!(target, reason, "Incident escalated");
        metrics::counter!("rampart_escalations").increment(1);

        self.bus
            .publish(EngineEvent::IncidentEscalated {
                incident_id,
                target: target.to_string(),
                reason: reason.to_string(),
            })
            .await;
        true
    }

    /// Evaluates a playbook's explicit escalation rules against an incident.
    /// `containment_failed` reports whether a contain/remediate step just
    /// failed. The first matching rule escalates; returns whether one fired.
    pub async fn evaluate_rules(
        &self,
        incident_id: Uuid,
        rules: &[PlaybookEscalationRule],
        containment_failed: bool,
    ) -> bool {
        let elapsed_ms = {
            let incidents = self.incidents.read().await;
            match incidents.get(&incident_id) {
                Some(incident) if !incident.status.is_terminal() => {
                    incident.elapsed_ms(Utc::now())
                }
                _ => return false,
            }
        };

        for rule in rules {
            let triggered = match &rule.trigger {
                EscalationTrigger::ContainmentFailed => containment_failed,
                EscalationTrigger::TotalTimeExceeds { ms } => elapsed_ms > *ms as i64,
            };
            if triggered {
                let reason = match &rule.trigger {
                    EscalationTrigger::ContainmentFailed => {
                        format!("containment_failed (notify {})", rule.notify)
                    }
                    EscalationTrigger::TotalTimeExceeds { ms } => {
                        format!(
                            "total_time {}ms exceeded {}ms (notify {})",
                            elapsed_ms, ms, rule.notify
                        )
                    }
                };
                return self.escalate(incident_id, &rule.target, &reason).await;
            }
        }
        false
    }

    /// Background sweep: raises a generic SLA-breach escalation for every
    /// open incident whose total elapsed time exceeds its playbook's SLA
    /// total (or the default, when no playbook was selected). Returns the
    /// number of escalations raised.
    #[instrument(skip_all)]
    pub async fn sweep(&self, sla_total_for: impl Fn(Uuid) -> Option<u64>) -> usize {
        let now = Utc::now();
        let breached: Vec<(Uuid, i64, u64)> = {
            let incidents = self.incidents.read().await;
            incidents
                .values()
                .filter(|i| !i.status.is_terminal())
                .filter_map(|i| {
                    let total_ms = i
                        .playbook_id
                        .and_then(&sla_total_for)
                        .unwrap_or(self.default_sla_total.as_millis() as u64);
                    let elapsed = i.elapsed_ms(now);
                    (elapsed > total_ms as i64).then_some((i.id, elapsed, total_ms))
                })
                .collect()
        };

        let mut raised = 0;
        for (incident_id, elapsed, total_ms) in breached {
            let reason = format!("sla_breach: total_time {}ms exceeded {}ms", elapsed, total_ms);
            if self.escalate(incident_id, SLA_BREACH_TARGET, &reason).await {
                raised += 1;
            }
        }
        if raised > 0 {
            info!("SLA sweep escalated {} incidents", raised);
        }
        raised
    }

    /// Snapshot of the escalation audit trail.
    pub async fn records(&self) -> Vec<EscalationRecord> {
        self.escalations.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertSource, Severity};
    use crate::incident::{Incident, IncidentStatus};
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    struct Fixture {
        monitor: EscalationMonitor,
        incidents: SharedIncidents,
        bus: Arc<EventBus>,
    }

    fn fixture() -> Fixture {
        let incidents: SharedIncidents = Arc::new(RwLock::new(HashMap::new()));
        let alerts: SharedAlerts = Arc::new(RwLock::new(HashMap::new()));
        let escalations: SharedEscalations = Arc::new(RwLock::new(Vec::new()));
        let bus = Arc::new(EventBus::default());
        let monitor = EscalationMonitor::new(
            Arc::clone(&incidents),
            alerts,
            Arc::clone(&escalations),
            Arc::clone(&bus),
            Duration::from_millis(50),
        );
        Fixture {
            monitor,
            incidents,
            bus,
        }
    }

    async fn insert_incident(fixture: &Fixture) -> Uuid {
        let incident = Incident::open(
            "brute-force-login",
            Severity::High,
            AlertSource::new("auth-service", "gateway"),
            vec![],
        );
        let id = incident.id;
        fixture.incidents.write().await.insert(id, incident);
        id
    }

    #[tokio::test]
    async fn escalate_appends_record_and_publishes() {
        let fixture = fixture();
        let mut rx = fixture.bus.subscribe();
        let id = insert_incident(&fixture).await;

        assert!(fixture.monitor.escalate(id, "tier2", "manual").await);

        let incidents = fixture.incidents.read().await;
        assert_eq!(incidents[&id].status, IncidentStatus::Escalated);
        drop(incidents);

        let records = fixture.monitor.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, "tier2");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "incident-escalated");
    }

    #[tokio::test]
    async fn terminal_incidents_are_not_re_escalated() {
        let fixture = fixture();
        let id = insert_incident(&fixture).await;

        assert!(fixture.monitor.escalate(id, "tier2", "first").await);
        assert!(!fixture.monitor.escalate(id, "tier3", "second").await);
        assert_eq!(fixture.monitor.records().await.len(), 1);
    }

    #[tokio::test]
    async fn containment_failed_rule_fires() {
        let fixture = fixture();
        let id = insert_incident(&fixture).await;
        let rules = vec![PlaybookEscalationRule {
            trigger: EscalationTrigger::ContainmentFailed,
            target: "tier2".to_string(),
            notify: "pager".to_string(),
        }];

        assert!(!fixture.monitor.evaluate_rules(id, &rules, false).await);
        assert!(fixture.monitor.evaluate_rules(id, &rules, true).await);

        let records = fixture.monitor.records().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].reason.contains("containment_failed"));
    }

    #[tokio::test]
    async fn total_time_rule_fires_once_budget_is_exceeded() {
        let fixture = fixture();
        let id = insert_incident(&fixture).await;
        let rules = vec![PlaybookEscalationRule {
            trigger: EscalationTrigger::TotalTimeExceeds { ms: 10 },
            target: "tier2".to_string(),
            notify: "pager".to_string(),
        }];

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(fixture.monitor.evaluate_rules(id, &rules, false).await);
    }

    #[tokio::test]
    async fn sweep_raises_generic_sla_breach_without_explicit_rules() {
        let fixture = fixture();
        let id = insert_incident(&fixture).await;

        // Default SLA total in the fixture is 50ms.
        tokio::time::sleep(Duration::from_millis(80)).await;
        let raised = fixture.monitor.sweep(|_| None).await;
        assert_eq!(raised, 1);

        let records = fixture.monitor.records().await;
        assert_eq!(records[0].target, SLA_BREACH_TARGET);
        assert!(records[0].reason.contains("sla_breach"));

        let incidents = fixture.incidents.read().await;
        assert_eq!(incidents[&id].status, IncidentStatus::Escalated);
    }

    #[tokio::test]
    async fn sweep_respects_playbook_sla() {
        let fixture = fixture();
        let id = insert_incident(&fixture).await;
        let playbook_id = Uuid::new_v4();
        fixture
            .incidents
            .write()
            .await
            .get_mut(&id)
            .unwrap()
            .playbook_id = Some(playbook_id);

        // Generous playbook SLA keeps the incident open.
        let raised = fixture.monitor.sweep(|_| Some(60_000)).await;
        assert_eq!(raised, 0);
    }
}
