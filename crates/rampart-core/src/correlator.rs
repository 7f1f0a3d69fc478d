//! Alert correlation.
//!
//! The correlator consumes alerts one at a time from a single serialized
//! queue, so no two alerts are ever correlated concurrently and duplicate
//! incidents cannot race into existence. An alert opens an incident when it
//! is critical on its own, or when enough related alerts (same rule and
//! source system, inside the trailing window) have accumulated.

use crate::alert::Severity;
use crate::automation::{AutomationEngine, AutomationRule};
use crate::engine::{EngineStats, SharedAlerts, SharedIncidents, SharedRules};
use crate::events::{EngineEvent, EventBus};
use crate::incident::{ActionStatus, Incident};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Groups related alerts and opens incidents.
pub struct Correlator {
    alerts: SharedAlerts,
    incidents: SharedIncidents,
    rules: SharedRules,
    automation: AutomationEngine,
    bus: Arc<EventBus>,
    stats: Arc<EngineStats>,
    execution_tx: mpsc::Sender<Uuid>,
    window: ChronoDuration,
    threshold: usize,
}

impl Correlator {
    /// Creates the correlation stage.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        alerts: SharedAlerts,
        incidents: SharedIncidents,
        rules: SharedRules,
        automation: AutomationEngine,
        bus: Arc<EventBus>,
        stats: Arc<EngineStats>,
        execution_tx: mpsc::Sender<Uuid>,
        window: Duration,
        threshold: usize,
    ) -> Self {
        Self {
            alerts,
            incidents,
            rules,
            automation,
            bus,
            stats,
            execution_tx,
            window: ChronoDuration::milliseconds(window.as_millis() as i64),
            threshold,
        }
    }

    /// Serialized consumer loop. Exits on shutdown or queue closure.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Uuid>, mut shutdown: watch::Receiver<bool>) {
        info!("Correlator started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = rx.recv() => {
                    match next {
                        Some(alert_id) => {
                            self.correlate(alert_id).await;
                        }
                        None => break,
                    }
                }
            }
        }
        info!("Correlator stopped");
    }

    /// Correlates a single alert. Returns the id of the incident opened, if
    /// any.
    #[instrument(skip(self))]
    pub async fn correlate(&self, alert_id: Uuid) -> Option<Uuid> {
        // Snapshot the triggering alert and its related set under one read.
        let (alert, related_ids) = {
            let alerts = self.alerts.read().await;
            let alert = alerts.get(&alert_id)?.clone();
            if alert.is_false_positive() || alert.disposition.incident_id.is_some() {
                return None;
            }

            let cutoff = alert.timestamp - self.window;
            // Related set: same rule + source system inside the trailing
            // window, excluding false positives and alerts already linked
            // to an incident. The triggering alert is part of the set.
            let related_ids: Vec<Uuid> = alerts
                .values()
                .filter(|a| {
                    a.rule == alert.rule
                        && a.source.system == alert.source.system
                        && !a.is_false_positive()
                        && a.disposition.incident_id.is_none()
                        && a.timestamp >= cutoff
                        && a.timestamp <= alert.timestamp
                })
                .map(|a| a.id)
                .collect();
            (alert, related_ids)
        };

        let should_open =
            alert.severity == Severity::Critical || related_ids.len() >= self.threshold;
        if !should_open {
            debug!(
                related = related_ids.len(),
                "Alert left unlinked pending future correlation"
            );
            return None;
        }

        let mut incident = Incident::open(
            alert.rule.clone(),
            alert.severity,
            alert.source.clone(),
            related_ids.clone(),
        );
        let incident_id = incident.id;

        // Indicator values seen across the correlated alerts.
        {
            let mut alerts = self.alerts.write().await;
            for related_id in &related_ids {
                if let Some(related) = alerts.get_mut(related_id) {
                    related.link_incident(incident_id);
                    for m in &related.enrichment.intel_matches {
                        if !incident.indicators.contains(&m.value) {
                            incident.indicators.push(m.value.clone());
                        }
                    }
                }
            }
        }

        info!(
            %incident_id,
            category = %incident.category,
            linked = related_ids.len(),
            "Incident opened"
        );
        self.stats.record_incident_created();
        metrics::counter!("rampart_incidents_created").increment(1);

        // Automation rules fire synchronously at incident creation, before
        // the incident becomes visible or is handed to the execution pool.
        {
            let mut rules = self.rules.write().await;
            self.automation
                .apply(&mut rules, &mut incident, &alert)
                .await;
        }

        let category = incident.category;
        let severity = incident.severity;
        let automation_actions: Vec<(Uuid, String, ActionStatus, String)> = incident
            .actions
            .iter()
            .map(|a| {
                (
                    a.id,
                    a.action.clone(),
                    a.status,
                    a.result.as_ref().map(|r| r.output.clone()).unwrap_or_default(),
                )
            })
            .collect();

        self.incidents
            .write()
            .await
            .insert(incident_id, incident);

        // Publish only after the incident is queryable by subscribers.
        self.bus
            .publish(EngineEvent::IncidentCreated {
                incident_id,
                category,
                severity,
                alert_ids: related_ids,
            })
            .await;
        for (action_id, action, status, error) in automation_actions {
            match status {
                ActionStatus::Completed => {
                    self.stats.record_action_executed();
                    self.bus
                        .publish(EngineEvent::ActionCompleted {
                            incident_id,
                            action_id,
                            action,
                        })
                        .await;
                }
                ActionStatus::Failed => {
                    self.stats.record_action_failed();
                    self.bus
                        .publish(EngineEvent::ActionFailed {
                            incident_id,
                            action_id,
                            action,
                            error,
                        })
                        .await;
                }
                _ => {}
            }
        }

        // Hand off to the execution pool; a full queue applies backpressure.
        if self.execution_tx.send(incident_id).await.is_err() {
            debug!("Execution queue closed; incident not scheduled");
        }

        Some(incident_id)
    }
}
