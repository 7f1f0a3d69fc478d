//! The response engine.
//!
//! [`ResponseEngine`] is the explicitly constructed entry point: collaborators
//! (threat-intel provider, action executor) are injected, `start` spawns the
//! correlator loop, the execution worker pool, and the background sweep, and
//! `stop` drains them. There is no process-global instance.

use crate::alert::{Alert, AlertStatus};
use crate::automation::{AutomationEngine, AutomationRule};
use crate::config::EngineConfig;
use crate::containment::ActionExecutor;
use crate::correlator::Correlator;
use crate::escalation::EscalationMonitor;
use crate::events::{EngineEvent, EventBus};
use crate::executor::PlaybookExecutor;
use crate::incident::{
    EscalationRecord, Incident, Investigation, ResponseSummary,
};
use crate::intake::{AlertIntake, IntakeError, RawAlert};
use crate::metrics::{MetricsAggregator, MetricsSnapshot};
use crate::playbook::{PlaybookError, PlaybookTemplate};
use crate::threat_intel::ThreatIntelProvider;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Alert collection, mutated only by intake (creation) and the correlator
/// (linkage).
pub type SharedAlerts = Arc<RwLock<HashMap<Uuid, Alert>>>;
/// Incident collection, mutated only by the correlator (creation) and the
/// executor/escalation monitor (step append, status).
pub type SharedIncidents = Arc<RwLock<HashMap<Uuid, Incident>>>;
/// Automation rules, ordered by registration.
pub type SharedRules = Arc<RwLock<Vec<AutomationRule>>>;
/// Playbook templates, ordered by registration (selection order).
pub type SharedPlaybooks = Arc<RwLock<Vec<PlaybookTemplate>>>;
/// Append-only escalation audit trail.
pub type SharedEscalations = Arc<RwLock<Vec<EscalationRecord>>>;

/// Errors surfaced by the engine's operator surface.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Playbook(#[from] PlaybookError),

    #[error("Incident not found: {0}")]
    IncidentNotFound(Uuid),

    #[error("Alert not found: {0}")]
    AlertNotFound(Uuid),

    #[error("Automation rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("Alert {alert_id} is already linked to incident {incident_id}")]
    AlertAlreadyLinked { alert_id: Uuid, incident_id: Uuid },
}

/// Monotonic engine counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    alerts_received: AtomicU64,
    alerts_rejected: AtomicU64,
    incidents_created: AtomicU64,
    incidents_resolved: AtomicU64,
    actions_executed: AtomicU64,
    actions_failed: AtomicU64,
}

impl EngineStats {
    pub fn record_alert_received(&self) {
        self.alerts_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_rejected(&self) {
        self.alerts_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_incident_created(&self) {
        self.incidents_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_incident_resolved(&self) {
        self.incidents_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_executed(&self) {
        self.actions_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_failed(&self) {
        self.actions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            alerts_received: self.alerts_received.load(Ordering::Relaxed),
            alerts_rejected: self.alerts_rejected.load(Ordering::Relaxed),
            incidents_created: self.incidents_created.load(Ordering::Relaxed),
            incidents_resolved: self.incidents_resolved.load(Ordering::Relaxed),
            actions_executed: self.actions_executed.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`EngineStats`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStatsSnapshot {
    pub alerts_received: u64,
    pub alerts_rejected: u64,
    pub incidents_created: u64,
    pub incidents_resolved: u64,
    pub actions_executed: u64,
    pub actions_failed: u64,
}

/// The security alert/incident orchestration engine.
pub struct ResponseEngine {
    config: EngineConfig,
    bus: Arc<EventBus>,
    alerts: SharedAlerts,
    incidents: SharedIncidents,
    rules: SharedRules,
    playbooks: SharedPlaybooks,
    escalations: SharedEscalations,
    stats: Arc<EngineStats>,
    intake: AlertIntake,
    correlator: Arc<Correlator>,
    executor: Arc<PlaybookExecutor>,
    escalation: Arc<EscalationMonitor>,
    aggregator: MetricsAggregator,
    execution_tx: mpsc::Sender<Uuid>,
    alert_rx: Mutex<Option<mpsc::Receiver<Uuid>>>,
    execution_rx: Mutex<Option<mpsc::Receiver<Uuid>>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl ResponseEngine {
    /// Builds an engine with injected collaborators. Nothing runs until
    /// [`start`](Self::start) is called.
    pub fn new(
        config: EngineConfig,
        intel: Arc<dyn ThreatIntelProvider>,
        actions: Arc<dyn ActionExecutor>,
    ) -> Self {
        let bus = Arc::new(EventBus::new(
            config.event_bus_capacity,
            config.event_history_size,
        ));
        let alerts: SharedAlerts = Arc::new(RwLock::new(HashMap::new()));
        let incidents: SharedIncidents = Arc::new(RwLock::new(HashMap::new()));
        let rules: SharedRules = Arc::new(RwLock::new(Vec::new()));
        let playbooks: SharedPlaybooks = Arc::new(RwLock::new(Vec::new()));
        let escalations: SharedEscalations = Arc::new(RwLock::new(Vec::new()));
        let stats = Arc::new(EngineStats::default());

        let (alert_tx, alert_rx) = mpsc::channel(config.alert_queue_capacity);
        let (execution_tx, execution_rx) = mpsc::channel(config.execution_queue_capacity);
        let (shutdown_tx, _) = watch::channel(false);

        let intake = AlertIntake::new(
            Arc::clone(&alerts),
            intel,
            Arc::clone(&bus),
            alert_tx,
            Arc::clone(&stats),
        );

        let escalation = Arc::new(EscalationMonitor::new(
            Arc::clone(&incidents),
            Arc::clone(&alerts),
            Arc::clone(&escalations),
            Arc::clone(&bus),
            config.default_sla_total,
        ));

        let correlator = Arc::new(Correlator::new(
            Arc::clone(&alerts),
            Arc::clone(&incidents),
            Arc::clone(&rules),
            AutomationEngine::new(Arc::clone(&actions), config.action_budget),
            Arc::clone(&bus),
            Arc::clone(&stats),
            execution_tx.clone(),
            config.correlation_window,
            config.correlation_threshold,
        ));

        let executor = Arc::new(PlaybookExecutor::new(
            Arc::clone(&incidents),
            Arc::clone(&playbooks),
            actions,
            Arc::clone(&escalation),
            Arc::clone(&bus),
            Arc::clone(&stats),
        ));

        let aggregator = MetricsAggregator::new(
            Arc::clone(&alerts),
            Arc::clone(&incidents),
            Arc::clone(&escalations),
        );

        Self {
            config,
            bus,
            alerts,
            incidents,
            rules,
            playbooks,
            escalations,
            stats,
            intake,
            correlator,
            executor,
            escalation,
            aggregator,
            execution_tx,
            alert_rx: Mutex::new(Some(alert_rx)),
            execution_rx: Mutex::new(Some(execution_rx)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Starts the correlator loop, the execution worker pool, and the
    /// background sweep. Idempotent.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tasks = self.tasks.lock().await;

        if let Some(alert_rx) = self.alert_rx.lock().await.take() {
            let correlator = Arc::clone(&self.correlator);
            let shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(correlator.run(alert_rx, shutdown)));
        }

        if let Some(execution_rx) = self.execution_rx.lock().await.take() {
            let queue = Arc::new(Mutex::new(execution_rx));
            for worker_id in 0..self.config.worker_count {
                let executor = Arc::clone(&self.executor);
                let queue = Arc::clone(&queue);
                let shutdown = self.shutdown_tx.subscribe();
                tasks.push(tokio::spawn(executor.run_worker(
                    worker_id,
                    queue,
                    shutdown,
                )));
            }
        }

        tasks.push(tokio::spawn(Self::sweep_loop(
            self.config.clone(),
            Arc::clone(&self.escalation),
            Arc::clone(&self.playbooks),
            Arc::clone(&self.incidents),
            Arc::clone(&self.alerts),
            self.shutdown_tx.subscribe(),
        )));

        info!(workers = self.config.worker_count, "Response engine started");
    }

    /// Signals shutdown and waits for the background tasks to drain.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        info!("Response engine stopped");
    }

    /// Whether the engine is accepting work.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Background sweep: SLA breach checks plus retention cleanup.
    async fn sweep_loop(
        config: EngineConfig,
        escalation: Arc<EscalationMonitor>,
        playbooks: SharedPlaybooks,
        incidents: SharedIncidents,
        alerts: SharedAlerts,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let sla_by_id: HashMap<Uuid, u64> = playbooks
                        .read()
                        .await
                        .iter()
                        .map(|p| (p.id, p.sla.total_ms))
                        .collect();
                    escalation
                        .sweep(|id| sla_by_id.get(&id).copied())
                        .await;
                    Self::sweep_retention(&incidents, &alerts, &config).await;
                }
            }
        }
        debug!("Sweep loop stopped");
    }

    /// Removes terminal incidents past the retention age, together with
    /// their resolved alerts. The only deletion path in the engine.
    async fn sweep_retention(
        incidents: &SharedIncidents,
        alerts: &SharedAlerts,
        config: &EngineConfig,
    ) {
        let cutoff = Utc::now()
            - chrono::Duration::milliseconds(config.retention_age.as_millis() as i64);

        let removed: Vec<Uuid> = {
            let mut incidents = incidents.write().await;
            let removed: Vec<Uuid> = incidents
                .values()
                .filter(|i| i.status.is_terminal() && i.updated_at < cutoff)
                .map(|i| i.id)
                .collect();
            for id in &removed {
                incidents.remove(id);
            }
            removed
        };

        if !removed.is_empty() {
            let mut alerts = alerts.write().await;
            alerts.retain(|_, a| {
                !(a.timestamp < cutoff
                    && a.disposition
                        .incident_id
                        .map(|id| removed.contains(&id))
                        .unwrap_or(false))
            });
            info!("Retention sweep removed {} incidents", removed.len());
        }
    }

    // ============================================================
    // Ingestion
    // ============================================================

    /// Ingests a raw alert: validates, enriches, stores, and queues it for
    /// correlation. Invalid alerts are rejected synchronously.
    pub async fn ingest_alert(&self, raw: RawAlert) -> Result<Uuid, EngineError> {
        if !self.is_running() {
            return Err(EngineError::Intake(IntakeError::EngineStopped));
        }
        Ok(self.intake.ingest(raw).await?)
    }

    // ============================================================
    // Operator surface
    // ============================================================

    /// Queries an alert by id.
    pub async fn alert(&self, id: Uuid) -> Option<Alert> {
        self.alerts.read().await.get(&id).cloned()
    }

    /// Queries an incident by id.
    pub async fn incident(&self, id: Uuid) -> Option<Incident> {
        self.incidents.read().await.get(&id).cloned()
    }

    /// Lists incidents in a non-terminal status.
    pub async fn active_incidents(&self) -> Vec<Incident> {
        self.incidents
            .read()
            .await
            .values()
            .filter(|i| !i.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Lists every incident held in memory.
    pub async fn incidents(&self) -> Vec<Incident> {
        self.incidents.read().await.values().cloned().collect()
    }

    /// Updates an alert's triage status.
    pub async fn set_alert_status(
        &self,
        alert_id: Uuid,
        status: AlertStatus,
    ) -> Result<(), EngineError> {
        let mut alerts = self.alerts.write().await;
        let alert = alerts
            .get_mut(&alert_id)
            .ok_or(EngineError::AlertNotFound(alert_id))?;
        alert.disposition.status = status;
        Ok(())
    }

    /// Updates an incident's investigation block.
    pub async fn update_investigation<F>(
        &self,
        incident_id: Uuid,
        update: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(&mut Investigation),
    {
        let status = {
            let mut incidents = self.incidents.write().await;
            let incident = incidents
                .get_mut(&incident_id)
                .ok_or(EngineError::IncidentNotFound(incident_id))?;
            update(&mut incident.investigation);
            incident.updated_at = Utc::now();
            incident.status
        };
        self.bus
            .publish(EngineEvent::IncidentUpdated {
                incident_id,
                status,
            })
            .await;
        Ok(())
    }

    /// Updates an incident's response block.
    pub async fn update_response<F>(
        &self,
        incident_id: Uuid,
        update: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(&mut ResponseSummary),
    {
        let status = {
            let mut incidents = self.incidents.write().await;
            let incident = incidents
                .get_mut(&incident_id)
                .ok_or(EngineError::IncidentNotFound(incident_id))?;
            update(&mut incident.response);
            incident.updated_at = Utc::now();
            incident.status
        };
        self.bus
            .publish(EngineEvent::IncidentUpdated {
                incident_id,
                status,
            })
            .await;
        Ok(())
    }

    /// Registers an automation rule.
    pub async fn register_rule(&self, rule: AutomationRule) -> Uuid {
        let id = rule.id;
        self.rules.write().await.push(rule);
        id
    }

    /// Enables or disables an automation rule.
    pub async fn set_rule_enabled(&self, rule_id: Uuid, enabled: bool) -> Result<(), EngineError> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or(EngineError::RuleNotFound(rule_id))?;
        rule.enabled = enabled;
        info!(rule = %rule.name, enabled, "Automation rule toggled");
        Ok(())
    }

    /// Lists registered automation rules.
    pub async fn automation_rules(&self) -> Vec<AutomationRule> {
        self.rules.read().await.clone()
    }

    /// Evaluates the enabled automation rules against a raw alert, before
    /// any incident exists. Pure evaluation: no actions fire.
    pub async fn matching_rules_for_alert(&self, alert_id: Uuid) -> Result<Vec<Uuid>, EngineError> {
        let alerts = self.alerts.read().await;
        let alert = alerts
            .get(&alert_id)
            .ok_or(EngineError::AlertNotFound(alert_id))?;
        let fields = alert.field_map();
        Ok(self
            .rules
            .read()
            .await
            .iter()
            .filter(|r| r.matches(&fields))
            .map(|r| r.id)
            .collect())
    }

    /// Registers a custom playbook template after validating its step graph.
    pub async fn register_playbook(
        &self,
        playbook: PlaybookTemplate,
    ) -> Result<Uuid, EngineError> {
        playbook.graph()?;
        let id = playbook.id;
        info!(playbook = %playbook.name, "Playbook registered");
        self.playbooks.write().await.push(playbook);
        Ok(id)
    }

    /// Enables or disables a playbook.
    pub async fn set_playbook_enabled(
        &self,
        playbook_id: Uuid,
        enabled: bool,
    ) -> Result<(), EngineError> {
        let mut playbooks = self.playbooks.write().await;
        let playbook = playbooks
            .iter_mut()
            .find(|p| p.id == playbook_id)
            .ok_or(EngineError::Playbook(PlaybookError::NotFound(playbook_id)))?;
        playbook.enabled = enabled;
        info!(playbook = %playbook.name, enabled, "Playbook toggled");
        Ok(())
    }

    /// Lists registered playbooks.
    pub async fn playbooks(&self) -> Vec<PlaybookTemplate> {
        self.playbooks.read().await.clone()
    }

    /// Manually escalates an incident to a target.
    pub async fn escalate_incident(
        &self,
        incident_id: Uuid,
        target: &str,
        reason: &str,
    ) -> Result<(), EngineError> {
        if self.escalation.escalate(incident_id, target, reason).await {
            Ok(())
        } else {
            Err(EngineError::IncidentNotFound(incident_id))
        }
    }

    /// Opens an incident directly from an unlinked alert (manual
    /// escalation) and schedules it for execution.
    pub async fn escalate_alert(&self, alert_id: Uuid) -> Result<Uuid, EngineError> {
        let incident = {
            let mut alerts = self.alerts.write().await;
            let alert = alerts
                .get_mut(&alert_id)
                .ok_or(EngineError::AlertNotFound(alert_id))?;
            if let Some(incident_id) = alert.disposition.incident_id {
                return Err(EngineError::AlertAlreadyLinked {
                    alert_id,
                    incident_id,
                });
            }
            let mut incident = Incident::open(
                alert.rule.clone(),
                alert.severity,
                alert.source.clone(),
                vec![alert_id],
            );
            for m in &alert.enrichment.intel_matches {
                incident.indicators.push(m.value.clone());
            }
            alert.link_incident(incident.id);
            alert.disposition.escalated = true;
            incident
        };

        let incident_id = incident.id;
        let category = incident.category;
        let severity = incident.severity;
        self.incidents.write().await.insert(incident_id, incident);
        self.stats.record_incident_created();

        self.bus
            .publish(EngineEvent::IncidentCreated {
                incident_id,
                category,
                severity,
                alert_ids: vec![alert_id],
            })
            .await;

        if self.execution_tx.send(incident_id).await.is_err() {
            debug!("Execution queue closed; incident not scheduled");
        }
        Ok(incident_id)
    }

    /// Escalation audit trail.
    pub async fn escalation_records(&self) -> Vec<EscalationRecord> {
        self.escalations.read().await.clone()
    }

    /// Computes a metrics snapshot and publishes it to subscribers.
    pub async fn metrics_snapshot(&self) -> MetricsSnapshot {
        let snapshot = self.aggregator.snapshot().await;
        self.bus
            .publish(EngineEvent::MetricsSnapshot(snapshot.clone()))
            .await;
        snapshot
    }

    /// Engine counters.
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// The engine's event bus, for subscribing sinks.
    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertEvent, AlertSource, Severity};
    use crate::containment::MockActionExecutor;
    use crate::threat_intel::InMemoryThreatIntel;

    fn engine() -> ResponseEngine {
        ResponseEngine::new(
            EngineConfig {
                sweep_interval: std::time::Duration::from_millis(20),
                ..EngineConfig::default()
            },
            Arc::new(InMemoryThreatIntel::new()),
            Arc::new(MockActionExecutor::new()),
        )
    }

    fn raw_alert(severity: Severity) -> RawAlert {
        RawAlert::new(
            "brute-force-login",
            severity,
            AlertSource::new("auth-service", "login-gateway"),
            AlertEvent::new("brute-force", "failed logins"),
        )
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_drains() {
        let engine = engine();
        engine.start().await;
        engine.start().await;
        assert!(engine.is_running());
        engine.stop().await;
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn ingest_requires_running_engine() {
        let engine = engine();
        let result = engine.ingest_alert(raw_alert(Severity::Low)).await;
        assert!(matches!(
            result,
            Err(EngineError::Intake(IntakeError::EngineStopped))
        ));
    }

    #[tokio::test]
    async fn rule_toggle_round_trip() {
        let engine = engine();
        let rule = AutomationRule::new("noop", vec![], vec![]);
        let id = engine.register_rule(rule).await;

        engine.set_rule_enabled(id, false).await.unwrap();
        assert!(!engine.automation_rules().await[0].enabled);

        let missing = engine.set_rule_enabled(Uuid::new_v4(), true).await;
        assert!(matches!(missing, Err(EngineError::RuleNotFound(_))));
    }

    #[tokio::test]
    async fn rule_evaluation_on_raw_alert_is_read_only() {
        use crate::automation::{ConditionOperator, RuleCondition};

        let engine = engine();
        engine.start().await;

        let rule_id = engine
            .register_rule(AutomationRule::new(
                "match brute force",
                vec![RuleCondition::new(
                    "event_type",
                    ConditionOperator::Equals,
                    serde_json::json!("brute-force"),
                )],
                vec![],
            ))
            .await;

        let alert_id = engine.ingest_alert(raw_alert(Severity::Low)).await.unwrap();
        let matched = engine.matching_rules_for_alert(alert_id).await.unwrap();
        assert_eq!(matched, vec![rule_id]);

        // Evaluation fired no actions and left the trigger count alone.
        assert_eq!(engine.automation_rules().await[0].trigger_count, 0);
        engine.stop().await;
    }

    #[tokio::test]
    async fn invalid_playbook_registration_is_rejected() {
        use crate::incident::ActionKind;
        use crate::playbook::{StepBranch, StepDef, TriggerPredicate};

        let engine = engine();
        let bad = PlaybookTemplate::new(
            "backward branch",
            TriggerPredicate::any(),
            vec![
                StepDef::new(1, ActionKind::Analyze, "triage"),
                StepDef::new(2, ActionKind::Notify, "send_notification")
                    .on_failure(StepBranch::GoTo(1)),
            ],
        );
        assert!(matches!(
            engine.register_playbook(bad).await,
            Err(EngineError::Playbook(PlaybookError::BackwardBranch { .. }))
        ));
    }

    #[tokio::test]
    async fn playbook_toggle_round_trip() {
        use crate::incident::ActionKind;
        use crate::playbook::{StepDef, TriggerPredicate};

        let engine = engine();
        let playbook = PlaybookTemplate::new(
            "toggle me",
            TriggerPredicate::any(),
            vec![StepDef::new(1, ActionKind::Notify, "send_notification")],
        );
        let id = engine.register_playbook(playbook).await.unwrap();

        engine.set_playbook_enabled(id, false).await.unwrap();
        assert!(!engine.playbooks().await[0].enabled);

        let missing = engine.set_playbook_enabled(Uuid::new_v4(), true).await;
        assert!(matches!(
            missing,
            Err(EngineError::Playbook(PlaybookError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn manual_alert_escalation_opens_an_incident() {
        let engine = engine();
        engine.start().await;

        let alert_id = engine.ingest_alert(raw_alert(Severity::Low)).await.unwrap();
        let incident_id = engine.escalate_alert(alert_id).await.unwrap();

        let alert = engine.alert(alert_id).await.unwrap();
        assert_eq!(alert.disposition.incident_id, Some(incident_id));
        assert!(alert.disposition.escalated);

        // A second manual escalation of the same alert is rejected.
        assert!(matches!(
            engine.escalate_alert(alert_id).await,
            Err(EngineError::AlertAlreadyLinked { .. })
        ));

        engine.stop().await;
    }

    #[tokio::test]
    async fn stats_track_intake() {
        let engine = engine();
        engine.start().await;

        engine.ingest_alert(raw_alert(Severity::Low)).await.unwrap();
        let rejected = engine.ingest_alert(RawAlert::default()).await;
        assert!(rejected.is_err());

        let stats = engine.stats();
        assert_eq!(stats.alerts_received, 1);
        assert_eq!(stats.alerts_rejected, 1);
        engine.stop().await;
    }
}
