//! Playbook selection and execution.
//!
//! A fixed-size pool of workers pulls incident ids from a FIFO queue; each
//! worker runs one incident's playbook to completion before taking the next,
//! so different incidents execute in parallel while a single incident's
//! steps never run concurrently with each other.
//!
//! Step execution suspends only on the external action call or its timeout
//! race. A failed step never propagates an error past the executor: failures
//! are recorded on the incident and drive branching and escalation instead.

use crate::containment::ActionExecutor;
use crate::engine::{EngineStats, SharedIncidents, SharedPlaybooks};
use crate::escalation::EscalationMonitor;
use crate::events::{EngineEvent, EventBus};
use crate::incident::{ActionKind, IncidentAction, IncidentStatus};
use crate::playbook::{PlaybookTemplate, StepGraph, StepNode};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Runs selected playbooks against incidents.
pub struct PlaybookExecutor {
    incidents: SharedIncidents,
    playbooks: SharedPlaybooks,
    actions: Arc<dyn ActionExecutor>,
    escalation: Arc<EscalationMonitor>,
    bus: Arc<EventBus>,
    stats: Arc<EngineStats>,
}

impl PlaybookExecutor {
    /// Creates the execution stage.
    pub fn new(
        incidents: SharedIncidents,
        playbooks: SharedPlaybooks,
        actions: Arc<dyn ActionExecutor>,
        escalation: Arc<EscalationMonitor>,
        bus: Arc<EventBus>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            incidents,
            playbooks,
            actions,
            escalation,
            bus,
            stats,
        }
    }

    /// Worker loop: pulls one incident id at a time from the shared FIFO
    /// queue and runs its playbook to completion.
    pub async fn run_worker(
        self: Arc<Self>,
        worker_id: usize,
        queue: Arc<Mutex<mpsc::Receiver<Uuid>>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!(worker_id, "Execution worker started");
        loop {
            let next = {
                let mut rx = queue.lock().await;
                tokio::select! {
                    _ = shutdown.changed() => None,
                    next = rx.recv() => next,
                }
            };
            let Some(incident_id) = next else { break };
            self.execute_incident(incident_id).await;
        }
        debug!(worker_id, "Execution worker stopped");
    }

    /// Selects and runs the playbook for one incident. An incident with no
    /// matching playbook proceeds with its automation-rule actions only and
    /// resolves immediately.
    #[instrument(skip(self), fields(incident_id = %incident_id))]
    pub async fn execute_incident(&self, incident_id: Uuid) {
        let Some(playbook) = self.select_playbook(incident_id).await else {
            self.finish(incident_id).await;
            return;
        };

        let graph = match playbook.graph() {
            Ok(graph) => graph,
            Err(e) => {
                // Configuration error: fails this incident's execution only.
                error!(playbook = %playbook.name, "Invalid playbook graph: {}", e);
                return;
            }
        };

        if !self
            .advance_status(incident_id, IncidentStatus::Analyzing)
            .await
        {
            return;
        }

        self.walk(incident_id, &playbook, &graph).await;
        self.finish(incident_id).await;
    }

    /// First enabled template whose trigger predicate matches the incident.
    async fn select_playbook(&self, incident_id: Uuid) -> Option<PlaybookTemplate> {
        let selected = {
            let incidents = self.incidents.read().await;
            let incident = incidents.get(&incident_id)?;
            if incident.status.is_terminal() {
                return None;
            }
            let playbooks = self.playbooks.read().await;
            playbooks
                .iter()
                .find(|p| p.enabled && p.trigger.matches(incident))
                .cloned()
        };

        match selected {
            Some(playbook) => {
                info!(playbook = %playbook.name, "Playbook selected");
                let mut incidents = self.incidents.write().await;
                if let Some(incident) = incidents.get_mut(&incident_id) {
                    incident.playbook_id = Some(playbook.id);
                }
                Some(playbook)
            }
            None => {
                debug!("No playbook matched; automation-rule actions only");
                None
            }
        }
    }

    /// Walks the step graph from the first node until the steps run out or
    /// the incident reaches a terminal status.
    async fn walk(&self, incident_id: Uuid, playbook: &PlaybookTemplate, graph: &StepGraph) {
        let mut cursor = graph.first().map(|n| n.def.order);

        while let Some(order) = cursor {
            if self.is_terminal(incident_id).await {
                debug!("Incident reached a terminal status; abandoning remaining steps");
                return;
            }
            let Some(node) = graph.node(order) else { return };

            cursor = self.run_step(incident_id, playbook, graph, node).await;
        }
    }

    /// Runs one step and returns the order of the next step to execute.
    async fn run_step(
        &self,
        incident_id: Uuid,
        playbook: &PlaybookTemplate,
        graph: &StepGraph,
        node: &StepNode,
    ) -> Option<u32> {
        let def = &node.def;
        let next_in_order = graph.next_after(def.order).map(|n| n.def.order);

        // Dependency gate: unmet dependencies skip the step, and execution
        // continues in order rather than following a branch target.
        let deps_met = {
            let incidents = self.incidents.read().await;
            let incident = incidents.get(&incident_id)?;
            def.dependencies.iter().all(|d| d.is_met(&incident.actions))
        };
        if !deps_met {
            let mut action = IncidentAction::new(def.kind, def.action.clone(), def.automated)
                .with_dependencies(def.dependencies.clone());
            action.skip("unmet dependencies");
            debug!(step = def.order, action = %def.action, "Step skipped: unmet dependencies");
            let mut incidents = self.incidents.write().await;
            incidents.get_mut(&incident_id)?.append_action(action);
            return next_in_order;
        }

        let mut action = IncidentAction::new(def.kind, def.action.clone(), def.automated)
            .with_dependencies(def.dependencies.clone());
        action.start();
        let step_started = std::time::Instant::now();

        // The only suspension point: the external call raced against the
        // step's hard deadline.
        let outcome = tokio::time::timeout(
            def.timeout,
            self.actions.execute(&def.action, &def.parameters),
        )
        .await;
        metrics::histogram!("rampart_step_duration_seconds")
            .record(step_started.elapsed().as_secs_f64());

        let succeeded = match outcome {
            Ok(Ok(output)) if output.success => {
                action.complete(output.into());
                true
            }
            Ok(Ok(output)) => {
                action.fail(output.output);
                false
            }
            Ok(Err(e)) => {
                warn!(step = def.order, action = %def.action, "Step failed: {}", e);
                action.fail(e.to_string());
                false
            }
            Err(_) => {
                warn!(
                    step = def.order,
                    action = %def.action,
                    "Step timed out after {}ms",
                    def.timeout.as_millis()
                );
                action.fail(format!("timed out after {}ms", def.timeout.as_millis()));
                false
            }
        };

        let action_id = action.id;
        let action_name = action.action.clone();
        let error_text = action
            .result
            .as_ref()
            .map(|r| r.output.clone())
            .unwrap_or_default();

        {
            let mut incidents = self.incidents.write().await;
            incidents.get_mut(&incident_id)?.append_action(action);
        }

        if succeeded {
            self.stats.record_action_executed();
            metrics::counter!("rampart_actions_executed").increment(1);
            self.bus
                .publish(EngineEvent::ActionCompleted {
                    incident_id,
                    action_id,
                    action: action_name,
                })
                .await;

            // Phase advancement is driven by the first completed step of
            // each kind.
            match def.kind {
                ActionKind::Analyze => {
                    self.advance_if_at(incident_id, IncidentStatus::Analyzing, IncidentStatus::Containing)
                        .await;
                }
                ActionKind::Contain => {
                    self.advance_if_before(incident_id, IncidentStatus::Remediating)
                        .await;
                }
                _ => {}
            }

            // Time-based escalation rules are checked at every step boundary.
            self.escalation
                .evaluate_rules(incident_id, &playbook.escalation_rules, false)
                .await;

            node.success_edge.or(next_in_order)
        } else {
            self.stats.record_action_failed();
            metrics::counter!("rampart_actions_failed").increment(1);
            self.bus
                .publish(EngineEvent::ActionFailed {
                    incident_id,
                    action_id,
                    action: action_name,
                    error: error_text,
                })
                .await;

            // A failed contain/remediate step alerts the escalation monitor
            // immediately, in addition to any failure branch.
            let containment_failed =
                matches!(def.kind, ActionKind::Contain | ActionKind::Remediate);
            self.escalation
                .evaluate_rules(incident_id, &playbook.escalation_rules, containment_failed)
                .await;

            node.failure_edge.or(next_in_order)
        }
    }

    /// Resolves the incident if every step settled and no escalation is
    /// active.
    async fn finish(&self, incident_id: Uuid) {
        let mut incidents = self.incidents.write().await;
        let Some(incident) = incidents.get_mut(&incident_id) else {
            return;
        };
        if incident.status.is_terminal() || !incident.all_steps_settled() {
            return;
        }
        if incident.advance(IncidentStatus::Resolved).is_ok() {
            self.stats.record_incident_resolved();
            metrics::counter!("rampart_incidents_resolved").increment(1);
            let status = incident.status;
            drop(incidents);
            self.bus
                .publish(EngineEvent::IncidentUpdated {
                    incident_id,
                    status,
                })
                .await;
            info!(%incident_id, "Incident resolved");
        }
    }

    async fn is_terminal(&self, incident_id: Uuid) -> bool {
        let incidents = self.incidents.read().await;
        incidents
            .get(&incident_id)
            .map(|i| i.status.is_terminal())
            .unwrap_or(true)
    }

    /// Advances unconditionally (forward jumps allowed); returns false when
    /// the incident is gone or terminal.
    async fn advance_status(&self, incident_id: Uuid, to: IncidentStatus) -> bool {
        let updated = {
            let mut incidents = self.incidents.write().await;
            match incidents.get_mut(&incident_id) {
                Some(incident) => incident.advance(to).is_ok(),
                None => false,
            }
        };
        if updated {
            self.bus
                .publish(EngineEvent::IncidentUpdated {
                    incident_id,
                    status: to,
                })
                .await;
        }
        updated
    }

    /// Advances only when the incident is exactly at `from`.
    async fn advance_if_at(&self, incident_id: Uuid, from: IncidentStatus, to: IncidentStatus) {
        let updated = {
            let mut incidents = self.incidents.write().await;
            match incidents.get_mut(&incident_id) {
                Some(incident) if incident.status == from => incident.advance(to).is_ok(),
                _ => false,
            }
        };
        if updated {
            self.bus
                .publish(EngineEvent::IncidentUpdated {
                    incident_id,
                    status: to,
                })
                .await;
        }
    }

    /// Advances when the incident has not yet reached `to`.
    async fn advance_if_before(&self, incident_id: Uuid, to: IncidentStatus) {
        let updated = {
            let mut incidents = self.incidents.write().await;
            match incidents.get_mut(&incident_id) {
                Some(incident) if incident.status.can_advance_to(to) => {
                    incident.advance(to).is_ok()
                }
                _ => false,
            }
        };
        if updated {
            self.bus
                .publish(EngineEvent::IncidentUpdated {
                    incident_id,
                    status: to,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertSource, Severity};
    use crate::containment::MockActionExecutor;
    use crate::engine::{SharedAlerts, SharedEscalations};
    use crate::incident::{ActionStatus, DependencyCondition, Incident};
    use crate::playbook::{
        EscalationTrigger, PlaybookEscalationRule, StepBranch, StepDef, TriggerPredicate,
    };
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::RwLock;

    struct Fixture {
        executor: Arc<PlaybookExecutor>,
        incidents: SharedIncidents,
        playbooks: SharedPlaybooks,
        mock: Arc<MockActionExecutor>,
    }

    fn fixture(mock: MockActionExecutor) -> Fixture {
        let incidents: SharedIncidents = Arc::new(RwLock::new(HashMap::new()));
        let playbooks: SharedPlaybooks = Arc::new(RwLock::new(Vec::new()));
        let alerts: SharedAlerts = Arc::new(RwLock::new(HashMap::new()));
        let escalations: SharedEscalations = Arc::new(RwLock::new(Vec::new()));
        let bus = Arc::new(EventBus::default());
        let mock = Arc::new(mock);
        let escalation = Arc::new(EscalationMonitor::new(
            Arc::clone(&incidents),
            alerts,
            escalations,
            Arc::clone(&bus),
            Duration::from_secs(3600),
        ));
        let executor = Arc::new(PlaybookExecutor::new(
            Arc::clone(&incidents),
            Arc::clone(&playbooks),
            mock.clone(),
            escalation,
            bus,
            Arc::new(EngineStats::default()),
        ));
        Fixture {
            executor,
            incidents,
            playbooks,
            mock,
        }
    }

    async fn insert_incident(fixture: &Fixture, severity: Severity) -> Uuid {
        let incident = Incident::open(
            "malware-beacon",
            severity,
            AlertSource::new("edr", "sensor-1"),
            vec![Uuid::new_v4()],
        );
        let id = incident.id;
        fixture.incidents.write().await.insert(id, incident);
        id
    }

    fn linear_playbook() -> PlaybookTemplate {
        PlaybookTemplate::new(
            "malware response",
            TriggerPredicate::any(),
            vec![
                StepDef::new(1, ActionKind::Analyze, "triage"),
                StepDef::new(2, ActionKind::Contain, "block_ip"),
                StepDef::new(3, ActionKind::Remediate, "reimage_host"),
                StepDef::new(4, ActionKind::Notify, "send_notification"),
            ],
        )
    }

    #[tokio::test]
    async fn happy_path_appends_one_action_per_step_in_order() {
        let fixture = fixture(MockActionExecutor::new());
        fixture.playbooks.write().await.push(linear_playbook());
        let id = insert_incident(&fixture, Severity::High).await;

        fixture.executor.execute_incident(id).await;

        let incidents = fixture.incidents.read().await;
        let incident = &incidents[&id];
        assert_eq!(incident.status, IncidentStatus::Resolved);
        assert_eq!(incident.actions.len(), 4);
        assert!(incident
            .actions
            .iter()
            .all(|a| a.status == ActionStatus::Completed));
        assert_eq!(
            fixture.mock.calls().await,
            vec!["triage", "block_ip", "reimage_host", "send_notification"]
        );
        // Phases were visited in forward order.
        assert!(incident.timeline.contains_key("analyzing"));
        assert!(incident.timeline.contains_key("containing"));
        assert!(incident.timeline.contains_key("remediating"));
        assert!(incident.timeline.contains_key("resolved"));
    }

    #[tokio::test]
    async fn no_matching_playbook_resolves_with_automation_actions_only() {
        let fixture = fixture(MockActionExecutor::new());
        // Playbook that never matches.
        let mut playbook = linear_playbook();
        playbook.trigger = TriggerPredicate::any().with_severities(vec![Severity::Info]);
        fixture.playbooks.write().await.push(playbook);
        let id = insert_incident(&fixture, Severity::High).await;

        fixture.executor.execute_incident(id).await;

        let incidents = fixture.incidents.read().await;
        assert_eq!(incidents[&id].status, IncidentStatus::Resolved);
        assert!(incidents[&id].actions.is_empty());
        assert!(incidents[&id].playbook_id.is_none());
    }

    #[tokio::test]
    async fn step_with_unmet_dependency_is_skipped_not_failed() {
        let fixture = fixture(MockActionExecutor::new().failing("block_ip"));
        let playbook = PlaybookTemplate::new(
            "gated remediation",
            TriggerPredicate::any(),
            vec![
                StepDef::new(1, ActionKind::Contain, "block_ip"),
                StepDef::new(2, ActionKind::Remediate, "reimage_host").with_dependencies(vec![
                    DependencyCondition::ContainmentSuccessful,
                ]),
                StepDef::new(3, ActionKind::Notify, "send_notification"),
            ],
        );
        fixture.playbooks.write().await.push(playbook);
        let id = insert_incident(&fixture, Severity::High).await;

        fixture.executor.execute_incident(id).await;

        let incidents = fixture.incidents.read().await;
        let actions = &incidents[&id].actions;
        assert_eq!(actions[0].status, ActionStatus::Failed);
        assert_eq!(actions[1].status, ActionStatus::Skipped);
        assert_eq!(actions[2].status, ActionStatus::Completed);
        // The skipped step never reached the executor.
        assert_eq!(
            fixture.mock.calls().await,
            vec!["block_ip", "send_notification"]
        );
    }

    #[tokio::test]
    async fn success_branch_redirects_to_a_later_step() {
        let fixture = fixture(MockActionExecutor::new());
        let playbook = PlaybookTemplate::new(
            "short circuit",
            TriggerPredicate::any(),
            vec![
                StepDef::new(1, ActionKind::Analyze, "triage").on_success(StepBranch::GoTo(4)),
                StepDef::new(2, ActionKind::Contain, "block_ip"),
                StepDef::new(3, ActionKind::Remediate, "reimage_host"),
                StepDef::new(4, ActionKind::Notify, "send_notification"),
            ],
        );
        fixture.playbooks.write().await.push(playbook);
        let id = insert_incident(&fixture, Severity::High).await;

        fixture.executor.execute_incident(id).await;

        assert_eq!(
            fixture.mock.calls().await,
            vec!["triage", "send_notification"]
        );
        let incidents = fixture.incidents.read().await;
        assert_eq!(incidents[&id].actions.len(), 2);
        assert_eq!(incidents[&id].status, IncidentStatus::Resolved);
    }

    #[tokio::test]
    async fn failure_branch_redirects_and_contain_failure_escalates() {
        let fixture = fixture(MockActionExecutor::new().failing("block_ip"));
        let playbook = PlaybookTemplate::new(
            "containment with fallback",
            TriggerPredicate::any(),
            vec![
                StepDef::new(1, ActionKind::Contain, "block_ip").on_failure(StepBranch::GoTo(3)),
                StepDef::new(2, ActionKind::Remediate, "reimage_host"),
                StepDef::new(3, ActionKind::Notify, "send_notification"),
            ],
        )
        .with_escalation_rule(PlaybookEscalationRule {
            trigger: EscalationTrigger::ContainmentFailed,
            target: "tier2".to_string(),
            notify: "pager".to_string(),
        });
        fixture.playbooks.write().await.push(playbook);
        let id = insert_incident(&fixture, Severity::High).await;

        fixture.executor.execute_incident(id).await;

        let incidents = fixture.incidents.read().await;
        // Escalation is terminal: the failure branch never ran.
        assert_eq!(incidents[&id].status, IncidentStatus::Escalated);
        assert_eq!(incidents[&id].actions.len(), 1);
        assert_eq!(fixture.mock.calls().await, vec!["block_ip"]);
    }

    #[tokio::test]
    async fn failure_branch_without_escalation_rule_keeps_running() {
        let fixture = fixture(MockActionExecutor::new().failing("block_ip"));
        let playbook = PlaybookTemplate::new(
            "containment with fallback",
            TriggerPredicate::any(),
            vec![
                StepDef::new(1, ActionKind::Contain, "block_ip").on_failure(StepBranch::GoTo(3)),
                StepDef::new(2, ActionKind::Remediate, "reimage_host"),
                StepDef::new(3, ActionKind::Notify, "send_notification"),
            ],
        );
        fixture.playbooks.write().await.push(playbook);
        let id = insert_incident(&fixture, Severity::High).await;

        fixture.executor.execute_incident(id).await;

        // Step 2 was bypassed by the failure branch.
        assert_eq!(
            fixture.mock.calls().await,
            vec!["block_ip", "send_notification"]
        );
        let incidents = fixture.incidents.read().await;
        assert_eq!(incidents[&id].status, IncidentStatus::Resolved);
    }

    #[tokio::test]
    async fn step_timeout_is_recorded_as_failure() {
        let fixture = fixture(
            MockActionExecutor::new().delayed("triage", Duration::from_millis(200)),
        );
        let playbook = PlaybookTemplate::new(
            "slow analysis",
            TriggerPredicate::any(),
            vec![StepDef::new(1, ActionKind::Analyze, "triage")
                .with_timeout(Duration::from_millis(20))],
        );
        fixture.playbooks.write().await.push(playbook);
        let id = insert_incident(&fixture, Severity::High).await;

        fixture.executor.execute_incident(id).await;

        let incidents = fixture.incidents.read().await;
        let action = &incidents[&id].actions[0];
        assert_eq!(action.status, ActionStatus::Failed);
        assert!(action.result.as_ref().unwrap().output.contains("timed out"));
    }

    #[tokio::test]
    async fn unknown_action_type_fails_the_step_only() {
        let fixture = fixture(MockActionExecutor::new().unknown("warp_core"));
        let playbook = PlaybookTemplate::new(
            "misconfigured",
            TriggerPredicate::any(),
            vec![
                StepDef::new(1, ActionKind::Analyze, "warp_core"),
                StepDef::new(2, ActionKind::Notify, "send_notification"),
            ],
        );
        fixture.playbooks.write().await.push(playbook);
        let id = insert_incident(&fixture, Severity::High).await;

        fixture.executor.execute_incident(id).await;

        let incidents = fixture.incidents.read().await;
        assert_eq!(incidents[&id].actions[0].status, ActionStatus::Failed);
        assert_eq!(incidents[&id].actions[1].status, ActionStatus::Completed);
        assert_eq!(incidents[&id].status, IncidentStatus::Resolved);
    }

    #[tokio::test]
    async fn first_matching_playbook_wins() {
        let fixture = fixture(MockActionExecutor::new());
        let mut first = linear_playbook();
        first.name = "first".into();
        let mut second = linear_playbook();
        second.name = "second".into();
        fixture.playbooks.write().await.push(first.clone());
        fixture.playbooks.write().await.push(second);
        let id = insert_incident(&fixture, Severity::High).await;

        fixture.executor.execute_incident(id).await;

        let incidents = fixture.incidents.read().await;
        assert_eq!(incidents[&id].playbook_id, Some(first.id));
    }

    #[tokio::test]
    async fn disabled_playbooks_are_not_selected() {
        let fixture = fixture(MockActionExecutor::new());
        let mut playbook = linear_playbook();
        playbook.enabled = false;
        fixture.playbooks.write().await.push(playbook);
        let id = insert_incident(&fixture, Severity::High).await;

        fixture.executor.execute_incident(id).await;

        let incidents = fixture.incidents.read().await;
        assert!(incidents[&id].playbook_id.is_none());
        assert_eq!(incidents[&id].status, IncidentStatus::Resolved);
    }
}
