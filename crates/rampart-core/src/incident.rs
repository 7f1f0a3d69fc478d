//! Incident data models for Rampart.
//!
//! An incident is a correlated, investigable security event possibly spanning
//! multiple alerts. Its status is a forward-only state machine; response
//! steps are recorded as [`IncidentAction`]s appended in execution order and
//! never reordered or removed.

use crate::alert::{AlertSource, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Errors raised by incident state changes.
#[derive(Error, Debug)]
pub enum IncidentError {
    #[error("Invalid status transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: IncidentStatus,
        to: IncidentStatus,
    },

    #[error("Incident not found: {0}")]
    NotFound(Uuid),
}

/// Orchestration status of an incident. Forward-only; `Escalated` is
/// reachable from any non-terminal state and is terminal for orchestration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Incident opened, response not yet started.
    Initiated,
    /// Analysis steps in progress.
    Analyzing,
    /// Containment steps in progress.
    Containing,
    /// Remediation steps in progress.
    Remediating,
    /// All steps attempted, no unresolved escalation.
    Resolved,
    /// Handed to a human; no automated progression beyond this point.
    Escalated,
}

impl IncidentStatus {
    fn rank(&self) -> u8 {
        match self {
            IncidentStatus::Initiated => 0,
            IncidentStatus::Analyzing => 1,
            IncidentStatus::Containing => 2,
            IncidentStatus::Remediating => 3,
            IncidentStatus::Resolved => 4,
            IncidentStatus::Escalated => 5,
        }
    }

    /// Returns true for states with no further orchestration.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::Escalated)
    }

    /// Checks whether a transition to `to` is allowed. Forward jumps are
    /// permitted (a playbook with no analyze steps may go straight to
    /// containing); regression never is, and nothing leaves `Escalated`.
    pub fn can_advance_to(&self, to: IncidentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to == IncidentStatus::Escalated {
            return true;
        }
        to.rank() > self.rank()
    }

    /// Timeline key for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Initiated => "initiated",
            IncidentStatus::Analyzing => "analyzing",
            IncidentStatus::Containing => "containing",
            IncidentStatus::Remediating => "remediating",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Escalated => "escalated",
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident categories derived from the triggering rule name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum IncidentCategory {
    Ddos,
    Malware,
    Phishing,
    UnauthorizedAccess,
    DataBreach,
    SystemCompromise,
}

impl IncidentCategory {
    /// Maps a rule name to a category via fixed keyword matching.
    pub fn from_rule(rule: &str) -> Self {
        let rule = rule.to_lowercase();
        if rule.contains("ddos") || rule.contains("flood") {
            IncidentCategory::Ddos
        } else if rule.contains("malware") || rule.contains("ransomware") || rule.contains("virus")
        {
            IncidentCategory::Malware
        } else if rule.contains("phish") {
            IncidentCategory::Phishing
        } else if rule.contains("unauthorized")
            || rule.contains("brute-force")
            || rule.contains("credential")
        {
            IncidentCategory::UnauthorizedAccess
        } else if rule.contains("exfil") || rule.contains("breach") {
            IncidentCategory::DataBreach
        } else {
            IncidentCategory::SystemCompromise
        }
    }
}

impl std::fmt::Display for IncidentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentCategory::Ddos => write!(f, "ddos"),
            IncidentCategory::Malware => write!(f, "malware"),
            IncidentCategory::Phishing => write!(f, "phishing"),
            IncidentCategory::UnauthorizedAccess => write!(f, "unauthorized-access"),
            IncidentCategory::DataBreach => write!(f, "data-breach"),
            IncidentCategory::SystemCompromise => write!(f, "system-compromise"),
        }
    }
}

/// Business impact assessment, set during investigation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Impact {
    /// Numeric score used for priority computation (1-5).
    pub fn score(&self) -> u8 {
        match self {
            Impact::None => 1,
            Impact::Low => 2,
            Impact::Medium => 3,
            Impact::High => 4,
            Impact::Critical => 5,
        }
    }

    /// Default impact assumed before an analyst assessment, mirroring the
    /// alert severity.
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Info => Impact::None,
            Severity::Low => Impact::Low,
            Severity::Medium => Impact::Medium,
            Severity::High => Impact::High,
            Severity::Critical => Impact::Critical,
        }
    }
}

/// Response priority, bucketed from the severity/impact average.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    P4,
    P3,
    P2,
    P1,
    P0,
}

impl Priority {
    /// Buckets the average of the two 1-5 scores.
    ///
    /// Boundaries: p0 >= 4.5, p1 >= 3.5, p2 >= 2.5, p3 > 1.5, p4 <= 1.5.
    pub fn from_scores(severity_score: u8, impact_score: u8) -> Self {
        let avg = f64::from(severity_score + impact_score) / 2.0;
        if avg >= 4.5 {
            Priority::P0
        } else if avg >= 3.5 {
            Priority::P1
        } else if avg >= 2.5 {
            Priority::P2
        } else if avg > 1.5 {
            Priority::P3
        } else {
            Priority::P4
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::P0 => write!(f, "p0"),
            Priority::P1 => write!(f, "p1"),
            Priority::P2 => write!(f, "p2"),
            Priority::P3 => write!(f, "p3"),
            Priority::P4 => write!(f, "p4"),
        }
    }
}

/// Kinds of response steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Analyze,
    Contain,
    Remediate,
    Notify,
    Escalate,
    Document,
}

/// Execution status of a response step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Skipped,
}

impl ActionStatus {
    /// Once a step is completed, failed, or skipped it is immutable.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ActionStatus::Completed | ActionStatus::Failed | ActionStatus::Skipped
        )
    }
}

/// Dependency conditions evaluated against an incident's action history
/// before a step is allowed to run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCondition {
    /// At least one analyze step has completed.
    AnalysisComplete,
    /// At least one contain step has completed successfully.
    ContainmentSuccessful,
    /// At least one remediate step has completed successfully.
    RemediationSuccessful,
    /// Custom condition; unknown conditions never hold.
    Custom(String),
}

impl DependencyCondition {
    /// Evaluates the condition against the recorded actions.
    pub fn is_met(&self, actions: &[IncidentAction]) -> bool {
        match self {
            DependencyCondition::AnalysisComplete => actions.iter().any(|a| {
                a.kind == ActionKind::Analyze && a.status == ActionStatus::Completed
            }),
            DependencyCondition::ContainmentSuccessful => actions.iter().any(|a| {
                a.kind == ActionKind::Contain
                    && a.status == ActionStatus::Completed
                    && a.result.as_ref().map(|r| r.success).unwrap_or(false)
            }),
            DependencyCondition::RemediationSuccessful => actions.iter().any(|a| {
                a.kind == ActionKind::Remediate
                    && a.status == ActionStatus::Completed
                    && a.result.as_ref().map(|r| r.success).unwrap_or(false)
            }),
            DependencyCondition::Custom(name) => {
                warn!("Custom dependency condition '{}' not implemented", name);
                false
            }
        }
    }
}

/// Result of a response step's external execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Whether the external call reported success.
    pub success: bool,
    /// Output or error message.
    pub output: String,
    /// Artifacts produced (ticket ids, capture paths, ...).
    pub artifacts: Vec<String>,
}

/// A single response step instance, owned by exactly one incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentAction {
    /// Unique identifier.
    pub id: Uuid,
    /// Step kind.
    pub kind: ActionKind,
    /// Action type string handed to the containment/notification executor.
    pub action: String,
    /// Execution status.
    pub status: ActionStatus,
    /// When execution started.
    pub started_at: Option<DateTime<Utc>>,
    /// When execution finished (completed, failed, or skipped).
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether the step ran without human involvement.
    pub automated: bool,
    /// Execution result, if the step ran.
    pub result: Option<ActionOutcome>,
    /// Dependency conditions declared for this step.
    pub dependencies: Vec<DependencyCondition>,
}

impl IncidentAction {
    /// Creates a pending step instance.
    pub fn new(kind: ActionKind, action: impl Into<String>, automated: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            action: action.into(),
            status: ActionStatus::Pending,
            started_at: None,
            completed_at: None,
            automated,
            result: None,
            dependencies: Vec::new(),
        }
    }

    /// Sets the dependency conditions.
    pub fn with_dependencies(mut self, dependencies: Vec<DependencyCondition>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Marks the step as executing.
    pub fn start(&mut self) {
        self.status = ActionStatus::Executing;
        self.started_at = Some(Utc::now());
    }

    /// Marks the step completed with the given outcome.
    pub fn complete(&mut self, outcome: ActionOutcome) {
        self.status = ActionStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(outcome);
    }

    /// Marks the step failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ActionStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.result = Some(ActionOutcome {
            success: false,
            output: error.into(),
            artifacts: Vec::new(),
        });
    }

    /// Marks the step skipped (unmet dependencies or gated approval).
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = ActionStatus::Skipped;
        self.completed_at = Some(Utc::now());
        self.result = Some(ActionOutcome {
            success: false,
            output: reason.into(),
            artifacts: Vec::new(),
        });
    }
}

/// Investigation block, updated via the operator surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    /// Assigned analyst, if any.
    pub assigned_to: Option<String>,
    /// Assessed business impact. Seeds the priority computation.
    pub impact: Impact,
    /// Free-form analyst notes.
    pub notes: Vec<String>,
    /// Root cause, once determined.
    pub root_cause: Option<String>,
}

/// Response block, updated via the operator surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseSummary {
    /// Containment measures applied.
    pub containment: Vec<String>,
    /// Remediation measures applied.
    pub remediation: Vec<String>,
    /// Lessons learned, once written up.
    pub lessons_learned: Option<String>,
}

/// A correlated, investigable security event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Unique identifier.
    pub id: Uuid,
    /// Severity inherited from the triggering alert.
    pub severity: Severity,
    /// Category derived from the triggering rule.
    pub category: IncidentCategory,
    /// Orchestration status.
    pub status: IncidentStatus,
    /// Rule that triggered the incident.
    pub rule: String,
    /// Source of the triggering alert.
    pub source: AlertSource,
    /// When the incident was opened.
    pub triggered_at: DateTime<Utc>,
    /// Status timeline: state name to entry timestamp.
    pub timeline: HashMap<String, DateTime<Utc>>,
    /// Indicator values associated with the incident.
    pub indicators: Vec<String>,
    /// Alerts linked to this incident.
    pub alert_ids: Vec<Uuid>,
    /// Investigation block.
    pub investigation: Investigation,
    /// Response block.
    pub response: ResponseSummary,
    /// Response steps, appended in execution order.
    pub actions: Vec<IncidentAction>,
    /// Playbook selected for this incident, if any.
    pub playbook_id: Option<Uuid>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    /// Opens a new incident seeded from a triggering alert's attributes.
    pub fn open(
        rule: impl Into<String>,
        severity: Severity,
        source: AlertSource,
        alert_ids: Vec<Uuid>,
    ) -> Self {
        let rule = rule.into();
        let now = Utc::now();
        let mut timeline = HashMap::new();
        timeline.insert(IncidentStatus::Initiated.as_str().to_string(), now);
        Self {
            id: Uuid::new_v4(),
            severity,
            category: IncidentCategory::from_rule(&rule),
            status: IncidentStatus::Initiated,
            rule,
            source,
            triggered_at: now,
            timeline,
            indicators: Vec::new(),
            alert_ids,
            investigation: Investigation {
                assigned_to: None,
                impact: Impact::from_severity(severity),
                notes: Vec::new(),
                root_cause: None,
            },
            response: ResponseSummary::default(),
            actions: Vec::new(),
            playbook_id: None,
            updated_at: now,
        }
    }

    /// Computed response priority from severity and assessed impact.
    pub fn priority(&self) -> Priority {
        Priority::from_scores(self.severity.score(), self.investigation.impact.score())
    }

    /// Advances the status, stamping the timeline. Fails on regression or
    /// any transition out of a terminal state.
    pub fn advance(&mut self, to: IncidentStatus) -> Result<(), IncidentError> {
        if !self.status.can_advance_to(to) {
            return Err(IncidentError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        let now = Utc::now();
        self.timeline.insert(to.as_str().to_string(), now);
        self.updated_at = now;
        Ok(())
    }

    /// Appends a response step. Steps are never reordered or removed.
    pub fn append_action(&mut self, action: IncidentAction) {
        self.actions.push(action);
        self.updated_at = Utc::now();
    }

    /// Returns true if no step remains pending or executing.
    pub fn all_steps_settled(&self) -> bool {
        self.actions.iter().all(|a| a.status.is_final())
    }

    /// Returns true if the incident ever reached `Escalated`.
    pub fn was_escalated(&self) -> bool {
        self.timeline
            .contains_key(IncidentStatus::Escalated.as_str())
    }

    /// Milliseconds elapsed since the incident was opened.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.triggered_at).num_milliseconds()
    }

    /// Resolution time in milliseconds, if the incident was resolved.
    pub fn resolution_ms(&self) -> Option<i64> {
        self.timeline
            .get(IncidentStatus::Resolved.as_str())
            .map(|resolved| (*resolved - self.triggered_at).num_milliseconds())
    }
}

/// Append-only escalation audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    /// Escalated incident.
    pub incident_id: Uuid,
    /// Escalation target (team, tier, on-call).
    pub target: String,
    /// Why the escalation fired.
    pub reason: String,
    /// When it fired.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_incident() -> Incident {
        Incident::open(
            "brute-force-login",
            Severity::High,
            AlertSource::new("auth-service", "login-gateway"),
            vec![Uuid::new_v4()],
        )
    }

    #[test]
    fn status_moves_forward_only() {
        let mut incident = sample_incident();
        incident.advance(IncidentStatus::Analyzing).unwrap();
        incident.advance(IncidentStatus::Containing).unwrap();

        let back = incident.advance(IncidentStatus::Analyzing);
        assert!(matches!(
            back,
            Err(IncidentError::InvalidTransition { .. })
        ));
        assert_eq!(incident.status, IncidentStatus::Containing);
    }

    #[test]
    fn forward_jumps_are_allowed() {
        let mut incident = sample_incident();
        // A playbook without analyze/contain steps resolves directly.
        incident.advance(IncidentStatus::Resolved).unwrap();
        assert_eq!(incident.status, IncidentStatus::Resolved);
    }

    #[test]
    fn escalated_is_reachable_from_any_open_state_and_terminal() {
        for intermediate in [
            IncidentStatus::Initiated,
            IncidentStatus::Analyzing,
            IncidentStatus::Containing,
            IncidentStatus::Remediating,
        ] {
            let mut incident = sample_incident();
            if intermediate != IncidentStatus::Initiated {
                incident.advance(intermediate).unwrap();
            }
            incident.advance(IncidentStatus::Escalated).unwrap();
            assert_eq!(incident.status, IncidentStatus::Escalated);

            // Nothing leaves escalated.
            for target in [
                IncidentStatus::Analyzing,
                IncidentStatus::Resolved,
                IncidentStatus::Escalated,
            ] {
                assert!(incident.advance(target).is_err());
            }
        }
    }

    #[test]
    fn resolved_is_terminal_for_escalation_too() {
        let mut incident = sample_incident();
        incident.advance(IncidentStatus::Resolved).unwrap();
        assert!(incident.advance(IncidentStatus::Escalated).is_err());
    }

    #[test]
    fn priority_buckets() {
        assert_eq!(Priority::from_scores(5, 5), Priority::P0);
        assert_eq!(Priority::from_scores(5, 4), Priority::P0);
        assert_eq!(Priority::from_scores(4, 4), Priority::P1);
        assert_eq!(Priority::from_scores(3, 3), Priority::P2);
        assert_eq!(Priority::from_scores(2, 2), Priority::P3);
        assert_eq!(Priority::from_scores(2, 1), Priority::P4);
        assert_eq!(Priority::from_scores(1, 1), Priority::P4);
    }

    #[test]
    fn category_keyword_mapping() {
        assert_eq!(
            IncidentCategory::from_rule("volumetric-ddos-detected"),
            IncidentCategory::Ddos
        );
        assert_eq!(
            IncidentCategory::from_rule("malware-beacon"),
            IncidentCategory::Malware
        );
        assert_eq!(
            IncidentCategory::from_rule("phishing-link-clicked"),
            IncidentCategory::Phishing
        );
        assert_eq!(
            IncidentCategory::from_rule("brute-force-login"),
            IncidentCategory::UnauthorizedAccess
        );
        assert_eq!(
            IncidentCategory::from_rule("odd-process-tree"),
            IncidentCategory::SystemCompromise
        );
    }

    #[test]
    fn dependency_conditions_read_action_history() {
        let mut analyze = IncidentAction::new(ActionKind::Analyze, "triage", true);
        analyze.start();
        analyze.complete(ActionOutcome {
            success: true,
            output: "done".into(),
            artifacts: vec![],
        });

        let mut contain = IncidentAction::new(ActionKind::Contain, "block_ip", true);
        contain.start();
        contain.fail("upstream refused");

        let history = vec![analyze, contain];
        assert!(DependencyCondition::AnalysisComplete.is_met(&history));
        assert!(!DependencyCondition::ContainmentSuccessful.is_met(&history));
        assert!(!DependencyCondition::Custom("moon_phase".into()).is_met(&history));
    }

    #[test]
    fn resolution_time_uses_timeline() {
        let mut incident = sample_incident();
        assert!(incident.resolution_ms().is_none());
        incident.advance(IncidentStatus::Resolved).unwrap();
        assert!(incident.resolution_ms().unwrap() >= 0);
    }

    #[test]
    fn default_impact_mirrors_severity() {
        assert_eq!(Impact::from_severity(Severity::Critical), Impact::Critical);
        assert_eq!(Impact::from_severity(Severity::Info), Impact::None);
    }
}
