//! Playbook templates and the response step graph.
//!
//! A playbook is an ordered, branchable template of response steps with
//! timing targets. Branching (`on_success`/`on_failure`) is represented as an
//! explicit directed graph over step nodes rather than index arithmetic over
//! a flat list; branch targets must reference a later step.

use crate::alert::Severity;
use crate::incident::{ActionKind, DependencyCondition, Incident, IncidentCategory};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised when validating a playbook.
#[derive(Error, Debug)]
pub enum PlaybookError {
    #[error("Playbook has no steps")]
    Empty,

    #[error("Duplicate step order: {0}")]
    DuplicateOrder(u32),

    #[error("Step {step} branches to unknown step {target}")]
    UnknownBranchTarget { step: u32, target: u32 },

    #[error("Step {step} branches backward to step {target}")]
    BackwardBranch { step: u32, target: u32 },

    #[error("Playbook not found: {0}")]
    NotFound(Uuid),
}

/// Where execution goes after a step settles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepBranch {
    /// Continue with the next step in ascending order.
    #[default]
    Next,
    /// Redirect to the step with the given order value.
    GoTo(u32),
}

/// Definition of a single playbook step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    /// Position in the playbook; also the step's id for branch targets.
    pub order: u32,
    /// Human-readable name.
    pub name: String,
    /// Step kind recorded on the incident.
    pub kind: ActionKind,
    /// Action type handed to the containment/notification executor.
    pub action: String,
    /// Parameters for the executor.
    pub parameters: HashMap<String, serde_json::Value>,
    /// Whether the step runs without human involvement.
    pub automated: bool,
    /// Hard execution deadline.
    pub timeout: Duration,
    /// Where to go when the step completes.
    pub on_success: StepBranch,
    /// Where to go when the step fails.
    pub on_failure: StepBranch,
    /// Dependency conditions checked against the incident's action history.
    pub dependencies: Vec<DependencyCondition>,
}

impl StepDef {
    /// Creates an automated step with a 60-second timeout and no branching.
    pub fn new(order: u32, kind: ActionKind, action: impl Into<String>) -> Self {
        let action = action.into();
        Self {
            order,
            name: action.clone(),
            kind,
            action,
            parameters: HashMap::new(),
            automated: true,
            timeout: Duration::from_secs(60),
            on_success: StepBranch::Next,
            on_failure: StepBranch::Next,
            dependencies: Vec::new(),
        }
    }

    /// Sets the step name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets a parameter.
    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the success branch.
    pub fn on_success(mut self, branch: StepBranch) -> Self {
        self.on_success = branch;
        self
    }

    /// Sets the failure branch.
    pub fn on_failure(mut self, branch: StepBranch) -> Self {
        self.on_failure = branch;
        self
    }

    /// Sets the dependency conditions.
    pub fn with_dependencies(mut self, dependencies: Vec<DependencyCondition>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Trigger predicate: every declared clause must hold (logical AND).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerPredicate {
    /// Incident severity must be one of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severities: Option<Vec<Severity>>,
    /// Incident category must be one of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<IncidentCategory>>,
    /// Source system must be one of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_systems: Option<Vec<String>>,
    /// Some incident indicator must contain this substring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator_contains: Option<String>,
}

impl TriggerPredicate {
    /// A predicate with no clauses; matches every incident.
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts to the given severities.
    pub fn with_severities(mut self, severities: Vec<Severity>) -> Self {
        self.severities = Some(severities);
        self
    }

    /// Restricts to the given categories.
    pub fn with_categories(mut self, categories: Vec<IncidentCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    /// Restricts to the given source systems.
    pub fn with_source_systems(mut self, systems: Vec<String>) -> Self {
        self.source_systems = Some(systems);
        self
    }

    /// Requires an indicator containing the given substring.
    pub fn with_indicator_contains(mut self, needle: impl Into<String>) -> Self {
        self.indicator_contains = Some(needle.into());
        self
    }

    /// Evaluates the predicate against an incident.
    pub fn matches(&self, incident: &Incident) -> bool {
        if let Some(severities) = &self.severities {
            if !severities.contains(&incident.severity) {
                return false;
            }
        }
        if let Some(categories) = &self.categories {
            if !categories.contains(&incident.category) {
                return false;
            }
        }
        if let Some(systems) = &self.source_systems {
            if !systems.contains(&incident.source.system) {
                return false;
            }
        }
        if let Some(needle) = &self.indicator_contains {
            if !incident.indicators.iter().any(|i| i.contains(needle)) {
                return false;
            }
        }
        true
    }
}

/// Per-phase SLA targets, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaTargets {
    pub detection_ms: u64,
    pub analysis_ms: u64,
    pub containment_ms: u64,
    pub remediation_ms: u64,
    /// Total elapsed-time budget; the background sweep escalates past this.
    pub total_ms: u64,
}

impl Default for SlaTargets {
    fn default() -> Self {
        Self {
            detection_ms: 5 * 60 * 1000,
            analysis_ms: 15 * 60 * 1000,
            containment_ms: 30 * 60 * 1000,
            remediation_ms: 2 * 60 * 60 * 1000,
            total_ms: 3 * 60 * 60 * 1000,
        }
    }
}

/// Conditions for a playbook-attached escalation rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// A contain or remediate step failed.
    ContainmentFailed,
    /// Total elapsed time exceeded the given budget.
    TotalTimeExceeds { ms: u64 },
}

/// An escalation rule attached to a playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookEscalationRule {
    /// When to escalate.
    pub trigger: EscalationTrigger,
    /// Who gets the incident.
    pub target: String,
    /// Notification channel or template for the hand-off.
    pub notify: String,
}

/// An ordered, branchable template of response steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookTemplate {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Selection predicate.
    pub trigger: TriggerPredicate,
    /// Step definitions, keyed by `order` at execution time.
    pub steps: Vec<StepDef>,
    /// Timing targets.
    pub sla: SlaTargets,
    /// Escalation rules evaluated during and after execution.
    pub escalation_rules: Vec<PlaybookEscalationRule>,
    /// Whether the playbook participates in selection.
    pub enabled: bool,
}

impl PlaybookTemplate {
    /// Creates an enabled playbook with default SLA targets.
    pub fn new(name: impl Into<String>, trigger: TriggerPredicate, steps: Vec<StepDef>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            trigger,
            steps,
            sla: SlaTargets::default(),
            escalation_rules: Vec::new(),
            enabled: true,
        }
    }

    /// Sets the SLA targets.
    pub fn with_sla(mut self, sla: SlaTargets) -> Self {
        self.sla = sla;
        self
    }

    /// Adds an escalation rule.
    pub fn with_escalation_rule(mut self, rule: PlaybookEscalationRule) -> Self {
        self.escalation_rules.push(rule);
        self
    }

    /// Builds and validates the step graph for this playbook.
    pub fn graph(&self) -> Result<StepGraph, PlaybookError> {
        StepGraph::build(&self.steps)
    }
}

/// A node in the step graph.
#[derive(Debug, Clone)]
pub struct StepNode {
    /// The step definition.
    pub def: StepDef,
    /// Resolved success edge, if the step redirects on success.
    pub success_edge: Option<u32>,
    /// Resolved failure edge, if the step redirects on failure.
    pub failure_edge: Option<u32>,
}

/// The validated directed graph of a playbook's steps.
///
/// Nodes are ordered by their `order` value; each node carries optional
/// success/failure edges pointing at later nodes.
#[derive(Debug, Clone)]
pub struct StepGraph {
    nodes: BTreeMap<u32, StepNode>,
}

impl StepGraph {
    /// Builds a graph from step definitions, validating order uniqueness and
    /// branch targets (must exist and be later than the branching step).
    pub fn build(steps: &[StepDef]) -> Result<Self, PlaybookError> {
        if steps.is_empty() {
            return Err(PlaybookError::Empty);
        }

        let mut nodes: BTreeMap<u32, StepNode> = BTreeMap::new();
        for def in steps {
            if nodes.contains_key(&def.order) {
                return Err(PlaybookError::DuplicateOrder(def.order));
            }
            nodes.insert(
                def.order,
                StepNode {
                    def: def.clone(),
                    success_edge: None,
                    failure_edge: None,
                },
            );
        }

        let orders: Vec<u32> = nodes.keys().copied().collect();
        let resolve = |from: u32, branch: StepBranch| -> Result<Option<u32>, PlaybookError> {
            match branch {
                StepBranch::Next => Ok(None),
                StepBranch::GoTo(target) => {
                    if !orders.contains(&target) {
                        Err(PlaybookError::UnknownBranchTarget { step: from, target })
                    } else if target <= from {
                        Err(PlaybookError::BackwardBranch { step: from, target })
                    } else {
                        Ok(Some(target))
                    }
                }
            }
        };

        for order in orders.clone() {
            let (on_success, on_failure) = {
                let def = &nodes[&order].def;
                (def.on_success, def.on_failure)
            };
            let success_edge = resolve(order, on_success)?;
            let failure_edge = resolve(order, on_failure)?;
            if let Some(node) = nodes.get_mut(&order) {
                node.success_edge = success_edge;
                node.failure_edge = failure_edge;
            }
        }

        Ok(Self { nodes })
    }

    /// First step in order.
    pub fn first(&self) -> Option<&StepNode> {
        self.nodes.values().next()
    }

    /// Looks up a node by its order value.
    pub fn node(&self, order: u32) -> Option<&StepNode> {
        self.nodes.get(&order)
    }

    /// Next node in ascending order after `order`.
    pub fn next_after(&self, order: u32) -> Option<&StepNode> {
        self.nodes
            .range((order + 1)..)
            .next()
            .map(|(_, node)| node)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the graph has no steps.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
