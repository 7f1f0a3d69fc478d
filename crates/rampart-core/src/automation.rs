//! Automation rule engine.
//!
//! Rules map condition sets to immediate containment actions, executed
//! without playbook selection. Evaluation is pure and stateless; rules may
//! re-fire on every matching event (external actions are assumed
//! idempotent), with `trigger_count` recording re-fire volume.

use crate::alert::Alert;
use crate::containment::ActionExecutor;
use crate::incident::{ActionKind, Incident, IncidentAction, Priority};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Comparison operators for rule conditions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    Regex,
}

/// A single condition evaluated against an alert's field map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Field name to look up.
    pub field: String,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Expected value.
    pub value: serde_json::Value,
}

impl RuleCondition {
    /// Creates a condition.
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Evaluates the condition. Pure: the same inputs always produce the
    /// same result. Numeric operators fail closed on non-numeric operands.
    pub fn matches(&self, fields: &HashMap<String, serde_json::Value>) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        match self.operator {
            ConditionOperator::Equals => match (actual.as_str(), self.value.as_str()) {
                (Some(a), Some(b)) => a == b,
                _ => actual == &self.value,
            },
            ConditionOperator::Contains => match (actual.as_str(), self.value.as_str()) {
                (Some(a), Some(b)) => a.contains(b),
                _ => false,
            },
            ConditionOperator::GreaterThan => match (actual.as_f64(), self.value.as_f64()) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            ConditionOperator::LessThan => match (actual.as_f64(), self.value.as_f64()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            ConditionOperator::Regex => {
                let (Some(a), Some(pattern)) = (actual.as_str(), self.value.as_str()) else {
                    return false;
                };
                match regex::Regex::new(pattern) {
                    Ok(re) => re.is_match(a),
                    Err(_) => {
                        warn!("Invalid regex pattern in rule condition: {}", pattern);
                        false
                    }
                }
            }
        }
    }
}

/// An action fired by a matching rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    /// Step kind recorded on the incident.
    pub kind: ActionKind,
    /// Action type handed to the containment/notification executor.
    pub action: String,
    /// Parameters for the executor.
    pub parameters: HashMap<String, serde_json::Value>,
    /// If set, the action only fires on p0 incidents.
    pub requires_approval: bool,
}

impl RuleAction {
    /// Creates an action with no parameters.
    pub fn new(kind: ActionKind, action: impl Into<String>) -> Self {
        Self {
            kind,
            action: action.into(),
            parameters: HashMap::new(),
            requires_approval: false,
        }
    }

    /// Sets a parameter.
    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    /// Marks the action as requiring approval.
    pub fn with_approval_required(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

/// A condition-to-action mapping for immediate containment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Whether the rule participates in evaluation.
    pub enabled: bool,
    /// Conditions; all must match (AND semantics).
    pub conditions: Vec<RuleCondition>,
    /// Ordered actions to fire on match.
    pub actions: Vec<RuleAction>,
    /// Risk threshold recorded for operator review (0-100).
    pub risk_threshold: u8,
    /// Monotonic count of times this rule has fired. Not a gate.
    pub trigger_count: u64,
}

impl AutomationRule {
    /// Creates an enabled rule.
    pub fn new(
        name: impl Into<String>,
        conditions: Vec<RuleCondition>,
        actions: Vec<RuleAction>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            enabled: true,
            conditions,
            actions,
            risk_threshold: 50,
            trigger_count: 0,
        }
    }

    /// Checks whether this rule matches the given field map.
    pub fn matches(&self, fields: &HashMap<String, serde_json::Value>) -> bool {
        if !self.enabled {
            return false;
        }
        self.conditions.iter().all(|c| c.matches(fields))
    }
}

/// Evaluates automation rules and fires their actions.
pub struct AutomationEngine {
    executor: Arc<dyn ActionExecutor>,
    /// Fixed execution budget per delegated action.
    budget: Duration,
}

impl AutomationEngine {
    /// Creates an engine delegating to the given executor.
    pub fn new(executor: Arc<dyn ActionExecutor>, budget: Duration) -> Self {
        Self { executor, budget }
    }

    /// Evaluates all rules against the triggering alert and fires matching
    /// actions against the incident.
    ///
    /// Rules are independent of each other: one rule's action failure never
    /// aborts the remaining actions or rules. Actions flagged
    /// `requires_approval` are skipped unless the incident's computed
    /// priority is p0.
    #[instrument(skip_all, fields(incident_id = %incident.id))]
    pub async fn apply(
        &self,
        rules: &mut [AutomationRule],
        incident: &mut Incident,
        alert: &Alert,
    ) {
        let fields = alert.field_map();
        let priority = incident.priority();

        for rule in rules.iter_mut() {
            if !rule.matches(&fields) {
                continue;
            }
            rule.trigger_count += 1;
            info!(
                rule = %rule.name,
                trigger_count = rule.trigger_count,
                "Automation rule matched"
            );
            metrics::counter!("rampart_rules_triggered").increment(1);

            for rule_action in &rule.actions {
                let mut action =
                    IncidentAction::new(rule_action.kind, rule_action.action.clone(), true);

                if rule_action.requires_approval && priority != Priority::P0 {
                    debug!(
                        action = %rule_action.action,
                        %priority,
                        "Skipping approval-gated action on non-p0 incident"
                    );
                    action.skip(format!(
                        "requires approval; incident priority is {}",
                        priority
                    ));
                    incident.append_action(action);
                    continue;
                }

                action.start();
                let outcome = tokio::time::timeout(
                    self.budget,
                    self.executor
                        .execute(&rule_action.action, &rule_action.parameters),
                )
                .await;

                match outcome {
                    Ok(Ok(output)) if output.success => {
                        action.complete(output.into());
                    }
                    Ok(Ok(output)) => {
                        action.fail(output.output);
                    }
                    Ok(Err(e)) => {
                        warn!(action = %rule_action.action, "Automation action failed: {}", e);
                        action.fail(e.to_string());
                    }
                    Err(_) => {
                        warn!(
                            action = %rule_action.action,
                            "Automation action exceeded {}ms budget",
                            self.budget.as_millis()
                        );
                        action.fail(format!(
                            "timed out after {}ms",
                            self.budget.as_millis()
                        ));
                    }
                }
                incident.append_action(action);
            }
        }
    }
}
