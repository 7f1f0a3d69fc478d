//! # rampart-core
//!
//! Core orchestration engine and data models for Rampart.
//!
//! This crate ingests raw security alerts, enriches them against threat
//! intelligence, correlates them into incidents, fires automation-rule
//! containment actions, runs branchable response playbooks under per-step
//! timeouts, and escalates incidents that fail containment or miss their
//! SLA targets.

pub mod alert;
pub mod automation;
pub mod config;
pub mod containment;
pub mod correlator;
pub mod engine;
pub mod escalation;
pub mod events;
pub mod executor;
pub mod incident;
pub mod intake;
pub mod metrics;
pub mod playbook;
pub mod threat_intel;

pub use alert::{
    Alert, AlertEvent, AlertSource, AlertStatus, IndicatorType, Severity, ThreatIndicator,
};
pub use automation::{AutomationRule, ConditionOperator, RuleAction, RuleCondition};
pub use config::EngineConfig;
pub use containment::{ActionExecutor, ExecutionError, ExecutionOutput, MockActionExecutor};
pub use engine::{EngineError, EngineStats, EngineStatsSnapshot, ResponseEngine};
pub use events::{EngineEvent, EventBus};
pub use incident::{
    ActionKind, ActionStatus, DependencyCondition, EscalationRecord, Impact, Incident,
    IncidentAction, IncidentCategory, IncidentStatus, Priority,
};
pub use intake::{IntakeError, RawAlert};
pub use metrics::MetricsSnapshot;
pub use playbook::{
    EscalationTrigger, PlaybookEscalationRule, PlaybookTemplate, SlaTargets, StepBranch, StepDef,
    StepGraph, TriggerPredicate,
};
pub use threat_intel::{InMemoryThreatIntel, IntelError, ThreatIntelProvider};
