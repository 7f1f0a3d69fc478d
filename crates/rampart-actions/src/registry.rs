//! Action registry for Rampart.
//!
//! The registry holds the available containment/notification actions and
//! adapts them to the core engine's executor seam. Action implementations
//! validate their own parameters and are expected to be idempotent: the
//! engine may re-fire an action for the same target.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rampart_core::{ActionExecutor, ExecutionError, ExecutionOutput};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Errors that can occur during action execution.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Action not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Result of an action execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// Unique execution id.
    pub execution_id: Uuid,
    /// Action name.
    pub action_name: String,
    /// Whether the action succeeded.
    pub success: bool,
    /// Result message.
    pub message: String,
    /// Execution start time.
    pub started_at: DateTime<Utc>,
    /// Execution end time.
    pub completed_at: DateTime<Utc>,
    /// Additional output data.
    pub output: HashMap<String, serde_json::Value>,
    /// Artifacts produced (ticket ids, capture paths, ...).
    pub artifacts: Vec<String>,
}

impl ActionResult {
    /// Creates a successful result.
    pub fn success(
        action_name: &str,
        message: &str,
        started_at: DateTime<Utc>,
        output: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            action_name: action_name.to_string(),
            success: true,
            message: message.to_string(),
            started_at,
            completed_at: Utc::now(),
            output,
            artifacts: Vec::new(),
        }
    }

    /// Creates a failed result.
    pub fn failure(action_name: &str, error: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            action_name: action_name.to_string(),
            success: false,
            message: error.to_string(),
            started_at,
            completed_at: Utc::now(),
            output: HashMap::new(),
            artifacts: Vec::new(),
        }
    }

    /// Attaches an artifact reference.
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifacts.push(artifact.into());
        self
    }
}

/// Context provided to actions during execution.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    /// Action parameters.
    pub parameters: HashMap<String, serde_json::Value>,
    /// Whether this is a dry run.
    pub dry_run: bool,
}

impl ActionContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter.
    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    /// Sets dry run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Gets a parameter as a string.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.parameters
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// Gets a required parameter as a string.
    pub fn require_string(&self, key: &str) -> Result<String, ActionError> {
        self.get_string(key).ok_or_else(|| {
            ActionError::InvalidParameters(format!("Missing required parameter: {}", key))
        })
    }
}

/// Definition of an action parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name.
    pub name: String,
    /// Parameter description.
    pub description: String,
    /// Parameter type.
    pub param_type: ParameterType,
    /// Whether the parameter is required.
    pub required: bool,
}

impl ParameterDef {
    /// Creates a required parameter definition.
    pub fn required(name: &str, description: &str, param_type: ParameterType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required: true,
        }
    }

    /// Creates an optional parameter definition.
    pub fn optional(name: &str, description: &str, param_type: ParameterType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required: false,
        }
    }
}

/// Types of action parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Boolean,
    List,
    Object,
}

/// Trait for action implementations.
#[async_trait]
pub trait Action: Send + Sync {
    /// Returns the action name.
    fn name(&self) -> &str;

    /// Returns the action description.
    fn description(&self) -> &str;

    /// Returns the parameters this action accepts.
    fn parameters(&self) -> Vec<ParameterDef>;

    /// Validates the action parameters.
    fn validate(&self, context: &ActionContext) -> Result<(), ActionError> {
        for param in self.parameters() {
            if param.required && !context.parameters.contains_key(&param.name) {
                return Err(ActionError::InvalidParameters(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }
        Ok(())
    }

    /// Executes the action.
    async fn execute(&self, context: ActionContext) -> Result<ActionResult, ActionError>;
}

/// Registry of available actions.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        let name = action.name().to_string();
        info!("Registering action: {}", name);
        self.actions.insert(name, action);
    }

    /// Gets an action by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    /// Lists registered action names.
    pub fn list(&self) -> Vec<&str> {
        self.actions.keys().map(|s| s.as_str()).collect()
    }

    /// Executes an action by name.
    #[instrument(skip(self, context), fields(action = %name))]
    pub async fn execute(
        &self,
        name: &str,
        context: ActionContext,
    ) -> Result<ActionResult, ActionError> {
        let started_at = Utc::now();
        let action = self
            .get(name)
            .ok_or_else(|| ActionError::NotFound(name.to_string()))?;

        action.validate(&context)?;

        if context.dry_run {
            debug!("Dry run mode - skipping actual execution");
            return Ok(ActionResult::success(
                name,
                "Dry run - action would be executed",
                started_at,
                HashMap::new(),
            ));
        }

        action.execute(context).await
    }
}

/// Adapter exposing an [`ActionRegistry`] through the core engine's
/// containment/notification executor seam.
pub struct RegistryExecutor {
    registry: Arc<ActionRegistry>,
}

impl RegistryExecutor {
    /// Wraps a registry.
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ActionExecutor for RegistryExecutor {
    async fn execute(
        &self,
        action: &str,
        parameters: &HashMap<String, serde_json::Value>,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let mut context = ActionContext::new();
        context.parameters = parameters.clone();

        match self.registry.execute(action, context).await {
            Ok(result) => {
                let mut output = ExecutionOutput {
                    success: result.success,
                    output: result.message,
                    artifacts: result.artifacts,
                };
                if !result.output.is_empty() {
                    output.output = format!(
                        "{} ({})",
                        output.output,
                        serde_json::to_string(&result.output).unwrap_or_default()
                    );
                }
                Ok(output)
            }
            Err(ActionError::NotFound(name)) => Err(ExecutionError::UnknownAction(name)),
            Err(e) => Err(ExecutionError::Failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAction;

    #[async_trait]
    impl Action for EchoAction {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes its target parameter"
        }

        fn parameters(&self) -> Vec<ParameterDef> {
            vec![ParameterDef::required(
                "target",
                "The target",
                ParameterType::String,
            )]
        }

        async fn execute(&self, context: ActionContext) -> Result<ActionResult, ActionError> {
            let target = context.require_string("target")?;
            Ok(ActionResult::success(
                self.name(),
                &format!("echoed {}", target),
                Utc::now(),
                HashMap::new(),
            ))
        }
    }

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(EchoAction));
        registry
    }

    #[tokio::test]
    async fn execute_by_name() {
        let registry = registry();
        let context = ActionContext::new().with_param("target", serde_json::json!("host-1"));
        let result = registry.execute("echo", context).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "echoed host-1");
    }

    #[tokio::test]
    async fn missing_parameter_is_rejected_before_execution() {
        let registry = registry();
        let result = registry.execute("echo", ActionContext::new()).await;
        assert!(matches!(result, Err(ActionError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn dry_run_skips_execution() {
        let registry = registry();
        let context = ActionContext::new()
            .with_param("target", serde_json::json!("host-1"))
            .with_dry_run(true);
        let result = registry.execute("echo", context).await.unwrap();
        assert!(result.success);
        assert!(result.message.contains("Dry run"));
    }

    #[tokio::test]
    async fn registry_executor_maps_unknown_actions() {
        let executor = RegistryExecutor::new(Arc::new(registry()));
        let result = executor.execute("missing", &HashMap::new()).await;
        assert!(matches!(result, Err(ExecutionError::UnknownAction(_))));
    }

    #[tokio::test]
    async fn registry_executor_maps_success() {
        let executor = RegistryExecutor::new(Arc::new(registry()));
        let mut params = HashMap::new();
        params.insert("target".to_string(), serde_json::json!("host-1"));
        let output = executor.execute("echo", &params).await.unwrap();
        assert!(output.success);
        assert!(output.output.contains("echoed host-1"));
    }

    #[tokio::test]
    async fn registry_executor_maps_parameter_errors_to_failures() {
        let executor = RegistryExecutor::new(Arc::new(registry()));
        let result = executor.execute("echo", &HashMap::new()).await;
        assert!(matches!(result, Err(ExecutionError::Failed(_))));
    }
}
