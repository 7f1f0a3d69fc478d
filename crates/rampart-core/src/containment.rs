//! Containment/notification executor seam.
//!
//! Both the automation rule engine and the playbook executor hand actions to
//! this interface. Implementations must be idempotent for actions that may be
//! re-fired (e.g. an IP block).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors returned by an action executor.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The action type is not known to the executor (configuration error).
    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    /// The executor could not reach the underlying system.
    #[error("Execution failed: {0}")]
    Failed(String),
}

/// Result of a delegated action execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Whether the external system reported success.
    pub success: bool,
    /// Output or error message.
    pub output: String,
    /// Artifacts produced (ticket ids, capture paths, ...).
    pub artifacts: Vec<String>,
}

impl ExecutionOutput {
    /// Convenience constructor for a successful execution.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            artifacts: Vec::new(),
        }
    }
}

impl From<ExecutionOutput> for crate::incident::ActionOutcome {
    fn from(output: ExecutionOutput) -> Self {
        Self {
            success: output.success,
            output: output.output,
            artifacts: output.artifacts,
        }
    }
}

/// External containment/notification executor.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Executes an action of the given type with the given parameters.
    async fn execute(
        &self,
        action: &str,
        parameters: &HashMap<String, serde_json::Value>,
    ) -> Result<ExecutionOutput, ExecutionError>;
}

/// Scriptable executor double used in tests and demos.
///
/// Actions succeed by default; specific action names can be configured to
/// report failure, to be unknown, or to take a fixed amount of time.
#[derive(Default)]
pub struct MockActionExecutor {
    failing: HashSet<String>,
    unknown: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockActionExecutor {
    /// Creates an executor where everything succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures an action to report failure.
    pub fn failing(mut self, action: impl Into<String>) -> Self {
        self.failing.insert(action.into());
        self
    }

    /// Configures an action to be unknown to the executor.
    pub fn unknown(mut self, action: impl Into<String>) -> Self {
        self.unknown.insert(action.into());
        self
    }

    /// Configures an action to take a fixed amount of time.
    pub fn delayed(mut self, action: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(action.into(), delay);
        self
    }

    /// Returns the action names executed so far, in call order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ActionExecutor for MockActionExecutor {
    async fn execute(
        &self,
        action: &str,
        _parameters: &HashMap<String, serde_json::Value>,
    ) -> Result<ExecutionOutput, ExecutionError> {
        if let Some(delay) = self.delays.get(action) {
            tokio::time::sleep(*delay).await;
        }
        self.calls.lock().await.push(action.to_string());

        if self.unknown.contains(action) {
            return Err(ExecutionError::UnknownAction(action.to_string()));
        }
        if self.failing.contains(action) {
            return Ok(ExecutionOutput {
                success: false,
                output: format!("{} reported failure", action),
                artifacts: Vec::new(),
            });
        }
        Ok(ExecutionOutput::ok(format!("{} executed", action)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_calls_in_order() {
        let executor = MockActionExecutor::new().failing("block_ip");

        let params = HashMap::new();
        let ok = executor.execute("notify", &params).await.unwrap();
        assert!(ok.success);

        let failed = executor.execute("block_ip", &params).await.unwrap();
        assert!(!failed.success);

        assert_eq!(executor.calls().await, vec!["notify", "block_ip"]);
    }

    #[tokio::test]
    async fn unknown_action_is_an_error() {
        let executor = MockActionExecutor::new().unknown("teleport_host");
        let result = executor.execute("teleport_host", &HashMap::new()).await;
        assert!(matches!(result, Err(ExecutionError::UnknownAction(_))));
    }
}
