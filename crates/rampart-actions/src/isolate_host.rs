//! Host isolation action.

use crate::registry::{
    Action, ActionContext, ActionError, ActionResult, ParameterDef, ParameterType,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// Isolates a host from the network.
#[derive(Default)]
pub struct IsolateHostAction {
    isolated: RwLock<HashSet<String>>,
}

impl IsolateHostAction {
    /// Creates the action with no hosts isolated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a host is currently isolated.
    pub async fn is_isolated(&self, hostname: &str) -> bool {
        self.isolated.read().await.contains(hostname)
    }
}

#[async_trait]
impl Action for IsolateHostAction {
    fn name(&self) -> &str {
        "isolate_host"
    }

    fn description(&self) -> &str {
        "Isolates a host from the network"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::required("hostname", "The hostname to isolate", ParameterType::String),
            ParameterDef::optional("reason", "Reason for isolation", ParameterType::String),
        ]
    }

    #[instrument(skip(self, context))]
    async fn execute(&self, context: ActionContext) -> Result<ActionResult, ActionError> {
        let started_at = Utc::now();
        let hostname = context.require_string("hostname")?;

        let mut isolated = self.isolated.write().await;
        if isolated.contains(&hostname) {
            return Ok(ActionResult::success(
                self.name(),
                &format!("Host {} is already isolated", hostname),
                started_at,
                HashMap::new(),
            ));
        }
        isolated.insert(hostname.clone());
        info!("Isolated host {}", hostname);

        let mut output = HashMap::new();
        output.insert("hostname".to_string(), serde_json::json!(hostname));

        Ok(ActionResult::success(
            self.name(),
            &format!("Host {} isolated", hostname),
            started_at,
            output,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn isolation_is_idempotent() {
        let action = IsolateHostAction::new();
        let context =
            ActionContext::new().with_param("hostname", serde_json::json!("ws-042"));

        let first = action.execute(context.clone()).await.unwrap();
        assert!(first.success);
        assert!(action.is_isolated("ws-042").await);

        let second = action.execute(context).await.unwrap();
        assert!(second.message.contains("already isolated"));
    }

    #[tokio::test]
    async fn missing_hostname_is_rejected() {
        let action = IsolateHostAction::new();
        assert!(matches!(
            action.execute(ActionContext::new()).await,
            Err(ActionError::InvalidParameters(_))
        ));
    }
}
