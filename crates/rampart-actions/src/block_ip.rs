//! IP blocking action.
//!
//! Records a perimeter block for an address. Idempotent: re-blocking an
//! already-blocked address succeeds without side effects.

use crate::registry::{
    Action, ActionContext, ActionError, ActionResult, ParameterDef, ParameterType,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// Blocks an IP address at the network perimeter.
#[derive(Default)]
pub struct BlockIpAction {
    blocked: RwLock<HashSet<String>>,
}

impl BlockIpAction {
    /// Creates the action with no addresses blocked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether an address is currently blocked.
    pub async fn is_blocked(&self, ip: &str) -> bool {
        self.blocked.read().await.contains(ip)
    }
}

#[async_trait]
impl Action for BlockIpAction {
    fn name(&self) -> &str {
        "block_ip"
    }

    fn description(&self) -> &str {
        "Blocks an IP address at the network perimeter"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::required("ip", "The IP address to block", ParameterType::String),
            ParameterDef::optional("reason", "Reason for the block", ParameterType::String),
        ]
    }

    #[instrument(skip(self, context))]
    async fn execute(&self, context: ActionContext) -> Result<ActionResult, ActionError> {
        let started_at = Utc::now();
        let ip = context.require_string("ip")?;
        if ip.trim().is_empty() {
            return Err(ActionError::InvalidParameters("ip must not be empty".into()));
        }

        let mut blocked = self.blocked.write().await;
        if blocked.contains(&ip) {
            return Ok(ActionResult::success(
                self.name(),
                &format!("IP {} is already blocked", ip),
                started_at,
                HashMap::new(),
            ));
        }
        blocked.insert(ip.clone());
        info!("Blocked IP {}", ip);

        let mut output = HashMap::new();
        output.insert("ip".to_string(), serde_json::json!(ip));

        Ok(
            ActionResult::success(self.name(), &format!("IP {} blocked", ip), started_at, output)
                .with_artifact(format!("fw-rule:{}", ip)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn block_is_idempotent() {
        let action = BlockIpAction::new();
        let context = ActionContext::new().with_param("ip", serde_json::json!("203.0.113.8"));

        let first = action.execute(context.clone()).await.unwrap();
        assert!(first.success);
        assert!(action.is_blocked("203.0.113.8").await);

        let second = action.execute(context).await.unwrap();
        assert!(second.success);
        assert!(second.message.contains("already blocked"));
    }

    #[tokio::test]
    async fn empty_ip_is_rejected() {
        let action = BlockIpAction::new();
        let context = ActionContext::new().with_param("ip", serde_json::json!(""));
        assert!(matches!(
            action.execute(context).await,
            Err(ActionError::InvalidParameters(_))
        ));
    }
}
