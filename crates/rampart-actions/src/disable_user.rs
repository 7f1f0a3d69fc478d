//! User account disabling action.

use crate::registry::{
    Action, ActionContext, ActionError, ActionResult, ParameterDef, ParameterType,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// Disables a user account in the identity provider.
#[derive(Default)]
pub struct DisableUserAction {
    disabled: RwLock<HashSet<String>>,
}

impl DisableUserAction {
    /// Creates the action with no accounts disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether an account is currently disabled.
    pub async fn is_disabled(&self, username: &str) -> bool {
        self.disabled.read().await.contains(username)
    }
}

#[async_trait]
impl Action for DisableUserAction {
    fn name(&self) -> &str {
        "disable_user"
    }

    fn description(&self) -> &str {
        "Disables a user account in the identity provider"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::required("username", "The account to disable", ParameterType::String),
            ParameterDef::optional("reason", "Reason for disabling", ParameterType::String),
        ]
    }

    #[instrument(skip(self, context))]
    async fn execute(&self, context: ActionContext) -> Result<ActionResult, ActionError> {
        let started_at = Utc::now();
        let username = context.require_string("username")?;

        let mut disabled = self.disabled.write().await;
        if disabled.contains(&username) {
            return Ok(ActionResult::success(
                self.name(),
                &format!("Account {} is already disabled", username),
                started_at,
                HashMap::new(),
            ));
        }
        disabled.insert(username.clone());
        info!("Disabled account {}", username);

        let mut output = HashMap::new();
        output.insert("username".to_string(), serde_json::json!(username));

        Ok(ActionResult::success(
            self.name(),
            &format!("Account {} disabled", username),
            started_at,
            output,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disable_is_idempotent() {
        let action = DisableUserAction::new();
        let context =
            ActionContext::new().with_param("username", serde_json::json!("jdoe"));

        assert!(action.execute(context.clone()).await.unwrap().success);
        assert!(action.is_disabled("jdoe").await);

        let second = action.execute(context).await.unwrap();
        assert!(second.message.contains("already disabled"));
    }
}
