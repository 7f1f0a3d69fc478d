//! Notification action.

use crate::registry::{
    Action, ActionContext, ActionError, ActionResult, ParameterDef, ParameterType,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// A notification handed off for delivery.
#[derive(Debug, Clone)]
pub struct SentNotification {
    /// Delivery channel.
    pub channel: String,
    /// Message body.
    pub message: String,
}

/// Hands a notification to the delivery layer.
#[derive(Default)]
pub struct SendNotificationAction {
    sent: Mutex<Vec<SentNotification>>,
}

impl SendNotificationAction {
    /// Creates the action.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the notifications handed off so far.
    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Action for SendNotificationAction {
    fn name(&self) -> &str {
        "send_notification"
    }

    fn description(&self) -> &str {
        "Sends a notification to a delivery channel"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::required("message", "Message body", ParameterType::String),
            ParameterDef::optional("channel", "Delivery channel", ParameterType::String),
        ]
    }

    #[instrument(skip(self, context))]
    async fn execute(&self, context: ActionContext) -> Result<ActionResult, ActionError> {
        let started_at = Utc::now();
        let message = context.require_string("message")?;
        let channel = context
            .get_string("channel")
            .unwrap_or_else(|| "soc".to_string());

        info!(channel, "Notification queued");
        let mut sent = self.sent.lock().await;
        sent.push(SentNotification {
            channel: channel.clone(),
            message,
        });
        let sequence = sent.len();
        drop(sent);

        let mut output = HashMap::new();
        output.insert("channel".to_string(), serde_json::json!(channel));

        Ok(ActionResult::success(
            self.name(),
            &format!("Notification sent to {}", channel),
            started_at,
            output,
        )
        .with_artifact(format!("notification:{}", sequence)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sends_to_default_channel() {
        let action = SendNotificationAction::new();
        let context = ActionContext::new()
            .with_param("message", serde_json::json!("containment complete"));

        let result = action.execute(context).await.unwrap();
        assert!(result.success);
        assert_eq!(result.artifacts, vec!["notification:1"]);

        let sent = action.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, "soc");
    }

    #[tokio::test]
    async fn message_is_required() {
        let action = SendNotificationAction::new();
        assert!(matches!(
            action.execute(ActionContext::new()).await,
            Err(ActionError::InvalidParameters(_))
        ));
    }
}
