//! Event bus for Rampart.
//!
//! Components publish typed events; any number of listeners subscribe. The
//! bus never lets a slow subscriber block a publisher: broadcast receivers
//! get tokio's lagging semantics, and named subscribers are fed with
//! `try_send`, dropping on a full channel.

use crate::alert::Severity;
use crate::incident::{IncidentCategory, IncidentStatus};
use crate::metrics::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors that can occur in the event bus.
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(String),
}

/// Events published by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A new alert passed intake validation.
    AlertReceived {
        alert_id: Uuid,
        rule: String,
        severity: Severity,
    },

    /// The correlator opened an incident.
    IncidentCreated {
        incident_id: Uuid,
        category: IncidentCategory,
        severity: Severity,
        alert_ids: Vec<Uuid>,
    },

    /// An incident's status or fields changed.
    IncidentUpdated {
        incident_id: Uuid,
        status: IncidentStatus,
    },

    /// A response step completed successfully.
    ActionCompleted {
        incident_id: Uuid,
        action_id: Uuid,
        action: String,
    },

    /// A response step failed or timed out.
    ActionFailed {
        incident_id: Uuid,
        action_id: Uuid,
        action: String,
        error: String,
    },

    /// An incident was escalated to a human target.
    IncidentEscalated {
        incident_id: Uuid,
        target: String,
        reason: String,
    },

    /// An on-demand metrics snapshot.
    MetricsSnapshot(MetricsSnapshot),
}

impl EngineEvent {
    /// Returns the event name as published to sinks.
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::AlertReceived { .. } => "alert-received",
            EngineEvent::IncidentCreated { .. } => "incident-created",
            EngineEvent::IncidentUpdated { .. } => "incident-updated",
            EngineEvent::ActionCompleted { .. } => "action-completed",
            EngineEvent::ActionFailed { .. } => "action-failed",
            EngineEvent::IncidentEscalated { .. } => "incident-escalated",
            EngineEvent::MetricsSnapshot(_) => "metrics-snapshot",
        }
    }

    /// Extracts the incident id from an event if applicable.
    pub fn incident_id(&self) -> Option<Uuid> {
        match self {
            EngineEvent::AlertReceived { .. } => None,
            EngineEvent::IncidentCreated { incident_id, .. } => Some(*incident_id),
            EngineEvent::IncidentUpdated { incident_id, .. } => Some(*incident_id),
            EngineEvent::ActionCompleted { incident_id, .. } => Some(*incident_id),
            EngineEvent::ActionFailed { incident_id, .. } => Some(*incident_id),
            EngineEvent::IncidentEscalated { incident_id, .. } => Some(*incident_id),
            EngineEvent::MetricsSnapshot(_) => None,
        }
    }
}

type NamedSubscriber = mpsc::Sender<EngineEvent>;

/// Central publish-subscribe bus.
pub struct EventBus {
    broadcast_tx: broadcast::Sender<EngineEvent>,
    subscribers: RwLock<HashMap<String, NamedSubscriber>>,
    history: RwLock<Vec<EngineEvent>>,
    history_size: usize,
    dropped_events: AtomicU64,
}

impl EventBus {
    /// Creates a bus with the given broadcast capacity and history size.
    pub fn new(capacity: usize, history_size: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self {
            broadcast_tx,
            subscribers: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::with_capacity(history_size)),
            history_size,
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Publishes an event to all subscribers. Fire-and-forget: delivery is
    /// best-effort and never blocks the publisher.
    pub async fn publish(&self, event: EngineEvent) {
        debug!(event_type = event.event_type(), "Publishing event");
        metrics::counter!("rampart_events_published").increment(1);

        {
            let mut history = self.history.write().await;
            if history.len() >= self.history_size {
                history.remove(0);
            }
            history.push(event.clone());
        }

        // No receivers is fine; the event still lands in history.
        let _ = self.broadcast_tx.send(event.clone());

        let subscribers = self.subscribers.read().await;
        for (name, tx) in subscribers.iter() {
            if tx.try_send(event.clone()).is_err() {
                let dropped = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                // Log every 100 dropped events to avoid log spam.
                if dropped % 100 == 1 {
                    warn!(
                        "Event dropped for subscriber {} (total dropped: {})",
                        name, dropped
                    );
                }
            }
        }
    }

    /// Subscribes to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Registers a named subscriber with a dedicated bounded channel.
    pub async fn register_subscriber(
        &self,
        name: &str,
        buffer_size: usize,
    ) -> mpsc::Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel(buffer_size);
        self.subscribers.write().await.insert(name.to_string(), tx);
        info!("Registered subscriber: {}", name);
        rx
    }

    /// Unregisters a named subscriber.
    pub async fn unregister_subscriber(&self, name: &str) -> Result<(), EventBusError> {
        if self.subscribers.write().await.remove(name).is_some() {
            info!("Unregistered subscriber: {}", name);
            Ok(())
        } else {
            Err(EventBusError::SubscriberNotFound(name.to_string()))
        }
    }

    /// Gets recent event history, newest first when a limit is given.
    pub async fn history(&self, limit: Option<usize>) -> Vec<EngineEvent> {
        let history = self.history.read().await;
        match limit {
            Some(n) => history.iter().rev().take(n).cloned().collect(),
            None => history.clone(),
        }
    }

    /// Gets recorded events for a specific incident.
    pub async fn incident_history(&self, incident_id: Uuid) -> Vec<EngineEvent> {
        self.history
            .read()
            .await
            .iter()
            .filter(|e| e.incident_id() == Some(incident_id))
            .cloned()
            .collect()
    }

    /// Number of events dropped for slow named subscribers.
    pub fn dropped_event_count(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024, 1000)
    }
}
