//! Alert intake and enrichment.
//!
//! Intake validates raw alert fields, assigns the id and timestamp, enriches
//! the alert against non-expired threat indicators, stores it, and enqueues
//! it for correlation. Validation failures are rejected synchronously and
//! never enqueued; enrichment failures are logged and the alert proceeds
//! un-enriched rather than being dropped.

use crate::alert::{
    Alert, AlertDisposition, AlertEnrichment, AlertEvent, AlertSource, IntelMatch, Severity,
};
use crate::engine::{EngineStats, SharedAlerts};
use crate::events::{EngineEvent, EventBus};
use crate::threat_intel::ThreatIntelProvider;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Errors raised at intake.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Invalid alert: missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid alert: field '{0}' is empty")]
    EmptyField(&'static str),

    #[error("Engine is not accepting alerts")]
    EngineStopped,
}

/// Raw alert fields as they arrive from a source system. Every field is
/// optional at the wire; validation enforces what must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAlert {
    /// Detection rule name.
    pub rule: Option<String>,
    /// Severity.
    pub severity: Option<Severity>,
    /// Originating system/component.
    pub source: Option<AlertSource>,
    /// Detection event.
    pub event: Option<AlertEvent>,
}

impl RawAlert {
    /// Creates a fully-populated raw alert.
    pub fn new(rule: impl Into<String>, severity: Severity, source: AlertSource, event: AlertEvent) -> Self {
        Self {
            rule: Some(rule.into()),
            severity: Some(severity),
            source: Some(source),
            event: Some(event),
        }
    }

    fn validate(self) -> Result<(String, Severity, AlertSource, AlertEvent), IntakeError> {
        let rule = self.rule.ok_or(IntakeError::MissingField("rule"))?;
        if rule.trim().is_empty() {
            return Err(IntakeError::EmptyField("rule"));
        }
        let severity = self.severity.ok_or(IntakeError::MissingField("severity"))?;
        let source = self.source.ok_or(IntakeError::MissingField("source"))?;
        let event = self.event.ok_or(IntakeError::MissingField("event"))?;
        Ok((rule, severity, source, event))
    }
}

/// Validates, enriches, stores, and enqueues incoming alerts.
pub struct AlertIntake {
    alerts: SharedAlerts,
    intel: Arc<dyn ThreatIntelProvider>,
    bus: Arc<EventBus>,
    correlation_tx: mpsc::Sender<Uuid>,
    stats: Arc<EngineStats>,
}

impl AlertIntake {
    /// Creates the intake stage.
    pub fn new(
        alerts: SharedAlerts,
        intel: Arc<dyn ThreatIntelProvider>,
        bus: Arc<EventBus>,
        correlation_tx: mpsc::Sender<Uuid>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            alerts,
            intel,
            bus,
            correlation_tx,
            stats,
        }
    }

    /// Ingests a raw alert. On success the alert is stored, enriched, made
    /// visible to the correlator queue, and its id is returned.
    #[instrument(skip_all)]
    pub async fn ingest(&self, raw: RawAlert) -> Result<Uuid, IntakeError> {
        let (rule, severity, source, event) = match raw.validate() {
            Ok(fields) => fields,
            Err(e) => {
                self.stats.record_alert_rejected();
                metrics::counter!("rampart_alerts_rejected").increment(1);
                return Err(e);
            }
        };

        let mut alert = Alert {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            rule,
            severity,
            source,
            event,
            disposition: AlertDisposition::default(),
            enrichment: AlertEnrichment::default(),
        };
        let alert_id = alert.id;

        self.enrich(&mut alert).await;

        {
            let mut alerts = self.alerts.write().await;
            alerts.insert(alert_id, alert.clone());
        }
        self.stats.record_alert_received();
        metrics::counter!("rampart_alerts_received").increment(1);

        self.bus
            .publish(EngineEvent::AlertReceived {
                alert_id,
                rule: alert.rule.clone(),
                severity: alert.severity,
            })
            .await;

        self.correlation_tx
            .send(alert_id)
            .await
            .map_err(|_| IntakeError::EngineStopped)?;

        Ok(alert_id)
    }

    /// Scans the raw payload for substring matches against all non-expired
    /// indicators. A match appends a note; low/medium severity is upgraded
    /// to high. Idempotent: an indicator already recorded is not re-applied.
    pub async fn enrich(&self, alert: &mut Alert) {
        let indicators = match self.intel.active_indicators().await {
            Ok(indicators) => indicators,
            Err(e) => {
                warn!(alert_id = %alert.id, "Enrichment skipped: {}", e);
                return;
            }
        };

        let haystack = format!(
            "{} {}",
            alert.event.description,
            alert.event.payload
        );
        let mut matched = false;
        for indicator in indicators {
            if indicator.value.is_empty() || !haystack.contains(&indicator.value) {
                continue;
            }
            let already_recorded = alert
                .enrichment
                .intel_matches
                .iter()
                .any(|m| m.indicator_id == indicator.id);
            if already_recorded {
                continue;
            }
            debug!(
                alert_id = %alert.id,
                indicator = %indicator.value,
                "Threat indicator matched in alert payload"
            );
            alert.enrichment.intel_matches.push(IntelMatch {
                indicator_id: indicator.id,
                indicator_type: indicator.indicator_type,
                value: indicator.value.clone(),
                confidence: indicator.confidence,
                note: format!(
                    "payload matched {:?} indicator {} (confidence {})",
                    indicator.indicator_type, indicator.value, indicator.confidence
                ),
            });
            matched = true;
        }

        if matched {
            alert.upgrade_severity_on_match();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{IndicatorType, ThreatIndicator};
    use crate::threat_intel::{InMemoryThreatIntel, IntelError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    struct Fixture {
        intake: AlertIntake,
        alerts: SharedAlerts,
        bus: Arc<EventBus>,
        queue_rx: mpsc::Receiver<Uuid>,
    }

    fn fixture_with(intel: Arc<dyn ThreatIntelProvider>) -> Fixture {
        let alerts: SharedAlerts = Arc::new(RwLock::new(HashMap::new()));
        let bus = Arc::new(EventBus::default());
        let (tx, rx) = mpsc::channel(16);
        let intake = AlertIntake::new(
            Arc::clone(&alerts),
            intel,
            Arc::clone(&bus),
            tx,
            Arc::new(EngineStats::default()),
        );
        Fixture {
            intake,
            alerts,
            bus,
            queue_rx: rx,
        }
    }

    fn raw_alert() -> RawAlert {
        RawAlert::new(
            "brute-force-login",
            Severity::Medium,
            AlertSource::new("auth-service", "login-gateway"),
            AlertEvent::new("brute-force", "Repeated failed logins")
                .with_payload(serde_json::json!({"src_ip": "203.0.113.8"})),
        )
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_and_never_enqueued() {
        let mut fixture = fixture_with(Arc::new(InMemoryThreatIntel::new()));

        let result = fixture.intake.ingest(RawAlert::default()).await;
        assert!(matches!(result, Err(IntakeError::MissingField("rule"))));

        let mut no_event = raw_alert();
        no_event.event = None;
        let result = fixture.intake.ingest(no_event).await;
        assert!(matches!(result, Err(IntakeError::MissingField("event"))));

        assert!(fixture.alerts.read().await.is_empty());
        assert!(fixture.queue_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn valid_alert_is_stored_published_and_enqueued() {
        let mut fixture = fixture_with(Arc::new(InMemoryThreatIntel::new()));
        let mut events = fixture.bus.subscribe();

        let id = fixture.intake.ingest(raw_alert()).await.unwrap();

        assert!(fixture.alerts.read().await.contains_key(&id));
        assert_eq!(fixture.queue_rx.recv().await, Some(id));
        assert_eq!(events.recv().await.unwrap().event_type(), "alert-received");
    }

    #[tokio::test]
    async fn matching_indicator_upgrades_severity_one_way() {
        let intel = InMemoryThreatIntel::new();
        intel
            .add_indicator(ThreatIndicator::new(
                IndicatorType::Ip,
                "203.0.113.8",
                95,
                Severity::High,
            ))
            .await;
        let fixture = fixture_with(Arc::new(intel));

        let id = fixture.intake.ingest(raw_alert()).await.unwrap();

        let alerts = fixture.alerts.read().await;
        let alert = &alerts[&id];
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.enrichment.intel_matches.len(), 1);
    }

    #[tokio::test]
    async fn enrichment_never_decreases_severity_and_is_idempotent() {
        let intel = Arc::new(InMemoryThreatIntel::new());
        intel
            .add_indicator(ThreatIndicator::new(
                IndicatorType::Ip,
                "203.0.113.8",
                95,
                Severity::High,
            ))
            .await;
        let fixture = fixture_with(intel);

        let mut critical = raw_alert();
        critical.severity = Some(Severity::Critical);
        let id = fixture.intake.ingest(critical).await.unwrap();

        let mut alert = fixture.alerts.read().await[&id].clone();
        assert_eq!(alert.severity, Severity::Critical);

        // Re-running enrichment with the same indicator set changes nothing.
        let matches_before = alert.enrichment.intel_matches.len();
        fixture.intake.enrich(&mut alert).await;
        assert_eq!(alert.enrichment.intel_matches.len(), matches_before);
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn expired_indicators_do_not_enrich() {
        let intel = InMemoryThreatIntel::new();
        intel
            .add_indicator(
                ThreatIndicator::new(IndicatorType::Ip, "203.0.113.8", 95, Severity::High)
                    .with_expiry(Utc::now() - chrono::Duration::minutes(1)),
            )
            .await;
        let fixture = fixture_with(Arc::new(intel));

        let id = fixture.intake.ingest(raw_alert()).await.unwrap();
        let alerts = fixture.alerts.read().await;
        assert!(alerts[&id].enrichment.intel_matches.is_empty());
        assert_eq!(alerts[&id].severity, Severity::Medium);
    }

    struct BrokenFeed;

    #[async_trait]
    impl ThreatIntelProvider for BrokenFeed {
        async fn lookup(&self, _value: &str) -> Result<Vec<ThreatIndicator>, IntelError> {
            Err(IntelError::Unavailable("feed down".into()))
        }

        async fn active_indicators(&self) -> Result<Vec<ThreatIndicator>, IntelError> {
            Err(IntelError::Unavailable("feed down".into()))
        }
    }

    #[tokio::test]
    async fn enrichment_failure_does_not_drop_the_alert() {
        let mut fixture = fixture_with(Arc::new(BrokenFeed));

        let id = fixture.intake.ingest(raw_alert()).await.unwrap();

        let alerts = fixture.alerts.read().await;
        assert!(alerts[&id].enrichment.intel_matches.is_empty());
        assert_eq!(alerts[&id].severity, Severity::Medium);
        drop(alerts);
        assert_eq!(fixture.queue_rx.recv().await, Some(id));
    }
}
