//! Threat-intelligence provider seam.
//!
//! The engine treats indicators as read-only reference data refreshed by an
//! external feed loader. The provider is injected at engine construction so
//! tests can supply a double.

use crate::alert::ThreatIndicator;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Errors from the threat-intelligence provider.
#[derive(Error, Debug)]
pub enum IntelError {
    #[error("Threat intel feed unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view onto the threat-intelligence feed.
#[async_trait]
pub trait ThreatIntelProvider: Send + Sync {
    /// Looks up non-expired indicators matching a specific value.
    async fn lookup(&self, value: &str) -> Result<Vec<ThreatIndicator>, IntelError>;

    /// Returns all non-expired indicators.
    async fn active_indicators(&self) -> Result<Vec<ThreatIndicator>, IntelError>;
}

/// In-memory provider backed by a feed loader's periodic refresh.
#[derive(Default)]
pub struct InMemoryThreatIntel {
    indicators: Arc<RwLock<Vec<ThreatIndicator>>>,
}

impl InMemoryThreatIntel {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the indicator set with a fresh feed snapshot.
    pub async fn load_indicators(&self, indicators: Vec<ThreatIndicator>) {
        let count = indicators.len();
        *self.indicators.write().await = indicators;
        info!("Loaded {} threat indicators", count);
    }

    /// Adds a single indicator.
    pub async fn add_indicator(&self, indicator: ThreatIndicator) {
        self.indicators.write().await.push(indicator);
    }
}

#[async_trait]
impl ThreatIntelProvider for InMemoryThreatIntel {
    async fn lookup(&self, value: &str) -> Result<Vec<ThreatIndicator>, IntelError> {
        let now = Utc::now();
        Ok(self
            .indicators
            .read()
            .await
            .iter()
            .filter(|i| !i.is_expired(now) && i.value == value)
            .cloned()
            .collect())
    }

    async fn active_indicators(&self) -> Result<Vec<ThreatIndicator>, IntelError> {
        let now = Utc::now();
        Ok(self
            .indicators
            .read()
            .await
            .iter()
            .filter(|i| !i.is_expired(now))
            .cloned()
            .collect())
    }
}
