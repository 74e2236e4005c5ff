//! Metric records and the ingestion collaborator the harvest engine and
//! the data-collection simulator hand their readings to.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::core::settings::MetricProfile;

/// One measurement, as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    /// ISO-8601 UTC, millisecond precision.
    pub datetime: String,
    pub data_type_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beehive_id: Option<String>,
    pub value: f64,
}

pub fn now_iso_millis() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One-decimal rounding, the precision used for recorded values.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Synthesized harvest yield: base value plus a bounded random draw.
pub fn harvest_yield(profile: &MetricProfile) -> f64 {
    round1(profile.base_value + rand::random::<f64>() * profile.variance)
}

/// Centered draw used by the periodic data-collection simulation.
pub fn simulated_value(profile: &MetricProfile) -> f64 {
    round1(profile.base_value + (rand::random::<f64>() - 0.5) * profile.variance)
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn save_metrics(&self, records: Vec<MetricRecord>) -> Result<()>;
}

/// Process-lifetime store behind `POST /api/metrics`; doubles as the
/// in-process sink when no external endpoint is configured.
#[derive(Default)]
pub struct InMemoryMetricsStore {
    records: Mutex<Vec<MetricRecord>>,
}

impl InMemoryMetricsStore {
    fn records(&self) -> MutexGuard<'_, Vec<MetricRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, records: Vec<MetricRecord>) -> usize {
        let mut stored = self.records();
        stored.extend(records);
        stored.len()
    }

    pub fn list(&self) -> Vec<MetricRecord> {
        self.records().clone()
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsStore {
    async fn save_metrics(&self, records: Vec<MetricRecord>) -> Result<()> {
        self.append(records);
        Ok(())
    }
}

/// Posts records to an external metrics ingestion endpoint.
pub struct HttpMetricsSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMetricsSink {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl MetricsSink for HttpMetricsSink {
    async fn save_metrics(&self, records: Vec<MetricRecord>) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&records)
            .send()
            .await
            .with_context(|| format!("failed to reach metrics endpoint {}", self.endpoint))?;
        response
            .error_for_status()
            .with_context(|| format!("metrics endpoint {} rejected the batch", self.endpoint))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_carry_millisecond_precision() {
        let stamp = now_iso_millis();
        let parsed = chrono::DateTime::parse_from_rfc3339(&stamp).unwrap();
        assert_eq!(parsed.timezone().utc_minus_local(), 0);
        // e.g. 2026-08-07T12:34:56.789Z, exactly three fractional digits
        let fraction = stamp.split('.').nth(1).unwrap();
        assert_eq!(fraction.trim_end_matches('Z').len(), 3);
    }

    #[test]
    fn yield_stays_within_the_profile_bounds() {
        let profile = MetricProfile {
            base_value: 2.5,
            variance: 0.8,
            simulate: false,
        };
        for _ in 0..100 {
            let value = harvest_yield(&profile);
            assert!((2.5..=3.3).contains(&value), "out of range: {value}");
        }
    }

    #[test]
    fn simulated_values_are_centered_on_the_base() {
        let profile = MetricProfile {
            base_value: 35.0,
            variance: 1.5,
            simulate: true,
        };
        for _ in 0..100 {
            let value = simulated_value(&profile);
            assert!((34.2..=35.8).contains(&value), "out of range: {value}");
        }
    }

    #[test]
    fn records_serialize_camel_case() {
        let record = MetricRecord {
            datetime: "2026-08-07T00:00:00.000Z".to_string(),
            data_type_id: "honey_harvested".to_string(),
            beehive_id: Some("hive-1".to_string()),
            value: 2.9,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["dataTypeId"], "honey_harvested");
        assert_eq!(json["beehiveId"], "hive-1");
    }
}
