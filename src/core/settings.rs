use std::collections::HashMap;
use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime settings: built-in defaults, overlaid by an optional TOML
/// file (`APIARY_CONFIG`), overlaid by `APIARY_*` environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub iot: IotSettings,
    pub harvest: HarvestSettings,
    pub metrics: MetricsSettings,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IotSettings {
    /// Replace device I/O with the timed synthetic responder.
    pub simulate: bool,
    pub endpoint: String,
    pub connect_timeout_secs: u64,
    /// How long a phase may wait on its response event before the job
    /// is marked failed.
    pub response_timeout_secs: u64,
    pub sim_min_delay_ms: u64,
    pub sim_max_delay_ms: u64,
    pub sim_success_rate: f64,
    pub device_error_policy: DeviceErrorPolicy,
}

impl Default for IotSettings {
    fn default() -> Self {
        Self {
            simulate: true,
            endpoint: "ws://127.0.0.1:9001/device".to_string(),
            connect_timeout_secs: 10,
            response_timeout_secs: 120,
            sim_min_delay_ms: 500,
            sim_max_delay_ms: 1500,
            sim_success_rate: 0.98,
            device_error_policy: DeviceErrorPolicy::Ignore,
        }
    }
}

impl IotSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

/// What to do when a device response carries `success: false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceErrorPolicy {
    /// Log and keep going; the response still completes the phase.
    Ignore,
    /// Mark the job failed.
    Fail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// Data type recorded for the synthesized yield; also the metric
    /// profile that provides its base value and variance.
    pub data_type_id: String,
    pub smoker_duration_secs: u64,
    /// Finished jobs kept in the registry before the oldest are evicted.
    pub finished_retention: usize,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            data_type_id: "honey_harvested".to_string(),
            smoker_duration_secs: 30,
            finished_retention: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// External metrics ingestion endpoint. When unset, records go to
    /// the in-process store.
    pub endpoint: Option<String>,
    pub profiles: HashMap<String, MetricProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricProfile {
    pub base_value: f64,
    pub variance: f64,
    /// Include this profile in the periodic data-collection simulation.
    #[serde(default)]
    pub simulate: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "honey_harvested".to_string(),
            MetricProfile {
                base_value: 2.5,
                variance: 0.8,
                simulate: false,
            },
        );
        profiles.insert(
            "temperature".to_string(),
            MetricProfile {
                base_value: 35.0,
                variance: 1.5,
                simulate: true,
            },
        );
        profiles.insert(
            "humidity".to_string(),
            MetricProfile {
                base_value: 55.0,
                variance: 8.0,
                simulate: true,
            },
        );
        profiles.insert(
            "hive_weight".to_string(),
            MetricProfile {
                base_value: 42.0,
                variance: 3.0,
                simulate: true,
            },
        );
        Self {
            endpoint: None,
            profiles,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub data_collection_cron: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            data_collection_cron: "0 0/5 * * * *".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let mut settings = match env::var("APIARY_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {path}"))?;
                toml::from_str(&raw).with_context(|| format!("invalid config file {path}"))?
            }
            Err(_) => Settings::default(),
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("APIARY_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = parse_env("APIARY_API_PORT") {
            self.api.port = port;
        }
        if let Some(simulate) = parse_env("APIARY_IOT_SIMULATE") {
            self.iot.simulate = simulate;
        }
        if let Ok(endpoint) = env::var("APIARY_IOT_ENDPOINT") {
            self.iot.endpoint = endpoint;
        }
        if let Some(secs) = parse_env("APIARY_IOT_CONNECT_TIMEOUT_SECS") {
            self.iot.connect_timeout_secs = secs;
        }
        if let Some(secs) = parse_env("APIARY_IOT_RESPONSE_TIMEOUT_SECS") {
            self.iot.response_timeout_secs = secs;
        }
        if let Ok(endpoint) = env::var("APIARY_METRICS_ENDPOINT") {
            self.metrics.endpoint = Some(endpoint);
        }
        if let Ok(cron) = env::var("APIARY_DATA_COLLECTION_CRON") {
            self.scheduler.data_collection_cron = cron;
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_in_simulate_mode() {
        let settings = Settings::default();
        assert!(settings.iot.simulate);
        assert_eq!(settings.iot.device_error_policy, DeviceErrorPolicy::Ignore);
        assert!(settings.metrics.profiles.contains_key("honey_harvested"));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let raw = r#"
            [api]
            port = 9090

            [iot]
            simulate = false
            endpoint = "ws://10.0.0.7:9001/device"
            device_error_policy = "fail"

            [metrics.profiles.pollen]
            base_value = 1.2
            variance = 0.4
            simulate = true
        "#;
        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.api.port, 9090);
        assert!(!settings.iot.simulate);
        assert_eq!(settings.iot.device_error_policy, DeviceErrorPolicy::Fail);
        assert_eq!(settings.iot.connect_timeout_secs, 10);
        assert!(settings.metrics.profiles.contains_key("pollen"));
    }
}
