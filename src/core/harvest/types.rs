use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// One named step of the harvest procedure, in success-path order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestPhase {
    Calibrating,
    StartingSmoker,
    CapturingImages,
    AnalyzingHoneypots,
    Harvesting,
    Cleanup,
    Completed,
    Failed,
}

impl HarvestPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            HarvestPhase::Calibrating => "calibrating",
            HarvestPhase::StartingSmoker => "starting_smoker",
            HarvestPhase::CapturingImages => "capturing_images",
            HarvestPhase::AnalyzingHoneypots => "analyzing_honeypots",
            HarvestPhase::Harvesting => "harvesting",
            HarvestPhase::Cleanup => "cleanup",
            HarvestPhase::Completed => "completed",
            HarvestPhase::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "calibrating" => Some(HarvestPhase::Calibrating),
            "starting_smoker" => Some(HarvestPhase::StartingSmoker),
            "capturing_images" => Some(HarvestPhase::CapturingImages),
            "analyzing_honeypots" => Some(HarvestPhase::AnalyzingHoneypots),
            "harvesting" => Some(HarvestPhase::Harvesting),
            "cleanup" => Some(HarvestPhase::Cleanup),
            "completed" => Some(HarvestPhase::Completed),
            "failed" => Some(HarvestPhase::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, HarvestPhase::Completed | HarvestPhase::Failed)
    }

    /// Progress floor and ceiling while the job sits in this phase.
    pub fn progress_range(self) -> (u8, u8) {
        match self {
            HarvestPhase::Calibrating => (0, 5),
            HarvestPhase::StartingSmoker => (6, 20),
            HarvestPhase::CapturingImages => (21, 30),
            HarvestPhase::AnalyzingHoneypots => (31, 32),
            HarvestPhase::Harvesting => (33, 99),
            HarvestPhase::Cleanup => (99, 99),
            HarvestPhase::Completed => (100, 100),
            HarvestPhase::Failed => (0, 100),
        }
    }
}

/// Mutable status record for one harvest job; exactly one per job id.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestJob {
    pub job_id: String,
    pub device_id: String,
    pub beehive_id: String,
    pub phase: HarvestPhase,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last device payload seen for each completed phase, keyed by the
    /// phase name.
    pub phase_responses: HashMap<String, Value>,
}

impl HarvestJob {
    pub fn new(job_id: &str, device_id: &str, beehive_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            device_id: device_id.to_string(),
            beehive_id: beehive_id.to_string(),
            phase: HarvestPhase::Calibrating,
            progress: 0,
            started_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            error: None,
            phase_responses: HashMap::new(),
        }
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.failed_at)
    }
}
