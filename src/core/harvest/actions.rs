use std::sync::LazyLock;

use serde_json::{Value, json};

/// One fine-grained actuator command of the harvesting phase.
#[derive(Debug, Clone)]
pub struct HarvestAction {
    pub event: &'static str,
    pub payload: Value,
}

impl HarvestAction {
    /// Response event the device answers this action with.
    pub fn response_event(&self) -> String {
        response_event_for(self.event)
    }
}

/// `<subsystem>:<verb>` commands are answered on `<subsystem>:response`.
pub fn response_event_for(event: &str) -> String {
    let subsystem = event.split(':').next().unwrap_or(event);
    format!("{subsystem}:response")
}

/// Ordered actuator sequence for the harvesting phase, shared read-only
/// across all jobs. Exactly one of these is in flight per job at a time.
pub static HARVEST_ACTIONS: LazyLock<Vec<HarvestAction>> = LazyLock::new(|| {
    vec![
        HarvestAction {
            event: "needle_servo:angle",
            payload: json!({ "angle": 180, "state": "harvesting" }),
        },
        HarvestAction {
            event: "valve:control",
            payload: json!({ "open": true, "state": "harvesting" }),
        },
        HarvestAction {
            event: "pump:control",
            payload: json!({ "on": true, "flow_rate": 12, "state": "harvesting" }),
        },
        HarvestAction {
            event: "extractor:control",
            payload: json!({ "on": true, "duration_secs": 45, "state": "harvesting" }),
        },
        HarvestAction {
            event: "pump:control",
            payload: json!({ "on": false, "state": "harvesting" }),
        },
        HarvestAction {
            event: "valve:control",
            payload: json!({ "open": false, "state": "harvesting" }),
        },
    ]
});
