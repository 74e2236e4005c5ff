use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use serde_json::{Value, json};

use super::{CallbackTable, DeviceLink, DeviceResponse};
use crate::core::settings::IotSettings;

/// Stand-in for the physical controller. Every emitted command spawns a
/// detached timer that, after a randomized delay, answers on
/// `<subsystem>:response` with a success flag drawn from the configured
/// rate. Responses nobody registered for are dropped.
pub struct SimulatedLink {
    callbacks: Arc<CallbackTable>,
    min_delay_ms: u64,
    max_delay_ms: u64,
    success_rate: f64,
}

impl SimulatedLink {
    pub fn new(callbacks: Arc<CallbackTable>, settings: &IotSettings) -> Self {
        Self {
            callbacks,
            min_delay_ms: settings.sim_min_delay_ms,
            max_delay_ms: settings.sim_max_delay_ms.max(settings.sim_min_delay_ms),
            success_rate: settings.sim_success_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl DeviceLink for SimulatedLink {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn emit(&self, event: &str, payload: &Value) -> Result<()> {
        let subsystem = event.split(':').next().unwrap_or(event);
        let response_event = format!("{subsystem}:response");
        let state = payload.get("state").cloned().unwrap_or(Value::Null);

        let (delay_ms, success) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(self.min_delay_ms..=self.max_delay_ms),
                rng.gen_bool(self.success_rate),
            )
        };

        let callbacks = self.callbacks.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let payload = json!({
                "event": response_event.as_str(),
                "success": success,
                "state": state,
            });
            callbacks.dispatch(DeviceResponse {
                event: response_event,
                payload,
            });
        });
        Ok(())
    }

    async fn close(&self) {}
}
