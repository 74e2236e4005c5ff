//! Device gateway: one logical session to the harvest controller per
//! job. Commands go out as colon-namespaced events; responses come back
//! asynchronously and are routed to whichever callback is registered
//! under the response-event name.

mod simulated;
mod socket;

pub use simulated::SimulatedLink;
pub use socket::SocketLink;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::settings::IotSettings;

/// Inbound device message, routed by event name.
#[derive(Debug, Clone)]
pub struct DeviceResponse {
    pub event: String,
    pub payload: Value,
}

impl DeviceResponse {
    /// The device's success flag; a frame without one counts as success.
    pub fn success(&self) -> bool {
        self.payload
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

pub type ResponseCallback = Arc<dyn Fn(DeviceResponse) + Send + Sync>;

/// Single-slot callback table: at most one callback per response-event
/// name. Registering a second callback for the same name replaces the
/// first; nothing is queued.
#[derive(Default)]
pub struct CallbackTable {
    slots: Mutex<HashMap<String, ResponseCallback>>,
}

impl CallbackTable {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, ResponseCallback>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, event: &str, callback: ResponseCallback) {
        self.slots().insert(event.to_string(), callback);
    }

    pub fn unregister(&self, event: &str) {
        self.slots().remove(event);
    }

    /// Invokes the callback registered for the response's event name.
    /// Returns false when no callback matched and the response was
    /// dropped.
    pub fn dispatch(&self, response: DeviceResponse) -> bool {
        let callback = self.slots().get(&response.event).cloned();
        match callback {
            Some(callback) => {
                callback(response);
                true
            }
            None => {
                debug!("no callback registered for {}; response dropped", response.event);
                false
            }
        }
    }
}

/// Transport behind the gateway: the simulated responder, the real
/// WebSocket session, or a test double.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn emit(&self, event: &str, payload: &Value) -> Result<()>;
    async fn close(&self);
}

/// Client for communicating with the harvest device. Owns the callback
/// table and the underlying link; never shared between jobs.
pub struct IotClient {
    callbacks: Arc<CallbackTable>,
    link: Arc<dyn DeviceLink>,
}

impl IotClient {
    pub fn from_settings(settings: &IotSettings) -> Self {
        let callbacks = Arc::new(CallbackTable::default());
        let link: Arc<dyn DeviceLink> = if settings.simulate {
            Arc::new(SimulatedLink::new(callbacks.clone(), settings))
        } else {
            Arc::new(SocketLink::new(callbacks.clone(), settings))
        };
        Self { callbacks, link }
    }

    /// Wires a client over a caller-supplied link sharing `callbacks`.
    pub fn with_link(callbacks: Arc<CallbackTable>, link: Arc<dyn DeviceLink>) -> Self {
        Self { callbacks, link }
    }

    pub async fn connect(&self) -> Result<()> {
        self.link.connect().await
    }

    /// Sends a command. The response, if any, arrives asynchronously
    /// through the callback registered for `<subsystem>:response`.
    pub async fn emit_event(&self, event: &str, payload: Value) -> Result<()> {
        info!("emitting {event}: {payload}");
        self.link.emit(event, &payload).await
    }

    pub fn register_response_callback(&self, event: &str, callback: ResponseCallback) {
        self.callbacks.register(event, callback);
    }

    pub fn unregister_response_callback(&self, event: &str) {
        self.callbacks.unregister(event);
    }

    /// Idempotent; safe to call even after a failed connect.
    pub async fn close(&self) {
        self.link.close().await;
    }
}
