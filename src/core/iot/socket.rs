use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{error, info, warn};

use super::{CallbackTable, DeviceLink, DeviceResponse};
use crate::core::settings::IotSettings;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Long-lived WebSocket session to the device controller. Commands are
/// fire-and-forget; a background reader task dispatches inbound frames
/// to the callback table by event name.
pub struct SocketLink {
    callbacks: Arc<CallbackTable>,
    endpoint: String,
    connect_timeout: Duration,
    session: Mutex<Option<Session>>,
}

struct Session {
    sink: WsSink,
    reader: JoinHandle<()>,
}

impl SocketLink {
    pub fn new(callbacks: Arc<CallbackTable>, settings: &IotSettings) -> Self {
        Self {
            callbacks,
            endpoint: settings.endpoint.clone(),
            connect_timeout: settings.connect_timeout(),
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DeviceLink for SocketLink {
    async fn connect(&self) -> Result<()> {
        let url = url::Url::parse(&self.endpoint)
            .with_context(|| format!("invalid device endpoint {}", self.endpoint))?;
        info!("connecting to device controller at {url}");

        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                anyhow!(
                    "connection to {} timed out after {:?}",
                    self.endpoint,
                    self.connect_timeout
                )
            })?
            .with_context(|| format!("failed to connect to device controller at {}", self.endpoint))?;

        let (sink, mut source) = stream.split();
        let callbacks = self.callbacks.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(frame) => {
                            let Some(event) = frame.get("event").and_then(Value::as_str) else {
                                warn!("device frame without event name: {text}");
                                continue;
                            };
                            callbacks.dispatch(DeviceResponse {
                                event: event.to_string(),
                                payload: frame.clone(),
                            });
                        }
                        Err(e) => warn!("unparseable device frame: {e}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        error!("device socket read failed: {e}");
                        break;
                    }
                }
            }
        });

        *self.session.lock().await = Some(Session { sink, reader });
        info!("connected to device controller at {}", self.endpoint);
        Ok(())
    }

    async fn emit(&self, event: &str, payload: &Value) -> Result<()> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().context("device session not connected")?;
        let frame = json!({ "event": event, "payload": payload }).to_string();
        session
            .sink
            .send(Message::text(frame))
            .await
            .with_context(|| format!("failed to send {event} to device controller"))
    }

    async fn close(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            let _ = session.sink.send(Message::Close(None)).await;
            session.reader.abort();
        }
    }
}
