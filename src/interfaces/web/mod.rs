mod handlers;
mod router;

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info};

use crate::core::harvest::HarvestContext;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::metrics::InMemoryMetricsStore;
use crate::core::settings::Settings;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub harvest: HarvestContext,
    pub metrics: Arc<InMemoryMetricsStore>,
    pub settings: Arc<Settings>,
    pub log_tx: tokio::sync::broadcast::Sender<String>,
}

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API server initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            let addr = format!("{}:{}", state.settings.api.host, state.settings.api.port);
            let app = router::build_api_router(state);
            match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => {
                    info!("API server running at http://{addr}");
                    if let Err(e) = axum::serve(listener, app).await {
                        error!("API server crashed: {e}");
                    }
                }
                Err(e) => error!("failed to bind {addr}: {e}"),
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API server shutting down...");
        Ok(())
    }
}

// --- SSE logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().data("log stream lagged")),
    });
    Sse::new(stream)
}

#[cfg(test)]
mod tests;
