mod core;
mod interfaces;
mod logging;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::harvest::HarvestContext;
use crate::core::lifecycle::LifecycleManager;
use crate::core::metrics::{HttpMetricsSink, InMemoryMetricsStore, MetricsSink};
use crate::core::settings::Settings;
use crate::core::tasks;
use crate::interfaces::web::{ApiServer, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(500);
    logging::init(log_tx.clone());

    let settings = Arc::new(Settings::load()?);
    info!(
        "starting apiary (device mode: {})",
        if settings.iot.simulate { "simulated" } else { "real" }
    );

    let metrics_store = Arc::new(InMemoryMetricsStore::default());
    let sink: Arc<dyn MetricsSink> = match settings.metrics.endpoint.as_deref() {
        Some(endpoint) => Arc::new(HttpMetricsSink::new(endpoint.to_string())),
        None => metrics_store.clone(),
    };

    let state = AppState {
        harvest: HarvestContext::new(settings.clone(), sink.clone()),
        metrics: metrics_store,
        settings: settings.clone(),
        log_tx,
    };

    let mut lifecycle = LifecycleManager::new().await?;
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(state))));
    tasks::attach_data_collection(&lifecycle.scheduler, settings, sink).await?;
    lifecycle.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    lifecycle.shutdown().await?;
    Ok(())
}
