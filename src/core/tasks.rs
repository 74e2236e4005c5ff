//! Recurring background work, attached to the shared cron scheduler at
//! boot.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::core::metrics::{self, MetricRecord, MetricsSink};
use crate::core::settings::Settings;

/// One data-collection pass: synthesize a reading for every
/// simulation-enabled metric profile and hand the batch to the sink.
pub async fn collect_simulated_metrics(settings: &Settings, sink: &dyn MetricsSink) {
    let mut records = Vec::new();
    for (name, profile) in &settings.metrics.profiles {
        if !profile.simulate {
            continue;
        }
        records.push(MetricRecord {
            datetime: metrics::now_iso_millis(),
            data_type_id: name.clone(),
            beehive_id: None,
            value: metrics::simulated_value(profile),
        });
    }
    if records.is_empty() {
        return;
    }

    info!("simulated data collection: {} readings", records.len());
    if let Err(e) = sink.save_metrics(records).await {
        warn!("failed to save simulated metrics: {e:#}");
    }
}

/// Registers the recurring data-collection job.
pub async fn attach_data_collection(
    scheduler: &tokio_cron_scheduler::JobScheduler,
    settings: Arc<Settings>,
    sink: Arc<dyn MetricsSink>,
) -> Result<()> {
    let cron = settings.scheduler.data_collection_cron.clone();
    let job = tokio_cron_scheduler::Job::new_async(cron.as_str(), move |_uuid, mut _l| {
        let settings = settings.clone();
        let sink = sink.clone();
        Box::pin(async move {
            collect_simulated_metrics(&settings, sink.as_ref()).await;
        })
    })?;
    scheduler.add(job).await?;
    info!("data collection scheduled: {cron}");
    Ok(())
}
