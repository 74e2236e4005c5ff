//! Effect executor: binds one job to one device session and drives it
//! through the phase walk. Each phase's entry effects end with a command
//! emission; the job then sits idle until the response registered for
//! that phase arrives (or times out) on the response channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::actions::{HARVEST_ACTIONS, HarvestAction};
use super::machine::{self, Effect, MachineState};
use super::registry::JobRegistry;
use super::types::{HarvestJob, HarvestPhase};
use crate::core::iot::{DeviceResponse, IotClient};
use crate::core::metrics::{self, MetricRecord, MetricsSink};
use crate::core::settings::{DeviceErrorPolicy, Settings};

/// Builds the per-job device session. The default factory follows the
/// configured iot settings; tests inject their own links.
pub trait GatewayFactory: Send + Sync {
    fn open(&self) -> IotClient;
}

pub struct SettingsGatewayFactory {
    settings: Arc<Settings>,
}

impl SettingsGatewayFactory {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }
}

impl GatewayFactory for SettingsGatewayFactory {
    fn open(&self) -> IotClient {
        IotClient::from_settings(&self.settings.iot)
    }
}

/// Everything a harvest job needs, owned and injected rather than
/// process-wide.
#[derive(Clone)]
pub struct HarvestContext {
    pub registry: JobRegistry,
    pub settings: Arc<Settings>,
    pub sink: Arc<dyn MetricsSink>,
    pub gateway: Arc<dyn GatewayFactory>,
}

impl HarvestContext {
    pub fn new(settings: Arc<Settings>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            registry: JobRegistry::new(settings.harvest.finished_retention),
            gateway: Arc::new(SettingsGatewayFactory::new(settings.clone())),
            settings,
            sink,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn GatewayFactory>) -> Self {
        self.gateway = gateway;
        self
    }

    /// Allocates a job id, registers the initial record, and hands the
    /// job to its own task. Returns immediately; progress is observed by
    /// polling the registry.
    pub fn start_harvest(&self, device_id: &str, beehive_id: &str) -> String {
        let job_id = Uuid::new_v4().to_string();
        self.registry
            .create(HarvestJob::new(&job_id, device_id, beehive_id));
        info!("[{job_id}] harvest started for device {device_id}, beehive {beehive_id}");

        let ctx = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            run_harvest_job(ctx, id).await;
        });
        job_id
    }
}

/// Runs one job to a terminal phase. Any fault (connect failure, emit
/// failure, timeout, panic) lands in the job record as `failed`, and
/// the gateway is closed best-effort.
pub async fn run_harvest_job(ctx: HarvestContext, job_id: String) {
    let client = ctx.gateway.open();
    let outcome = std::panic::AssertUnwindSafe(drive(&ctx, &client, &job_id))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("[{job_id}] harvest failed: {e:#}");
            ctx.registry.fail(&job_id, &format!("{e:#}"));
            client.close().await;
        }
        Err(_) => {
            error!("[{job_id}] harvest task panicked");
            ctx.registry.fail(&job_id, "harvest task panicked");
            client.close().await;
        }
    }
}

async fn drive(ctx: &HarvestContext, client: &IotClient, job_id: &str) -> Result<()> {
    if let Err(e) = client.connect().await {
        bail!("failed to connect to device gateway: {e:#}");
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<DeviceResponse>();
    let catalog: &[HarvestAction] = &HARVEST_ACTIONS;
    let response_timeout = ctx.settings.iot.response_timeout();
    let mut state = MachineState::start();
    let mut registered: Option<String> = None;

    loop {
        let plan = machine::entry_plan(state, catalog, ctx.settings.harvest.smoker_duration_secs);
        execute_effects(ctx, client, job_id, state, plan, &tx, &mut registered).await?;

        if state.phase.is_terminal() {
            break;
        }

        let Some(event) = machine::expected_response(state, catalog) else {
            state = machine::advance_local(state);
            continue;
        };

        let response = await_response(&mut rx, &event, response_timeout, state.phase, job_id).await?;

        if !response.success() {
            match ctx.settings.iot.device_error_policy {
                DeviceErrorPolicy::Fail => {
                    bail!("device reported failure for {event} during {}", state.phase.as_str());
                }
                DeviceErrorPolicy::Ignore => {
                    warn!("[{job_id}] device reported failure for {event}; continuing");
                }
            }
        }

        info!(
            "[{job_id}] {} completed, response: {}",
            state.phase.as_str(),
            response.payload
        );
        let (next, effects) = machine::on_response(state, response.payload, catalog);
        execute_effects(ctx, client, job_id, state, effects, &tx, &mut registered).await?;
        state = next;
    }

    info!("[{job_id}] harvest finished in phase {}", state.phase.as_str());
    Ok(())
}

/// Waits for the registered response event, dropping strays that slip in
/// between an unregister and the next register.
async fn await_response(
    rx: &mut mpsc::UnboundedReceiver<DeviceResponse>,
    event: &str,
    response_timeout: Duration,
    phase: HarvestPhase,
    job_id: &str,
) -> Result<DeviceResponse> {
    loop {
        match tokio::time::timeout(response_timeout, rx.recv()).await {
            Ok(Some(response)) if response.event == event => return Ok(response),
            Ok(Some(stray)) => {
                warn!("[{job_id}] dropping stray {} response", stray.event);
            }
            Ok(None) => bail!("device response channel closed during {}", phase.as_str()),
            Err(_) => bail!(
                "no {event} within {}s during {}",
                response_timeout.as_secs(),
                phase.as_str()
            ),
        }
    }
}

async fn execute_effects(
    ctx: &HarvestContext,
    client: &IotClient,
    job_id: &str,
    state: MachineState,
    effects: Vec<Effect>,
    tx: &mpsc::UnboundedSender<DeviceResponse>,
    registered: &mut Option<String>,
) -> Result<()> {
    for effect in effects {
        match effect {
            Effect::EnterPhase(phase) => {
                info!("[{job_id}] entering phase {}", phase.as_str());
                ctx.registry.enter_phase(job_id, phase);
            }
            Effect::AdvanceProgress { floor, ceiling } => {
                if ctx.settings.iot.simulate {
                    // One tick per time unit; the phase guard inside
                    // set_progress abandons the ramp if the job moved on.
                    for progress in floor..=ceiling {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        ctx.registry.set_progress(job_id, state.phase, progress);
                    }
                } else {
                    ctx.registry.set_progress(job_id, state.phase, ceiling);
                }
            }
            Effect::SetProgress(progress) => {
                ctx.registry.set_progress(job_id, state.phase, progress);
            }
            Effect::RecordResponse { phase, payload } => {
                ctx.registry.record_response(job_id, phase, payload);
            }
            Effect::AwaitResponse { event } => {
                if let Some(previous) = registered.take() {
                    client.unregister_response_callback(&previous);
                }
                let tx = tx.clone();
                client.register_response_callback(
                    &event,
                    Arc::new(move |response| {
                        let _ = tx.send(response);
                    }),
                );
                *registered = Some(event);
            }
            Effect::EmitCommand { event, payload } => {
                client.emit_event(&event, payload).await?;
            }
            Effect::ReleaseGateway => {
                if let Some(previous) = registered.take() {
                    client.unregister_response_callback(&previous);
                }
                client.close().await;
            }
            Effect::SubmitYieldMetric => {
                submit_yield(ctx, job_id).await;
            }
        }
    }
    Ok(())
}

/// Records the synthesized honey yield. Failures here are logged and
/// never demote a completed job.
async fn submit_yield(ctx: &HarvestContext, job_id: &str) {
    let Some(job) = ctx.registry.get(job_id) else {
        return;
    };
    let data_type_id = &ctx.settings.harvest.data_type_id;
    let Some(profile) = ctx.settings.metrics.profiles.get(data_type_id) else {
        warn!("[{job_id}] no metric profile for {data_type_id}; yield not recorded");
        return;
    };

    let record = MetricRecord {
        datetime: metrics::now_iso_millis(),
        data_type_id: data_type_id.clone(),
        beehive_id: Some(job.beehive_id.clone()),
        value: metrics::harvest_yield(profile),
    };
    info!("[{job_id}] honey harvested: {} at {}", record.value, record.datetime);
    if let Err(e) = ctx.sink.save_metrics(vec![record]).await {
        warn!("[{job_id}] failed to submit harvest metrics: {e:#}");
    }
}
