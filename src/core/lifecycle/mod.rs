use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::JobScheduler;
use tracing::{info, warn};

#[derive(Debug, PartialEq)]
pub enum LifecycleState {
    Init,
    Ready,
    Shutdown,
}

#[async_trait::async_trait]
pub trait LifecycleComponent {
    async fn on_init(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Boots the service's components in order and owns the shared cron
/// scheduler for recurring jobs.
pub struct LifecycleManager {
    state: LifecycleState,
    components: Vec<Arc<Mutex<dyn LifecycleComponent + Send + Sync>>>,
    pub scheduler: JobScheduler,
}

impl LifecycleManager {
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            state: LifecycleState::Init,
            components: Vec::new(),
            scheduler,
        })
    }

    pub fn attach(&mut self, component: Arc<Mutex<dyn LifecycleComponent + Send + Sync>>) {
        self.components.push(component);
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("lifecycle phase: init");
        self.state = LifecycleState::Init;
        for component in &self.components {
            component.lock().await.on_init().await?;
        }

        info!("lifecycle phase: start");
        for component in &self.components {
            component.lock().await.on_start().await?;
        }
        self.scheduler.start().await?;

        self.state = LifecycleState::Ready;
        info!("lifecycle phase: ready");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        info!("lifecycle phase: shutdown");
        self.state = LifecycleState::Shutdown;
        if let Err(e) = self.scheduler.shutdown().await {
            warn!("scheduler shutdown failed: {e}");
        }
        for component in self.components.iter().rev() {
            if let Err(e) = component.lock().await.on_shutdown().await {
                warn!("component shutdown failed: {e:#}");
            }
        }
        Ok(())
    }
}
