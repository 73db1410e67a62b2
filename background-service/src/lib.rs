pub mod pipeline;
pub mod runner;
pub mod scheduler;

pub use pipeline::{format_caption, format_score, DispatchPipeline, DEFAULT_FETCH_LIMIT};
pub use runner::{PipelineRunner, SourceJob};
pub use scheduler::SourceScheduler;

use relay_core::{ConfigStore, CoreError};
use std::sync::Arc;
use tracing::info;

/// Owns the scheduler for the lifetime of the process.
pub struct BackgroundService {
    store: Arc<dyn ConfigStore>,
    scheduler: Arc<SourceScheduler>,
}

impl BackgroundService {
    pub fn new(store: Arc<dyn ConfigStore>, scheduler: Arc<SourceScheduler>) -> Self {
        Self { store, scheduler }
    }

    pub fn scheduler(&self) -> &Arc<SourceScheduler> {
        &self.scheduler
    }

    /// Registers timers for every active config. Nothing runs immediately.
    pub async fn start(&self) -> Result<usize, CoreError> {
        let configs = self.store.list_active_configs().await?;
        for config in &configs {
            self.scheduler.schedule(config.id, config.interval());
        }
        info!("Background service started with {} active sources", configs.len());
        Ok(configs.len())
    }

    pub fn stop(&self) {
        self.scheduler.shutdown();
        info!("Background service stopped");
    }
}
