//! Serializes pipeline runs per config and per subreddit.

use crate::pipeline::DispatchPipeline;
use async_trait::async_trait;
use relay_core::{ConfigId, ConfigStore, CoreError, RunOutcome, SourceConfig};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Work the scheduler fires for a config id.
#[async_trait]
pub trait SourceJob: Send + Sync {
    async fn run_source(&self, config_id: ConfigId) -> Result<RunOutcome, CoreError>;
}

/// Config ids and lower-cased subreddit names with a run in progress.
#[derive(Debug, Default)]
struct InFlight {
    configs: HashSet<ConfigId>,
    subreddits: HashSet<String>,
}

type InFlightSet = Arc<Mutex<InFlight>>;

fn lock(set: &InFlightSet) -> MutexGuard<'_, InFlight> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn subreddit_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Releases the config and its subreddit when the run ends, including on
/// panic or cancel.
struct InFlightGuard {
    set: InFlightSet,
    config_id: ConfigId,
    subreddit: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = lock(&self.set);
        in_flight.configs.remove(&self.config_id);
        in_flight.subreddits.remove(&self.subreddit);
    }
}

pub struct PipelineRunner {
    pipeline: Arc<DispatchPipeline>,
    store: Arc<dyn ConfigStore>,
    in_flight: InFlightSet,
}

impl PipelineRunner {
    pub fn new(pipeline: Arc<DispatchPipeline>, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            pipeline,
            store,
            in_flight: Arc::new(Mutex::new(InFlight::default())),
        }
    }

    pub fn is_running(&self, config_id: ConfigId) -> bool {
        lock(&self.in_flight).configs.contains(&config_id)
    }

    /// Whether any config for `subreddit` is being dispatched.
    pub fn is_subreddit_busy(&self, subreddit: &str) -> bool {
        lock(&self.in_flight)
            .subreddits
            .contains(&subreddit_key(subreddit))
    }

    fn claim(&self, config: &SourceConfig) -> Result<InFlightGuard, CoreError> {
        let subreddit = subreddit_key(&config.subreddit_name);
        let mut in_flight = lock(&self.in_flight);
        if in_flight.configs.contains(&config.id) || in_flight.subreddits.contains(&subreddit) {
            return Err(CoreError::RunInProgress {
                config_id: config.id,
            });
        }
        in_flight.configs.insert(config.id);
        in_flight.subreddits.insert(subreddit.clone());
        Ok(InFlightGuard {
            set: self.in_flight.clone(),
            config_id: config.id,
            subreddit,
        })
    }

    /// Runs the pipeline unless another run for the same config, or for
    /// another config on the same subreddit, is in flight.
    pub async fn run_config(&self, config: &SourceConfig) -> Result<RunOutcome, CoreError> {
        let _guard = self.claim(config)?;
        self.pipeline.run(config).await
    }
}

#[async_trait]
impl SourceJob for PipelineRunner {
    /// Loads the current config so edits made since scheduling take effect.
    async fn run_source(&self, config_id: ConfigId) -> Result<RunOutcome, CoreError> {
        let config = self
            .store
            .get_config(config_id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                resource: format!("config {}", config_id),
            })?;

        if !config.is_active {
            debug!("Config {} is inactive, not running", config_id);
            return Err(CoreError::InvalidInput {
                message: format!("config {} is inactive", config_id),
            });
        }

        self.run_config(&config).await
    }
}
