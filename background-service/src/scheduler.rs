//! Recurring timers, one per active config.

use crate::runner::SourceJob;
use relay_core::{ConfigId, CoreError, ErrorExt, RunOutcome, SourceConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

struct ScheduledTimer {
    interval: Duration,
    handle: JoinHandle<()>,
}

type Timers = Mutex<HashMap<ConfigId, ScheduledTimer>>;

pub struct SourceScheduler {
    job: Arc<dyn SourceJob>,
    timers: Timers,
}

async fn fire(job: Arc<dyn SourceJob>, config_id: ConfigId) {
    match job.run_source(config_id).await {
        Ok(RunOutcome::Delivered { post_id }) => {
            info!("Run for config {} delivered post {}", config_id, post_id);
        }
        Ok(RunOutcome::NoEligibleContent) => {
            debug!("Run for config {} found nothing to send", config_id);
        }
        Err(CoreError::RunInProgress { .. }) => {
            debug!("Config {} is still running, skipping this tick", config_id);
        }
        Err(e) => {
            e.log_error();
        }
    }
}

impl SourceScheduler {
    pub fn new(job: Arc<dyn SourceJob>) -> Self {
        Self {
            job,
            timers: Mutex::new(HashMap::new()),
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<ConfigId, ScheduledTimer>> {
        self.timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a recurring timer, replacing any previous one for the id.
    ///
    /// The first tick fires one full interval from now. Each tick runs on its
    /// own task so cancelling the timer never interrupts a run.
    pub fn schedule(&self, config_id: ConfigId, interval: Duration) {
        let job = self.job.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                tokio::spawn(fire(job.clone(), config_id));
            }
        });

        let previous = self
            .timers()
            .insert(config_id, ScheduledTimer { interval, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
            info!(
                "Rescheduled config {} every {:?} (was {:?})",
                config_id, interval, previous.interval
            );
        } else {
            info!("Scheduled config {} every {:?}", config_id, interval);
        }
    }

    /// Cancels future firings. Returns whether a timer existed.
    pub fn unschedule(&self, config_id: ConfigId) -> bool {
        match self.timers().remove(&config_id) {
            Some(timer) => {
                timer.handle.abort();
                info!("Unscheduled config {}", config_id);
                true
            }
            None => false,
        }
    }

    /// Schedules `config` and starts one immediate run alongside the timer.
    pub fn activate(&self, config: &SourceConfig) -> JoinHandle<()> {
        self.schedule(config.id, config.interval());
        tokio::spawn(fire(self.job.clone(), config.id))
    }

    /// Runs a config right away and reports the result to the caller.
    pub async fn run_now(&self, config_id: ConfigId) -> Result<RunOutcome, CoreError> {
        self.job.run_source(config_id).await
    }

    pub fn is_scheduled(&self, config_id: ConfigId) -> bool {
        self.timers().contains_key(&config_id)
    }

    pub fn interval_of(&self, config_id: ConfigId) -> Option<Duration> {
        self.timers().get(&config_id).map(|timer| timer.interval)
    }

    pub fn scheduled_count(&self) -> usize {
        self.timers().len()
    }

    /// Cancels every timer. Runs already in progress finish on their own.
    pub fn shutdown(&self) {
        let mut timers = self.timers();
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
    }
}

impl Drop for SourceScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
