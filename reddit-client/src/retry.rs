//! Backoff and outage protection around Reddit calls.

use relay_core::{CoreError, ErrorExt, RedditApiError};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per call, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Extra random delay as a fraction of the backoff step (0.0 to 1.0).
    pub jitter_factor: f64,
    /// Calls that exhaust their retries in a row before Reddit is treated as down.
    pub outage_threshold: u32,
    /// How long calls are refused once an outage is detected.
    pub outage_cooldown: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
            outage_threshold: 5,
            outage_cooldown: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn reddit() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.2,
            outage_threshold: 3,
            outage_cooldown: Duration::from_secs(120),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Breaker {
    state: CircuitBreakerState,
    consecutive_outages: u32,
    opened_at: Option<Instant>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            consecutive_outages: 0,
            opened_at: None,
        }
    }

    /// Lets one trial call through once the cooldown has passed.
    fn admit(&mut self, cooldown: Duration) -> bool {
        match (self.state, self.opened_at) {
            (CircuitBreakerState::Open, Some(opened_at)) if opened_at.elapsed() >= cooldown => {
                debug!("Reddit cooldown elapsed, allowing a trial request");
                self.state = CircuitBreakerState::HalfOpen;
                true
            }
            (CircuitBreakerState::Open, _) => false,
            _ => true,
        }
    }

    fn cooldown_left(&self, cooldown: Duration) -> Duration {
        self.opened_at
            .map(|opened_at| cooldown.saturating_sub(opened_at.elapsed()))
            .unwrap_or(cooldown)
    }

    fn on_success(&mut self) {
        if self.state != CircuitBreakerState::Closed {
            info!("Reddit is reachable again");
        }
        *self = Self::new();
    }

    fn on_outage(&mut self, threshold: u32) {
        self.consecutive_outages += 1;
        let trips = self.state == CircuitBreakerState::HalfOpen
            || self.consecutive_outages >= threshold;
        if trips && self.state != CircuitBreakerState::Open {
            warn!(
                "Reddit looks unavailable after {} failed calls, pausing requests",
                self.consecutive_outages
            );
            self.state = CircuitBreakerState::Open;
            self.opened_at = Some(Instant::now());
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Backoff,
    Wait(Duration),
    GiveUp,
}

pub fn next_step(error: &CoreError) -> NextStep {
    match error {
        // The caller has dropped its token, so another attempt re-authenticates
        CoreError::RedditApi(RedditApiError::InvalidToken) => NextStep::Backoff,
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { .. }) => error
            .retry_after()
            .map(NextStep::Wait)
            .unwrap_or(NextStep::Backoff),
        e if e.is_retryable() => NextStep::Backoff,
        _ => NextStep::GiveUp,
    }
}

/// Doubles per attempt up to `max_delay`, plus up to `jitter_factor` extra.
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    let step = config
        .base_delay
        .saturating_mul(factor)
        .min(config.max_delay);

    let jitter_ms = (step.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = Duration::from_millis(fastrand::u64(0..=jitter_ms));

    (step + jitter).min(config.max_delay)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// Calls that needed more than one attempt and then succeeded.
    pub recovered_calls: u64,
    /// Calls that ended in an error.
    pub failed_calls: u64,
    /// Extra attempts across all calls.
    pub retries: u64,
    /// Calls refused while Reddit was marked unavailable.
    pub refused_calls: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs Reddit calls with backoff and pauses all calls during an outage.
///
/// Only failures that were worth retrying count towards an outage, so a
/// missing or private subreddit never blocks the other sources.
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    breaker: Mutex<Breaker>,
    stats: Mutex<RetryStats>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            breaker: Mutex::new(Breaker::new()),
            stats: Mutex::new(RetryStats::default()),
        }
    }

    /// Returns the first success, or the error of the last attempt unchanged.
    pub async fn execute<F, Fut, T>(&self, label: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        {
            let mut breaker = lock(&self.breaker);
            if !breaker.admit(self.config.outage_cooldown) {
                let left = breaker.cooldown_left(self.config.outage_cooldown);
                drop(breaker);
                lock(&self.stats).refused_calls += 1;
                warn!("Reddit marked unavailable, not running {}", label);
                return Err(RedditApiError::Unavailable {
                    retry_after: left.as_secs().max(1),
                }
                .into());
            }
        }

        let mut attempt: u32 = 0;
        loop {
            let error = match operation().await {
                Ok(value) => {
                    lock(&self.breaker).on_success();
                    if attempt > 0 {
                        let mut stats = lock(&self.stats);
                        stats.retries += u64::from(attempt);
                        stats.recovered_calls += 1;
                        info!("{} succeeded on attempt {}", label, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let step = next_step(&error);
            let out_of_attempts = attempt + 1 >= self.config.max_attempts;
            let delay = match step {
                NextStep::Wait(delay) if !out_of_attempts => delay,
                NextStep::Backoff if !out_of_attempts => backoff_delay(attempt, &self.config),
                _ => {
                    if step != NextStep::GiveUp {
                        lock(&self.breaker).on_outage(self.config.outage_threshold);
                    }
                    let mut stats = lock(&self.stats);
                    stats.retries += u64::from(attempt);
                    stats.failed_calls += 1;
                    warn!("{} failed after {} attempt(s): {}", label, attempt + 1, error);
                    return Err(error);
                }
            };

            debug!("{} failed ({}), retrying in {:?}", label, error, delay);
            sleep(delay).await;
            attempt += 1;
        }
    }

    pub fn stats(&self) -> RetryStats {
        *lock(&self.stats)
    }

    pub fn breaker_state(&self) -> CircuitBreakerState {
        lock(&self.breaker).state
    }
}
