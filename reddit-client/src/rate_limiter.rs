//! Client-side pacing for Reddit's OAuth request budget.

use relay_core::CoreError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window: Duration,
    /// Requests that may start back to back, and the cap on requests in flight.
    pub burst: u32,
}

impl RateLimitConfig {
    /// 100 requests per minute for OAuth clients.
    pub fn reddit_oauth() -> Self {
        Self {
            requests_per_window: 100,
            window: Duration::from_secs(60),
            burst: 10,
        }
    }

    fn refill_per_second(&self) -> f64 {
        f64::from(self.requests_per_window) / self.window.as_secs_f64()
    }
}

#[derive(Debug)]
struct Budget {
    tokens: f64,
    refilled_at: Instant,
    /// Set when Reddit reports the budget as spent.
    blocked_until: Option<Instant>,
}

impl Budget {
    fn refill(&mut self, now: Instant, per_second: f64, capacity: f64) {
        let elapsed = now.duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * per_second).min(capacity);
        self.refilled_at = now;
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    budget: Mutex<Budget>,
    in_flight: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            budget: Mutex::new(Budget {
                tokens: f64::from(config.burst),
                refilled_at: Instant::now(),
                blocked_until: None,
            }),
            in_flight: Arc::new(Semaphore::new(config.burst as usize)),
            config,
        }
    }

    /// Takes one request from the budget, or says how long to wait for it.
    async fn try_take(&self) -> Option<Duration> {
        let mut budget = self.budget.lock().await;
        let now = Instant::now();

        if let Some(until) = budget.blocked_until {
            if until > now {
                return Some(until - now);
            }
            budget.blocked_until = None;
        }

        let per_second = self.config.refill_per_second();
        budget.refill(now, per_second, f64::from(self.config.burst));
        if budget.tokens >= 1.0 {
            budget.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - budget.tokens) / per_second))
        }
    }

    pub async fn acquire_permit(&self) -> Result<RateLimitPermit, CoreError> {
        let started = Instant::now();
        let permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CoreError::Internal {
                message: "Rate limiter closed".to_string(),
            })?;

        while let Some(wait) = self.try_take().await {
            debug!("Reddit request budget spent, waiting {:?}", wait);
            sleep(wait).await;
        }

        Ok(RateLimitPermit {
            _permit: permit,
            waited: started.elapsed(),
        })
    }

    /// Applies Reddit's `x-ratelimit-remaining` and `x-ratelimit-reset` values.
    pub async fn observe_remaining(&self, remaining: f64, reset_after: Duration) {
        let mut budget = self.budget.lock().await;
        budget.tokens = budget.tokens.min(remaining.max(0.0));
        if remaining < 1.0 {
            warn!("Reddit reports no requests left, pausing for {:?}", reset_after);
            budget.blocked_until = Some(Instant::now() + reset_after);
        }
    }

    pub async fn status(&self) -> RateLimitStatus {
        let mut budget = self.budget.lock().await;
        budget.refill(
            Instant::now(),
            self.config.refill_per_second(),
            f64::from(self.config.burst),
        );
        RateLimitStatus {
            available_tokens: budget.tokens as u32,
            max_tokens: self.config.burst,
            available_permits: self.in_flight.available_permits(),
            requests_per_window: self.config.requests_per_window,
        }
    }
}

#[derive(Debug)]
pub struct RateLimitPermit {
    _permit: OwnedSemaphorePermit,
    pub waited: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub available_tokens: u32,
    pub max_tokens: u32,
    pub available_permits: usize,
    pub requests_per_window: u32,
}
