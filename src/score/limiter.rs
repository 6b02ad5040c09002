// src/score/limiter.rs
//! Rate limiting for the reasoning service.
//!
//! The limiter is an explicit handle owned by the model client and injected
//! at construction; tests swap in [`Unlimited`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cancel::{CancelToken, Cancelled};

/// Free tier of the scoring API: 15 requests per minute.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(4);
pub const DEFAULT_BURST: u32 = 1;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Suspend until a request slot is available or `cancel` fires.
    async fn acquire(&self, cancel: &CancelToken) -> Result<(), Cancelled>;
}

/// Never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn acquire(&self, cancel: &CancelToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }
}

/// Token bucket: one token per `interval`, holding at most `burst` tokens.
/// Starts full.
pub struct IntervalLimiter {
    interval: Duration,
    burst: f64,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

impl IntervalLimiter {
    pub fn new(interval: Duration, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            interval,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    /// 15 RPM with a burst of one.
    pub fn per_minute_default() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_BURST)
    }

    /// Take a token if one is available, otherwise report how long to wait.
    async fn try_take(&self) -> Result<(), Duration> {
        let mut b = self.bucket.lock().await;
        let now = Instant::now();
        if !self.interval.is_zero() {
            let refill = now.duration_since(b.last).as_secs_f64() / self.interval.as_secs_f64();
            b.tokens = (b.tokens + refill).min(self.burst);
        } else {
            b.tokens = self.burst;
        }
        b.last = now;

        if b.tokens >= 1.0 {
            b.tokens -= 1.0;
            Ok(())
        } else {
            Err(self.interval.mul_f64(1.0 - b.tokens))
        }
    }
}

#[async_trait]
impl RateLimiter for IntervalLimiter {
    async fn acquire(&self, cancel: &CancelToken) -> Result<(), Cancelled> {
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            match self.try_take().await {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter wait");
                    cancel.sleep(wait).await?;
                }
            }
        }
    }
}
