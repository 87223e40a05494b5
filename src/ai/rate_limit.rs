//! Sliding-window request limiter
//!
//! At most `max_requests` acquisitions in any rolling window. `acquire` waits
//! for the oldest slot to expire instead of failing.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

pub struct RateLimiter {
    /// None disables limiting
    max_requests: Option<usize>,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: Some(max_requests).filter(|m| *m > 0),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Limiter over a one-minute window; 0 means unlimited
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::new(requests_per_minute as usize, DEFAULT_WINDOW)
    }

    pub fn unlimited() -> Self {
        Self::new(0, DEFAULT_WINDOW)
    }

    /// Wait until a slot is free, then claim it
    pub async fn acquire(&self) {
        let Some(max) = self.max_requests else {
            return;
        };

        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    calls.pop_front();
                }

                if calls.len() < max {
                    calls.push_back(now);
                    return;
                }

                match calls.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            tracing::info!("Rate limit reached, waiting {:.1}s", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }

    /// Free slots in the current window
    #[cfg(test)]
    pub(crate) async fn remaining(&self) -> Option<usize> {
        let max = self.max_requests?;
        let calls = self.calls.lock().await;
        let now = Instant::now();
        let active = calls
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count();
        Some(max.saturating_sub(active))
    }
}
