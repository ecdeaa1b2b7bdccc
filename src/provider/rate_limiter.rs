//! Process-wide pacing clock: no two outbound calls leave less than `1/R`
//! apart, where `R` is the configured requests-per-second. Shared across
//! every analysis using the same [`crate::provider::http::HttpProvider`],
//! per the shared-resource policy (a single critical section, contention
//! bounded by `fetch_parallelism * num_concurrent_analyses`).

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let safe_rps = if requests_per_second <= 0.0 {
            1.0
        } else {
            requests_per_second
        };
        RateLimiter {
            min_interval: Duration::from_secs_f64(1.0 / safe_rps),
            last_call: Mutex::new(None),
        }
    }

    /// Blocks the caller, if needed, so that this call leaves at least
    /// `min_interval` after the previous one. Holding the lock across the
    /// wait serializes callers, which is what keeps the pacing exact under
    /// concurrent fetches.
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}
