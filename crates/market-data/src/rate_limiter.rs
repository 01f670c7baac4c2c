use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Shared pacing budget for upstream calls.
///
/// Enforces both a minimum delay between consecutive calls and a
/// sliding-window cap (at most `max_requests` per `window`). Clones share
/// the same budget, so every in-flight fetch goes through one gate.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, min_interval: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
            min_interval,
        }
    }

    /// `max_per_minute` over a 60s window plus a minimum spacing.
    pub fn per_minute(max_per_minute: usize, min_interval: Duration) -> Self {
        Self::new(max_per_minute, Duration::from_secs(60), min_interval)
    }

    /// No pacing at all (tests, cached replays).
    pub fn unlimited() -> Self {
        Self::new(usize::MAX, Duration::from_secs(1), Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a call slot is free, then claim it.
    pub async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            let mut wait = Duration::ZERO;

            if let Some(&last) = ts.back() {
                let since_last = now.duration_since(last);
                if since_last < self.min_interval {
                    wait = self.min_interval - since_last;
                }
            }

            if ts.len() >= self.max_requests {
                if let Some(&oldest) = ts.front() {
                    let window_wait = (oldest + self.window).saturating_duration_since(now);
                    wait = wait.max(window_wait);
                }
            }

            if wait.is_zero() {
                ts.push_back(now);
                return;
            }

            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.2}s for upstream slot", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}
