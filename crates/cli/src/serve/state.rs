//! Application state and rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use bobbin_storage::{MemoryStore, WorkflowService};
use tokio::sync::Mutex;

use super::RATE_LIMIT_WINDOW_SECS;

/// Per-IP request tracker: (request count, window start time).
type IpTracker = HashMap<IpAddr, (u64, Instant)>;

/// In-memory per-IP rate limiter.
pub(crate) struct RateLimiter {
    tracker: Mutex<IpTracker>,
    /// Maximum requests per window.
    pub(crate) max_requests: u64,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u64) -> Self {
        Self {
            tracker: Mutex::new(HashMap::new()),
            max_requests,
        }
    }

    /// Returns `Err(retry_after_secs)` once `ip` has used up its window.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), u64> {
        let mut tracker = self.tracker.lock().await;
        tracker.retain(|_, (_, started)| {
            now.saturating_duration_since(*started).as_secs() < RATE_LIMIT_WINDOW_SECS
        });

        let entry = tracker.entry(ip).or_insert((0, now));
        let elapsed = now.saturating_duration_since(entry.1).as_secs();

        entry.0 += 1;
        if entry.0 > self.max_requests {
            Err(RATE_LIMIT_WINDOW_SECS.saturating_sub(elapsed))
        } else {
            Ok(())
        }
    }
}

/// Application state shared across request handlers.
pub(crate) struct AppState {
    pub(crate) workflows: WorkflowService<MemoryStore>,
    /// Workflow code served by the legacy `/workflow/orders` routes.
    pub(crate) order_workflow: String,
    pub(crate) rate_limiter: RateLimiter,
    /// None = no auth required.
    pub(crate) api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test]
    async fn limits_within_a_window() {
        let limiter = RateLimiter::new(2);
        let now = Instant::now();
        assert!(limiter.check_at(ip(1), now).await.is_ok());
        assert!(limiter.check_at(ip(1), now).await.is_ok());
        assert_eq!(
            limiter.check_at(ip(1), now).await,
            Err(RATE_LIMIT_WINDOW_SECS)
        );
        assert!(limiter.check_at(ip(2), now).await.is_ok());

        let next_window = now + Duration::from_secs(RATE_LIMIT_WINDOW_SECS);
        assert!(limiter.check_at(ip(1), next_window).await.is_ok());
    }

    #[tokio::test]
    async fn expired_windows_are_evicted() {
        let limiter = RateLimiter::new(10);
        let now = Instant::now();
        for last in 1..=5 {
            limiter.check_at(ip(last), now).await.unwrap();
        }
        assert_eq!(limiter.tracker.lock().await.len(), 5);

        let later = now + Duration::from_secs(RATE_LIMIT_WINDOW_SECS + 1);
        limiter.check_at(ip(9), later).await.unwrap();
        let tracker = limiter.tracker.lock().await;
        assert_eq!(tracker.len(), 1);
        assert!(tracker.contains_key(&ip(9)));
    }
}
