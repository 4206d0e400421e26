//! Sliding-window rate limiting per session
//!
//! Each session keeps the timestamps of its accepted requests inside the
//! window. Stale entries are pruned on every check, so the sequence never
//! holds more than `max_requests` entries.

use crate::config::RateLimitConfig;
use crate::session::{Session, SessionStore};
use chrono::{DateTime, Utc};
use tracing::debug;

pub struct RateLimiter {
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Check and record a request for a session already held by the caller
    pub fn check(&self, session: &mut Session, now: DateTime<Utc>) -> bool {
        let window = self.config.window;
        let session_id = session.session_id().to_string();
        let timestamps = session.request_timestamps_mut();

        // Future timestamps (clock moved backwards) are kept as in-window.
        timestamps.retain(|ts| {
            (now - *ts)
                .to_std()
                .map(|age| age < window)
                .unwrap_or(true)
        });

        if timestamps.len() >= self.config.max_requests {
            debug!(
                session_id = %session_id,
                in_window = timestamps.len(),
                max_requests = self.config.max_requests,
                "Rate limit exceeded"
            );
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Lock the session and check it
    pub async fn allow(&self, store: &SessionStore, session_id: &str) -> bool {
        let now = store.now();
        let mut session = store.acquire(session_id).await;
        self.check(&mut session, now)
    }
}
