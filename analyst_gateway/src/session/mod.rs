//! Session store
//!
//! Process-wide table of per-session trust and usage state. The table lock is
//! only held long enough to look up or insert a record; each record sits
//! behind its own async mutex, so requests for one session are serialized
//! while different sessions never wait on each other.

pub mod clock;
pub mod transcript;

pub use clock::{Clock, ManualClock, SystemClock};
pub use transcript::{MessageRole, Transcript, TranscriptEntry};

use crate::config::GatewayConfig;
use crate::models::SessionInfo;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Exclusive handle on one session, held for the duration of a request
pub type SessionGuard = OwnedMutexGuard<Session>;

/// Trust and usage state of one conversation
#[derive(Debug, Clone)]
pub struct Session {
    session_id: String,
    message_count: u64,
    warning_count: u64,
    is_blocked: bool,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    request_timestamps: VecDeque<DateTime<Utc>>,
    transcript: Transcript,
    focus_entity: Option<String>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>, transcript_limit: usize) -> Self {
        Self {
            session_id: session_id.into(),
            message_count: 0,
            warning_count: 0,
            is_blocked: false,
            created_at: now,
            last_activity: now,
            request_timestamps: VecDeque::new(),
            transcript: Transcript::new(transcript_limit),
            focus_entity: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn warning_count(&self) -> u64 {
        self.warning_count
    }

    pub fn is_blocked(&self) -> bool {
        self.is_blocked
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn record_message(&mut self, now: DateTime<Utc>) {
        self.message_count += 1;
        self.last_activity = now;
    }

    /// Count a warning and block once `max_warnings` is reached.
    ///
    /// Warnings are capped at the message count, so a warning without a
    /// recorded message is not counted. Returns whether the session is now
    /// blocked.
    pub fn record_warning(&mut self, max_warnings: u32) -> bool {
        if self.warning_count < self.message_count {
            self.warning_count += 1;
        } else {
            debug!(
                session_id = %self.session_id,
                "Warning without a recorded message ignored"
            );
        }

        if !self.is_blocked && self.warning_count >= u64::from(max_warnings) {
            warn!(
                session_id = %self.session_id,
                warnings = self.warning_count,
                "Warning threshold reached, blocking session"
            );
            self.is_blocked = true;
        }

        self.is_blocked
    }

    pub fn block(&mut self) {
        self.is_blocked = true;
    }

    /// Back to the state of a brand-new session with the same id
    pub fn reset(&mut self, now: DateTime<Utc>) {
        let limit = self.transcript_limit();
        *self = Session::new(std::mem::take(&mut self.session_id), now, limit);
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            message_count: self.message_count,
            warnings: self.warning_count,
            is_blocked: self.is_blocked,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    fn transcript_limit(&self) -> usize {
        self.transcript.limit()
    }

    pub fn focus_entity(&self) -> Option<&str> {
        self.focus_entity.as_deref()
    }

    pub fn set_focus_entity(&mut self, entity: impl Into<String>) {
        self.focus_entity = Some(entity.into());
    }

    /// Rate-limiter bookkeeping; only the limiter touches this.
    pub(crate) fn request_timestamps_mut(&mut self) -> &mut VecDeque<DateTime<Utc>> {
        &mut self.request_timestamps
    }

    pub fn pending_request_count(&self) -> usize {
        self.request_timestamps.len()
    }
}

/// Table of sessions keyed by caller-supplied id
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    clock: Arc<dyn Clock>,
    max_warnings: u32,
    transcript_limit: usize,
    idle_ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>, config: &GatewayConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
            max_warnings: config.max_warnings,
            transcript_limit: config.transcript_limit,
            idle_ttl: config.session_idle_ttl,
        }
    }

    pub fn with_system_clock(config: &GatewayConfig) -> Self {
        Self::new(Arc::new(SystemClock), config)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn max_warnings(&self) -> u32 {
        self.max_warnings
    }

    async fn record(&self, session_id: &str) -> Arc<Mutex<Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(record) = sessions.get(session_id) {
                return Arc::clone(record);
            }
        }

        let mut sessions = self.sessions.write().await;
        let record = sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session_id = %session_id, "Creating session");
            Arc::new(Mutex::new(Session::new(
                session_id,
                self.clock.now(),
                self.transcript_limit,
            )))
        });
        Arc::clone(record)
    }

    async fn existing(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Lock a session (creating it if needed) for the whole of a request
    pub async fn acquire(&self, session_id: &str) -> SessionGuard {
        self.record(session_id).await.lock_owned().await
    }

    /// Snapshot of the session, creating it if needed
    pub async fn get_or_create(&self, session_id: &str) -> Session {
        self.acquire(session_id).await.clone()
    }

    pub async fn record_message(&self, session_id: &str) {
        let now = self.now();
        self.acquire(session_id).await.record_message(now);
    }

    /// Returns whether the session is blocked afterwards
    pub async fn record_warning(&self, session_id: &str) -> bool {
        self.acquire(session_id).await.record_warning(self.max_warnings)
    }

    pub async fn block(&self, session_id: &str) {
        self.acquire(session_id).await.block();
    }

    /// Reset a session to its initial state. Unknown ids are a no-op.
    pub async fn clear(&self, session_id: &str) {
        if let Some(record) = self.existing(session_id).await {
            let now = self.now();
            record.lock().await.reset(now);
            info!(session_id = %session_id, "Session cleared");
        }
    }

    /// Read-only snapshot; defaults for unknown ids
    pub async fn info(&self, session_id: &str) -> SessionInfo {
        match self.existing(session_id).await {
            Some(record) => record.lock().await.info(),
            None => SessionInfo::default(),
        }
    }

    /// Recent turns; empty for unknown ids
    pub async fn transcript(&self, session_id: &str) -> Vec<TranscriptEntry> {
        match self.existing(session_id).await {
            Some(record) => record.lock().await.transcript().entries().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions idle for longer than the configured TTL.
    ///
    /// Sessions with a request in flight are kept. Without a TTL this is a
    /// no-op. Returns the number of sessions removed.
    pub async fn evict_idle(&self) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };

        let now = self.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, record| match record.try_lock() {
            Ok(session) => !is_idle(session.last_activity(), now, ttl),
            Err(_) => true,
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }
}

fn is_idle(last_activity: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    (now - last_activity)
        .to_std()
        .map(|idle| idle >= ttl)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn store_with_clock(config: GatewayConfig) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (SessionStore::new(clock.clone(), &config), clock)
    }

    #[tokio::test]
    async fn test_unknown_session_info_is_default() {
        let (store, _) = store_with_clock(GatewayConfig::default());
        assert_eq!(store.info("nobody").await, SessionInfo::default());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_sessions_created_lazily() {
        let (store, _) = store_with_clock(GatewayConfig::default());
        let session = store.get_or_create("s1").await;
        assert_eq!(session.session_id(), "s1");
        assert_eq!(session.message_count(), 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_counters_and_threshold_block() {
        let mut config = GatewayConfig::default();
        config.max_warnings = 2;
        let (store, _) = store_with_clock(config);

        store.record_message("s1").await;
        assert!(!store.record_warning("s1").await);
        store.record_message("s1").await;
        assert!(store.record_warning("s1").await);

        let info = store.info("s1").await;
        assert_eq!(info.message_count, 2);
        assert_eq!(info.warnings, 2);
        assert!(info.is_blocked);
    }

    #[tokio::test]
    async fn test_warning_never_exceeds_messages() {
        let (store, _) = store_with_clock(GatewayConfig::default());
        store.record_warning("s1").await;
        store.record_message("s1").await;
        store.record_warning("s1").await;
        store.record_warning("s1").await;

        let info = store.info("s1").await;
        assert_eq!(info.message_count, 1);
        assert_eq!(info.warnings, 1);
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let (store, _) = store_with_clock(GatewayConfig::default());
        store.record_message("s1").await;
        store.record_warning("s1").await;
        store.block("s1").await;
        {
            let mut session = store.acquire("s1").await;
            session.set_focus_entity("AAPL");
        }

        store.clear("s1").await;

        let session = store.get_or_create("s1").await;
        assert_eq!(session.info(), SessionInfo::default());
        assert!(session.focus_entity().is_none());
        assert_eq!(session.session_id(), "s1");
    }

    #[tokio::test]
    async fn test_clear_unknown_is_noop() {
        let (store, _) = store_with_clock(GatewayConfig::default());
        store.clear("ghost").await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let (store, _) = store_with_clock(GatewayConfig::default());
        let store = Arc::new(store);

        let guard = store.acquire("s1").await;

        let contender = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.record_message("s1").await })
        };

        // Another session is not held up by the lock on s1.
        tokio::time::timeout(std::time::Duration::from_secs(1), store.record_message("s2"))
            .await
            .expect("other session must not contend");

        tokio::task::yield_now().await;
        assert_eq!(guard.message_count(), 0);
        drop(guard);

        contender.await.unwrap();
        assert_eq!(store.info("s1").await.message_count, 1);
        assert_eq!(store.info("s2").await.message_count, 1);
    }

    #[tokio::test]
    async fn test_evict_idle_respects_ttl_and_locks() {
        let mut config = GatewayConfig::default();
        config.session_idle_ttl = Some(Duration::from_secs(60));
        let (store, clock) = store_with_clock(config);

        store.record_message("idle").await;
        store.record_message("busy").await;
        clock.advance(ChronoDuration::seconds(30));
        store.record_message("fresh").await;
        clock.advance(ChronoDuration::seconds(45));

        let busy = store.acquire("busy").await;
        assert_eq!(store.evict_idle().await, 1);
        drop(busy);

        assert_eq!(store.len().await, 2);
        assert_eq!(store.info("idle").await, SessionInfo::default());
        assert_eq!(store.info("fresh").await.message_count, 1);
    }

    #[tokio::test]
    async fn test_no_ttl_never_evicts() {
        let (store, clock) = store_with_clock(GatewayConfig::default());
        store.record_message("s1").await;
        clock.advance(ChronoDuration::days(30));
        assert_eq!(store.evict_idle().await, 0);
        assert_eq!(store.len().await, 1);
    }
}
