//! Bounded per-session conversation logs.
//!
//! The store is created once at startup and shared behind an `Arc`. A
//! map-level lock guards session creation and removal; each session has its
//! own mutex so writers on different sessions never contend on a log.

use crate::models::{Exchange, Response};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Maximum number of exchanges kept per session.
pub const MAX_EXCHANGES: usize = 5;

#[derive(Debug)]
struct SessionLog {
    exchanges: VecDeque<Exchange>,
    last_active: Instant,
}

impl SessionLog {
    fn new() -> Self {
        Self {
            exchanges: VecDeque::with_capacity(MAX_EXCHANGES + 1),
            last_active: Instant::now(),
        }
    }
}

/// In-memory conversation store keyed by session id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionLog>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, session_id: &str) -> Option<Arc<Mutex<SessionLog>>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    fn log_or_create(&self, session_id: &str) -> Arc<Mutex<SessionLog>> {
        if let Some(log) = self.log(session_id) {
            return log;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("Creating session {}", session_id);
                Arc::new(Mutex::new(SessionLog::new()))
            })
            .clone()
    }

    /// Returns the session's exchanges, oldest first. Unknown ids yield an
    /// empty history.
    pub fn get_history(&self, session_id: &str) -> Vec<Exchange> {
        let Some(log) = self.log(session_id) else {
            return Vec::new();
        };

        let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
        log.last_active = Instant::now();
        log.exchanges.iter().cloned().collect()
    }

    /// Records an exchange, keeping only the most recent [`MAX_EXCHANGES`].
    pub fn append(&self, session_id: &str, query: &str, response: Response) {
        let log = self.log_or_create(session_id);
        let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);

        log.exchanges.push_back(Exchange::new(query, response));
        while log.exchanges.len() > MAX_EXCHANGES {
            log.exchanges.pop_front();
        }
        log.last_active = Instant::now();

        debug!(
            "Session {} now holds {} exchanges",
            session_id,
            log.exchanges.len()
        );
    }

    /// Drops all history for a session. Unknown ids are ignored.
    pub fn clear(&self, session_id: &str) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);

        if removed.is_some() {
            debug!("Cleared session {}", session_id);
        }
    }

    /// Removes sessions idle for longer than `max_idle`. Returns how many
    /// were evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();

        sessions.retain(|_, log| {
            let log = log.lock().unwrap_or_else(PoisonError::into_inner);
            log.last_active.elapsed() < max_idle
        });

        before - sessions.len()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Spawns a task that periodically evicts idle sessions.
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    max_idle: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = store.evict_idle(max_idle);
            if evicted > 0 {
                info!("Evicted {} idle sessions", evicted);
            }
        }
    })
}
