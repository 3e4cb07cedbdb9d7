//! In-memory session store.
//!
//! Sessions live in a single `RwLock<HashMap>`; every operation takes the
//! lock once, so each call is atomic with respect to its session id and
//! concurrent appends to the same session keep arrival order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::LlmError;
use crate::types::{Message, Role, Session, SessionSummary};

/// Owner of every live [`Session`].
///
/// Reads hand out clones; the transcript is only ever mutated here.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    timeout: Duration,
}

static_assertions::assert_impl_all!(SessionStore: Send, Sync);

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Allocate a new empty session and return its id.
    pub async fn create(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session::new(session_id.clone(), Utc::now());
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session);
        tracing::debug!(session_id = %session_id, "Session created");
        session_id
    }

    /// Fetch a session, refreshing its activity timestamp.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id)?;
        session.touch(Utc::now());
        Some(session.clone())
    }

    /// Whether `session_id` names a live session. Does not touch activity.
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Append a message and return the updated session.
    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> Result<Session, LlmError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| LlmError::SessionNotFound(session_id.to_string()))?;

        let message = Message::new(role, content);
        session.touch(message.timestamp);
        session.conversation_history.push(message);
        Ok(session.clone())
    }

    /// Remove a session. Returns whether it existed.
    pub async fn delete(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::debug!(session_id = %session_id, "Session deleted");
        }
        removed
    }

    /// Remove every session idle for longer than the timeout as of `now`.
    ///
    /// Returns the number of sessions removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let timeout = self.timeout;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            // Activity stamped after `now` counts as zero idle time.
            let idle = (now - session.last_activity).to_std().unwrap_or(Duration::ZERO);
            idle <= timeout
        });
        before - sessions.len()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Summaries of every live session, oldest first. Does not touch activity.
    pub async fn snapshot_all(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> =
            sessions.values().map(SessionSummary::from).collect();
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        summaries
    }
}

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Run [`SessionStore::sweep`] every `interval` until the handle is aborted.
///
/// Intervals shorter than a millisecond are raised to one.
pub fn spawn_sweeper(store: Arc<SessionStore>, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep(Utc::now()).await;
            if removed > 0 {
                let remaining = store.count().await;
                tracing::info!(removed, remaining, "Cleaned up expired sessions");
            }
        }
    })
}
