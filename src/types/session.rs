use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chat::Message;

/// A server-held conversation transcript.
///
/// Instances handed out by the store are snapshots; mutation only happens
/// through [`SessionStore`](crate::session::SessionStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub conversation_history: Vec<Message>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            conversation_history: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn message_count(&self) -> usize {
        self.conversation_history.len()
    }

    /// Move `last_activity` forward, never backward.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}

/// Lightweight listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            message_count: session.message_count(),
            created_at: session.created_at,
            last_activity: session.last_activity,
        }
    }
}
