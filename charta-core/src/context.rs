//! Per-session conversation context for the chat endpoint.
//!
//! Append-only transcript per session id, capped at the most recent
//! [`MAX_ENTRIES`] utterances. Session keys themselves are never evicted;
//! growth is bounded only by the number of distinct sessions a deployment sees.

use std::collections::HashMap;
use std::sync::Mutex;

/// Utterances kept per session (5 exchanges).
pub const MAX_ENTRIES: usize = 10;

/// Utterances included when building a prompt.
pub const CONTEXT_WINDOW: usize = 5;

/// Process-wide conversation store, synchronized for concurrent handlers.
#[derive(Default)]
pub struct ConversationStore {
    sessions: Mutex<HashMap<String, Vec<String>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent [`CONTEXT_WINDOW`] utterances for a session.
    pub fn recent(&self, session_id: &str) -> Vec<String> {
        let sessions = self.sessions.lock().expect("conversation lock poisoned");
        sessions
            .get(session_id)
            .map(|entries| {
                let start = entries.len().saturating_sub(CONTEXT_WINDOW);
                entries[start..].to_vec()
            })
            .unwrap_or_default()
    }

    /// Append a user/assistant exchange, trimming to the last [`MAX_ENTRIES`].
    pub fn append_exchange(&self, session_id: &str, input: &str, reply: &str) {
        let mut sessions = self.sessions.lock().expect("conversation lock poisoned");
        let entries = sessions.entry(session_id.to_string()).or_default();
        entries.push(format!("User: {input}"));
        entries.push(format!("Assistant: {reply}"));
        if entries.len() > MAX_ENTRIES {
            entries.drain(..entries.len() - MAX_ENTRIES);
        }
    }

    /// Forget one session.
    pub fn clear(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("conversation lock poisoned");
        sessions.remove(session_id);
    }

    /// Forget everything.
    pub fn reset(&self) {
        let mut sessions = self.sessions.lock().expect("conversation lock poisoned");
        sessions.clear();
    }
}
