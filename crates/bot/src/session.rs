//! Per-user two-step command sessions
//!
//! `/add`, `/suspend` and `/resume` may arrive without an argument; the bot
//! then waits for the next message from that user to carry the profile name.
//! Sessions live in memory only and expire, so an abandoned prompt cannot
//! swallow an unrelated message later.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use wgaccess_common::types::ChatId;

/// How often the sweeper prunes expired prompts
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Verb waiting for its profile-name argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    AddProfile,
    SuspendProfile,
    ResumeProfile,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    action: PendingAction,
    expires_at: Instant,
}

/// Volatile per-user session table
#[derive(Clone)]
pub struct Sessions {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<ChatId, PendingEntry>>>,
}

impl Sessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Arm a pending prompt for the user, replacing any previous one
    pub fn begin(&self, chat_id: ChatId, action: PendingAction) {
        let entry = PendingEntry {
            action,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.lock().insert(chat_id, entry);
    }

    /// Consume the user's pending prompt, if it has not expired
    pub fn take(&self, chat_id: ChatId) -> Option<PendingAction> {
        let entry = self.entries.lock().remove(&chat_id)?;
        if entry.expires_at <= Instant::now() {
            debug!("Dropping expired session for chat {}", chat_id);
            return None;
        }
        Some(entry.action)
    }

    /// Drop every expired prompt; returns how many were dropped
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

/// Background loop pruning expired sessions
pub async fn sweeper(sessions: Sessions) {
    loop {
        tokio::time::sleep(SWEEP_INTERVAL).await;
        let dropped = sessions.sweep();
        if dropped > 0 {
            debug!("Swept {} expired sessions", dropped);
        }
    }
}
