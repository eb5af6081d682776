use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::communication_channel::ChatId;

/// Where a chat currently is in a multi-step dialogue. Idle chats have no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStep {
    AwaitingGroup,
    AwaitingUser { group_id: i64 },
    AwaitingPostLink,
}

/// Per-chat dialogue state.
pub trait SessionStore: Send + Sync {
    fn get(&self, chat: ChatId) -> Option<ConversationStep>;

    fn set(&self, chat: ChatId, step: ConversationStep);

    fn clear(&self, chat: ChatId);

    /// Drops every session idle for at least the store's TTL. Returns how many were dropped.
    fn purge_expired(&self) -> usize;
}

struct SessionEntry {
    step: ConversationStep,
    touched_at: DateTime<Utc>,
}

pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<ChatId, SessionEntry>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChatId, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &SessionEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.touched_at) >= self.ttl
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, chat: ChatId) -> Option<ConversationStep> {
        let now = Utc::now();
        let mut sessions = self.lock();
        let expired = self.is_expired(sessions.get(&chat)?, now);
        if expired {
            sessions.remove(&chat);
            return None;
        }
        sessions.get(&chat).map(|entry| entry.step)
    }

    fn set(&self, chat: ChatId, step: ConversationStep) {
        self.lock().insert(
            chat,
            SessionEntry {
                step,
                touched_at: Utc::now(),
            },
        );
    }

    fn clear(&self, chat: ChatId) {
        self.lock().remove(&chat);
    }

    fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| !self.is_expired(entry, now));
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_clears_steps_per_chat() {
        let store = InMemorySessionStore::new(Duration::minutes(30));
        store.set(ChatId(1), ConversationStep::AwaitingGroup);
        store.set(ChatId(2), ConversationStep::AwaitingUser { group_id: -100 });

        assert_eq!(store.get(ChatId(1)), Some(ConversationStep::AwaitingGroup));
        assert_eq!(store.get(ChatId(2)), Some(ConversationStep::AwaitingUser { group_id: -100 }));
        assert_eq!(store.get(ChatId(3)), None);

        store.clear(ChatId(1));
        assert_eq!(store.get(ChatId(1)), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn set_replaces_previous_step() {
        let store = InMemorySessionStore::new(Duration::minutes(30));
        store.set(ChatId(1), ConversationStep::AwaitingUser { group_id: -5 });
        store.set(ChatId(1), ConversationStep::AwaitingPostLink);
        assert_eq!(store.get(ChatId(1)), Some(ConversationStep::AwaitingPostLink));
    }

    #[test]
    fn expired_sessions_read_as_idle() {
        let store = InMemorySessionStore::new(Duration::zero());
        store.set(ChatId(1), ConversationStep::AwaitingGroup);
        assert_eq!(store.get(ChatId(1)), None);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn purge_drops_only_stale_sessions() {
        let fresh = InMemorySessionStore::new(Duration::hours(1));
        fresh.set(ChatId(1), ConversationStep::AwaitingGroup);
        assert_eq!(fresh.purge_expired(), 0);
        assert_eq!(fresh.len(), 1);

        let stale = InMemorySessionStore::new(Duration::zero());
        stale.set(ChatId(1), ConversationStep::AwaitingGroup);
        stale.set(ChatId(2), ConversationStep::AwaitingPostLink);
        assert_eq!(stale.purge_expired(), 2);
        assert_eq!(stale.len(), 0);
    }
}
