use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::models::ConversationState;

/// Per-session dialogue state, keyed by the caller's session id.
pub trait SessionStore: Send + Sync {
    /// Returns the session's state, creating an idle entry on first sight.
    fn get(&self, session_id: &str) -> ConversationState;
    fn set(&self, session_id: &str, state: ConversationState);
    /// Forgets the session entirely. Unknown ids are a no-op.
    fn clear(&self, session_id: &str);
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, ConversationState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: &str) -> ConversationState {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.entry(session_id.to_string()).or_default().clone()
    }

    fn set(&self, session_id: &str, state: ConversationState) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session_id.to_string(), state);
    }

    fn clear(&self, session_id: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }
}

/// Hands out one async mutex per session id so turns for the same session
/// run one at a time. Entries nobody holds or waits on are dropped on the
/// next acquire.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Only the map itself references an idle lock.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::SlotDraft;

    #[test]
    fn test_get_creates_idle_once() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.get("abc"), ConversationState::Idle);
        assert_eq!(store.get("abc"), ConversationState::Idle);
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn test_set_then_clear() {
        let store = InMemorySessionStore::new();
        let state = ConversationState::AwaitingBookSlot(SlotDraft {
            doctor: Some("Dr. Lee".to_string()),
            datetime: None,
        });
        store.set("abc", state.clone());
        assert_eq!(store.get("abc"), state);

        store.clear("abc");
        assert_eq!(store.session_count(), 0);
        assert_eq!(store.get("abc"), ConversationState::Idle);

        store.clear("never-seen");
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn test_cleared_sessions_do_not_accumulate() {
        let store = InMemorySessionStore::new();
        for i in 0..1000 {
            let id = format!("session-{i}");
            store.get(&id);
            store.clear(&id);
        }
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = SessionLocks::new();
        for i in 0..100 {
            let _turn = locks.acquire(&format!("session-{i}")).await;
        }
        // Each acquire prunes every earlier, already released entry.
        assert_eq!(locks.len(), 1);

        let held = locks.acquire("busy").await;
        let other = locks.acquire("other").await;
        assert_eq!(locks.len(), 2);

        drop(held);
        drop(other);
        let _last = locks.acquire("last").await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_same_session_turns_serialize() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire("s1").await;

        let other = locks.clone();
        let mut waiting = tokio::spawn(async move {
            let _g = other.acquire("s1").await;
        });
        let blocked = tokio::time::timeout(Duration::from_millis(50), &mut waiting).await;
        assert!(blocked.is_err(), "second turn must wait for the first");

        // A different session is not held up.
        let _g2 = tokio::time::timeout(Duration::from_millis(50), locks.acquire("s2"))
            .await
            .unwrap();

        drop(guard);
        waiting.await.unwrap();
    }
}
