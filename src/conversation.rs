//! Bounded, TTL-evicting conversation history.
//!
//! A cache, not a durable store: process restart loses all history by
//! design. Entries are keyed by conversation id; an entry idle past the TTL
//! is evicted on access, and `create` runs an opportunistic capacity sweep
//! (expired entries first, then oldest-by-last-access until there is
//! headroom).
//!
//! The store is injected wherever it is needed rather than living in a
//! static; all interior mutability sits behind a single mutex with short
//! critical sections, so per-entry reads never race an in-flight append.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One question/answer exchange.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

/// All recorded turns of one conversation.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    pub conversation_id: Uuid,
    pub turns: Vec<ConversationTurn>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

struct Entry {
    history: ConversationHistory,
    last_access: Instant,
}

/// Thread-safe conversation cache with TTL and approximate-LRU eviction.
pub struct ConversationStore {
    inner: Mutex<HashMap<Uuid, Entry>>,
    max_conversations: usize,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(max_conversations: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_conversations,
            ttl,
        }
    }

    /// Start a new conversation and return its id.
    ///
    /// Runs the capacity sweep first: expired entries are purged, then the
    /// oldest-by-last-access entries are force-evicted until the new entry
    /// fits.
    pub fn create(&self) -> Uuid {
        let mut map = self.inner.lock().expect("conversation store poisoned");

        map.retain(|_, e| e.last_access.elapsed() < self.ttl);
        while map.len() >= self.max_conversations.max(1) {
            let oldest = map
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    map.remove(&id);
                }
                None => break,
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        map.insert(
            id,
            Entry {
                history: ConversationHistory {
                    conversation_id: id,
                    turns: Vec::new(),
                    created_at: now,
                    last_accessed_at: now,
                },
                last_access: Instant::now(),
            },
        );
        id
    }

    /// Fetch a conversation's history. An entry idle past the TTL is evicted
    /// and reported as absent.
    pub fn get(&self, id: &Uuid) -> Option<ConversationHistory> {
        let mut map = self.inner.lock().expect("conversation store poisoned");
        match map.get_mut(id) {
            Some(entry) if entry.last_access.elapsed() < self.ttl => {
                entry.last_access = Instant::now();
                entry.history.last_accessed_at = Utc::now();
                Some(entry.history.clone())
            }
            Some(_) => {
                map.remove(id);
                None
            }
            None => None,
        }
    }

    /// Append a turn. Returns false if the conversation is unknown or
    /// expired.
    pub fn add_turn(&self, id: &Uuid, question: &str, answer: &str) -> bool {
        let mut map = self.inner.lock().expect("conversation store poisoned");
        match map.get_mut(id) {
            Some(entry) if entry.last_access.elapsed() < self.ttl => {
                entry.history.turns.push(ConversationTurn {
                    question: question.to_string(),
                    answer: answer.to_string(),
                    timestamp: Utc::now(),
                });
                entry.last_access = Instant::now();
                entry.history.last_accessed_at = Utc::now();
                true
            }
            Some(_) => {
                map.remove(id);
                false
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("conversation store poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_TTL: Duration = Duration::from_secs(3600);

    #[test]
    fn create_get_add_turn_round_trip() {
        let store = ConversationStore::new(10, LONG_TTL);
        let id = store.create();

        let history = store.get(&id).unwrap();
        assert_eq!(history.conversation_id, id);
        assert!(history.turns.is_empty());

        assert!(store.add_turn(&id, "What is covered?", "Everything in scope."));
        assert!(store.add_turn(&id, "And exclusions?", "Listed in article 4."));

        let history = store.get(&id).unwrap();
        assert_eq!(history.turns.len(), 2);
        assert_eq!(history.turns[0].question, "What is covered?");
        assert_eq!(history.turns[1].answer, "Listed in article 4.");
    }

    #[test]
    fn unknown_id_is_absent() {
        let store = ConversationStore::new(10, LONG_TTL);
        assert!(store.get(&Uuid::new_v4()).is_none());
        assert!(!store.add_turn(&Uuid::new_v4(), "q", "a"));
    }

    #[test]
    fn expired_entry_is_evicted_on_get() {
        let store = ConversationStore::new(10, Duration::from_millis(30));
        let id = store.create();
        assert!(store.get(&id).is_some());

        std::thread::sleep(Duration::from_millis(50));
        assert!(store.get(&id).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn add_turn_on_expired_entry_fails() {
        let store = ConversationStore::new(10, Duration::from_millis(30));
        let id = store.create();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!store.add_turn(&id, "q", "a"));
    }

    #[test]
    fn capacity_sweep_evicts_oldest_by_last_access() {
        let store = ConversationStore::new(2, LONG_TTL);
        let first = store.create();
        std::thread::sleep(Duration::from_millis(5));
        let second = store.create();
        std::thread::sleep(Duration::from_millis(5));

        // Touch the first so the second becomes the eviction candidate.
        assert!(store.get(&first).is_some());
        std::thread::sleep(Duration::from_millis(5));

        let third = store.create();
        assert!(store.len() <= 2);
        assert!(store.get(&second).is_none());
        assert!(store.get(&first).is_some());
        assert!(store.get(&third).is_some());
    }

    #[test]
    fn create_purges_expired_before_force_evicting() {
        let store = ConversationStore::new(2, Duration::from_millis(30));
        store.create();
        store.create();
        std::thread::sleep(Duration::from_millis(50));

        let fresh = store.create();
        assert_eq!(store.len(), 1);
        assert!(store.get(&fresh).is_some());
    }

    #[test]
    fn concurrent_appends_do_not_lose_turns() {
        use std::sync::Arc;

        let store = Arc::new(ConversationStore::new(10, LONG_TTL));
        let id = store.create();

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        assert!(store.add_turn(&id, &format!("q{worker}-{i}"), "a"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.get(&id).unwrap().turns.len(), 200);
    }
}
