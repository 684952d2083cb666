//! Inbound message gate: duplicate suppression.
//!
//! Channels redeliver on flaky networks; a short sliding window keyed
//! by session and content absorbs those redeliveries before any store
//! or model work happens. The seam is a trait so multi-process
//! deployments can back it with shared storage.

use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

pub trait DedupStore: Send + Sync {
    /// Whether this key was seen within the window.
    fn seen(&self, key: u64) -> bool;

    /// Record a key as delivered now.
    fn remember(&self, key: u64);
}

/// Dedup key for an inbound message: session id plus trimmed content,
/// so the same text on another session never collides.
pub fn message_key(session_id: &str, content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    content.trim().hash(&mut hasher);
    hasher.finish()
}

/// In-process sliding-window dedup. Entries expire after `window` and
/// stale ones are swept opportunistically on insert.
pub struct SlidingWindowDedup {
    window: Duration,
    entries: Mutex<HashMap<u64, Instant>>,
}

impl SlidingWindowDedup {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl DedupStore for SlidingWindowDedup {
    fn seen(&self, key: u64) -> bool {
        let entries = self.entries.lock();
        entries
            .get(&key)
            .is_some_and(|at| at.elapsed() < self.window)
    }

    fn remember(&self, key: u64) {
        let mut entries = self.entries.lock();
        if entries.len() > 64 {
            let window = self.window;
            entries.retain(|_, at| at.elapsed() < window);
        }
        entries.insert(key, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_within_window_is_seen() {
        let dedup = SlidingWindowDedup::new(Duration::from_secs(2));
        let key = message_key("s1", "hello");
        assert!(!dedup.seen(key));
        dedup.remember(key);
        assert!(dedup.seen(key));
    }

    #[test]
    fn same_text_on_other_session_is_not_a_duplicate() {
        let dedup = SlidingWindowDedup::new(Duration::from_secs(2));
        dedup.remember(message_key("s1", "hello"));
        assert!(!dedup.seen(message_key("s2", "hello")));
    }

    #[test]
    fn key_ignores_surrounding_whitespace() {
        assert_eq!(message_key("s1", "hello"), message_key("s1", "  hello \n"));
    }

    #[test]
    fn entries_expire_after_window() {
        let dedup = SlidingWindowDedup::new(Duration::from_millis(10));
        let key = message_key("s1", "hello");
        dedup.remember(key);
        std::thread::sleep(Duration::from_millis(20));
        assert!(!dedup.seen(key));
    }
}
