//! Redelivery suppression for the streaming lane.
//!
//! NATS delivers at least once, so the same transaction can arrive more than
//! once. [`DuplicateFilter`] remembers recently seen transaction ids for a
//! fixed time-to-live and reports repeats.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Default retention of a seen transaction id
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(600);

/// Default number of ids held before the oldest are evicted
pub const DEFAULT_DEDUP_CAPACITY: usize = 100_000;

#[derive(Default)]
struct SeenIds {
    first_seen: HashMap<String, Instant>,
    /// Insertion order, oldest first
    order: VecDeque<(String, Instant)>,
}

impl SeenIds {
    fn evict_expired(&mut self, now: Instant, ttl: Duration) {
        while let Some((_, seen_at)) = self.order.front() {
            if now.saturating_duration_since(*seen_at) < ttl {
                break;
            }
            self.pop_oldest();
        }
    }

    fn pop_oldest(&mut self) {
        if let Some((id, seen_at)) = self.order.pop_front() {
            // The id may have been re-inserted after an earlier expiry.
            if self.first_seen.get(&id) == Some(&seen_at) {
                self.first_seen.remove(&id);
            }
        }
    }
}

/// Bounded set-if-absent over transaction ids with a time-to-live
pub struct DuplicateFilter {
    ttl: Duration,
    capacity: usize,
    seen: Mutex<SeenIds>,
}

impl DuplicateFilter {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            seen: Mutex::new(SeenIds::default()),
        }
    }

    /// Record `transaction_id`; returns `true` when it was already seen
    /// within the TTL.
    pub fn is_duplicate(&self, transaction_id: &str) -> bool {
        self.is_duplicate_at(transaction_id, Instant::now())
    }

    fn is_duplicate_at(&self, transaction_id: &str, now: Instant) -> bool {
        let mut seen = self.seen.lock();
        seen.evict_expired(now, self.ttl);

        if seen.first_seen.contains_key(transaction_id) {
            return true;
        }

        while seen.first_seen.len() >= self.capacity {
            seen.pop_oldest();
        }
        seen.first_seen.insert(transaction_id.to_string(), now);
        seen.order.push_back((transaction_id.to_string(), now));
        false
    }

    /// Ids currently remembered
    pub fn len(&self) -> usize {
        self.seen.lock().first_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL, DEFAULT_DEDUP_CAPACITY)
    }
}
