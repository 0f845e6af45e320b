//! Producer sequence tracking for idempotent produce.
//!
//! A producer stream is identified by `(producer_id, topic, partition)`. The
//! broker validates the request's sequence number against the stream's last
//! accepted one before appending and records the assigned offset afterwards,
//! so a retried produce can be answered with the original offset instead of
//! writing a duplicate batch.
//!
//! Validation is strict: the only acceptable sequence is `last + 1` (or 0 for
//! a stream the table has never seen). Duplicates and gaps are both rejected.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProducerKey {
    pub producer_id: String,
    pub topic: String,
    pub partition: i32,
}

impl ProducerKey {
    pub fn new(producer_id: impl Into<String>, topic: impl Into<String>, partition: i32) -> Self {
        Self {
            producer_id: producer_id.into(),
            topic: topic.into(),
            partition,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ProducerState {
    last_sequence: i64,
    last_offset: i64,
    last_seen: Instant,
}

fn sequence_is_valid(state: Option<&ProducerState>, sequence: i64) -> bool {
    match state {
        None => sequence == 0,
        Some(state) => sequence == state.last_sequence + 1,
    }
}

/// Unbounded sequence table. One mutex over the whole map; entries live until
/// `remove_producer` or `clear`.
#[derive(Debug, Default)]
pub struct IdempotencyTable {
    table: Mutex<HashMap<ProducerKey, ProducerState>>,
}

impl IdempotencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid_sequence(&self, key: &ProducerKey, sequence: i64) -> bool {
        sequence_is_valid(self.table.lock().get(key), sequence)
    }

    pub fn update_sequence(&self, key: &ProducerKey, sequence: i64, offset: i64) {
        self.table.lock().insert(
            key.clone(),
            ProducerState {
                last_sequence: sequence,
                last_offset: offset,
                last_seen: Instant::now(),
            },
        );
    }

    /// Last accepted sequence for the key, or -1 when unknown.
    pub fn get_last_sequence(&self, key: &ProducerKey) -> i64 {
        self.table
            .lock()
            .get(key)
            .map(|s| s.last_sequence)
            .unwrap_or(-1)
    }

    /// Offset of the last accepted batch for the key, or -1 when unknown.
    pub fn get_last_offset(&self, key: &ProducerKey) -> i64 {
        self.table
            .lock()
            .get(key)
            .map(|s| s.last_offset)
            .unwrap_or(-1)
    }

    /// Drop every stream belonging to a producer id, across all partitions.
    pub fn remove_producer(&self, producer_id: &str) {
        self.table
            .lock()
            .retain(|key, _| key.producer_id != producer_id);
    }

    pub fn size(&self) -> usize {
        self.table.lock().len()
    }

    pub fn clear(&self) {
        self.table.lock().clear();
    }
}

/// Bounded variant: entries expire after `ttl` and the table never exceeds
/// `max_entries`, evicting least-recently-updated streams first. Expiry and
/// eviction run on each mutating call so reads stay cheap.
#[derive(Debug)]
pub struct BoundedIdempotencyTable {
    inner: Mutex<BoundedInner>,
    max_entries: usize,
    ttl: Duration,
}

#[derive(Debug, Default)]
struct BoundedInner {
    table: HashMap<ProducerKey, ProducerState>,
    // Recency order, least recent at the front.
    lru: VecDeque<ProducerKey>,
}

impl BoundedIdempotencyTable {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(BoundedInner::default()),
            max_entries,
            ttl,
        }
    }

    pub fn is_valid_sequence(&self, key: &ProducerKey, sequence: i64) -> bool {
        let mut inner = self.inner.lock();
        Self::drop_expired(&mut inner, self.ttl);
        sequence_is_valid(inner.table.get(key), sequence)
    }

    pub fn update_sequence(&self, key: &ProducerKey, sequence: i64, offset: i64) {
        let mut inner = self.inner.lock();
        Self::drop_expired(&mut inner, self.ttl);

        while inner.table.len() >= self.max_entries && !inner.table.contains_key(key) {
            let Some(oldest) = inner.lru.pop_front() else {
                break;
            };
            inner.table.remove(&oldest);
        }

        let state = ProducerState {
            last_sequence: sequence,
            last_offset: offset,
            last_seen: Instant::now(),
        };
        if inner.table.insert(key.clone(), state).is_some() {
            inner.lru.retain(|k| k != key);
        }
        inner.lru.push_back(key.clone());
    }

    pub fn get_last_sequence(&self, key: &ProducerKey) -> i64 {
        self.inner
            .lock()
            .table
            .get(key)
            .map(|s| s.last_sequence)
            .unwrap_or(-1)
    }

    pub fn get_last_offset(&self, key: &ProducerKey) -> i64 {
        self.inner
            .lock()
            .table
            .get(key)
            .map(|s| s.last_offset)
            .unwrap_or(-1)
    }

    pub fn remove_producer(&self, producer_id: &str) {
        let mut inner = self.inner.lock();
        inner.table.retain(|key, _| key.producer_id != producer_id);
        inner.lru.retain(|key| key.producer_id != producer_id);
    }

    pub fn size(&self) -> usize {
        self.inner.lock().table.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.table.clear();
        inner.lru.clear();
    }

    fn drop_expired(inner: &mut BoundedInner, ttl: Duration) {
        let now = Instant::now();
        let before = inner.table.len();
        inner
            .table
            .retain(|_, state| now.duration_since(state.last_seen) < ttl);
        if inner.table.len() != before {
            let table = &inner.table;
            inner.lru.retain(|key| table.contains_key(key));
        }
    }
}

/// Closed set of cache variants so the broker picks one at construction
/// without a trait object in the produce path.
#[derive(Debug)]
pub enum SequenceCache {
    Unbounded(IdempotencyTable),
    Bounded(BoundedIdempotencyTable),
}

impl SequenceCache {
    pub fn unbounded() -> Self {
        SequenceCache::Unbounded(IdempotencyTable::new())
    }

    pub fn bounded(max_entries: usize, ttl: Duration) -> Self {
        SequenceCache::Bounded(BoundedIdempotencyTable::new(max_entries, ttl))
    }

    pub fn is_valid_sequence(&self, key: &ProducerKey, sequence: i64) -> bool {
        match self {
            SequenceCache::Unbounded(t) => t.is_valid_sequence(key, sequence),
            SequenceCache::Bounded(t) => t.is_valid_sequence(key, sequence),
        }
    }

    pub fn update_sequence(&self, key: &ProducerKey, sequence: i64, offset: i64) {
        match self {
            SequenceCache::Unbounded(t) => t.update_sequence(key, sequence, offset),
            SequenceCache::Bounded(t) => t.update_sequence(key, sequence, offset),
        }
    }

    pub fn get_last_sequence(&self, key: &ProducerKey) -> i64 {
        match self {
            SequenceCache::Unbounded(t) => t.get_last_sequence(key),
            SequenceCache::Bounded(t) => t.get_last_sequence(key),
        }
    }

    pub fn get_last_offset(&self, key: &ProducerKey) -> i64 {
        match self {
            SequenceCache::Unbounded(t) => t.get_last_offset(key),
            SequenceCache::Bounded(t) => t.get_last_offset(key),
        }
    }

    pub fn remove_producer(&self, producer_id: &str) {
        match self {
            SequenceCache::Unbounded(t) => t.remove_producer(producer_id),
            SequenceCache::Bounded(t) => t.remove_producer(producer_id),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            SequenceCache::Unbounded(t) => t.size(),
            SequenceCache::Bounded(t) => t.size(),
        }
    }

    pub fn clear(&self) {
        match self {
            SequenceCache::Unbounded(t) => t.clear(),
            SequenceCache::Bounded(t) => t.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(producer: &str, partition: i32) -> ProducerKey {
        ProducerKey::new(producer, "orders", partition)
    }

    #[test]
    fn new_stream_must_start_at_zero() {
        let table = IdempotencyTable::new();
        assert!(table.is_valid_sequence(&key("p1", 0), 0));
        assert!(!table.is_valid_sequence(&key("p1", 0), 1));
        assert!(!table.is_valid_sequence(&key("p1", 0), 5));
    }

    #[test]
    fn only_next_sequence_is_valid() {
        let table = IdempotencyTable::new();
        let k = key("p1", 0);
        table.update_sequence(&k, 0, 100);

        assert!(table.is_valid_sequence(&k, 1));
        assert!(!table.is_valid_sequence(&k, 0), "duplicate rejected");
        assert!(!table.is_valid_sequence(&k, 2), "gap rejected");
        assert_eq!(table.get_last_sequence(&k), 0);
        assert_eq!(table.get_last_offset(&k), 100);
    }

    #[test]
    fn accepted_sequences_are_strictly_increasing() {
        let table = IdempotencyTable::new();
        let k = key("p1", 3);
        let mut accepted = Vec::new();
        for seq in [0, 0, 1, 3, 2, 2, 3] {
            if table.is_valid_sequence(&k, seq) {
                table.update_sequence(&k, seq, seq * 10);
                accepted.push(seq);
            }
        }
        assert_eq!(accepted, vec![0, 1, 2]);
    }

    #[test]
    fn streams_are_independent_per_partition() {
        let table = IdempotencyTable::new();
        table.update_sequence(&key("p1", 0), 4, 40);
        assert!(table.is_valid_sequence(&key("p1", 1), 0));
        assert!(table.is_valid_sequence(&key("p2", 0), 0));
        assert_eq!(table.get_last_sequence(&key("p1", 1)), -1);
        assert_eq!(table.get_last_offset(&key("p2", 0)), -1);
    }

    #[test]
    fn remove_producer_drops_all_partitions() {
        let table = IdempotencyTable::new();
        table.update_sequence(&key("p1", 0), 0, 1);
        table.update_sequence(&key("p1", 1), 0, 1);
        table.update_sequence(&key("p2", 0), 0, 1);

        table.remove_producer("p1");
        assert_eq!(table.size(), 1);
        assert!(table.is_valid_sequence(&key("p1", 0), 0));
    }

    #[test]
    fn bounded_evicts_lru_at_capacity() {
        let table = BoundedIdempotencyTable::new(2, Duration::from_secs(60));
        table.update_sequence(&key("a", 0), 0, 1);
        table.update_sequence(&key("b", 0), 0, 2);
        // Touch "a" so "b" becomes least recent.
        table.update_sequence(&key("a", 0), 1, 3);

        table.update_sequence(&key("c", 0), 0, 4);
        assert_eq!(table.size(), 2);
        assert_eq!(table.get_last_offset(&key("b", 0)), -1, "b evicted");
        assert_eq!(table.get_last_offset(&key("a", 0)), 3);
        assert_eq!(table.get_last_offset(&key("c", 0)), 4);
    }

    #[test]
    fn bounded_expires_entries_by_ttl() {
        let table = BoundedIdempotencyTable::new(16, Duration::from_millis(10));
        table.update_sequence(&key("a", 0), 0, 1);
        std::thread::sleep(Duration::from_millis(20));

        // Expired entry behaves like a brand-new stream.
        assert!(table.is_valid_sequence(&key("a", 0), 0));
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn bounded_update_existing_does_not_evict() {
        let table = BoundedIdempotencyTable::new(2, Duration::from_secs(60));
        table.update_sequence(&key("a", 0), 0, 1);
        table.update_sequence(&key("b", 0), 0, 2);
        // Updating an existing key at capacity must not push anyone out.
        table.update_sequence(&key("b", 0), 1, 5);
        assert_eq!(table.size(), 2);
        assert_eq!(table.get_last_offset(&key("a", 0)), 1);
        assert_eq!(table.get_last_offset(&key("b", 0)), 5);
    }
}
