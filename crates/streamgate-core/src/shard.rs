//! Shard selection.
//!
//! A logical topic can be spread over `shard_count` physical topics named
//! `{topic}_0 .. {topic}_{n-1}`. Each publish takes the next index from one
//! process-wide counter, so successive publishes cycle through the shards.
//!
//! The counter is shared by every logical topic rather than kept per topic:
//! interleaved traffic to two topics advances the same sequence. Indices are
//! still spread evenly across shards for every topic over time.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::topic::TopicKey;

/// Maps a logical topic to the physical topic for the next publish.
#[derive(Debug)]
pub struct ShardSelector {
    shard_count: u64,
    counter: AtomicU64,
}

impl ShardSelector {
    /// `shard_count == 0` disables sharding.
    pub fn new(shard_count: u32) -> Self {
        Self {
            shard_count: u64::from(shard_count),
            counter: AtomicU64::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.shard_count > 0
    }

    pub fn shard_count(&self) -> u64 {
        self.shard_count
    }

    /// Physical topic for the next publish to `logical`.
    pub fn shard(&self, logical: &TopicKey) -> TopicKey {
        if !self.is_enabled() {
            return logical.clone();
        }

        // fetch_add wraps on overflow, so the index never goes negative
        let ticket = self.counter.fetch_add(1, Ordering::Relaxed);
        logical.with_partition_suffix(ticket % self.shard_count)
    }

    /// Number of shard indices handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for ShardSelector {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn orders() -> TopicKey {
        TopicKey::new("public", "default", "orders")
    }

    #[test]
    fn test_disabled_returns_logical_key() {
        let selector = ShardSelector::disabled();
        assert_eq!(selector.shard(&orders()), orders());
        assert_eq!(selector.issued(), 0);
    }

    #[test]
    fn test_rotation() {
        let selector = ShardSelector::new(3);
        let topics: Vec<String> = (0..6)
            .map(|_| selector.shard(&orders()).topic().to_string())
            .collect();
        assert_eq!(
            topics,
            vec!["orders_0", "orders_1", "orders_2", "orders_0", "orders_1", "orders_2"]
        );
        assert_eq!(selector.issued(), 6);
    }

    #[test]
    fn test_counter_shared_across_topics() {
        let selector = ShardSelector::new(2);
        let payments = TopicKey::new("public", "default", "payments");

        assert_eq!(selector.shard(&orders()).topic(), "orders_0");
        assert_eq!(selector.shard(&payments).topic(), "payments_1");
        assert_eq!(selector.shard(&orders()).topic(), "orders_0");
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let selector = Arc::new(ShardSelector::new(4));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let selector = Arc::clone(&selector);
                std::thread::spawn(move || {
                    (0..1000)
                        .map(|_| selector.shard(&orders()).topic().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut per_shard: HashMap<String, usize> = HashMap::new();
        for thread in threads {
            for topic in thread.join().unwrap() {
                *per_shard.entry(topic).or_default() += 1;
            }
        }

        assert_eq!(selector.issued(), 8000);
        assert_eq!(per_shard.len(), 4);
        assert!(per_shard.values().all(|count| *count == 2000));
    }
}
