//! Fixed-window hit counters.
//!
//! Per key we keep `(count, window_start)`. A hit after the window has run out
//! opens a fresh window with count 1; otherwise the count grows and the key is
//! "exceeded" once it passes the capacity.

use std::collections::HashMap;
use std::hash::Hash;

use crate::config::BucketLimit;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Window {
    count: u32,
    started: f64,
}

#[derive(Debug, Clone)]
pub struct RateBucket<K> {
    limit: BucketLimit,
    windows: HashMap<K, Window>,
}

impl<K: Eq + Hash> RateBucket<K> {
    pub fn new(capacity: u32, period_secs: f64) -> Self {
        Self::from_limit(BucketLimit::new(capacity, period_secs))
    }

    pub fn from_limit(limit: BucketLimit) -> Self {
        Self {
            limit,
            windows: HashMap::new(),
        }
    }

    pub fn limit(&self) -> BucketLimit {
        self.limit
    }

    /// Records one hit for `key` at `now` (seconds) and reports whether the key is over capacity.
    pub fn check_and_update(&mut self, key: K, now: f64) -> bool {
        let period = self.limit.period_secs;
        let capacity = self.limit.capacity;

        let w = self.windows.entry(key).or_insert(Window { count: 0, started: now });
        if w.count == 0 || now - w.started > period {
            *w = Window { count: 1, started: now };
            return false;
        }
        w.count = w.count.saturating_add(1);
        w.count > capacity
    }

    /// Hits counted in the current window of `key`.
    pub fn hits(&self, key: &K) -> u32 {
        self.windows.get(key).map(|w| w.count).unwrap_or(0)
    }

    /// Forgets keys whose window already ran out; their next hit would reset anyway.
    pub fn prune(&mut self, now: f64) {
        let period = self.limit.period_secs;
        self.windows.retain(|_, w| now - w.started <= period);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// A [`RateBucket`] bound to the projection that extracts its key from an event.
pub struct KeyedBucket<E: ?Sized, K> {
    bucket: RateBucket<K>,
    key_fn: fn(&E) -> K,
}

impl<E: ?Sized, K: Eq + Hash> KeyedBucket<E, K> {
    pub fn new(limit: BucketLimit, key_fn: fn(&E) -> K) -> Self {
        Self {
            bucket: RateBucket::from_limit(limit),
            key_fn,
        }
    }

    pub fn check(&mut self, event: &E, now: f64) -> bool {
        let key = (self.key_fn)(event);
        self.bucket.check_and_update(key, now)
    }

    pub fn hits_for(&self, event: &E) -> u32 {
        self.bucket.hits(&(self.key_fn)(event))
    }

    pub fn prune(&mut self, now: f64) {
        self.bucket.prune(now);
    }

    pub fn inner(&self) -> &RateBucket<K> {
        &self.bucket
    }
}

impl<E: ?Sized, K> std::fmt::Debug for KeyedBucket<E, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedBucket")
            .field("limit", &self.bucket.limit)
            .field("keys", &self.bucket.windows.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trips_on_capacity_plus_one() {
        let mut b = RateBucket::new(10, 12.0);
        for i in 0..10 {
            assert!(!b.check_and_update(1u64, i as f64), "hit {} tripped early", i + 1);
        }
        assert!(b.check_and_update(1u64, 10.0));
        assert_eq!(b.hits(&1), 11);
    }

    #[test]
    fn window_resets_after_period() {
        let mut b = RateBucket::new(2, 5.0);
        assert!(!b.check_and_update("k", 0.0));
        assert!(!b.check_and_update("k", 1.0));
        assert!(b.check_and_update("k", 2.0));

        // 5.5s after window start: fresh window
        assert!(!b.check_and_update("k", 5.5));
        assert_eq!(b.hits(&"k"), 1);
        assert!(!b.check_and_update("k", 6.0));
        assert!(b.check_and_update("k", 6.5));
    }

    #[test]
    fn keys_are_independent() {
        let mut b = RateBucket::new(1, 10.0);
        assert!(!b.check_and_update(1u64, 0.0));
        assert!(!b.check_and_update(2u64, 0.0));
        assert!(b.check_and_update(1u64, 0.1));
        assert_eq!(b.hits(&2), 1);
    }

    #[test]
    fn prune_drops_only_stale_windows() {
        let mut b = RateBucket::new(5, 10.0);
        b.check_and_update(1u64, 0.0);
        b.check_and_update(2u64, 8.0);
        b.prune(12.0);
        assert_eq!(b.tracked_keys(), 1);
        assert_eq!(b.hits(&2), 1);
    }

    #[test]
    fn keyed_bucket_projects_event() {
        struct Msg {
            channel: u64,
            text: &'static str,
        }
        let mut b: KeyedBucket<Msg, (u64, String)> =
            KeyedBucket::new(BucketLimit::new(1, 10.0), |m| (m.channel, m.text.to_string()));

        assert!(!b.check(&Msg { channel: 1, text: "hi" }, 0.0));
        assert!(!b.check(&Msg { channel: 2, text: "hi" }, 0.0));
        assert!(b.check(&Msg { channel: 1, text: "hi" }, 1.0));
    }

    proptest! {
        #[test]
        fn exceeded_iff_more_than_capacity_hits_in_window(capacity in 1u32..40, extra in 0u32..5) {
            let mut b = RateBucket::new(capacity, 30.0);
            let total = capacity + 1 + extra;
            // all hits squeezed into the first 20s
            let step = 20.0 / total as f64;
            for i in 0..total {
                let exceeded = b.check_and_update(0u8, i as f64 * step);
                prop_assert_eq!(exceeded, i + 1 > capacity);
            }
        }

        #[test]
        fn hit_after_period_always_passes(capacity in 1u32..20, gap in 0.001f64..100.0) {
            let mut b = RateBucket::new(capacity, 10.0);
            for _ in 0..=capacity {
                b.check_and_update(0u8, 0.0);
            }
            prop_assert!(!b.check_and_update(0u8, 10.0 + gap));
        }
    }
}
