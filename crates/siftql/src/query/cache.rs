use crate::query::{ParseError, Query, parse};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

///
/// ParserCache
///
/// Bounded cache of parse results keyed by the exact input string. Parse
/// errors are cached too, so malformed queries do not repeat work. A single
/// exclusion lock covers the map and its bookkeeping; parsing itself runs
/// outside the lock, so two concurrent misses for the same key may both
/// parse (last store wins).
///

pub struct ParserCache {
    capacity: usize,
    inner: Mutex<HashMap<String, CacheEntry>>,
}

///
/// CacheStats
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub total_access: u64,
}

struct CacheEntry {
    result: Result<Query, ParseError>,
    access_count: u64,
    added_at: Instant,
    last_access: Instant,
}

impl CacheEntry {
    // Frequency dominates (weight 10); the recency terms keep freshly added
    // entries alive through their first few lookups.
    fn score(&self, now: Instant) -> f64 {
        let since_added = now.duration_since(self.added_at).as_secs_f64();
        let since_access = now.duration_since(self.last_access).as_secs_f64();
        10.0 * self.access_count as f64 + 1.0 / (since_added + 1.0) + 1.0 / (since_access + 1.0)
    }
}

impl ParserCache {
    /// A capacity of `0` disables caching: every call parses.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Parse through the cache. Hits update the access bookkeeping; misses
    /// parse, then store, evicting the lowest-scored entry at capacity.
    pub fn parse(&self, input: &str) -> Result<Query, ParseError> {
        if self.capacity == 0 {
            return parse(input);
        }

        {
            let mut entries = self.inner.lock();
            if let Some(entry) = entries.get_mut(input) {
                entry.access_count += 1;
                entry.last_access = Instant::now();
                return entry.result.clone();
            }
        }

        let result = parse(input);

        let mut entries = self.inner.lock();
        if entries.len() >= self.capacity && !entries.contains_key(input) {
            Self::evict_one(&mut entries);
        }
        let now = Instant::now();
        entries.insert(
            input.to_owned(),
            CacheEntry {
                result: result.clone(),
                access_count: 1,
                added_at: now,
                last_access: now,
            },
        );

        result
    }

    fn evict_one(entries: &mut HashMap<String, CacheEntry>) {
        let now = Instant::now();
        let victim = entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.score(now)
                    .partial_cmp(&b.score(now))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            debug!(query = %key, "evicting cached parse result");
            entries.remove(&key);
        }
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self.inner.lock();
        CacheStats {
            size: entries.len(),
            total_access: entries.values().map(|e| e.access_count).sum(),
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::ParserCache;
    use crate::query::parse;
    use std::sync::Arc;

    #[test]
    fn cached_parse_is_transparent_for_successes() {
        let cache = ParserCache::new(8);
        let direct = parse("status = active page_size = 5").expect("should parse");
        let cached = cache
            .parse("status = active page_size = 5")
            .expect("should parse");
        assert_eq!(direct, cached);

        let again = cache
            .parse("status = active page_size = 5")
            .expect("should parse");
        assert_eq!(direct, again);
    }

    #[test]
    fn cached_parse_is_transparent_for_errors() {
        let cache = ParserCache::new(8);
        let direct = parse("age >=").expect_err("should fail");
        let cached = cache.parse("age >=").expect_err("should fail");
        assert_eq!(direct, cached);

        // Second lookup serves the stored error.
        let again = cache.parse("age >=").expect_err("should fail");
        assert_eq!(direct, again);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn stats_track_size_and_access_counts() {
        let cache = ParserCache::new(8);
        let _ = cache.parse("a = 1");
        let _ = cache.parse("a = 1");
        let _ = cache.parse("b = 2");

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.total_access, 3);
    }

    #[test]
    fn eviction_prefers_frequent_and_recent_entries() {
        let cache = ParserCache::new(3);
        // Access sequence: a a a b c d
        let _ = cache.parse("a = 1");
        let _ = cache.parse("a = 1");
        let _ = cache.parse("a = 1");
        let _ = cache.parse("b = 2");
        let _ = cache.parse("c = 3");
        let _ = cache.parse("d = 4");

        assert_eq!(cache.len(), 3);
        let stats = cache.stats();
        // 'a' survives on frequency; 'b' (single access, least recent) was
        // evicted, so the accumulated counts are a=3, c=1, d=1.
        assert_eq!(stats.total_access, 5);

        // A hit on 'a' proves it is still resident.
        let _ = cache.parse("a = 1");
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().total_access, 6);
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = ParserCache::new(0);
        let _ = cache.parse("a = 1");
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().total_access, 0);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = ParserCache::new(4);
        let _ = cache.parse("a = 1");
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_parses_are_linearizable() {
        let cache = Arc::new(ParserCache::new(16));
        let mut handles = Vec::new();
        for i in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    let input = format!("field_{} = {}", i % 2, j % 5);
                    let _ = cache.parse(&input);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker should not panic");
        }
        assert!(cache.len() <= 16);
    }
}
