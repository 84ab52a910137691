//! Packet cache (spec.md §4.6 step 2, §3 "Packet"): short-TTL cache of
//! fused retrieval candidates keyed by context fingerprint, so repeated
//! calls for the same tool/phase/intent/tokens within a few seconds skip
//! retrieval entirely.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::retrieval::Candidate;

#[derive(Debug, Clone)]
pub struct Packet {
    pub candidates: Vec<Candidate>,
    pub created_at: Instant,
}

/// A bounded, TTL-expiring map from fingerprint to packet. Bounded by
/// simple oldest-eviction rather than an LRU structure — the packet cache
/// is small (one entry per distinct recent context) and retrieval is cheap
/// enough that an imperfect eviction choice costs at most one extra
/// retrieval, not correctness.
pub struct PacketCache {
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<String, Packet>>,
}

impl PacketCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<Vec<Candidate>> {
        let entries = self.entries.read().expect("packet cache lock poisoned");
        let packet = entries.get(fingerprint)?;
        if packet.created_at.elapsed() > self.ttl {
            return None;
        }
        Some(packet.candidates.clone())
    }

    pub fn put(&self, fingerprint: String, candidates: Vec<Candidate>) {
        let mut entries = self.entries.write().expect("packet cache lock poisoned");
        if entries.len() >= self.capacity && !entries.contains_key(&fingerprint) {
            if let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, p)| p.created_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest_key);
            }
        }
        entries.insert(
            fingerprint,
            Packet {
                candidates,
                created_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("packet cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::AdviceSource;

    fn candidate() -> Candidate {
        Candidate {
            source: AdviceSource::Cognitive,
            key: Some("k".into()),
            text: "t".into(),
            score: 1.0,
            rationale: "r".into(),
            reliability: 0.5,
        }
    }

    #[test]
    fn hit_returns_cached_candidates() {
        let cache = PacketCache::new(Duration::from_secs(5), 10);
        cache.put("fp1".into(), vec![candidate()]);
        assert_eq!(cache.get("fp1").unwrap().len(), 1);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = PacketCache::new(Duration::from_millis(1), 10);
        cache.put("fp1".into(), vec![candidate()]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("fp1").is_none());
    }

    #[test]
    fn over_capacity_evicts_oldest() {
        let cache = PacketCache::new(Duration::from_secs(60), 1);
        cache.put("fp1".into(), vec![candidate()]);
        std::thread::sleep(Duration::from_millis(2));
        cache.put("fp2".into(), vec![candidate()]);
        assert!(cache.get("fp1").is_none());
        assert!(cache.get("fp2").is_some());
    }
}
