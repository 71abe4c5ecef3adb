// Duplicate suppression for received broadcasts
//
// Scanning runs with adapter-level duplicate filtering disabled, so the same
// advertisement is reported many times per second. A broadcast instance is
// identified by (device identifier, field kind, raw field bytes); a device that
// changes its payload is a new instance.

use crate::codec::FieldKind;
use std::collections::{HashSet, VecDeque};

const DEDUP_DOMAIN: &[u8] = b"streetpass/dedup/v1";

/// Identity of one broadcast instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey([u8; 32]);

impl DedupKey {
    /// Derive the key for a received field. Inputs are length-prefixed so
    /// distinct (identifier, payload) splits never collide.
    pub fn derive(device_identifier: &str, kind: FieldKind, raw: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DEDUP_DOMAIN);
        hasher.update(&(device_identifier.len() as u64).to_le_bytes());
        hasher.update(device_identifier.as_bytes());
        hasher.update(&[kind as u8]);
        hasher.update(&(raw.len() as u64).to_le_bytes());
        hasher.update(raw);
        Self(*hasher.finalize().as_bytes())
    }
}

/// Set of broadcast instances already surfaced
#[derive(Debug, Default)]
pub struct DiscoveryDeduplicator {
    seen: HashSet<DedupKey>,
    /// Insertion order, only tracked when a capacity is set
    order: VecDeque<DedupKey>,
    capacity: Option<usize>,
}

impl DiscoveryDeduplicator {
    /// Unbounded deduplicator: keys live for the whole process
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` keys, evicting the oldest first
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Returns true the first time a key is seen, false for duplicates
    pub fn check_and_mark(&mut self, key: DedupKey) -> bool {
        if !self.seen.insert(key) {
            return false;
        }

        if let Some(capacity) = self.capacity {
            self.order.push_back(key);
            while self.order.len() > capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }
        true
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let a = DedupKey::derive("D1", FieldKind::LocalName, b"test11_8i_ajfi321");
        let b = DedupKey::derive("D1", FieldKind::LocalName, b"test11_8i_ajfi321");
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_depends_on_every_input() {
        let base = DedupKey::derive("D1", FieldKind::LocalName, b"payload");
        assert_ne!(base, DedupKey::derive("D2", FieldKind::LocalName, b"payload"));
        assert_ne!(base, DedupKey::derive("D1", FieldKind::ManufacturerData, b"payload"));
        assert_ne!(base, DedupKey::derive("D1", FieldKind::LocalName, b"payload2"));
    }

    #[test]
    fn test_key_inputs_do_not_run_together() {
        let a = DedupKey::derive("D1", FieldKind::LocalName, b"2abc");
        let b = DedupKey::derive("D12", FieldKind::LocalName, b"abc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_duplicate_suppressed() {
        let mut dedup = DiscoveryDeduplicator::new();
        let key = DedupKey::derive("D1", FieldKind::LocalName, b"test11_8i_ajfi321");

        assert!(dedup.check_and_mark(key));
        assert!(!dedup.check_and_mark(key));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn test_changed_payload_is_new_instance() {
        let mut dedup = DiscoveryDeduplicator::new();

        assert!(dedup.check_and_mark(DedupKey::derive("D1", FieldKind::LocalName, b"tag_a")));
        assert!(dedup.check_and_mark(DedupKey::derive("D1", FieldKind::LocalName, b"tag_b")));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_capacity_limit_evicts_oldest() {
        let mut dedup = DiscoveryDeduplicator::with_capacity_limit(2);
        let k1 = DedupKey::derive("D1", FieldKind::LocalName, b"x");
        let k2 = DedupKey::derive("D2", FieldKind::LocalName, b"x");
        let k3 = DedupKey::derive("D3", FieldKind::LocalName, b"x");

        assert!(dedup.check_and_mark(k1));
        assert!(dedup.check_and_mark(k2));
        assert!(dedup.check_and_mark(k3));

        assert_eq!(dedup.len(), 2);
        assert!(!dedup.contains(&k1));
        assert!(dedup.contains(&k3));

        // Evicted key is reported again
        assert!(dedup.check_and_mark(k1));
    }

    #[test]
    fn test_clear() {
        let mut dedup = DiscoveryDeduplicator::new();
        let key = DedupKey::derive("D1", FieldKind::LocalName, b"x");
        dedup.check_and_mark(key);

        dedup.clear();
        assert!(dedup.is_empty());
        assert!(dedup.check_and_mark(key));
    }
}
