//! The record cache: a keyed multimap with insertion, lookup, removal and
//! bulk scan. Implemented as a hash map of vectors: equality
//! and removal are O(n) within a bucket, which is fine because buckets are
//! bounded by the number of simultaneous records sharing one name.
use std::collections::HashMap;

use crate::record::Record;

#[derive(Debug, Default)]
pub struct DNSCache {
    entries: HashMap<String, Vec<Record>>,
}

impl DNSCache {
    pub fn new() -> DNSCache {
        DNSCache::default()
    }

    /// Adds `record`. If an equal record (by `Record::matches`) is already
    /// cached, its ttl/created are refreshed instead of inserting a
    /// duplicate.
    pub fn add(&mut self, record: Record) {
        let bucket = self.entries.entry(record.name.key()).or_default();
        if let Some(existing) = bucket.iter_mut().find(|r| r.matches(&record)) {
            existing.reset_ttl(&record);
        } else {
            bucket.push(record);
        }
    }

    /// Removes an equal record if present. Tolerant of a missing entry.
    pub fn remove(&mut self, record: &Record) {
        if let Some(bucket) = self.entries.get_mut(&record.name.key()) {
            bucket.retain(|r| !r.matches(record));
            if bucket.is_empty() {
                self.entries.remove(&record.name.key());
            }
        }
    }

    /// Finds the cached record equal to `record`, if any.
    pub fn get(&self, record: &Record) -> Option<&Record> {
        self.entries.get(&record.name.key())?.iter().find(|r| r.matches(record))
    }

    pub fn get_by_details(&self, name_key: &str, rtype: crate::record::RecordType, class: crate::record::RecordClass) -> Option<&Record> {
        self.entries.get(name_key)?.iter().find(|r| r.rtype() == rtype && r.class == class)
    }

    pub fn entries_with_name(&self, name_key: &str) -> &[Record] {
        self.entries.get(name_key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A flat snapshot of every cached record.
    pub fn entries(&self) -> Vec<Record> {
        self.entries.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::record::{RecordClass, RecordData, RecordType};
    use std::net::Ipv4Addr;

    fn a_record(host: &str, ip: [u8; 4], ttl: u32) -> Record {
        Record::new(Name::new(host), RecordClass::IN, true, ttl, 0, RecordData::A(Ipv4Addr::from(ip)))
    }

    #[test]
    fn add_is_idempotent_for_equal_records() {
        let mut cache = DNSCache::new();
        cache.add(a_record("host.local.", [1, 2, 3, 4], 10));
        cache.add(a_record("host.local.", [1, 2, 3, 4], 999)); // equal payload, different ttl

        assert_eq!(cache.len(), 1);
        let stored = cache.get(&a_record("host.local.", [1, 2, 3, 4], 0)).unwrap();
        assert_eq!(stored.ttl, 999); // ttl refreshed, not duplicated

        cache.remove(&a_record("host.local.", [1, 2, 3, 4], 0));
        assert!(cache.get(&a_record("host.local.", [1, 2, 3, 4], 0)).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn distinct_payloads_coexist_in_one_bucket() {
        let mut cache = DNSCache::new();
        cache.add(a_record("host.local.", [1, 1, 1, 1], 10));
        cache.add(a_record("host.local.", [2, 2, 2, 2], 10));
        assert_eq!(cache.entries_with_name(&Name::new("host.local.").key()).len(), 2);
    }

    #[test]
    fn remove_is_tolerant_of_missing_entry() {
        let mut cache = DNSCache::new();
        cache.remove(&a_record("nowhere.local.", [0, 0, 0, 0], 1));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn get_by_details_matches_type_and_class() {
        let mut cache = DNSCache::new();
        cache.add(a_record("host.local.", [1, 2, 3, 4], 10));
        let found = cache.get_by_details(&Name::new("host.local.").key(), RecordType::A, RecordClass::IN);
        assert!(found.is_some());
        let missing = cache.get_by_details(&Name::new("host.local.").key(), RecordType::AAAA, RecordClass::IN);
        assert!(missing.is_none());
    }
}
