//! Set-membership hashing for computed record sets
//!
//! Records in `receiving_records_set` / `sending_records_set` are keyed by a
//! CRC-32 of their id, so two reads that yield the same ids produce equal sets
//! regardless of the order the API returned them in.

use std::collections::BTreeMap;

use crate::model::domain::DnsRecord;

/// Hash a string to a non-negative hashcode (CRC-32, IEEE polynomial)
pub fn string_hashcode(s: &str) -> u32 {
    crc32fast::hash(s.as_bytes())
}

/// A set of DNS records keyed by the hashcode of their id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: BTreeMap<u32, DnsRecord>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any record whose id hashes the same
    pub fn insert(&mut self, record: DnsRecord) -> Option<DnsRecord> {
        self.records.insert(string_hashcode(&record.id), record)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.records.contains_key(&string_hashcode(id))
    }

    pub fn get(&self, id: &str) -> Option<&DnsRecord> {
        self.records.get(&string_hashcode(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record ids in hash order
    pub fn ids(&self) -> Vec<&str> {
        self.records.values().map(|r| r.id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DnsRecord> {
        self.records.values()
    }
}

impl FromIterator<DnsRecord> for RecordSet {
    fn from_iter<I: IntoIterator<Item = DnsRecord>>(iter: I) -> Self {
        let mut set = RecordSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> DnsRecord {
        DnsRecord {
            id: id.to_string(),
            value: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn hashcode_matches_crc32_ieee() {
        // Standard CRC-32 check value
        assert_eq!(string_hashcode("123456789"), 0xCBF4_3926);
        assert_eq!(string_hashcode(""), 0);
    }

    #[test]
    fn set_is_order_independent() {
        let a: RecordSet = vec![record("mxa.mailgun.org"), record("mxb.mailgun.org")]
            .into_iter()
            .collect();
        let b: RecordSet = vec![record("mxb.mailgun.org"), record("mxa.mailgun.org")]
            .into_iter()
            .collect();

        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert!(a.contains_id("mxa.mailgun.org"));
    }

    #[test]
    fn duplicate_ids_collapse() {
        let mut set = RecordSet::new();
        assert!(set.insert(record("example.com")).is_none());
        assert!(set.insert(record("example.com")).is_some());
        assert_eq!(set.len(), 1);
    }
}
