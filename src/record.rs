//! The record model: the tagged union of resource-record payloads mDNS/DNS-SD
//! cares about, and the question entity. Modeled as a tagged enum (not a base
//! class): the codec dispatches on the tag rather than on dynamic type.
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::name::Name;

/// Record/question TYPE values relevant to mDNS/DNS-SD. Non-goals restrict
/// actively advertised/resolved types to {A, AAAA, PTR, SRV, TXT, HINFO,
/// CNAME}; everything else round-trips as `Unknown` so the parser never
/// fails on a type it doesn't understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    AAAA,
    PTR,
    TXT,
    SRV,
    HINFO,
    CNAME,
    ANY,
    Unknown(u16),
}

impl RecordType {
    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::CNAME => 5,
            RecordType::PTR => 12,
            RecordType::HINFO => 13,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::ANY => 255,
            RecordType::Unknown(v) => v,
        }
    }

    pub fn from_u16(v: u16) -> RecordType {
        match v {
            1 => RecordType::A,
            5 => RecordType::CNAME,
            12 => RecordType::PTR,
            13 => RecordType::HINFO,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            255 => RecordType::ANY,
            other => RecordType::Unknown(other),
        }
    }
}

/// Record/question CLASS values. The high bit of the wire field is the
/// cache-flush/unique hint and is tracked separately (see `Record::unique`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordClass {
    IN,
    ANY,
    Unknown(u16),
}

const CLASS_UNIQUE_BIT: u16 = 0x8000;
const CLASS_MASK: u16 = !CLASS_UNIQUE_BIT;

impl RecordClass {
    pub fn to_u16(self) -> u16 {
        match self {
            RecordClass::IN => 1,
            RecordClass::ANY => 255,
            RecordClass::Unknown(v) => v,
        }
    }

    pub fn from_u16(v: u16) -> RecordClass {
        match v {
            1 => RecordClass::IN,
            255 => RecordClass::ANY,
            other => RecordClass::Unknown(other),
        }
    }

    /// Splits a raw wire class field into (class, unique/cache-flush flag).
    pub fn from_wire(raw: u16) -> (RecordClass, bool) {
        (RecordClass::from_u16(raw & CLASS_MASK), raw & CLASS_UNIQUE_BIT != 0)
    }

    /// Combines a class with the cache-flush bit for the wire.
    pub fn to_wire(self, unique: bool) -> u16 {
        let base = self.to_u16() & CLASS_MASK;
        if unique {
            base | CLASS_UNIQUE_BIT
        } else {
            base
        }
    }
}

/// A question: (name, type, class). Answered by a record iff names are equal
/// (case-insensitively), classes are equal, and the question's type is the
/// record's type or ANY.
#[derive(Debug, Clone)]
pub struct Question {
    pub name: Name,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl Question {
    pub fn new(name: Name, qtype: RecordType, qclass: RecordClass) -> Question {
        Question { name, qtype, qclass }
    }

    pub fn is_answered_by(&self, record: &Record) -> bool {
        self.name == record.name
            && self.qclass == record.class
            && (self.qtype == record.rtype() || matches!(self.qtype, RecordType::ANY))
    }
}

/// The payload carried by a resource record, one variant per type this node
/// actively understands. `Unknown` carries the raw bytes so the codec can
/// re-emit or simply drop them without having parsed their structure.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ptr(Name),
    Cname(Name),
    Txt(Vec<u8>),
    Srv { priority: u16, weight: u16, port: u16, target: Name },
    Hinfo { cpu: String, os: String },
    Unknown { rtype: u16, data: Vec<u8> },
}

/// A resource record: (name, type, class, unique-flag, ttl, created-at) plus
/// a tagged payload. Equality ignores ttl and timestamps; it compares
/// name+type+class plus the payload.
#[derive(Debug, Clone)]
pub struct Record {
    pub name: Name,
    pub class: RecordClass,
    pub unique: bool,
    pub ttl: u32,
    /// Milliseconds since the UNIX epoch, the same unit `now` is given in
    /// throughout the cache/browser/resolver timing logic.
    pub created: u64,
    pub data: RecordData,
}

impl Record {
    pub fn new(name: Name, class: RecordClass, unique: bool, ttl: u32, created: u64, data: RecordData) -> Record {
        Record { name, class, unique, ttl, created, data }
    }

    pub fn rtype(&self) -> RecordType {
        match &self.data {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::AAAA,
            RecordData::Ptr(_) => RecordType::PTR,
            RecordData::Cname(_) => RecordType::CNAME,
            RecordData::Txt(_) => RecordType::TXT,
            RecordData::Srv { .. } => RecordType::SRV,
            RecordData::Hinfo { .. } => RecordType::HINFO,
            RecordData::Unknown { rtype, .. } => RecordType::Unknown(*rtype),
        }
    }

    /// Equality used by the cache and `suppressed_by`: name + type + class +
    /// payload, ignoring ttl/created.
    pub fn matches(&self, other: &Record) -> bool {
        self.name == other.name && self.class == other.class && self.data == other.data
    }

    /// `created + percent/100 * ttl` in milliseconds.
    pub fn get_expiration_time(&self, percent: u32) -> u64 {
        self.created + (percent as u64) * (self.ttl as u64) * 10
    }

    pub fn get_remaining_ttl(&self, now: u64) -> u32 {
        let expiry = self.get_expiration_time(100);
        if expiry <= now {
            0
        } else {
            ((expiry - now) / 1000) as u32
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.get_expiration_time(100)
    }

    pub fn is_stale(&self, now: u64) -> bool {
        now >= self.get_expiration_time(50)
    }

    /// True when `other` is an equal record whose ttl is more than double
    /// ours -- the outgoing builder drops answers redundant with a
    /// known-answer already present in an incoming query, using
    /// `other.ttl * 2 > self.ttl` as the exact comparison.
    pub fn suppressed_by_answer(&self, other: &Record) -> bool {
        self.matches(other) && (other.ttl as u64) * 2 > self.ttl as u64
    }

    /// Resets ttl/created to an incoming equal record's values, used when a
    /// refreshed copy of a cached record arrives.
    pub fn reset_ttl(&mut self, other: &Record) {
        self.ttl = other.ttl;
        self.created = other.created;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now_millis;

    fn addr_record(ttl: u32, created: u64) -> Record {
        Record::new(
            Name::new("host.local."),
            RecordClass::IN,
            true,
            ttl,
            created,
            RecordData::A(Ipv4Addr::new(127, 0, 0, 1)),
        )
    }

    #[test]
    fn expiration_and_staleness() {
        let created = 1_000_000u64;
        let r = addr_record(10, created); // ttl=10s
        assert!(!r.is_expired(created + 9_999));
        assert!(r.is_expired(created + 10_000));
        assert!(!r.is_stale(created + 4_999));
        assert!(r.is_stale(created + 5_000));
    }

    #[test]
    fn suppression_uses_double_ttl_rule() {
        let now = now_millis();
        let mine = addr_record(100, now);
        let mut other_strong = addr_record(60, now); // 60*2=120 > 100 -> suppressed
        other_strong.ttl = 60;
        assert!(mine.suppressed_by_answer(&other_strong));

        let other_weak = addr_record(40, now); // 40*2=80 <= 100 -> not suppressed
        assert!(!mine.suppressed_by_answer(&other_weak));
    }

    #[test]
    fn equality_ignores_ttl_and_created() {
        let a = addr_record(10, 1);
        let b = addr_record(999, 999_999);
        assert!(a.matches(&b));
    }
}
