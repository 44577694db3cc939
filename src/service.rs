//! `ServiceInfo`: the advertisable/discoverable record a caller registers or
//! a resolver fills in. Keeps the TXT blob and the parsed properties map in
//! sync: building from the map produces the canonical blob; parsing a blob
//! produces a map where the first occurrence of a key wins.
use std::net::Ipv4Addr;

use crate::error::{DNSError, DNSResult};
use crate::name::Name;

/// A single TXT-record value: an opaque byte string, or a boolean flag
/// encoded by `"true"`/`"false"`/an empty value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bytes(Vec<u8>),
    Bool(bool),
}

impl PropertyValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Bytes(b) => Some(b),
            PropertyValue::Bool(_) => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Bytes(s.into_bytes())
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

/// Compatibility only (spec.md §9 open question): coerces by nonzero-ness.
/// Prefer `bool` directly.
impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Bool(n != 0)
    }
}

/// An insertion-ordered key/value map, matching the "first occurrence wins"
/// parse rule and giving deterministic round-trip ordering for the TXT blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Vec<(String, PropertyValue)>);

impl Properties {
    pub fn new() -> Properties {
        Properties(Vec::new())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        let key = key.into();
        if let Some(existing) = self.0.iter_mut().find(|(k, _)| k == &key) {
            existing.1 = value.into();
        } else {
            self.0.push((key, value.into()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, PropertyValue)> {
        self.0.iter()
    }

    /// Builds the canonical TXT blob: the concatenation of length-prefixed
    /// `key=value` entries. Booleans serialize to `"true"`,
    /// `"false"`, or (rarely used) an empty value for a bare key.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::new();
        for (key, value) in &self.0 {
            let mut entry = key.clone().into_bytes();
            match value {
                PropertyValue::Bytes(b) => {
                    entry.push(b'=');
                    entry.extend_from_slice(b);
                }
                PropertyValue::Bool(true) => {
                    entry.extend_from_slice(b"=true");
                }
                PropertyValue::Bool(false) => {
                    entry.extend_from_slice(b"=false");
                }
            }
            // RFC 6763 caps a single TXT entry at 255 bytes; truncate rather
            // than silently drop so register_service never corrupts later
            // entries in the blob.
            let entry = if entry.len() > 255 { &entry[..255] } else { &entry[..] };
            blob.push(entry.len() as u8);
            blob.extend_from_slice(entry);
        }
        blob
    }

    /// Parses a TXT blob into a properties map: first occurrence of a key
    /// wins, `"true"`/`"false"`/empty values become booleans, and entries
    /// without `=` become `key -> false`.
    pub fn from_blob(blob: &[u8]) -> Properties {
        let mut props = Properties::new();
        let mut pos = 0usize;
        while pos < blob.len() {
            let len = blob[pos] as usize;
            pos += 1;
            if pos + len > blob.len() {
                break;
            }
            let entry = &blob[pos..pos + len];
            pos += len;

            if entry.is_empty() {
                continue;
            }

            let (key, value) = match entry.iter().position(|&b| b == b'=') {
                Some(eq) => {
                    let key = String::from_utf8_lossy(&entry[..eq]).into_owned();
                    let raw = &entry[eq + 1..];
                    let value = match raw {
                        b"true" => PropertyValue::Bool(true),
                        b"false" => PropertyValue::Bool(false),
                        b"" => PropertyValue::Bool(false),
                        other => PropertyValue::Bytes(other.to_vec()),
                    };
                    (key, value)
                }
                None => (String::from_utf8_lossy(entry).into_owned(), PropertyValue::Bool(false)),
            };

            if props.get(&key).is_none() {
                props.set(key, value);
            }
        }
        props
    }
}

/// The advertisable/discoverable record for one service instance.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub service_type: Name,
    pub instance_name: Name,
    pub address: Option<Ipv4Addr>,
    pub port: u16,
    pub weight: u16,
    pub priority: u16,
    pub server: Name,
    pub properties: Properties,
}

impl ServiceInfo {
    /// Builds a new `ServiceInfo`. `instance_name` must end with
    /// `service_type`; `server` defaults to `instance_name` when not given.
    pub fn new(
        service_type: &str,
        instance_name: &str,
        address: Option<Ipv4Addr>,
        port: u16,
        weight: u16,
        priority: u16,
        server: Option<&str>,
        properties: Properties,
    ) -> DNSResult<ServiceInfo> {
        let service_type = Name::new(service_type);
        let instance_name = Name::new(instance_name);

        if !instance_name.ends_with(&service_type) {
            return Err(DNSError::BadInstanceName(instance_name.as_str().to_string()));
        }

        let server = match server {
            Some(s) => Name::new(s),
            None => instance_name.clone(),
        };

        Ok(ServiceInfo { service_type, instance_name, address, port, weight, priority, server, properties })
    }

    pub fn text_blob(&self) -> Vec<u8> {
        self.properties.to_blob()
    }

    /// Rewrites `instance_name` (and, if it tracked the old value, `server`)
    /// to a mangled form `name.[address:port].type` so a uniqueness probe
    /// can retry with a different candidate name.
    pub fn mangle_name(&mut self) {
        let had_default_server = self.server == self.instance_name;

        let base = self
            .instance_name
            .as_str()
            .strip_suffix(self.service_type.as_str())
            .unwrap_or(self.instance_name.as_str())
            .trim_end_matches('.');

        let addr = self.address.map(|a| a.to_string()).unwrap_or_else(|| "0.0.0.0".to_string());
        let mangled = format!("{}.[{}:{}].{}", base, addr, self.port, self.service_type.as_str());
        self.instance_name = Name::new(&mangled);

        if had_default_server {
            self.server = self.instance_name.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_blob_round_trips_through_properties() {
        let mut props = Properties::new();
        props.set("version", "0.10");
        props.set("a", "test value");
        props.set("b", "another value");

        let blob = props.to_blob();
        assert_eq!(blob, b"\x07version=0.10\x0ba=test value\x10b=another value".to_vec());

        let parsed = Properties::from_blob(&blob);
        assert_eq!(parsed, props);
    }

    #[test]
    fn fixed_blob_decodes_to_expected_map() {
        let blob = b"\x07version=0.10\x0ba=test value\x10b=another value";
        let props = Properties::from_blob(blob);
        assert_eq!(props.get("version").unwrap().as_bytes().unwrap(), b"0.10");
        assert_eq!(props.get("a").unwrap().as_bytes().unwrap(), b"test value");
        assert_eq!(props.get("b").unwrap().as_bytes().unwrap(), b"another value");
    }

    #[test]
    fn boolean_coercion_and_bare_keys() {
        let blob = b"\x09flag=true\x0aother=false\x03bare";
        let props = Properties::from_blob(blob);
        assert_eq!(props.get("flag"), Some(&PropertyValue::Bool(true)));
        assert_eq!(props.get("other"), Some(&PropertyValue::Bool(false)));
        assert_eq!(props.get("bare"), Some(&PropertyValue::Bool(false)));
    }

    #[test]
    fn first_occurrence_of_duplicate_key_wins() {
        let blob = b"\x05a=one\x05a=two";
        let props = Properties::from_blob(blob);
        assert_eq!(props.get("a").unwrap().as_bytes().unwrap(), b"one");
    }

    #[test]
    fn instance_name_must_end_with_service_type() {
        let err = ServiceInfo::new("_http._tcp.local.", "Bogus._ftp._tcp.local.", None, 1234, 0, 0, None, Properties::new());
        assert!(matches!(err, Err(DNSError::BadInstanceName(_))));
    }

    #[test]
    fn register_scenario_one() {
        let mut props = Properties::new();
        props.set("version", "0.10");
        props.set("a", "test value");
        props.set("b", "another value");

        let info = ServiceInfo::new(
            "_http._tcp.local.",
            "My Service._http._tcp.local.",
            Some(Ipv4Addr::new(127, 0, 0, 1)),
            1234,
            0,
            0,
            None,
            props,
        )
        .unwrap();

        assert_eq!(info.address, Some(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(info.port, 1234);
        assert_eq!(info.server, info.instance_name);
    }

    #[test]
    fn mangle_name_inserts_address_and_port() {
        let mut info = ServiceInfo::new("_http._tcp.local.", "My Service._http._tcp.local.", Some(Ipv4Addr::new(10, 0, 0, 1)), 1234, 0, 0, None, Properties::new()).unwrap();
        info.mangle_name();
        assert!(info.instance_name.as_str().contains("[10.0.0.1:1234]"));
        assert!(info.instance_name.ends_with(&info.service_type));
    }
}
