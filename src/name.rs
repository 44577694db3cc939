//! A DNS-style dotted label sequence, compared and hashed case-insensitively
//! per RFC 1035 (names are case-preserving on the wire, case-insensitive for
//! matching purposes).
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct Name(String);

impl Name {
    /// Builds a `Name` from a dotted string, adding a trailing `.` if absent.
    ///
    /// ```
    /// use mdns_sd_node::Name;
    ///
    /// assert_eq!(Name::new("_http._tcp.local").as_str(), "_http._tcp.local.");
    /// assert_eq!(Name::new("_HTTP._tcp.local."), Name::new("_http._tcp.local."));
    /// ```
    pub fn new(s: &str) -> Name {
        if s.ends_with('.') {
            Name(s.to_string())
        } else {
            Name(format!("{}.", s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lowercase form used as a cache/comparison key.
    pub fn key(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Labels with the trailing root label stripped, in wire order.
    pub fn labels(&self) -> Vec<&str> {
        self.0.trim_end_matches('.').split('.').filter(|l| !l.is_empty()).collect()
    }

    pub fn ends_with(&self, suffix: &Name) -> bool {
        self.key().ends_with(&suffix.key())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Name::new(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_dot_added() {
        assert_eq!(Name::new("My Service._http._tcp.local").as_str(), "My Service._http._tcp.local.");
        assert_eq!(Name::new("already.dotted.").as_str(), "already.dotted.");
    }

    #[test]
    fn equality_is_case_insensitive() {
        assert_eq!(Name::new("_HTTP._tcp.local."), Name::new("_http._tcp.LOCAL."));
    }

    #[test]
    fn ends_with_checks_suffix() {
        let instance = Name::new("My Service._http._tcp.local.");
        let ty = Name::new("_http._tcp.local.");
        assert!(instance.ends_with(&ty));
        assert!(!ty.ends_with(&instance));
    }
}
