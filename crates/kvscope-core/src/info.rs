//! Parser for the sectioned `INFO` status text.
//!
//! ```text
//! # Server
//! redis_version:7.2.4
//! uptime_in_seconds:3600
//!
//! # Keyspace
//! db0:keys=120,expires=3,avg_ttl=0
//! ```
//!
//! Parsing never fails. Lines without a `:` are dropped and callers read
//! fields through [`InfoSections::get`], treating absence as a normal case.

use std::collections::HashMap;

/// Field name → raw string value within one section.
pub type InfoFields = HashMap<String, String>;

/// Parsed `INFO` reply: lower-cased section name → fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoSections {
    sections: HashMap<String, InfoFields>,
}

impl InfoSections {
    /// Look up one field, `None` if the section or the field is absent.
    pub fn get(&self, section: &str, field: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|fields| fields.get(field))
            .map(String::as_str)
    }

    /// All fields of a section.
    pub fn section(&self, name: &str) -> Option<&InfoFields> {
        self.sections.get(name)
    }

    /// Section names, sorted for stable output.
    pub fn section_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Set a field, creating the section if needed.
    pub fn insert(&mut self, section: &str, field: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(field.to_string(), value.into());
    }
}

/// Parse a full `INFO` reply into sections.
///
/// Section headers are lines starting with `#`; the name is lower-cased.
/// Lines before the first header are ignored.
pub fn parse_info(text: &str) -> InfoSections {
    let mut out = InfoSections::default();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            let name = header.trim_start_matches('#').trim().to_lowercase();
            out.sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        let Some(section) = current.as_ref() else {
            continue;
        };
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        out.sections
            .entry(section.clone())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    out
}

/// Decode a delimited `key<kv_sep>value` list such as `keys=5,expires=1`.
///
/// Each entry is split at the first `kv_sep`; entries without one are
/// skipped.
pub fn parse_pairs(text: &str, entry_sep: char, kv_sep: char) -> HashMap<String, String> {
    text.split(entry_sep)
        .filter_map(|item| item.split_once(kv_sep))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Leading-integer parse: optional whitespace and sign, then digits.
///
/// `"12.7"` gives 12 and `" 42kb"` gives 42; text without leading digits gives
/// `None`.
pub fn parse_int_prefix(text: &str) -> Option<i64> {
    let s = text.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Server\r\nredis_version:7.2.4\r\nuptime_in_seconds:3600\r\n\r\n\
        # Clients\r\nconnected_clients:12\r\n\r\n\
        # Replication\r\nrole:master\r\nconnected_slaves:1\r\n\r\n\
        # Keyspace\r\ndb0:keys=120,expires=3,avg_ttl=0\r\ndb1:keys=4,expires=0,avg_ttl=0\r\n";

    #[test]
    fn test_parse_sections_and_fields() {
        let info = parse_info(SAMPLE);
        assert_eq!(info.get("server", "redis_version"), Some("7.2.4"));
        assert_eq!(info.get("clients", "connected_clients"), Some("12"));
        assert_eq!(info.get("replication", "role"), Some("master"));
        assert_eq!(
            info.get("keyspace", "db0"),
            Some("keys=120,expires=3,avg_ttl=0")
        );
        assert_eq!(
            info.section_names(),
            vec!["clients", "keyspace", "replication", "server"]
        );
    }

    #[test]
    fn test_value_split_at_first_colon() {
        let info = parse_info("# Server\nexecutable:/usr/bin/redis:server\n");
        assert_eq!(info.get("server", "executable"), Some("/usr/bin/redis:server"));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let info = parse_info("orphan:1\n# Stats\nno separator here\nops:5\n");
        assert_eq!(info.get("stats", "ops"), Some("5"));
        assert_eq!(info.section("stats").map(|s| s.len()), Some(1));
        assert!(info.section("orphan").is_none());
    }

    #[test]
    fn test_empty_section_present() {
        let info = parse_info("# Keyspace\r\n\r\n# CPU\r\nused_cpu_sys:1.5\r\n");
        assert!(info.section("keyspace").is_some_and(|s| s.is_empty()));
        assert_eq!(info.get("cpu", "used_cpu_sys"), Some("1.5"));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_info("").is_empty());
        assert_eq!(parse_info("").get("server", "redis_version"), None);
    }

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs("keys=5,expires=1,avg_ttl=0", ',', '=');
        assert_eq!(pairs.get("keys").map(String::as_str), Some("5"));
        assert_eq!(pairs.get("expires").map(String::as_str), Some("1"));
        assert_eq!(pairs.len(), 3);
        assert!(parse_pairs("garbage", ',', '=').is_empty());
    }

    #[test]
    fn test_parse_int_prefix() {
        assert_eq!(parse_int_prefix("42"), Some(42));
        assert_eq!(parse_int_prefix(" 12.7"), Some(12));
        assert_eq!(parse_int_prefix("-3x"), Some(-3));
        assert_eq!(parse_int_prefix("abc"), None);
        assert_eq!(parse_int_prefix(""), None);
        assert_eq!(parse_int_prefix("-"), None);
    }
}
