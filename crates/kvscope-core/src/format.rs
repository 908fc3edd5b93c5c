//! Reply output strategies.
//!
//! Every strategy implements [`ReplyFormatter`] and is chosen at runtime
//! through [`OutputFormat`]; callers only see `&dyn ReplyFormatter`.
//!
//! - **Raw** (default): structural recursion producing a JSON tree of the
//!   same shape, with binary payloads decoded to text.
//! - **Text**: redis-cli style rendering returned as one JSON string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::reply::ReplyValue;

/// Strategy turning a raw reply into JSON-safe output.
pub trait ReplyFormatter: Send + Sync {
    fn format(&self, reply: &ReplyValue) -> Value;
}

/// Output format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Raw,
    Text,
}

impl OutputFormat {
    /// Instantiate the strategy for this format.
    pub fn formatter(self) -> Box<dyn ReplyFormatter> {
        match self {
            Self::Raw => Box::new(RawFormatter),
            Self::Text => Box::new(TextFormatter),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Text => write!(f, "text"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "json" => Ok(Self::Raw),
            "text" | "cli" => Ok(Self::Text),
            other => Err(format!("unknown output format {other:?} (expected raw or text)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw
// ---------------------------------------------------------------------------

/// Shape-preserving normalization into plain JSON.
///
/// Bulk payloads are decoded as UTF-8 with invalid sequences replaced;
/// callers are expected to know the payload is text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFormatter;

impl ReplyFormatter for RawFormatter {
    fn format(&self, reply: &ReplyValue) -> Value {
        match reply {
            ReplyValue::Bulk(data) => Value::String(String::from_utf8_lossy(data).into_owned()),
            ReplyValue::Array(items) => Value::Array(items.iter().map(|i| self.format(i)).collect()),
            ReplyValue::Map(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    out.insert(key.clone(), self.format(value));
                }
                Value::Object(out)
            }
            ReplyValue::Nil => Value::Null,
            ReplyValue::Bool(b) => Value::Bool(*b),
            ReplyValue::Integer(n) => Value::from(*n),
            ReplyValue::Double(d) => Number::from_f64(*d).map_or(Value::Null, Value::Number),
            ReplyValue::Status(s) | ReplyValue::Error(s) => Value::String(s.clone()),
        }
    }
}

/// Convenience for the default strategy.
pub fn normalize(reply: &ReplyValue) -> Value {
    RawFormatter.format(reply)
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// redis-cli style text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl ReplyFormatter for TextFormatter {
    fn format(&self, reply: &ReplyValue) -> Value {
        Value::String(render(reply))
    }
}

/// Render a reply as redis-cli would print it.
pub fn render(reply: &ReplyValue) -> String {
    match reply {
        ReplyValue::Nil => "(nil)".to_string(),
        ReplyValue::Bool(true) => "(true)".to_string(),
        ReplyValue::Bool(false) => "(false)".to_string(),
        ReplyValue::Integer(n) => format!("(integer) {n}"),
        ReplyValue::Double(d) => format!("(double) {d}"),
        ReplyValue::Status(s) => s.clone(),
        ReplyValue::Error(s) => format!("(error) {s}"),
        ReplyValue::Bulk(data) => quote(data),
        ReplyValue::Array(items) if items.is_empty() => "(empty list or set)".to_string(),
        ReplyValue::Map(entries) if entries.is_empty() => "(empty hash)".to_string(),
        ReplyValue::Array(items) => {
            let width = items.len().to_string().len();
            let rows = items
                .iter()
                .enumerate()
                .map(|(i, item)| (format!("{:>width$}) ", i + 1), render(item)));
            hang(rows)
        }
        ReplyValue::Map(entries) => {
            let width = entries.len().to_string().len();
            let rows = entries.iter().enumerate().map(|(i, (key, value))| {
                let prefix = format!("{:>width$}# {} => ", i + 1, quote(key.as_bytes()));
                (prefix, render(value))
            });
            hang(rows)
        }
    }
}

/// Join `(prefix, body)` rows, indenting continuation lines of each body
/// under its first line.
fn hang(rows: impl Iterator<Item = (String, String)>) -> String {
    let mut lines = Vec::new();
    for (prefix, body) in rows {
        let pad = " ".repeat(prefix.chars().count());
        let mut body_lines = body.lines();
        lines.push(format!("{prefix}{}", body_lines.next().unwrap_or("")));
        for line in body_lines {
            lines.push(format!("{pad}{line}"));
        }
    }
    lines.join("\n")
}

/// Double-quoted, with non-printable bytes escaped.
fn quote(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + 2);
    out.push('"');
    for &b in data {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('"');
    out
}
