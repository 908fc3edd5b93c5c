//! Raw command reply tree.

use redis::Value;

/// One reply value as received from a node.
///
/// Replies are trees by construction: a value owns its children and no
/// reference cycles can exist.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyValue {
    Nil,
    Bool(bool),
    Integer(i64),
    Double(f64),
    /// Simple status line such as `OK`.
    Status(String),
    /// Error reply text, e.g. `ERR unknown command`.
    Error(String),
    /// Binary-safe payload.
    Bulk(Vec<u8>),
    Array(Vec<ReplyValue>),
    /// Associative reply. Entries keep wire order and only hold the pairs
    /// the node sent.
    Map(Vec<(String, ReplyValue)>),
}

impl ReplyValue {
    /// Bulk payload from anything byte-like.
    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        Self::Bulk(data.into())
    }

    /// Text content of a bulk or status reply.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Bulk(data) => Some(String::from_utf8_lossy(data).into_owned()),
            Self::Status(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Short type name, used in log and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::Status(_) => "status",
            Self::Error(_) => "error",
            Self::Bulk(_) => "bulk",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }
}

impl From<Value> for ReplyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Nil => Self::Nil,
            Value::Okay => Self::Status("OK".to_string()),
            Value::SimpleString(s) => Self::Status(s),
            Value::Int(n) => Self::Integer(n),
            Value::Double(d) => Self::Double(d),
            Value::Boolean(b) => Self::Bool(b),
            Value::BulkString(data) => Self::Bulk(data),
            Value::VerbatimString { text, .. } => Self::Bulk(text.into_bytes()),
            Value::BigNumber(n) => Self::Bulk(n.to_string().into_bytes()),
            Value::Array(items) | Value::Set(items) | Value::Push { data: items, .. } => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            Value::Map(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (map_key(Self::from(k)), Self::from(v)))
                    .collect(),
            ),
            Value::Attribute { data, .. } => Self::from(*data),
            Value::ServerError(err) => Self::Error(match err.details() {
                Some(detail) => format!("{} {detail}", err.code()),
                None => err.code().to_string(),
            }),
        }
    }
}

/// Map keys are strings in the reply model; non-text keys use their
/// printed form.
fn map_key(key: ReplyValue) -> String {
    match key {
        ReplyValue::Bulk(data) => String::from_utf8_lossy(&data).into_owned(),
        ReplyValue::Status(s) | ReplyValue::Error(s) => s,
        ReplyValue::Integer(n) => n.to_string(),
        ReplyValue::Double(d) => d.to_string(),
        ReplyValue::Bool(b) => b.to_string(),
        ReplyValue::Nil => String::new(),
        other => other.kind().to_string(),
    }
}
