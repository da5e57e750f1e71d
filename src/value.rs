//! Runtime values handed to the coercion layer by an expression evaluator or
//! carried as a message payload.

mod row;

pub use row::{DataRow, field_to_bson};

use crate::errors::OpError;
use bson::Bson;

/// A loosely-typed runtime value.
///
/// `Text`, `Mapping`, `Pair` and `Row` are the shapes the coercion layer turns
/// into documents, and `Bytes` are read as UTF-8 text. `None`, `Scalar` and
/// `List` can be produced by a host but are never turned into documents.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DynamicValue {
    #[default]
    None,
    Text(String),
    /// Key/value entries in insertion order. Keys are arbitrary runtime values.
    Mapping(Vec<(Bson, Bson)>),
    Pair { left: Bson, right: Bson },
    Row(DataRow),
    Scalar(Bson),
    Bytes(Vec<u8>),
    List(Vec<DynamicValue>),
}

impl DynamicValue {
    pub fn pair(left: impl Into<Bson>, right: impl Into<Bson>) -> Self {
        Self::Pair { left: left.into(), right: right.into() }
    }

    pub fn mapping<K, V, I>(entries: I) -> Self
    where
        K: Into<Bson>,
        V: Into<Bson>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Name of the runtime shape, used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Text(_) => "text".to_string(),
            Self::Mapping(_) => "map".to_string(),
            Self::Pair { .. } => "pair".to_string(),
            Self::Row(_) => "row".to_string(),
            Self::Scalar(b) => bson_type_name(b),
            Self::Bytes(_) => "bytes".to_string(),
            Self::List(_) => "list".to_string(),
        }
    }

    /// Emptiness shared by expression results and message payloads.
    ///
    /// A pair and a scalar are never empty; `Scalar(Bson::Null)` is treated as absent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None | Self::Scalar(Bson::Null) => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Mapping(entries) => entries.is_empty(),
            Self::Row(row) => row.is_empty(),
            Self::Bytes(b) => b.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Pair { .. } | Self::Scalar(_) => false,
        }
    }

    /// Lift a single BSON value: strings become text, documents become mappings.
    #[must_use]
    pub fn from_bson(value: Bson) -> Self {
        match value {
            Bson::Null => Self::None,
            Bson::String(s) => Self::Text(s),
            Bson::Document(d) => d.into(),
            Bson::Binary(b) => Self::Bytes(b.bytes),
            Bson::Array(items) => Self::List(items.into_iter().map(Self::from_bson).collect()),
            other => Self::Scalar(other),
        }
    }

    /// Lift a JSON value into the closest runtime shape: objects become
    /// mappings, strings become text, arrays become lists. Object values are
    /// read as extended JSON.
    ///
    /// # Errors
    /// Returns `OpError::Parse` when a value is malformed extended JSON, such
    /// as `{"$oid": "not-hex"}`.
    pub fn from_json(value: serde_json::Value) -> Result<Self, OpError> {
        use serde_json::Value as J;
        let to_bson = |v: J| Bson::try_from(v).map_err(|e| OpError::Parse(e.to_string()));
        Ok(match value {
            J::Null => Self::None,
            J::String(s) => Self::Text(s),
            J::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect::<Result<_, _>>()?)
            }
            J::Object(map) => Self::Mapping(
                map.into_iter()
                    .map(|(k, v)| Ok((Bson::String(k), to_bson(v)?)))
                    .collect::<Result<_, OpError>>()?,
            ),
            other => Self::Scalar(to_bson(other)?),
        })
    }
}

impl From<&str> for DynamicValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for DynamicValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bson::Document> for DynamicValue {
    fn from(d: bson::Document) -> Self {
        Self::Mapping(d.into_iter().map(|(k, v)| (Bson::String(k), v)).collect())
    }
}

impl From<DataRow> for DynamicValue {
    fn from(row: DataRow) -> Self {
        Self::Row(row)
    }
}

impl From<Vec<u8>> for DynamicValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// BSON element type name, e.g. `Int32` or `String`.
#[must_use]
pub fn bson_type_name(v: &Bson) -> String {
    format!("{:?}", v.element_type())
}
