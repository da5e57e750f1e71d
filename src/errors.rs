use std::fmt;
use thiserror::Error;

/// Which input shape carried the offending key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    Mapping,
    Pair,
}

impl fmt::Display for KeyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapping => f.write_str("map"),
            Self::Pair => f.write_str("pair"),
        }
    }
}

/// What a coerced value was going to be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentRole {
    Query,
    Update,
}

impl fmt::Display for DocumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("query filter"),
            Self::Update => f.write_str("update document"),
        }
    }
}

#[derive(Debug, Error)]
pub enum OpError {
    #[error("{shape} key must be a string, found: {key_type}")]
    NonStringKey { key_type: String, shape: KeyShape },

    #[error("{role} type not supported: {type_name}")]
    UnsupportedType { type_name: String, role: DocumentRole },

    #[error("filter expression evaluated to null: {expression}")]
    NullFilter { expression: String },

    #[error("update document was empty (expression: {expression}) and the message payload was empty")]
    EmptyDocument { expression: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV: {0}")]
    Csv(#[from] csv::Error),
}

impl From<std::io::Error> for OpError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
