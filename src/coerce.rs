//! Dynamic value to canonical document coercion.

use crate::document::CanonicalDocument;
use crate::errors::{DocumentRole, KeyShape, OpError};
use crate::value::{DataRow, DynamicValue, bson_type_name};
use bson::Bson;

/// Coerce a runtime value into a canonical document.
///
/// `role` only affects the diagnostic of an unsupported shape.
///
/// # Errors
/// - `Parse` when text, or bytes read as UTF-8 text, is not valid document
///   notation.
/// - `NonStringKey` when a mapping or pair carries a non-text key.
/// - `UnsupportedType` for any other shape, including `None`.
pub fn coerce(value: DynamicValue, role: DocumentRole) -> Result<CanonicalDocument, OpError> {
    match value {
        DynamicValue::Text(text) => from_text(&text),
        DynamicValue::Mapping(entries) => from_mapping(entries),
        DynamicValue::Pair { left, right } => from_pair(left, right),
        DynamicValue::Row(row) => Ok(from_row(row)),
        DynamicValue::Bytes(bytes) => from_bytes(bytes),
        other @ (DynamicValue::None | DynamicValue::Scalar(_) | DynamicValue::List(_)) => {
            Err(OpError::UnsupportedType { type_name: other.type_name(), role })
        }
    }
}

fn from_text(text: &str) -> Result<CanonicalDocument, OpError> {
    CanonicalDocument::parse(text)
}

fn from_bytes(bytes: Vec<u8>) -> Result<CanonicalDocument, OpError> {
    let text = String::from_utf8(bytes)
        .map_err(|e| OpError::Parse(format!("document bytes are not UTF-8: {e}")))?;
    from_text(&text)
}

fn from_mapping(entries: Vec<(Bson, Bson)>) -> Result<CanonicalDocument, OpError> {
    if let Some((key, _)) = entries.iter().find(|(k, _)| !matches!(k, Bson::String(_))) {
        return Err(OpError::NonStringKey { key_type: bson_type_name(key), shape: KeyShape::Mapping });
    }
    Ok(entries
        .into_iter()
        .filter_map(|(k, v)| match k {
            Bson::String(k) => Some((k, v)),
            _ => None,
        })
        .collect())
}

fn from_pair(left: Bson, right: Bson) -> Result<CanonicalDocument, OpError> {
    match left {
        Bson::String(key) => Ok(CanonicalDocument::single(key, right)),
        other => Err(OpError::NonStringKey { key_type: bson_type_name(&other), shape: KeyShape::Pair }),
    }
}

fn from_row(row: DataRow) -> CanonicalDocument {
    row.into_columns().collect()
}
