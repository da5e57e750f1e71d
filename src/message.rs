//! Minimal host message container: payload, attributes and the per-execution context.

use crate::value::DynamicValue;
use bson::{Bson, Document as BsonDocument};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Inbound runtime value.
    Value(DynamicValue),
    /// Documents returned by a find, fully materialized.
    Documents(Vec<BsonDocument>),
    /// Number of documents modified by an update.
    Count(u64),
}

impl Default for Payload {
    fn default() -> Self {
        Self::Value(DynamicValue::None)
    }
}

/// Structured result of an update, carried alongside the count payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateAttributes {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

impl UpdateAttributes {
    fn write_into(&self, attrs: &mut MessageAttributes) {
        attrs.insert("matchedCount", count_to_bson(self.matched_count));
        attrs.insert("modifiedCount", count_to_bson(self.modified_count));
        if let Some(id) = &self.upserted_id {
            attrs.insert("upsertedId", id.clone());
        }
    }
}

fn count_to_bson(n: u64) -> Bson {
    i64::try_from(n).map_or(Bson::Double(n as f64), Bson::Int64)
}

/// String-keyed message attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageAttributes {
    entries: BsonDocument,
    update: Option<UpdateAttributes>,
}

impl MessageAttributes {
    pub fn insert(&mut self, key: &str, value: impl Into<Bson>) {
        self.entries.insert(key.to_string(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.entries.get(key)
    }

    #[must_use]
    pub const fn as_document(&self) -> &BsonDocument {
        &self.entries
    }

    /// Typed update result, when this message came out of an update.
    #[must_use]
    pub const fn update(&self) -> Option<&UpdateAttributes> {
        self.update.as_ref()
    }

    #[must_use]
    pub fn from_update(update: UpdateAttributes) -> Self {
        let mut attrs = Self::default();
        update.write_into(&mut attrs);
        attrs.update = Some(update);
        attrs
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub payload: Payload,
    pub attributes: MessageAttributes,
}

impl Message {
    /// An inbound message carrying `value` as its payload.
    pub fn with_value(value: impl Into<DynamicValue>) -> Self {
        Self { payload: Payload::Value(value.into()), attributes: MessageAttributes::default() }
    }

    /// The payload as a runtime value. Output payloads are not runtime values and read as `None`.
    #[must_use]
    pub fn value(&self) -> &DynamicValue {
        static NONE: DynamicValue = DynamicValue::None;
        match &self.payload {
            Payload::Value(v) => v,
            Payload::Documents(_) | Payload::Count(_) => &NONE,
        }
    }

    #[must_use]
    pub fn documents(&self) -> Option<&[BsonDocument]> {
        match &self.payload {
            Payload::Documents(docs) => Some(docs),
            _ => None,
        }
    }

    #[must_use]
    pub const fn count(&self) -> Option<u64> {
        match self.payload {
            Payload::Count(n) => Some(n),
            _ => None,
        }
    }
}

/// Variables visible to expressions during one flow execution.
#[derive(Debug, Clone)]
pub struct FlowContext {
    pub flow_id: Uuid,
    variables: HashMap<String, DynamicValue>,
}

impl Default for FlowContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowContext {
    #[must_use]
    pub fn new() -> Self {
        Self { flow_id: Uuid::new_v4(), variables: HashMap::new() }
    }

    pub fn set(&mut self, name: &str, value: impl Into<DynamicValue>) {
        self.variables.insert(name.to_string(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DynamicValue> {
        self.variables.get(name)
    }
}
