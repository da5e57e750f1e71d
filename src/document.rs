//! Canonical documents: the normalized, string-keyed form every filter and
//! update body takes before it reaches the store.

mod notation;

pub use notation::normalize_relaxed;

use crate::errors::OpError;
use bson::{Bson, Document as BsonDocument};
use std::fmt;

/// An ordered, string-keyed document. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanonicalDocument(BsonDocument);

impl CanonicalDocument {
    #[must_use]
    pub fn single(key: String, value: Bson) -> Self {
        let mut d = BsonDocument::new();
        d.insert(key, value);
        Self(d)
    }

    /// Parse document notation. Accepts strict JSON, extended JSON and the
    /// relaxed shell form (`{ _id: 1, name: 'Ada' }`). The top level must be an object.
    ///
    /// # Errors
    /// Returns `OpError::Parse` if the text is not a well-formed document.
    pub fn parse(text: &str) -> Result<Self, OpError> {
        let strict = normalize_relaxed(text)?;
        let value: serde_json::Value =
            serde_json::from_str(&strict).map_err(|e| OpError::Parse(e.to_string()))?;
        let serde_json::Value::Object(obj) = value else {
            return Err(OpError::Parse("expected a document at the top level".into()));
        };
        let doc = BsonDocument::try_from(obj).map_err(|e| OpError::Parse(e.to_string()))?;
        Ok(Self(doc))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bson)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub const fn as_bson(&self) -> &BsonDocument {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> BsonDocument {
        self.0
    }
}

impl FromIterator<(String, Bson)> for CanonicalDocument {
    fn from_iter<I: IntoIterator<Item = (String, Bson)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BsonDocument> for CanonicalDocument {
    fn from(d: BsonDocument) -> Self {
        Self(d)
    }
}

impl fmt::Display for CanonicalDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
