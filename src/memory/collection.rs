use super::filter::{Filter, compile, eval_filter};
use super::update::{UpdateDoc, upsert_seed};
use crate::document::CanonicalDocument;
use crate::errors::OpError;
use crate::logger::AUDIT_TARGET;
use crate::store::{Cursor, StoreCollection, UpdateOptions, UpdateOutcome};
use bson::{Bson, Document as BsonDocument, oid::ObjectId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self { created_at: now, updated_at: now }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A document as the store keeps it: user data plus bookkeeping that is never
/// returned to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub data: BsonDocument,
    pub metadata: Metadata,
}

impl StoredDocument {
    #[must_use]
    pub fn new(data: BsonDocument) -> Self {
        Self { id: DocumentId::new(), data, metadata: Metadata::new() }
    }

    pub fn update(&mut self, new_data: BsonDocument) {
        self.data = new_data;
        self.metadata.updated_at = Utc::now();
    }
}

#[derive(Default)]
struct Inner {
    order: Vec<DocumentId>,
    docs: HashMap<DocumentId, StoredDocument>,
}

impl Inner {
    fn push(&mut self, doc: StoredDocument) -> DocumentId {
        let id = doc.id;
        self.order.push(id);
        self.docs.insert(id, doc);
        id
    }

    fn matching(&self, filter: &Filter) -> impl Iterator<Item = &DocumentId> {
        self.order
            .iter()
            .filter(move |id| self.docs.get(*id).is_some_and(|d| eval_filter(&d.data, filter)))
    }
}

/// An in-memory collection. Insertion order is the native scan order.
pub struct MemoryCollection {
    name: String,
    inner: RwLock<Inner>,
}

impl MemoryCollection {
    #[must_use]
    pub fn new(name: String) -> Self {
        Self { name, inner: RwLock::new(Inner::default()) }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert_document(&self, data: BsonDocument) -> DocumentId {
        let id = self.inner.write().push(StoredDocument::new(data));
        log::debug!("insert into '{}': {}", self.name, id.0);
        id
    }

    pub fn insert_many<I: IntoIterator<Item = BsonDocument>>(&self, docs: I) -> usize {
        let mut inner = self.inner.write();
        docs.into_iter().map(|d| inner.push(StoredDocument::new(d))).count()
    }

    #[must_use]
    pub fn find_document(&self, id: &DocumentId) -> Option<StoredDocument> {
        self.inner.read().docs.get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All documents in native order.
    #[must_use]
    pub fn get_all_documents(&self) -> Vec<BsonDocument> {
        let inner = self.inner.read();
        inner.order.iter().filter_map(|id| inner.docs.get(id)).map(|d| d.data.clone()).collect()
    }

    fn update(
        &self,
        filter: &CanonicalDocument,
        update: &CanonicalDocument,
        options: UpdateOptions,
        limit_one: bool,
    ) -> Result<UpdateOutcome, OpError> {
        let compiled = compile(filter.as_bson())?;
        let upd = UpdateDoc::compile(update.as_bson())?;
        let mut inner = self.inner.write();
        let mut ids: Vec<DocumentId> = inner.matching(&compiled).copied().collect();
        if limit_one {
            ids.truncate(1);
        }

        // Stage every change first so a rejected document leaves the collection untouched.
        let mut staged = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(stored) = inner.docs.get(id) {
                let mut next = stored.data.clone();
                if upd.apply(&mut next)? {
                    staged.push((*id, next));
                }
            }
        }
        let matched_count = ids.len() as u64;
        let modified_count = staged.len() as u64;
        for (id, next) in staged {
            if let Some(stored) = inner.docs.get_mut(&id) {
                stored.update(next);
            }
        }

        let mut upserted_id = None;
        if matched_count == 0 && options.upsert {
            let mut seed = upsert_seed(filter.as_bson())?;
            upd.apply(&mut seed)?;
            let id = match seed.get("_id") {
                Some(id) => id.clone(),
                None => {
                    let oid = Bson::ObjectId(ObjectId::new());
                    let mut with_id = BsonDocument::new();
                    with_id.insert("_id", oid.clone());
                    for (k, v) in seed {
                        with_id.insert(k, v);
                    }
                    seed = with_id;
                    oid
                }
            };
            inner.push(StoredDocument::new(seed));
            upserted_id = Some(id);
        }

        log::info!(
            target: AUDIT_TARGET,
            "update collection={} one={} matched={} modified={} upserted={}",
            self.name,
            limit_one,
            matched_count,
            modified_count,
            upserted_id.is_some()
        );
        Ok(UpdateOutcome { matched_count, modified_count, upserted_id })
    }
}

impl StoreCollection for MemoryCollection {
    fn find(&self, filter: Option<&CanonicalDocument>) -> Result<Cursor<'_>, OpError> {
        let compiled = match filter {
            Some(f) => compile(f.as_bson())?,
            None => Filter::True,
        };
        let ids: Vec<DocumentId> = self.inner.read().matching(&compiled).copied().collect();
        log::debug!("find on '{}' matched {} documents", self.name, ids.len());
        Ok(Box::new(MemoryCursor { collection: self, ids, pos: 0 }))
    }

    fn update_one(
        &self,
        filter: &CanonicalDocument,
        update: &CanonicalDocument,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome, OpError> {
        self.update(filter, update, options, true)
    }

    fn update_many(
        &self,
        filter: &CanonicalDocument,
        update: &CanonicalDocument,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome, OpError> {
        self.update(filter, update, options, false)
    }
}

/// Walks matched ids and fetches each document when it is pulled.
pub struct MemoryCursor<'a> {
    collection: &'a MemoryCollection,
    ids: Vec<DocumentId>,
    pos: usize,
}

impl Iterator for MemoryCursor<'_> {
    type Item = Result<BsonDocument, OpError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.ids.get(self.pos) {
            self.pos += 1;
            if let Some(doc) = self.collection.find_document(id) {
                return Some(Ok(doc.data));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn parse(s: &str) -> CanonicalDocument {
        CanonicalDocument::parse(s).unwrap()
    }

    #[test]
    fn find_returns_user_data_in_insertion_order() {
        let col = MemoryCollection::new("people".into());
        col.insert_many([doc! {"n": 2}, doc! {"n": 1}, doc! {"n": 3}]);
        let docs: Vec<_> = col.find(None).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(docs, vec![doc! {"n": 2}, doc! {"n": 1}, doc! {"n": 3}]);
    }

    #[test]
    fn update_one_touches_first_match_only() {
        let col = MemoryCollection::new("c".into());
        col.insert_many([doc! {"k": 1, "s": "a"}, doc! {"k": 1, "s": "a"}]);
        let out = col
            .update_one(&parse("{k: 1}"), &parse("{ $set: { s: 'b' } }"), UpdateOptions::default())
            .unwrap();
        assert_eq!((out.matched_count, out.modified_count), (1, 1));
        assert_eq!(col.get_all_documents(), vec![doc! {"k": 1, "s": "b"}, doc! {"k": 1, "s": "a"}]);
    }

    #[test]
    fn unchanged_documents_are_matched_not_modified() {
        let col = MemoryCollection::new("c".into());
        col.insert_many([doc! {"s": "a"}, doc! {"s": "b"}]);
        let out = col
            .update_many(&parse("{}"), &parse("{ s: 'a' }"), UpdateOptions::default())
            .unwrap();
        assert_eq!((out.matched_count, out.modified_count), (2, 1));
    }

    #[test]
    fn rejected_update_leaves_collection_untouched() {
        let col = MemoryCollection::new("c".into());
        col.insert_many([doc! {"v": 1}, doc! {"v": "text"}]);
        let err = col
            .update_many(&parse("{}"), &parse("{ $inc: { v: 1 } }"), UpdateOptions::default())
            .unwrap_err();
        assert!(matches!(err, OpError::Store(_)));
        assert_eq!(col.get_all_documents(), vec![doc! {"v": 1}, doc! {"v": "text"}]);
    }

    #[test]
    fn oversized_nin_fails_before_touching_documents() {
        let col = MemoryCollection::new("c".into());
        col.insert_many((0..1001).map(|i| doc! {"n": i}));
        let all: Vec<String> = (0..1001).map(|i| i.to_string()).collect();
        let filter = parse(&format!("{{ n: {{ $nin: [{}] }} }}", all.join(",")));
        let err = col
            .update_many(&filter, &parse("{ $set: { hit: true } }"), UpdateOptions::default())
            .unwrap_err();
        assert!(matches!(err, OpError::Store(_)));
        assert!(col.get_all_documents().iter().all(|d| !d.contains_key("hit")));
    }

    #[test]
    fn indexed_and_scalar_paths_in_updates() {
        let col = MemoryCollection::new("c".into());
        col.insert_many([doc! {"n": 5, "tags": ["a", "b"]}]);
        let out = col
            .update_one(&parse("{}"), &parse("{ $set: { 'tags.1': 'z' } }"), UpdateOptions::default())
            .unwrap();
        assert_eq!(out.modified_count, 1);
        let err = col
            .update_one(&parse("{}"), &parse("{ $set: { 'n.x': 1 } }"), UpdateOptions::default())
            .unwrap_err();
        assert!(matches!(err, OpError::Store(_)));
        assert_eq!(col.get_all_documents(), vec![doc! {"n": 5, "tags": ["a", "z"]}]);
    }

    #[test]
    fn upsert_inserts_seeded_document() {
        let col = MemoryCollection::new("c".into());
        let out = col
            .update_one(
                &parse("{ _id: 7 }"),
                &parse("{ $set: { status: 'new' } }"),
                UpdateOptions { upsert: true },
            )
            .unwrap();
        assert_eq!((out.matched_count, out.modified_count), (0, 0));
        assert_eq!(out.upserted_id, Some(Bson::Int32(7)));
        assert_eq!(col.get_all_documents(), vec![doc! {"_id": 7, "status": "new"}]);
    }

    #[test]
    fn upsert_without_id_generates_object_id() {
        let col = MemoryCollection::new("c".into());
        let out = col
            .update_many(&parse("{ name: 'x' }"), &parse("{ n: 1 }"), UpdateOptions { upsert: true })
            .unwrap();
        assert!(matches!(out.upserted_id, Some(Bson::ObjectId(_))));
        let docs = col.get_all_documents();
        assert_eq!(docs[0].keys().next().map(String::as_str), Some("_id"));
    }

    #[test]
    fn stored_document_tracks_updates() {
        let col = MemoryCollection::new("c".into());
        let id = col.insert_document(doc! {"a": 1});
        let before = col.find_document(&id).unwrap().metadata;
        col.update_one(&parse("{a: 1}"), &parse("{a: 2}"), UpdateOptions::default()).unwrap();
        let after = col.find_document(&id).unwrap().metadata;
        assert_eq!(before.created_at, after.created_at);
        assert!(after.updated_at >= before.updated_at);
    }
}
