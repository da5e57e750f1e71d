use super::{Processor, StageTracker};
use crate::coerce::coerce;
use crate::config::UpdateConfig;
use crate::document::CanonicalDocument;
use crate::errors::{DocumentRole, OpError};
use crate::eval::ExpressionEvaluator;
use crate::message::{FlowContext, Message, MessageAttributes, Payload, UpdateAttributes};
use crate::resolve::{ResolvedFilter, resolve_document, resolve_filter};
use crate::store::{ConnectionLease, ConnectionProvider, UpdateOptions, UpdateOutcome};
use crate::value::DynamicValue;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    Idle,
    QueryResolved,
    DocumentResolved,
    Coerced,
    Updating,
    Done,
}

/// Updates one or all documents matching the configured query.
///
/// The update document comes from the configured expression, or from the
/// inbound payload when the expression is absent or evaluates to an empty value.
/// With `many = false` the store decides which match is updated; the memory
/// store takes the first in insertion order.
pub struct Update {
    config: UpdateConfig,
    evaluator: Arc<dyn ExpressionEvaluator>,
    lease: ConnectionLease,
}

impl Update {
    /// Validate the configuration and acquire the connection.
    ///
    /// # Errors
    /// `Config` for a blank collection or a missing query, or the provider's
    /// acquisition error.
    pub fn new(
        config: UpdateConfig,
        provider: Arc<dyn ConnectionProvider>,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> Result<Self, OpError> {
        config.validate()?;
        let lease = ConnectionLease::acquire(provider, config.connection.clone())?;
        Ok(Self { config, evaluator, lease })
    }

    #[must_use]
    pub const fn config(&self) -> &UpdateConfig {
        &self.config
    }

    fn resolve_query(&self, ctx: &FlowContext, message: &Message) -> Result<DynamicValue, OpError> {
        match resolve_filter(self.config.query.as_ref(), &*self.evaluator, ctx, message)? {
            ResolvedFilter::Value(v) => Ok(v),
            // Only reachable if validation was bypassed.
            ResolvedFilter::MatchAll => Err(OpError::Config("query filter must not be empty".into())),
        }
    }

    fn run(
        &self,
        ctx: &FlowContext,
        message: &Message,
        stage: &mut StageTracker<UpdateStage>,
    ) -> Result<UpdateOutcome, OpError> {
        let query = self.resolve_query(ctx, message)?;
        stage.advance(UpdateStage::QueryResolved);

        let document = resolve_document(self.config.document.as_ref(), &*self.evaluator, ctx, message)?;
        stage.advance(UpdateStage::DocumentResolved);
        let query: CanonicalDocument = coerce(query, DocumentRole::Query)?;
        let document = coerce(document, DocumentRole::Update)?;
        stage.advance(UpdateStage::Coerced);

        let collection = self.lease.collection(&self.config.collection)?;
        let options = UpdateOptions { upsert: self.config.upsert };
        stage.advance(UpdateStage::Updating);
        if self.config.many {
            collection.update_many(&query, &document, options)
        } else {
            collection.update_one(&query, &document, options)
        }
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update").field("config", &self.config).field("lease", &self.lease).finish()
    }
}

impl Processor for Update {
    fn apply(&self, ctx: &FlowContext, message: &Message) -> Result<Message, OpError> {
        let mut stage = StageTracker::new("update", ctx, UpdateStage::Idle);
        let outcome = self.run(ctx, message, &mut stage).map_err(|e| stage.fail(e))?;
        stage.advance(UpdateStage::Done);
        log::info!(
            "[{}] update on '{}' (many={}) matched {} modified {}",
            ctx.flow_id,
            self.config.collection,
            self.config.many,
            outcome.matched_count,
            outcome.modified_count
        );
        let attributes = MessageAttributes::from_update(UpdateAttributes {
            matched_count: outcome.matched_count,
            modified_count: outcome.modified_count,
            upserted_id: outcome.upserted_id,
        });
        Ok(Message { payload: Payload::Count(outcome.modified_count), attributes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::eval::ScriptEvaluator;
    use crate::memory::{MemoryProvider, MemoryServer};
    use bson::{Bson, doc};

    fn provider() -> Arc<MemoryProvider> {
        let provider = Arc::new(MemoryProvider::new(Arc::new(MemoryServer::new())));
        provider.server().collection("db", "orders").insert_many([
            doc! {"_id": 1, "status": "pending"},
            doc! {"_id": 2, "status": "pending"},
        ]);
        provider
    }

    fn config(query: Option<&str>, document: Option<&str>, many: bool) -> UpdateConfig {
        UpdateConfig {
            connection: ConnectionConfig::new("main", "db"),
            collection: "orders".into(),
            query: query.map(Into::into),
            document: document.map(Into::into),
            many,
            upsert: false,
        }
    }

    #[test]
    fn missing_query_is_rejected_at_construction() {
        let err = Update::new(config(None, None, false), provider(), Arc::new(ScriptEvaluator))
            .unwrap_err();
        assert!(matches!(err, OpError::Config(_)));
    }

    #[test]
    fn update_one_projects_counts() {
        let p = provider();
        let update = Update::new(
            config(Some("{ _id: 1 }"), Some("{ $set: { status: 'shipped' } }"), false),
            p.clone(),
            Arc::new(ScriptEvaluator),
        )
        .unwrap();
        let out = update.apply(&FlowContext::new(), &Message::default()).unwrap();
        assert_eq!(out.count(), Some(1));
        assert_eq!(out.attributes.get("matchedCount"), Some(&Bson::Int64(1)));
        let attrs = out.attributes.update().unwrap();
        assert_eq!((attrs.matched_count, attrs.modified_count, &attrs.upserted_id), (1, 1, &None));
    }

    #[test]
    fn payload_is_used_when_no_document_expression() {
        let p = provider();
        let update =
            Update::new(config(Some("{}"), None, true), p.clone(), Arc::new(ScriptEvaluator)).unwrap();
        let out = update
            .apply(&FlowContext::new(), &Message::with_value("{ status: 'done' }"))
            .unwrap();
        assert_eq!(out.count(), Some(2));
    }

    #[test]
    fn coercion_runs_after_both_inputs_resolved() {
        let update = Update::new(
            config(Some("#[context.q]"), Some("{ status: 'x' }"), false),
            provider(),
            Arc::new(ScriptEvaluator),
        )
        .unwrap();
        let mut ctx = FlowContext::new();
        ctx.set("q", DynamicValue::Bytes(vec![0xff]));
        let mut stage = StageTracker::new("update", &ctx, UpdateStage::Idle);
        let err = update.run(&ctx, &Message::default(), &mut stage).unwrap_err();
        assert!(matches!(err, OpError::Parse(_)));
        assert_eq!(stage.current(), UpdateStage::DocumentResolved);
    }

    #[test]
    fn empty_document_and_payload_fail() {
        let update = Update::new(
            config(Some("{ _id: 1 }"), Some("#[null]"), false),
            provider(),
            Arc::new(ScriptEvaluator),
        )
        .unwrap();
        let err = update.apply(&FlowContext::new(), &Message::default()).unwrap_err();
        assert!(matches!(err, OpError::EmptyDocument { expression } if expression == "#[null]"));
    }
}
