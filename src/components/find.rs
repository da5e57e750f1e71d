use super::{Processor, StageTracker};
use crate::coerce::coerce;
use crate::config::FindConfig;
use crate::errors::{DocumentRole, OpError};
use crate::eval::ExpressionEvaluator;
use crate::message::{FlowContext, Message, MessageAttributes, Payload};
use crate::resolve::{ResolvedFilter, resolve_filter};
use crate::store::{ConnectionLease, ConnectionProvider};
use bson::Document as BsonDocument;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindStage {
    Idle,
    FilterResolved,
    Querying,
    Collected,
    Done,
}

/// Retrieves documents from one collection. Results are fully materialized
/// before `apply` returns.
pub struct Find {
    config: FindConfig,
    evaluator: Arc<dyn ExpressionEvaluator>,
    lease: ConnectionLease,
}

impl Find {
    /// Validate the configuration and acquire the connection.
    ///
    /// # Errors
    /// `Config` for a blank collection name, or the provider's acquisition error.
    pub fn new(
        config: FindConfig,
        provider: Arc<dyn ConnectionProvider>,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> Result<Self, OpError> {
        config.validate()?;
        let lease = ConnectionLease::acquire(provider, config.connection.clone())?;
        Ok(Self { config, evaluator, lease })
    }

    #[must_use]
    pub const fn config(&self) -> &FindConfig {
        &self.config
    }

    fn run(
        &self,
        ctx: &FlowContext,
        message: &Message,
        stage: &mut StageTracker<FindStage>,
    ) -> Result<Vec<BsonDocument>, OpError> {
        let filter = resolve_filter(self.config.filter.as_ref(), &*self.evaluator, ctx, message)?;
        stage.advance(FindStage::FilterResolved);
        let filter = match filter {
            ResolvedFilter::MatchAll => None,
            ResolvedFilter::Value(v) => Some(coerce(v, DocumentRole::Query)?),
        };

        let collection = self.lease.collection(&self.config.collection)?;
        stage.advance(FindStage::Querying);
        let docs = collection.find(filter.as_ref())?.collect::<Result<Vec<_>, _>>()?;
        stage.advance(FindStage::Collected);
        Ok(docs)
    }
}

impl std::fmt::Debug for Find {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Find").field("config", &self.config).field("lease", &self.lease).finish()
    }
}

impl Processor for Find {
    fn apply(&self, ctx: &FlowContext, message: &Message) -> Result<Message, OpError> {
        let mut stage = StageTracker::new("find", ctx, FindStage::Idle);
        let docs = self.run(ctx, message, &mut stage).map_err(|e| stage.fail(e))?;
        stage.advance(FindStage::Done);
        log::info!(
            "[{}] find on '{}' returned {} documents",
            ctx.flow_id,
            self.config.collection,
            docs.len()
        );
        Ok(Message { payload: Payload::Documents(docs), attributes: MessageAttributes::default() })
    }
}
