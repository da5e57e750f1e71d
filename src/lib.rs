pub mod coerce;
pub mod components;
pub mod config;
pub mod document;
pub mod errors;
pub mod eval;
pub mod logger;
pub mod memory;
pub mod message;
pub mod resolve;
pub mod store;
pub mod value;

pub use coerce::coerce;
pub use components::{Find, Processor, Update};
pub use document::CanonicalDocument;
pub use errors::{DocumentRole, KeyShape, OpError};
pub use eval::{Expression, ExpressionEvaluator, ScriptEvaluator};
pub use message::{FlowContext, Message, Payload, UpdateAttributes};
pub use value::{DataRow, DynamicValue};

use crate::config::{FindConfig, UpdateConfig};
use crate::memory::{MemoryProvider, MemoryServer};
use crate::store::ConnectionProvider;
use std::sync::Arc;

/// Builds components that share one connection provider and one evaluator.
#[derive(Clone)]
pub struct Docflow {
    provider: Arc<dyn ConnectionProvider>,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl Docflow {
    pub fn new(provider: Arc<dyn ConnectionProvider>, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { provider, evaluator }
    }

    /// Components backed by an in-process store, with the script evaluator.
    #[must_use]
    pub fn in_memory(server: Arc<MemoryServer>) -> Self {
        Self::new(Arc::new(MemoryProvider::new(server)), Arc::new(ScriptEvaluator))
    }

    /// # Errors
    /// See [`Find::new`].
    pub fn find(&self, config: FindConfig) -> Result<Find, OpError> {
        Find::new(config, self.provider.clone(), self.evaluator.clone())
    }

    /// # Errors
    /// See [`Update::new`].
    pub fn update(&self, config: UpdateConfig) -> Result<Update, OpError> {
        Update::new(config, self.provider.clone(), self.evaluator.clone())
    }
}
