//! Pipeline components: Find and Update.

pub mod find;
pub mod update;

pub use find::{Find, FindStage};
pub use update::{Update, UpdateStage};

use crate::errors::OpError;
use crate::message::{FlowContext, Message};
use std::fmt;

/// A component that turns an inbound message into an outbound one.
pub trait Processor: Send + Sync {
    /// # Errors
    /// Any failure is terminal for this invocation.
    fn apply(&self, ctx: &FlowContext, message: &Message) -> Result<Message, OpError>;
}

/// Tracks the stage of one invocation and reports transitions at debug level.
pub(crate) struct StageTracker<S: Copy + fmt::Debug> {
    component: &'static str,
    flow_id: uuid::Uuid,
    current: S,
}

impl<S: Copy + fmt::Debug> StageTracker<S> {
    pub(crate) fn new(component: &'static str, ctx: &FlowContext, initial: S) -> Self {
        Self { component, flow_id: ctx.flow_id, current: initial }
    }

    pub(crate) fn advance(&mut self, next: S) {
        log::debug!("[{}] {}: {:?} -> {:?}", self.flow_id, self.component, self.current, next);
        self.current = next;
    }

    #[cfg(test)]
    pub(crate) const fn current(&self) -> S {
        self.current
    }

    /// Log a failure in the current stage and hand the error back.
    pub(crate) fn fail(&self, err: OpError) -> OpError {
        log::warn!("[{}] {} failed in {:?}: {err}", self.flow_id, self.component, self.current);
        err
    }
}
