//! Expressions and the evaluator seam.
//!
//! An expression is either static text (a document literal) or a script wrapped
//! in `#[ ... ]`. The evaluation engine itself is pluggable through
//! [`ExpressionEvaluator`]; [`ScriptEvaluator`] covers the handful of script
//! forms flows actually use to point at the message or the context.

use crate::errors::OpError;
use crate::message::{FlowContext, Message};
use crate::value::DynamicValue;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression(String);

impl Expression {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// The body of a `#[ ... ]` script, or `None` for static text.
    #[must_use]
    pub fn script_body(&self) -> Option<&str> {
        let t = self.0.trim();
        t.strip_prefix("#[").and_then(|s| s.strip_suffix(']')).map(str::trim)
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `true` when an optional expression is present and not blank.
#[must_use]
pub fn is_not_null_or_blank(expr: Option<&Expression>) -> bool {
    expr.is_some_and(|e| !e.is_blank())
}

pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expr` against the current execution. `Ok(None)` means the
    /// expression produced no value.
    ///
    /// # Errors
    /// Returns `OpError::Evaluation` if the expression cannot be evaluated.
    fn evaluate(
        &self,
        expr: &Expression,
        ctx: &FlowContext,
        message: &Message,
    ) -> Result<Option<DynamicValue>, OpError>;
}

/// Reference evaluator.
///
/// Static text evaluates to itself. Scripts understand `message.payload()`,
/// `message.attributes().name`, `context.name`, `null`, and inline document or
/// string literals.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptEvaluator;

impl ExpressionEvaluator for ScriptEvaluator {
    fn evaluate(
        &self,
        expr: &Expression,
        ctx: &FlowContext,
        message: &Message,
    ) -> Result<Option<DynamicValue>, OpError> {
        if expr.is_blank() {
            return Ok(None);
        }
        let Some(body) = expr.script_body() else {
            return Ok(Some(DynamicValue::Text(expr.text().to_string())));
        };
        let value = if body == "null" || body.is_empty() {
            DynamicValue::None
        } else if body == "message.payload()" {
            message.value().clone()
        } else if let Some(name) = body.strip_prefix("message.attributes().") {
            message
                .attributes
                .get(name)
                .cloned()
                .map_or(DynamicValue::None, DynamicValue::from_bson)
        } else if let Some(name) = body.strip_prefix("context.") {
            ctx.get(name).cloned().unwrap_or_default()
        } else if body.starts_with('{') {
            DynamicValue::Text(body.to_string())
        } else if let Some(lit) = string_literal(body) {
            DynamicValue::Text(lit.to_string())
        } else {
            return Err(OpError::Evaluation(format!("unsupported expression: {expr}")));
        };
        log::trace!("evaluated {expr} -> {}", value.type_name());
        Ok(match value {
            DynamicValue::None => None,
            v => Some(v),
        })
    }
}

fn string_literal(body: &str) -> Option<&str> {
    body.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| body.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}
