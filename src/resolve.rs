//! Filter and update-document resolution.

use crate::errors::OpError;
use crate::eval::{Expression, ExpressionEvaluator};
use crate::message::{FlowContext, Message};
use crate::value::DynamicValue;

/// Outcome of filter resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedFilter {
    /// No filter configured: every document matches.
    MatchAll,
    Value(DynamicValue),
}

/// Resolve a filter expression.
///
/// # Errors
/// - `NullFilter` when a configured expression evaluates to no value.
/// - Any evaluator error.
pub fn resolve_filter(
    expr: Option<&Expression>,
    evaluator: &dyn ExpressionEvaluator,
    ctx: &FlowContext,
    message: &Message,
) -> Result<ResolvedFilter, OpError> {
    let Some(expr) = expr.filter(|e| !e.is_blank()) else {
        return Ok(ResolvedFilter::MatchAll);
    };
    evaluator
        .evaluate(expr, ctx, message)?
        .map(ResolvedFilter::Value)
        .ok_or_else(|| OpError::NullFilter { expression: expr.text().to_string() })
}

/// Resolve the update document: the expression result if non-empty, else the
/// inbound payload if non-empty.
///
/// Sources are tried in order and each is only evaluated if every earlier one
/// came up empty.
///
/// # Errors
/// - `EmptyDocument` when every source is empty.
/// - Any evaluator error.
pub fn resolve_document(
    expr: Option<&Expression>,
    evaluator: &dyn ExpressionEvaluator,
    ctx: &FlowContext,
    message: &Message,
) -> Result<DynamicValue, OpError> {
    type Source<'a> = Box<dyn FnOnce() -> Result<Option<DynamicValue>, OpError> + 'a>;
    let sources: [Source<'_>; 2] = [
        Box::new(|| match expr {
            Some(e) if !e.is_blank() => evaluator.evaluate(e, ctx, message),
            _ => Ok(None),
        }),
        Box::new(|| Ok(Some(message.value().clone()))),
    ];
    for source in sources {
        if let Some(value) = source()?.filter(|v| !v.is_empty()) {
            return Ok(value);
        }
    }
    Err(OpError::EmptyDocument {
        expression: expr.map(|e| e.text().to_string()).unwrap_or_default(),
    })
}
