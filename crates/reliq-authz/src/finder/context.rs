//! Request-context attribute finder.
//!
//! Extracts the context token from the action attributes, looks the
//! caller's [`RequestContext`] up in the context registry, and forwards the
//! query to the context's category-specific tables. Ad-hoc: any id the
//! caller chose to put into the context is resolvable.
//!
//! A small fixed set of ids is refused: the subject login id, the action id
//! and api, and the context token itself. Those are supplied directly by
//! the enforcement point; resolving them here would bypass it or recurse.
//!
//! [`RequestContext`]: crate::context::RequestContext

use async_trait::async_trait;

use crate::AuthzResult;
use crate::attr::{AttributeCategory, AttributeType, AttributeValue, ValueBag, ids};
use crate::eval::EvaluationContext;
use crate::finder::AttributeFinder;

const REFUSED: &[&str] = &[
    ids::subject::LOGIN_ID,
    ids::action::ID,
    ids::action::API,
    ids::action::CONTEXT_TOKEN,
];

/// Finder forwarding attribute queries to the registered request context.
#[derive(Debug, Default)]
pub struct ContextFinder;

impl ContextFinder {
    /// Create a context finder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AttributeFinder for ContextFinder {
    fn name(&self) -> &'static str {
        "context"
    }

    fn supports(&self, _category: AttributeCategory) -> bool {
        true
    }

    fn resolves_ad_hoc(&self) -> bool {
        true
    }

    fn refused_ids(&self) -> &[&'static str] {
        REFUSED
    }

    async fn resolve_values(
        &self,
        attr_type: AttributeType,
        id: &str,
        category: AttributeCategory,
        ctx: &EvaluationContext,
    ) -> AuthzResult<Option<ValueBag>> {
        let Some(token) = ctx
            .attributes()
            .get(AttributeCategory::Action, ids::action::CONTEXT_TOKEN)
            .and_then(|attr| attr.first_value())
            .map(AttributeValue::lexical)
        else {
            tracing::debug!(attribute = id, "no context token in action attributes");
            return Ok(None);
        };

        let Some(context) = ctx.registry().lookup(&token) else {
            tracing::debug!(token = %token, "no context registered under token");
            return Ok(None);
        };

        let raw = context.values(category, id);
        if raw.is_empty() {
            return Ok(None);
        }

        // Context values are strings; parse into the requested datatype and
        // skip values that do not fit.
        let mut values = Vec::with_capacity(raw.len());
        for value in raw {
            match AttributeValue::parse(attr_type, value) {
                Ok(parsed) => values.push(parsed),
                Err(e) => {
                    tracing::debug!(attribute = id, error = %e, "skipping unparseable context value");
                }
            }
        }
        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(ValueBag::new(attr_type, values)))
    }
}
