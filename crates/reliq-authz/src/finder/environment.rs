//! Static environment attribute finder.
//!
//! Resolves the request clock attributes (current dateTime, date, time of
//! day) straight from the evaluation context. No external I/O.

use async_trait::async_trait;

use crate::AuthzResult;
use crate::attr::{AttributeCategory, AttributeType, AttributeValue, ValueBag, ids};
use crate::eval::EvaluationContext;
use crate::finder::{AttributeDesignator, AttributeFinder};

const REGISTERED: &[AttributeDesignator] = &[
    AttributeDesignator::new(
        ids::environment::CURRENT_DATE_TIME,
        AttributeType::DateTime,
        AttributeCategory::Environment,
    ),
    AttributeDesignator::new(
        ids::environment::CURRENT_DATE,
        AttributeType::Date,
        AttributeCategory::Environment,
    ),
    AttributeDesignator::new(
        ids::environment::CURRENT_TIME,
        AttributeType::Time,
        AttributeCategory::Environment,
    ),
];

/// Finder for the request clock attributes.
#[derive(Debug, Default)]
pub struct EnvironmentFinder;

impl EnvironmentFinder {
    /// Create an environment finder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AttributeFinder for EnvironmentFinder {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn supports(&self, category: AttributeCategory) -> bool {
        category == AttributeCategory::Environment
    }

    fn registered(&self) -> &[AttributeDesignator] {
        REGISTERED
    }

    async fn resolve_values(
        &self,
        _attr_type: AttributeType,
        id: &str,
        _category: AttributeCategory,
        ctx: &EvaluationContext,
    ) -> AuthzResult<Option<ValueBag>> {
        let now = ctx.request_time();
        let value = match id {
            ids::environment::CURRENT_DATE_TIME => AttributeValue::DateTime(now),
            ids::environment::CURRENT_DATE => AttributeValue::Date(now.date()),
            ids::environment::CURRENT_TIME => AttributeValue::Time(now.time()),
            _ => return Ok(None),
        };
        Ok(Some(ValueBag::single(value)))
    }
}
