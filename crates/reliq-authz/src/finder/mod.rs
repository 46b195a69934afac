//! Attribute finder framework.
//!
//! During evaluation the decision evaluator calls back into the finder chain
//! for any attribute not already present in the request. A finder is a
//! capability object: it declares the categories it participates in, the
//! designators it has registered, whether it will attempt ad-hoc ids, and a
//! deny-list of ids it refuses outright. The provided [`resolve`] wrapper
//! applies those guards uniformly and delegates to the module-specific
//! [`resolve_values`] hook; hook failures are swallowed and reported as "no
//! value", never as an evaluation failure.
//!
//! [`resolve`]: AttributeFinder::resolve
//! [`resolve_values`]: AttributeFinder::resolve_values

pub mod context;
pub mod environment;
pub mod resource;

use async_trait::async_trait;

use crate::AuthzResult;
use crate::attr::{AttributeCategory, AttributeType, ValueBag};
use crate::eval::EvaluationContext;

pub use context::ContextFinder;
pub use environment::EnvironmentFinder;
pub use resource::ResourceFinder;

/// A registered attribute designator: which id, of which type, in which
/// category, a finder answers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDesignator {
    /// Attribute id URI.
    pub id: &'static str,
    /// Datatype the finder produces for this id.
    pub attr_type: AttributeType,
    /// Category the designator belongs to.
    pub category: AttributeCategory,
}

impl AttributeDesignator {
    /// Shorthand constructor.
    #[must_use]
    pub const fn new(
        id: &'static str,
        attr_type: AttributeType,
        category: AttributeCategory,
    ) -> Self {
        Self {
            id,
            attr_type,
            category,
        }
    }
}

/// A module that lazily resolves attribute values for the evaluator.
#[async_trait]
pub trait AttributeFinder: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &'static str;

    /// Whether this finder participates in the given category.
    fn supports(&self, category: AttributeCategory) -> bool;

    /// Whether this finder will attempt ids it has not registered.
    fn resolves_ad_hoc(&self) -> bool {
        false
    }

    /// The designators this finder has explicitly registered.
    fn registered(&self) -> &[AttributeDesignator] {
        &[]
    }

    /// Ids this finder refuses to resolve regardless of registration.
    fn refused_ids(&self) -> &[&'static str] {
        &[]
    }

    /// Module-specific resolution hook.
    ///
    /// Returns `Ok(None)` for "no value". A returned bag may hold one or
    /// many homogeneous values.
    ///
    /// # Errors
    ///
    /// Hook errors are swallowed by [`resolve`](Self::resolve) and treated
    /// as "no value".
    async fn resolve_values(
        &self,
        attr_type: AttributeType,
        id: &str,
        category: AttributeCategory,
        ctx: &EvaluationContext,
    ) -> AuthzResult<Option<ValueBag>>;

    /// The callback invoked by the decision evaluator.
    ///
    /// Applies the guard chain, then delegates to
    /// [`resolve_values`](Self::resolve_values):
    /// - unsupported category → empty bag
    /// - refused id → empty bag
    /// - registered id requested with the wrong datatype → empty bag
    /// - unregistered id on a non-ad-hoc finder → empty bag
    /// - hook error → empty bag (logged)
    async fn resolve(
        &self,
        attr_type: AttributeType,
        id: &str,
        category: AttributeCategory,
        ctx: &EvaluationContext,
    ) -> ValueBag {
        if !self.supports(category) {
            return ValueBag::empty(attr_type);
        }
        if self.refused_ids().contains(&id) {
            return ValueBag::empty(attr_type);
        }
        match self
            .registered()
            .iter()
            .find(|d| d.id == id && d.category == category)
        {
            Some(designator) => {
                if designator.attr_type != attr_type {
                    return ValueBag::empty(attr_type);
                }
            }
            None => {
                if !self.resolves_ad_hoc() {
                    return ValueBag::empty(attr_type);
                }
            }
        }

        match self.resolve_values(attr_type, id, category, ctx).await {
            Ok(Some(bag)) => bag,
            Ok(None) => ValueBag::empty(attr_type),
            Err(e) => {
                tracing::warn!(
                    finder = self.name(),
                    attribute = id,
                    error = %e,
                    "attribute resolution failed, treating as absent"
                );
                ValueBag::empty(attr_type)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttributeValue;
    use crate::eval::test_support::empty_evaluation_context;

    struct FixedFinder {
        ad_hoc: bool,
        fail: bool,
    }

    const REGISTERED: &[AttributeDesignator] = &[AttributeDesignator::new(
        "urn:test:color",
        AttributeType::String,
        AttributeCategory::Subject,
    )];

    #[async_trait]
    impl AttributeFinder for FixedFinder {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn supports(&self, category: AttributeCategory) -> bool {
            category == AttributeCategory::Subject
        }

        fn resolves_ad_hoc(&self) -> bool {
            self.ad_hoc
        }

        fn registered(&self) -> &[AttributeDesignator] {
            REGISTERED
        }

        fn refused_ids(&self) -> &[&'static str] {
            &["urn:test:refused"]
        }

        async fn resolve_values(
            &self,
            _attr_type: AttributeType,
            _id: &str,
            _category: AttributeCategory,
            _ctx: &EvaluationContext,
        ) -> AuthzResult<Option<ValueBag>> {
            if self.fail {
                return Err(crate::AuthzError::operational("boom"));
            }
            Ok(Some(ValueBag::single(AttributeValue::String(
                "green".to_string(),
            ))))
        }
    }

    #[tokio::test]
    async fn test_unsupported_category_is_empty() {
        let finder = FixedFinder {
            ad_hoc: true,
            fail: false,
        };
        let ctx = empty_evaluation_context();
        let bag = finder
            .resolve(
                AttributeType::String,
                "urn:test:color",
                AttributeCategory::Resource,
                &ctx,
            )
            .await;
        assert!(bag.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_id_on_non_ad_hoc_is_empty() {
        let finder = FixedFinder {
            ad_hoc: false,
            fail: false,
        };
        let ctx = empty_evaluation_context();
        let bag = finder
            .resolve(
                AttributeType::String,
                "urn:test:other",
                AttributeCategory::Subject,
                &ctx,
            )
            .await;
        assert!(bag.is_empty());
    }

    #[tokio::test]
    async fn test_registered_id_resolves() {
        let finder = FixedFinder {
            ad_hoc: false,
            fail: false,
        };
        let ctx = empty_evaluation_context();
        let bag = finder
            .resolve(
                AttributeType::String,
                "urn:test:color",
                AttributeCategory::Subject,
                &ctx,
            )
            .await;
        assert_eq!(bag.first().unwrap().lexical(), "green");
    }

    #[tokio::test]
    async fn test_wrong_datatype_is_empty() {
        let finder = FixedFinder {
            ad_hoc: false,
            fail: false,
        };
        let ctx = empty_evaluation_context();
        let bag = finder
            .resolve(
                AttributeType::Integer,
                "urn:test:color",
                AttributeCategory::Subject,
                &ctx,
            )
            .await;
        assert!(bag.is_empty());
    }

    #[tokio::test]
    async fn test_refused_id_is_empty_even_ad_hoc() {
        let finder = FixedFinder {
            ad_hoc: true,
            fail: false,
        };
        let ctx = empty_evaluation_context();
        let bag = finder
            .resolve(
                AttributeType::String,
                "urn:test:refused",
                AttributeCategory::Subject,
                &ctx,
            )
            .await;
        assert!(bag.is_empty());
    }

    #[tokio::test]
    async fn test_hook_error_swallowed_to_empty() {
        let finder = FixedFinder {
            ad_hoc: true,
            fail: true,
        };
        let ctx = empty_evaluation_context();
        let bag = finder
            .resolve(
                AttributeType::String,
                "urn:test:color",
                AttributeCategory::Subject,
                &ctx,
            )
            .await;
        assert!(bag.is_empty());
    }
}
