//! Decision evaluation seam.
//!
//! The decision evaluator is an external collaborator behind the
//! [`DecisionEvaluator`] trait: it receives an [`EvaluationContext`] and
//! returns per-rule [`RuleResult`]s. The enforcement point reduces those
//! with the pure, deny-biased [`permitted`] fold.
//!
//! A bundled implementation, [`PolicyTreeEvaluator`], evaluates the
//! engine's own document model so the crate works end-to-end without an
//! external library; deployments may inject their own evaluator.

pub mod evaluator;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthzResult;
use crate::attr::{AttributeCategory, AttributeType, RequestAttributes, ValueBag};
use crate::finder::AttributeFinder;
use crate::policy::model::PolicySet;
use crate::registry::ContextRegistry;

pub use evaluator::PolicyTreeEvaluator;

// =============================================================================
// Decisions
// =============================================================================

/// Decision of one evaluated rule or policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Access granted by this rule.
    Permit,
    /// Access denied by this rule.
    Deny,
    /// The rule could not be evaluated.
    Indeterminate,
    /// The rule does not apply to this request.
    NotApplicable,
    /// A decision outside the known set; always treated as a denial.
    Other(String),
}

impl Decision {
    /// Returns `true` for an explicit Permit.
    #[must_use]
    pub fn is_permit(&self) -> bool {
        matches!(self, Self::Permit)
    }

    /// Returns `true` for an explicit Deny.
    #[must_use]
    pub fn is_deny(&self) -> bool {
        matches!(self, Self::Deny)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permit => f.write_str("Permit"),
            Self::Deny => f.write_str("Deny"),
            Self::Indeterminate => f.write_str("Indeterminate"),
            Self::NotApplicable => f.write_str("NotApplicable"),
            Self::Other(s) => write!(f, "Other({s})"),
        }
    }
}

/// One entry of the evaluator's response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleResult {
    /// The decision.
    pub decision: Decision,
    /// Id of the policy that produced the decision, when known.
    pub policy_id: Option<String>,
    /// Optional human-readable message, carried into denial reasons.
    pub message: Option<String>,
}

impl RuleResult {
    /// A result with no policy attribution.
    #[must_use]
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            policy_id: None,
            message: None,
        }
    }

    /// A result attributed to a policy.
    #[must_use]
    pub fn for_policy(decision: Decision, policy_id: impl Into<String>) -> Self {
        Self {
            decision,
            policy_id: Some(policy_id.into()),
            message: None,
        }
    }

    /// Attach a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Deny-biased reduction of a result multiset to a single verdict.
///
/// Permitted only when there is at least one explicit Permit, zero explicit
/// Denies, zero Indeterminates, and zero unclassifiable results.
/// NotApplicable results are neutral; the empty set denies.
#[must_use]
pub fn permitted(results: &[RuleResult]) -> bool {
    let mut permits = 0usize;
    for result in results {
        match &result.decision {
            Decision::Permit => permits += 1,
            Decision::NotApplicable => {}
            Decision::Deny | Decision::Indeterminate | Decision::Other(_) => return false,
        }
    }
    permits > 0
}

/// A denial reason summarizing the non-permit results.
#[must_use]
pub fn summarize_denial(results: &[RuleResult]) -> String {
    let mut reasons: Vec<String> = Vec::new();
    for result in results {
        match &result.decision {
            Decision::Deny => {
                let policy = result.policy_id.as_deref().unwrap_or("unattributed policy");
                match &result.message {
                    Some(msg) => reasons.push(format!("denied by {policy}: {msg}")),
                    None => reasons.push(format!("denied by {policy}")),
                }
            }
            Decision::Indeterminate => {
                let policy = result.policy_id.as_deref().unwrap_or("unattributed policy");
                reasons.push(format!("indeterminate result from {policy}"));
            }
            Decision::Other(kind) => {
                reasons.push(format!("unexpected decision '{kind}'"));
            }
            Decision::Permit | Decision::NotApplicable => {}
        }
    }
    if reasons.is_empty() {
        "no policy granted access".to_string()
    } else {
        reasons.join("; ")
    }
}

// =============================================================================
// Evaluation context
// =============================================================================

/// Everything one evaluation sees: the request attributes, the attribute
/// finder chain, the context registry, and the policy finder.
///
/// [`resolve`](Self::resolve) is the callback surface the evaluator uses
/// for attributes; supplied request attributes win over lazy resolution,
/// and finders are consulted in registration order.
pub struct EvaluationContext {
    attributes: RequestAttributes,
    finders: Vec<Arc<dyn AttributeFinder>>,
    registry: Arc<ContextRegistry>,
    policy_finder: Arc<dyn PolicyFinder>,
    request_time: OffsetDateTime,
}

impl EvaluationContext {
    /// Assemble a context for one evaluation.
    #[must_use]
    pub fn new(
        attributes: RequestAttributes,
        finders: Vec<Arc<dyn AttributeFinder>>,
        registry: Arc<ContextRegistry>,
        policy_finder: Arc<dyn PolicyFinder>,
        request_time: OffsetDateTime,
    ) -> Self {
        Self {
            attributes,
            finders,
            registry,
            policy_finder,
            request_time,
        }
    }

    /// The request attributes supplied by the enforcement point.
    #[must_use]
    pub fn attributes(&self) -> &RequestAttributes {
        &self.attributes
    }

    /// The context registry, for finders that need the caller's context.
    #[must_use]
    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// The instant this evaluation started.
    #[must_use]
    pub fn request_time(&self) -> OffsetDateTime {
        self.request_time
    }

    /// Resolve an attribute bag.
    ///
    /// Supplied request attributes of the matching datatype take precedence;
    /// otherwise finders are consulted in order until one produces a
    /// non-empty bag. Absence yields an empty bag, never an error.
    pub async fn resolve(
        &self,
        category: AttributeCategory,
        id: &str,
        attr_type: AttributeType,
    ) -> ValueBag {
        if let Some(attribute) = self.attributes.get(category, id)
            && attribute.attr_type() == attr_type
            && !attribute.is_empty()
        {
            return attribute.bag();
        }

        for finder in &self.finders {
            let bag = finder.resolve(attr_type, id, category, self).await;
            if !bag.is_empty() {
                return bag;
            }
        }

        ValueBag::empty(attr_type)
    }

    /// The policy set to evaluate, built by the policy finder.
    ///
    /// # Errors
    ///
    /// Propagates policy finder failures (overlay parse errors, store
    /// failures).
    pub async fn policy_set(&self) -> AuthzResult<PolicySet> {
        self.policy_finder.find_policy_set(self).await
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Supplies the policy set for one evaluation.
#[async_trait]
pub trait PolicyFinder: Send + Sync {
    /// Build the policy set applicable to the request in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error when the set cannot be constructed; the enforcement
    /// point surfaces this as an operational failure.
    async fn find_policy_set(&self, ctx: &EvaluationContext) -> AuthzResult<PolicySet>;
}

/// The external decision evaluator: takes a structured request, returns
/// per-rule decisions.
#[async_trait]
pub trait DecisionEvaluator: Send + Sync {
    /// Evaluate the request in `ctx` against the policy set its policy
    /// finder supplies.
    ///
    /// # Errors
    ///
    /// Evaluation failures propagate; the enforcement point converts them
    /// to operational errors.
    async fn evaluate(&self, ctx: &EvaluationContext) -> AuthzResult<Vec<RuleResult>>;
}

// =============================================================================
// Test support
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::policy::model::CombiningAlg;

    /// Policy finder returning an empty repository set.
    pub struct NullPolicyFinder;

    #[async_trait]
    impl PolicyFinder for NullPolicyFinder {
        async fn find_policy_set(&self, _ctx: &EvaluationContext) -> AuthzResult<PolicySet> {
            Ok(PolicySet {
                id: "urn:test:empty-set".to_string(),
                combining: CombiningAlg::OrderedDenyOverrides,
                documents: Vec::new(),
            })
        }
    }

    /// A context with no attributes, no finders, and an empty policy set.
    pub fn empty_evaluation_context() -> EvaluationContext {
        EvaluationContext::new(
            RequestAttributes::default(),
            Vec::new(),
            Arc::new(ContextRegistry::new()),
            Arc::new(NullPolicyFinder),
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    /// A context with the given attributes and finders over an empty policy
    /// set.
    pub fn evaluation_context_with(
        attributes: RequestAttributes,
        finders: Vec<Arc<dyn AttributeFinder>>,
        registry: Arc<ContextRegistry>,
    ) -> EvaluationContext {
        EvaluationContext::new(
            attributes,
            finders,
            registry,
            Arc::new(NullPolicyFinder),
            OffsetDateTime::UNIX_EPOCH,
        )
    }
}
