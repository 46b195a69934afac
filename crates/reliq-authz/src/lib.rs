//! # reliq-authz
//!
//! Attribute-based authorization engine for the Reliq digital-object
//! repository server.
//!
//! Every server operation is gated by [`EnforcementPoint::enforce`]: a
//! declarative policy tree is evaluated against a bag of runtime-resolved
//! attributes, and the per-rule results are reduced deny-biased. The engine
//! provides:
//!
//! - A typed attribute model and per-request context registry
//! - An attribute finder framework (environment, context, resource finders)
//! - A schema-validating policy parser with a pooled validator
//! - A directory-backed policy repository with per-object overlays
//! - A backend policy generator compiling a security spec to documents
//! - Deny-biased enforcement with atomic hot-reload of the decision
//!   configuration
//!
//! ## Modules
//!
//! - [`attr`] - attribute categories, datatypes, values, and well-known ids
//! - [`context`] - the caller-supplied per-request context
//! - [`registry`] - token → context correlation for evaluation callbacks
//! - [`finder`] - lazy attribute resolution modules
//! - [`policy`] - documents, parsing, loading, finding, generation
//! - [`eval`] - the decision evaluator seam and result reduction
//! - [`pep`] - the enforcement point façade
//! - [`config`] - engine configuration
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reliq_authz::{AuthzConfig, EnforcementPoint, RequestContextBuilder};
//! use reliq_storage::MemoryObjectStore;
//!
//! let store = Arc::new(MemoryObjectStore::new());
//! let pep = EnforcementPoint::with_default_evaluator(AuthzConfig::default(), store).await?;
//!
//! let context = RequestContextBuilder::new().client_ip("10.0.0.7").build();
//! pep.enforce(Some("alice"), "read", "access", "demo:1", "demo", context)
//!     .await?;
//! ```

pub mod attr;
pub mod config;
pub mod context;
pub mod error;
pub mod eval;
pub mod finder;
pub mod pep;
pub mod policy;
pub mod registry;

pub use attr::{
    Attribute, AttributeCategory, AttributeMap, AttributeType, AttributeValue, RequestAttributes,
    ValueBag, ids,
};
pub use config::{
    AuthzConfig, ENFORCE_MODE_DENY_ALL, ENFORCE_MODE_ENFORCE_POLICIES, ENFORCE_MODE_PERMIT_ALL,
    PolicyRepositoryConfig,
};
pub use context::{RequestContext, RequestContextBuilder};
pub use error::AuthzError;
pub use eval::{
    Decision, DecisionEvaluator, EvaluationContext, PolicyFinder, PolicyTreeEvaluator, RuleResult,
    permitted, summarize_denial,
};
pub use finder::{
    AttributeDesignator, AttributeFinder, ContextFinder, EnvironmentFinder, ResourceFinder,
};
pub use pep::{EnforcementPoint, Pdp};
pub use policy::{
    BackendPolicyGenerator, BackendRoleProperties, BackendSecuritySpec, CombiningAlg,
    DirectoryPolicyLoader, POLICY_DATASTREAM_ID, PolicyDocument, PolicyKeying, PolicyParser,
    RepositoryPolicyFinder,
};
pub use registry::{ContextRegistry, RegistrationGuard};

/// Type alias for authorization results.
pub type AuthzResult<T> = Result<T, AuthzError>;
