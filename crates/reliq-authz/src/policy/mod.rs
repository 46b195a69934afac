//! Policy documents: model, wire format, parsing, loading, finding, and
//! backend generation.
//!
//! - [`model`] - the in-memory document representation
//! - [`xml`] - the XML wire format and conversions
//! - [`parser`] - schema-validating parser with a pooled validator
//! - [`loader`] - recursive directory loader and object overlay fetch
//! - [`finder`] - per-request policy-set assembly over a cached repository
//! - [`generator`] - backend security spec → generated policy documents

pub mod bootstrap;
pub mod finder;
pub mod generator;
pub mod loader;
pub mod model;
pub mod parser;
pub mod xml;

pub use finder::{GENERATED_SUBDIRECTORY, RepositoryPolicyFinder};
pub use generator::{
    BackendPolicyGenerator, BackendRoleProperties, BackendSecuritySpec, DEFAULT_ROLE_KEY,
};
pub use loader::{
    DEFAULT_SUBDIRECTORY, DirectoryPolicyLoader, POLICY_DATASTREAM_ID, PolicyKeying,
};
pub use model::{
    AttributeMatch, CombiningAlg, Condition, ConditionFunction, Effect, MatchFunction, Policy,
    PolicyDocument, PolicySet, Rule, Target,
};
pub use parser::{PolicyParser, PolicyValidator, SchemaRules, ValidatorPool};
