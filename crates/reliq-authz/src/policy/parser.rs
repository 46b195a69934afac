//! Schema-validating policy parser.
//!
//! Converts a serialized policy document into the in-memory model, with an
//! optional structural validation pass. The validation rules are compiled
//! once into a shared read-only [`SchemaRules`]; the validator instances
//! that apply them accumulate per-document state and are therefore pooled,
//! borrowed around each validation, reset, and returned.
//!
//! [`PolicyParser`] is `Clone`: clones share the compiled schema and the
//! validator pool, so independent tasks can parse concurrently without
//! contending on a single parser.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use regex::Regex;

use crate::AuthzResult;
use crate::error::AuthzError;
use crate::policy::model::{
    Condition, ConditionFunction, MatchFunction, Policy, PolicyDocument, PolicySet, Target,
};
use crate::policy::xml::{self, XmlPolicy, XmlPolicySet};

/// Maximum nesting depth of policy sets accepted by validation.
const MAX_SET_DEPTH: usize = 8;

/// Default number of idle validators kept in the pool.
const DEFAULT_POOL_SIZE: usize = 8;

// =============================================================================
// Schema rules
// =============================================================================

/// Compiled validation rules, built once and shared read-only.
#[derive(Debug)]
pub struct SchemaRules {
    id_pattern: Regex,
}

impl SchemaRules {
    fn new() -> Self {
        Self {
            // Document ids are URN/URI-shaped: scheme, then no whitespace.
            id_pattern: Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:\S+$")
                .expect("id pattern is a valid literal regex"),
        }
    }

    fn valid_id(&self, id: &str) -> bool {
        self.id_pattern.is_match(id)
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Structural validator for parsed documents.
///
/// A validator accumulates errors while walking one document and is not
/// meant for concurrent use; acquire one from the [`ValidatorPool`],
/// validate, and return it.
#[derive(Debug)]
pub struct PolicyValidator {
    schema: Arc<SchemaRules>,
    errors: Vec<String>,
}

impl PolicyValidator {
    fn new(schema: Arc<SchemaRules>) -> Self {
        Self {
            schema,
            errors: Vec::new(),
        }
    }

    /// Validate a document.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Validation` describing every problem found.
    pub fn validate(&mut self, document: &PolicyDocument) -> AuthzResult<()> {
        match document {
            PolicyDocument::Policy(policy) => self.check_policy(policy),
            PolicyDocument::Set(set) => self.check_set(set, 0),
        }
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AuthzError::validation(self.errors.join("; ")))
        }
    }

    /// Clear accumulated state so the validator can be reused.
    pub fn reset(&mut self) {
        self.errors.clear();
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn check_set(&mut self, set: &PolicySet, depth: usize) {
        if depth >= MAX_SET_DEPTH {
            self.error(format!(
                "policy set '{}' exceeds maximum nesting depth {MAX_SET_DEPTH}",
                set.id
            ));
            return;
        }
        if !self.schema.valid_id(&set.id) {
            self.error(format!("invalid policy set id '{}'", set.id));
        }
        let mut child_ids = HashSet::new();
        for doc in &set.documents {
            if !child_ids.insert(doc.id().to_string()) {
                self.error(format!(
                    "duplicate document id '{}' in policy set '{}'",
                    doc.id(),
                    set.id
                ));
            }
            match doc {
                PolicyDocument::Policy(policy) => self.check_policy(policy),
                PolicyDocument::Set(child) => self.check_set(child, depth + 1),
            }
        }
    }

    fn check_policy(&mut self, policy: &Policy) {
        if !self.schema.valid_id(&policy.id) {
            self.error(format!("invalid policy id '{}'", policy.id));
        }
        self.check_target(&policy.target, &policy.id);
        let mut rule_ids = HashSet::new();
        for rule in &policy.rules {
            if rule.id.is_empty() {
                self.error(format!("policy '{}' has a rule with an empty id", policy.id));
            }
            if !rule_ids.insert(rule.id.clone()) {
                self.error(format!(
                    "duplicate rule id '{}' in policy '{}'",
                    rule.id, policy.id
                ));
            }
            if let Some(target) = &rule.target {
                self.check_target(target, &policy.id);
            }
            for condition in &rule.conditions {
                self.check_condition(condition, &policy.id);
            }
        }
    }

    fn check_target(&mut self, target: &Target, policy_id: &str) {
        for m in &target.matches {
            if m.attribute_id.is_empty() {
                self.error(format!("policy '{policy_id}' has a match with an empty attribute id"));
            }
            if m.function == MatchFunction::RegexpMatch && Regex::new(&m.value).is_err() {
                self.error(format!(
                    "policy '{policy_id}' has an invalid match pattern '{}'",
                    m.value
                ));
            }
        }
    }

    fn check_condition(&mut self, condition: &Condition, policy_id: &str) {
        if condition.values.is_empty() {
            self.error(format!("policy '{policy_id}' has a condition with no values"));
        }
        match condition.function {
            ConditionFunction::AnyRegexpMatch => {
                for value in &condition.values {
                    if Regex::new(value).is_err() {
                        self.error(format!(
                            "policy '{policy_id}' has an invalid condition pattern '{value}'"
                        ));
                    }
                }
            }
            ConditionFunction::IpInRange => {
                for value in &condition.values {
                    if value.parse::<ipnetwork::IpNetwork>().is_err() {
                        self.error(format!(
                            "policy '{policy_id}' has an invalid IP range '{value}'"
                        ));
                    }
                }
            }
            ConditionFunction::AnyEqual => {}
        }
    }
}

// =============================================================================
// Validator pool
// =============================================================================

/// Bounded pool of idle validators, safe for concurrent borrow/return.
#[derive(Debug)]
pub struct ValidatorPool {
    schema: Arc<SchemaRules>,
    idle: Mutex<Vec<PolicyValidator>>,
    max_idle: usize,
}

impl ValidatorPool {
    fn new(schema: Arc<SchemaRules>, max_idle: usize) -> Self {
        Self {
            schema,
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Borrow a validator, creating one if the pool is empty.
    #[must_use]
    pub fn acquire(&self) -> PolicyValidator {
        let popped = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        popped.unwrap_or_else(|| PolicyValidator::new(self.schema.clone()))
    }

    /// Return a borrowed validator, resetting it first. Discarded when the
    /// pool is already full.
    pub fn release(&self, mut validator: PolicyValidator) {
        validator.reset();
        if let Ok(mut idle) = self.idle.lock()
            && idle.len() < self.max_idle
        {
            idle.push(validator);
        }
    }

    /// Number of idle validators currently pooled.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

// =============================================================================
// Parser
// =============================================================================

/// Policy document parser with optional validation.
///
/// Cloning shares the compiled schema and the validator pool.
#[derive(Debug, Clone)]
pub struct PolicyParser {
    schema: Arc<SchemaRules>,
    pool: Arc<ValidatorPool>,
}

impl PolicyParser {
    /// A parser with the default pool size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pool_size(DEFAULT_POOL_SIZE)
    }

    /// A parser keeping at most `max_idle` validators pooled.
    #[must_use]
    pub fn with_pool_size(max_idle: usize) -> Self {
        let schema = Arc::new(SchemaRules::new());
        let pool = Arc::new(ValidatorPool::new(schema.clone(), max_idle.max(1)));
        Self { schema, pool }
    }

    /// Parse a serialized policy document.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Validation` when:
    /// - the input is not well-formed XML,
    /// - the root element is neither `Policy` nor `PolicySet`,
    /// - `validate` is set and structural validation fails.
    pub fn parse(&self, bytes: &[u8], validate: bool) -> AuthzResult<PolicyDocument> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| AuthzError::validation(format!("policy is not valid UTF-8: {e}")))?;

        let document = match root_element_name(text)? {
            RootElement::Policy => {
                let wire: XmlPolicy = quick_xml::de::from_str(text)
                    .map_err(|e| AuthzError::validation(format!("malformed policy: {e}")))?;
                PolicyDocument::Policy(
                    wire.into_model()
                        .map_err(|e| AuthzError::validation(e.to_string()))?,
                )
            }
            RootElement::PolicySet => {
                let wire: XmlPolicySet = quick_xml::de::from_str(text)
                    .map_err(|e| AuthzError::validation(format!("malformed policy set: {e}")))?;
                PolicyDocument::Set(
                    wire.into_model()
                        .map_err(|e| AuthzError::validation(e.to_string()))?,
                )
            }
        };

        if validate {
            let mut validator = self.pool.acquire();
            let outcome = validator.validate(&document);
            self.pool.release(validator);
            outcome?;
        }

        Ok(document)
    }

    /// Serialize a document to its wire form.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Validation` if serialization fails.
    pub fn serialize(&self, document: &PolicyDocument) -> AuthzResult<String> {
        xml::to_xml_string(document).map_err(|e| AuthzError::validation(e.to_string()))
    }

    /// The shared validator pool.
    #[must_use]
    pub fn pool(&self) -> &ValidatorPool {
        &self.pool
    }
}

impl Default for PolicyParser {
    fn default() -> Self {
        Self::new()
    }
}

enum RootElement {
    Policy,
    PolicySet,
}

/// Find the document's root element and require it to be a policy root.
fn root_element_name(text: &str) -> AuthzResult<RootElement> {
    let mut reader = quick_xml::Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Start(start) | quick_xml::events::Event::Empty(start)) => {
                return match start.name().as_ref() {
                    b"Policy" => Ok(RootElement::Policy),
                    b"PolicySet" => Ok(RootElement::PolicySet),
                    other => Err(AuthzError::validation(format!(
                        "root element '{}' is neither Policy nor PolicySet",
                        String::from_utf8_lossy(other)
                    ))),
                };
            }
            Ok(quick_xml::events::Event::Eof) => {
                return Err(AuthzError::validation("document has no root element"));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(AuthzError::validation(format!("malformed document: {e}")));
            }
        }
    }
}
