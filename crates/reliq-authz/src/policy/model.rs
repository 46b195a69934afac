//! In-memory policy document model.
//!
//! This is the representation the parser produces, the loader caches, and
//! the evaluator walks. A document is either a single [`Policy`] or a
//! [`PolicySet`] combining children under a named combining algorithm.
//! Documents are immutable after construction; the loader owns them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attr::{AttributeCategory, AttributeType};

/// URN prefix of the engine's combining-algorithm identifiers.
const COMBINING_URN_PREFIX: &str = "urn:reliq:names:authz:1.0:combining:";

/// Effect of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// The rule grants access when it applies.
    Permit,
    /// The rule denies access when it applies.
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permit => f.write_str("Permit"),
            Self::Deny => f.write_str("Deny"),
        }
    }
}

impl FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Permit" => Ok(Self::Permit),
            "Deny" => Ok(Self::Deny),
            other => Err(format!("unknown effect '{other}'")),
        }
    }
}

/// Algorithm for resolving several applicable policies or rules into one
/// decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombiningAlg {
    /// Children are evaluated in document order; the first Deny wins over
    /// any Permit.
    #[default]
    OrderedDenyOverrides,
    /// Children are evaluated in document order; the first Permit wins over
    /// any Deny.
    OrderedPermitOverrides,
    /// The first child that is applicable at all decides.
    FirstApplicable,
}

impl CombiningAlg {
    /// The URI used for this algorithm in policy documents.
    #[must_use]
    pub fn uri(&self) -> &'static str {
        match self {
            Self::OrderedDenyOverrides => {
                "urn:reliq:names:authz:1.0:combining:ordered-deny-overrides"
            }
            Self::OrderedPermitOverrides => {
                "urn:reliq:names:authz:1.0:combining:ordered-permit-overrides"
            }
            Self::FirstApplicable => "urn:reliq:names:authz:1.0:combining:first-applicable",
        }
    }

    /// Look an algorithm up by its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri.strip_prefix(COMBINING_URN_PREFIX)? {
            "ordered-deny-overrides" => Some(Self::OrderedDenyOverrides),
            "ordered-permit-overrides" => Some(Self::OrderedPermitOverrides),
            "first-applicable" => Some(Self::FirstApplicable),
            _ => None,
        }
    }
}

/// Matching function of a target match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchFunction {
    /// The resolved bag contains a value equal to the literal.
    Equal,
    /// The resolved bag contains a value matching the literal as a regular
    /// expression.
    RegexpMatch,
}

impl MatchFunction {
    /// The token used for this function in policy documents.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::RegexpMatch => "regexp-match",
        }
    }

    /// Look a function up by its document token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "equal" => Some(Self::Equal),
            "regexp-match" => Some(Self::RegexpMatch),
            _ => None,
        }
    }
}

/// One attribute comparison inside a target.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMatch {
    /// Category of the attribute to resolve.
    pub category: AttributeCategory,
    /// Id of the attribute to resolve.
    pub attribute_id: String,
    /// Datatype the attribute is resolved as.
    pub attr_type: AttributeType,
    /// Matching function applied to the resolved bag.
    pub function: MatchFunction,
    /// Literal to compare against.
    pub value: String,
}

impl AttributeMatch {
    /// An equality match on a string-typed attribute.
    #[must_use]
    pub fn equal(
        category: AttributeCategory,
        attribute_id: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            category,
            attribute_id: attribute_id.into(),
            attr_type: AttributeType::String,
            function: MatchFunction::Equal,
            value: value.into(),
        }
    }
}

/// Applicability condition of a policy or rule.
///
/// All matches must hold (AND). An empty target matches any request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Target {
    /// The attribute comparisons; all must match.
    pub matches: Vec<AttributeMatch>,
}

impl Target {
    /// The target that matches any request.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Returns `true` when this target matches any request.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Function of a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionFunction {
    /// Some resolved value equals one of the literals.
    AnyEqual,
    /// Some resolved value matches one of the literals as a regular
    /// expression.
    AnyRegexpMatch,
    /// Some resolved value, read as an IP address, falls in one of the
    /// literal CIDR ranges.
    IpInRange,
}

impl ConditionFunction {
    /// The token used for this function in policy documents.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnyEqual => "any-equal",
            Self::AnyRegexpMatch => "any-regexp-match",
            Self::IpInRange => "ip-in-range",
        }
    }

    /// Look a function up by its document token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "any-equal" => Some(Self::AnyEqual),
            "any-regexp-match" => Some(Self::AnyRegexpMatch),
            "ip-in-range" => Some(Self::IpInRange),
            _ => None,
        }
    }
}

/// A predicate over one resolved attribute bag.
///
/// A rule carrying several conditions applies only when all of them hold.
/// A condition over an empty bag does not hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Predicate function.
    pub function: ConditionFunction,
    /// Category of the attribute to resolve.
    pub category: AttributeCategory,
    /// Id of the attribute to resolve.
    pub attribute_id: String,
    /// Datatype the attribute is resolved as.
    pub attr_type: AttributeType,
    /// Literals the predicate compares against.
    pub values: Vec<String>,
}

/// A single rule with an effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Rule id, unique within the enclosing policy.
    pub id: String,
    /// Effect when the rule applies.
    pub effect: Effect,
    /// Optional rule-level target narrowing the policy target.
    pub target: Option<Target>,
    /// Conditions, all of which must hold for the rule to apply.
    pub conditions: Vec<Condition>,
}

impl Rule {
    /// An unconditional rule with the given effect.
    #[must_use]
    pub fn unconditional(id: impl Into<String>, effect: Effect) -> Self {
        Self {
            id: id.into(),
            effect,
            target: None,
            conditions: Vec::new(),
        }
    }
}

/// A policy: a target plus rules combined under a rule-combining algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Policy id URI.
    pub id: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Algorithm combining the rule decisions.
    pub rule_combining: CombiningAlg,
    /// Applicability target.
    pub target: Target,
    /// The rules, in document order.
    pub rules: Vec<Rule>,
}

/// A set of policies (or nested sets) under a combining algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySet {
    /// Policy-set id URI.
    pub id: String,
    /// Algorithm combining the children's decisions.
    pub combining: CombiningAlg,
    /// Children, in document order.
    pub documents: Vec<PolicyDocument>,
}

/// A parsed policy document: a single policy or a set.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDocument {
    /// A single policy.
    Policy(Policy),
    /// A set of policies.
    Set(PolicySet),
}

impl PolicyDocument {
    /// The document id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Policy(p) => &p.id,
            Self::Set(s) => &s.id,
        }
    }
}
