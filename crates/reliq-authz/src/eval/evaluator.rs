//! Bundled decision evaluator over the policy document model.
//!
//! Walks the policy set supplied by the policy finder: target matching,
//! rule evaluation, and combining. Attribute bags are obtained through the
//! evaluation context's callback surface, so lazily resolved attributes
//! (object state, datastream fields, context values) behave exactly like
//! supplied ones.
//!
//! Decision semantics:
//! - a policy whose target does not match is NotApplicable
//! - a rule whose target or conditions do not hold is NotApplicable
//! - a type error, bad pattern, or bad range makes the policy Indeterminate
//! - combining algorithms resolve multiple rules/children per their URI

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use regex::Regex;

use crate::AuthzResult;
use crate::attr::ValueBag;
use crate::eval::{Decision, DecisionEvaluator, EvaluationContext, RuleResult};
use crate::policy::model::{
    AttributeMatch, CombiningAlg, Condition, ConditionFunction, Effect, MatchFunction, Policy,
    PolicyDocument, PolicySet, Rule, Target,
};

/// Reference [`DecisionEvaluator`] implementation.
#[derive(Debug, Default)]
pub struct PolicyTreeEvaluator;

impl PolicyTreeEvaluator {
    /// Create an evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn evaluate_set<'a>(
        &'a self,
        set: &'a PolicySet,
        ctx: &'a EvaluationContext,
    ) -> Pin<Box<dyn Future<Output = Vec<RuleResult>> + Send + 'a>> {
        Box::pin(async move {
            let mut collected: Vec<RuleResult> = Vec::new();

            for document in &set.documents {
                let contribution = match document {
                    PolicyDocument::Policy(policy) => {
                        vec![self.evaluate_policy(policy, ctx).await]
                    }
                    PolicyDocument::Set(child) => self.evaluate_set(child, ctx).await,
                };

                match set.combining {
                    CombiningAlg::OrderedDenyOverrides => {
                        let has_deny = contribution.iter().any(|r| r.decision.is_deny());
                        collected.extend(contribution);
                        if has_deny {
                            break;
                        }
                    }
                    CombiningAlg::OrderedPermitOverrides => {
                        let has_permit = contribution.iter().any(|r| r.decision.is_permit());
                        if has_permit {
                            // A permit wins over anything collected so far;
                            // discard overridden non-permit outcomes.
                            collected.retain(|r| {
                                matches!(r.decision, Decision::Permit | Decision::NotApplicable)
                            });
                            collected.extend(contribution);
                            break;
                        }
                        collected.extend(contribution);
                    }
                    CombiningAlg::FirstApplicable => {
                        let applicable = contribution
                            .iter()
                            .any(|r| r.decision != Decision::NotApplicable);
                        collected.extend(contribution);
                        if applicable {
                            break;
                        }
                    }
                }
            }

            collected
        })
    }

    async fn evaluate_policy(&self, policy: &Policy, ctx: &EvaluationContext) -> RuleResult {
        match match_target(&policy.target, ctx).await {
            Err(message) => {
                tracing::debug!(policy_id = %policy.id, error = %message, "policy target indeterminate");
                RuleResult::for_policy(Decision::Indeterminate, &policy.id).with_message(message)
            }
            Ok(false) => RuleResult::for_policy(Decision::NotApplicable, &policy.id),
            Ok(true) => {
                let decision = self.combine_rules(policy, ctx).await;
                tracing::debug!(policy_id = %policy.id, decision = %decision, "policy evaluated");
                let result = RuleResult::for_policy(decision, &policy.id);
                match &policy.description {
                    Some(description) => result.with_message(description.clone()),
                    None => result,
                }
            }
        }
    }

    async fn combine_rules(&self, policy: &Policy, ctx: &EvaluationContext) -> Decision {
        let mut saw_permit = false;
        let mut saw_deny = false;
        let mut saw_indeterminate = false;

        for rule in &policy.rules {
            let decision = evaluate_rule(rule, ctx).await;
            match policy.rule_combining {
                CombiningAlg::OrderedDenyOverrides => match decision {
                    Decision::Deny => return Decision::Deny,
                    Decision::Permit => saw_permit = true,
                    Decision::Indeterminate => saw_indeterminate = true,
                    _ => {}
                },
                CombiningAlg::OrderedPermitOverrides => match decision {
                    Decision::Permit => return Decision::Permit,
                    Decision::Deny => saw_deny = true,
                    Decision::Indeterminate => saw_indeterminate = true,
                    _ => {}
                },
                CombiningAlg::FirstApplicable => {
                    if decision != Decision::NotApplicable {
                        return decision;
                    }
                }
            }
        }

        if saw_indeterminate {
            Decision::Indeterminate
        } else if saw_permit {
            Decision::Permit
        } else if saw_deny {
            Decision::Deny
        } else {
            Decision::NotApplicable
        }
    }
}

#[async_trait]
impl DecisionEvaluator for PolicyTreeEvaluator {
    async fn evaluate(&self, ctx: &EvaluationContext) -> AuthzResult<Vec<RuleResult>> {
        let set = ctx.policy_set().await?;
        Ok(self.evaluate_set(&set, ctx).await)
    }
}

async fn evaluate_rule(rule: &Rule, ctx: &EvaluationContext) -> Decision {
    if let Some(target) = &rule.target {
        match match_target(target, ctx).await {
            Err(_) => return Decision::Indeterminate,
            Ok(false) => return Decision::NotApplicable,
            Ok(true) => {}
        }
    }

    for condition in &rule.conditions {
        match evaluate_condition(condition, ctx).await {
            Err(_) => return Decision::Indeterminate,
            Ok(false) => return Decision::NotApplicable,
            Ok(true) => {}
        }
    }

    match rule.effect {
        Effect::Permit => Decision::Permit,
        Effect::Deny => Decision::Deny,
    }
}

/// Whether all matches of a target hold. An empty resolved bag fails the
/// match; a type or pattern error is an evaluation error.
async fn match_target(target: &Target, ctx: &EvaluationContext) -> Result<bool, String> {
    for m in &target.matches {
        if !match_one(m, ctx).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn match_one(m: &AttributeMatch, ctx: &EvaluationContext) -> Result<bool, String> {
    let bag = ctx.resolve(m.category, &m.attribute_id, m.attr_type).await;
    if bag.is_empty() {
        return Ok(false);
    }
    match m.function {
        MatchFunction::Equal => {
            let expected = crate::attr::AttributeValue::parse(m.attr_type, &m.value)
                .map_err(|e| e.to_string())?;
            Ok(bag.values().iter().any(|v| *v == expected))
        }
        MatchFunction::RegexpMatch => {
            let pattern = Regex::new(&m.value)
                .map_err(|e| format!("invalid match pattern '{}': {e}", m.value))?;
            Ok(bag.values().iter().any(|v| pattern.is_match(&v.lexical())))
        }
    }
}

/// Whether a condition holds over its resolved bag. An empty bag never
/// holds; bad literals are evaluation errors.
async fn evaluate_condition(condition: &Condition, ctx: &EvaluationContext) -> Result<bool, String> {
    let bag = ctx
        .resolve(condition.category, &condition.attribute_id, condition.attr_type)
        .await;
    if bag.is_empty() {
        return Ok(false);
    }
    match condition.function {
        ConditionFunction::AnyEqual => {
            let mut expected = Vec::with_capacity(condition.values.len());
            for literal in &condition.values {
                expected.push(
                    crate::attr::AttributeValue::parse(condition.attr_type, literal)
                        .map_err(|e| e.to_string())?,
                );
            }
            Ok(bag.values().iter().any(|v| expected.contains(v)))
        }
        ConditionFunction::AnyRegexpMatch => {
            let mut patterns = Vec::with_capacity(condition.values.len());
            for literal in &condition.values {
                patterns.push(
                    Regex::new(literal)
                        .map_err(|e| format!("invalid condition pattern '{literal}': {e}"))?,
                );
            }
            Ok(bag
                .values()
                .iter()
                .any(|v| patterns.iter().any(|p| p.is_match(&v.lexical()))))
        }
        ConditionFunction::IpInRange => {
            let mut networks = Vec::with_capacity(condition.values.len());
            for literal in &condition.values {
                networks.push(
                    literal
                        .parse::<IpNetwork>()
                        .map_err(|e| format!("invalid IP range '{literal}': {e}"))?,
                );
            }
            Ok(any_ip_in_ranges(&bag, &networks))
        }
    }
}

fn any_ip_in_ranges(bag: &ValueBag, networks: &[IpNetwork]) -> bool {
    bag.values().iter().any(|value| {
        value
            .lexical()
            .parse::<IpAddr>()
            .is_ok_and(|ip| networks.iter().any(|network| network.contains(ip)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use time::OffsetDateTime;

    use crate::attr::{
        Attribute, AttributeCategory, AttributeType, RequestAttributes, ids,
    };
    use crate::eval::PolicyFinder;
    use crate::registry::ContextRegistry;

    struct FixedPolicyFinder {
        set: PolicySet,
    }

    #[async_trait]
    impl PolicyFinder for FixedPolicyFinder {
        async fn find_policy_set(&self, _ctx: &EvaluationContext) -> AuthzResult<PolicySet> {
            Ok(self.set.clone())
        }
    }

    fn context_for(set: PolicySet, attributes: RequestAttributes) -> EvaluationContext {
        EvaluationContext::new(
            attributes,
            Vec::new(),
            Arc::new(ContextRegistry::new()),
            Arc::new(FixedPolicyFinder { set }),
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    fn subject_attributes(login: &str) -> RequestAttributes {
        let mut attributes = RequestAttributes::default();
        attributes
            .subject
            .insert(Attribute::single(ids::subject::LOGIN_ID, login.into()));
        attributes
    }

    fn permit_policy_for(id: &str, login: &str) -> Policy {
        Policy {
            id: id.to_string(),
            description: None,
            rule_combining: CombiningAlg::OrderedDenyOverrides,
            target: Target {
                matches: vec![AttributeMatch::equal(
                    AttributeCategory::Subject,
                    ids::subject::LOGIN_ID,
                    login,
                )],
            },
            rules: vec![Rule::unconditional("permit", Effect::Permit)],
        }
    }

    fn deny_policy(id: &str) -> Policy {
        Policy {
            id: id.to_string(),
            description: None,
            rule_combining: CombiningAlg::OrderedDenyOverrides,
            target: Target::any(),
            rules: vec![Rule::unconditional("deny", Effect::Deny)],
        }
    }

    fn set_of(documents: Vec<PolicyDocument>, combining: CombiningAlg) -> PolicySet {
        PolicySet {
            id: "urn:test:set".to_string(),
            combining,
            documents,
        }
    }

    #[tokio::test]
    async fn test_matching_policy_permits() {
        let set = set_of(
            vec![PolicyDocument::Policy(permit_policy_for("urn:p", "alice"))],
            CombiningAlg::OrderedDenyOverrides,
        );
        let ctx = context_for(set, subject_attributes("alice"));

        let results = PolicyTreeEvaluator::new().evaluate(&ctx).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].decision, Decision::Permit);
        assert_eq!(results[0].policy_id.as_deref(), Some("urn:p"));
    }

    #[tokio::test]
    async fn test_non_matching_target_is_not_applicable() {
        let set = set_of(
            vec![PolicyDocument::Policy(permit_policy_for("urn:p", "alice"))],
            CombiningAlg::OrderedDenyOverrides,
        );
        let ctx = context_for(set, subject_attributes("bob"));

        let results = PolicyTreeEvaluator::new().evaluate(&ctx).await.unwrap();
        assert_eq!(results[0].decision, Decision::NotApplicable);
    }

    #[tokio::test]
    async fn test_deny_overrides_stops_at_deny() {
        let set = set_of(
            vec![
                PolicyDocument::Policy(deny_policy("urn:deny")),
                PolicyDocument::Policy(permit_policy_for("urn:permit", "alice")),
            ],
            CombiningAlg::OrderedDenyOverrides,
        );
        let ctx = context_for(set, subject_attributes("alice"));

        let results = PolicyTreeEvaluator::new().evaluate(&ctx).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].decision, Decision::Deny);
    }

    #[tokio::test]
    async fn test_permit_overrides_discards_denials() {
        let set = set_of(
            vec![
                PolicyDocument::Policy(deny_policy("urn:deny")),
                PolicyDocument::Policy(permit_policy_for("urn:permit", "alice")),
            ],
            CombiningAlg::OrderedPermitOverrides,
        );
        let ctx = context_for(set, subject_attributes("alice"));

        let results = PolicyTreeEvaluator::new().evaluate(&ctx).await.unwrap();
        assert!(results.iter().any(|r| r.decision.is_permit()));
        assert!(!results.iter().any(|r| r.decision.is_deny()));
        assert!(crate::eval::permitted(&results));
    }

    #[tokio::test]
    async fn test_first_applicable_takes_first_match() {
        let set = set_of(
            vec![
                PolicyDocument::Policy(permit_policy_for("urn:other", "bob")),
                PolicyDocument::Policy(permit_policy_for("urn:mine", "alice")),
                PolicyDocument::Policy(deny_policy("urn:deny")),
            ],
            CombiningAlg::FirstApplicable,
        );
        let ctx = context_for(set, subject_attributes("alice"));

        let results = PolicyTreeEvaluator::new().evaluate(&ctx).await.unwrap();
        // bob's policy is NotApplicable, alice's permit applies, the deny is
        // never reached.
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].decision, Decision::Permit);
    }

    #[tokio::test]
    async fn test_nested_set_is_walked() {
        let inner = set_of(
            vec![PolicyDocument::Policy(deny_policy("urn:inner-deny"))],
            CombiningAlg::OrderedDenyOverrides,
        );
        let set = set_of(
            vec![
                PolicyDocument::Set(inner),
                PolicyDocument::Policy(permit_policy_for("urn:permit", "alice")),
            ],
            CombiningAlg::OrderedDenyOverrides,
        );
        let ctx = context_for(set, subject_attributes("alice"));

        let results = PolicyTreeEvaluator::new().evaluate(&ctx).await.unwrap();
        assert!(results.iter().any(|r| r.decision.is_deny()));
        assert!(!crate::eval::permitted(&results));
    }

    #[tokio::test]
    async fn test_invalid_regex_is_indeterminate() {
        let policy = Policy {
            id: "urn:broken".to_string(),
            description: None,
            rule_combining: CombiningAlg::OrderedDenyOverrides,
            target: Target {
                matches: vec![AttributeMatch {
                    category: AttributeCategory::Subject,
                    attribute_id: ids::subject::LOGIN_ID.to_string(),
                    attr_type: AttributeType::String,
                    function: MatchFunction::RegexpMatch,
                    value: "[unclosed".to_string(),
                }],
            },
            rules: vec![Rule::unconditional("permit", Effect::Permit)],
        };
        let set = set_of(
            vec![PolicyDocument::Policy(policy)],
            CombiningAlg::OrderedDenyOverrides,
        );
        let ctx = context_for(set, subject_attributes("alice"));

        let results = PolicyTreeEvaluator::new().evaluate(&ctx).await.unwrap();
        assert_eq!(results[0].decision, Decision::Indeterminate);
        assert!(!crate::eval::permitted(&results));
    }

    #[tokio::test]
    async fn test_rule_condition_gates_effect() {
        let mut permit = permit_policy_for("urn:conditional", "alice");
        permit.rules[0].conditions.push(Condition {
            function: ConditionFunction::IpInRange,
            category: AttributeCategory::Environment,
            attribute_id: ids::environment::CLIENT_IP.to_string(),
            attr_type: AttributeType::String,
            values: vec!["10.0.0.0/8".to_string()],
        });
        let set = set_of(
            vec![PolicyDocument::Policy(permit)],
            CombiningAlg::OrderedDenyOverrides,
        );

        // No client-ip attribute: condition cannot hold, rule does not apply.
        let ctx = context_for(set.clone(), subject_attributes("alice"));
        let results = PolicyTreeEvaluator::new().evaluate(&ctx).await.unwrap();
        assert_eq!(results[0].decision, Decision::NotApplicable);

        // In-range client ip: the rule fires.
        let mut attributes = subject_attributes("alice");
        attributes.environment.insert(Attribute::single(
            ids::environment::CLIENT_IP,
            "10.1.2.3".into(),
        ));
        let ctx = context_for(set, attributes);
        let results = PolicyTreeEvaluator::new().evaluate(&ctx).await.unwrap();
        assert_eq!(results[0].decision, Decision::Permit);
    }

    #[tokio::test]
    async fn test_rule_target_narrows_policy() {
        let policy = Policy {
            id: "urn:narrow".to_string(),
            description: None,
            rule_combining: CombiningAlg::OrderedDenyOverrides,
            target: Target::any(),
            rules: vec![Rule {
                id: "deny-writes".to_string(),
                effect: Effect::Deny,
                target: Some(Target {
                    matches: vec![AttributeMatch::equal(
                        AttributeCategory::Action,
                        ids::action::ID,
                        "modify",
                    )],
                }),
                conditions: Vec::new(),
            }],
        };
        let set = set_of(
            vec![PolicyDocument::Policy(policy)],
            CombiningAlg::OrderedDenyOverrides,
        );

        let mut attributes = RequestAttributes::default();
        attributes
            .action
            .insert(Attribute::single(ids::action::ID, "read".into()));
        let ctx = context_for(set.clone(), attributes);
        let results = PolicyTreeEvaluator::new().evaluate(&ctx).await.unwrap();
        assert_eq!(results[0].decision, Decision::NotApplicable);

        let mut attributes = RequestAttributes::default();
        attributes
            .action
            .insert(Attribute::single(ids::action::ID, "modify".into()));
        let ctx = context_for(set, attributes);
        let results = PolicyTreeEvaluator::new().evaluate(&ctx).await.unwrap();
        assert_eq!(results[0].decision, Decision::Deny);
    }
}
