//! XML wire format for policy documents.
//!
//! Serde structs mirroring the on-disk document shape, plus conversions to
//! and from the in-memory model. The parser deserializes through these; the
//! backend policy generator serializes through them.
//!
//! Document shape:
//!
//! ```text
//! <Policy PolicyId="urn:..." RuleCombiningAlgId="urn:...">
//!   <Description>...</Description>
//!   <Target>
//!     <Match Category="subject" AttributeId="urn:..." DataType="..." Function="equal">alice</Match>
//!   </Target>
//!   <Rule RuleId="r1" Effect="Permit">
//!     <Condition Function="ip-in-range" Category="environment" AttributeId="urn:..." DataType="...">
//!       <Value>10.0.0.0/8</Value>
//!     </Condition>
//!   </Rule>
//! </Policy>
//! ```

use serde::{Deserialize, Serialize};

use crate::attr::AttributeType;
use crate::policy::model::{
    AttributeMatch, CombiningAlg, Condition, ConditionFunction, MatchFunction, Policy,
    PolicyDocument, PolicySet, Rule, Target,
};

/// Failure to map between the wire shape and the model.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct WireError {
    message: String,
}

impl WireError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// =============================================================================
// Wire structs
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct XmlMatch {
    #[serde(rename = "@Category")]
    pub category: String,
    #[serde(rename = "@AttributeId")]
    pub attribute_id: String,
    #[serde(rename = "@DataType")]
    pub data_type: String,
    #[serde(rename = "@Function")]
    pub function: String,
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct XmlTarget {
    #[serde(rename = "Match", default)]
    pub matches: Vec<XmlMatch>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct XmlCondition {
    #[serde(rename = "@Function")]
    pub function: String,
    #[serde(rename = "@Category")]
    pub category: String,
    #[serde(rename = "@AttributeId")]
    pub attribute_id: String,
    #[serde(rename = "@DataType")]
    pub data_type: String,
    #[serde(rename = "Value", default)]
    pub values: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct XmlRule {
    #[serde(rename = "@RuleId")]
    pub id: String,
    #[serde(rename = "@Effect")]
    pub effect: String,
    #[serde(rename = "Target", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<XmlTarget>,
    #[serde(rename = "Condition", default)]
    pub conditions: Vec<XmlCondition>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct XmlPolicy {
    #[serde(rename = "@PolicyId")]
    pub id: String,
    #[serde(rename = "@RuleCombiningAlgId")]
    pub rule_combining: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Target", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<XmlTarget>,
    #[serde(rename = "Rule", default)]
    pub rules: Vec<XmlRule>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct XmlPolicySet {
    #[serde(rename = "@PolicySetId")]
    pub id: String,
    #[serde(rename = "@CombiningAlgId")]
    pub combining: String,
    #[serde(rename = "Policy", default)]
    pub policies: Vec<XmlPolicy>,
    #[serde(rename = "PolicySet", default)]
    pub policy_sets: Vec<XmlPolicySet>,
}

// =============================================================================
// Wire → model
// =============================================================================

fn attr_type_from_uri(uri: &str) -> Result<AttributeType, WireError> {
    AttributeType::from_uri(uri).ok_or_else(|| WireError::new(format!("unknown datatype '{uri}'")))
}

fn category_from_token(token: &str) -> Result<crate::attr::AttributeCategory, WireError> {
    token.parse().map_err(WireError::new)
}

impl XmlMatch {
    fn into_model(self) -> Result<AttributeMatch, WireError> {
        Ok(AttributeMatch {
            category: category_from_token(&self.category)?,
            attr_type: attr_type_from_uri(&self.data_type)?,
            function: MatchFunction::from_token(&self.function)
                .ok_or_else(|| WireError::new(format!("unknown match function '{}'", self.function)))?,
            attribute_id: self.attribute_id,
            value: self.value,
        })
    }
}

impl XmlTarget {
    fn into_model(self) -> Result<Target, WireError> {
        Ok(Target {
            matches: self
                .matches
                .into_iter()
                .map(XmlMatch::into_model)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl XmlCondition {
    fn into_model(self) -> Result<Condition, WireError> {
        Ok(Condition {
            function: ConditionFunction::from_token(&self.function).ok_or_else(|| {
                WireError::new(format!("unknown condition function '{}'", self.function))
            })?,
            category: category_from_token(&self.category)?,
            attr_type: attr_type_from_uri(&self.data_type)?,
            attribute_id: self.attribute_id,
            values: self.values,
        })
    }
}

impl XmlRule {
    fn into_model(self) -> Result<Rule, WireError> {
        Ok(Rule {
            effect: self
                .effect
                .parse()
                .map_err(|e: String| WireError::new(e))?,
            target: self.target.map(XmlTarget::into_model).transpose()?,
            conditions: self
                .conditions
                .into_iter()
                .map(XmlCondition::into_model)
                .collect::<Result<_, _>>()?,
            id: self.id,
        })
    }
}

impl XmlPolicy {
    pub(crate) fn into_model(self) -> Result<Policy, WireError> {
        Ok(Policy {
            rule_combining: CombiningAlg::from_uri(&self.rule_combining).ok_or_else(|| {
                WireError::new(format!(
                    "unknown rule combining algorithm '{}'",
                    self.rule_combining
                ))
            })?,
            target: self
                .target
                .map(XmlTarget::into_model)
                .transpose()?
                .unwrap_or_default(),
            rules: self
                .rules
                .into_iter()
                .map(XmlRule::into_model)
                .collect::<Result<_, _>>()?,
            description: self.description,
            id: self.id,
        })
    }
}

impl XmlPolicySet {
    pub(crate) fn into_model(self) -> Result<PolicySet, WireError> {
        let mut documents = Vec::with_capacity(self.policies.len() + self.policy_sets.len());
        for policy in self.policies {
            documents.push(PolicyDocument::Policy(policy.into_model()?));
        }
        for set in self.policy_sets {
            documents.push(PolicyDocument::Set(set.into_model()?));
        }
        Ok(PolicySet {
            combining: CombiningAlg::from_uri(&self.combining).ok_or_else(|| {
                WireError::new(format!("unknown combining algorithm '{}'", self.combining))
            })?,
            id: self.id,
            documents,
        })
    }
}

// =============================================================================
// Model → wire
// =============================================================================

fn target_to_wire(target: &Target) -> Option<XmlTarget> {
    if target.is_any() {
        return None;
    }
    Some(XmlTarget {
        matches: target
            .matches
            .iter()
            .map(|m| XmlMatch {
                category: m.category.as_str().to_string(),
                attribute_id: m.attribute_id.clone(),
                data_type: m.attr_type.uri().to_string(),
                function: m.function.as_str().to_string(),
                value: m.value.clone(),
            })
            .collect(),
    })
}

fn rule_to_wire(rule: &Rule) -> XmlRule {
    XmlRule {
        id: rule.id.clone(),
        effect: rule.effect.to_string(),
        target: rule.target.as_ref().and_then(target_to_wire),
        conditions: rule
            .conditions
            .iter()
            .map(|c| XmlCondition {
                function: c.function.as_str().to_string(),
                category: c.category.as_str().to_string(),
                attribute_id: c.attribute_id.clone(),
                data_type: c.attr_type.uri().to_string(),
                values: c.values.clone(),
            })
            .collect(),
    }
}

fn policy_to_wire(policy: &Policy) -> XmlPolicy {
    XmlPolicy {
        id: policy.id.clone(),
        rule_combining: policy.rule_combining.uri().to_string(),
        description: policy.description.clone(),
        target: target_to_wire(&policy.target),
        rules: policy.rules.iter().map(rule_to_wire).collect(),
    }
}

fn set_to_wire(set: &PolicySet) -> XmlPolicySet {
    let mut policies = Vec::new();
    let mut policy_sets = Vec::new();
    for doc in &set.documents {
        match doc {
            PolicyDocument::Policy(p) => policies.push(policy_to_wire(p)),
            PolicyDocument::Set(s) => policy_sets.push(set_to_wire(s)),
        }
    }
    XmlPolicySet {
        id: set.id.clone(),
        combining: set.combining.uri().to_string(),
        policies,
        policy_sets,
    }
}

/// Serialize a document to its XML wire form.
///
/// # Errors
///
/// Returns a [`WireError`] if serialization fails.
pub fn to_xml_string(document: &PolicyDocument) -> Result<String, WireError> {
    let body = match document {
        PolicyDocument::Policy(policy) => {
            quick_xml::se::to_string_with_root("Policy", &policy_to_wire(policy))
                .map_err(|e| WireError::new(format!("cannot serialize policy: {e}")))?
        }
        PolicyDocument::Set(set) => {
            quick_xml::se::to_string_with_root("PolicySet", &set_to_wire(set))
                .map_err(|e| WireError::new(format!("cannot serialize policy set: {e}")))?
        }
    };
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttributeCategory;
    use crate::policy::model::Effect;

    fn sample_policy() -> Policy {
        Policy {
            id: "urn:test:policy:1".to_string(),
            description: Some("sample".to_string()),
            rule_combining: CombiningAlg::OrderedDenyOverrides,
            target: Target {
                matches: vec![AttributeMatch::equal(
                    AttributeCategory::Subject,
                    "urn:reliq:names:authz:1.0:subject:login-id",
                    "alice",
                )],
            },
            rules: vec![
                Rule {
                    id: "permit".to_string(),
                    effect: Effect::Permit,
                    target: None,
                    conditions: vec![Condition {
                        function: ConditionFunction::IpInRange,
                        category: AttributeCategory::Environment,
                        attribute_id: "urn:reliq:names:authz:1.0:environment:client-ip".to_string(),
                        attr_type: AttributeType::String,
                        values: vec!["10.0.0.0/8".to_string()],
                    }],
                },
                Rule::unconditional("deny-rest", Effect::Deny),
            ],
        }
    }

    #[test]
    fn test_policy_wire_roundtrip() {
        let doc = PolicyDocument::Policy(sample_policy());
        let xml = to_xml_string(&doc).unwrap();
        assert!(xml.contains("PolicyId=\"urn:test:policy:1\""));
        assert!(xml.contains("<Value>10.0.0.0/8</Value>"));

        let body = xml.splitn(2, '\n').nth(1).unwrap();
        let parsed: XmlPolicy = quick_xml::de::from_str(body).unwrap();
        let model = parsed.into_model().unwrap();
        assert_eq!(PolicyDocument::Policy(model), doc);
    }

    #[test]
    fn test_set_wire_roundtrip() {
        let doc = PolicyDocument::Set(PolicySet {
            id: "urn:test:set:1".to_string(),
            combining: CombiningAlg::FirstApplicable,
            documents: vec![PolicyDocument::Policy(sample_policy())],
        });
        let xml = to_xml_string(&doc).unwrap();

        let body = xml.splitn(2, '\n').nth(1).unwrap();
        let parsed: XmlPolicySet = quick_xml::de::from_str(body).unwrap();
        let model = parsed.into_model().unwrap();
        assert_eq!(PolicyDocument::Set(model), doc);
    }

    #[test]
    fn test_unknown_combining_rejected() {
        let xml = r#"<Policy PolicyId="urn:p" RuleCombiningAlgId="urn:bogus"/>"#;
        let parsed: XmlPolicy = quick_xml::de::from_str(xml).unwrap();
        assert!(parsed.into_model().is_err());
    }

    #[test]
    fn test_unknown_effect_rejected() {
        let xml = r#"<Policy PolicyId="urn:p"
            RuleCombiningAlgId="urn:reliq:names:authz:1.0:combining:ordered-deny-overrides">
            <Rule RuleId="r" Effect="Shrug"/>
        </Policy>"#;
        let parsed: XmlPolicy = quick_xml::de::from_str(xml).unwrap();
        assert!(parsed.into_model().is_err());
    }
}
