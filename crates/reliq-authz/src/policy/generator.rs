//! Backend policy generation.
//!
//! Server-to-server callers (backend services calling back into the
//! repository) are governed by the same engine as interactive callers. A
//! declarative backend security specification maps caller role keys to
//! authentication/TLS/source-IP requirements; the generator compiles it to
//! one policy document per role key, written into the generated policy
//! subdirectory that the policy finder wipes and re-emits on every init.
//!
//! Role keys are `default`, `caller`, or `caller/method`. Lookup falls back
//! method → caller → default, so a caller without a method-specific entry
//! lands in its role-wide bucket.
//!
//! # Specification format (TOML)
//!
//! ```toml
//! [roles.default]
//! callback_requires_auth = false
//!
//! [roles."indexer"]
//! callback_requires_auth = true
//! callback_requires_tls = true
//! allowed_ip_patterns = ["10.0.0.0/8", "127.0.0.1"]
//!
//! [roles."indexer/rebuild"]
//! callback_requires_auth = true
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::AuthzResult;
use crate::attr::{AttributeCategory, AttributeType, ids};
use crate::error::AuthzError;
use crate::policy::model::{
    AttributeMatch, CombiningAlg, Condition, ConditionFunction, Effect, Policy, PolicyDocument,
    Rule, Target,
};
use crate::policy::xml;

/// Role key addressing every caller without a more specific entry.
pub const DEFAULT_ROLE_KEY: &str = "default";

/// Security requirements of one backend caller role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendRoleProperties {
    /// The callback must authenticate itself.
    pub callback_requires_auth: bool,

    /// The callback must arrive over TLS.
    pub callback_requires_tls: bool,

    /// Source addresses the callback may arrive from, in CIDR notation.
    /// Empty means any source.
    pub allowed_ip_patterns: Vec<String>,
}

impl BackendRoleProperties {
    /// Whether any requirement is non-trivial.
    #[must_use]
    pub fn is_restrictive(&self) -> bool {
        self.callback_requires_auth
            || self.callback_requires_tls
            || !self.allowed_ip_patterns.is_empty()
    }
}

/// Parsed backend security specification.
///
/// Exposes the raw per-role facts to any module that needs them, and feeds
/// the [`BackendPolicyGenerator`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSecuritySpec {
    /// Role key → properties.
    pub roles: BTreeMap<String, BackendRoleProperties>,
}

impl BackendSecuritySpec {
    /// Parse a specification from TOML.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Validation` for malformed TOML, malformed role
    /// keys, or unparseable IP patterns.
    pub fn from_toml_str(text: &str) -> AuthzResult<Self> {
        let spec: Self = toml::from_str(text).map_err(|e| {
            AuthzError::validation(format!("malformed backend security spec: {e}"))
        })?;
        spec.check()?;
        Ok(spec)
    }

    /// Load a specification from a file.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Operational` when the file cannot be read and
    /// `AuthzError::Validation` when it cannot be parsed.
    pub async fn load(path: &Path) -> AuthzResult<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            AuthzError::operational(format!(
                "cannot read backend security spec {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    fn check(&self) -> AuthzResult<()> {
        for (key, properties) in &self.roles {
            if key.is_empty() || key.split('/').count() > 2 || key.split('/').any(str::is_empty) {
                return Err(AuthzError::validation(format!(
                    "invalid backend role key '{key}'"
                )));
            }
            for pattern in &properties.allowed_ip_patterns {
                pattern.parse::<ipnetwork::IpNetwork>().map_err(|e| {
                    AuthzError::validation(format!(
                        "invalid IP pattern '{pattern}' for role '{key}': {e}"
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// The raw properties stored for an exact role key.
    #[must_use]
    pub fn role(&self, key: &str) -> Option<&BackendRoleProperties> {
        self.roles.get(key)
    }

    /// Effective properties for a caller/method pair: method-specific entry,
    /// then the caller-wide bucket, then `default`.
    #[must_use]
    pub fn effective(&self, caller: &str, method: &str) -> Option<&BackendRoleProperties> {
        self.roles
            .get(&format!("{caller}/{method}"))
            .or_else(|| self.roles.get(caller))
            .or_else(|| self.roles.get(DEFAULT_ROLE_KEY))
    }

    /// All role keys, in stable order.
    pub fn role_keys(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}

/// Compiles the backend security specification into policy documents.
#[derive(Debug, Clone)]
pub struct BackendPolicyGenerator {
    spec: BackendSecuritySpec,
}

impl BackendPolicyGenerator {
    /// A generator over a parsed specification.
    #[must_use]
    pub fn new(spec: BackendSecuritySpec) -> Self {
        Self { spec }
    }

    /// The specification being compiled.
    #[must_use]
    pub fn spec(&self) -> &BackendSecuritySpec {
        &self.spec
    }

    /// Pure transform: the policy for one role key.
    ///
    /// A Permit rule scoped to the role's subject carries the
    /// authentication/TLS/source-IP conditions; when any of those is
    /// non-trivial, a trailing catch-all Deny rule for the same target
    /// closes the gap the conditional Permit leaves open.
    #[must_use]
    pub fn policy_for_role(
        &self,
        role_key: &str,
        properties: &BackendRoleProperties,
    ) -> PolicyDocument {
        let (caller, method) = split_role_key(role_key);

        let mut matches = Vec::new();
        if let Some(caller) = caller {
            matches.push(AttributeMatch::equal(
                AttributeCategory::Subject,
                ids::subject::LOGIN_ID,
                caller,
            ));
        }
        if let Some(method) = method {
            matches.push(AttributeMatch::equal(
                AttributeCategory::Action,
                ids::action::ID,
                method,
            ));
        }
        let target = Target { matches };

        let mut conditions = Vec::new();
        if properties.callback_requires_auth {
            conditions.push(boolean_condition(
                ids::environment::CALLBACK_AUTHENTICATED,
            ));
        }
        if properties.callback_requires_tls {
            conditions.push(boolean_condition(ids::environment::CALLBACK_SECURE));
        }
        if !properties.allowed_ip_patterns.is_empty() {
            conditions.push(Condition {
                function: ConditionFunction::IpInRange,
                category: AttributeCategory::Environment,
                attribute_id: ids::environment::CLIENT_IP.to_string(),
                attr_type: AttributeType::String,
                values: properties.allowed_ip_patterns.clone(),
            });
        }

        let mut rules = vec![Rule {
            id: "permit-callback".to_string(),
            effect: Effect::Permit,
            target: None,
            conditions,
        }];
        if properties.is_restrictive() {
            rules.push(Rule::unconditional("deny-otherwise", Effect::Deny));
        }

        PolicyDocument::Policy(Policy {
            id: format!("urn:reliq:policies:backend:{}", sanitize(role_key)),
            description: Some(format!("Generated backend policy for role '{role_key}'")),
            rule_combining: CombiningAlg::FirstApplicable,
            target,
            rules,
        })
    }

    /// File name the policy for a role key is written under.
    #[must_use]
    pub fn file_name_for_role(role_key: &str) -> String {
        format!("backend-{}.xml", sanitize(role_key))
    }

    /// Delete and re-emit the generated policy directory.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Operational` for filesystem failures,
    /// `AuthzError::Validation` if a generated document fails to serialize.
    pub async fn generate_into(&self, dir: &Path) -> AuthzResult<()> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AuthzError::operational(format!(
                    "cannot clear generated policy directory {}: {e}",
                    dir.display()
                )));
            }
        }
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            AuthzError::operational(format!(
                "cannot create generated policy directory {}: {e}",
                dir.display()
            ))
        })?;

        for (role_key, properties) in &self.spec.roles {
            let document = self.policy_for_role(role_key, properties);
            let content = xml::to_xml_string(&document)
                .map_err(|e| AuthzError::validation(e.to_string()))?;
            let path = dir.join(Self::file_name_for_role(role_key));
            tokio::fs::write(&path, content).await.map_err(|e| {
                AuthzError::operational(format!(
                    "cannot write generated policy {}: {e}",
                    path.display()
                ))
            })?;
        }

        tracing::info!(
            roles = self.spec.roles.len(),
            directory = %dir.display(),
            "backend policies regenerated"
        );
        Ok(())
    }
}

fn boolean_condition(attribute_id: &str) -> Condition {
    Condition {
        function: ConditionFunction::AnyEqual,
        category: AttributeCategory::Environment,
        attribute_id: attribute_id.to_string(),
        attr_type: AttributeType::Boolean,
        values: vec!["true".to_string()],
    }
}

/// `default` → no subject scope; `caller` → subject; `caller/method` →
/// subject + action.
fn split_role_key(role_key: &str) -> (Option<&str>, Option<&str>) {
    if role_key == DEFAULT_ROLE_KEY {
        return (None, None);
    }
    match role_key.split_once('/') {
        Some((caller, method)) => (Some(caller), Some(method)),
        None => (Some(role_key), None),
    }
}

fn sanitize(role_key: &str) -> String {
    role_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
        .collect()
}
