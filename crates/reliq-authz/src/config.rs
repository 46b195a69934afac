//! Authorization engine configuration.
//!
//! Configuration types for the enforcement point and the policy
//! repository, deserializable from TOML.
//!
//! # Example (TOML)
//!
//! ```toml
//! enforce_mode = "enforce-policies"
//! owner_id_separator = ","
//! backend_spec_path = "conf/backend-security.toml"
//!
//! [policy]
//! policies_dir = "data/policies"
//! keying = "policy-id"
//! combining_algorithm = "ordered-deny-overrides"
//! validate_repository_policies = true
//! validate_object_policies = true
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::AuthzResult;
use crate::error::AuthzError;
use crate::policy::loader::PolicyKeying;
use crate::policy::model::CombiningAlg;

/// Enforce-mode value that evaluates policies.
pub const ENFORCE_MODE_ENFORCE_POLICIES: &str = "enforce-policies";

/// Enforce-mode value that bypasses evaluation and permits every request.
pub const ENFORCE_MODE_PERMIT_ALL: &str = "permit-all-requests";

/// Enforce-mode value that bypasses evaluation and denies every request.
pub const ENFORCE_MODE_DENY_ALL: &str = "deny-all-requests";

/// Root configuration of the authorization engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// One of `enforce-policies`, `permit-all-requests`,
    /// `deny-all-requests`. Any other value is a configuration error,
    /// surfaced at enforcement time.
    pub enforce_mode: String,

    /// Separator splitting the raw object owner field into owner ids.
    pub owner_id_separator: String,

    /// Path of the backend security specification. When unset, no backend
    /// policies are generated.
    pub backend_spec_path: Option<PathBuf>,

    /// Policy repository configuration.
    pub policy: PolicyRepositoryConfig,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            enforce_mode: ENFORCE_MODE_ENFORCE_POLICIES.to_string(),
            owner_id_separator: ",".to_string(),
            backend_spec_path: None,
            policy: PolicyRepositoryConfig::default(),
        }
    }
}

impl AuthzConfig {
    /// Parse a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Validation` for malformed TOML.
    pub fn from_toml_str(text: &str) -> AuthzResult<Self> {
        toml::from_str(text)
            .map_err(|e| AuthzError::validation(format!("malformed authz configuration: {e}")))
    }
}

/// Policy repository configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyRepositoryConfig {
    /// Root directory of the policy repository.
    pub policies_dir: PathBuf,

    /// Keying strategy of the repository map. Pick one per deployment.
    pub keying: PolicyKeying,

    /// Combining algorithm applied when repository policies and the object
    /// overlay are composed into one set.
    pub combining_algorithm: CombiningAlg,

    /// Schema-validate repository policies while loading.
    pub validate_repository_policies: bool,

    /// Schema-validate object overlay policies when fetched.
    pub validate_object_policies: bool,
}

impl Default for PolicyRepositoryConfig {
    fn default() -> Self {
        Self {
            policies_dir: PathBuf::from("data/policies"),
            keying: PolicyKeying::default(),
            combining_algorithm: CombiningAlg::default(),
            validate_repository_policies: true,
            validate_object_policies: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthzConfig::default();
        assert_eq!(config.enforce_mode, ENFORCE_MODE_ENFORCE_POLICIES);
        assert_eq!(config.owner_id_separator, ",");
        assert!(config.backend_spec_path.is_none());
        assert!(config.policy.validate_repository_policies);
        assert_eq!(
            config.policy.combining_algorithm,
            CombiningAlg::OrderedDenyOverrides
        );
    }

    #[test]
    fn test_parse_toml() {
        let config = AuthzConfig::from_toml_str(
            r#"
enforce_mode = "permit-all-requests"
owner_id_separator = ";"
backend_spec_path = "conf/backend-security.toml"

[policy]
policies_dir = "/var/lib/reliq/policies"
keying = "filename"
combining_algorithm = "first-applicable"
validate_object_policies = false
"#,
        )
        .unwrap();

        assert_eq!(config.enforce_mode, ENFORCE_MODE_PERMIT_ALL);
        assert_eq!(config.owner_id_separator, ";");
        assert_eq!(config.policy.keying, PolicyKeying::Filename);
        assert_eq!(
            config.policy.combining_algorithm,
            CombiningAlg::FirstApplicable
        );
        assert!(!config.policy.validate_object_policies);
        assert!(config.policy.validate_repository_policies);
    }

    #[test]
    fn test_reject_malformed_toml() {
        assert!(AuthzConfig::from_toml_str("enforce_mode = [").is_err());
    }
}
