//! Repository policy finder.
//!
//! Supplies the policy set for each evaluation: the cached repository-wide
//! policies plus the target object's overlay policy, composed under the
//! configured combining algorithm (overlay first, so object-specific policy
//! is considered before repository policy under ordered algorithms).
//!
//! `init()` prepares the on-disk repository before loading: the generated
//! backend subdirectory is wiped and re-emitted from the backend security
//! specification, and a missing `default/` subdirectory is seeded from the
//! bundled baseline. The in-memory cache is replaced wholesale on every
//! load, never mutated incrementally.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use reliq_core::Pid;
use reliq_storage::ObjectStore;
use tokio::sync::RwLock;

use crate::AuthzResult;
use crate::attr::{AttributeCategory, AttributeValue, ids};
use crate::config::PolicyRepositoryConfig;
use crate::error::AuthzError;
use crate::eval::{EvaluationContext, PolicyFinder};
use crate::policy::bootstrap::BASELINE_POLICIES;
use crate::policy::generator::BackendPolicyGenerator;
use crate::policy::loader::{DEFAULT_SUBDIRECTORY, DirectoryPolicyLoader};
use crate::policy::model::{PolicyDocument, PolicySet};
use crate::policy::parser::PolicyParser;

/// Subdirectory holding generated backend policies.
pub const GENERATED_SUBDIRECTORY: &str = "generated";

/// Id of the per-request policy set this finder assembles.
const REPOSITORY_SET_ID: &str = "urn:reliq:names:authz:1.0:policy-set:repository";

/// [`PolicyFinder`] over a directory-backed policy repository plus
/// per-object overlays.
pub struct RepositoryPolicyFinder {
    store: Arc<dyn ObjectStore>,
    parser: PolicyParser,
    loader: DirectoryPolicyLoader,
    generator: Option<BackendPolicyGenerator>,
    config: PolicyRepositoryConfig,
    cache: RwLock<IndexMap<String, PolicyDocument>>,
}

impl RepositoryPolicyFinder {
    /// Assemble a finder. Call [`init`](Self::init) before first use.
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        parser: PolicyParser,
        config: PolicyRepositoryConfig,
        generator: Option<BackendPolicyGenerator>,
    ) -> Self {
        Self {
            store,
            parser,
            loader: DirectoryPolicyLoader::new(config.keying),
            generator,
            config,
            cache: RwLock::new(IndexMap::new()),
        }
    }

    /// Prepare the repository directory and load the policy cache.
    ///
    /// # Errors
    ///
    /// Fails on filesystem errors, and on any policy file failing to parse
    /// or validate (a single bad file aborts the whole load).
    pub async fn init(&self) -> AuthzResult<()> {
        if let Some(generator) = &self.generator {
            generator
                .generate_into(&self.config.policies_dir.join(GENERATED_SUBDIRECTORY))
                .await?;
        }

        self.seed_default_directory().await?;

        let loaded = self
            .loader
            .load_policies(
                &self.parser,
                self.config.validate_repository_policies,
                &self.config.policies_dir,
            )
            .await?;

        let mut cache = self.cache.write().await;
        *cache = loaded;
        tracing::info!(policies = cache.len(), "repository policy cache replaced");
        Ok(())
    }

    /// Write the bundled baseline into `default/` when it is absent.
    async fn seed_default_directory(&self) -> AuthzResult<()> {
        let default_dir: PathBuf = self.config.policies_dir.join(DEFAULT_SUBDIRECTORY);
        let exists = tokio::fs::metadata(&default_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if exists {
            return Ok(());
        }

        tokio::fs::create_dir_all(&default_dir).await.map_err(|e| {
            AuthzError::operational(format!(
                "cannot create default policy directory {}: {e}",
                default_dir.display()
            ))
        })?;
        for (name, content) in BASELINE_POLICIES {
            let path = default_dir.join(name);
            tokio::fs::write(&path, content).await.map_err(|e| {
                AuthzError::operational(format!(
                    "cannot write baseline policy {}: {e}",
                    path.display()
                ))
            })?;
        }
        tracing::info!(
            policies = BASELINE_POLICIES.len(),
            directory = %default_dir.display(),
            "seeded baseline policies"
        );
        Ok(())
    }

    /// Number of cached repository policies.
    pub async fn policy_count(&self) -> usize {
        self.cache.read().await.len()
    }

    /// The PID named by the request's resource attributes, if any.
    fn target_pid(ctx: &EvaluationContext) -> Option<Pid> {
        let raw = ctx
            .attributes()
            .get(AttributeCategory::Resource, ids::resource::PID)
            .and_then(|attr| attr.first_value())
            .map(AttributeValue::lexical)?;
        match Pid::parse(raw) {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring invalid pid for policy overlay");
                None
            }
        }
    }
}

#[async_trait]
impl PolicyFinder for RepositoryPolicyFinder {
    async fn find_policy_set(&self, ctx: &EvaluationContext) -> AuthzResult<PolicySet> {
        let overlay = match Self::target_pid(ctx) {
            Some(pid) => {
                self.loader
                    .load_object_policy(
                        &self.parser,
                        self.store.as_ref(),
                        &pid,
                        self.config.validate_object_policies,
                    )
                    .await?
            }
            None => None,
        };

        let cache = self.cache.read().await;
        let mut documents = Vec::with_capacity(cache.len() + 1);
        documents.extend(overlay);
        documents.extend(cache.values().cloned());

        Ok(PolicySet {
            id: REPOSITORY_SET_ID.to_string(),
            combining: self.config.combining_algorithm,
            documents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use reliq_core::{ControlGroup, DatastreamInfo, ObjectProfile, ObjectState, RepoDateTime};
    use reliq_storage::MemoryObjectStore;
    use time::macros::datetime;

    use crate::attr::{Attribute, RequestAttributes};
    use crate::eval::test_support::evaluation_context_with;
    use crate::policy::generator::BackendSecuritySpec;
    use crate::policy::loader::POLICY_DATASTREAM_ID;
    use crate::registry::ContextRegistry;

    fn policy_xml(id: &str, effect: &str) -> String {
        format!(
            r#"<Policy PolicyId="{id}"
  RuleCombiningAlgId="urn:reliq:names:authz:1.0:combining:ordered-deny-overrides">
  <Rule RuleId="r" Effect="{effect}"/>
</Policy>"#
        )
    }

    fn finder_for(dir: &std::path::Path, store: Arc<MemoryObjectStore>) -> RepositoryPolicyFinder {
        let config = PolicyRepositoryConfig {
            policies_dir: dir.to_path_buf(),
            ..PolicyRepositoryConfig::default()
        };
        RepositoryPolicyFinder::new(store, PolicyParser::new(), config, None)
    }

    fn pid_attributes(pid: &str) -> RequestAttributes {
        let mut attributes = RequestAttributes::default();
        attributes
            .resource
            .insert(Attribute::single(ids::resource::PID, pid.into()));
        attributes
    }

    async fn object_with_overlay(store: &MemoryObjectStore, pid: &str, overlay: Option<&str>) {
        store
            .put_object(ObjectProfile {
                pid: pid.parse().unwrap(),
                state: ObjectState::Active,
                label: None,
                owner_id: None,
                content_models: Vec::new(),
                created: RepoDateTime::new(datetime!(2024-01-01 00:00:00 UTC)),
                last_modified: RepoDateTime::new(datetime!(2024-01-01 00:00:00 UTC)),
            })
            .await;
        if let Some(content) = overlay {
            store
                .put_datastream(
                    &pid.parse().unwrap(),
                    DatastreamInfo {
                        id: POLICY_DATASTREAM_ID.to_string(),
                        state: ObjectState::Active,
                        control_group: ControlGroup::Inline,
                        mime_type: Some("text/xml".to_string()),
                        format_uri: None,
                        location: None,
                        checksum: None,
                        checksum_type: None,
                        created: RepoDateTime::new(datetime!(2024-01-01 00:00:00 UTC)),
                    },
                    Some(content.as_bytes().to_vec()),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_init_seeds_baseline_and_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let finder = finder_for(tmp.path(), store);

        finder.init().await.unwrap();

        assert!(tmp.path().join(DEFAULT_SUBDIRECTORY).is_dir());
        assert_eq!(finder.policy_count().await, BASELINE_POLICIES.len());

        // A second init does not duplicate the baseline.
        finder.init().await.unwrap();
        assert_eq!(finder.policy_count().await, BASELINE_POLICIES.len());
    }

    #[tokio::test]
    async fn test_init_regenerates_backend_policies() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let spec = BackendSecuritySpec::from_toml_str(
            r#"
[roles."indexer"]
callback_requires_auth = true
"#,
        )
        .unwrap();
        let config = PolicyRepositoryConfig {
            policies_dir: tmp.path().to_path_buf(),
            ..PolicyRepositoryConfig::default()
        };
        let finder = RepositoryPolicyFinder::new(
            store,
            PolicyParser::new(),
            config,
            Some(BackendPolicyGenerator::new(spec)),
        );

        finder.init().await.unwrap();

        let generated = tmp.path().join(GENERATED_SUBDIRECTORY);
        assert!(generated.join("backend-indexer.xml").exists());
        // Baseline + one generated policy.
        assert_eq!(finder.policy_count().await, BASELINE_POLICIES.len() + 1);
    }

    #[tokio::test]
    async fn test_find_policy_set_without_pid() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let finder = finder_for(tmp.path(), store);
        finder.init().await.unwrap();

        let ctx = evaluation_context_with(
            RequestAttributes::default(),
            Vec::new(),
            Arc::new(ContextRegistry::new()),
        );
        let set = finder.find_policy_set(&ctx).await.unwrap();
        assert_eq!(set.documents.len(), BASELINE_POLICIES.len());
    }

    #[tokio::test]
    async fn test_find_policy_set_prepends_overlay() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        object_with_overlay(&store, "demo:1", Some(&policy_xml("urn:test:overlay", "Deny")))
            .await;

        let finder = finder_for(tmp.path(), store);
        finder.init().await.unwrap();

        let ctx = evaluation_context_with(
            pid_attributes("demo:1"),
            Vec::new(),
            Arc::new(ContextRegistry::new()),
        );
        let set = finder.find_policy_set(&ctx).await.unwrap();
        assert_eq!(set.documents.len(), BASELINE_POLICIES.len() + 1);
        assert_eq!(set.documents[0].id(), "urn:test:overlay");
    }

    #[tokio::test]
    async fn test_object_without_overlay_uses_repository_only() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        object_with_overlay(&store, "demo:1", None).await;

        let finder = finder_for(tmp.path(), store);
        finder.init().await.unwrap();

        let ctx = evaluation_context_with(
            pid_attributes("demo:1"),
            Vec::new(),
            Arc::new(ContextRegistry::new()),
        );
        let set = finder.find_policy_set(&ctx).await.unwrap();
        assert_eq!(set.documents.len(), BASELINE_POLICIES.len());
    }

    #[tokio::test]
    async fn test_malformed_overlay_propagates_as_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        object_with_overlay(&store, "demo:1", Some("<Policy PolicyId=oops")).await;

        let finder = finder_for(tmp.path(), store);
        finder.init().await.unwrap();

        let ctx = evaluation_context_with(
            pid_attributes("demo:1"),
            Vec::new(),
            Arc::new(ContextRegistry::new()),
        );
        let err = finder.find_policy_set(&ctx).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_bad_repository_policy_aborts_init() {
        let tmp = tempfile::tempdir().unwrap();
        tokio::fs::write(tmp.path().join("broken.xml"), "<Policy PolicyId=oops")
            .await
            .unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let finder = finder_for(tmp.path(), store);

        let err = finder.init().await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(finder.policy_count().await, 0);
    }
}
