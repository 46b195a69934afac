//! Policy repository loading.
//!
//! [`DirectoryPolicyLoader`] walks a policy directory recursively, parses
//! every `*.xml` file, and keys the result per the configured
//! [`PolicyKeying`] strategy. A `default/` subdirectory holds baseline
//! policies: it is processed first, and an identically-keyed policy
//! elsewhere in the tree overrides the baseline entry. Duplicate keys
//! between two non-baseline files fail the load.
//!
//! The loader also fetches the per-object policy overlay from the reserved
//! [`POLICY_DATASTREAM_ID`] datastream.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use reliq_core::Pid;
use reliq_storage::ObjectStore;
use serde::{Deserialize, Serialize};

use crate::AuthzResult;
use crate::error::AuthzError;
use crate::policy::model::PolicyDocument;
use crate::policy::parser::PolicyParser;

/// Reserved datastream id carrying an object's policy overlay.
pub const POLICY_DATASTREAM_ID: &str = "POLICY";

/// Name of the baseline subdirectory, processed first and overridable.
pub const DEFAULT_SUBDIRECTORY: &str = "default";

/// How loaded policies are keyed in the repository map.
///
/// Pick one strategy per deployment; mixing both patterns in one directory
/// leaves precedence undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKeying {
    /// Key by the parsed document id.
    #[default]
    PolicyId,
    /// Key by file name.
    Filename,
}

impl PolicyKeying {
    fn key(&self, path: &Path, document: &PolicyDocument) -> String {
        match self {
            Self::PolicyId => document.id().to_string(),
            Self::Filename => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// Recursive directory loader for policy documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryPolicyLoader {
    keying: PolicyKeying,
}

impl DirectoryPolicyLoader {
    /// A loader using the given keying strategy.
    #[must_use]
    pub fn new(keying: PolicyKeying) -> Self {
        Self { keying }
    }

    /// The keying strategy in use.
    #[must_use]
    pub fn keying(&self) -> PolicyKeying {
        self.keying
    }

    /// Load every policy under `dir`.
    ///
    /// The `default/` subdirectory is processed first; its keys may be
    /// overridden once by a policy elsewhere in the tree. Any other
    /// duplicate key, and any file that fails to parse or validate, fails
    /// the whole load.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Validation` for parse/validation failures and
    /// key conflicts, `AuthzError::Operational` for I/O failures.
    pub async fn load_policies(
        &self,
        parser: &PolicyParser,
        validate: bool,
        dir: &Path,
    ) -> AuthzResult<IndexMap<String, PolicyDocument>> {
        let mut map = IndexMap::new();
        let mut baseline_keys = HashSet::new();

        let default_dir = dir.join(DEFAULT_SUBDIRECTORY);
        if is_dir(&default_dir).await {
            for path in collect_policy_files(&default_dir).await? {
                let (key, document) = self.load_one(parser, validate, &path).await?;
                if map.insert(key.clone(), document).is_some() {
                    return Err(AuthzError::validation(format!(
                        "conflicting baseline policy key '{key}' (from {})",
                        path.display()
                    )));
                }
                baseline_keys.insert(key);
            }
        }

        for path in collect_policy_files_excluding(dir, &default_dir).await? {
            let (key, document) = self.load_one(parser, validate, &path).await?;
            if map.contains_key(&key) && !baseline_keys.remove(&key) {
                return Err(AuthzError::validation(format!(
                    "conflicting policy key '{key}' (from {})",
                    path.display()
                )));
            }
            if map.insert(key.clone(), document).is_some() {
                tracing::debug!(key = %key, path = %path.display(), "baseline policy overridden");
            }
        }

        tracing::info!(
            policies = map.len(),
            directory = %dir.display(),
            "policy repository loaded"
        );
        Ok(map)
    }

    async fn load_one(
        &self,
        parser: &PolicyParser,
        validate: bool,
        path: &Path,
    ) -> AuthzResult<(String, PolicyDocument)> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AuthzError::operational(format!("cannot read policy file {}: {e}", path.display()))
        })?;
        let document = parser.parse(&bytes, validate).map_err(|e| {
            AuthzError::validation(format!("policy file {}: {e}", path.display()))
        })?;
        Ok((self.keying.key(path, &document), document))
    }

    /// Fetch and parse an object's policy overlay.
    ///
    /// A missing object or missing policy datastream is `None` ("no
    /// overlay"), not an error.
    ///
    /// # Errors
    ///
    /// Parse failures return `AuthzError::Validation`; store failures other
    /// than not-found propagate as `AuthzError::Operational`.
    pub async fn load_object_policy(
        &self,
        parser: &PolicyParser,
        store: &dyn ObjectStore,
        pid: &Pid,
        validate: bool,
    ) -> AuthzResult<Option<PolicyDocument>> {
        match store.datastream_content(pid, POLICY_DATASTREAM_ID).await {
            Ok(Some(bytes)) => {
                let document = parser.parse(&bytes, validate).map_err(|e| {
                    AuthzError::validation(format!("object policy for {pid}: {e}"))
                })?;
                Ok(Some(document))
            }
            Ok(None) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(AuthzError::operational(format!(
                "object policy lookup failed for {pid}: {e}"
            ))),
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// All `*.xml` files under `root`, recursively, in a deterministic order.
async fn collect_policy_files(root: &Path) -> AuthzResult<Vec<PathBuf>> {
    collect_policy_files_excluding(root, Path::new("")).await
}

async fn collect_policy_files_excluding(root: &Path, skip: &Path) -> AuthzResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir).await.map_err(|e| {
            AuthzError::operational(format!("cannot read policy directory {}: {e}", dir.display()))
        })?;
        while let Some(entry) = reader.next_entry().await.map_err(|e| {
            AuthzError::operational(format!("cannot read policy directory {}: {e}", dir.display()))
        })? {
            entries.push(entry.path());
        }
        entries.sort();

        for path in entries {
            if path == skip {
                continue;
            }
            if is_dir(&path).await {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "xml") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use reliq_core::{ControlGroup, DatastreamInfo, ObjectProfile, ObjectState, RepoDateTime};
    use reliq_storage::MemoryObjectStore;
    use time::macros::datetime;

    fn policy_xml(id: &str, effect: &str) -> String {
        format!(
            r#"<Policy PolicyId="{id}"
  RuleCombiningAlgId="urn:reliq:names:authz:1.0:combining:ordered-deny-overrides">
  <Rule RuleId="r" Effect="{effect}"/>
</Policy>"#
        )
    }

    async fn write(dir: &Path, name: &str, content: &str) {
        tokio::fs::create_dir_all(dir).await.unwrap();
        tokio::fs::write(dir.join(name), content).await.unwrap();
    }

    #[tokio::test]
    async fn test_recursive_load_by_policy_id() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.xml", &policy_xml("urn:test:a", "Permit")).await;
        write(&tmp.path().join("nested"), "b.xml", &policy_xml("urn:test:b", "Deny")).await;
        write(tmp.path(), "notes.txt", "not a policy").await;

        let loader = DirectoryPolicyLoader::new(PolicyKeying::PolicyId);
        let map = loader
            .load_policies(&PolicyParser::new(), true, tmp.path())
            .await
            .unwrap();

        assert_eq!(map.len(), 2);
        assert!(map.contains_key("urn:test:a"));
        assert!(map.contains_key("urn:test:b"));
    }

    #[tokio::test]
    async fn test_override_of_baseline_by_policy_id() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            &tmp.path().join(DEFAULT_SUBDIRECTORY),
            "baseline.xml",
            &policy_xml("urn:test:shared", "Deny"),
        )
        .await;
        write(tmp.path(), "site.xml", &policy_xml("urn:test:shared", "Permit")).await;

        let loader = DirectoryPolicyLoader::new(PolicyKeying::PolicyId);
        let map = loader
            .load_policies(&PolicyParser::new(), true, tmp.path())
            .await
            .unwrap();

        // Exactly one entry, sourced from the override.
        assert_eq!(map.len(), 1);
        let PolicyDocument::Policy(policy) = &map["urn:test:shared"] else {
            panic!("expected a policy");
        };
        assert_eq!(
            policy.rules[0].effect,
            crate::policy::model::Effect::Permit
        );
    }

    #[tokio::test]
    async fn test_filename_keying_keeps_same_id_distinct() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            &tmp.path().join(DEFAULT_SUBDIRECTORY),
            "baseline.xml",
            &policy_xml("urn:test:shared", "Deny"),
        )
        .await;
        write(tmp.path(), "site.xml", &policy_xml("urn:test:shared", "Permit")).await;

        let loader = DirectoryPolicyLoader::new(PolicyKeying::Filename);
        let map = loader
            .load_policies(&PolicyParser::new(), true, tmp.path())
            .await
            .unwrap();

        // Distinct file names, distinct entries.
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("baseline.xml"));
        assert!(map.contains_key("site.xml"));
    }

    #[tokio::test]
    async fn test_duplicate_non_baseline_key_fails() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "one.xml", &policy_xml("urn:test:dup", "Permit")).await;
        write(tmp.path(), "two.xml", &policy_xml("urn:test:dup", "Deny")).await;

        let loader = DirectoryPolicyLoader::new(PolicyKeying::PolicyId);
        let err = loader
            .load_policies(&PolicyParser::new(), true, tmp.path())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("conflicting policy key"));
    }

    #[tokio::test]
    async fn test_one_bad_file_fails_whole_load() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "good.xml", &policy_xml("urn:test:good", "Permit")).await;
        write(tmp.path(), "bad.xml", "<Policy PolicyId=oops").await;

        let loader = DirectoryPolicyLoader::default();
        let err = loader
            .load_policies(&PolicyParser::new(), true, tmp.path())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("bad.xml"));
    }

    async fn store_with_policy_object(content: Option<&[u8]>) -> Arc<MemoryObjectStore> {
        let store = Arc::new(MemoryObjectStore::new());
        store
            .put_object(ObjectProfile {
                pid: "demo:1".parse().unwrap(),
                state: ObjectState::Active,
                label: None,
                owner_id: None,
                content_models: Vec::new(),
                created: RepoDateTime::new(datetime!(2024-01-01 00:00:00 UTC)),
                last_modified: RepoDateTime::new(datetime!(2024-01-01 00:00:00 UTC)),
            })
            .await;
        if let Some(bytes) = content {
            store
                .put_datastream(
                    &"demo:1".parse().unwrap(),
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
                    Some(bytes.to_vec()),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_object_policy_overlay_loaded() {
        let xml = policy_xml("urn:test:overlay", "Deny");
        let store = store_with_policy_object(Some(xml.as_bytes())).await;

        let loader = DirectoryPolicyLoader::default();
        let overlay = loader
            .load_object_policy(
                &PolicyParser::new(),
                store.as_ref(),
                &"demo:1".parse().unwrap(),
                true,
            )
            .await
            .unwrap();
        assert_eq!(overlay.unwrap().id(), "urn:test:overlay");
    }

    #[tokio::test]
    async fn test_object_without_policy_datastream_is_none() {
        let store = store_with_policy_object(None).await;

        let loader = DirectoryPolicyLoader::default();
        let overlay = loader
            .load_object_policy(
                &PolicyParser::new(),
                store.as_ref(),
                &"demo:1".parse().unwrap(),
                true,
            )
            .await
            .unwrap();
        assert!(overlay.is_none());
    }

    #[tokio::test]
    async fn test_missing_object_is_none() {
        let store = MemoryObjectStore::new();

        let loader = DirectoryPolicyLoader::default();
        let overlay = loader
            .load_object_policy(
                &PolicyParser::new(),
                &store,
                &"demo:404".parse().unwrap(),
                true,
            )
            .await
            .unwrap();
        assert!(overlay.is_none());
    }

    #[tokio::test]
    async fn test_malformed_overlay_propagates() {
        let store = store_with_policy_object(Some(b"<Policy PolicyId=oops")).await;

        let loader = DirectoryPolicyLoader::default();
        let err = loader
            .load_object_policy(
                &PolicyParser::new(),
                store.as_ref(),
                &"demo:1".parse().unwrap(),
                true,
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
