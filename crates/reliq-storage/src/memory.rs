//! In-memory object store.
//!
//! Holds objects, datastream metadata, and datastream content in process
//! memory. Used for embedded deployments and throughout the test suites.

use std::collections::HashMap;

use async_trait::async_trait;
use reliq_core::{DatastreamInfo, ObjectProfile, Pid};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::traits::ObjectStore;

struct StoredObject {
    profile: ObjectProfile,
    datastreams: HashMap<String, DatastreamInfo>,
    content: HashMap<String, Vec<u8>>,
}

impl StoredObject {
    fn new(profile: ObjectProfile) -> Self {
        Self {
            profile,
            datastreams: HashMap::new(),
            content: HashMap::new(),
        }
    }
}

/// In-memory [`ObjectStore`] implementation.
///
/// # Example
///
/// ```ignore
/// use reliq_storage::MemoryObjectStore;
///
/// let store = MemoryObjectStore::new();
/// store.put_object(profile).await;
/// store.put_datastream(&pid, info, Some(content)).await?;
/// ```
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace an object profile.
    ///
    /// Existing datastreams of the object are preserved.
    pub async fn put_object(&self, profile: ObjectProfile) {
        let mut objects = self.objects.write().await;
        let key = profile.pid.as_str().to_string();
        match objects.get_mut(&key) {
            Some(existing) => existing.profile = profile,
            None => {
                objects.insert(key, StoredObject::new(profile));
            }
        }
    }

    /// Attach a datastream (metadata plus optional content) to an object.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the object has not been inserted.
    pub async fn put_datastream(
        &self,
        pid: &Pid,
        info: DatastreamInfo,
        content: Option<Vec<u8>>,
    ) -> Result<(), StorageError> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(pid.as_str())
            .ok_or_else(|| StorageError::object_not_found(pid.as_str()))?;
        if let Some(bytes) = content {
            object.content.insert(info.id.clone(), bytes);
        }
        object.datastreams.insert(info.id.clone(), info);
        Ok(())
    }

    /// Remove an object and all its datastreams.
    pub async fn remove_object(&self, pid: &Pid) {
        self.objects.write().await.remove(pid.as_str());
    }

    /// Number of stored objects.
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn object_profile(&self, pid: &Pid) -> Result<Option<ObjectProfile>, StorageError> {
        let objects = self.objects.read().await;
        Ok(objects.get(pid.as_str()).map(|o| o.profile.clone()))
    }

    async fn datastream(
        &self,
        pid: &Pid,
        datastream_id: &str,
    ) -> Result<Option<DatastreamInfo>, StorageError> {
        let objects = self.objects.read().await;
        Ok(objects
            .get(pid.as_str())
            .and_then(|o| o.datastreams.get(datastream_id))
            .cloned())
    }

    async fn datastream_content(
        &self,
        pid: &Pid,
        datastream_id: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let objects = self.objects.read().await;
        Ok(objects
            .get(pid.as_str())
            .and_then(|o| o.content.get(datastream_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reliq_core::{ControlGroup, ObjectState, RepoDateTime};
    use time::macros::datetime;

    fn profile(pid: &str) -> ObjectProfile {
        ObjectProfile {
            pid: pid.parse().unwrap(),
            state: ObjectState::Active,
            label: Some("test object".to_string()),
            owner_id: Some("alice".to_string()),
            content_models: vec!["model:doc".to_string()],
            created: RepoDateTime::new(datetime!(2024-01-01 00:00:00 UTC)),
            last_modified: RepoDateTime::new(datetime!(2024-01-02 00:00:00 UTC)),
        }
    }

    fn datastream_info(id: &str) -> DatastreamInfo {
        DatastreamInfo {
            id: id.to_string(),
            state: ObjectState::Active,
            control_group: ControlGroup::Managed,
            mime_type: Some("text/xml".to_string()),
            format_uri: None,
            location: None,
            checksum: None,
            checksum_type: None,
            created: RepoDateTime::new(datetime!(2024-01-01 00:00:00 UTC)),
        }
    }

    #[tokio::test]
    async fn test_missing_object_is_none() {
        let store = MemoryObjectStore::new();
        let pid: Pid = "demo:1".parse().unwrap();
        assert!(store.object_profile(&pid).await.unwrap().is_none());
        assert!(!store.exists(&pid).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_and_read_object() {
        let store = MemoryObjectStore::new();
        store.put_object(profile("demo:1")).await;

        let pid: Pid = "demo:1".parse().unwrap();
        let read = store.object_profile(&pid).await.unwrap().unwrap();
        assert_eq!(read.owner_id.as_deref(), Some("alice"));
        assert!(store.exists(&pid).await.unwrap());
    }

    #[tokio::test]
    async fn test_datastream_roundtrip() {
        let store = MemoryObjectStore::new();
        store.put_object(profile("demo:1")).await;
        let pid: Pid = "demo:1".parse().unwrap();

        store
            .put_datastream(&pid, datastream_info("POLICY"), Some(b"<Policy/>".to_vec()))
            .await
            .unwrap();

        let info = store.datastream(&pid, "POLICY").await.unwrap().unwrap();
        assert_eq!(info.mime_type.as_deref(), Some("text/xml"));

        let content = store.datastream_content(&pid, "POLICY").await.unwrap();
        assert_eq!(content.as_deref(), Some(b"<Policy/>".as_slice()));

        assert!(store.datastream(&pid, "DC").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_datastream_on_missing_object_errors() {
        let store = MemoryObjectStore::new();
        let pid: Pid = "demo:1".parse().unwrap();
        let err = store
            .put_datastream(&pid, datastream_info("DC"), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_object() {
        let store = MemoryObjectStore::new();
        store.put_object(profile("demo:1")).await;
        assert_eq!(store.object_count().await, 1);

        store.remove_object(&"demo:1".parse().unwrap()).await;
        assert_eq!(store.object_count().await, 0);
    }
}
