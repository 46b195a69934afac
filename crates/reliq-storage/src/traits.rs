//! The read-side object store trait.

use async_trait::async_trait;
use reliq_core::{DatastreamInfo, ObjectProfile, Pid};

use crate::error::StorageError;

/// Read-only accessors over stored objects and datastreams.
///
/// Implementations must be thread-safe (`Send + Sync`). A missing object or
/// datastream is reported as `Ok(None)`; errors are reserved for
/// infrastructure failures and malformed records.
///
/// # Example
///
/// ```ignore
/// use reliq_storage::{ObjectStore, StorageError};
/// use reliq_core::{ObjectProfile, Pid};
///
/// async fn object_state(store: &dyn ObjectStore, pid: &Pid) -> Result<ObjectProfile, StorageError> {
///     store
///         .object_profile(pid)
///         .await?
///         .ok_or_else(|| StorageError::object_not_found(pid.as_str()))
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads an object's profile.
    ///
    /// Returns `None` if the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing
    /// objects.
    async fn object_profile(&self, pid: &Pid) -> Result<Option<ObjectProfile>, StorageError>;

    /// Reads the metadata of one datastream of an object.
    ///
    /// Returns `None` if the object or the datastream does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn datastream(
        &self,
        pid: &Pid,
        datastream_id: &str,
    ) -> Result<Option<DatastreamInfo>, StorageError>;

    /// Reads the raw content of one datastream.
    ///
    /// Returns `None` if the object or the datastream does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn datastream_content(
        &self,
        pid: &Pid,
        datastream_id: &str,
    ) -> Result<Option<Vec<u8>>, StorageError>;

    /// Returns `true` if the object exists.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn exists(&self, pid: &Pid) -> Result<bool, StorageError> {
        Ok(self.object_profile(pid).await?.is_some())
    }
}
