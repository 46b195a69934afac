//! Storage error types for the object store abstraction.

/// Errors that can occur during object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested object was not found.
    #[error("Object not found: {pid}")]
    ObjectNotFound {
        /// PID of the missing object.
        pid: String,
    },

    /// The requested datastream was not found on an existing object.
    #[error("Datastream not found: {pid}/{datastream_id}")]
    DatastreamNotFound {
        /// PID of the owning object.
        pid: String,
        /// Identifier of the missing datastream.
        datastream_id: String,
    },

    /// The stored object record is malformed.
    #[error("Invalid object record: {message}")]
    InvalidRecord {
        /// Description of the malformation.
        message: String,
    },

    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `ObjectNotFound` error.
    #[must_use]
    pub fn object_not_found(pid: impl Into<String>) -> Self {
        Self::ObjectNotFound { pid: pid.into() }
    }

    /// Creates a new `DatastreamNotFound` error.
    #[must_use]
    pub fn datastream_not_found(pid: impl Into<String>, datastream_id: impl Into<String>) -> Self {
        Self::DatastreamNotFound {
            pid: pid.into(),
            datastream_id: datastream_id.into(),
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error means "the thing does not exist" rather
    /// than an infrastructure failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound { .. } | Self::DatastreamNotFound { .. }
        )
    }
}
