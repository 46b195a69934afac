//! Authorization error types.
//!
//! This module defines the outcome taxonomy of the enforcement point and the
//! failure modes of policy loading. Returning normally from `enforce` means
//! "permitted"; every other outcome is one of these errors.

use reliq_storage::StorageError;

/// Errors that can occur during authorization.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Policy evaluation produced a non-permit outcome.
    #[error("Access denied: {reason}")]
    Denied {
        /// Description of why access was denied.
        reason: String,
    },

    /// The request was permitted, but carried the dry-run flag. The caller
    /// must not perform the side-effecting operation.
    #[error("Access permitted, but the request was flagged as a no-op")]
    PermittedButNoOp,

    /// A configuration or infrastructure failure prevented evaluation. This
    /// is a server error and is never downgraded to a deny or a permit.
    #[error("Authorization failure: {message}")]
    Operational {
        /// Description of the operational failure.
        message: String,
    },

    /// A policy document failed structural validation while loading or
    /// parsing.
    #[error("Policy validation failed: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

impl AuthzError {
    /// Creates a new `Denied` error.
    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    /// Creates a new `Operational` error.
    #[must_use]
    pub fn operational(message: impl Into<String>) -> Self {
        Self::Operational {
            message: message.into(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a policy denial.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// Returns `true` if the request was permitted but flagged as a dry run.
    #[must_use]
    pub fn is_permitted_no_op(&self) -> bool {
        matches!(self, Self::PermittedButNoOp)
    }

    /// Returns `true` if this is a server-side failure rather than a
    /// decision.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Operational { .. })
    }

    /// Returns `true` if a policy document failed validation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

impl From<StorageError> for AuthzError {
    fn from(err: StorageError) -> Self {
        Self::Operational {
            message: format!("object store failure: {err}"),
        }
    }
}
