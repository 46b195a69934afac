//! Persistent identifiers for repository objects.
//!
//! A PID has the form `namespace:identifier`, e.g. `demo:1`. The namespace
//! prefix is used for namespace-scoped policy targeting, the full PID
//! identifies a single digital object.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum accepted PID length, matching the repository's storage layout.
const MAX_PID_LENGTH: usize = 64;

/// Errors that can occur while parsing a persistent identifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PidError {
    /// The PID is empty.
    #[error("PID is empty")]
    Empty,

    /// The PID has no `namespace:identifier` separator.
    #[error("PID '{pid}' has no namespace separator")]
    MissingSeparator {
        /// The offending PID string.
        pid: String,
    },

    /// The namespace or identifier part is empty.
    #[error("PID '{pid}' has an empty namespace or identifier part")]
    EmptyPart {
        /// The offending PID string.
        pid: String,
    },

    /// The PID contains a character outside the accepted set.
    #[error("PID '{pid}' contains invalid character '{ch}'")]
    InvalidCharacter {
        /// The offending PID string.
        pid: String,
        /// The first invalid character encountered.
        ch: char,
    },

    /// The PID exceeds the maximum accepted length.
    #[error("PID exceeds maximum length of {MAX_PID_LENGTH} characters")]
    TooLong,
}

/// A validated persistent identifier of a repository object.
///
/// # Example
///
/// ```
/// use reliq_core::Pid;
///
/// let pid: Pid = "demo:1".parse().unwrap();
/// assert_eq!(pid.namespace(), "demo");
/// assert_eq!(pid.as_str(), "demo:1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pid {
    raw: String,
    separator: usize,
}

impl Pid {
    /// Parse and validate a PID string.
    ///
    /// # Errors
    ///
    /// Returns a [`PidError`] if the string is empty, missing the namespace
    /// separator, has empty parts, is too long, or contains characters
    /// outside `[A-Za-z0-9._~%-]` (plus the single `:` separator).
    pub fn parse(raw: impl Into<String>) -> Result<Self, PidError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(PidError::Empty);
        }
        if raw.len() > MAX_PID_LENGTH {
            return Err(PidError::TooLong);
        }
        let separator = raw
            .find(':')
            .ok_or_else(|| PidError::MissingSeparator { pid: raw.clone() })?;
        if separator == 0 || separator == raw.len() - 1 {
            return Err(PidError::EmptyPart { pid: raw.clone() });
        }
        for (i, ch) in raw.char_indices() {
            if i == separator {
                continue;
            }
            if !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '~' | '-' | '%')) {
                return Err(PidError::InvalidCharacter { pid: raw.clone(), ch });
            }
        }
        Ok(Self { raw, separator })
    }

    /// The namespace prefix, i.e. everything before the `:`.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.raw[..self.separator]
    }

    /// The object part, i.e. everything after the `:`.
    #[must_use]
    pub fn object_id(&self) -> &str {
        &self.raw[self.separator + 1..]
    }

    /// The full PID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Pid {
    type Err = PidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pid {
    type Error = PidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Pid> for String {
    fn from(pid: Pid) -> Self {
        pid.raw
    }
}
