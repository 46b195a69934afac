//! Object and datastream value types.
//!
//! These are the read-only descriptors the storage layer exposes for a
//! digital object and its datastreams. The authorization engine consumes
//! them when resolving resource attributes; it never mutates them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pid::Pid;
use crate::time::RepoDateTime;

/// Lifecycle state of an object or datastream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectState {
    /// The object is active and visible.
    Active,
    /// The object is present but withdrawn from normal access.
    Inactive,
    /// The object is marked for deletion.
    Deleted,
}

impl ObjectState {
    /// The single-letter code used in stored object metadata.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Active => "A",
            Self::Inactive => "I",
            Self::Deleted => "D",
        }
    }
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ObjectState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" | "Active" => Ok(Self::Active),
            "I" | "Inactive" => Ok(Self::Inactive),
            "D" | "Deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown object state '{other}'")),
        }
    }
}

/// How a datastream's content is held by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlGroup {
    /// Content stored and managed by the repository.
    #[serde(rename = "M")]
    Managed,
    /// Content stored inline in the object record.
    #[serde(rename = "X")]
    Inline,
    /// Content held externally, fetched on access.
    #[serde(rename = "E")]
    External,
    /// Content held externally, access redirects to the source.
    #[serde(rename = "R")]
    Redirect,
}

impl ControlGroup {
    /// The single-letter code used in stored datastream metadata.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Managed => "M",
            Self::Inline => "X",
            Self::External => "E",
            Self::Redirect => "R",
        }
    }
}

impl fmt::Display for ControlGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Read-only profile of a repository object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectProfile {
    /// The object's persistent identifier.
    pub pid: Pid,

    /// Lifecycle state.
    pub state: ObjectState,

    /// Human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Raw owner field. May hold several owner ids joined by a
    /// deployment-configured separator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// PIDs of the content models this object conforms to.
    #[serde(default)]
    pub content_models: Vec<String>,

    /// Creation timestamp.
    pub created: RepoDateTime,

    /// Last modification timestamp.
    pub last_modified: RepoDateTime,
}

/// Read-only metadata of a single datastream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastreamInfo {
    /// Datastream identifier, unique within the owning object.
    pub id: String,

    /// Lifecycle state.
    pub state: ObjectState,

    /// How the content is held.
    pub control_group: ControlGroup,

    /// MIME type of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Format URI of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_uri: Option<String>,

    /// Content location (external URL or internal token).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Content checksum, if computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Algorithm of [`checksum`](Self::checksum), e.g. `SHA-256`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_type: Option<String>,

    /// Creation timestamp of this datastream version.
    pub created: RepoDateTime,
}
