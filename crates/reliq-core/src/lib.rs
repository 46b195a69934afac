//! # reliq-core
//!
//! Core types shared across the Reliq digital-object repository server.
//!
//! This crate provides:
//! - Persistent identifier ([`Pid`]) parsing and validation
//! - Object and datastream descriptors used by the storage layer
//! - Timestamp helpers for repository metadata
//!
//! ## Modules
//!
//! - [`pid`] - Persistent identifiers and namespace handling
//! - [`object`] - Object and datastream value types
//! - [`time`] - Repository timestamp wrapper and helpers

pub mod object;
pub mod pid;
pub mod time;

pub use object::{ControlGroup, DatastreamInfo, ObjectProfile, ObjectState};
pub use pid::{Pid, PidError};
pub use time::{RepoDateTime, now_utc};
