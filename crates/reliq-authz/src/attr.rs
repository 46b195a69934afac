//! Attribute model for authorization requests.
//!
//! An authorization request carries four categories of attributes (subject,
//! action, resource, environment). Each attribute is identified by a URI,
//! typed by a datatype URI, and holds an ordered, never-null list of values;
//! "no value" is represented by an absent or empty bag.
//!
//! The well-known attribute ids the engine itself produces and consumes live
//! in the [`ids`] module.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use reliq_core::RepoDateTime;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

// =============================================================================
// Category
// =============================================================================

/// The four attribute buckets of an access-control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeCategory {
    /// Who is asking.
    Subject,
    /// What they are doing.
    Action,
    /// What they are doing it to.
    Resource,
    /// Ambient facts about the request.
    Environment,
}

impl AttributeCategory {
    /// All categories, in canonical order.
    pub const ALL: [Self; 4] = [Self::Subject, Self::Action, Self::Resource, Self::Environment];

    /// Lowercase token used in policy documents.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Action => "action",
            Self::Resource => "resource",
            Self::Environment => "environment",
        }
    }
}

impl fmt::Display for AttributeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subject" => Ok(Self::Subject),
            "action" => Ok(Self::Action),
            "resource" => Ok(Self::Resource),
            "environment" => Ok(Self::Environment),
            other => Err(format!("unknown attribute category '{other}'")),
        }
    }
}

// =============================================================================
// Datatypes
// =============================================================================

/// Datatype of an attribute, identified in documents by its XML Schema URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeType {
    /// `xsd:string`
    String,
    /// `xsd:anyURI`
    AnyUri,
    /// `xsd:boolean`
    Boolean,
    /// `xsd:integer`
    Integer,
    /// `xsd:date`
    Date,
    /// `xsd:time`
    Time,
    /// `xsd:dateTime`
    DateTime,
}

impl AttributeType {
    /// The datatype URI used in policy documents.
    #[must_use]
    pub fn uri(&self) -> &'static str {
        match self {
            Self::String => "http://www.w3.org/2001/XMLSchema#string",
            Self::AnyUri => "http://www.w3.org/2001/XMLSchema#anyURI",
            Self::Boolean => "http://www.w3.org/2001/XMLSchema#boolean",
            Self::Integer => "http://www.w3.org/2001/XMLSchema#integer",
            Self::Date => "http://www.w3.org/2001/XMLSchema#date",
            Self::Time => "http://www.w3.org/2001/XMLSchema#time",
            Self::DateTime => "http://www.w3.org/2001/XMLSchema#dateTime",
        }
    }

    /// Look a datatype up by its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2001/XMLSchema#string" => Some(Self::String),
            "http://www.w3.org/2001/XMLSchema#anyURI" => Some(Self::AnyUri),
            "http://www.w3.org/2001/XMLSchema#boolean" => Some(Self::Boolean),
            "http://www.w3.org/2001/XMLSchema#integer" => Some(Self::Integer),
            "http://www.w3.org/2001/XMLSchema#date" => Some(Self::Date),
            "http://www.w3.org/2001/XMLSchema#time" => Some(Self::Time),
            "http://www.w3.org/2001/XMLSchema#dateTime" => Some(Self::DateTime),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Failure to parse a lexical value into a typed attribute value.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("cannot parse '{value}' as {attr_type}")]
pub struct ValueParseError {
    /// The lexical input.
    pub value: String,
    /// The requested datatype.
    pub attr_type: AttributeType,
}

// =============================================================================
// Values
// =============================================================================

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeValue {
    /// An `xsd:string` value.
    String(String),
    /// An `xsd:anyURI` value, kept in lexical form.
    AnyUri(String),
    /// An `xsd:boolean` value.
    Boolean(bool),
    /// An `xsd:integer` value.
    Integer(i64),
    /// An `xsd:date` value.
    Date(time::Date),
    /// An `xsd:time` value.
    Time(time::Time),
    /// An `xsd:dateTime` value.
    DateTime(OffsetDateTime),
}

impl AttributeValue {
    /// The datatype of this value.
    #[must_use]
    pub fn attr_type(&self) -> AttributeType {
        match self {
            Self::String(_) => AttributeType::String,
            Self::AnyUri(_) => AttributeType::AnyUri,
            Self::Boolean(_) => AttributeType::Boolean,
            Self::Integer(_) => AttributeType::Integer,
            Self::Date(_) => AttributeType::Date,
            Self::Time(_) => AttributeType::Time,
            Self::DateTime(_) => AttributeType::DateTime,
        }
    }

    /// Parse a lexical form into a value of the requested datatype.
    ///
    /// # Errors
    ///
    /// Returns a [`ValueParseError`] when the lexical form is not valid for
    /// the datatype.
    pub fn parse(attr_type: AttributeType, value: &str) -> Result<Self, ValueParseError> {
        let err = || ValueParseError {
            value: value.to_string(),
            attr_type,
        };
        match attr_type {
            AttributeType::String => Ok(Self::String(value.to_string())),
            AttributeType::AnyUri => Ok(Self::AnyUri(value.to_string())),
            AttributeType::Boolean => match value {
                "true" | "1" => Ok(Self::Boolean(true)),
                "false" | "0" => Ok(Self::Boolean(false)),
                _ => Err(err()),
            },
            AttributeType::Integer => value.parse().map(Self::Integer).map_err(|_| err()),
            AttributeType::Date => {
                time::Date::parse(value, format_description!("[year]-[month]-[day]"))
                    .map(Self::Date)
                    .map_err(|_| err())
            }
            AttributeType::Time => {
                time::Time::parse(value, format_description!("[hour]:[minute]:[second]"))
                    .map(Self::Time)
                    .map_err(|_| err())
            }
            AttributeType::DateTime => OffsetDateTime::parse(value, &Rfc3339)
                .map(Self::DateTime)
                .map_err(|_| err()),
        }
    }

    /// The lexical form of this value, matching [`parse`](Self::parse).
    #[must_use]
    pub fn lexical(&self) -> String {
        match self {
            Self::String(s) | Self::AnyUri(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Date(d) => d
                .format(format_description!("[year]-[month]-[day]"))
                .unwrap_or_default(),
            Self::Time(t) => t
                .format(format_description!("[hour]:[minute]:[second]"))
                .unwrap_or_default(),
            Self::DateTime(dt) => dt.format(&Rfc3339).unwrap_or_default(),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lexical())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

// =============================================================================
// Value bag
// =============================================================================

/// A possibly-empty, homogeneous bag of attribute values.
///
/// This is what attribute resolution returns. An empty bag means "no value";
/// a bag never contains null entries.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBag {
    attr_type: AttributeType,
    values: Vec<AttributeValue>,
}

impl ValueBag {
    /// An empty bag of the given datatype.
    #[must_use]
    pub fn empty(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            values: Vec::new(),
        }
    }

    /// A bag holding exactly one value.
    #[must_use]
    pub fn single(value: AttributeValue) -> Self {
        Self {
            attr_type: value.attr_type(),
            values: vec![value],
        }
    }

    /// A bag holding the given values. Values whose datatype does not match
    /// `attr_type` are dropped.
    #[must_use]
    pub fn new(attr_type: AttributeType, values: Vec<AttributeValue>) -> Self {
        Self {
            attr_type,
            values: values
                .into_iter()
                .filter(|v| v.attr_type() == attr_type)
                .collect(),
        }
    }

    /// The datatype of the bag.
    #[must_use]
    pub fn attr_type(&self) -> AttributeType {
        self.attr_type
    }

    /// Returns `true` when the bag holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of values in the bag.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// The values, in order.
    #[must_use]
    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    /// The first value, if any.
    #[must_use]
    pub fn first(&self) -> Option<&AttributeValue> {
        self.values.first()
    }
}

// =============================================================================
// Attribute
// =============================================================================

/// A named, typed, possibly multi-valued attribute.
///
/// Single-valued and multi-valued attributes are built through different
/// constructors but satisfy the same read contract (`values()`,
/// `first_value()`). The value list is never null; an attribute with no
/// values is represented by an empty list.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    id: String,
    attr_type: AttributeType,
    issuer: Option<String>,
    issue_instant: Option<RepoDateTime>,
    values: Vec<AttributeValue>,
}

impl Attribute {
    /// A single-valued attribute.
    #[must_use]
    pub fn single(id: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            id: id.into(),
            attr_type: value.attr_type(),
            issuer: None,
            issue_instant: None,
            values: vec![value],
        }
    }

    /// A multi-valued attribute. Values of a foreign datatype are dropped.
    #[must_use]
    pub fn multi(
        id: impl Into<String>,
        attr_type: AttributeType,
        values: Vec<AttributeValue>,
    ) -> Self {
        let bag = ValueBag::new(attr_type, values);
        Self {
            id: id.into(),
            attr_type,
            issuer: None,
            issue_instant: None,
            values: bag.values,
        }
    }

    /// Attach an issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Attach an issue instant.
    #[must_use]
    pub fn with_issue_instant(mut self, instant: RepoDateTime) -> Self {
        self.issue_instant = Some(instant);
        self
    }

    /// The attribute id URI.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The attribute datatype.
    #[must_use]
    pub fn attr_type(&self) -> AttributeType {
        self.attr_type
    }

    /// The issuer, if any.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// The issue instant, if any.
    #[must_use]
    pub fn issue_instant(&self) -> Option<RepoDateTime> {
        self.issue_instant
    }

    /// All values, in order. Never null; possibly empty.
    #[must_use]
    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    /// The first value, if any.
    #[must_use]
    pub fn first_value(&self) -> Option<&AttributeValue> {
        self.values.first()
    }

    /// Returns `true` when the attribute holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The values as a [`ValueBag`].
    #[must_use]
    pub fn bag(&self) -> ValueBag {
        ValueBag {
            attr_type: self.attr_type,
            values: self.values.clone(),
        }
    }
}

// =============================================================================
// Attribute maps
// =============================================================================

/// Ordered id → attribute table for one category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    inner: IndexMap<String, Attribute>,
}

impl AttributeMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an attribute, replacing any previous attribute with the same id.
    pub fn insert(&mut self, attribute: Attribute) {
        self.inner.insert(attribute.id().to_string(), attribute);
    }

    /// Look an attribute up by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Attribute> {
        self.inner.get(id)
    }

    /// The first value of the named attribute, rendered lexically.
    #[must_use]
    pub fn first_lexical(&self, id: &str) -> Option<String> {
        self.get(id).and_then(|a| a.first_value()).map(AttributeValue::lexical)
    }

    /// Number of attributes in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` when the map holds no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over the attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.inner.values()
    }
}

/// The full per-category attribute tables of one authorization request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestAttributes {
    /// Subject attributes.
    pub subject: AttributeMap,
    /// Action attributes.
    pub action: AttributeMap,
    /// Resource attributes.
    pub resource: AttributeMap,
    /// Environment attributes.
    pub environment: AttributeMap,
}

impl RequestAttributes {
    /// The map for one category.
    #[must_use]
    pub fn category(&self, category: AttributeCategory) -> &AttributeMap {
        match category {
            AttributeCategory::Subject => &self.subject,
            AttributeCategory::Action => &self.action,
            AttributeCategory::Resource => &self.resource,
            AttributeCategory::Environment => &self.environment,
        }
    }

    /// Look an attribute up by category and id.
    #[must_use]
    pub fn get(&self, category: AttributeCategory, id: &str) -> Option<&Attribute> {
        self.category(category).get(id)
    }
}

// =============================================================================
// Well-known attribute ids
// =============================================================================

/// Well-known attribute ids produced and consumed by the engine.
pub mod ids {
    /// Subject attribute ids.
    pub mod subject {
        /// Login id of the caller; absent for anonymous subjects.
        pub const LOGIN_ID: &str = "urn:reliq:names:authz:1.0:subject:login-id";
    }

    /// Action attribute ids.
    pub mod action {
        /// The operation being performed.
        pub const ID: &str = "urn:reliq:names:authz:1.0:action:id";
        /// The API surface the operation belongs to.
        pub const API: &str = "urn:reliq:names:authz:1.0:action:api";
        /// Correlation token under which the request context is registered.
        pub const CONTEXT_TOKEN: &str = "urn:reliq:names:authz:1.0:action:context-token";
    }

    /// Resource attribute ids.
    pub mod resource {
        /// PID of the target object.
        pub const PID: &str = "urn:reliq:names:authz:1.0:resource:pid";
        /// Namespace prefix of the target PID.
        pub const NAMESPACE: &str = "urn:reliq:names:authz:1.0:resource:namespace";

        /// Object-level resource attribute ids.
        pub mod object {
            /// Lifecycle state code of the object.
            pub const STATE: &str = "urn:reliq:names:authz:1.0:resource:object:state";
            /// Owner ids of the object.
            pub const OWNER: &str = "urn:reliq:names:authz:1.0:resource:object:owner";
            /// Content models the object conforms to.
            pub const CONTENT_MODEL: &str =
                "urn:reliq:names:authz:1.0:resource:object:content-model";
            /// Creation timestamp of the object.
            pub const CREATED: &str = "urn:reliq:names:authz:1.0:resource:object:created";
            /// Last-modification timestamp of the object.
            pub const LAST_MODIFIED: &str =
                "urn:reliq:names:authz:1.0:resource:object:last-modified";
        }

        /// Datastream-level resource attribute ids.
        pub mod datastream {
            /// Identifier of the target datastream.
            pub const ID: &str = "urn:reliq:names:authz:1.0:resource:datastream:id";
            /// Lifecycle state code of the datastream.
            pub const STATE: &str = "urn:reliq:names:authz:1.0:resource:datastream:state";
            /// Control group code of the datastream.
            pub const CONTROL_GROUP: &str =
                "urn:reliq:names:authz:1.0:resource:datastream:control-group";
            /// MIME type of the datastream content.
            pub const MIME_TYPE: &str = "urn:reliq:names:authz:1.0:resource:datastream:mime-type";
            /// Format URI of the datastream content.
            pub const FORMAT_URI: &str = "urn:reliq:names:authz:1.0:resource:datastream:format-uri";
            /// Location of the datastream content.
            pub const LOCATION: &str = "urn:reliq:names:authz:1.0:resource:datastream:location";
            /// Checksum of the datastream content.
            pub const CHECKSUM: &str = "urn:reliq:names:authz:1.0:resource:datastream:checksum";
            /// Checksum algorithm of the datastream content.
            pub const CHECKSUM_TYPE: &str =
                "urn:reliq:names:authz:1.0:resource:datastream:checksum-type";
        }
    }

    /// Environment attribute ids.
    pub mod environment {
        /// Request timestamp, full dateTime.
        pub const CURRENT_DATE_TIME: &str =
            "urn:reliq:names:authz:1.0:environment:current-date-time";
        /// Request date.
        pub const CURRENT_DATE: &str = "urn:reliq:names:authz:1.0:environment:current-date";
        /// Request time of day.
        pub const CURRENT_TIME: &str = "urn:reliq:names:authz:1.0:environment:current-time";
        /// IP address the request arrived from.
        pub const CLIENT_IP: &str = "urn:reliq:names:authz:1.0:environment:client-ip";
        /// Protocol the request arrived over.
        pub const PROTOCOL: &str = "urn:reliq:names:authz:1.0:environment:protocol";
        /// Whether a backend callback authenticated itself.
        pub const CALLBACK_AUTHENTICATED: &str =
            "urn:reliq:names:authz:1.0:environment:callback-authenticated";
        /// Whether a backend callback arrived over TLS.
        pub const CALLBACK_SECURE: &str = "urn:reliq:names:authz:1.0:environment:callback-secure";
    }
}
