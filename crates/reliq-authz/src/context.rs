//! Per-request context handed to the enforcement point.
//!
//! The calling layer builds a [`RequestContext`] for every inbound request
//! and passes it to `enforce`. The context carries named, multi-valued
//! string attributes for each category, plus the dry-run flag and ambient
//! environment facts. During evaluation the context finder forwards
//! attribute queries to these tables.
//!
//! # Usage
//!
//! ```ignore
//! use reliq_authz::context::RequestContextBuilder;
//!
//! let context = RequestContextBuilder::new()
//!     .client_ip("192.168.1.10")
//!     .protocol("https")
//!     .subject_value("urn:example:role", "curator")
//!     .build();
//! ```

use indexmap::IndexMap;
use uuid::Uuid;

use crate::attr::{AttributeCategory, ids};

type ValueTable = IndexMap<String, Vec<String>>;

/// Caller-supplied context of one authorization request.
///
/// Created per inbound request, handed to `enforce`, and discarded after the
/// call returns. The engine registers it in the context registry for the
/// duration of one evaluation; it never outlives the `enforce` call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    subject: ValueTable,
    action: ValueTable,
    resource: ValueTable,
    environment: ValueTable,
    no_op: bool,
    request_id: String,
}

impl RequestContext {
    /// A context with no attributes.
    #[must_use]
    pub fn empty() -> Self {
        RequestContextBuilder::new().build()
    }

    fn table(&self, category: AttributeCategory) -> &ValueTable {
        match category {
            AttributeCategory::Subject => &self.subject,
            AttributeCategory::Action => &self.action,
            AttributeCategory::Resource => &self.resource,
            AttributeCategory::Environment => &self.environment,
        }
    }

    /// Number of values stored for a named attribute in a category.
    #[must_use]
    pub fn n_values(&self, category: AttributeCategory, name: &str) -> usize {
        self.table(category).get(name).map_or(0, Vec::len)
    }

    /// All values of a named attribute in a category, in insertion order.
    #[must_use]
    pub fn values(&self, category: AttributeCategory, name: &str) -> &[String] {
        self.table(category).get(name).map_or(&[], Vec::as_slice)
    }

    /// The first value of a named attribute, if any.
    #[must_use]
    pub fn value(&self, category: AttributeCategory, name: &str) -> Option<&str> {
        self.values(category, name).first().map(String::as_str)
    }

    /// Names of all attributes present in a category.
    pub fn names(&self, category: AttributeCategory) -> impl Iterator<Item = &str> {
        self.table(category).keys().map(String::as_str)
    }

    /// Whether the caller flagged this request as a dry run.
    #[must_use]
    pub fn no_op(&self) -> bool {
        self.no_op
    }

    /// Correlation id of the inbound request.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    context: RequestContext,
}

impl RequestContextBuilder {
    /// Start an empty builder with a fresh request id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            context: RequestContext {
                request_id: Uuid::new_v4().to_string(),
                ..RequestContext::default()
            },
        }
    }

    /// Use an externally assigned request id.
    #[must_use]
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.context.request_id = id.into();
        self
    }

    /// Append a value to a named attribute in a category.
    #[must_use]
    pub fn value(
        mut self,
        category: AttributeCategory,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let table = match category {
            AttributeCategory::Subject => &mut self.context.subject,
            AttributeCategory::Action => &mut self.context.action,
            AttributeCategory::Resource => &mut self.context.resource,
            AttributeCategory::Environment => &mut self.context.environment,
        };
        table.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Append a subject attribute value.
    #[must_use]
    pub fn subject_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.value(AttributeCategory::Subject, name, value)
    }

    /// Append an action attribute value.
    #[must_use]
    pub fn action_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.value(AttributeCategory::Action, name, value)
    }

    /// Append a resource attribute value.
    #[must_use]
    pub fn resource_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.value(AttributeCategory::Resource, name, value)
    }

    /// Append an environment attribute value.
    #[must_use]
    pub fn environment_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.value(AttributeCategory::Environment, name, value)
    }

    /// Record the caller's IP address.
    #[must_use]
    pub fn client_ip(self, ip: impl Into<String>) -> Self {
        self.environment_value(ids::environment::CLIENT_IP, ip)
    }

    /// Record the protocol the request arrived over.
    #[must_use]
    pub fn protocol(self, protocol: impl Into<String>) -> Self {
        self.environment_value(ids::environment::PROTOCOL, protocol)
    }

    /// Record whether a backend callback authenticated itself.
    #[must_use]
    pub fn callback_authenticated(self, authenticated: bool) -> Self {
        self.environment_value(
            ids::environment::CALLBACK_AUTHENTICATED,
            authenticated.to_string(),
        )
    }

    /// Record whether a backend callback arrived over TLS.
    #[must_use]
    pub fn callback_secure(self, secure: bool) -> Self {
        self.environment_value(ids::environment::CALLBACK_SECURE, secure.to_string())
    }

    /// Flag the request as a dry run.
    #[must_use]
    pub fn no_op(mut self, no_op: bool) -> Self {
        self.context.no_op = no_op;
        self
    }

    /// Finish the builder.
    #[must_use]
    pub fn build(self) -> RequestContext {
        self.context
    }
}
