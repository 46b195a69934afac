//! Object and datastream attribute finder.
//!
//! Resolves resource attributes by looking the target object up in the
//! object store, keyed by the PID found in the current resource attributes;
//! datastream attributes additionally use the datastream-id resource
//! attribute. Fails closed: store errors, missing objects or datastreams,
//! and invalid or empty identifiers all resolve to "no value", never to a
//! fabricated default.

use std::sync::Arc;

use async_trait::async_trait;
use reliq_core::Pid;
use reliq_storage::ObjectStore;

use crate::AuthzResult;
use crate::attr::{AttributeCategory, AttributeType, AttributeValue, ValueBag, ids};
use crate::eval::EvaluationContext;
use crate::finder::{AttributeDesignator, AttributeFinder};

const fn resource(id: &'static str, attr_type: AttributeType) -> AttributeDesignator {
    AttributeDesignator::new(id, attr_type, AttributeCategory::Resource)
}

const REGISTERED: &[AttributeDesignator] = &[
    resource(ids::resource::object::STATE, AttributeType::String),
    resource(ids::resource::object::OWNER, AttributeType::String),
    resource(ids::resource::object::CONTENT_MODEL, AttributeType::String),
    resource(ids::resource::object::CREATED, AttributeType::DateTime),
    resource(ids::resource::object::LAST_MODIFIED, AttributeType::DateTime),
    resource(ids::resource::datastream::STATE, AttributeType::String),
    resource(ids::resource::datastream::CONTROL_GROUP, AttributeType::String),
    resource(ids::resource::datastream::MIME_TYPE, AttributeType::String),
    resource(ids::resource::datastream::FORMAT_URI, AttributeType::AnyUri),
    resource(ids::resource::datastream::LOCATION, AttributeType::String),
    resource(ids::resource::datastream::CHECKSUM, AttributeType::String),
    resource(ids::resource::datastream::CHECKSUM_TYPE, AttributeType::String),
];

/// Finder for object- and datastream-level resource attributes.
pub struct ResourceFinder {
    store: Arc<dyn ObjectStore>,
    owner_separator: String,
}

impl ResourceFinder {
    /// Create a resource finder over a store.
    ///
    /// `owner_separator` splits the object's raw owner field into the
    /// multi-valued owner attribute.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, owner_separator: impl Into<String>) -> Self {
        Self {
            store,
            owner_separator: owner_separator.into(),
        }
    }

    /// The PID named by the current resource attributes, if valid.
    fn target_pid(ctx: &EvaluationContext) -> Option<Pid> {
        let raw = ctx
            .attributes()
            .get(AttributeCategory::Resource, ids::resource::PID)
            .and_then(|attr| attr.first_value())
            .map(AttributeValue::lexical)?;
        match Pid::parse(raw) {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::debug!(error = %e, "resource pid attribute is not a valid PID");
                None
            }
        }
    }

    /// The datastream id named by the current resource attributes. Resolved
    /// through the full callback surface, so it may also come from the
    /// caller's request context.
    async fn target_datastream_id(ctx: &EvaluationContext) -> Option<String> {
        let bag = ctx
            .resolve(
                AttributeCategory::Resource,
                ids::resource::datastream::ID,
                AttributeType::String,
            )
            .await;
        bag.first()
            .map(AttributeValue::lexical)
            .filter(|id| !id.is_empty())
    }

    fn split_owners(&self, raw: &str) -> Vec<AttributeValue> {
        raw.split(self.owner_separator.as_str())
            .map(str::trim)
            .filter(|owner| !owner.is_empty())
            .map(|owner| AttributeValue::String(owner.to_string()))
            .collect()
    }

    async fn object_attribute(&self, id: &str, pid: &Pid) -> AuthzResult<Option<ValueBag>> {
        let Some(profile) = self.store.object_profile(pid).await? else {
            tracing::debug!(pid = %pid, "object not found while resolving resource attribute");
            return Ok(None);
        };

        let bag = match id {
            ids::resource::object::STATE => Some(ValueBag::single(AttributeValue::String(
                profile.state.code().to_string(),
            ))),
            ids::resource::object::OWNER => profile.owner_id.as_deref().and_then(|raw| {
                let owners = self.split_owners(raw);
                if owners.is_empty() {
                    None
                } else {
                    Some(ValueBag::new(AttributeType::String, owners))
                }
            }),
            ids::resource::object::CONTENT_MODEL => {
                if profile.content_models.is_empty() {
                    None
                } else {
                    Some(ValueBag::new(
                        AttributeType::String,
                        profile
                            .content_models
                            .iter()
                            .map(|m| AttributeValue::String(m.clone()))
                            .collect(),
                    ))
                }
            }
            ids::resource::object::CREATED => Some(ValueBag::single(AttributeValue::DateTime(
                profile.created.inner(),
            ))),
            ids::resource::object::LAST_MODIFIED => Some(ValueBag::single(
                AttributeValue::DateTime(profile.last_modified.inner()),
            )),
            _ => None,
        };
        Ok(bag)
    }

    async fn datastream_attribute(
        &self,
        id: &str,
        pid: &Pid,
        datastream_id: &str,
    ) -> AuthzResult<Option<ValueBag>> {
        let Some(info) = self.store.datastream(pid, datastream_id).await? else {
            tracing::debug!(
                pid = %pid,
                datastream_id,
                "datastream not found while resolving resource attribute"
            );
            return Ok(None);
        };

        let string_bag =
            |value: &Option<String>| value.clone().map(|v| ValueBag::single(AttributeValue::String(v)));

        let bag = match id {
            ids::resource::datastream::STATE => Some(ValueBag::single(AttributeValue::String(
                info.state.code().to_string(),
            ))),
            ids::resource::datastream::CONTROL_GROUP => Some(ValueBag::single(
                AttributeValue::String(info.control_group.code().to_string()),
            )),
            ids::resource::datastream::MIME_TYPE => string_bag(&info.mime_type),
            ids::resource::datastream::FORMAT_URI => info
                .format_uri
                .clone()
                .map(|uri| ValueBag::single(AttributeValue::AnyUri(uri))),
            ids::resource::datastream::LOCATION => string_bag(&info.location),
            ids::resource::datastream::CHECKSUM => string_bag(&info.checksum),
            ids::resource::datastream::CHECKSUM_TYPE => string_bag(&info.checksum_type),
            _ => None,
        };
        Ok(bag)
    }
}

#[async_trait]
impl AttributeFinder for ResourceFinder {
    fn name(&self) -> &'static str {
        "resource"
    }

    fn supports(&self, category: AttributeCategory) -> bool {
        category == AttributeCategory::Resource
    }

    fn registered(&self) -> &[AttributeDesignator] {
        REGISTERED
    }

    async fn resolve_values(
        &self,
        _attr_type: AttributeType,
        id: &str,
        _category: AttributeCategory,
        ctx: &EvaluationContext,
    ) -> AuthzResult<Option<ValueBag>> {
        let Some(pid) = Self::target_pid(ctx) else {
            return Ok(None);
        };

        if id.starts_with("urn:reliq:names:authz:1.0:resource:datastream:") {
            let Some(datastream_id) = Self::target_datastream_id(ctx).await else {
                return Ok(None);
            };
            self.datastream_attribute(id, &pid, &datastream_id).await
        } else {
            self.object_attribute(id, &pid).await
        }
    }
}
