//! Effect - A single intended change to infrastructure, as a value

use serde::{Serialize, Serializer};

use crate::resource::{Resource, ResourceId};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Look up an existing resource (data source)
    Read(Resource),
    /// Create a resource
    Create(Resource),
    /// Delete a resource on teardown
    Delete(ResourceId),
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read(r) | Effect::Create(r) => &r.id,
            Effect::Delete(id) => id,
        }
    }

    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Effect::Read(r) | Effect::Create(r) => Some(r),
            Effect::Delete(_) => None,
        }
    }

    /// Whether this effect changes infrastructure
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read(_))
    }

    pub fn action(&self) -> &'static str {
        match self {
            Effect::Read(_) => "read",
            Effect::Create(_) => "create",
            Effect::Delete(_) => "delete",
        }
    }
}

#[derive(Serialize)]
struct EffectRecord<'a> {
    action: &'static str,
    resource_type: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    binding: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes: Option<&'a std::collections::BTreeMap<String, crate::resource::Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
}

impl Serialize for Effect {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let id = self.resource_id();
        let resource = self.resource();
        EffectRecord {
            action: self.action(),
            resource_type: &id.resource_type,
            name: &id.name,
            binding: resource.map(|r| r.binding.as_str()),
            attributes: resource.map(|r| &r.attributes),
            depends_on: resource
                .map(|r| r.dependencies().into_iter().collect())
                .unwrap_or_default(),
        }
        .serialize(serializer)
    }
}
