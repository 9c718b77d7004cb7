//! Resource - Descriptors handed to the provisioning collaborator

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId {
    /// Resource type (e.g., "security_group", "load_balancer")
    pub resource_type: String,
    /// Physical resource name
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Reference to another resource's attribute (binding_name, attribute_name)
    ResourceRef(String, String),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn reference(binding: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::ResourceRef(binding.into(), attribute.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Collect the binding names this value refers to
    fn collect_references(&self, deps: &mut BTreeSet<String>) {
        match self {
            Value::ResourceRef(binding, _) => {
                deps.insert(binding.clone());
            }
            Value::List(items) => {
                for item in items {
                    item.collect_references(deps);
                }
            }
            Value::Map(map) => {
                for v in map.values() {
                    v.collect_references(deps);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                let strs: Vec<_> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", strs.join(", "))
            }
            Value::Map(map) => {
                let strs: Vec<_> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", strs.join(", "))
            }
            Value::ResourceRef(binding, attr) => write!(f, "{}.{}", binding, attr),
        }
    }
}

// References serialize as `{"$ref": "binding.attribute"}` so the collaborator
// can tell them apart from literal strings.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
            Value::ResourceRef(binding, attr) => {
                let mut m = serializer.serialize_map(Some(1))?;
                m.serialize_entry("$ref", &format!("{}.{}", binding, attr))?;
                m.end()
            }
        }
    }
}

/// Desired state of a single resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    /// Name other resources use to reference this one
    pub binding: String,
    pub attributes: BTreeMap<String, Value>,
    /// Explicit ordering edges that are not visible through attribute references
    pub depends_on: Vec<String>,
    /// If true, this is a data source (read-only) that won't be modified
    pub read_only: bool,
}

impl Resource {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        binding: impl Into<String>,
    ) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            binding: binding.into(),
            attributes: BTreeMap::new(),
            depends_on: Vec::new(),
            read_only: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_dependency(mut self, binding: impl Into<String>) -> Self {
        self.depends_on.push(binding.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }

    /// Binding names this resource depends on, through references or explicit edges
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        for value in self.attributes.values() {
            value.collect_references(&mut deps);
        }
        deps.extend(self.depends_on.iter().cloned());
        deps
    }
}

/// Current state reported back by the provisioning collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Identifier assigned by the collaborator (e.g., sg-xxx)
    pub identifier: Option<String>,
    pub attributes: BTreeMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

const IDENTITY_ATTRIBUTES: [&str; 4] = ["id", "arn", "group_id", "name"];

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: BTreeMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: BTreeMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Look up an attribute
    ///
    /// Identity attributes (`id`, `arn`, `group_id`, `name`) fall back to the
    /// assigned identifier; anything else must have been reported.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.attributes.get(name) {
            return Some(value.clone());
        }
        if !IDENTITY_ATTRIBUTES.iter().any(|attr| *attr == name) {
            return None;
        }
        self.identifier
            .as_ref()
            .map(|identifier| Value::String(identifier.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_include_nested_refs_and_explicit_edges() {
        let mut tags = BTreeMap::new();
        tags.insert("owner".to_string(), Value::reference("role", "arn"));
        let resource = Resource::new("launch_template", "lt", "launch_template")
            .with_attribute("vpc_id", Value::reference("vpc", "id"))
            .with_attribute(
                "security_group_ids",
                Value::List(vec![Value::reference("compute_sg", "group_id")]),
            )
            .with_attribute("tags", Value::Map(tags))
            .with_dependency("edge_sg");

        let deps: Vec<_> = resource.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["compute_sg", "edge_sg", "role", "vpc"]);
    }

    #[test]
    fn reference_serializes_as_ref_object() {
        let json = serde_json::to_string(&Value::reference("edge_sg", "group_id")).unwrap();
        assert_eq!(json, r#"{"$ref":"edge_sg.group_id"}"#);
    }

    #[test]
    fn state_attribute_falls_back_to_identifier() {
        let state = State::existing(ResourceId::new("security_group", "edge"), BTreeMap::new())
            .with_identifier("sg-123");
        assert_eq!(state.attribute("group_id"), Some(Value::string("sg-123")));
        assert_eq!(state.attribute("arn"), Some(Value::string("sg-123")));
    }

    #[test]
    fn misspelled_attribute_does_not_fall_back() {
        let state = State::existing(ResourceId::new("security_group", "edge"), BTreeMap::new())
            .with_identifier("sg-123");
        assert_eq!(state.attribute("group_idd"), None);
        assert_eq!(state.attribute("subnet_ids"), None);
    }
}
