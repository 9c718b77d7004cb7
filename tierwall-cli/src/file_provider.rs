//! File-based Provider (saves state to a JSON file per environment)
//!
//! Stands in for the cloud collaborator: data sources are answered locally
//! and created resources get deterministic `local-` identifiers.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tierwall_core::environment::EnvironmentName;
use tierwall_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use tierwall_core::resource::{Resource, ResourceId, State, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredResource {
    resource_type: String,
    name: String,
    identifier: String,
    attributes: BTreeMap<String, serde_json::Value>,
}

pub struct FileProvider {
    state_file: PathBuf,
}

impl FileProvider {
    pub fn new(state_dir: &Path, environment: EnvironmentName) -> Self {
        Self {
            state_file: state_dir.join(format!("{}.json", environment)),
        }
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    fn load_states(&self) -> ProviderResult<BTreeMap<String, StoredResource>> {
        match fs::read_to_string(&self.state_file) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ProviderError::new(format!(
                    "Failed to parse state file {}",
                    self.state_file.display()
                ))
                .with_cause(e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(ProviderError::new(format!(
                "Failed to read state file {}",
                self.state_file.display()
            ))
            .with_cause(e)),
        }
    }

    fn save_states(&self, states: &BTreeMap<String, StoredResource>) -> ProviderResult<()> {
        let write = || -> Result<(), std::io::Error> {
            if let Some(parent) = self.state_file.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(states)?;
            fs::write(&self.state_file, content)
        };
        write().map_err(|e| ProviderError::new("Failed to save state").with_cause(e))
    }

    /// Identifiers of every resource recorded in the state file
    pub fn identifiers(&self) -> ProviderResult<HashMap<ResourceId, String>> {
        Ok(self
            .load_states()?
            .into_values()
            .map(|r| (ResourceId::new(r.resource_type, r.name), r.identifier))
            .collect())
    }

    fn resource_key(id: &ResourceId) -> String {
        id.to_string()
    }

    fn local_identifier(id: &ResourceId) -> String {
        format!("local-{}-{}", id.resource_type.replace('_', "-"), id.name)
    }

    fn value_to_json(value: &Value) -> serde_json::Value {
        match value {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::value_to_json).collect())
            }
            Value::Map(map) => {
                let obj: serde_json::Map<_, _> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::value_to_json(v)))
                    .collect();
                serde_json::Value::Object(obj)
            }
            // ResourceRef should be resolved before reaching here, but handle it as a string
            Value::ResourceRef(binding, attr) => {
                serde_json::Value::String(format!("${{{}.{}}}", binding, attr))
            }
        }
    }
}

impl Provider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    fn read(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            // No real network to look up: data sources resolve to themselves
            let identifier = Self::local_identifier(&resource.id);
            let mut attributes = resource.attributes.clone();
            attributes.insert("id".to_string(), Value::String(identifier.clone()));
            if resource.id.resource_type == "subnet_selection" {
                attributes.insert(
                    "subnet_ids".to_string(),
                    Value::List(vec![Value::String(identifier.clone())]),
                );
            }
            Ok(State::existing(resource.id.clone(), attributes).with_identifier(identifier))
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            let mut states = self.load_states()?;
            let identifier = Self::local_identifier(&resource.id);

            let stored = StoredResource {
                resource_type: resource.id.resource_type.clone(),
                name: resource.id.name.clone(),
                identifier: identifier.clone(),
                attributes: resource
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::value_to_json(v)))
                    .collect(),
            };
            states.insert(Self::resource_key(&resource.id), stored);
            self.save_states(&states)
                .map_err(|e| e.for_resource(resource.id.clone()))?;

            Ok(State::existing(resource.id, resource.attributes).with_identifier(identifier))
        })
    }

    fn delete(&self, id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        Box::pin(async move {
            let mut states = self.load_states()?;
            if states.remove(&Self::resource_key(&id)).is_none() {
                log::debug!("{} not in state, nothing to delete", id);
                return Ok(());
            }
            self.save_states(&states)
                .map_err(|e| e.for_resource(id.clone()))?;
            Ok(())
        })
    }
}
