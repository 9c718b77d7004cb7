//! Config - JSON overrides layered over the built-in environment descriptors
//!
//! ```json
//! {
//!   "naming_prefix": "shop",
//!   "environments": {
//!     "prod": {
//!       "network_cidr": "10.40.0.0/16",
//!       "max_capacity": 8,
//!       "policy": { "model": "tiered" },
//!       "extra_rules": [
//!         { "group": "compute", "direction": "inbound", "peer": "group:compute", "port": "all" }
//!       ]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ipnet::Ipv4Net;
use serde::Deserialize;

use crate::environment::{AmiHardware, DEFAULT_NAMING_PREFIX, Environment, EnvironmentName};
use crate::policy::{
    ComputeIngressSource, EdgeEgressScope, InboundPort, PolicyModel, PolicyOptions,
};
use crate::rule::SymbolicRule;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "tierwall.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown environment: {0} (expected one of: dev, qa, prod)")]
    UnknownEnvironment(String),

    #[error("Invalid configuration for {environment}: {message}")]
    Invalid { environment: String, message: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Prefix applied to every environment that does not set its own
    #[serde(default)]
    pub naming_prefix: Option<String>,
    #[serde(default)]
    pub environments: BTreeMap<EnvironmentName, EnvironmentOverride>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentOverride {
    pub network_id: Option<String>,
    pub network_cidr: Option<Ipv4Net>,
    pub public_subnet_selector: Option<String>,
    pub naming_prefix: Option<String>,
    pub listener_port: Option<u16>,
    pub region: Option<String>,
    pub account: Option<String>,
    pub min_capacity: Option<u32>,
    pub max_capacity: Option<u32>,
    pub instance_type: Option<String>,
    pub ami_hardware: Option<AmiHardware>,
    pub policy: Option<PolicyOverride>,
    #[serde(default)]
    pub extra_rules: Vec<SymbolicRule>,
}

/// A preset plus per-knob overrides; knobs win over the preset
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyOverride {
    pub model: Option<PolicyModel>,
    pub inbound_port: Option<InboundPort>,
    pub edge_egress_scope: Option<EdgeEgressScope>,
    pub compute_ingress_source: Option<ComputeIngressSource>,
    pub allow_legacy_open: Option<bool>,
}

impl PolicyOverride {
    pub fn apply(&self, base: PolicyOptions) -> PolicyOptions {
        let mut options = match self.model {
            Some(model) => PolicyOptions::from_model(model).with_legacy_open(base.allow_legacy_open),
            None => base,
        };
        if let Some(v) = self.inbound_port {
            options.inbound_port = v;
        }
        if let Some(v) = self.edge_egress_scope {
            options.edge_egress_scope = v;
        }
        if let Some(v) = self.compute_ingress_source {
            options.compute_ingress_source = v;
        }
        if let Some(v) = self.allow_legacy_open {
            options.allow_legacy_open = v;
        }
        options
    }
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the default file if present, else nothing
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Built-in descriptor for `name` with this file's overrides applied
    pub fn environment(&self, name: EnvironmentName) -> Result<Environment, ConfigError> {
        let overrides = self.environments.get(&name).cloned().unwrap_or_default();
        let prefix = overrides
            .naming_prefix
            .as_deref()
            .or(self.naming_prefix.as_deref())
            .unwrap_or(DEFAULT_NAMING_PREFIX);

        let mut env = Environment::with_prefix(name, prefix);
        if let Some(v) = overrides.network_id {
            env.network_id = v;
        }
        if let Some(v) = overrides.network_cidr {
            env.network_cidr = v;
        }
        if let Some(v) = overrides.public_subnet_selector {
            env.public_subnet_selector = v;
        }
        if let Some(v) = overrides.listener_port {
            env.listener_port = v;
        }
        if let Some(v) = overrides.region {
            env.region = v;
        }
        if let Some(v) = overrides.account {
            env.account = v;
        }
        if let Some(v) = overrides.min_capacity {
            env.fleet.min_capacity = v;
        }
        if let Some(v) = overrides.max_capacity {
            env.fleet.max_capacity = v;
        }
        if let Some(v) = overrides.instance_type {
            env.fleet.instance_type = v;
        }
        if let Some(v) = overrides.ami_hardware {
            env.fleet.ami_hardware = v;
        }
        if let Some(policy) = overrides.policy {
            env.policy = policy.apply(env.policy);
        }
        env.extra_rules = overrides.extra_rules;

        env.check()?;
        Ok(env)
    }
}
