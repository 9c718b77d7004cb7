//! Policy options - How reachability is granted between tiers
//!
//! The two admission models observed across environments are presets over the
//! same three knobs. `Tiered` is the default; `Open` is kept for legacy stacks
//! and only passes validation with `allow_legacy_open` set.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which ports the edge group accepts from the internet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InboundPort {
    /// Only the published listener port
    #[default]
    SinglePort,
    AllPorts,
}

/// Where the edge group may send traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeEgressScope {
    Any,
    /// Only the fleet's own network range
    #[default]
    FleetCidr,
}

/// Who may reach the compute group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComputeIngressSource {
    Any,
    /// Only members of the edge group, referenced by identity
    #[default]
    EdgeGroupIdentity,
}

/// Named presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyModel {
    #[default]
    Tiered,
    /// Deprecated: all ports from anywhere on both tiers
    Open,
}

impl PolicyModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyModel::Tiered => "tiered",
            PolicyModel::Open => "open",
        }
    }
}

impl fmt::Display for PolicyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tiered" => Ok(PolicyModel::Tiered),
            "open" => Ok(PolicyModel::Open),
            other => Err(format!(
                "Unknown policy model '{}', expected one of: tiered, open",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PolicyOptions {
    pub inbound_port: InboundPort,
    pub edge_egress_scope: EdgeEgressScope,
    pub compute_ingress_source: ComputeIngressSource,
    /// Explicit opt-in required for all-ports ingress from anywhere
    #[serde(default)]
    pub allow_legacy_open: bool,
}

impl PolicyOptions {
    pub fn tiered() -> Self {
        Self::default()
    }

    pub fn open() -> Self {
        Self {
            inbound_port: InboundPort::AllPorts,
            edge_egress_scope: EdgeEgressScope::Any,
            compute_ingress_source: ComputeIngressSource::Any,
            allow_legacy_open: false,
        }
    }

    pub fn from_model(model: PolicyModel) -> Self {
        match model {
            PolicyModel::Tiered => Self::tiered(),
            PolicyModel::Open => Self::open(),
        }
    }

    pub fn with_legacy_open(mut self, allow: bool) -> Self {
        self.allow_legacy_open = allow;
        self
    }

    /// The preset these options match, ignoring the opt-in flag
    pub fn model(&self) -> Option<PolicyModel> {
        let knobs = self.with_legacy_open(false);
        if knobs == Self::tiered() {
            Some(PolicyModel::Tiered)
        } else if knobs == Self::open() {
            Some(PolicyModel::Open)
        } else {
            None
        }
    }
}

impl fmt::Display for PolicyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.model() {
            Some(model) => write!(f, "{}", model),
            None => write!(
                f,
                "custom (inbound_port={:?}, edge_egress_scope={:?}, compute_ingress_source={:?})",
                self.inbound_port, self.edge_egress_scope, self.compute_ingress_source
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_tiered() {
        assert_eq!(PolicyOptions::default().model(), Some(PolicyModel::Tiered));
    }

    #[test]
    fn opt_in_does_not_change_model() {
        let options = PolicyOptions::open().with_legacy_open(true);
        assert_eq!(options.model(), Some(PolicyModel::Open));
    }

    #[test]
    fn mixed_knobs_are_custom() {
        let options = PolicyOptions {
            edge_egress_scope: EdgeEgressScope::Any,
            ..PolicyOptions::tiered()
        };
        assert_eq!(options.model(), None);
        assert!(options.to_string().starts_with("custom"));
    }

    #[test]
    fn options_deserialize_kebab_case() {
        let options: PolicyOptions = serde_json::from_str(
            r#"{"inbound_port":"all-ports","edge_egress_scope":"any","compute_ingress_source":"any"}"#,
        )
        .unwrap();
        assert_eq!(options, PolicyOptions::open());
    }
}
