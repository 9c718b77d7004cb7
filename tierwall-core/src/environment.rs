//! Environment - Static, per-deployment-target descriptors

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::policy::PolicyOptions;
use crate::rule::SymbolicRule;

pub const DEFAULT_NAMING_PREFIX: &str = "ohme-assessment";
pub const DEFAULT_REGION: &str = "eu-west-2";
pub const DEFAULT_ACCOUNT: &str = "123456789012";
pub const DEFAULT_SUBNET_SELECTOR: &str = "Public Subnet";
pub const DEFAULT_LISTENER_PORT: u16 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentName {
    Dev,
    Qa,
    Prod,
}

impl EnvironmentName {
    pub const ALL: [EnvironmentName; 3] =
        [EnvironmentName::Dev, EnvironmentName::Qa, EnvironmentName::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentName::Dev => "dev",
            EnvironmentName::Qa => "qa",
            EnvironmentName::Prod => "prod",
        }
    }

    /// Second octet of the built-in `10.x.0.0/16` network
    fn network_octet(&self) -> u8 {
        match self {
            EnvironmentName::Dev => 0,
            EnvironmentName::Qa => 1,
            EnvironmentName::Prod => 2,
        }
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(EnvironmentName::Dev),
            "qa" => Ok(EnvironmentName::Qa),
            "prod" => Ok(EnvironmentName::Prod),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }
}

/// Machine image architecture for the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmiHardware {
    #[default]
    Arm64,
    X86_64,
}

impl AmiHardware {
    /// SSM parameter holding the ECS-optimised Amazon Linux 2023 image id
    pub fn image_parameter(&self) -> &'static str {
        match self {
            AmiHardware::Arm64 => {
                "/aws/service/ecs/optimized-ami/amazon-linux-2023/arm64/recommended/image_id"
            }
            AmiHardware::X86_64 => {
                "/aws/service/ecs/optimized-ami/amazon-linux-2023/recommended/image_id"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSpec {
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub instance_type: String,
    pub ami_hardware: AmiHardware,
}

impl Default for FleetSpec {
    fn default() -> Self {
        Self {
            min_capacity: 1,
            max_capacity: 4,
            instance_type: "t4g.medium".to_string(),
            ami_hardware: AmiHardware::Arm64,
        }
    }
}

/// Everything needed to compile one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub name: EnvironmentName,
    /// Name used to look up the existing network
    pub network_id: String,
    pub network_cidr: Ipv4Net,
    pub public_subnet_selector: String,
    pub naming_prefix: String,
    pub listener_port: u16,
    pub region: String,
    pub account: String,
    pub fleet: FleetSpec,
    pub policy: PolicyOptions,
    pub extra_rules: Vec<SymbolicRule>,
}

impl Environment {
    pub fn builtin(name: EnvironmentName) -> Self {
        Self::with_prefix(name, DEFAULT_NAMING_PREFIX)
    }

    pub fn with_prefix(name: EnvironmentName, prefix: &str) -> Self {
        let network_cidr = Ipv4Net::new_assert(Ipv4Addr::new(10, name.network_octet(), 0, 0), 16);
        Self {
            name,
            network_id: format!("{}-{}-vpc", prefix, name),
            network_cidr,
            public_subnet_selector: DEFAULT_SUBNET_SELECTOR.to_string(),
            naming_prefix: prefix.to_string(),
            listener_port: DEFAULT_LISTENER_PORT,
            region: DEFAULT_REGION.to_string(),
            account: DEFAULT_ACCOUNT.to_string(),
            fleet: FleetSpec::default(),
            policy: PolicyOptions::default(),
            extra_rules: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: PolicyOptions) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_extra_rule(mut self, rule: SymbolicRule) -> Self {
        self.extra_rules.push(rule);
        self
    }

    /// Physical name: `{prefix}-{env}-{suffix}`
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}-{}", self.naming_prefix, self.name, suffix)
    }

    pub fn stack_name(&self) -> String {
        self.resource_name("ecs-cluster-stack")
    }

    /// Reject descriptors no stack could be built from
    pub fn check(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            environment: self.name.to_string(),
            message,
        };
        if self.listener_port == 0 {
            return Err(invalid("listener_port must be non-zero".to_string()));
        }
        if self.fleet.max_capacity == 0 {
            return Err(invalid("max_capacity must be at least 1".to_string()));
        }
        if self.fleet.min_capacity > self.fleet.max_capacity {
            return Err(invalid(format!(
                "min_capacity ({}) exceeds max_capacity ({})",
                self.fleet.min_capacity, self.fleet.max_capacity
            )));
        }
        if self.naming_prefix.is_empty() {
            return Err(invalid("naming_prefix must not be empty".to_string()));
        }
        Ok(())
    }
}
