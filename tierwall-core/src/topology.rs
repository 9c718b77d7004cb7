//! Topology - The security groups every environment declares

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::environment::{Environment, EnvironmentName};
use crate::rule::GroupId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    /// Attached to the internet-facing load balancer
    Edge,
    /// Attached to the fleet that runs workloads
    Compute,
}

impl GroupRole {
    pub const ALL: [GroupRole; 2] = [GroupRole::Edge, GroupRole::Compute];

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Edge => "edge",
            GroupRole::Compute => "compute",
        }
    }

    /// Binding name of the group's descriptor in the resource plan
    pub fn binding(&self) -> &'static str {
        match self {
            GroupRole::Edge => "edge_sg",
            GroupRole::Compute => "compute_sg",
        }
    }
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroup {
    pub id: GroupId,
    pub environment: EnvironmentName,
    pub role: GroupRole,
    pub description: String,
    /// Always false here: every egress path is an explicit rule
    pub default_outbound: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    groups: Vec<SecurityGroup>,
}

impl Topology {
    pub fn for_environment(env: &Environment) -> Self {
        let edge = SecurityGroup {
            id: GroupId::new(env.resource_name("alb-security-group")),
            environment: env.name,
            role: GroupRole::Edge,
            description: "The public facing security group for the application load balancer."
                .to_string(),
            default_outbound: false,
        };
        let compute = SecurityGroup {
            id: GroupId::new(env.resource_name("asg-security-group")),
            environment: env.name,
            role: GroupRole::Compute,
            description: "The security group for the auto scaling group.".to_string(),
            default_outbound: false,
        };
        Self {
            groups: vec![edge, compute],
        }
    }

    pub fn from_groups(groups: Vec<SecurityGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[SecurityGroup] {
        &self.groups
    }

    pub fn group(&self, role: GroupRole) -> Option<&SecurityGroup> {
        self.groups.iter().find(|g| g.role == role)
    }

    pub fn by_id(&self, id: &GroupId) -> Option<&SecurityGroup> {
        self.groups.iter().find(|g| &g.id == id)
    }

    /// Resolve a symbolic group name: a role name or a physical group name
    pub fn resolve(&self, name: &str) -> Option<&SecurityGroup> {
        self.groups
            .iter()
            .find(|g| g.role.as_str() == name || g.id.as_str() == name)
    }
}
