//! Rule - Symbolic and bound traffic-permission rules

use std::fmt;
use std::str::FromStr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::policy::{ComputeIngressSource, EdgeEgressScope, InboundPort};
use crate::topology::GroupRole;

/// `0.0.0.0/0`
pub fn any_ipv4() -> Ipv4Net {
    Ipv4Net::default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

/// TCP port selector
///
/// In config files a port is written as `80`, `"all"`, or `{"from": 8000, "to": 8080}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PortRepr", into = "PortRepr")]
pub enum PortSpec {
    Single(u16),
    Range(u16, u16),
    All,
}

impl PortSpec {
    /// Inclusive bounds
    pub fn bounds(&self) -> (u16, u16) {
        match *self {
            PortSpec::Single(p) => (p, p),
            PortSpec::Range(from, to) => (from, to),
            PortSpec::All => (0, u16::MAX),
        }
    }

    pub fn overlaps(&self, other: &PortSpec) -> bool {
        let (a_from, a_to) = self.bounds();
        let (b_from, b_to) = other.bounds();
        a_from <= b_to && b_from <= a_to
    }

    pub fn is_all(&self) -> bool {
        matches!(self, PortSpec::All)
    }

    pub fn is_well_formed(&self) -> bool {
        match *self {
            PortSpec::Range(from, to) => from <= to,
            _ => true,
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Single(p) => write!(f, "{}", p),
            PortSpec::Range(from, to) => write!(f, "{}-{}", from, to),
            PortSpec::All => f.write_str("all"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PortRepr {
    Single(u16),
    Keyword(String),
    Range { from: u16, to: u16 },
}

impl TryFrom<PortRepr> for PortSpec {
    type Error = String;

    fn try_from(repr: PortRepr) -> Result<Self, Self::Error> {
        match repr {
            PortRepr::Single(p) => Ok(PortSpec::Single(p)),
            PortRepr::Keyword(k) if k == "all" => Ok(PortSpec::All),
            PortRepr::Keyword(k) => Err(format!("Invalid port '{}', expected a number or \"all\"", k)),
            PortRepr::Range { from, to } if from <= to => Ok(PortSpec::Range(from, to)),
            PortRepr::Range { from, to } => Err(format!("Invalid port range {}-{}", from, to)),
        }
    }
}

impl From<PortSpec> for PortRepr {
    fn from(port: PortSpec) -> Self {
        match port {
            PortSpec::Single(p) => PortRepr::Single(p),
            PortSpec::Range(from, to) => PortRepr::Range { from, to },
            PortSpec::All => PortRepr::Keyword("all".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    #[default]
    Allow,
    Deny,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Allow => f.write_str("allow"),
            RuleAction::Deny => f.write_str("deny"),
        }
    }
}

/// Symbolic peer, resolved by the compiler
///
/// Written in config files as `"any"`, `"network"`, `"group:<name>"`, or a CIDR.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PeerRef {
    Cidr(Ipv4Net),
    AnyIpv4,
    /// The environment's network range
    NetworkCidr,
    /// A declared group, by role (`edge`, `compute`) or physical name
    Group(String),
}

impl PeerRef {
    pub fn group(name: impl Into<String>) -> Self {
        PeerRef::Group(name.into())
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRef::Cidr(net) => write!(f, "{}", net),
            PeerRef::AnyIpv4 => f.write_str("any"),
            PeerRef::NetworkCidr => f.write_str("network"),
            PeerRef::Group(name) => write!(f, "group:{}", name),
        }
    }
}

impl FromStr for PeerRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(PeerRef::AnyIpv4),
            "network" => Ok(PeerRef::NetworkCidr),
            _ => {
                if let Some(name) = s.strip_prefix("group:") {
                    if name.is_empty() {
                        return Err("Group peer must name a group".to_string());
                    }
                    return Ok(PeerRef::Group(name.to_string()));
                }
                s.parse::<Ipv4Net>()
                    .map(PeerRef::Cidr)
                    .map_err(|_| format!("Invalid peer '{}'", s))
            }
        }
    }
}

impl TryFrom<String> for PeerRef {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PeerRef> for String {
    fn from(peer: PeerRef) -> Self {
        peer.to_string()
    }
}

/// A rule before group and peer references are resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolicRule {
    /// Group the rule is attached to, by role or physical name
    pub group: String,
    pub direction: Direction,
    pub peer: PeerRef,
    pub port: PortSpec,
    #[serde(default)]
    pub action: RuleAction,
    #[serde(default)]
    pub description: String,
}

impl SymbolicRule {
    pub fn inbound(
        group: impl Into<String>,
        peer: PeerRef,
        port: PortSpec,
        description: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            direction: Direction::Inbound,
            peer,
            port,
            action: RuleAction::Allow,
            description: description.into(),
        }
    }

    pub fn outbound(
        group: impl Into<String>,
        peer: PeerRef,
        port: PortSpec,
        description: impl Into<String>,
    ) -> Self {
        Self {
            direction: Direction::Outbound,
            ..Self::inbound(group, peer, port, description)
        }
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.action = action;
        self
    }
}

/// Concrete group identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        GroupId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    Cidr(Ipv4Net),
    Group(GroupId),
}

impl Peer {
    pub fn is_cidr(&self) -> bool {
        matches!(self, Peer::Cidr(_))
    }

    /// Matches `0.0.0.0/0`
    pub fn is_anywhere(&self) -> bool {
        matches!(self, Peer::Cidr(net) if *net == any_ipv4())
    }

    /// Ranges overlap when one contains the other; groups only match themselves
    pub fn overlaps(&self, other: &Peer) -> bool {
        match (self, other) {
            (Peer::Cidr(a), Peer::Cidr(b)) => a.contains(b) || b.contains(a),
            (Peer::Group(a), Peer::Group(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Cidr(net) => write!(f, "{}", net),
            Peer::Group(id) => write!(f, "group {}", id),
        }
    }
}

/// A rule with every reference bound to a declared group or literal range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Rule {
    pub group: GroupId,
    pub direction: Direction,
    pub peer: Peer,
    pub port: PortSpec,
    pub action: RuleAction,
    pub description: String,
}

impl Rule {
    pub fn is_allow(&self) -> bool {
        self.action == RuleAction::Allow
    }
}

/// Ordered rule set for one environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<SymbolicRule>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base rules derived from the environment's policy options, followed by its extra rules
    pub fn for_environment(env: &Environment) -> Self {
        let options = env.policy;
        let edge = GroupRole::Edge.as_str();
        let compute = GroupRole::Compute.as_str();
        let mut table = Self::new();

        table.push(match options.inbound_port {
            InboundPort::SinglePort => SymbolicRule::inbound(
                edge,
                PeerRef::AnyIpv4,
                PortSpec::Single(env.listener_port),
                format!("Allow inbound HTTP on port {}", env.listener_port),
            ),
            InboundPort::AllPorts => SymbolicRule::inbound(
                edge,
                PeerRef::AnyIpv4,
                PortSpec::All,
                "Allow all inbound traffic",
            ),
        });

        table.push(match options.edge_egress_scope {
            EdgeEgressScope::FleetCidr => SymbolicRule::outbound(
                edge,
                PeerRef::NetworkCidr,
                PortSpec::All,
                "Allow all outbound to the fleet network",
            ),
            EdgeEgressScope::Any => SymbolicRule::outbound(
                edge,
                PeerRef::AnyIpv4,
                PortSpec::All,
                "Allow all outbound traffic",
            ),
        });

        table.push(match options.compute_ingress_source {
            ComputeIngressSource::EdgeGroupIdentity => SymbolicRule::inbound(
                compute,
                PeerRef::group(edge),
                PortSpec::All,
                "Allow all inbound from the load balancer",
            ),
            ComputeIngressSource::Any => SymbolicRule::inbound(
                compute,
                PeerRef::AnyIpv4,
                PortSpec::All,
                "Allow all inbound traffic",
            ),
        });

        table.push(SymbolicRule::outbound(
            compute,
            PeerRef::AnyIpv4,
            PortSpec::All,
            "Allow all outbound to the internet",
        ));

        for rule in &env.extra_rules {
            table.push(rule.clone());
        }
        table
    }

    pub fn push(&mut self, rule: SymbolicRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[SymbolicRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<SymbolicRule> for RuleTable {
    fn from_iter<I: IntoIterator<Item = SymbolicRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
