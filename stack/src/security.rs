// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Security baseline unit.
//!
//! Tiered security groups plus one network ACL per private tier:
//!
//! ```text
//!  onprem/corp ──443──> AlbSG ──80──> AppSG ──6379──> DatastoreSG
//!                                       │
//!                                       └──443──> VpceSG ──443──> AWS services
//! ```
//!
//! Only the public-facing group may accept traffic from an address range;
//! every other group admits peers by security group reference, and a group can
//! only be referenced once it has been declared.

use std::collections::{BTreeMap, BTreeSet};

use ipnet::Ipv4Net;
use serde::Serialize;
use serde_json::{Value, json};

use crate::constants::{
    ALLOWED_INGRESS_CIDRS, ANY_IPV4_NET, CORP_CIDR, EPHEMERAL_PORT_END, EPHEMERAL_PORT_START, HTTP_PORT,
    HTTPS_PORT, ONPREM_CIDR, REDIS_PORT,
};
use crate::errors::StackError;
use crate::nacl::{AclTraffic, NetworkAclSpec, TrafficDirection};
use crate::template::{Scope, get_att, reference};
use crate::vpc::Vpc;

const ANY_IPV4: &str = "0.0.0.0/0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Peer {
    AnyIpv4,
    Ipv4(Ipv4Net),
    /// Another group of the same policy set, by name
    Group(String),
}

impl Peer {
    pub fn is_unrestricted(&self) -> bool {
        match self {
            Peer::AnyIpv4 => true,
            Peer::Ipv4(cidr) => cidr.prefix_len() == 0,
            Peer::Group(_) => false,
        }
    }

    fn cidr(&self) -> Option<String> {
        match self {
            Peer::AnyIpv4 => Some(ANY_IPV4.to_string()),
            Peer::Ipv4(cidr) => Some(cidr.to_string()),
            Peer::Group(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Port {
    Tcp(u16),
    TcpRange(u16, u16),
}

impl Port {
    fn range(&self) -> (u16, u16) {
        match *self {
            Port::Tcp(port) => (port, port),
            Port::TcpRange(from, to) => (from, to),
        }
    }

    /// Suffix used in the construct id of a group-to-group rule
    fn label(&self) -> String {
        match *self {
            Port::Tcp(port) => port.to_string(),
            Port::TcpRange(from, to) => format!("{from}-{to}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroupRule {
    pub direction: TrafficDirection,
    pub peer: Peer,
    pub port: Port,
    pub description: String,
}

impl SecurityGroupRule {
    fn to_inline(&self) -> Option<Value> {
        let (from, to) = self.port.range();
        self.peer.cidr().map(|cidr| {
            json!({
                "CidrIp": cidr,
                "Description": self.description,
                "FromPort": from,
                "IpProtocol": "tcp",
                "ToPort": to,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroupSpec {
    pub name: String,
    pub description: String,
    pub allow_all_outbound: bool,
    pub public_facing: bool,
    pub rules: Vec<SecurityGroupRule>,
}

impl SecurityGroupSpec {
    pub fn ingress(&self) -> impl Iterator<Item = &SecurityGroupRule> {
        self.rules
            .iter()
            .filter(|r| r.direction == TrafficDirection::Ingress)
    }

    pub fn egress(&self) -> impl Iterator<Item = &SecurityGroupRule> {
        self.rules
            .iter()
            .filter(|r| r.direction == TrafficDirection::Egress)
    }

    /// No inbound at all and outbound only on 443.
    pub fn is_egress_only_https(&self) -> bool {
        !self.allow_all_outbound
            && self.ingress().next().is_none()
            && self.egress().next().is_some()
            && self.egress().all(|r| r.port == Port::Tcp(HTTPS_PORT))
    }
}

/// Ordered set of security groups; declaration order is construction order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SecurityPolicySet {
    groups: Vec<SecurityGroupSpec>,
}

impl SecurityPolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> &[SecurityGroupSpec] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&SecurityGroupSpec> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn add_group(
        &mut self,
        name: &str,
        description: &str,
        allow_all_outbound: bool,
        public_facing: bool,
    ) -> Result<(), StackError> {
        if self.group(name).is_some() {
            return Err(StackError::InvalidTopology(format!(
                "security group {name} declared twice"
            )));
        }
        self.groups.push(SecurityGroupSpec {
            name: name.to_string(),
            description: description.to_string(),
            allow_all_outbound,
            public_facing,
            rules: Vec::new(),
        });
        Ok(())
    }

    pub fn add_ingress(
        &mut self,
        group: &str,
        peer: Peer,
        port: Port,
        description: &str,
    ) -> Result<(), StackError> {
        self.add_rule(group, TrafficDirection::Ingress, peer, port, description)
    }

    pub fn add_egress(
        &mut self,
        group: &str,
        peer: Peer,
        port: Port,
        description: &str,
    ) -> Result<(), StackError> {
        self.add_rule(group, TrafficDirection::Egress, peer, port, description)
    }

    fn add_rule(
        &mut self,
        group: &str,
        direction: TrafficDirection,
        peer: Peer,
        port: Port,
        description: &str,
    ) -> Result<(), StackError> {
        if let Peer::Group(peer_name) = &peer
            && self.group(peer_name).is_none()
        {
            return Err(StackError::InvalidTopology(format!(
                "{group} references undeclared security group {peer_name}"
            )));
        }

        let spec = self
            .groups
            .iter_mut()
            .find(|g| g.name == group)
            .ok_or_else(|| {
                StackError::InvalidTopology(format!("no security group named {group}"))
            })?;
        spec.rules.push(SecurityGroupRule {
            direction,
            peer,
            port,
            description: description.to_string(),
        });
        Ok(())
    }

    /// Checks peer references (declared, acyclic) and that no private group
    /// accepts traffic from outside the allow-list.
    pub fn validate(&self) -> Result<(), StackError> {
        let declared: BTreeSet<&str> = self.groups.iter().map(|g| g.name.as_str()).collect();
        let mut edges: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for group in &self.groups {
            for rule in &group.rules {
                if let Peer::Group(peer) = &rule.peer {
                    if !declared.contains(peer.as_str()) {
                        return Err(StackError::InvalidTopology(format!(
                            "{} references undeclared security group {peer}",
                            group.name
                        )));
                    }
                    // a group may always admit its own members
                    if *peer == group.name {
                        continue;
                    }
                    edges
                        .entry(group.name.as_str())
                        .or_default()
                        .push(peer.as_str());
                }
            }

            if group.public_facing {
                continue;
            }
            for rule in group.ingress() {
                if rule.peer.is_unrestricted() {
                    return Err(StackError::PolicyTooPermissive(format!(
                        "{} allows inbound from anywhere",
                        group.name
                    )));
                }
                if let Peer::Ipv4(cidr) = &rule.peer
                    && !ALLOWED_INGRESS_CIDRS.contains(cidr)
                {
                    return Err(StackError::PolicyTooPermissive(format!(
                        "{} allows inbound from {cidr}, which is not allow-listed",
                        group.name
                    )));
                }
            }
        }

        if let Some(cycle) = find_cycle(&edges) {
            return Err(StackError::InvalidTopology(format!(
                "security group references form a cycle: {}",
                cycle.join(" -> ")
            )));
        }

        Ok(())
    }
}

/// Depth-first search over group references; returns the first cycle found.
fn find_cycle<'a>(edges: &BTreeMap<&'a str, Vec<&'a str>>) -> Option<Vec<&'a str>> {
    fn visit<'a>(
        node: &'a str,
        edges: &BTreeMap<&'a str, Vec<&'a str>>,
        stack: &mut Vec<&'a str>,
        done: &mut BTreeSet<&'a str>,
    ) -> Option<Vec<&'a str>> {
        if let Some(pos) = stack.iter().position(|n| *n == node) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        if done.contains(node) {
            return None;
        }
        stack.push(node);
        for next in edges.get(node).into_iter().flatten() {
            if let Some(cycle) = visit(*next, edges, stack, done) {
                return Some(cycle);
            }
        }
        stack.pop();
        done.insert(node);
        None
    }

    let mut done = BTreeSet::new();
    for node in edges.keys() {
        let mut stack = Vec::new();
        if let Some(cycle) = visit(*node, edges, &mut stack, &mut done) {
            return Some(cycle);
        }
    }
    None
}

/// Handle to a declared security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroup {
    pub logical_id: String,
    pub spec: SecurityGroupSpec,
}

impl SecurityGroup {
    pub fn group_id(&self) -> Value {
        get_att(&self.logical_id, "GroupId")
    }
}

/// Declares every group of `policy` under `scope`, in order.
///
/// Group resources are emitted first so that rules between groups can
/// reference a peer declared later in the set.
pub fn synthesize_groups(
    scope: &mut Scope<'_>,
    vpc: &Vpc,
    policy: &SecurityPolicySet,
) -> Result<BTreeMap<String, SecurityGroup>, StackError> {
    let mut declared: BTreeMap<String, SecurityGroup> = BTreeMap::new();

    for spec in policy.groups() {
        let mut group_scope = scope.child(&spec.name);

        let ingress: Vec<Value> = spec.ingress().filter_map(SecurityGroupRule::to_inline).collect();
        let egress: Vec<Value> = if spec.allow_all_outbound {
            vec![json!({
                "CidrIp": ANY_IPV4,
                "Description": "Allow all outbound traffic by default",
                "IpProtocol": "-1",
            })]
        } else {
            let inline: Vec<Value> = spec.egress().filter_map(SecurityGroupRule::to_inline).collect();
            if inline.is_empty() {
                vec![json!({
                    "CidrIp": "255.255.255.255/32",
                    "Description": "Disallow all traffic",
                    "FromPort": 252,
                    "IpProtocol": "icmp",
                    "ToPort": 86,
                })]
            } else {
                inline
            }
        };

        let mut properties = json!({
            "GroupDescription": spec.description,
            "SecurityGroupEgress": egress,
            "VpcId": reference(&vpc.vpc_id),
        });
        if !ingress.is_empty() {
            properties["SecurityGroupIngress"] = json!(ingress);
        }
        let logical_id = group_scope.add_resource("Resource", "AWS::EC2::SecurityGroup", properties)?;

        declared.insert(
            spec.name.clone(),
            SecurityGroup {
                logical_id,
                spec: spec.clone(),
            },
        );
    }

    for spec in policy.groups() {
        let own = declared
            .get(&spec.name)
            .map(SecurityGroup::group_id)
            .ok_or_else(|| StackError::InvalidTopology(format!("security group {} was not declared", spec.name)))?;
        let mut group_scope = scope.child(&spec.name);

        for rule in &spec.rules {
            let Peer::Group(peer_name) = &rule.peer else {
                continue;
            };
            if rule.direction == TrafficDirection::Egress && spec.allow_all_outbound {
                continue;
            }
            let peer = declared.get(peer_name).map(SecurityGroup::group_id).ok_or_else(|| {
                StackError::InvalidTopology(format!(
                    "{} references undeclared security group {peer_name}",
                    spec.name
                ))
            })?;
            let (from, to) = rule.port.range();
            match rule.direction {
                TrafficDirection::Ingress => {
                    group_scope.add_resource(
                        &format!("from {peer_name}:{}", rule.port.label()),
                        "AWS::EC2::SecurityGroupIngress",
                        json!({
                            "Description": rule.description,
                            "FromPort": from,
                            "GroupId": own,
                            "IpProtocol": "tcp",
                            "SourceSecurityGroupId": peer,
                            "ToPort": to,
                        }),
                    )?;
                }
                TrafficDirection::Egress => {
                    group_scope.add_resource(
                        &format!("to {peer_name}:{}", rule.port.label()),
                        "AWS::EC2::SecurityGroupEgress",
                        json!({
                            "Description": rule.description,
                            "DestinationSecurityGroupId": peer,
                            "FromPort": from,
                            "GroupId": own,
                            "IpProtocol": "tcp",
                            "ToPort": to,
                        }),
                    )?;
                }
            }
        }
    }

    Ok(declared)
}

pub struct SecurityBaselineProps<'a> {
    pub project: String,
    pub stage: String,
    pub vpc: &'a Vpc,
}

pub struct SecurityBaseline {
    pub policy: SecurityPolicySet,
    pub nacls: Vec<NetworkAclSpec>,
    pub alb_sg: SecurityGroup,
    pub app_sg: SecurityGroup,
    pub vpce_sg: SecurityGroup,
    pub datastore_sg: SecurityGroup,
}

impl SecurityBaseline {
    /// Tiered security groups: public-facing ALB, application, endpoints, datastore.
    pub fn policy_set() -> Result<SecurityPolicySet, StackError> {
        let mut policy = SecurityPolicySet::new();

        policy.add_group("AlbSG", "Internal ALB SG", true, true)?;
        policy.add_ingress("AlbSG", Peer::Ipv4(ONPREM_CIDR), Port::Tcp(HTTPS_PORT), "Onprem to ALB 443")?;
        policy.add_ingress("AlbSG", Peer::Ipv4(CORP_CIDR), Port::Tcp(HTTPS_PORT), "Corp to ALB 443")?;

        policy.add_group("AppSG", "Application tier SG", false, false)?;
        policy.add_ingress("AppSG", Peer::Group("AlbSG".to_string()), Port::Tcp(HTTP_PORT), "ALB to App 80")?;

        policy.add_group(
            "VpceSG",
            "VPC Interface Endpoints SG (no ingress, 443 egress only)",
            false,
            false,
        )?;
        policy.add_egress("VpceSG", Peer::AnyIpv4, Port::Tcp(HTTPS_PORT), "VPCE to AWS services 443")?;
        policy.add_egress("AppSG", Peer::Group("VpceSG".to_string()), Port::Tcp(HTTPS_PORT), "App to VPCE 443")?;

        policy.add_group("DatastoreSG", "Datastore tier SG", true, false)?;
        policy.add_ingress(
            "DatastoreSG",
            Peer::Group("AppSG".to_string()),
            Port::Tcp(REDIS_PORT),
            "App to Datastore 6379",
        )?;

        policy.validate()?;
        Ok(policy)
    }

    /// Network ACLs for the frontend, application and datastore tiers.
    pub fn network_acls(vpc_cidr: Ipv4Net) -> Result<Vec<NetworkAclSpec>, StackError> {
        let any = ANY_IPV4_NET;
        let ephemeral = AclTraffic::TcpPortRange(EPHEMERAL_PORT_START, EPHEMERAL_PORT_END);

        let mut frontend = NetworkAclSpec::new("FrontendNacl", "Frontend");
        frontend.allow("FrontendInboundEphemeral", TrafficDirection::Ingress, CORP_CIDR, ephemeral)?;
        frontend.allow("FrontendOutboundEphemeral", TrafficDirection::Egress, any, ephemeral)?;

        let mut application = NetworkAclSpec::new("ApplicationNacl", "Application");
        application.allow("AppInboundFromAlb", TrafficDirection::Ingress, vpc_cidr, AclTraffic::TcpPort(HTTP_PORT))?;
        application.allow("AppInboundFromAlbTls", TrafficDirection::Ingress, vpc_cidr, AclTraffic::TcpPort(HTTPS_PORT))?;
        application.allow("AppOutboundEphemeral", TrafficDirection::Egress, any, ephemeral)?;

        let mut datastore = NetworkAclSpec::new("DatastoreNacl", "Datastore");
        datastore.allow("DsInboundFromAppRedis", TrafficDirection::Ingress, vpc_cidr, AclTraffic::TcpPort(REDIS_PORT))?;
        datastore.allow("DsOutboundEphemeral", TrafficDirection::Egress, any, ephemeral)?;

        Ok(vec![frontend, application, datastore])
    }

    #[tracing::instrument(skip(scope, props), fields(project = %props.project, stage = %props.stage))]
    pub fn new(
        scope: &mut Scope<'_>,
        id: &str,
        props: &SecurityBaselineProps<'_>,
    ) -> Result<Self, StackError> {
        let mut scope = scope.child(id);
        let vpc = props.vpc;

        let policy = Self::policy_set()?;
        let mut groups = synthesize_groups(&mut scope, vpc, &policy)?;
        let mut take = |name: &str| {
            groups.remove(name).ok_or_else(|| {
                StackError::InvalidTopology(format!("security group {name} was not declared"))
            })
        };
        let alb_sg = take("AlbSG")?;
        let app_sg = take("AppSG")?;
        let vpce_sg = take("VpceSG")?;
        let datastore_sg = take("DatastoreSG")?;

        let nacls = Self::network_acls(vpc.cidr)?;
        let prefixes = [
            ("FrontendNacl", "FeNaclAssoc"),
            ("ApplicationNacl", "AppNaclAssoc"),
            ("DatastoreNacl", "DsNaclAssoc"),
        ];
        for nacl in &nacls {
            let subnets = vpc.select_subnets(&nacl.tier)?;
            let prefix = prefixes
                .iter()
                .find(|(name, _)| *name == nacl.name)
                .map(|(_, prefix)| *prefix)
                .unwrap_or("NaclAssoc");
            nacl.synthesize(&mut scope, &vpc.vpc_id, subnets, prefix)?;
        }

        tracing::info!(
            "[security] declared {} security groups and {} network ACLs",
            policy.groups().len(),
            nacls.len()
        );

        Ok(Self {
            policy,
            nacls,
            alb_sg,
            app_sg,
            vpce_sg,
            datastore_sg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Stack;
    use crate::vpc::{VpcCore, VpcCoreProps};
    use std::net::Ipv4Addr;

    #[test]
    fn test_baseline_policy_is_valid() {
        let policy = SecurityBaseline::policy_set().unwrap();
        let names: Vec<&str> = policy.groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["AlbSG", "AppSG", "VpceSG", "DatastoreSG"]);

        let app = policy.group("AppSG").unwrap();
        assert!(!app.allow_all_outbound);
        assert_eq!(app.ingress().count(), 1);
        assert_eq!(app.ingress().next().unwrap().peer, Peer::Group("AlbSG".to_string()));
        assert_eq!(app.ingress().next().unwrap().port, Port::Tcp(80));

        let vpce = policy.group("VpceSG").unwrap();
        assert!(vpce.is_egress_only_https());

        let datastore = policy.group("DatastoreSG").unwrap();
        assert_eq!(datastore.ingress().next().unwrap().port, Port::Tcp(6379));
    }

    #[test]
    fn test_private_inbound_rules_are_restricted() {
        let policy = SecurityBaseline::policy_set().unwrap();
        for group in policy.groups().iter().filter(|g| !g.public_facing) {
            for rule in group.ingress() {
                match &rule.peer {
                    Peer::Group(name) => assert!(policy.group(name).is_some()),
                    Peer::Ipv4(cidr) => assert!(ALLOWED_INGRESS_CIDRS.contains(cidr)),
                    Peer::AnyIpv4 => panic!("{} is open to the internet", group.name),
                }
            }
        }
    }

    #[test]
    fn test_forward_reference_is_rejected() {
        let mut policy = SecurityPolicySet::new();
        policy.add_group("A", "a", false, false).unwrap();
        let err = policy
            .add_ingress("A", Peer::Group("B".to_string()), Port::Tcp(80), "later")
            .unwrap_err();
        assert!(matches!(err, StackError::InvalidTopology(_)));
    }

    #[test]
    fn test_rule_on_unknown_group_is_rejected() {
        let mut policy = SecurityPolicySet::new();
        let err = policy
            .add_ingress("Nope", Peer::Ipv4(CORP_CIDR), Port::Tcp(80), "x")
            .unwrap_err();
        assert!(matches!(err, StackError::InvalidTopology(_)));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut policy = SecurityPolicySet::new();
        policy.add_group("A", "a", false, false).unwrap();
        policy.add_group("B", "b", false, false).unwrap();
        policy
            .add_ingress("A", Peer::Group("B".to_string()), Port::Tcp(80), "b to a")
            .unwrap();
        policy
            .add_ingress("B", Peer::Group("A".to_string()), Port::Tcp(80), "a to b")
            .unwrap();
        match policy.validate() {
            Err(StackError::InvalidTopology(message)) => assert!(message.contains("cycle")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_open_private_group_is_too_permissive() {
        let mut policy = SecurityPolicySet::new();
        policy.add_group("App", "app", false, false).unwrap();
        policy
            .add_ingress("App", Peer::AnyIpv4, Port::Tcp(80), "world")
            .unwrap();
        assert!(matches!(
            policy.validate(),
            Err(StackError::PolicyTooPermissive(_))
        ));

        let mut policy = SecurityPolicySet::new();
        policy.add_group("App", "app", false, false).unwrap();
        policy
            .add_ingress(
                "App",
                Peer::Ipv4("192.0.2.0/24".parse().unwrap()),
                Port::Tcp(80),
                "unlisted",
            )
            .unwrap();
        assert!(matches!(
            policy.validate(),
            Err(StackError::PolicyTooPermissive(_))
        ));
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let mut policy = SecurityPolicySet::new();
        policy.add_group("Cache", "cache", false, false).unwrap();
        policy
            .add_ingress("Cache", Peer::Group("Cache".to_string()), Port::Tcp(6379), "cluster")
            .unwrap();
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_public_group_may_be_open() {
        let mut policy = SecurityPolicySet::new();
        policy.add_group("Alb", "alb", true, true).unwrap();
        policy
            .add_ingress("Alb", Peer::AnyIpv4, Port::Tcp(443), "world")
            .unwrap();
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_rule_to_later_group_targets_that_group() {
        let mut stack = Stack::new("test-network");
        let groups = {
            let mut root = stack.root();
            let vpc = VpcCore::new(&mut root, "VpcCore", &VpcCoreProps::new("myapp", "dev"))
                .unwrap()
                .vpc;
            let mut policy = SecurityPolicySet::new();
            policy.add_group("App", "app", false, false).unwrap();
            policy.add_group("Vpce", "vpce", false, false).unwrap();
            policy
                .add_egress("App", Peer::Group("Vpce".to_string()), Port::Tcp(443), "App to Vpce")
                .unwrap();
            synthesize_groups(&mut root, &vpc, &policy).unwrap()
        };

        let template = stack.synth().unwrap();
        let (_, egress) = template
            .resources_of_type("AWS::EC2::SecurityGroupEgress")
            .next()
            .unwrap();
        assert_eq!(egress.property("GroupId"), Some(&groups["App"].group_id()));
        assert_eq!(
            egress.property("DestinationSecurityGroupId"),
            Some(&groups["Vpce"].group_id())
        );
    }

    #[test]
    fn test_nacl_numbering_matches_baseline() {
        let vpc: Ipv4Net = "10.100.0.0/16".parse().unwrap();
        let nacls = SecurityBaseline::network_acls(vpc).unwrap();
        let summary: Vec<(String, u16, bool)> = nacls
            .iter()
            .flat_map(|n| n.entries())
            .map(|e| (e.name.clone(), e.rule_number, e.direction == TrafficDirection::Egress))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("FrontendInboundEphemeral".to_string(), 100, false),
                ("FrontendOutboundEphemeral".to_string(), 100, true),
                ("AppInboundFromAlb".to_string(), 100, false),
                ("AppInboundFromAlbTls".to_string(), 110, false),
                ("AppOutboundEphemeral".to_string(), 100, true),
                ("DsInboundFromAppRedis".to_string(), 100, false),
                ("DsOutboundEphemeral".to_string(), 100, true),
            ]
        );

        let datastore = &nacls[2];
        assert!(datastore.permits(TrafficDirection::Ingress, Ipv4Addr::new(10, 100, 3, 10), 6379));
        assert!(!datastore.permits(TrafficDirection::Ingress, Ipv4Addr::new(10, 100, 3, 10), 5432));
    }
}
