// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Core network unit.
//!
//! Declares one VPC with multi-AZ subnet tiers, an internet gateway and
//! redundant NAT gateways:
//!
//! | Tier | Type | Mask | Default route |
//! |------|------|------|---------------|
//! | Egress | public | /28 | internet gateway |
//! | Frontend | private with egress | /24 | NAT gateway |
//! | Application | private with egress | /24 | NAT gateway |
//! | Datastore | private isolated | /24 | none |
//!
//! The public tier exists only to host the NAT gateways; workloads never run
//! there. Isolation of the datastore tier comes from the missing default
//! route, not from a filtering rule.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::Serialize;
use serde_json::json;

use crate::constants::{MAX_AZS, NAT_GATEWAYS, PRIVATE_SUBNET_MASK, PUBLIC_SUBNET_MASK, VPC_CIDR};
use crate::errors::StackError;
use crate::template::{CfnResource, Scope, get_att, reference, select_az};

pub const VPC_ID: &str = "MyappVpc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubnetType {
    Public,
    PrivateWithEgress,
    PrivateIsolated,
}

impl SubnetType {
    /// Value of the `aws-cdk:subnet-type` tag
    pub fn label(&self) -> &'static str {
        match self {
            SubnetType::Public => "Public",
            SubnetType::PrivateWithEgress => "Private",
            SubnetType::PrivateIsolated => "Isolated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubnetConfiguration {
    pub name: String,
    pub subnet_type: SubnetType,
    pub cidr_mask: u8,
}

impl SubnetConfiguration {
    pub fn new(name: &str, subnet_type: SubnetType, cidr_mask: u8) -> Self {
        Self {
            name: name.to_string(),
            subnet_type,
            cidr_mask,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VpcCoreProps {
    pub project: String,
    pub stage: String,
    pub cidr: Ipv4Net,
    pub max_azs: usize,
    pub nat_gateways: usize,
    pub subnet_configuration: Vec<SubnetConfiguration>,
}

impl VpcCoreProps {
    pub fn new(project: &str, stage: &str) -> Self {
        Self {
            project: project.to_string(),
            stage: stage.to_string(),
            cidr: VPC_CIDR,
            max_azs: MAX_AZS,
            nat_gateways: NAT_GATEWAYS,
            subnet_configuration: vec![
                SubnetConfiguration::new("Egress", SubnetType::Public, PUBLIC_SUBNET_MASK),
                SubnetConfiguration::new(
                    "Frontend",
                    SubnetType::PrivateWithEgress,
                    PRIVATE_SUBNET_MASK,
                ),
                SubnetConfiguration::new(
                    "Application",
                    SubnetType::PrivateWithEgress,
                    PRIVATE_SUBNET_MASK,
                ),
                SubnetConfiguration::new(
                    "Datastore",
                    SubnetType::PrivateIsolated,
                    PRIVATE_SUBNET_MASK,
                ),
            ],
        }
    }
}

/// A declared subnet and the resources routing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subnet {
    pub subnet_id: String,
    pub route_table_id: String,
    pub cidr: Ipv4Net,
    pub az_index: usize,
    pub has_default_route: bool,
    pub nat_gateway_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubnetTier {
    pub name: String,
    pub subnet_type: SubnetType,
    pub cidr_mask: u8,
    pub subnets: Vec<Subnet>,
}

impl SubnetTier {
    pub fn has_default_route(&self) -> bool {
        self.subnets.iter().any(|s| s.has_default_route)
    }
}

/// Read-only handle to the VPC passed to the downstream units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vpc {
    pub vpc_id: String,
    pub path: String,
    pub cidr: Ipv4Net,
    pub zone_count: usize,
    pub internet_gateway_id: String,
    pub tiers: Vec<SubnetTier>,
}

impl Vpc {
    pub fn tier(&self, name: &str) -> Option<&SubnetTier> {
        self.tiers.iter().find(|t| t.name == name)
    }

    /// Subnets of the named tier; unknown names are a topology error.
    pub fn select_subnets(&self, name: &str) -> Result<&[Subnet], StackError> {
        self.tier(name)
            .map(|t| t.subnets.as_slice())
            .ok_or_else(|| StackError::InvalidTopology(format!("no subnet group named {name}")))
    }

    pub fn subnets_of_type(&self, subnet_type: SubnetType) -> impl Iterator<Item = &Subnet> {
        self.tiers
            .iter()
            .filter(move |t| t.subnet_type == subnet_type)
            .flat_map(|t| t.subnets.iter())
    }

    /// Route tables of every non-public subnet.
    pub fn private_route_table_ids(&self) -> Vec<String> {
        self.tiers
            .iter()
            .filter(|t| t.subnet_type != SubnetType::Public)
            .flat_map(|t| t.subnets.iter().map(|s| s.route_table_id.clone()))
            .collect()
    }

    pub fn nat_gateway_ids(&self) -> Vec<String> {
        self.subnets_of_type(SubnetType::Public)
            .filter_map(|s| s.nat_gateway_id.clone())
            .collect()
    }

    /// Checks the network invariants: disjoint tiers inside the VPC block,
    /// exactly one public tier carrying the NAT gateways, and exactly one tier
    /// without a default route.
    pub fn validate(&self) -> Result<(), StackError> {
        let subnets: Vec<&Subnet> = self.tiers.iter().flat_map(|t| t.subnets.iter()).collect();
        for (i, a) in subnets.iter().enumerate() {
            if !self.cidr.contains(&a.cidr) {
                return Err(StackError::InvalidTopology(format!(
                    "subnet {} is outside {}",
                    a.cidr, self.cidr
                )));
            }
            for b in &subnets[i + 1..] {
                if a.cidr.contains(&b.cidr) || b.cidr.contains(&a.cidr) {
                    return Err(StackError::InvalidTopology(format!(
                        "subnets {} and {} overlap",
                        a.cidr, b.cidr
                    )));
                }
            }
        }

        let public: Vec<&SubnetTier> = self
            .tiers
            .iter()
            .filter(|t| t.subnet_type == SubnetType::Public)
            .collect();
        if public.len() != 1 {
            return Err(StackError::InvalidTopology(format!(
                "expected exactly one public tier, found {}",
                public.len()
            )));
        }
        if self.nat_gateway_ids().is_empty() {
            return Err(StackError::InvalidTopology(
                "public tier hosts no NAT gateway".to_string(),
            ));
        }

        let unrouted = self.tiers.iter().filter(|t| !t.has_default_route()).count();
        if unrouted != 1 {
            return Err(StackError::InvalidTopology(format!(
                "expected exactly one tier without a default route, found {unrouted}"
            )));
        }

        Ok(())
    }
}

/// Hands out aligned subnet blocks from the VPC range in request order.
struct NetworkBuilder {
    network: Ipv4Net,
    next: u64,
}

impl NetworkBuilder {
    fn new(network: Ipv4Net) -> Self {
        Self {
            next: u64::from(u32::from(network.network())),
            network,
        }
    }

    fn add_subnet(&mut self, mask: u8) -> Result<Ipv4Net, StackError> {
        if mask < self.network.prefix_len() || mask > 32 {
            return Err(StackError::InvalidTopology(format!(
                "mask /{mask} does not fit in {}",
                self.network
            )));
        }
        let size = 1u64 << (32 - mask);
        let start = self.next.div_ceil(size) * size;
        let end = start + size - 1;
        let last = u64::from(u32::from(self.network.broadcast()));
        if end > last {
            return Err(StackError::InvalidTopology(format!(
                "{} has no room for another /{mask}",
                self.network
            )));
        }
        self.next = end + 1;

        let address = Ipv4Addr::from(start as u32);
        Ipv4Net::new(address, mask)
            .map_err(|err| StackError::InvalidTopology(format!("{address}/{mask}: {err}")))
    }
}

pub struct VpcCore {
    pub vpc: Vpc,
}

impl VpcCore {
    #[tracing::instrument(skip(scope, props), fields(project = %props.project, stage = %props.stage))]
    pub fn new(scope: &mut Scope<'_>, id: &str, props: &VpcCoreProps) -> Result<Self, StackError> {
        let mut scope = scope.child(id);
        let mut vpc_scope = scope.child(VPC_ID);
        let vpc_path = vpc_scope.path();

        if props.max_azs == 0 {
            return Err(StackError::InvalidTopology("at least one AZ is required".to_string()));
        }

        let vpc_id = vpc_scope.add_resource(
            "Resource",
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": props.cidr.to_string(),
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": [{"Key": "Name", "Value": vpc_path}],
            }),
        )?;

        let igw_id = vpc_scope.add_resource(
            "IGW",
            "AWS::EC2::InternetGateway",
            json!({"Tags": [{"Key": "Name", "Value": vpc_path}]}),
        )?;
        let attachment_id = vpc_scope.add_resource(
            "VPCGW",
            "AWS::EC2::VPCGatewayAttachment",
            json!({
                "InternetGatewayId": reference(&igw_id),
                "VpcId": reference(&vpc_id),
            }),
        )?;

        let mut builder = NetworkBuilder::new(props.cidr);
        let mut tiers: Vec<SubnetTier> = Vec::new();
        // NAT gateways by AZ index, filled while the public tier is declared
        let mut nat_by_az: Vec<String> = Vec::new();

        for config in &props.subnet_configuration {
            let mut subnets = Vec::new();
            for az_index in 0..props.max_azs {
                let cidr = builder.add_subnet(config.cidr_mask)?;
                let subnet_name = format!("{}Subnet{}", config.name, az_index + 1);
                let mut subnet_scope = vpc_scope.child(&subnet_name);
                let subnet_path = subnet_scope.path();

                let subnet_id = subnet_scope.add_resource(
                    "Subnet",
                    "AWS::EC2::Subnet",
                    json!({
                        "AvailabilityZone": select_az(az_index),
                        "CidrBlock": cidr.to_string(),
                        "MapPublicIpOnLaunch": config.subnet_type == SubnetType::Public,
                        "Tags": [
                            {"Key": "aws-cdk:subnet-name", "Value": config.name},
                            {"Key": "aws-cdk:subnet-type", "Value": config.subnet_type.label()},
                            {"Key": "Name", "Value": subnet_path},
                        ],
                        "VpcId": reference(&vpc_id),
                    }),
                )?;
                let route_table_id = subnet_scope.add_resource(
                    "RouteTable",
                    "AWS::EC2::RouteTable",
                    json!({
                        "Tags": [{"Key": "Name", "Value": subnet_path}],
                        "VpcId": reference(&vpc_id),
                    }),
                )?;
                subnet_scope.add_resource(
                    "RouteTableAssociation",
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({
                        "RouteTableId": reference(&route_table_id),
                        "SubnetId": reference(&subnet_id),
                    }),
                )?;

                let mut nat_gateway_id = None;
                let has_default_route = match config.subnet_type {
                    SubnetType::Public => {
                        subnet_scope.add(
                            "DefaultRoute",
                            CfnResource::new(
                                "AWS::EC2::Route",
                                json!({
                                    "DestinationCidrBlock": "0.0.0.0/0",
                                    "GatewayId": reference(&igw_id),
                                    "RouteTableId": reference(&route_table_id),
                                }),
                            )
                            .depends_on(&attachment_id),
                        )?;
                        if nat_by_az.len() < props.nat_gateways {
                            let eip_id = subnet_scope.add_resource(
                                "EIP",
                                "AWS::EC2::EIP",
                                json!({
                                    "Domain": "vpc",
                                    "Tags": [{"Key": "Name", "Value": subnet_path}],
                                }),
                            )?;
                            let nat_id = subnet_scope.add(
                                "NATGateway",
                                CfnResource::new(
                                    "AWS::EC2::NatGateway",
                                    json!({
                                        "AllocationId": get_att(&eip_id, "AllocationId"),
                                        "SubnetId": reference(&subnet_id),
                                        "Tags": [{"Key": "Name", "Value": subnet_path}],
                                    }),
                                )
                                .depends_on(&subnet_id),
                            )?;
                            nat_by_az.push(nat_id.clone());
                            nat_gateway_id = Some(nat_id);
                        }
                        true
                    }
                    SubnetType::PrivateWithEgress => {
                        if nat_by_az.is_empty() {
                            return Err(StackError::InvalidTopology(format!(
                                "{} needs a NAT gateway but no public tier precedes it",
                                config.name
                            )));
                        }
                        let nat_id = &nat_by_az[az_index % nat_by_az.len()];
                        subnet_scope.add_resource(
                            "DefaultRoute",
                            "AWS::EC2::Route",
                            json!({
                                "DestinationCidrBlock": "0.0.0.0/0",
                                "NatGatewayId": reference(nat_id),
                                "RouteTableId": reference(&route_table_id),
                            }),
                        )?;
                        true
                    }
                    SubnetType::PrivateIsolated => false,
                };

                subnets.push(Subnet {
                    subnet_id,
                    route_table_id,
                    cidr,
                    az_index,
                    has_default_route,
                    nat_gateway_id,
                });
            }

            tiers.push(SubnetTier {
                name: config.name.clone(),
                subnet_type: config.subnet_type,
                cidr_mask: config.cidr_mask,
                subnets,
            });
        }

        let vpc = Vpc {
            vpc_id,
            path: format!("{vpc_path}/Resource"),
            cidr: props.cidr,
            zone_count: props.max_azs,
            internet_gateway_id: igw_id,
            tiers,
        };
        vpc.validate()?;

        tracing::info!(
            "[vpc] declared {} with {} tiers across {} AZs",
            vpc.cidr,
            vpc.tiers.len(),
            vpc.zone_count
        );

        Ok(Self { vpc })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Stack;
    use proptest::prelude::*;

    fn build(props: &VpcCoreProps) -> (Stack, Result<VpcCore, StackError>) {
        let mut stack = Stack::new("test-network");
        let core = {
            let mut root = stack.root();
            VpcCore::new(&mut root, "VpcCore", props)
        };
        (stack, core)
    }

    #[test]
    fn test_default_layout() {
        let (_, core) = build(&VpcCoreProps::new("myapp", "dev"));
        let vpc = core.unwrap().vpc;

        assert_eq!(vpc.cidr.to_string(), "10.100.0.0/16");
        assert_eq!(vpc.zone_count, 2);
        assert_eq!(vpc.tiers.len(), 4);

        let cidrs: Vec<String> = vpc
            .tiers
            .iter()
            .flat_map(|t| t.subnets.iter().map(|s| s.cidr.to_string()))
            .collect();
        assert_eq!(
            cidrs,
            vec![
                "10.100.0.0/28",
                "10.100.0.16/28",
                "10.100.1.0/24",
                "10.100.2.0/24",
                "10.100.3.0/24",
                "10.100.4.0/24",
                "10.100.5.0/24",
                "10.100.6.0/24",
            ]
        );
        assert_eq!(vpc.path, "test-network/VpcCore/MyappVpc/Resource");
    }

    #[test]
    fn test_routing_by_tier() {
        let (stack, core) = build(&VpcCoreProps::new("myapp", "dev"));
        let vpc = core.unwrap().vpc;

        assert!(vpc.tier("Egress").unwrap().has_default_route());
        assert!(vpc.tier("Frontend").unwrap().has_default_route());
        assert!(vpc.tier("Application").unwrap().has_default_route());
        assert!(!vpc.tier("Datastore").unwrap().has_default_route());
        assert_eq!(vpc.nat_gateway_ids().len(), 2);

        let template = stack.synth().unwrap();
        assert_eq!(template.count_of_type("AWS::EC2::InternetGateway"), 1);
        assert_eq!(template.count_of_type("AWS::EC2::NatGateway"), 2);
        assert_eq!(template.count_of_type("AWS::EC2::Subnet"), 8);
        // 2 public + 2 frontend + 2 application
        assert_eq!(template.count_of_type("AWS::EC2::Route"), 6);

        // each private subnet routes through the NAT gateway of its own AZ
        let frontend = vpc.select_subnets("Frontend").unwrap();
        for subnet in frontend {
            assert!(subnet.has_default_route);
        }
        let routes: Vec<_> = template
            .resources_of_type("AWS::EC2::Route")
            .filter_map(|(_, r)| r.property("NatGatewayId").cloned())
            .collect();
        assert_eq!(routes.len(), 4);
    }

    #[test]
    fn test_select_unknown_tier() {
        let (_, core) = build(&VpcCoreProps::new("myapp", "dev"));
        assert!(matches!(
            core.unwrap().vpc.select_subnets("Database"),
            Err(StackError::InvalidTopology(_))
        ));
    }

    #[test]
    fn test_private_tier_without_public_tier_is_rejected() {
        let mut props = VpcCoreProps::new("myapp", "dev");
        props.subnet_configuration.remove(0);
        let (_, core) = build(&props);
        assert!(matches!(core, Err(StackError::InvalidTopology(_))));
    }

    #[test]
    fn test_two_isolated_tiers_are_rejected() {
        let mut props = VpcCoreProps::new("myapp", "dev");
        props.subnet_configuration.push(SubnetConfiguration::new(
            "Archive",
            SubnetType::PrivateIsolated,
            24,
        ));
        let (_, core) = build(&props);
        assert!(matches!(core, Err(StackError::InvalidTopology(_))));
    }

    #[test]
    fn test_exhausted_address_space_is_rejected() {
        let mut props = VpcCoreProps::new("myapp", "dev");
        props.cidr = "10.100.0.0/22".parse().unwrap();
        let (_, core) = build(&props);
        assert!(matches!(core, Err(StackError::InvalidTopology(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_carved_subnets_are_aligned_and_disjoint(masks in proptest::collection::vec(17u8..29, 1..12)) {
            let network: Ipv4Net = "10.100.0.0/16".parse().unwrap();
            let mut builder = NetworkBuilder::new(network);
            let mut carved: Vec<Ipv4Net> = Vec::new();
            for mask in masks {
                match builder.add_subnet(mask) {
                    Ok(subnet) => {
                        prop_assert_eq!(subnet.prefix_len(), mask);
                        prop_assert_eq!(subnet.network(), subnet.addr());
                        prop_assert!(network.contains(&subnet));
                        for other in &carved {
                            prop_assert!(!other.contains(&subnet) && !subnet.contains(other));
                        }
                        carved.push(subnet);
                    }
                    Err(_) => break,
                }
            }
        }
    }
}
