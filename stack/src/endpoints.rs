// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! VPC endpoint unit.
//!
//! Private connectivity to AWS services without traversing the internet.
//! Mandatory endpoints are always declared; the optional set is gated per
//! stage (off in the sandbox unless explicitly enabled).
//!
//! Interface endpoints share one security group with no ingress and 443-only
//! egress. The S3 gateway endpoint carries a resource policy limited to the
//! project's artifact bucket and to principals of the deploying account.

use serde::Serialize;
use serde_json::{Value, json};

use crate::constants::HTTPS_PORT;
use crate::errors::StackError;
use crate::iam::{PolicyDocument, PolicyStatement, Principal};
use crate::security::{Peer, Port, SecurityGroup, SecurityPolicySet, synthesize_groups};
use crate::stage::StageConfig;
use crate::template::{Scope, reference, service_name};
use crate::vpc::{SubnetType, Vpc};

const ENDPOINTS_SG_ID: &str = "EndpointsSG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndpointType {
    Gateway,
    Interface,
}

/// An AWS service reachable through a VPC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EndpointService {
    /// Construct id of the endpoint
    pub id: &'static str,
    /// Service suffix after `com.amazonaws.<region>.`
    pub service: &'static str,
    pub endpoint_type: EndpointType,
}

const fn interface(id: &'static str, service: &'static str) -> EndpointService {
    EndpointService {
        id,
        service,
        endpoint_type: EndpointType::Interface,
    }
}

const fn gateway(id: &'static str, service: &'static str) -> EndpointService {
    EndpointService {
        id,
        service,
        endpoint_type: EndpointType::Gateway,
    }
}

pub const S3: EndpointService = gateway("S3Endpoint", "s3");

pub const MANDATORY_INTERFACE_ENDPOINTS: [EndpointService; 9] = [
    interface("EcrApiEndpoint", "ecr.api"),
    interface("EcrDkrEndpoint", "ecr.dkr"),
    interface("CloudWatchLogsEndpoint", "logs"),
    interface("StsEndpoint", "sts"),
    interface("Ec2Endpoint", "ec2"),
    interface("Ec2MessagesEndpoint", "ec2messages"),
    interface("EcsEndpoint", "ecs"),
    interface("EcsAgentEndpoint", "ecs-agent"),
    interface("EcsTelemetryEndpoint", "ecs-telemetry"),
];

pub const OPTIONAL_ENDPOINTS: [EndpointService; 5] = [
    interface("SecretsManagerEndpoint", "secretsmanager"),
    interface("SsmEndpoint", "ssm"),
    interface("SsmMessagesEndpoint", "ssmmessages"),
    interface("KmsEndpoint", "kms"),
    gateway("DynamoDbEndpoint", "dynamodb"),
];

/// A declared endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Endpoint {
    pub logical_id: String,
    pub service: EndpointService,
    pub security_group_id: Option<String>,
    pub policy: Option<Value>,
}

pub struct VpcEndpointsProps<'a> {
    pub project: String,
    pub stage: &'a StageConfig,
    pub vpc: &'a Vpc,
    /// Overrides the stage default for the optional endpoint set
    pub enable_optional_endpoints: Option<bool>,
    /// Shared security group for interface endpoints; one is created when absent
    pub endpoint_security_group: Option<&'a SecurityGroup>,
}

impl VpcEndpointsProps<'_> {
    pub fn optional_endpoints_enabled(&self) -> bool {
        self.enable_optional_endpoints
            .unwrap_or(!self.stage.is_sandbox())
    }
}

pub struct VpcEndpoints {
    pub endpoints: Vec<Endpoint>,
    pub security_group: SecurityGroup,
}

impl VpcEndpoints {
    #[tracing::instrument(skip(scope, props), fields(project = %props.project, stage = %props.stage.stage_id))]
    pub fn new(
        scope: &mut Scope<'_>,
        id: &str,
        props: &VpcEndpointsProps<'_>,
    ) -> Result<Self, StackError> {
        let mut scope = scope.child(id);
        let vpc = props.vpc;

        let security_group = match props.endpoint_security_group {
            Some(group) => group.clone(),
            None => {
                let mut policy = SecurityPolicySet::new();
                policy.add_group(
                    ENDPOINTS_SG_ID,
                    "VPC Interface Endpoints SG (least privilege)",
                    false,
                    false,
                )?;
                policy.add_egress(
                    ENDPOINTS_SG_ID,
                    Peer::AnyIpv4,
                    Port::Tcp(HTTPS_PORT),
                    "VPCE to AWS services 443",
                )?;
                policy.validate()?;
                synthesize_groups(&mut scope, vpc, &policy)?
                    .remove(ENDPOINTS_SG_ID)
                    .ok_or_else(|| {
                        StackError::InvalidTopology(format!("{ENDPOINTS_SG_ID} was not declared"))
                    })?
            }
        };
        if !security_group.spec.is_egress_only_https() {
            return Err(StackError::PolicyTooPermissive(format!(
                "interface endpoint security group {} must have no ingress and 443-only egress",
                security_group.spec.name
            )));
        }

        let mut endpoints = Vec::new();

        let policy = s3_policy(&props.project, props.stage);
        endpoints.push(add_gateway(&mut scope, vpc, S3, Some(policy))?);

        for service in MANDATORY_INTERFACE_ENDPOINTS {
            endpoints.push(add_interface(&mut scope, vpc, service, &security_group)?);
        }

        if props.optional_endpoints_enabled() {
            for service in OPTIONAL_ENDPOINTS {
                let endpoint = match service.endpoint_type {
                    EndpointType::Interface => add_interface(&mut scope, vpc, service, &security_group)?,
                    EndpointType::Gateway => add_gateway(&mut scope, vpc, service, None)?,
                };
                endpoints.push(endpoint);
            }
        } else {
            tracing::info!(
                "[endpoints] optional endpoints disabled for stage {}",
                props.stage.stage_id
            );
        }

        tracing::info!("[endpoints] declared {} endpoints", endpoints.len());

        Ok(Self {
            endpoints,
            security_group,
        })
    }

    pub fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.service.id == id)
    }

    /// Every interface endpoint sits behind the shared egress-only group;
    /// gateway endpoints have none.
    pub fn validate(&self) -> Result<(), StackError> {
        if !self.security_group.spec.is_egress_only_https() {
            return Err(StackError::PolicyTooPermissive(format!(
                "{} is not egress-only on 443",
                self.security_group.spec.name
            )));
        }
        for endpoint in &self.endpoints {
            let attached = endpoint.security_group_id.as_deref();
            match endpoint.service.endpoint_type {
                EndpointType::Interface if attached != Some(self.security_group.logical_id.as_str()) => {
                    return Err(StackError::PolicyTooPermissive(format!(
                        "{} is not attached to {}",
                        endpoint.service.id, self.security_group.spec.name
                    )));
                }
                EndpointType::Gateway if attached.is_some() => {
                    return Err(StackError::InvalidTopology(format!(
                        "gateway endpoint {} cannot carry a security group",
                        endpoint.service.id
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Read/write/list on the artifact bucket only, for principals of this account.
pub fn s3_policy(project: &str, stage: &StageConfig) -> PolicyDocument {
    let bucket = format!(
        "{}-artifacts-{}-{}",
        project, stage.account_id, stage.region_id
    );
    PolicyDocument::new(vec![
        PolicyStatement::allow()
            .principal(Principal::Any)
            .actions(&["s3:GetObject", "s3:PutObject", "s3:ListBucket"])
            .resource(json!(format!("arn:aws:s3:::{bucket}")))
            .resource(json!(format!("arn:aws:s3:::{bucket}/*")))
            .condition("StringEquals", "aws:PrincipalAccount", json!(stage.account_id)),
    ])
}

fn add_gateway(
    scope: &mut Scope<'_>,
    vpc: &Vpc,
    service: EndpointService,
    policy: Option<PolicyDocument>,
) -> Result<Endpoint, StackError> {
    let route_tables: Vec<Value> = vpc
        .private_route_table_ids()
        .iter()
        .map(|id| reference(id))
        .collect();
    if route_tables.is_empty() {
        return Err(StackError::InvalidTopology(format!(
            "{} has no private route tables to attach to",
            service.id
        )));
    }

    let mut properties = json!({
        "RouteTableIds": route_tables,
        "ServiceName": service_name(service.service),
        "VpcEndpointType": "Gateway",
        "VpcId": reference(&vpc.vpc_id),
    });
    let policy = policy.map(|p| p.to_value());
    if let Some(document) = &policy {
        properties["PolicyDocument"] = document.clone();
    }

    let logical_id = scope
        .child(service.id)
        .add_resource("Resource", "AWS::EC2::VPCEndpoint", properties)?;

    Ok(Endpoint {
        logical_id,
        service,
        security_group_id: None,
        policy,
    })
}

fn add_interface(
    scope: &mut Scope<'_>,
    vpc: &Vpc,
    service: EndpointService,
    security_group: &SecurityGroup,
) -> Result<Endpoint, StackError> {
    // one ENI per AZ in the first private tier with egress
    let tier = vpc
        .tiers
        .iter()
        .find(|t| t.subnet_type == SubnetType::PrivateWithEgress)
        .ok_or_else(|| {
            StackError::InvalidTopology(format!("{} needs a private subnet tier", service.id))
        })?;
    let subnets: Vec<Value> = tier.subnets.iter().map(|s| reference(&s.subnet_id)).collect();

    let logical_id = scope.child(service.id).add_resource(
        "Resource",
        "AWS::EC2::VPCEndpoint",
        json!({
            "PrivateDnsEnabled": true,
            "SecurityGroupIds": [security_group.group_id()],
            "ServiceName": service_name(service.service),
            "SubnetIds": subnets,
            "VpcEndpointType": "Interface",
            "VpcId": reference(&vpc.vpc_id),
        }),
    )?;

    Ok(Endpoint {
        logical_id,
        service,
        security_group_id: Some(security_group.logical_id.clone()),
        policy: None,
    })
}
