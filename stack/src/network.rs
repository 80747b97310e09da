// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Composition root.
//!
//! Builds the four units in dependency order on one stack:
//!
//! ```text
//! VpcCore ──vpc──> SecurityBaseline ──VpceSG──> VpcEndpoints
//!    └─────vpc──────────────────────────────────> FlowLogs
//! ```
//!
//! then labels every taggable resource and records the known-safe
//! suppressions. Any unit error aborts the whole build.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::constants::{
    DEFAULT_STAGE, MAX_PROJECT_LENGTH, MAX_STAGE_LENGTH, PROJECT, STACK_COMPONENT, TAG_COST_CENTER,
    TAG_OWNER,
};
use crate::endpoints::{VpcEndpoints, VpcEndpointsProps};
use crate::errors::StackError;
use crate::flow_logs::{FlowLogs, FlowLogsProps};
use crate::models::SuppressionRecord;
use crate::security::{SecurityBaseline, SecurityBaselineProps};
use crate::stage::{StageConfig, resolve, resource_name};
use crate::template::{Stack, Template};
use crate::vpc::{Vpc, VpcCore, VpcCoreProps};

pub const VPC7: &str = "AwsSolutions-VPC7";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NetworkStackProps {
    #[validate(length(min = 1, max = "MAX_PROJECT_LENGTH"))]
    #[validate(custom(function = "validate_name"))]
    pub project: String,

    #[validate(length(min = 1, max = "MAX_STAGE_LENGTH"))]
    #[validate(custom(function = "validate_name"))]
    pub stage: String,

    /// Overrides the per-stage default for optional VPC endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_optional_endpoints: Option<bool>,
}

impl NetworkStackProps {
    pub fn new(project: &str, stage: &str) -> Self {
        Self {
            project: project.to_string(),
            stage: stage.to_string(),
            enable_optional_endpoints: None,
        }
    }
}

impl Default for NetworkStackProps {
    fn default() -> Self {
        Self::new(PROJECT, DEFAULT_STAGE)
    }
}

/// Lowercase letters, digits and inner hyphens, starting with a letter
fn validate_name(name: &str) -> Result<(), validator::ValidationError> {
    let starts_with_letter = name.chars().next().is_some_and(|c| c.is_ascii_lowercase());
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !starts_with_letter || !valid_chars || name.ends_with('-') {
        return Err(validator::ValidationError::new("invalid_name"));
    }
    Ok(())
}

pub struct NetworkStack {
    pub stack: Stack,
    pub stage: &'static StageConfig,
    pub vpc: Vpc,
    pub security: SecurityBaseline,
    pub endpoints: VpcEndpoints,
    pub flow_logs: FlowLogs,
}

impl NetworkStack {
    /// `<project>-<stage>-<region short code>-network`
    pub fn stack_name(project: &str, stage: &StageConfig) -> String {
        resource_name(project, stage, STACK_COMPONENT)
    }

    #[tracing::instrument(skip(props), fields(project = %props.project, stage = %props.stage))]
    pub fn build(props: &NetworkStackProps) -> Result<Self, StackError> {
        props.validate()?;
        let stage = resolve(&props.stage)?;
        let project = props.project.as_str();
        let stage_id = stage.stage_id;

        let name = Self::stack_name(project, stage);
        let mut stack = Stack::new(&name).with_description(&format!(
            "Network stack for {project} ({stage_id}): VPC, security baseline, endpoints and flow logs"
        ));

        let (vpc, security, endpoints, flow_logs) = {
            let mut root = stack.root();

            let vpc = VpcCore::new(&mut root, "VpcCore", &VpcCoreProps::new(project, stage_id))?.vpc;
            let security = SecurityBaseline::new(
                &mut root,
                "SecurityBaseline",
                &SecurityBaselineProps {
                    project: project.to_string(),
                    stage: stage_id.to_string(),
                    vpc: &vpc,
                },
            )?;
            let endpoints = VpcEndpoints::new(
                &mut root,
                "VpcEndpoints",
                &VpcEndpointsProps {
                    project: project.to_string(),
                    stage,
                    vpc: &vpc,
                    enable_optional_endpoints: props.enable_optional_endpoints,
                    endpoint_security_group: Some(&security.vpce_sg),
                },
            )?;
            let flow_logs = FlowLogs::new(
                &mut root,
                "FlowLogs",
                &FlowLogsProps {
                    project: project.to_string(),
                    stage: stage_id.to_string(),
                    vpc: &vpc,
                },
            )?;
            (vpc, security, endpoints, flow_logs)
        };

        stack.add_tag("Project", project);
        stack.add_tag("Environment", stage_id);
        stack.add_tag("Owner", TAG_OWNER);
        stack.add_tag("CostCenter", TAG_COST_CENTER);

        stack.add_suppression(SuppressionRecord::stack(
            VPC7,
            "Flow Logs are configured via L2 construct and delivered to CloudWatch Logs with KMS.",
        ));
        stack.add_suppression(SuppressionRecord::path(
            VPC7,
            &vpc.path,
            "Flow Logs are configured for the VPC; suppress false positive for VPC7.",
        ));

        let network = Self {
            stack,
            stage,
            vpc,
            security,
            endpoints,
            flow_logs,
        };
        network.validate()?;

        tracing::info!("[network] built {}", network.stack.name());

        Ok(network)
    }

    pub fn name(&self) -> &str {
        self.stack.name()
    }

    /// Re-checks every unit's invariants on the finished graph.
    pub fn validate(&self) -> Result<(), StackError> {
        self.vpc.validate()?;
        self.security.policy.validate()?;
        self.endpoints.validate()?;
        self.flow_logs.config.validate()?;
        Ok(())
    }

    pub fn synth(&self) -> Result<Template, StackError> {
        self.stack.synth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SuppressionScope;

    #[test]
    fn test_stack_name() {
        let stage = resolve("dev").unwrap();
        assert_eq!(NetworkStack::stack_name("myapp", stage), "myapp-dev-an1-network");
    }

    #[test]
    fn test_build_dev() {
        let network = NetworkStack::build(&NetworkStackProps::default()).unwrap();
        assert_eq!(network.name(), "myapp-dev-an1-network");
        assert_eq!(network.vpc.path, "myapp-dev-an1-network/VpcCore/MyappVpc/Resource");

        let tags = network.stack.tags();
        assert_eq!(tags["Project"], "myapp");
        assert_eq!(tags["Environment"], "dev");
        assert_eq!(tags["Owner"], "JP-Solution");
        assert_eq!(tags["CostCenter"], "SOL-12345678");

        let vpc7: Vec<&SuppressionScope> = network
            .stack
            .suppressions()
            .iter()
            .filter(|s| s.rule_id == VPC7)
            .map(|s| &s.scope)
            .collect();
        assert_eq!(
            vpc7,
            vec![
                &SuppressionScope::Stack,
                &SuppressionScope::Path(network.vpc.path.clone())
            ]
        );
    }

    #[test]
    fn test_endpoints_reuse_baseline_group() {
        let network = NetworkStack::build(&NetworkStackProps::default()).unwrap();
        assert_eq!(network.endpoints.security_group, network.security.vpce_sg);
    }

    #[test]
    fn test_alias_resolves_to_canonical_stage() {
        let network = NetworkStack::build(&NetworkStackProps::new("myapp", "sandbox")).unwrap();
        assert_eq!(network.stage.stage_id, "sbx");
        assert_eq!(network.name(), "myapp-sbx-an1-network");
        assert_eq!(network.flow_logs.config.log_group_name, "myapp-sbx-network-logs");
    }

    #[test]
    fn test_unknown_stage() {
        let result = NetworkStack::build(&NetworkStackProps::new("myapp", "qa"));
        assert!(matches!(result, Err(StackError::UnknownStage(stage)) if stage == "qa"));
    }

    #[test]
    fn test_invalid_props() {
        for (project, stage) in [("", "dev"), ("MyApp", "dev"), ("my_app", "dev"), ("myapp-", "dev"), ("myapp", "")] {
            let result = NetworkStack::build(&NetworkStackProps::new(project, stage));
            assert!(
                matches!(result, Err(StackError::ValidationError(_))),
                "{project:?}/{stage:?} should be rejected"
            );
        }
        let long = "a".repeat(33);
        assert!(NetworkStack::build(&NetworkStackProps::new(&long, "dev")).is_err());
    }
}
