// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Observability unit: VPC flow logs.
//!
//! All traffic metadata is delivered to a retained CloudWatch log group that
//! is encrypted with a dedicated, rotating KMS key. The key policy and the
//! delivery role are both scoped to that single log group:
//!
//! * the logs service may use the key only under the log group's encryption
//!   context
//! * grants may only be created for AWS resources
//! * the account may use the key only through the logs service
//!
//! The delivery role writes to `<log group>:log-stream:*` and nothing wider.
//! That wildcard is unavoidable and is recorded as a scoped `IAM5`
//! suppression.

use serde_json::json;

use crate::constants::{FLOW_LOG_RETENTION_DAYS, FLOW_LOGS_SERVICE};
use crate::errors::StackError;
use crate::iam::{PolicyDocument, PolicyStatement, Principal, regional_service};
use crate::models::{RemovalPolicy, SuppressionRecord};
use crate::template::{CfnResource, Scope, get_att, reference, sub};
use crate::vpc::Vpc;

pub const LOG_STREAM_SUFFIX: &str = ":log-stream:*";
pub const ENCRYPTION_CONTEXT_KEY: &str = "kms:EncryptionContext:aws:logs:arn";

const KEY_USAGE_ACTIONS: [&str; 5] = [
    "kms:Encrypt*",
    "kms:Decrypt*",
    "kms:ReEncrypt*",
    "kms:GenerateDataKey*",
    "kms:Describe*",
];

/// Destination, retention, key and permissions of the traffic capture.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficCaptureConfig {
    pub log_group_name: String,
    pub retention_days: u32,
    /// Logical ID of the encryption key
    pub encryption_key: String,
    pub key_policy: PolicyDocument,
    pub delivery_policy: PolicyDocument,
}

impl TrafficCaptureConfig {
    pub fn new(project: &str, stage: &str) -> Self {
        let log_group_name = format!("{project}-{stage}-network-logs");
        let log_group_arn = log_group_arn_template(&log_group_name);

        let key_policy = PolicyDocument::new(vec![
            PolicyStatement::allow()
                .sid("AllowCloudWatchLogsUseOfKey")
                .principal(Principal::RegionalService("logs".to_string()))
                .actions(&KEY_USAGE_ACTIONS)
                .resource(json!("*"))
                .condition("ArnEquals", ENCRYPTION_CONTEXT_KEY, sub(&log_group_arn)),
            PolicyStatement::allow()
                .sid("AllowCloudWatchLogsGrants")
                .principal(Principal::RegionalService("logs".to_string()))
                .actions(&["kms:CreateGrant", "kms:DescribeKey"])
                .resource(json!("*"))
                .condition("Bool", "kms:GrantIsForAWSResource", json!("true")),
            PolicyStatement::allow()
                .sid("AllowAccountUseViaCloudWatchLogs")
                .principal(Principal::AccountRoot)
                .actions(&KEY_USAGE_ACTIONS)
                .resource(json!("*"))
                .condition("StringEquals", "kms:CallerAccount", reference("AWS::AccountId"))
                .condition("StringEquals", "kms:ViaService", regional_service("logs")),
        ]);

        let delivery_policy = PolicyDocument::new(vec![
            PolicyStatement::allow()
                .sid("LogGroupAccess")
                .actions(&["logs:CreateLogStream", "logs:DescribeLogStreams"])
                .resource(sub(&log_group_arn)),
            PolicyStatement::allow()
                .sid("LogStreamWrite")
                .actions(&["logs:PutLogEvents"])
                .resource(sub(&format!("{log_group_arn}{LOG_STREAM_SUFFIX}"))),
        ]);

        Self {
            log_group_name,
            retention_days: FLOW_LOG_RETENTION_DAYS,
            encryption_key: String::new(),
            key_policy,
            delivery_policy,
        }
    }

    pub fn log_group_arn(&self) -> String {
        log_group_arn_template(&self.log_group_name)
    }

    /// The only resource the delivery role may write events to.
    pub fn log_stream_arn(&self) -> String {
        format!("{}{LOG_STREAM_SUFFIX}", self.log_group_arn())
    }

    /// Rejects any delivery permission outside this log group and any key
    /// grant missing its scoping condition.
    pub fn validate(&self) -> Result<(), StackError> {
        let group_arn = self.log_group_arn();
        let stream_arn = self.log_stream_arn();

        for statement in &self.delivery_policy.statements {
            let resources = statement.resource_strings();
            if resources.len() != statement.resources.len() || resources.is_empty() {
                return Err(StackError::PolicyTooPermissive(
                    "delivery role statement must name explicit log group resources".to_string(),
                ));
            }
            for resource in &resources {
                let allowed = if statement.has_action("logs:PutLogEvents") {
                    *resource == stream_arn
                } else {
                    *resource == group_arn
                };
                if !allowed {
                    return Err(StackError::PolicyTooPermissive(format!(
                        "delivery role may not act on {resource}"
                    )));
                }
            }
        }

        for statement in &self.key_policy.statements {
            let grants_usage = statement.has_action("kms:Decrypt*") || statement.has_action("kms:Encrypt*");
            let grants_management = statement.has_action("kms:CreateGrant");
            let to_account = statement.principals.contains(&Principal::AccountRoot);

            let scoped = if grants_management {
                statement.has_condition("Bool", "kms:GrantIsForAWSResource")
            } else if grants_usage && to_account {
                statement.has_condition("StringEquals", "kms:ViaService")
            } else if grants_usage {
                statement
                    .conditions
                    .get("ArnEquals")
                    .and_then(|keys| keys.get(ENCRYPTION_CONTEXT_KEY))
                    == Some(&sub(&group_arn))
            } else {
                true
            };
            if !scoped {
                return Err(StackError::PolicyTooPermissive(format!(
                    "key policy statement {} lacks its scoping condition",
                    statement.sid.as_deref().unwrap_or("<unnamed>")
                )));
            }
        }

        Ok(())
    }
}

/// `Fn::Sub` template of a log group ARN in the deploying account and region.
pub fn log_group_arn_template(log_group_name: &str) -> String {
    format!("arn:${{AWS::Partition}}:logs:${{AWS::Region}}:${{AWS::AccountId}}:log-group:{log_group_name}")
}

pub struct FlowLogsProps<'a> {
    pub project: String,
    pub stage: String,
    pub vpc: &'a Vpc,
}

pub struct FlowLogs {
    pub config: TrafficCaptureConfig,
    pub log_group_id: String,
    pub role_id: String,
    pub policy_id: String,
    pub flow_log_id: String,
}

impl FlowLogs {
    #[tracing::instrument(skip(scope, props), fields(project = %props.project, stage = %props.stage))]
    pub fn new(scope: &mut Scope<'_>, id: &str, props: &FlowLogsProps<'_>) -> Result<Self, StackError> {
        let mut scope = scope.child(id);
        let mut config = TrafficCaptureConfig::new(&props.project, &props.stage);
        config.validate()?;

        let key_id = scope.child("FlowLogsKey").add(
            "Resource",
            CfnResource::new(
                "AWS::KMS::Key",
                json!({
                    "Description": format!("KMS key for {} VPC flow logs", config.log_group_name),
                    "EnableKeyRotation": true,
                    "KeyPolicy": config.key_policy.to_value(),
                }),
            )
            .removal_policy(RemovalPolicy::Retain),
        )?;
        config.encryption_key = key_id.clone();

        let log_group_id = scope.child("VpcFlowLogsGroup").add(
            "Resource",
            CfnResource::new(
                "AWS::Logs::LogGroup",
                json!({
                    "KmsKeyId": get_att(&key_id, "Arn"),
                    "LogGroupName": config.log_group_name,
                    "RetentionInDays": config.retention_days,
                }),
            )
            .removal_policy(RemovalPolicy::Retain),
        )?;

        let assume_role = PolicyDocument::new(vec![
            PolicyStatement::allow()
                .principal(Principal::Service(FLOW_LOGS_SERVICE.to_string()))
                .actions(&["sts:AssumeRole"])
                .condition("StringEquals", "aws:SourceAccount", reference("AWS::AccountId")),
        ]);

        let mut role_scope = scope.child("VpcFlowLogsRole");
        let role_id = role_scope.add_resource(
            "Resource",
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": assume_role.to_value(),
                "Description": "IAM role for VPC Flow Logs to publish to CloudWatch Logs",
            }),
        )?;

        let mut policy_scope = role_scope.child("DefaultPolicy");
        let policy_path = policy_scope.path_of("Resource");
        let policy_id = policy_scope.add_resource(
            "Resource",
            "AWS::IAM::Policy",
            json!({
                "PolicyDocument": config.delivery_policy.to_value(),
                "PolicyName": "VpcFlowLogsRoleDefaultPolicy",
                "Roles": [reference(&role_id)],
            }),
        )?;

        scope.add_suppression(
            SuppressionRecord::path(
                "AwsSolutions-IAM5",
                &policy_path,
                "Flow log delivery needs to create streams under its own log group only.",
            )
            .applies_to(&format!(
                "Resource::{}",
                nag_checks::render(&sub(&config.log_stream_arn()))
            )),
        );

        let flow_log_id = scope.add(
            "VpcAllFlowLogs",
            CfnResource::new(
                "AWS::EC2::FlowLog",
                json!({
                    "DeliverLogsPermissionArn": get_att(&role_id, "Arn"),
                    "LogDestinationType": "cloud-watch-logs",
                    "LogGroupName": reference(&log_group_id),
                    "ResourceId": reference(&props.vpc.vpc_id),
                    "ResourceType": "VPC",
                    "TrafficType": "ALL",
                }),
            )
            .depends_on(&policy_id)
            .depends_on(&role_id),
        )?;

        tracing::info!(
            "[flow-logs] capturing ALL traffic of {} into {}",
            props.vpc.vpc_id,
            config.log_group_name
        );

        Ok(Self {
            config,
            log_group_id,
            role_id,
            policy_id,
            flow_log_id,
        })
    }
}
