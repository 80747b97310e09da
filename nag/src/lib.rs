// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! # Nag Checks
//!
//! Static compliance checks over a synthesized CloudFormation template.
//!
//! A [`NagPack`] is a list of rules. Each rule inspects resources of the types
//! it cares about and reports a finding per non-compliant resource, or per
//! offending value for granular rules such as `AwsSolutions-IAM5`. Findings
//! are then matched against the suppressions recorded in the template:
//!
//! - `Metadata.cdk_nag.rules_to_suppress` on the template (stack-wide)
//! - `Metadata.cdk_nag.rules_to_suppress` on a resource
//!
//! A suppression with `applies_to` silences only findings whose data is listed.
//! CloudFormation intrinsics in finding data render as placeholders
//! (`{"Ref": "AWS::Region"}` becomes `<AWS::Region>`, `Fn::GetAtt` becomes
//! `<Logical.Attribute>`).
//!
//! ## Usage
//!
//! ```no_run
//! let template: serde_json::Value = serde_json::from_str("{\"Resources\": {}}").unwrap();
//! let report = nag_checks::NagPack::aws_solutions().check(&template).unwrap();
//! assert!(report.unresolved_errors().is_empty());
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

pub const METADATA_KEY: &str = "cdk_nag";
pub const PATH_METADATA_KEY: &str = "aws:cdk:path";
/// Suppressions with shorter reasons are rejected
pub const MIN_REASON_LENGTH: usize = 10;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum NagError {
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
    #[error("invalid suppression: {0}")]
    InvalidSuppression(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum NagLevel {
    Warning,
    Error,
}

/// One rule evaluated against one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub rule_id: String,
    pub level: NagLevel,
    pub logical_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Offending value for granular rules, e.g. `Resource::*`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Reason of the suppression that silenced this finding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppressed: Option<String>,
}

impl Finding {
    pub fn is_suppressed(&self) -> bool {
        self.suppressed.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NagReport {
    pub findings: Vec<Finding>,
}

impl NagReport {
    pub fn unresolved_errors(&self) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.level == NagLevel::Error && !f.is_suppressed())
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.level == NagLevel::Warning && !f.is_suppressed())
            .collect()
    }

    pub fn suppressed(&self) -> Vec<&Finding> {
        self.findings.iter().filter(|f| f.is_suppressed()).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.unresolved_errors().is_empty()
    }
}

/// Outcome of a rule on one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compliance {
    Compliant,
    NonCompliant,
    /// Granular result, one entry per offending value
    NonCompliantData(Vec<String>),
}

pub type Check = fn(&str, &Value, &Template<'_>) -> Compliance;

pub struct NagRule {
    pub id: &'static str,
    pub level: NagLevel,
    pub info: &'static str,
    pub resource_types: &'static [&'static str],
    check: Check,
}

impl NagRule {
    pub const fn new(
        id: &'static str,
        level: NagLevel,
        info: &'static str,
        resource_types: &'static [&'static str],
        check: Check,
    ) -> Self {
        Self {
            id,
            level,
            info,
            resource_types,
            check,
        }
    }
}

/// Read-only view of a template's resources.
pub struct Template<'a> {
    resources: &'a serde_json::Map<String, Value>,
}

impl<'a> Template<'a> {
    pub fn resources_of_type(&self, resource_type: &'a str) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.resources
            .iter()
            .filter(move |(_, r)| r["Type"] == resource_type)
    }
}

pub struct NagPack {
    pub name: &'static str,
    rules: Vec<NagRule>,
}

impl NagPack {
    pub fn new(name: &'static str, rules: Vec<NagRule>) -> Self {
        Self { name, rules }
    }

    pub fn rules(&self) -> &[NagRule] {
        &self.rules
    }

    /// The subset of the AWS Solutions pack that applies to network stacks.
    pub fn aws_solutions() -> Self {
        Self::new(
            "AwsSolutions",
            vec![
                NagRule::new(
                    "AwsSolutions-VPC7",
                    NagLevel::Error,
                    "The VPC does not have an associated Flow Log.",
                    &["AWS::EC2::VPC"],
                    rules::vpc_flow_logs_enabled,
                ),
                NagRule::new(
                    "AwsSolutions-VPC3",
                    NagLevel::Warning,
                    "A Network ACL or Network ACL entry has been implemented.",
                    &["AWS::EC2::NetworkAcl", "AWS::EC2::NetworkAclEntry"],
                    rules::no_network_acls,
                ),
                NagRule::new(
                    "AwsSolutions-EC23",
                    NagLevel::Error,
                    "The Security Group allows for 0.0.0.0/0 or ::/0 inbound access.",
                    &["AWS::EC2::SecurityGroup", "AWS::EC2::SecurityGroupIngress"],
                    rules::restricted_inbound,
                ),
                NagRule::new(
                    "AwsSolutions-IAM5",
                    NagLevel::Error,
                    "The IAM entity contains wildcard permissions.",
                    &["AWS::IAM::Policy", "AWS::IAM::ManagedPolicy", "AWS::IAM::Role"],
                    rules::no_wildcard_permissions,
                ),
                NagRule::new(
                    "AwsSolutions-KMS5",
                    NagLevel::Error,
                    "The KMS Symmetric key does not have automatic key rotation enabled.",
                    &["AWS::KMS::Key"],
                    rules::key_rotation_enabled,
                ),
            ],
        )
    }

    /// Evaluates every rule and applies the template's suppressions.
    pub fn check(&self, template: &Value) -> Result<NagReport, NagError> {
        let resources = template
            .get("Resources")
            .and_then(Value::as_object)
            .ok_or_else(|| NagError::InvalidTemplate("missing Resources".to_string()))?;
        let view = Template { resources };

        let stack_suppressions = read_suppressions(template.get("Metadata"), "template")?;
        let mut findings = Vec::new();

        for (logical_id, resource) in resources {
            let resource_type = resource["Type"]
                .as_str()
                .ok_or_else(|| NagError::InvalidTemplate(format!("{logical_id} has no Type")))?;
            let resource_suppressions = read_suppressions(resource.get("Metadata"), logical_id)?;
            let path = resource["Metadata"][PATH_METADATA_KEY]
                .as_str()
                .map(str::to_string);

            for rule in self.rules.iter().filter(|r| r.resource_types.contains(&resource_type)) {
                let data: Vec<Option<String>> = match (rule.check)(logical_id, resource, &view) {
                    Compliance::Compliant => continue,
                    Compliance::NonCompliant => vec![None],
                    Compliance::NonCompliantData(values) => values.into_iter().map(Some).collect(),
                };

                for data in data {
                    let suppressed = resource_suppressions
                        .iter()
                        .chain(stack_suppressions.iter())
                        .find(|s| s.matches(rule.id, data.as_deref()))
                        .map(|s| s.reason.clone());

                    match &suppressed {
                        Some(reason) => tracing::warn!(
                            "[nag] {} suppressed on {}: {}",
                            rule.id,
                            logical_id,
                            reason
                        ),
                        None => tracing::info!(
                            "[nag] {:?} {} on {}: {}",
                            rule.level,
                            rule.id,
                            logical_id,
                            rule.info
                        ),
                    }

                    findings.push(Finding {
                        rule_id: rule.id.to_string(),
                        level: rule.level,
                        logical_id: logical_id.clone(),
                        path: path.clone(),
                        data,
                        suppressed,
                    });
                }
            }
        }

        Ok(NagReport { findings })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Suppression {
    id: String,
    reason: String,
    applies_to: Vec<String>,
}

impl Suppression {
    fn matches(&self, rule_id: &str, data: Option<&str>) -> bool {
        if self.id != rule_id {
            return false;
        }
        match data {
            Some(data) if !self.applies_to.is_empty() => self.applies_to.iter().any(|a| a == data),
            _ => true,
        }
    }
}

fn read_suppressions(metadata: Option<&Value>, owner: &str) -> Result<Vec<Suppression>, NagError> {
    let Some(entries) = metadata
        .and_then(|m| m.get(METADATA_KEY))
        .and_then(|n| n.get("rules_to_suppress"))
    else {
        return Ok(Vec::new());
    };
    let entries = entries.as_array().ok_or_else(|| {
        NagError::InvalidSuppression(format!("{owner}: rules_to_suppress must be a list"))
    })?;

    entries
        .iter()
        .map(|entry| {
            let id = entry["id"].as_str().ok_or_else(|| {
                NagError::InvalidSuppression(format!("{owner}: suppression without id"))
            })?;
            let reason = entry["reason"].as_str().unwrap_or_default();
            if reason.len() < MIN_REASON_LENGTH {
                return Err(NagError::InvalidSuppression(format!(
                    "{owner}: reason for {id} must be at least {MIN_REASON_LENGTH} characters"
                )));
            }
            let applies_to = match entry.get("applies_to") {
                None => Vec::new(),
                Some(Value::Array(values)) => values
                    .iter()
                    .map(|v| {
                        v.as_str().map(str::to_string).ok_or_else(|| {
                            NagError::InvalidSuppression(format!(
                                "{owner}: applies_to of {id} must list strings"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Some(_) => {
                    return Err(NagError::InvalidSuppression(format!(
                        "{owner}: applies_to of {id} must be a list"
                    )));
                }
            };
            Ok(Suppression {
                id: id.to_string(),
                reason: reason.to_string(),
                applies_to,
            })
        })
        .collect()
}

/// Renders a value the way findings report it; intrinsics become placeholders.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(Value::String(name)) = map.get("Ref") {
                format!("<{name}>")
            } else if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                let parts: Vec<String> = parts.iter().map(render).collect();
                format!("<{}>", parts.join("."))
            } else if let Some(Value::String(template)) = map.get("Fn::Sub") {
                template.replace("${", "<").replace('}', ">")
            } else if let Some(Value::Array(join)) = map.get("Fn::Join")
                && let [Value::String(delimiter), Value::Array(parts)] = join.as_slice()
            {
                parts.iter().map(render).collect::<Vec<_>>().join(delimiter.as_str())
            } else {
                value.to_string()
            }
        }
        other => other.to_string(),
    }
}

mod rules {
    use super::*;

    pub(super) fn vpc_flow_logs_enabled(logical_id: &str, _: &Value, template: &Template<'_>) -> Compliance {
        let covered = template
            .resources_of_type("AWS::EC2::FlowLog")
            .any(|(_, flow_log)| {
                flow_log["Properties"]["ResourceId"] == serde_json::json!({"Ref": logical_id})
            });
        if covered {
            Compliance::Compliant
        } else {
            Compliance::NonCompliant
        }
    }

    pub(super) fn no_network_acls(_: &str, _: &Value, _: &Template<'_>) -> Compliance {
        Compliance::NonCompliant
    }

    fn is_open(rule: &Value) -> bool {
        rule["CidrIp"] == "0.0.0.0/0" || rule["CidrIpv6"] == "::/0"
    }

    pub(super) fn restricted_inbound(_: &str, resource: &Value, _: &Template<'_>) -> Compliance {
        let properties = &resource["Properties"];
        let open = match resource["Type"].as_str() {
            Some("AWS::EC2::SecurityGroup") => properties["SecurityGroupIngress"]
                .as_array()
                .is_some_and(|rules| rules.iter().any(is_open)),
            _ => is_open(properties),
        };
        if open {
            Compliance::NonCompliant
        } else {
            Compliance::Compliant
        }
    }

    fn as_list(value: &Value) -> Vec<&Value> {
        match value {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            single => vec![single],
        }
    }

    fn wildcard_findings(document: &Value, findings: &mut Vec<String>) {
        for statement in as_list(&document["Statement"]) {
            if statement["Effect"] != "Allow" {
                continue;
            }
            for action in as_list(&statement["Action"]) {
                let action = render(action);
                if action.contains('*') {
                    findings.push(format!("Action::{action}"));
                }
            }
            for resource in as_list(&statement["Resource"]) {
                let resource = render(resource);
                if resource.contains('*') {
                    findings.push(format!("Resource::{resource}"));
                }
            }
        }
    }

    pub(super) fn no_wildcard_permissions(_: &str, resource: &Value, _: &Template<'_>) -> Compliance {
        let properties = &resource["Properties"];
        let mut findings = Vec::new();
        match resource["Type"].as_str() {
            Some("AWS::IAM::Role") => {
                for policy in as_list(&properties["Policies"]) {
                    wildcard_findings(&policy["PolicyDocument"], &mut findings);
                }
            }
            _ => wildcard_findings(&properties["PolicyDocument"], &mut findings),
        }
        findings.dedup();
        if findings.is_empty() {
            Compliance::Compliant
        } else {
            Compliance::NonCompliantData(findings)
        }
    }

    pub(super) fn key_rotation_enabled(_: &str, resource: &Value, _: &Template<'_>) -> Compliance {
        let properties = &resource["Properties"];
        let symmetric = properties["KeySpec"]
            .as_str()
            .is_none_or(|spec| spec == "SYMMETRIC_DEFAULT");
        if !symmetric || properties["EnableKeyRotation"] == true {
            Compliance::Compliant
        } else {
            Compliance::NonCompliant
        }
    }
}

/// Counts findings per rule, for summaries.
pub fn summarize(report: &NagReport) -> BTreeMap<String, usize> {
    let mut summary = BTreeMap::new();
    for finding in report.findings.iter().filter(|f| !f.is_suppressed()) {
        *summary.entry(finding.rule_id.clone()).or_insert(0) += 1;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn template(resources: Value) -> Value {
        json!({"Resources": resources})
    }

    #[test]
    fn test_vpc_without_flow_log_is_an_error() {
        let report = NagPack::aws_solutions()
            .check(&template(json!({"Vpc": {"Type": "AWS::EC2::VPC", "Properties": {}}})))
            .unwrap();
        let errors = report.unresolved_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule_id, "AwsSolutions-VPC7");
        assert_eq!(errors[0].logical_id, "Vpc");
    }

    #[test]
    fn test_vpc_with_flow_log_is_compliant() {
        let report = NagPack::aws_solutions()
            .check(&template(json!({
                "Vpc": {"Type": "AWS::EC2::VPC", "Properties": {}},
                "Log": {"Type": "AWS::EC2::FlowLog", "Properties": {"ResourceId": {"Ref": "Vpc"}}},
            })))
            .unwrap();
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_nacl_is_a_warning_only() {
        let report = NagPack::aws_solutions()
            .check(&template(json!({"Acl": {"Type": "AWS::EC2::NetworkAcl", "Properties": {}}})))
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn test_open_ingress() {
        let report = NagPack::aws_solutions()
            .check(&template(json!({
                "Open": {"Type": "AWS::EC2::SecurityGroup", "Properties": {
                    "SecurityGroupIngress": [{"CidrIp": "0.0.0.0/0", "FromPort": 443}],
                    "SecurityGroupEgress": [{"CidrIp": "0.0.0.0/0", "IpProtocol": "-1"}],
                }},
                "Closed": {"Type": "AWS::EC2::SecurityGroup", "Properties": {
                    "SecurityGroupIngress": [{"CidrIp": "10.16.0.0/12", "FromPort": 443}],
                    "SecurityGroupEgress": [{"CidrIp": "0.0.0.0/0", "IpProtocol": "-1"}],
                }},
                "Standalone": {"Type": "AWS::EC2::SecurityGroupIngress", "Properties": {"CidrIpv6": "::/0"}},
            })))
            .unwrap();
        let ids: Vec<&str> = report
            .unresolved_errors()
            .iter()
            .map(|f| f.logical_id.as_str())
            .collect();
        assert_eq!(ids, vec!["Open", "Standalone"]);
    }

    #[test]
    fn test_wildcards_are_reported_per_value() {
        let report = NagPack::aws_solutions()
            .check(&template(json!({"Policy": {"Type": "AWS::IAM::Policy", "Properties": {
                "PolicyDocument": {"Statement": [{
                    "Effect": "Allow",
                    "Action": ["logs:*", "logs:PutLogEvents"],
                    "Resource": {"Fn::Sub": "arn:${AWS::Partition}:logs:${AWS::Region}:${AWS::AccountId}:log-group:g:log-stream:*"},
                }]}
            }}})))
            .unwrap();
        let data: Vec<&str> = report
            .findings
            .iter()
            .filter_map(|f| f.data.as_deref())
            .collect();
        assert_eq!(
            data,
            vec![
                "Action::logs:*",
                "Resource::arn:<AWS::Partition>:logs:<AWS::Region>:<AWS::AccountId>:log-group:g:log-stream:*",
            ]
        );
    }

    #[test]
    fn test_applies_to_limits_suppression() {
        let report = NagPack::aws_solutions()
            .check(&template(json!({"Policy": {
                "Type": "AWS::IAM::Policy",
                "Properties": {"PolicyDocument": {"Statement": [{
                    "Effect": "Allow",
                    "Action": "s3:*",
                    "Resource": ["arn:aws:s3:::bucket/*"],
                }]}},
                "Metadata": {"cdk_nag": {"rules_to_suppress": [{
                    "id": "AwsSolutions-IAM5",
                    "reason": "objects of one bucket only",
                    "applies_to": ["Resource::arn:aws:s3:::bucket/*"],
                }]}},
            }})))
            .unwrap();
        assert_eq!(report.suppressed().len(), 1);
        let errors = report.unresolved_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].data.as_deref(), Some("Action::s3:*"));
    }

    #[test]
    fn test_stack_suppression_applies_to_every_resource() {
        let value = json!({
            "Metadata": {"cdk_nag": {"rules_to_suppress": [{
                "id": "AwsSolutions-VPC7",
                "reason": "flow logs are attached elsewhere",
            }]}},
            "Resources": {
                "A": {"Type": "AWS::EC2::VPC", "Properties": {}},
                "B": {"Type": "AWS::EC2::VPC", "Properties": {}},
            },
        });
        let report = NagPack::aws_solutions().check(&value).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.suppressed().len(), 2);
    }

    #[test]
    fn test_short_reason_is_rejected() {
        let value = json!({
            "Metadata": {"cdk_nag": {"rules_to_suppress": [{"id": "AwsSolutions-VPC7", "reason": "ok"}]}},
            "Resources": {},
        });
        assert!(matches!(
            NagPack::aws_solutions().check(&value),
            Err(NagError::InvalidSuppression(_))
        ));
    }

    #[test]
    fn test_missing_resources() {
        assert_eq!(
            NagPack::aws_solutions().check(&json!({})).unwrap_err(),
            NagError::InvalidTemplate("missing Resources".to_string())
        );
    }

    #[test]
    fn test_key_rotation() {
        let report = NagPack::aws_solutions()
            .check(&template(json!({
                "Rotated": {"Type": "AWS::KMS::Key", "Properties": {"EnableKeyRotation": true}},
                "Static": {"Type": "AWS::KMS::Key", "Properties": {}},
                "Asymmetric": {"Type": "AWS::KMS::Key", "Properties": {"KeySpec": "RSA_2048"}},
            })))
            .unwrap();
        let ids: Vec<&str> = report
            .unresolved_errors()
            .iter()
            .map(|f| f.logical_id.as_str())
            .collect();
        assert_eq!(ids, vec!["Static"]);
        assert_eq!(summarize(&report)["AwsSolutions-KMS5"], 1);
    }

    #[test]
    fn test_render_intrinsics() {
        assert_eq!(render(&json!({"Ref": "AWS::Region"})), "<AWS::Region>");
        assert_eq!(render(&json!({"Fn::GetAtt": ["Group", "Arn"]})), "<Group.Arn>");
        assert_eq!(
            render(&json!({"Fn::Join": ["", ["arn:", {"Ref": "AWS::Partition"}, ":s3:::b/*"]]})),
            "arn:<AWS::Partition>:s3:::b/*"
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_sub_without_variables_renders_verbatim(s in "[a-z0-9:/*-]{0,40}") {
            prop_assert_eq!(render(&json!({"Fn::Sub": s.clone()})), s);
        }
    }
}
