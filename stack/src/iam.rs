// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! IAM policy documents.
//!
//! Statements serialize to the JSON shape IAM expects. Conditions are kept in
//! ordered maps so documents render identically on every synth.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Value, json};

use crate::constants::IAM_POLICY_VERSION;
use crate::template::{join, reference};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Anyone; must be narrowed with conditions
    Any,
    Service(String),
    /// Service principal of the deployment region, `<prefix>.<region>.amazonaws.com`
    RegionalService(String),
    /// Every identity of the deploying account
    AccountRoot,
}

impl Principal {
    fn to_value(&self) -> Value {
        match self {
            Principal::Any => json!({"AWS": "*"}),
            Principal::Service(service) => json!({"Service": service}),
            Principal::RegionalService(prefix) => json!({"Service": regional_service(prefix)}),
            Principal::AccountRoot => json!({
                "AWS": {"Fn::Sub": "arn:${AWS::Partition}:iam::${AWS::AccountId}:root"}
            }),
        }
    }
}

/// `<prefix>.<region>.amazonaws.com` for the deployment region.
pub fn regional_service(prefix: &str) -> Value {
    join(vec![
        json!(format!("{prefix}.")),
        reference("AWS::Region"),
        json!(".amazonaws.com"),
    ])
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicyStatement {
    pub sid: Option<String>,
    pub effect: Option<Effect>,
    pub principals: Vec<Principal>,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
    /// operator -> condition key -> value
    pub conditions: BTreeMap<String, BTreeMap<String, Value>>,
}

impl PolicyStatement {
    pub fn allow() -> Self {
        Self {
            effect: Some(Effect::Allow),
            ..Default::default()
        }
    }

    pub fn sid(mut self, sid: &str) -> Self {
        self.sid = Some(sid.to_string());
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principals.push(principal);
        self
    }

    pub fn actions(mut self, actions: &[&str]) -> Self {
        self.actions.extend(actions.iter().map(|a| a.to_string()));
        self
    }

    pub fn resource(mut self, resource: Value) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn condition(mut self, operator: &str, key: &str, value: Value) -> Self {
        self.conditions
            .entry(operator.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self
    }

    pub fn has_condition(&self, operator: &str, key: &str) -> bool {
        self.conditions
            .get(operator)
            .is_some_and(|keys| keys.contains_key(key))
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    /// Resources rendered as plain strings (`Fn::Sub` templates are unwrapped).
    pub fn resource_strings(&self) -> Vec<String> {
        self.resources
            .iter()
            .filter_map(|r| match r {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("Fn::Sub").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect()
    }
}

/// Single-element lists collapse to a scalar, as IAM renders them.
fn collapse<T: Serialize>(items: &[T]) -> Value {
    match items {
        [single] => json!(single),
        many => json!(many),
    }
}

impl Serialize for PolicyStatement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.actions.is_empty() {
            map.serialize_entry("Action", &collapse(&self.actions))?;
        }
        if !self.conditions.is_empty() {
            map.serialize_entry("Condition", &self.conditions)?;
        }
        map.serialize_entry("Effect", &self.effect.unwrap_or(Effect::Allow))?;
        if !self.principals.is_empty() {
            let principals: Vec<Value> = self.principals.iter().map(Principal::to_value).collect();
            let merged = principals
                .into_iter()
                .fold(serde_json::Map::new(), |mut acc, p| {
                    if let Value::Object(entries) = p {
                        acc.extend(entries);
                    }
                    acc
                });
            map.serialize_entry("Principal", &merged)?;
        }
        if !self.resources.is_empty() {
            map.serialize_entry("Resource", &collapse(&self.resources))?;
        }
        if let Some(sid) = &self.sid {
            map.serialize_entry("Sid", sid)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self { statements }
    }

    pub fn add_statement(&mut self, statement: PolicyStatement) {
        self.statements.push(statement);
    }

    pub fn statement(&self, sid: &str) -> Option<&PolicyStatement> {
        self.statements
            .iter()
            .find(|s| s.sid.as_deref() == Some(sid))
    }

    pub fn to_value(&self) -> Value {
        json!({
            "Statement": self.statements,
            "Version": IAM_POLICY_VERSION,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_collapses_single_values() {
        let statement = PolicyStatement::allow()
            .principal(Principal::Service("logs.amazonaws.com".to_string()))
            .actions(&["kms:DescribeKey"])
            .resource(json!("*"));
        assert_eq!(
            json!(statement),
            json!({
                "Action": "kms:DescribeKey",
                "Effect": "Allow",
                "Principal": {"Service": "logs.amazonaws.com"},
                "Resource": "*",
            })
        );
    }

    #[test]
    fn test_statement_with_conditions_and_sid() {
        let statement = PolicyStatement::allow()
            .sid("Scoped")
            .principal(Principal::Any)
            .actions(&["s3:GetObject", "s3:PutObject"])
            .resource(json!("arn:aws:s3:::bucket/*"))
            .condition("StringEquals", "aws:PrincipalAccount", json!("222222222222"));
        let value = json!(statement);
        assert_eq!(value["Action"], json!(["s3:GetObject", "s3:PutObject"]));
        assert_eq!(value["Principal"], json!({"AWS": "*"}));
        assert_eq!(
            value["Condition"],
            json!({"StringEquals": {"aws:PrincipalAccount": "222222222222"}})
        );
        assert_eq!(value["Sid"], "Scoped");
        assert!(statement.has_condition("StringEquals", "aws:PrincipalAccount"));
        assert!(!statement.has_condition("StringLike", "aws:PrincipalAccount"));
    }

    #[test]
    fn test_regional_service_principal() {
        let statement = PolicyStatement::allow()
            .principal(Principal::RegionalService("logs".to_string()))
            .actions(&["kms:Decrypt"]);
        assert_eq!(
            json!(statement)["Principal"],
            json!({"Service": {"Fn::Join": ["", ["logs.", {"Ref": "AWS::Region"}, ".amazonaws.com"]]}})
        );
    }

    #[test]
    fn test_resource_strings_unwraps_sub() {
        let statement = PolicyStatement::allow()
            .resource(json!("*"))
            .resource(json!({"Fn::Sub": "arn:${AWS::Partition}:logs:x"}))
            .resource(json!({"Fn::GetAtt": ["A", "Arn"]}));
        assert_eq!(
            statement.resource_strings(),
            vec!["*".to_string(), "arn:${AWS::Partition}:logs:x".to_string()]
        );
    }

    #[test]
    fn test_document_shape() {
        let document = PolicyDocument::new(vec![PolicyStatement::allow().sid("A")]);
        let value = document.to_value();
        assert_eq!(value["Version"], "2012-10-17");
        assert_eq!(value["Statement"][0]["Sid"], "A");
        assert!(document.statement("A").is_some());
        assert!(document.statement("B").is_none());
    }
}
