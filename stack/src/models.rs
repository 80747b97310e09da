// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use serde::Serialize;
use serde_json::{Value, json};

/// What a suppression silences: the whole stack or the resource at one construct path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SuppressionScope {
    Stack,
    Path(String),
}

/// A declared, justified exception to a compliance finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppressionRecord {
    pub rule_id: String,
    pub scope: SuppressionScope,
    pub reason: String,
    /// Finding data the suppression is limited to; empty means every finding of the rule.
    pub applies_to: Vec<String>,
}

impl SuppressionRecord {
    pub fn stack(rule_id: &str, reason: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            scope: SuppressionScope::Stack,
            reason: reason.to_string(),
            applies_to: Vec::new(),
        }
    }

    pub fn path(rule_id: &str, path: &str, reason: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            scope: SuppressionScope::Path(path.to_string()),
            reason: reason.to_string(),
            applies_to: Vec::new(),
        }
    }

    pub fn applies_to(mut self, finding: &str) -> Self {
        self.applies_to.push(finding.to_string());
        self
    }

    /// Entry in the `rules_to_suppress` list read by the checks crate.
    pub fn to_metadata(&self) -> Value {
        let mut entry = json!({
            "id": self.rule_id,
            "reason": self.reason,
        });
        if !self.applies_to.is_empty() {
            entry["applies_to"] = json!(self.applies_to);
        }
        entry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemovalPolicy {
    Retain,
    Delete,
}
