// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Stage registry.
//!
//! A static table mapping each deployment stage to the account and region it
//! deploys into, plus the region short codes used in resource names. Stacks and
//! constructs read environment values from here only.

use serde::Serialize;

use crate::constants::{DEFAULT_STAGE, SANDBOX_STAGE};
use crate::errors::StackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageConfig {
    pub stage_id: &'static str,
    pub account_id: &'static str,
    pub region_id: &'static str,
}

impl StageConfig {
    /// Optional VPC endpoints are off in the sandbox unless explicitly enabled.
    pub fn is_sandbox(&self) -> bool {
        self.stage_id == SANDBOX_STAGE
    }
}

pub static STAGES: [StageConfig; 4] = [
    StageConfig {
        stage_id: "sbx",
        account_id: "111111111111",
        region_id: "ap-northeast-1",
    },
    StageConfig {
        stage_id: "dev",
        account_id: "222222222222",
        region_id: "ap-northeast-1",
    },
    StageConfig {
        stage_id: "stg",
        account_id: "333333333333",
        region_id: "ap-northeast-1",
    },
    StageConfig {
        stage_id: "prod",
        account_id: "444444444444",
        region_id: "ap-northeast-1",
    },
];

const STAGE_ALIASES: [(&str, &str); 1] = [("sandbox", "sbx")];

/// Looks up a stage by id (or alias).
pub fn resolve(stage_id: &str) -> Result<&'static StageConfig, StackError> {
    let canonical = STAGE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == stage_id)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(stage_id);

    STAGES
        .iter()
        .find(|stage| stage.stage_id == canonical)
        .ok_or_else(|| StackError::UnknownStage(stage_id.to_string()))
}

/// Picks the stage id: explicit override, then the environment, then the default.
pub fn select_stage<'a>(explicit: Option<&'a str>, from_env: Option<&'a str>) -> &'a str {
    explicit
        .filter(|s| !s.is_empty())
        .or(from_env.filter(|s| !s.is_empty()))
        .unwrap_or(DEFAULT_STAGE)
}

/// Three character region mnemonic used in resource names.
pub fn short_region(region_id: &str) -> String {
    let known = match region_id {
        "ap-northeast-1" => Some("an1"),
        "ap-northeast-2" => Some("an2"),
        "ap-northeast-3" => Some("an3"),
        "ap-southeast-1" => Some("as1"),
        "ap-southeast-2" => Some("as2"),
        "us-east-1" => Some("ue1"),
        "us-east-2" => Some("ue2"),
        "us-west-2" => Some("uw2"),
        "eu-west-1" => Some("ew1"),
        "eu-central-1" => Some("ec1"),
        _ => None,
    };

    match known {
        Some(code) => code.to_string(),
        None => region_id
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .take(3)
            .collect(),
    }
}

/// `<project>-<stage>-<regionShortCode>-<component>`
pub fn resource_name(project: &str, stage: &StageConfig, component: &str) -> String {
    format!(
        "{}-{}-{}-{}",
        project,
        stage.stage_id,
        short_region(stage.region_id),
        component
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_resolve_known_stages() {
        for stage_id in ["sbx", "dev", "stg", "prod"] {
            let stage = resolve(stage_id).unwrap();
            assert_eq!(stage.stage_id, stage_id);
            assert!(!stage.account_id.is_empty());
            assert!(!stage.region_id.is_empty());
        }
    }

    #[test]
    fn test_resolve_alias() {
        let stage = resolve("sandbox").unwrap();
        assert_eq!(stage.stage_id, "sbx");
        assert!(stage.is_sandbox());
    }

    #[test]
    fn test_resolve_unknown_stage() {
        assert_eq!(
            resolve("qa"),
            Err(StackError::UnknownStage("qa".to_string()))
        );
        assert!(resolve("").is_err());
        assert!(resolve("DEV").is_err());
    }

    #[test]
    fn test_select_stage_priority() {
        assert_eq!(select_stage(Some("prod"), Some("stg")), "prod");
        assert_eq!(select_stage(None, Some("stg")), "stg");
        assert_eq!(select_stage(None, None), "dev");
        assert_eq!(select_stage(Some(""), Some("stg")), "stg");
        assert_eq!(select_stage(None, Some("")), "dev");
    }

    #[test]
    fn test_short_region_known() {
        assert_eq!(short_region("ap-northeast-1"), "an1");
        assert_eq!(short_region("ap-northeast-3"), "an3");
    }

    #[test]
    fn test_short_region_fallback() {
        assert_eq!(short_region("sa-east-1"), "sae");
        assert_eq!(short_region("X-1"), "1");
    }

    #[test]
    fn test_resource_name() {
        let dev = resolve("dev").unwrap();
        assert_eq!(resource_name("myapp", dev, "network"), "myapp-dev-an1-network");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_short_region_is_short_and_clean(region in "[a-zA-Z0-9-]{0,24}") {
            let code = short_region(&region);
            prop_assert!(code.chars().count() <= 3);
            prop_assert!(code.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
            prop_assert_eq!(short_region(&region), code);
        }
    }
}
