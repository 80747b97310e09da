// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::constants::PROJECT;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct SynthOptions {
    /// Deployment stage; falls back to CDK_STAGE, then dev
    #[arg(long)]
    pub stage: Option<String>,
    #[arg(long, default_value = PROJECT, env("NETWORK_PROJECT"))]
    pub project: String,
    /// Directory for `<stack>.template.json`; stdout when absent
    #[arg(long, env("NETWORK_OUTPUT_DIR"))]
    pub output_dir: Option<PathBuf>,
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "disable_optional_endpoints")]
    pub enable_optional_endpoints: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    pub disable_optional_endpoints: bool,
    #[arg(long, default_value = "false", env("NETWORK_SKIP_CHECKS"), action = ArgAction::SetTrue)]
    pub skip_checks: bool,
}

impl SynthOptions {
    /// Explicit endpoint override, if either flag was given.
    pub fn optional_endpoints(&self) -> Option<bool> {
        match (self.enable_optional_endpoints, self.disable_optional_endpoints) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

impl Default for SynthOptions {
    fn default() -> Self {
        SynthOptions {
            stage: None,
            project: PROJECT.to_string(),
            output_dir: None,
            enable_optional_endpoints: false,
            disable_optional_endpoints: false,
            skip_checks: false,
        }
    }
}
