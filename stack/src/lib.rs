// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! # Network Stack
//!
//! Declares the network layer of an application as a CloudFormation template:
//! one VPC with tiered subnets, a security baseline, private endpoints to AWS
//! services and encrypted flow logs.
//!
//! ## Architecture
//!
//! ```text
//! stage registry -> NetworkStack -> VpcCore
//!                        |       -> SecurityBaseline (security groups, network ACLs)
//!                        |       -> VpcEndpoints (gateway + interface)
//!                        |       -> FlowLogs (KMS, log group, delivery role)
//!                        v
//!                    Template (JSON) -> nag checks
//! ```
//!
//! Units register resources through a [`template::Scope`]; the stack lowers
//! them into a template with stable logical IDs, stack-wide tags and
//! suppression metadata. Building the same inputs twice yields byte-identical
//! output.
//!
//! ## Modules
//!
//! - [`configuration`]: CLI argument parsing with clap
//! - [`constants`]: Network defaults, ports, tags and limits
//! - [`endpoints`]: VPC endpoints gated per stage
//! - [`errors`]: Error taxonomy of a synthesis pass
//! - [`flow_logs`]: Encrypted VPC flow log delivery
//! - [`iam`]: IAM policy documents
//! - [`models`]: Suppression records and removal policies
//! - [`nacl`]: Numbered network ACL rules
//! - [`network`]: The composition root
//! - [`security`]: Security groups and the security baseline
//! - [`stage`]: Stage to account/region table and naming
//! - [`template`]: Stack, scopes and the synthesized template
//! - [`vpc`]: VPC, subnet tiers, gateways and routes
//!
//! ## Usage
//!
//! ```bash
//! CDK_STAGE=prod network-stack --output-dir cdk.out
//! ```

pub mod configuration;
pub mod constants;
pub mod endpoints;
pub mod errors;
pub mod flow_logs;
pub mod iam;
pub mod models;
pub mod nacl;
pub mod network;
pub mod security;
pub mod stage;
pub mod template;
pub mod vpc;
