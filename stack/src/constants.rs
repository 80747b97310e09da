// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

pub const PROJECT: &str = "myapp";
pub const DEFAULT_STAGE: &str = "dev";
pub const STAGE_ENV_VAR: &str = "CDK_STAGE";
pub const SANDBOX_STAGE: &str = "sbx";
pub const STACK_COMPONENT: &str = "network";

// Core network defaults
pub const VPC_CIDR: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::new(10, 100, 0, 0), 16);
pub const MAX_AZS: usize = 2;
pub const NAT_GATEWAYS: usize = 2;
pub const PUBLIC_SUBNET_MASK: u8 = 28;
pub const PRIVATE_SUBNET_MASK: u8 = 24;

// Allow-listed corporate address space
pub const ONPREM_CIDR: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::new(203, 0, 113, 0), 24);
pub const CORP_CIDR: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::new(10, 16, 0, 0), 12);
pub const ANY_IPV4_NET: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::UNSPECIFIED, 0);
pub const ALLOWED_INGRESS_CIDRS: [Ipv4Net; 2] = [ONPREM_CIDR, CORP_CIDR];

pub const HTTPS_PORT: u16 = 443;
pub const HTTP_PORT: u16 = 80;
pub const REDIS_PORT: u16 = 6379;
pub const EPHEMERAL_PORT_START: u16 = 1024;
pub const EPHEMERAL_PORT_END: u16 = 65535;

/// NACL entries are numbered from here, lower numbers are evaluated first
pub const NACL_RULE_START: u16 = 100;
pub const NACL_RULE_STEP: u16 = 10;
/// https://docs.aws.amazon.com/vpc/latest/userguide/nacl-rules.html
pub const NACL_RULE_MAX: u16 = 32766;

// Flow logs
pub const FLOW_LOG_RETENTION_DAYS: u32 = 365;
pub const FLOW_LOGS_SERVICE: &str = "vpc-flow-logs.amazonaws.com";

// Tags applied to every taggable resource
pub const TAG_OWNER: &str = "JP-Solution";
pub const TAG_COST_CENTER: &str = "SOL-12345678";

pub const IAM_POLICY_VERSION: &str = "2012-10-17";

// Naming validation
pub const MAX_PROJECT_LENGTH: u64 = 32;
pub const MAX_STAGE_LENGTH: u64 = 16;
