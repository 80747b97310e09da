// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Network ACLs with explicitly numbered allow rules.
//!
//! Rule numbers are keys, not positions: appending a rule takes the next
//! number after the highest one in that direction (100, 110, 120, ...) and
//! never renumbers existing entries. Lower numbers are evaluated first, the
//! first match wins, and anything unmatched is denied by the platform default.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::Serialize;
use serde_json::json;

use crate::constants::{NACL_RULE_MAX, NACL_RULE_START, NACL_RULE_STEP};
use crate::errors::StackError;
use crate::template::{Scope, reference};
use crate::vpc::Subnet;

const TCP_PROTOCOL: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrafficDirection {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AclTraffic {
    TcpPort(u16),
    TcpPortRange(u16, u16),
}

impl AclTraffic {
    pub fn ports(&self) -> (u16, u16) {
        match *self {
            AclTraffic::TcpPort(port) => (port, port),
            AclTraffic::TcpPortRange(from, to) => (from, to),
        }
    }

    pub fn matches(&self, port: u16) -> bool {
        let (from, to) = self.ports();
        (from..=to).contains(&port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AclEntry {
    pub name: String,
    pub rule_number: u16,
    pub cidr: Ipv4Net,
    pub traffic: AclTraffic,
    pub direction: TrafficDirection,
}

/// One tier's traffic-filter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkAclSpec {
    pub name: String,
    pub tier: String,
    ingress: BTreeMap<u16, AclEntry>,
    egress: BTreeMap<u16, AclEntry>,
}

impl NetworkAclSpec {
    pub fn new(name: &str, tier: &str) -> Self {
        Self {
            name: name.to_string(),
            tier: tier.to_string(),
            ingress: BTreeMap::new(),
            egress: BTreeMap::new(),
        }
    }

    fn rules(&self, direction: TrafficDirection) -> &BTreeMap<u16, AclEntry> {
        match direction {
            TrafficDirection::Ingress => &self.ingress,
            TrafficDirection::Egress => &self.egress,
        }
    }

    fn rules_mut(&mut self, direction: TrafficDirection) -> &mut BTreeMap<u16, AclEntry> {
        match direction {
            TrafficDirection::Ingress => &mut self.ingress,
            TrafficDirection::Egress => &mut self.egress,
        }
    }

    /// Appends an allow rule after the highest number in its direction.
    pub fn allow(
        &mut self,
        name: &str,
        direction: TrafficDirection,
        cidr: Ipv4Net,
        traffic: AclTraffic,
    ) -> Result<u16, StackError> {
        let rule_number = match self.rules(direction).keys().next_back() {
            Some(last) => last.checked_add(NACL_RULE_STEP).ok_or_else(|| {
                StackError::InvalidTopology(format!("{}: rule numbers exhausted", self.name))
            })?,
            None => NACL_RULE_START,
        };
        self.allow_at(rule_number, name, direction, cidr, traffic)?;
        Ok(rule_number)
    }

    /// Inserts an allow rule at an explicit number; taken numbers are rejected.
    pub fn allow_at(
        &mut self,
        rule_number: u16,
        name: &str,
        direction: TrafficDirection,
        cidr: Ipv4Net,
        traffic: AclTraffic,
    ) -> Result<(), StackError> {
        if rule_number == 0 || rule_number > NACL_RULE_MAX {
            return Err(StackError::InvalidTopology(format!(
                "{}: rule number {rule_number} out of range",
                self.name
            )));
        }
        if self.entries().any(|e| e.name == name) {
            return Err(StackError::InvalidTopology(format!(
                "{}: duplicate entry {name}",
                self.name
            )));
        }
        let acl_name = self.name.clone();
        let rules = self.rules_mut(direction);
        if rules.contains_key(&rule_number) {
            return Err(StackError::InvalidTopology(format!(
                "{acl_name}: rule number {rule_number} already used for {direction:?}"
            )));
        }
        rules.insert(
            rule_number,
            AclEntry {
                name: name.to_string(),
                rule_number,
                cidr,
                traffic,
                direction,
            },
        );
        Ok(())
    }

    /// Ingress entries in evaluation order, then egress entries.
    pub fn entries(&self) -> impl Iterator<Item = &AclEntry> {
        self.ingress.values().chain(self.egress.values())
    }

    pub fn entries_for(&self, direction: TrafficDirection) -> impl Iterator<Item = &AclEntry> {
        self.rules(direction).values()
    }

    /// First matching rule decides; no match means deny.
    pub fn permits(&self, direction: TrafficDirection, peer: Ipv4Addr, port: u16) -> bool {
        self.rules(direction)
            .values()
            .any(|e| e.cidr.contains(&peer) && e.traffic.matches(port))
    }

    /// Declares the ACL, its entries, and associates it with `subnets`.
    pub fn synthesize(
        &self,
        scope: &mut Scope<'_>,
        vpc_id: &str,
        subnets: &[Subnet],
        association_prefix: &str,
    ) -> Result<String, StackError> {
        let mut acl_scope = scope.child(&self.name);
        let acl_path = acl_scope.path();
        let acl_id = acl_scope.add_resource(
            "Resource",
            "AWS::EC2::NetworkAcl",
            json!({
                "Tags": [{"Key": "Name", "Value": acl_path}],
                "VpcId": reference(vpc_id),
            }),
        )?;

        for entry in self.entries() {
            let (from, to) = entry.traffic.ports();
            acl_scope.child(&entry.name).add_resource(
                "Resource",
                "AWS::EC2::NetworkAclEntry",
                json!({
                    "CidrBlock": entry.cidr.to_string(),
                    "Egress": entry.direction == TrafficDirection::Egress,
                    "NetworkAclId": reference(&acl_id),
                    "PortRange": {"From": from, "To": to},
                    "Protocol": TCP_PROTOCOL,
                    "RuleAction": "allow",
                    "RuleNumber": entry.rule_number,
                }),
            )?;
        }

        for (i, subnet) in subnets.iter().enumerate() {
            scope.add_resource(
                &format!("{association_prefix}{}", i + 1),
                "AWS::EC2::SubnetNetworkAclAssociation",
                json!({
                    "NetworkAclId": reference(&acl_id),
                    "SubnetId": reference(&subnet.subnet_id),
                }),
            )?;
        }

        Ok(acl_id)
    }
}
