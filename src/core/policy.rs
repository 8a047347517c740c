//! Filtering policies and the packet inspection algorithm
//!
//! A [`PolicySnapshot`] is a policy together with its rules, loaded in one
//! piece by the store. Inspection is a pure function of the snapshot and the
//! packet: rules are ordered by `(priority, id)`, soft-deleted rules are
//! skipped, and the first rule that matches decides. When nothing matches,
//! the policy's default action applies.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::lifecycle::Lifecycle;
use super::rule::{Action, FirewallRule};
use crate::validators::{ValidationError, validate_name, validate_port};

/// One flow submitted for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub source_address: Ipv4Addr,
    pub source_port: u16,
    pub destination_address: Ipv4Addr,
    pub destination_port: u16,
}

impl Packet {
    /// Builds a packet from raw input.
    ///
    /// # Errors
    ///
    /// Returns `Err` if either address is not a single IPv4 address or
    /// either port is out of range.
    pub fn parse(
        source_address: &str,
        source_port: i64,
        destination_address: &str,
        destination_port: i64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            source_address: parse_host(source_address)?,
            source_port: validate_port(source_port)?,
            destination_address: parse_host(destination_address)?,
            destination_port: validate_port(destination_port)?,
        })
    }
}

fn parse_host(address: &str) -> Result<Ipv4Addr, ValidationError> {
    address
        .parse()
        .map_err(|_| ValidationError::new(format!("{address} is not a valid IP address")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteringPolicy {
    pub id: u64,
    pub firewall_id: u64,
    pub name: String,
    pub default_action: Action,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl FilteringPolicy {
    /// # Errors
    ///
    /// Returns `Err` if the name is blank.
    pub fn new(
        firewall_id: u64,
        name: &str,
        default_action: Action,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id: 0,
            firewall_id,
            name: validate_name(name)?,
            default_action,
            lifecycle: Lifecycle::Active,
        })
    }
}

/// Result of inspecting a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inspection<'a> {
    pub action: Action,
    /// `None` when the default action applied
    pub matched_rule: Option<&'a FirewallRule>,
}

/// A policy with its rules, as read from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub policy: FilteringPolicy,
    pub rules: Vec<FirewallRule>,
}

impl PolicySnapshot {
    pub fn new(policy: FilteringPolicy, rules: Vec<FirewallRule>) -> Self {
        Self { policy, rules }
    }

    /// Active rules in evaluation order.
    pub fn prioritised_rules(&self) -> Vec<&FirewallRule> {
        prioritise(&self.rules)
    }

    pub fn inspect(&self, packet: &Packet) -> Inspection<'_> {
        inspect(&self.policy, &self.rules, packet)
    }
}

/// Active rules sorted by `(priority, id)`; the sort is stable, so rules that
/// tie on both keep their slice order.
fn prioritise(rules: &[FirewallRule]) -> Vec<&FirewallRule> {
    let mut ordered: Vec<&FirewallRule> = rules.iter().filter(|r| r.is_active()).collect();
    ordered.sort_by_key(|r| (r.priority, r.id));
    ordered
}

/// Inspects `packet` against `policy` and its `rules`.
///
/// Evaluation stops at the first matching rule; rules after it are never
/// consulted.
pub fn inspect<'a>(
    policy: &FilteringPolicy,
    rules: &'a [FirewallRule],
    packet: &Packet,
) -> Inspection<'a> {
    prioritise(rules)
        .into_iter()
        .find_map(|rule| {
            rule.inspect(packet).map(|action| Inspection {
                action,
                matched_rule: Some(rule),
            })
        })
        .unwrap_or(Inspection {
            action: policy.default_action,
            matched_rule: None,
        })
}
