//! Shared test utilities for core module tests
//!
//! Provides common test helpers to avoid duplication across test suites.
//! This module is only compiled in test mode.

use std::net::Ipv4Addr;

use crate::core::address::NetworkAddress;
use crate::core::policy::{FilteringPolicy, Packet};
use crate::core::rule::{Action, FirewallRule, RuleDraft, RulePort, build_firewall_rule};

/// Parses an address/port entry, panicking on invalid test input.
pub fn addr(address: &str, port: i64) -> NetworkAddress {
    NetworkAddress::parse(address, port).unwrap()
}

pub fn packet(src: &str, src_port: i64, dst: &str, dst_port: i64) -> Packet {
    Packet::parse(src, src_port, dst, dst_port).unwrap()
}

pub fn packet_from(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16) -> Packet {
    Packet {
        source_address: src,
        source_port: src_port,
        destination_address: dst,
        destination_port: dst_port,
    }
}

pub fn policy(id: u64, default_action: Action) -> FilteringPolicy {
    let mut policy = FilteringPolicy::new(1, "test-policy", default_action).unwrap();
    policy.id = id;
    policy
}

/// Builds a priority-1 rule for `policy_id` with a single port (80).
///
/// This is the canonical helper for rules in tests; adjust `id`,
/// `priority` or `ports` on the returned value as needed.
pub fn rule(
    policy_id: u64,
    action: Action,
    sources: &[(&str, i64)],
    destinations: &[(&str, i64)],
) -> FirewallRule {
    let mut draft = RuleDraft::new(action, 1).port(RulePort { number: 80 });
    for (address, port) in sources {
        draft = draft.source(addr(address, *port));
    }
    for (address, port) in destinations {
        draft = draft.destination(addr(address, *port));
    }
    build_firewall_rule(&policy(policy_id, Action::Deny), draft).unwrap()
}
