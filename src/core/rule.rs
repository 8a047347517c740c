//! Firewall rules: matching, inspection and the uniqueness hashes
//!
//! A [`FirewallRule`] carries three non-empty relations:
//! - `sources`: address/port patterns the packet source must satisfy
//! - `destinations`: address/port patterns the packet destination must satisfy
//! - `ports`: port numbers, used for uniqueness only
//!
//! Every entry of `sources` must match the packet source, and every entry of
//! `destinations` must match the packet destination. Adding entries can only
//! narrow what a rule matches. `ports` does not take part in matching.
//!
//! Rules are built with [`build_firewall_rule`], which rejects empty
//! relations and computes [`RuleHashes`]. Two rules of the same policy with
//! the same action and the same hashes are duplicates; the store refuses the
//! second one.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::address::NetworkAddress;
use super::lifecycle::Lifecycle;
use super::policy::{FilteringPolicy, Packet};
use crate::validators::{ValidationError, validate_port};

/// Action applied to a packet
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[strum(serialize = "allow")]
    Allow,
    #[strum(serialize = "deny")]
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RulePort {
    pub number: u16,
}

impl RulePort {
    /// # Errors
    ///
    /// Returns `Err` if the number is outside `0..=65535`.
    pub fn parse(number: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            number: validate_port(number)?,
        })
    }

    fn key(self) -> Vec<u8> {
        self.number.to_string().into_bytes()
    }
}

/// Order-independent hashes of a rule's relations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleHashes {
    pub source: u64,
    pub destination: u64,
    pub port: u64,
}

/// Tuple the store keeps unique across all rules
pub type RuleUniquenessKey = (u64, u64, u64, Action, u64);

impl RuleHashes {
    pub fn compute(
        sources: &[NetworkAddress],
        destinations: &[NetworkAddress],
        ports: &[RulePort],
    ) -> Self {
        Self {
            source: set_hash(sources.iter().map(NetworkAddress::key)),
            destination: set_hash(destinations.iter().map(NetworkAddress::key)),
            port: set_hash(ports.iter().map(|p| p.key())),
        }
    }

    pub fn uniqueness_key(&self, action: Action, filtering_policy_id: u64) -> RuleUniquenessKey {
        (
            self.source,
            self.destination,
            self.port,
            action,
            filtering_policy_id,
        )
    }
}

/// Hashes a set of items: each item is digested on its own, the digests are
/// de-duplicated and sorted, then digested together.
fn set_hash(keys: impl Iterator<Item = Vec<u8>>) -> u64 {
    let digests: BTreeSet<[u8; 32]> = keys
        .map(|key| -> [u8; 32] { Sha256::digest(&key).into() })
        .collect();

    let mut hasher = Sha256::new();
    for digest in &digests {
        hasher.update(digest);
    }
    let out = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&out[..8]);
    u64::from_be_bytes(prefix)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    /// Assigned by the store on insert; zero until then
    pub id: u64,
    pub filtering_policy_id: u64,
    pub action: Action,
    /// Lower values are evaluated first
    pub priority: i64,
    #[serde(default)]
    pub description: String,
    pub sources: Vec<NetworkAddress>,
    pub destinations: Vec<NetworkAddress>,
    pub ports: Vec<RulePort>,
    pub hashes: RuleHashes,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl FirewallRule {
    pub fn matches(&self, packet: &Packet) -> bool {
        self.sources
            .iter()
            .all(|source| source.matches(packet.source_address, packet.source_port))
            && self.destinations.iter().all(|destination| {
                destination.matches(packet.destination_address, packet.destination_port)
            })
    }

    /// Returns the rule's action if it matches, `None` to fall through to the next rule.
    pub fn inspect(&self, packet: &Packet) -> Option<Action> {
        self.matches(packet).then_some(self.action)
    }

    pub fn uniqueness_key(&self) -> RuleUniquenessKey {
        self.hashes
            .uniqueness_key(self.action, self.filtering_policy_id)
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |entries: &[NetworkAddress]| {
            entries
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        let ports = self
            .ports
            .iter()
            .map(|p| p.number.to_string())
            .collect::<Vec<_>>()
            .join(",");

        write!(
            f,
            "#{} [{}] {} from {} to {} ports {}",
            self.id,
            self.priority,
            self.action,
            join(&self.sources),
            join(&self.destinations),
            ports
        )
    }
}

/// Validated input for [`build_firewall_rule`]
#[derive(Debug, Clone, Default)]
pub struct RuleDraft {
    pub action: Option<Action>,
    pub priority: i64,
    pub description: String,
    pub sources: Vec<NetworkAddress>,
    pub destinations: Vec<NetworkAddress>,
    pub ports: Vec<RulePort>,
}

impl RuleDraft {
    pub fn new(action: Action, priority: i64) -> Self {
        Self {
            action: Some(action),
            priority,
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn source(mut self, entry: NetworkAddress) -> Self {
        self.sources.push(entry);
        self
    }

    pub fn destination(mut self, entry: NetworkAddress) -> Self {
        self.destinations.push(entry);
        self
    }

    pub fn port(mut self, port: RulePort) -> Self {
        self.ports.push(port);
        self
    }
}

fn raise_if_empty<T>(relation: &[T], name: &str) -> Result<(), ValidationError> {
    if relation.is_empty() {
        Err(ValidationError::new(format!("{name} cannot be empty")))
    } else {
        Ok(())
    }
}

/// Builds a rule for `filtering_policy`, checking the relations and computing hashes.
///
/// # Errors
///
/// Returns `Err` with `"sources cannot be empty"`, `"destinations cannot be
/// empty"` or `"ports cannot be empty"` (checked in that order), or
/// `"action is required"` when the draft carries no action.
pub fn build_firewall_rule(
    filtering_policy: &FilteringPolicy,
    draft: RuleDraft,
) -> Result<FirewallRule, ValidationError> {
    raise_if_empty(&draft.sources, "sources")?;
    raise_if_empty(&draft.destinations, "destinations")?;
    raise_if_empty(&draft.ports, "ports")?;

    let action = draft
        .action
        .ok_or_else(|| ValidationError::new("action is required"))?;
    let hashes = RuleHashes::compute(&draft.sources, &draft.destinations, &draft.ports);

    Ok(FirewallRule {
        id: 0,
        filtering_policy_id: filtering_policy.id,
        action,
        priority: draft.priority,
        description: draft.description,
        sources: draft.sources,
        destinations: draft.destinations,
        ports: draft.ports,
        hashes,
        lifecycle: Lifecycle::Active,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::{addr, packet, policy, rule};

    #[test]
    fn test_build_rejects_empty_relations_in_order() {
        let policy = policy(1, Action::Deny);
        let a = addr("1.1.1.1", 80);

        let err = build_firewall_rule(&policy, RuleDraft::new(Action::Allow, 1)).unwrap_err();
        assert_eq!(err.message(), "sources cannot be empty");

        let err = build_firewall_rule(&policy, RuleDraft::new(Action::Allow, 1).source(a))
            .unwrap_err();
        assert_eq!(err.message(), "destinations cannot be empty");

        let err = build_firewall_rule(
            &policy,
            RuleDraft::new(Action::Allow, 1).source(a).destination(a),
        )
        .unwrap_err();
        assert_eq!(err.message(), "ports cannot be empty");
    }

    #[test]
    fn test_build_requires_action() {
        let draft = RuleDraft {
            sources: vec![addr("1.1.1.1", 80)],
            destinations: vec![addr("2.2.2.2", 80)],
            ports: vec![RulePort { number: 80 }],
            ..RuleDraft::default()
        };
        let err = build_firewall_rule(&policy(1, Action::Deny), draft).unwrap_err();
        assert_eq!(err.message(), "action is required");
    }

    #[test]
    fn test_build_sets_policy_and_hashes() {
        let policy = policy(42, Action::Deny);
        let built = build_firewall_rule(
            &policy,
            RuleDraft::new(Action::Allow, 3)
                .description("web")
                .source(addr("1.1.1.1", 80))
                .destination(addr("2.2.2.0/24", 443))
                .port(RulePort { number: 443 }),
        )
        .unwrap();

        assert_eq!(built.filtering_policy_id, 42);
        assert_eq!(built.priority, 3);
        assert_eq!(built.description, "web");
        assert_eq!(
            built.hashes,
            RuleHashes::compute(&built.sources, &built.destinations, &built.ports)
        );
    }

    #[test]
    fn test_source_hash_ignores_order() {
        let a = addr("1.1.1.1", 80);
        let b = addr("10.0.0.0/8", 22);

        let ab = RuleHashes::compute(&[a, b], &[a], &[RulePort { number: 1 }]);
        let ba = RuleHashes::compute(&[b, a], &[a], &[RulePort { number: 1 }]);

        assert_eq!(ab.source, ba.source);
    }

    #[test]
    fn test_port_hash_ignores_order_and_repeats() {
        let p = |n| RulePort { number: n };
        let a = addr("1.1.1.1", 80);

        let first = RuleHashes::compute(&[a], &[a], &[p(80), p(443)]);
        let second = RuleHashes::compute(&[a], &[a], &[p(443), p(80), p(80)]);

        assert_eq!(first.port, second.port);
    }

    #[test]
    fn test_hash_distinguishes_address_and_port() {
        let h = |entry| RuleHashes::compute(&[entry], &[entry], &[RulePort { number: 1 }]).source;

        assert_ne!(h(addr("1.1.1.1", 80)), h(addr("1.1.1.1", 81)));
        assert_ne!(h(addr("1.1.1.1", 80)), h(addr("1.1.1.2", 80)));
        assert_ne!(h(addr("1.1.1.1", 80)), h(addr("1.1.1.1/32", 80)));
    }

    #[test]
    fn test_uniqueness_key_includes_action_and_policy() {
        let allow = rule(1, Action::Allow, &[("1.1.1.1", 80)], &[("2.2.2.2", 80)]);
        let mut deny = allow.clone();
        deny.action = Action::Deny;
        let mut other_policy = allow.clone();
        other_policy.filtering_policy_id = 2;

        assert_ne!(allow.uniqueness_key(), deny.uniqueness_key());
        assert_ne!(allow.uniqueness_key(), other_policy.uniqueness_key());
    }

    #[test]
    fn test_matches_requires_source_and_destination() {
        let r = rule(
            1,
            Action::Allow,
            &[("99.99.99.99", 80)],
            &[("100.100.100.0/24", 8080)],
        );

        assert!(r.matches(&packet("99.99.99.99", 80, "100.100.100.10", 8080)));
        assert!(!r.matches(&packet("99.99.99.98", 80, "100.100.100.10", 8080)));
        assert!(!r.matches(&packet("99.99.99.99", 80, "166.100.9.100", 8080)));
        assert!(!r.matches(&packet("99.99.99.99", 80, "100.100.100.10", 8081)));
    }

    #[test]
    fn test_matches_requires_every_source() {
        let r = rule(
            1,
            Action::Allow,
            &[("10.0.0.0/8", 80), ("10.1.0.0/16", 80)],
            &[("2.2.2.2", 443)],
        );

        assert!(r.matches(&packet("10.1.2.3", 80, "2.2.2.2", 443)));
        assert!(!r.matches(&packet("10.2.2.3", 80, "2.2.2.2", 443)));
    }

    #[test]
    fn test_ports_do_not_affect_matching() {
        let mut r = rule(1, Action::Deny, &[("1.1.1.1", 80)], &[("2.2.2.2", 443)]);
        let p = packet("1.1.1.1", 80, "2.2.2.2", 443);
        assert!(r.matches(&p));

        r.ports = vec![RulePort { number: 9999 }];
        assert!(r.matches(&p));
    }

    #[test]
    fn test_inspect_returns_action_only_on_match() {
        let r = rule(1, Action::Deny, &[("1.1.1.1", 80)], &[("2.2.2.2", 443)]);

        assert_eq!(
            r.inspect(&packet("1.1.1.1", 80, "2.2.2.2", 443)),
            Some(Action::Deny)
        );
        assert_eq!(r.inspect(&packet("1.1.1.1", 81, "2.2.2.2", 443)), None);
    }

    #[test]
    fn test_action_parses_lowercase() {
        assert_eq!("allow".parse::<Action>().unwrap(), Action::Allow);
        assert_eq!("deny".parse::<Action>().unwrap(), Action::Deny);
        assert!("DROP".parse::<Action>().is_err());
        assert_eq!(serde_json::to_string(&Action::Deny).unwrap(), r#""deny""#);
        assert_eq!(Action::Allow.to_string(), "allow");
    }
}
