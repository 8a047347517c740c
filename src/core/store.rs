//! Arena-backed repository for firewalls, policies and rules
//!
//! The [`Store`] owns every entity in id-indexed maps. Children refer to
//! their parent by id, and every lookup walks those ids explicitly:
//!
//! - a policy is visible when it and its firewall are active
//! - a rule is visible when it, its policy and its firewall are active
//!
//! Unique constraints are checked on insert against all rows, deleted ones
//! included:
//!
//! - firewall name
//! - `(firewall_id, name)` for policies
//! - `(source_hash, destination_hash, port_hash, action, filtering_policy_id)` for rules

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use super::firewall::Firewall;
use super::lifecycle::Visibility;
use super::policy::{FilteringPolicy, PolicySnapshot};
use super::query::{
    FirewallOrder, FirewallQuery, Page, PageRequest, PolicyOrder, PolicyQuery, RuleOrder,
    RuleQuery,
};
use super::rule::FirewallRule;

/// Per-table id sequences; ids start at 1 and are never reused
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Sequences {
    firewall: u64,
    filtering_policy: u64,
    firewall_rule: u64,
}

fn next(sequence: &mut u64) -> u64 {
    *sequence += 1;
    *sequence
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    #[serde(default)]
    sequences: Sequences,
    #[serde(default)]
    firewalls: BTreeMap<u64, Firewall>,
    #[serde(default)]
    filtering_policies: BTreeMap<u64, FilteringPolicy>,
    #[serde(default)]
    firewall_rules: BTreeMap<u64, FirewallRule>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Firewalls
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn insert_firewall(&mut self, mut firewall: Firewall) -> Result<&Firewall> {
        if self.firewalls.values().any(|f| f.name == firewall.name) {
            return Err(Error::already_exists(
                "firewall",
                format!("name '{}'", firewall.name),
            ));
        }

        firewall.id = next(&mut self.sequences.firewall);
        let id = firewall.id;
        Ok(&*self.firewalls.entry(id).or_insert(firewall))
    }

    pub fn firewall(&self, id: u64, visibility: Visibility) -> Result<&Firewall> {
        self.firewalls
            .get(&id)
            .filter(|f| visibility.admits(&f.lifecycle))
            .ok_or_else(|| Error::not_found("firewall", id))
    }

    pub fn soft_delete_firewall(&mut self, id: u64, at: DateTime<Utc>) -> Result<()> {
        self.firewall(id, Visibility::ActiveOnly)?;
        if let Some(firewall) = self.firewalls.get_mut(&id) {
            firewall.lifecycle.soft_delete(at);
        }
        Ok(())
    }

    pub fn list_firewalls(&self, query: &FirewallQuery, page: PageRequest) -> Page<Firewall> {
        let mut items: Vec<&Firewall> = self
            .firewalls
            .values()
            .filter(|f| query.visibility.admits(&f.lifecycle))
            .filter(|f| query.name.as_ref().is_none_or(|name| &f.name == name))
            .collect();

        items.sort_by(|a, b| {
            let ordering = match query.order_by.field {
                FirewallOrder::Id => a.id.cmp(&b.id),
                FirewallOrder::Name => a.name.cmp(&b.name),
            };
            query.order_by.apply(ordering).then(a.id.cmp(&b.id))
        });

        page.paginate(items.into_iter().cloned().collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Filtering policies
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn insert_policy(&mut self, mut policy: FilteringPolicy) -> Result<&FilteringPolicy> {
        self.firewall(policy.firewall_id, Visibility::ActiveOnly)?;

        if self
            .filtering_policies
            .values()
            .any(|p| p.firewall_id == policy.firewall_id && p.name == policy.name)
        {
            return Err(Error::already_exists(
                "filtering policy",
                format!(
                    "name '{}' in firewall {}",
                    policy.name, policy.firewall_id
                ),
            ));
        }

        policy.id = next(&mut self.sequences.filtering_policy);
        let id = policy.id;
        Ok(&*self.filtering_policies.entry(id).or_insert(policy))
    }

    pub fn policy(
        &self,
        firewall_id: u64,
        id: u64,
        visibility: Visibility,
    ) -> Result<&FilteringPolicy> {
        self.firewall(firewall_id, visibility)?;

        self.filtering_policies
            .get(&id)
            .filter(|p| p.firewall_id == firewall_id)
            .filter(|p| visibility.admits(&p.lifecycle))
            .ok_or_else(|| Error::not_found("filtering policy", id))
    }

    pub fn soft_delete_policy(&mut self, firewall_id: u64, id: u64, at: DateTime<Utc>) -> Result<()> {
        self.policy(firewall_id, id, Visibility::ActiveOnly)?;
        if let Some(policy) = self.filtering_policies.get_mut(&id) {
            policy.lifecycle.soft_delete(at);
        }
        Ok(())
    }

    /// Loads an active policy with its active rules.
    pub fn policy_snapshot(&self, firewall_id: u64, id: u64) -> Result<PolicySnapshot> {
        let policy = self.policy(firewall_id, id, Visibility::ActiveOnly)?.clone();
        let rules = self
            .firewall_rules
            .values()
            .filter(|r| r.filtering_policy_id == id && r.is_active())
            .cloned()
            .collect();

        Ok(PolicySnapshot::new(policy, rules))
    }

    pub fn list_policies(
        &self,
        firewall_id: u64,
        query: &PolicyQuery,
        page: PageRequest,
    ) -> Result<Page<FilteringPolicy>> {
        self.firewall(firewall_id, query.visibility)?;

        let mut items: Vec<&FilteringPolicy> = self
            .filtering_policies
            .values()
            .filter(|p| p.firewall_id == firewall_id)
            .filter(|p| query.visibility.admits(&p.lifecycle))
            .filter(|p| query.name.as_ref().is_none_or(|name| &p.name == name))
            .filter(|p| {
                query
                    .default_action
                    .is_none_or(|action| p.default_action == action)
            })
            .collect();

        items.sort_by(|a, b| {
            let ordering = match query.order_by.field {
                PolicyOrder::Id => a.id.cmp(&b.id),
                PolicyOrder::Name => a.name.cmp(&b.name),
                PolicyOrder::DefaultAction => a.default_action.cmp(&b.default_action),
            };
            query.order_by.apply(ordering).then(a.id.cmp(&b.id))
        });

        Ok(page.paginate(items.into_iter().cloned().collect()))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Firewall rules
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn insert_rule(&mut self, mut rule: FirewallRule) -> Result<&FirewallRule> {
        let key = rule.uniqueness_key();
        if self
            .firewall_rules
            .values()
            .any(|r| r.uniqueness_key() == key)
        {
            return Err(Error::already_exists(
                "firewall rule",
                format!(
                    "{} rule with the same sources, destinations and ports in policy {}",
                    rule.action, rule.filtering_policy_id
                ),
            ));
        }

        rule.id = next(&mut self.sequences.firewall_rule);
        let id = rule.id;
        Ok(&*self.firewall_rules.entry(id).or_insert(rule))
    }

    pub fn rule(
        &self,
        firewall_id: u64,
        filtering_policy_id: u64,
        id: u64,
        visibility: Visibility,
    ) -> Result<&FirewallRule> {
        self.policy(firewall_id, filtering_policy_id, visibility)?;

        self.firewall_rules
            .get(&id)
            .filter(|r| r.filtering_policy_id == filtering_policy_id)
            .filter(|r| visibility.admits(&r.lifecycle))
            .ok_or_else(|| Error::not_found("firewall rule", id))
    }

    pub fn soft_delete_rule(
        &mut self,
        firewall_id: u64,
        filtering_policy_id: u64,
        id: u64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.rule(firewall_id, filtering_policy_id, id, Visibility::ActiveOnly)?;
        if let Some(rule) = self.firewall_rules.get_mut(&id) {
            rule.lifecycle.soft_delete(at);
        }
        Ok(())
    }

    pub fn list_rules(
        &self,
        firewall_id: u64,
        filtering_policy_id: u64,
        query: &RuleQuery,
        page: PageRequest,
    ) -> Result<Page<FirewallRule>> {
        self.policy(firewall_id, filtering_policy_id, query.visibility)?;

        let mut items: Vec<&FirewallRule> = self
            .firewall_rules
            .values()
            .filter(|r| r.filtering_policy_id == filtering_policy_id)
            .filter(|r| query.visibility.admits(&r.lifecycle))
            .filter(|r| rule_matches_query(r, query))
            .collect();

        items.sort_by(|a, b| {
            let ordering = match query.order_by.field {
                RuleOrder::Id => a.id.cmp(&b.id),
                RuleOrder::Action => a.action.cmp(&b.action),
                RuleOrder::Priority => a.priority.cmp(&b.priority),
            };
            query.order_by.apply(ordering).then(a.id.cmp(&b.id))
        });

        Ok(page.paginate(items.into_iter().cloned().collect()))
    }
}

fn rule_matches_query(rule: &FirewallRule, query: &RuleQuery) -> bool {
    let source_ok = (query.source_address.is_none() && query.source_port.is_none())
        || rule.sources.iter().any(|s| {
            query.source_address.is_none_or(|a| s.address == a)
                && query.source_port.is_none_or(|p| s.port == p)
        });

    let destination_ok = (query.destination_address.is_none()
        && query.destination_port.is_none())
        || rule.destinations.iter().any(|d| {
            query.destination_address.is_none_or(|a| d.address == a)
                && query.destination_port.is_none_or(|p| d.port == p)
        });

    query.action.is_none_or(|action| rule.action == action)
        && source_ok
        && destination_ok
        && query
            .port
            .is_none_or(|port| rule.ports.iter().any(|p| p.number == port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::OrderBy;
    use crate::core::rule::{Action, RuleDraft, RulePort, build_firewall_rule};
    use crate::core::test_helpers::addr;

    struct Fixture {
        store: Store,
        firewall_id: u64,
        policy_id: u64,
    }

    fn fixture() -> Fixture {
        let mut store = Store::new();
        let firewall_id = store
            .insert_firewall(Firewall::new("edge").unwrap())
            .unwrap()
            .id;
        let policy_id = store
            .insert_policy(FilteringPolicy::new(firewall_id, "web", Action::Deny).unwrap())
            .unwrap()
            .id;
        Fixture {
            store,
            firewall_id,
            policy_id,
        }
    }

    fn insert_rule(
        fx: &mut Fixture,
        action: Action,
        priority: i64,
        source: (&str, i64),
        port: u16,
    ) -> Result<u64> {
        let policy = fx
            .store
            .policy(fx.firewall_id, fx.policy_id, Visibility::ActiveOnly)?
            .clone();
        let rule = build_firewall_rule(
            &policy,
            RuleDraft::new(action, priority)
                .source(addr(source.0, source.1))
                .destination(addr("2.2.2.2", 443))
                .port(RulePort { number: port }),
        )?;
        Ok(fx.store.insert_rule(rule)?.id)
    }

    #[test]
    fn test_ids_are_sequential_per_table() {
        let mut fx = fixture();
        assert_eq!(fx.firewall_id, 1);
        assert_eq!(fx.policy_id, 1);

        let first = insert_rule(&mut fx, Action::Allow, 1, ("1.1.1.1", 80), 80).unwrap();
        let second = insert_rule(&mut fx, Action::Deny, 1, ("1.1.1.1", 80), 80).unwrap();
        assert_eq!((first, second), (1, 2));
    }

    #[test]
    fn test_duplicate_firewall_name_rejected_even_after_delete() {
        let mut fx = fixture();
        fx.store.soft_delete_firewall(fx.firewall_id, Utc::now()).unwrap();

        let err = fx
            .store
            .insert_firewall(Firewall::new("edge").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { kind: "firewall", .. }));
    }

    #[test]
    fn test_policy_name_unique_per_firewall() {
        let mut fx = fixture();
        let err = fx
            .store
            .insert_policy(FilteringPolicy::new(fx.firewall_id, "web", Action::Allow).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));

        let other = fx
            .store
            .insert_firewall(Firewall::new("core").unwrap())
            .unwrap()
            .id;
        assert!(
            fx.store
                .insert_policy(FilteringPolicy::new(other, "web", Action::Allow).unwrap())
                .is_ok()
        );
    }

    #[test]
    fn test_policy_requires_active_firewall() {
        let mut fx = fixture();
        let err = fx
            .store
            .insert_policy(FilteringPolicy::new(99, "web", Action::Allow).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "firewall", id: 99 }));
    }

    #[test]
    fn test_duplicate_rule_rejected_regardless_of_order() {
        let mut fx = fixture();
        let policy = fx
            .store
            .policy(fx.firewall_id, fx.policy_id, Visibility::ActiveOnly)
            .unwrap()
            .clone();
        let a = addr("1.1.1.1", 80);
        let b = addr("10.0.0.0/8", 22);
        let d = addr("2.2.2.2", 443);

        let first = build_firewall_rule(
            &policy,
            RuleDraft::new(Action::Allow, 1)
                .source(a)
                .source(b)
                .destination(d)
                .port(RulePort { number: 80 })
                .port(RulePort { number: 443 }),
        )
        .unwrap();
        let reordered = build_firewall_rule(
            &policy,
            RuleDraft::new(Action::Allow, 7)
                .source(b)
                .source(a)
                .destination(d)
                .port(RulePort { number: 443 })
                .port(RulePort { number: 80 }),
        )
        .unwrap();

        fx.store.insert_rule(first).unwrap();
        let err = fx.store.insert_rule(reordered).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { kind: "firewall rule", .. }));
    }

    #[test]
    fn test_same_relations_with_other_action_allowed() {
        let mut fx = fixture();
        insert_rule(&mut fx, Action::Allow, 1, ("1.1.1.1", 80), 80).unwrap();
        assert!(insert_rule(&mut fx, Action::Deny, 1, ("1.1.1.1", 80), 80).is_ok());
    }

    #[test]
    fn test_deleted_firewall_hides_children() {
        let mut fx = fixture();
        let rule_id = insert_rule(&mut fx, Action::Allow, 1, ("1.1.1.1", 80), 80).unwrap();
        fx.store.soft_delete_firewall(fx.firewall_id, Utc::now()).unwrap();

        assert!(fx.store.policy(fx.firewall_id, fx.policy_id, Visibility::ActiveOnly).is_err());
        assert!(
            fx.store
                .rule(fx.firewall_id, fx.policy_id, rule_id, Visibility::ActiveOnly)
                .is_err()
        );
        assert!(
            fx.store
                .rule(fx.firewall_id, fx.policy_id, rule_id, Visibility::IncludeDeleted)
                .is_ok()
        );
    }

    #[test]
    fn test_policy_lookup_checks_parent() {
        let mut fx = fixture();
        let other = fx
            .store
            .insert_firewall(Firewall::new("core").unwrap())
            .unwrap()
            .id;
        let err = fx
            .store
            .policy(other, fx.policy_id, Visibility::ActiveOnly)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "filtering policy", .. }));
    }

    #[test]
    fn test_deleting_twice_is_not_found() {
        let mut fx = fixture();
        fx.store.soft_delete_policy(fx.firewall_id, fx.policy_id, Utc::now()).unwrap();
        assert!(
            fx.store
                .soft_delete_policy(fx.firewall_id, fx.policy_id, Utc::now())
                .is_err()
        );
    }

    #[test]
    fn test_snapshot_excludes_deleted_rules() {
        let mut fx = fixture();
        let keep = insert_rule(&mut fx, Action::Allow, 1, ("1.1.1.1", 80), 80).unwrap();
        let gone = insert_rule(&mut fx, Action::Deny, 1, ("1.1.1.1", 80), 80).unwrap();
        fx.store
            .soft_delete_rule(fx.firewall_id, fx.policy_id, gone, Utc::now())
            .unwrap();

        let snapshot = fx.store.policy_snapshot(fx.firewall_id, fx.policy_id).unwrap();
        let ids: Vec<u64> = snapshot.rules.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![keep]);
    }

    #[test]
    fn test_list_rules_filters_and_orders() {
        let mut fx = fixture();
        insert_rule(&mut fx, Action::Allow, 5, ("1.1.1.1", 80), 80).unwrap();
        insert_rule(&mut fx, Action::Deny, 1, ("1.1.1.1", 80), 80).unwrap();
        insert_rule(&mut fx, Action::Allow, 3, ("10.0.0.0/8", 22), 22).unwrap();

        let query = RuleQuery {
            order_by: OrderBy::asc(RuleOrder::Priority),
            ..RuleQuery::default()
        };
        let page = fx
            .store
            .list_rules(fx.firewall_id, fx.policy_id, &query, PageRequest::default())
            .unwrap();
        let priorities: Vec<i64> = page.items.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![1, 3, 5]);

        let query = RuleQuery {
            source_address: Some("10.0.0.0/8".parse().unwrap()),
            ..RuleQuery::default()
        };
        let page = fx
            .store
            .list_rules(fx.firewall_id, fx.policy_id, &query, PageRequest::default())
            .unwrap();
        assert_eq!(page.total, 1);

        let query = RuleQuery {
            source_address: Some("10.0.0.0/8".parse().unwrap()),
            source_port: Some(80),
            ..RuleQuery::default()
        };
        let page = fx
            .store
            .list_rules(fx.firewall_id, fx.policy_id, &query, PageRequest::default())
            .unwrap();
        assert_eq!(page.total, 0);

        let query = RuleQuery {
            action: Some(Action::Allow),
            port: Some(80),
            ..RuleQuery::default()
        };
        let page = fx
            .store
            .list_rules(fx.firewall_id, fx.policy_id, &query, PageRequest::default())
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn test_list_firewalls_orders_by_name_desc_and_hides_deleted() {
        let mut store = Store::new();
        for name in ["alpha", "gamma", "beta"] {
            store.insert_firewall(Firewall::new(name).unwrap()).unwrap();
        }
        store.soft_delete_firewall(1, Utc::now()).unwrap();

        let query = FirewallQuery {
            order_by: OrderBy::desc(FirewallOrder::Name),
            ..FirewallQuery::default()
        };
        let page = store.list_firewalls(&query, PageRequest::default());
        let names: Vec<&str> = page.items.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["gamma", "beta"]);

        let query = FirewallQuery {
            visibility: Visibility::IncludeDeleted,
            ..FirewallQuery::default()
        };
        assert_eq!(store.list_firewalls(&query, PageRequest::default()).total, 3);
    }

    #[test]
    fn test_list_policies_filters_by_default_action() {
        let mut fx = fixture();
        fx.store
            .insert_policy(FilteringPolicy::new(fx.firewall_id, "ssh", Action::Allow).unwrap())
            .unwrap();

        let query = PolicyQuery {
            default_action: Some(Action::Allow),
            ..PolicyQuery::default()
        };
        let page = fx
            .store
            .list_policies(fx.firewall_id, &query, PageRequest::default())
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "ssh");
    }

    #[test]
    fn test_store_survives_json_roundtrip() {
        let mut fx = fixture();
        insert_rule(&mut fx, Action::Allow, 1, ("1.1.1.0/24", 80), 80).unwrap();

        let json = serde_json::to_string(&fx.store).unwrap();
        let restored: Store = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, fx.store);
    }
}
