//! Application commands
//!
//! Each mutating operation is a plain command struct implementing
//! [`UseCase`]. Commands carry raw caller input (strings and wide integers);
//! `execute` validates it into domain values and applies the change to a
//! [`Store`]. [`run`] wraps a command in a [`Database`] transaction and
//! writes the audit trail.
//!
//! [`InspectPacket`] only reads, so it runs directly against the store.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::address::NetworkAddress;
use super::error::Result;
use super::firewall::Firewall;
use super::lifecycle::Visibility;
use super::policy::{FilteringPolicy, Packet};
use super::rule::{Action, FirewallRule, RuleDraft, RulePort, build_firewall_rule};
use super::store::Store;
use super::unit_of_work::Database;
use crate::audit::{self, AuditLog, EventType};

/// A state-changing operation on the store
pub trait UseCase: std::fmt::Debug + Serialize {
    type Output;

    /// Audit category of this command
    const EVENT: EventType;

    /// Human-readable name, used in logs
    fn description(&self) -> String;

    /// Applies the command to `store`.
    ///
    /// Implementations may leave `store` half-modified on error; callers run
    /// them on a working copy.
    fn execute(&self, store: &mut Store) -> Result<Self::Output>;
}

/// Runs `use_case` in a transaction and records the outcome in `audit`.
pub async fn run<U: UseCase>(
    db: &mut Database,
    audit: Option<&AuditLog>,
    username: Option<&str>,
    use_case: &U,
) -> Result<U::Output> {
    let outcome = db
        .transaction(&use_case.description(), |store| use_case.execute(store))
        .await;

    if let Some(audit) = audit {
        let details = serde_json::to_value(use_case).unwrap_or(serde_json::Value::Null);
        audit::record(audit, U::EVENT, username, details, &outcome).await;
    }

    outcome
}

// ═══════════════════════════════════════════════════════════════════════════
// Firewalls
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFirewall {
    pub name: String,
}

impl UseCase for CreateFirewall {
    type Output = Firewall;
    const EVENT: EventType = EventType::CreateFirewall;

    fn description(&self) -> String {
        "CreateFirewall".to_string()
    }

    fn execute(&self, store: &mut Store) -> Result<Firewall> {
        let firewall = Firewall::new(&self.name)?;
        Ok(store.insert_firewall(firewall)?.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFirewall {
    pub id: u64,
}

impl UseCase for DeleteFirewall {
    type Output = ();
    const EVENT: EventType = EventType::DeleteFirewall;

    fn description(&self) -> String {
        format!("DeleteFirewall {}", self.id)
    }

    fn execute(&self, store: &mut Store) -> Result<()> {
        store.soft_delete_firewall(self.id, Utc::now())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Filtering policies
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFilteringPolicy {
    pub firewall_id: u64,
    pub name: String,
    pub default_action: Action,
}

impl UseCase for CreateFilteringPolicy {
    type Output = FilteringPolicy;
    const EVENT: EventType = EventType::CreateFilteringPolicy;

    fn description(&self) -> String {
        format!("CreateFilteringPolicy in firewall {}", self.firewall_id)
    }

    fn execute(&self, store: &mut Store) -> Result<FilteringPolicy> {
        let policy = FilteringPolicy::new(self.firewall_id, &self.name, self.default_action)?;
        Ok(store.insert_policy(policy)?.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFilteringPolicy {
    pub firewall_id: u64,
    pub id: u64,
}

impl UseCase for DeleteFilteringPolicy {
    type Output = ();
    const EVENT: EventType = EventType::DeleteFilteringPolicy;

    fn description(&self) -> String {
        format!("DeleteFilteringPolicy {}", self.id)
    }

    fn execute(&self, store: &mut Store) -> Result<()> {
        store.soft_delete_policy(self.firewall_id, self.id, Utc::now())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Firewall rules
// ═══════════════════════════════════════════════════════════════════════════

/// Raw address/port pair as submitted by a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddressInput {
    pub address: String,
    pub port: i64,
}

impl NetworkAddressInput {
    pub fn new(address: impl Into<String>, port: i64) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInput {
    pub number: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFirewallRule {
    pub firewall_id: u64,
    pub filtering_policy_id: u64,
    pub action: Option<Action>,
    pub priority: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sources: Vec<NetworkAddressInput>,
    #[serde(default)]
    pub destinations: Vec<NetworkAddressInput>,
    #[serde(default)]
    pub ports: Vec<PortInput>,
}

impl CreateFirewallRule {
    fn draft(&self) -> Result<RuleDraft> {
        let entries = |inputs: &[NetworkAddressInput]| {
            inputs
                .iter()
                .map(|i| NetworkAddress::parse(&i.address, i.port))
                .collect::<std::result::Result<Vec<_>, _>>()
        };

        Ok(RuleDraft {
            action: self.action,
            priority: self.priority,
            description: self.description.clone(),
            sources: entries(&self.sources)?,
            destinations: entries(&self.destinations)?,
            ports: self
                .ports
                .iter()
                .map(|p| RulePort::parse(p.number))
                .collect::<std::result::Result<Vec<_>, _>>()?,
        })
    }
}

impl UseCase for CreateFirewallRule {
    type Output = FirewallRule;
    const EVENT: EventType = EventType::CreateFirewallRule;

    fn description(&self) -> String {
        format!(
            "CreateFirewallRule in policy {}/{}",
            self.firewall_id, self.filtering_policy_id
        )
    }

    fn execute(&self, store: &mut Store) -> Result<FirewallRule> {
        let policy = store
            .policy(
                self.firewall_id,
                self.filtering_policy_id,
                Visibility::ActiveOnly,
            )?
            .clone();
        let rule = build_firewall_rule(&policy, self.draft()?)?;
        Ok(store.insert_rule(rule)?.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFirewallRule {
    pub firewall_id: u64,
    pub filtering_policy_id: u64,
    pub id: u64,
}

impl UseCase for DeleteFirewallRule {
    type Output = ();
    const EVENT: EventType = EventType::DeleteFirewallRule;

    fn description(&self) -> String {
        format!("DeleteFirewallRule {}", self.id)
    }

    fn execute(&self, store: &mut Store) -> Result<()> {
        store.soft_delete_rule(
            self.firewall_id,
            self.filtering_policy_id,
            self.id,
            Utc::now(),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Inspection
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketInput {
    pub source_address: String,
    pub source_port: i64,
    pub destination_address: String,
    pub destination_port: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectPacket {
    pub firewall_id: u64,
    pub filtering_policy_id: u64,
    pub packet: PacketInput,
}

/// Owned inspection outcome; `rule_id` is `None` when the default action applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionReport {
    pub action: Action,
    pub rule_id: Option<u64>,
}

impl InspectPacket {
    pub fn execute(&self, store: &Store) -> Result<InspectionReport> {
        let packet = Packet::parse(
            &self.packet.source_address,
            self.packet.source_port,
            &self.packet.destination_address,
            self.packet.destination_port,
        )?;
        let snapshot = store.policy_snapshot(self.firewall_id, self.filtering_policy_id)?;
        let inspection = snapshot.inspect(&packet);

        tracing::debug!(
            "Inspected {}:{} -> {}:{}: {} (rule {:?})",
            packet.source_address,
            packet.source_port,
            packet.destination_address,
            packet.destination_port,
            inspection.action,
            inspection.matched_rule.map(|r| r.id)
        );

        Ok(InspectionReport {
            action: inspection.action,
            rule_id: inspection.matched_rule.map(|r| r.id),
        })
    }

    /// Inspects and records the outcome in `audit`.
    pub async fn run(
        &self,
        store: &Store,
        audit: Option<&AuditLog>,
        username: Option<&str>,
    ) -> Result<InspectionReport> {
        let outcome = self.execute(store);

        if let Some(audit) = audit {
            let mut details = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
            if let (Ok(report), Some(map)) = (&outcome, details.as_object_mut()) {
                map.insert("action".into(), serde_json::json!(report.action));
                map.insert("rule_id".into(), serde_json::json!(report.rule_id));
            }
            audit::record(audit, EventType::InspectPacket, username, details, &outcome).await;
        }

        outcome
    }
}
