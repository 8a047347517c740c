//! fwpolicy - firewall policy management with packet inspection
//!
//! Firewalls own filtering policies, and policies own prioritised rules.
//! Inspecting a packet against a policy returns the action of the first
//! matching rule, or the policy's default action.
//!
//! # Architecture
//!
//! - [`core`] - Entities, inspection engine, store and use cases
//! - [`auth`] - HS256 token authentication
//! - [`audit`] - JSON-lines audit trail of mutations and inspections
//! - [`validators`] - Input validation for names, ports and addresses
//! - [`config`] - Settings from `config.json` and `FWPOLICY_*` variables
//! - [`health`] - Liveness report
//! - [`utils`] - XDG directories

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod auth;
pub mod config;
pub mod core;
pub mod health;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::policy::{FilteringPolicy, Packet};
pub use core::rule::{Action, FirewallRule};
pub use core::unit_of_work::Database;
