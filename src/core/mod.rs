//! Core firewall policy management
//!
//! - [`address`], [`rule`], [`policy`], [`firewall`]: domain entities and the
//!   packet inspection algorithm
//! - [`lifecycle`]: soft deletion and visibility
//! - [`store`], [`query`]: the entity arena with listing filters and pagination
//! - [`persistence`], [`unit_of_work`]: on-disk storage and transactions
//! - [`use_cases`]: application commands run against the store
//! - [`error`]: crate-wide error type

pub mod address;
pub mod error;
pub mod firewall;
pub mod lifecycle;
pub mod persistence;
pub mod policy;
pub mod query;
pub mod rule;
pub mod store;
pub mod unit_of_work;
pub mod use_cases;

#[cfg(test)]
pub mod test_helpers;
