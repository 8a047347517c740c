//! Firewalls, the top-level aggregate owning filtering policies
//!
//! Ownership is expressed by id: a policy stores its `firewall_id` and a rule
//! its `filtering_policy_id`. The [`Store`](super::store::Store) resolves
//! those ids and hides the children of deleted parents.
//!
//! # Example
//!
//! ```
//! use fwpolicy::core::firewall::Firewall;
//!
//! let firewall = Firewall::new("  edge  ").unwrap();
//! assert_eq!(firewall.name, "edge");
//! assert!(firewall.lifecycle.is_active());
//! ```

use serde::{Deserialize, Serialize};

use super::lifecycle::Lifecycle;
use crate::validators::{ValidationError, validate_name};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Firewall {
    /// Assigned by the store on insert
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl Firewall {
    /// # Errors
    ///
    /// Returns `Err` if the name is blank.
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            id: 0,
            name: validate_name(name)?,
            lifecycle: Lifecycle::Active,
        })
    }
}
