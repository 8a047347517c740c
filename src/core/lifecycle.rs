//! Soft deletion state shared by firewalls, policies and rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an entity is live or has been soft-deleted.
///
/// Entities are never removed from the store; deletion records the time and
/// hides the entity (and everything below it) from default queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Active,
    Deleted { at: DateTime<Utc> },
}

impl Lifecycle {
    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Deleted { at } => Some(*at),
        }
    }

    /// Marks the entity deleted. Deleting twice keeps the first timestamp.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        if self.is_active() {
            *self = Lifecycle::Deleted { at };
        }
    }
}

/// Which rows a query may return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Only active rows whose ancestors are active too
    #[default]
    ActiveOnly,
    IncludeDeleted,
}

impl Visibility {
    pub fn admits(self, lifecycle: &Lifecycle) -> bool {
        match self {
            Visibility::ActiveOnly => lifecycle.is_active(),
            Visibility::IncludeDeleted => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_soft_delete_keeps_first_timestamp() {
        let first = Utc::now();
        let mut lifecycle = Lifecycle::Active;

        lifecycle.soft_delete(first);
        lifecycle.soft_delete(first + Duration::hours(1));

        assert_eq!(lifecycle.deleted_at(), Some(first));
    }

    #[test]
    fn test_visibility_defaults_to_active_only() {
        let deleted = Lifecycle::Deleted { at: Utc::now() };
        assert!(!Visibility::default().admits(&deleted));
        assert!(Visibility::IncludeDeleted.admits(&deleted));
        assert!(Visibility::ActiveOnly.admits(&Lifecycle::Active));
    }

    #[test]
    fn test_serialized_form() {
        let json = serde_json::to_value(Lifecycle::Active).unwrap();
        assert_eq!(json["state"], "active");
    }
}
