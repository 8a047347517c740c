//! Filtering, ordering and pagination parameters for store listings

use std::cmp::Ordering;
use std::str::FromStr;

use serde::Serialize;

use super::address::AddressPattern;
use super::lifecycle::Visibility;
use super::rule::Action;
use crate::validators::ValidationError;

/// Upper bound applied to `per_page` unless the settings say otherwise
pub const DEFAULT_MAX_PER_PAGE: u64 = 100;

/// Sort field plus direction, written `field` or `field__desc`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy<F> {
    pub field: F,
    pub descending: bool,
}

impl<F> OrderBy<F> {
    pub fn asc(field: F) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn desc(field: F) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    pub(crate) fn apply(&self, ordering: Ordering) -> Ordering {
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

impl<F: FromStr> FromStr for OrderBy<F> {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, descending) = match s.strip_suffix("__desc") {
            Some(name) => (name, true),
            None => (s, false),
        };

        let field = name
            .parse()
            .map_err(|_| ValidationError::new(format!("{s} is not a valid ordering")))?;

        Ok(Self { field, descending })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FirewallOrder {
    #[default]
    Id,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum PolicyOrder {
    #[default]
    Id,
    Name,
    DefaultAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RuleOrder {
    #[default]
    Id,
    Action,
    Priority,
}

impl<F: Default> Default for OrderBy<F> {
    fn default() -> Self {
        Self::asc(F::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FirewallQuery {
    pub name: Option<String>,
    pub order_by: OrderBy<FirewallOrder>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyQuery {
    pub name: Option<String>,
    pub default_action: Option<Action>,
    pub order_by: OrderBy<PolicyOrder>,
    pub visibility: Visibility,
}

/// Rule filters; source (and destination) filters must hold for one and the
/// same entry.
#[derive(Debug, Clone, Default)]
pub struct RuleQuery {
    pub action: Option<Action>,
    pub source_address: Option<AddressPattern>,
    pub source_port: Option<u16>,
    pub destination_address: Option<AddressPattern>,
    pub destination_port: Option<u16>,
    pub port: Option<u16>,
    pub order_by: OrderBy<RuleOrder>,
    pub visibility: Visibility,
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl PageRequest {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self { page, per_page }
    }

    /// Forces `page >= 1` and `1 <= per_page <= max_per_page`.
    pub fn clamped(self, max_per_page: u64) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, max_per_page.max(1)),
        }
    }

    pub fn paginate<T>(self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let skip = usize::try_from(self.page.saturating_sub(1).saturating_mul(self.per_page))
            .unwrap_or(usize::MAX);
        let take = usize::try_from(self.per_page).unwrap_or(usize::MAX);

        Page {
            items: items.into_iter().skip(skip).take(take).collect(),
            total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u64,
    pub per_page: u64,
}
