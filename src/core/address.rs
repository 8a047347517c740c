//! Address/port patterns used by rule sources and destinations
//!
//! A pattern is either a single IPv4 host or an IPv4 network. Hosts match
//! by equality, networks by containment. The port always matches exactly.

use std::fmt;
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::validators::{ValidationError, validate_address, validate_port};

/// IPv4 host or network, stored in its textual form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AddressPattern {
    Host(Ipv4Addr),
    Network(Ipv4Network),
}

impl AddressPattern {
    pub fn is_host(&self) -> bool {
        matches!(self, AddressPattern::Host(_))
    }

    /// Returns `true` if `candidate` is the host itself or lies inside the network.
    pub fn contains(&self, candidate: Ipv4Addr) -> bool {
        match self {
            AddressPattern::Host(ip) => *ip == candidate,
            AddressPattern::Network(network) => network.contains(candidate),
        }
    }
}

impl fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressPattern::Host(ip) => write!(f, "{ip}"),
            AddressPattern::Network(network) => {
                write!(f, "{}/{}", network.network(), network.prefix())
            }
        }
    }
}

impl std::str::FromStr for AddressPattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_address(s)
    }
}

impl TryFrom<String> for AddressPattern {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_address(&value)
    }
}

impl From<AddressPattern> for String {
    fn from(pattern: AddressPattern) -> Self {
        pattern.to_string()
    }
}

/// One source or destination entry of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkAddress {
    pub address: AddressPattern,
    pub port: u16,
}

impl NetworkAddress {
    /// Builds an entry from raw input, validating both fields.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the address is not an IPv4 host/network or the port
    /// is out of range.
    pub fn parse(address: &str, port: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            address: validate_address(address)?,
            port: validate_port(port)?,
        })
    }

    /// Both the address and the port must match.
    pub fn matches(&self, candidate_address: Ipv4Addr, candidate_port: u16) -> bool {
        self.address.contains(candidate_address) && self.port == candidate_port
    }

    /// Canonical bytes used for the rule uniqueness hashes.
    pub(crate) fn key(&self) -> Vec<u8> {
        format!("{}|{}", self.address, self.port).into_bytes()
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}
