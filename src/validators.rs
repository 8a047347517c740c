//! Input validation for fwpolicy entities
//!
//! Every entity is validated at construction time, so a rule that made it
//! into the store can always be matched without further checks.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use thiserror::Error;

use crate::core::address::AddressPattern;

/// Inclusive range of valid TCP port numbers
pub const VALID_TCP_PORT_RANGE: (i64, i64) = (0, 65535);

/// Rejected input, carrying the message shown to the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Validates a firewall or filtering policy name.
///
/// Returns the trimmed name, which is what gets stored.
///
/// # Examples
///
/// ```
/// use fwpolicy::validators::validate_name;
///
/// assert_eq!(validate_name("  edge  ").unwrap(), "edge");
/// assert!(validate_name("   ").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::new("Name cannot be empty or whitespace"));
    }

    Ok(name.to_string())
}

pub fn is_valid_port(port: i64) -> bool {
    let (min, max) = VALID_TCP_PORT_RANGE;
    (min..=max).contains(&port)
}

/// Validates a port number.
///
/// # Errors
///
/// Returns `Err` if the port lies outside `0..=65535`.
pub fn validate_port(port: i64) -> Result<u16, ValidationError> {
    if is_valid_port(port) {
        u16::try_from(port).map_err(|_| invalid_port(port))
    } else {
        Err(invalid_port(port))
    }
}

fn invalid_port(port: i64) -> ValidationError {
    ValidationError::new(format!("{port} is not a valid port number"))
}

/// Validates an IPv4 host address or an IPv4 network in CIDR notation.
///
/// Networks are parsed strictly: octets may not carry leading zeros, the
/// prefix must be 0-32 and the address may not have host bits set
/// (`1.1.0.0/16` is accepted, `1.1.1.0/16` is not).
///
/// # Errors
///
/// Returns `Err` if the input is neither a host address nor a network.
pub fn validate_address(address: &str) -> Result<AddressPattern, ValidationError> {
    if let Ok(ip) = address.parse::<Ipv4Addr>() {
        return Ok(AddressPattern::Host(ip));
    }

    parse_strict_network(address)
        .map(AddressPattern::Network)
        .ok_or_else(|| {
            ValidationError::new(format!(
                "{address} is not a valid IP address or subnet CIDR"
            ))
        })
}

fn parse_strict_network(address: &str) -> Option<Ipv4Network> {
    let (ip, prefix) = address.split_once('/')?;

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let ip: Ipv4Addr = ip.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    let network = Ipv4Network::new(ip, prefix).ok()?;

    (network.network() == ip).then_some(network)
}
