// Copyright (c) 2025 - Cowboy AI, Inc.
//! CIDR Address Block Value Object with Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// CIDR validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CidrError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32 for IPv4, 0-128 for IPv6)")]
    InvalidPrefixLength(u8),

    #[error("Host bits set in network block: {0}")]
    HostBitsSet(String),
}

/// Address family of a CIDR block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Maximum prefix length for this family
    pub fn max_prefix(&self) -> u8 {
        match self {
            Self::Ipv4 => 32,
            Self::Ipv6 => 128,
        }
    }
}

/// CIDR network block value object
///
/// Represents an IPv4 or IPv6 network as base address plus prefix length.
/// Invariants:
/// - Valid IP address format
/// - Prefix length within the family's range
/// - Canonical: no host bits set below the prefix
///
/// # Examples
///
/// ```rust
/// use cim_topology::domain::Cidr;
///
/// let net = Cidr::new("10.0.0.0/16").unwrap();
/// let sub = Cidr::new("10.0.1.0/24").unwrap();
/// assert!(net.contains(&sub));
/// assert!(Cidr::new("10.0.0.1/16").is_err());  // host bits set
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    address: IpAddr,
    prefix_length: u8,
}

impl Cidr {
    /// Parse a CIDR block (e.g. `"10.0.0.0/16"`)
    ///
    /// # Invariants
    /// - Prefix length is required
    /// - Prefix length 0-32 for IPv4, 0-128 for IPv6
    /// - Host bits must be zero
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, CidrError> {
        let cidr = cidr.as_ref();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| CidrError::InvalidCidr(cidr.to_string()))?;

        let address = IpAddr::from_str(addr_str)
            .map_err(|_| CidrError::InvalidIpAddress(addr_str.to_string()))?;

        let prefix_length = prefix_str
            .parse::<u8>()
            .map_err(|_| CidrError::InvalidCidr(cidr.to_string()))?;

        let block = Self::from_parts(address, prefix_length)?;
        if block.address != address {
            return Err(CidrError::HostBitsSet(cidr.to_string()));
        }

        Ok(block)
    }

    /// Create from an address and prefix, clearing any host bits
    pub fn from_parts(address: IpAddr, prefix_length: u8) -> Result<Self, CidrError> {
        let family = family_of(&address);
        if prefix_length > family.max_prefix() {
            return Err(CidrError::InvalidPrefixLength(prefix_length));
        }

        let host_bits = family.max_prefix() - prefix_length;
        let base = to_bits(&address) & !low_mask(host_bits);

        Ok(Self {
            address: from_bits(family, base),
            prefix_length,
        })
    }

    /// Create from a numeric base address in the given family
    pub(crate) fn from_numeric(
        family: AddressFamily,
        base: u128,
        prefix_length: u8,
    ) -> Result<Self, CidrError> {
        Self::from_parts(from_bits(family, base), prefix_length)
    }

    /// Get the network base address
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Get the prefix length
    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Get the address family
    pub fn family(&self) -> AddressFamily {
        family_of(&self.address)
    }

    /// Check if this is an IPv4 block
    pub fn is_ipv4(&self) -> bool {
        matches!(self.address, IpAddr::V4(_))
    }

    /// Number of host bits below the prefix
    pub fn host_bits(&self) -> u8 {
        self.family().max_prefix() - self.prefix_length
    }

    /// First address of the block, as an integer
    pub fn first(&self) -> u128 {
        to_bits(&self.address)
    }

    /// Last address of the block, as an integer
    pub fn last(&self) -> u128 {
        self.first() | low_mask(self.host_bits())
    }

    /// True when `other` lies entirely inside this block
    pub fn contains(&self, other: &Cidr) -> bool {
        self.family() == other.family()
            && other.prefix_length >= self.prefix_length
            && other.first() >= self.first()
            && other.last() <= self.last()
    }

    /// True when the two blocks share at least one address
    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.family() == other.family()
            && self.first() <= other.last()
            && other.first() <= self.last()
    }

    /// Canonical CIDR notation
    pub fn as_cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_length)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_cidr())
    }
}

impl FromStr for Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Cidr {
    type Error = CidrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.as_cidr()
    }
}

fn family_of(address: &IpAddr) -> AddressFamily {
    match address {
        IpAddr::V4(_) => AddressFamily::Ipv4,
        IpAddr::V6(_) => AddressFamily::Ipv6,
    }
}

fn to_bits(address: &IpAddr) -> u128 {
    match address {
        IpAddr::V4(v4) => u32::from(*v4) as u128,
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

fn from_bits(family: AddressFamily, bits: u128) -> IpAddr {
    match family {
        AddressFamily::Ipv4 => IpAddr::V4(Ipv4Addr::from(bits as u32)),
        AddressFamily::Ipv6 => IpAddr::V6(Ipv6Addr::from(bits)),
    }
}

/// Mask with the lowest `bits` bits set
pub(crate) fn low_mask(bits: u8) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_ipv4_block() {
        let net = Cidr::new("10.0.0.0/16").unwrap();
        assert_eq!(net.address().to_string(), "10.0.0.0");
        assert_eq!(net.prefix_length(), 16);
        assert!(net.is_ipv4());
        assert_eq!(net.host_bits(), 16);
        assert_eq!(net.last() - net.first(), 65_535);
        assert_eq!(net.as_cidr(), "10.0.0.0/16");
    }

    #[test]
    fn test_ipv6_block() {
        let net = Cidr::new("2001:db8::/32").unwrap();
        assert_eq!(net.family(), AddressFamily::Ipv6);
        assert!(net.contains(&Cidr::new("2001:db8:1::/48").unwrap()));
        assert_eq!(Cidr::new("::/0").unwrap().last(), u128::MAX);
    }

    #[test_case("10.0.0.0" ; "missing prefix")]
    #[test_case("10.0.0.0/33" ; "prefix too long")]
    #[test_case("999.0.0.0/8" ; "bad address")]
    #[test_case("10.0.0.1/24" ; "host bits set")]
    #[test_case("2001:db8::/129" ; "ipv6 prefix too long")]
    fn test_invalid_blocks(input: &str) {
        assert!(Cidr::new(input).is_err());
    }

    #[test]
    fn test_from_parts_clears_host_bits() {
        let block = Cidr::from_parts("10.0.3.7".parse().unwrap(), 24).unwrap();
        assert_eq!(block.as_cidr(), "10.0.3.0/24");
    }

    #[test]
    fn test_contains_and_overlaps() {
        let net = Cidr::new("10.0.0.0/16").unwrap();
        let a = Cidr::new("10.0.0.0/24").unwrap();
        let b = Cidr::new("10.0.0.128/25").unwrap();
        let c = Cidr::new("10.0.1.0/24").unwrap();
        let outside = Cidr::new("10.1.0.0/24").unwrap();

        assert!(net.contains(&a));
        assert!(!a.contains(&net));
        assert!(!net.contains(&outside));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&Cidr::new("2001:db8::/32").unwrap()));
    }

    #[test]
    fn test_serde_uses_cidr_notation() {
        let block = Cidr::new("192.168.0.0/20").unwrap();
        let json = serde_json::to_string(&block).unwrap();
        assert_eq!(json, "\"192.168.0.0/20\"");
        let back: Cidr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }
}
