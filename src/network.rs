//! CIDR networks
//!
//! A `Network` is an address plus a prefix length with the host bits
//! cleared. It is what the enumerator yields and what `networks_within`
//! accepts.

use crate::error::MmdbError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IP network in CIDR form, e.g. `1.1.1.0/24` or `2001::/32`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Network {
    addr: IpAddr,
    prefix_len: u8,
}

impl Network {
    /// Create a network, clearing any host bits of `addr`
    ///
    /// Fails if `prefix_len` exceeds the address width.
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, MmdbError> {
        let width = width_of(&addr);
        if prefix_len > width {
            return Err(MmdbError::InvalidNetwork(format!(
                "prefix length {} exceeds {} bits for {}",
                prefix_len, width, addr
            )));
        }
        Ok(Self::from_bits(address_bits(&addr), prefix_len, addr.is_ipv4()))
    }

    /// Rebuild a network from an integer address
    ///
    /// `prefix_len` must not exceed the width of the chosen family.
    pub(crate) fn from_bits(bits: u128, prefix_len: u8, ipv4: bool) -> Self {
        let width = if ipv4 { 32 } else { 128 };
        debug_assert!(prefix_len <= width);
        let masked = bits & prefix_mask(prefix_len, width);
        let addr = if ipv4 {
            IpAddr::V4(Ipv4Addr::from(masked as u32))
        } else {
            IpAddr::V6(Ipv6Addr::from(masked))
        };
        Network { addr, prefix_len }
    }

    /// The whole IPv4 address space
    pub const fn ipv4_all() -> Self {
        Network {
            addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            prefix_len: 0,
        }
    }

    /// The whole IPv6 address space
    pub const fn ipv6_all() -> Self {
        Network {
            addr: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            prefix_len: 0,
        }
    }

    /// Network address (host bits are zero)
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length in bits
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Lowest address inside the network
    pub fn first_address(&self) -> IpAddr {
        self.addr
    }

    /// Whether this is an IPv4 network
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// Whether `ip` falls inside this network
    ///
    /// Addresses of the other family never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        if ip.is_ipv4() != self.is_ipv4() {
            return false;
        }
        let width = width_of(&ip);
        address_bits(&ip) & prefix_mask(self.prefix_len, width) == self.bits()
    }

    /// Address as an integer (IPv4 occupies the low 32 bits)
    pub(crate) fn bits(&self) -> u128 {
        address_bits(&self.addr)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for Network {
    type Err = MmdbError;

    /// Parse `addr/len`; a bare address is a single-host network
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr_str, prefix_str) = match s.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (s, None),
        };

        let addr: IpAddr = addr_str
            .parse()
            .map_err(|_| MmdbError::InvalidNetwork(format!("invalid address: {}", s)))?;
        let prefix_len = match prefix_str {
            Some(p) => p
                .parse::<u8>()
                .map_err(|_| MmdbError::InvalidNetwork(format!("invalid prefix length: {}", s)))?,
            None => width_of(&addr),
        };

        Network::new(addr, prefix_len)
    }
}

pub(crate) fn width_of(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

pub(crate) fn address_bits(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(u32::from(*v4)),
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

/// Mask with the top `prefix_len` of `width` bits set
pub(crate) fn prefix_mask(prefix_len: u8, width: u8) -> u128 {
    let all = u128::MAX >> (128 - u32::from(width));
    let host_bits = u32::from(width - prefix_len);
    all & all.checked_shl(host_bits).unwrap_or(0)
}
