//! Per-family accumulation of nftables set elements.
//!
//! Elements are kept as canonical text tokens (`addr`, `net/len` or
//! `start-end`) in ordered sets, so duplicates collapse on insert and the
//! materialized output is sorted by plain string comparison. That order is
//! textual, not numeric ("10.0.0.0" sorts before "9.0.0.0"), and it is what
//! makes repeated runs produce identical artifacts.

use ipnet::IpNet;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::GeoNftError;

/// Address family of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Suffix of the set name and nftables element type stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "ipv4",
            AddressFamily::Ipv6 => "ipv6",
        }
    }

    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }
}

/// Incrementally built, de-duplicated IPv4 and IPv6 element sets.
#[derive(Debug, Default, Clone)]
pub struct AddressSetBuilder {
    ipv4: BTreeSet<String>,
    ipv6: BTreeSet<String>,
}

impl AddressSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a `start`/`end` pair and store it as `"start-end"`.
    ///
    /// Both endpoints must parse in the same family; anything else, including
    /// a range from an IPv4 to an IPv6 address, is rejected as not an address.
    pub fn validate_and_add(&mut self, start: &str, end: &str) -> Result<AddressFamily, GeoNftError> {
        let family = if start.parse::<Ipv4Addr>().is_ok() && end.parse::<Ipv4Addr>().is_ok() {
            AddressFamily::Ipv4
        } else if start.parse::<Ipv6Addr>().is_ok() && end.parse::<Ipv6Addr>().is_ok() {
            AddressFamily::Ipv6
        } else {
            return Err(GeoNftError::InvalidAddress {
                start: start.to_string(),
                end: end.to_string(),
            });
        };

        self.family_mut(family).insert(format!("{}-{}", start, end));
        Ok(family)
    }

    /// Store a single address.
    pub fn add_address(&mut self, ip: IpAddr) -> AddressFamily {
        let family = AddressFamily::of(&ip);
        self.family_mut(family).insert(ip.to_string());
        family
    }

    /// Store a network in `addr/len` form.
    pub fn add_network(&mut self, net: IpNet) -> AddressFamily {
        let family = match net {
            IpNet::V4(_) => AddressFamily::Ipv4,
            IpNet::V6(_) => AddressFamily::Ipv6,
        };
        self.family_mut(family).insert(net.to_string());
        family
    }

    pub fn len(&self, family: AddressFamily) -> usize {
        match family {
            AddressFamily::Ipv4 => self.ipv4.len(),
            AddressFamily::Ipv6 => self.ipv6.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }

    /// Produce both families as sorted element lists.
    pub fn materialize(self) -> AddressSets {
        AddressSets {
            ipv4: self.ipv4.into_iter().collect(),
            ipv6: self.ipv6.into_iter().collect(),
        }
    }

    fn family_mut(&mut self, family: AddressFamily) -> &mut BTreeSet<String> {
        match family {
            AddressFamily::Ipv4 => &mut self.ipv4,
            AddressFamily::Ipv6 => &mut self.ipv6,
        }
    }
}

/// Final, sorted element lists of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddressSets {
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
}

impl AddressSets {
    pub fn get(&self, family: AddressFamily) -> &[String] {
        match family {
            AddressFamily::Ipv4 => &self.ipv4,
            AddressFamily::Ipv6 => &self.ipv6,
        }
    }
}
