//! Rendering of address sets into nftables set definitions.
//!
//! The artifact holds bare `set` blocks without a surrounding table, so it
//! can be included from any table (`include "/etc/geo_set.nft"`). Apart from
//! the timestamp in the header, the same input always renders the same bytes.

use chrono::Local;
use std::fmt::{self, Write};
use tracing::warn;

use crate::addrset::{AddressFamily, AddressSets};

const ATTRIBUTION: &str = "# used geo ip databases from https://db-ip.com with Creative Commons Attribution 4.0 International License";

/// Name of the set holding `family` for a set name prefix (`geo_set_ipv4`).
pub fn family_set_name(set_name: &str, family: AddressFamily) -> String {
    format!("{}_{}", set_name, family.as_str())
}

/// Timestamp written into the artifact header.
pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Element only contains address characters.
/// Elements come from parsed addresses, so this should never reject anything.
fn is_safe_nft_element(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_hexdigit() || matches!(c, '.' | ':' | '/' | '-'))
}

/// One interval set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDefinition<'a> {
    pub name: String,
    pub family: AddressFamily,
    pub elements: &'a [String],
}

impl fmt::Display for SetDefinition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "set {} {{", self.name)?;
        writeln!(f, "  type {}_addr", self.family.as_str())?;
        writeln!(f, "  flags interval")?;
        writeln!(f, "  auto-merge")?;

        let elements: Vec<&str> = self
            .elements
            .iter()
            .map(String::as_str)
            .filter(|s| {
                let safe = is_safe_nft_element(s);
                if !safe {
                    warn!("Filtered unsafe nftables element: {}", s);
                }
                safe
            })
            .collect();

        if !elements.is_empty() {
            writeln!(f, "  elements = {{")?;
            writeln!(f, "\t{}", elements.join(",\n\t"))?;
            writeln!(f, "  }}")?;
        }
        writeln!(f, "}}")
    }
}

/// The complete file: header plus the IPv4 and IPv6 sets.
#[derive(Debug, Clone)]
pub struct Artifact<'a> {
    pub generated_at: String,
    pub sets: [SetDefinition<'a>; 2],
}

impl<'a> Artifact<'a> {
    pub fn new(set_name: &str, sets: &'a AddressSets, generated_at: impl Into<String>) -> Self {
        let definition = move |family| SetDefinition {
            name: family_set_name(set_name, family),
            family,
            elements: sets.get(family),
        };
        Self {
            generated_at: generated_at.into(),
            sets: [definition(AddressFamily::Ipv4), definition(AddressFamily::Ipv6)],
        }
    }
}

impl fmt::Display for Artifact<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# generated by geonft on {}", self.generated_at)?;
        writeln!(f, "{}", ATTRIBUTION)?;
        for set in &self.sets {
            writeln!(f)?;
            write!(f, "{}", set)?;
        }
        Ok(())
    }
}

/// Render both sets of `sets` under `set_name`.
pub fn compile(set_name: &str, sets: &AddressSets, generated_at: &str) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write!(out, "{}", Artifact::new(set_name, sets, generated_at));
    out
}
