//! Read-only lookup of the dataset attributes of a host.

use std::fmt;
use std::net::IpAddr;
use tracing::{debug, error};

use crate::dataset::{DatasetKind, DatasetProvider, RecordAttributes};
use crate::error::GeoNftError;
use crate::resolver::{resolve_host, HostResolver};

/// Attributes found for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReport {
    pub address: IpAddr,
    pub matches: Vec<(DatasetKind, RecordAttributes)>,
}

impl fmt::Display for QueryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.address)?;
        if self.matches.is_empty() {
            return writeln!(f, "  (no match in any database)");
        }
        for (kind, attributes) in &self.matches {
            for (label, value) in attributes.fields() {
                if !value.is_empty() {
                    writeln!(f, "  {:<10} {:<10} {}", kind.as_str(), label, value)?;
                }
            }
        }
        Ok(())
    }
}

/// Resolve `host` and look every address up in the three datasets.
///
/// A missing dataset is logged and skipped. Only a host that cannot be
/// resolved is an error.
pub async fn run_query<P, R>(
    host: &str,
    provider: &P,
    resolver: &R,
) -> Result<Vec<QueryReport>, GeoNftError>
where
    P: DatasetProvider + ?Sized,
    R: HostResolver + ?Sized,
{
    let addresses = resolve_host(host, resolver).await?;
    debug!("{} resolved to {:?}", host, addresses);

    let mut reports = Vec::with_capacity(addresses.len());
    for address in addresses {
        let mut matches = Vec::new();
        for kind in DatasetKind::ALL {
            let reader = match provider.open(kind) {
                Ok(reader) => reader,
                Err(e) => {
                    error!("{}", e);
                    continue;
                }
            };
            matches.extend(
                reader
                    .records()
                    .filter(|record| record.contains(address))
                    .map(|record| (kind, record.attributes)),
            );
        }
        reports.push(QueryReport { address, matches });
    }
    Ok(reports)
}
