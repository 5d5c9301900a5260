//! One compilation run: criteria in, address sets out.
//!
//! Passes run one after the other against a builder owned by the run, so no
//! state outlives an invocation. Every problem below the artifact write is
//! logged and degrades to a smaller result.

use tracing::{debug, error, info, warn};

use crate::addrset::{AddressSetBuilder, AddressSets};
use crate::dataset::{DatasetKind, DatasetProvider};
use crate::filter::{
    filter_asn, filter_country, filter_locality, Criteria, CriterionKind, HitCounter,
    LocalityCounters,
};
use crate::resolver::{add_endpoint, resolve_endpoint, HostResolver};

/// Result of [`compile_sets`].
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub sets: AddressSets,
    /// Counters of the passes that read their dataset
    pub counters: Vec<HitCounter>,
    /// Datasets that were needed but unavailable
    pub missing: Vec<DatasetKind>,
    /// Custom tokens that could not be turned into addresses
    pub unresolved: Vec<String>,
}

impl CompileOutcome {
    pub fn counter(&self, kind: CriterionKind) -> Option<&HitCounter> {
        self.counters.iter().find(|c| c.kind() == kind)
    }
}

/// Run every pass `criteria` calls for and materialize the sets.
pub async fn compile_sets<P, R>(criteria: &Criteria, provider: &P, resolver: &R) -> CompileOutcome
where
    P: DatasetProvider + ?Sized,
    R: HostResolver + ?Sized,
{
    let mut builder = AddressSetBuilder::new();
    let mut counters = Vec::new();
    let mut missing = Vec::new();

    let countries = criteria.values(CriterionKind::Country);
    if !countries.is_empty() {
        let mut counter = HitCounter::new(CriterionKind::Country, &countries);
        match provider.open(DatasetKind::Country) {
            Ok(reader) => {
                filter_country(reader, &mut counter, &mut builder);
                counters.push(counter);
            }
            Err(e) => {
                error!("{}", e);
                missing.push(DatasetKind::Country);
            }
        }
    }

    let mut locality = LocalityCounters::from_criteria(criteria);
    if !locality.is_empty() {
        match provider.open(DatasetKind::City) {
            Ok(reader) => {
                filter_locality(reader, &mut locality, &mut builder);
                counters.extend(
                    locality
                        .into_counters()
                        .into_iter()
                        .filter(|c| !c.is_empty()),
                );
            }
            Err(e) => {
                error!("{}", e);
                missing.push(DatasetKind::City);
            }
        }
    }

    let asns = criteria.values(CriterionKind::Asn);
    if !asns.is_empty() {
        let mut counter = HitCounter::new(CriterionKind::Asn, &asns);
        match provider.open(DatasetKind::Asn) {
            Ok(reader) => {
                filter_asn(reader, &mut counter, &mut builder);
                counters.push(counter);
            }
            Err(e) => {
                error!("{}", e);
                missing.push(DatasetKind::Asn);
            }
        }
    }

    let mut unresolved = Vec::new();
    for token in criteria.values(CriterionKind::Custom) {
        let added = match resolve_endpoint(token, resolver).await {
            Ok(endpoint) => add_endpoint(&mut builder, &endpoint),
            Err(e) => Err(e),
        };
        match added {
            Ok(n) => debug!("custom {} added {} element(s)", token, n),
            Err(e) => {
                warn!("{}", e);
                unresolved.push(token.to_string());
            }
        }
    }

    for counter in &counters {
        counter.warn_unmatched();
    }

    let sets = builder.materialize();
    info!(
        "Compiled {} IPv4 and {} IPv6 elements",
        sets.ipv4.len(),
        sets.ipv6.len()
    );

    CompileOutcome {
        sets,
        counters,
        missing,
        unresolved,
    }
}
