//! Matching of requested attribute values against dataset rows.
//!
//! Each pass reads one dataset once, adds every matching row's range to the
//! shared [`AddressSetBuilder`] and counts hits per requested value. Matching
//! is exact and case-insensitive; there is no prefix or substring matching.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use tracing::{debug, warn};

use crate::addrset::AddressSetBuilder;
use crate::dataset::{DatasetReader, RangeRecord, RecordAttributes};
use crate::error::GeoNftError;

/// Attribute a criterion is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CriterionKind {
    Asn,
    Country,
    Continent,
    Region,
    City,
    Custom,
}

impl CriterionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionKind::Asn => "asn",
            CriterionKind::Country => "country",
            CriterionKind::Continent => "continent",
            CriterionKind::Region => "region",
            CriterionKind::City => "city",
            CriterionKind::Custom => "custom",
        }
    }
}

impl fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested `(kind, value)` pair. The value is case-folded on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FilterCriterion {
    kind: CriterionKind,
    value: String,
}

impl FilterCriterion {
    pub fn new(kind: CriterionKind, value: &str) -> Self {
        let value = match kind {
            // Host names and addresses are passed through untouched apart from trimming
            CriterionKind::Custom => value.trim().to_string(),
            _ => value.trim().to_lowercase(),
        };
        Self { kind, value }
    }

    pub fn kind(&self) -> CriterionKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// All criteria of one invocation.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    items: Vec<FilterCriterion>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: CriterionKind, value: &str) {
        let criterion = FilterCriterion::new(kind, value);
        if !criterion.value.is_empty() && !self.items.contains(&criterion) {
            self.items.push(criterion);
        }
    }

    pub fn extend<I, S>(&mut self, kind: CriterionKind, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for value in values {
            self.push(kind, value.as_ref());
        }
    }

    /// Values requested for `kind`, in request order.
    pub fn values(&self, kind: CriterionKind) -> Vec<&str> {
        self.items
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.value.as_str())
            .collect()
    }

    pub fn has(&self, kind: CriterionKind) -> bool {
        self.items.iter().any(|c| c.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterCriterion> {
        self.items.iter()
    }
}

/// Hit counts per requested value of one criterion kind.
///
/// Every requested value is present from the start, so values that never
/// matched show up with a count of zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitCounter {
    kind: CriterionKind,
    hits: BTreeMap<String, usize>,
}

impl HitCounter {
    pub fn new<S: AsRef<str>>(kind: CriterionKind, values: &[S]) -> Self {
        let hits = values
            .iter()
            .map(|v| (v.as_ref().to_string(), 0))
            .collect();
        Self { kind, hits }
    }

    pub fn kind(&self) -> CriterionKind {
        self.kind
    }

    /// Whether `value` was requested.
    pub fn wants(&self, value: &str) -> bool {
        self.hits.contains_key(value)
    }

    /// Count a hit for `value` if it was requested.
    pub fn record(&mut self, value: &str) -> bool {
        match self.hits.get_mut(value) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    pub fn hits(&self, value: &str) -> Option<usize> {
        self.hits.get(value).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.hits.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Requested values without a single hit.
    pub fn unmatched(&self) -> Vec<GeoNftError> {
        self.hits
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(value, _)| GeoNftError::NoMatch {
                kind: self.kind.as_str(),
                value: value.clone(),
            })
            .collect()
    }

    /// Log one warning per unmatched value and return how many there were.
    pub fn warn_unmatched(&self) -> usize {
        let unmatched = self.unmatched();
        for no_match in &unmatched {
            warn!("WARNING: {}", no_match);
        }
        unmatched.len()
    }
}

/// Counters of the combined continent/region/city pass.
#[derive(Debug, Clone)]
pub struct LocalityCounters {
    pub continent: HitCounter,
    pub region: HitCounter,
    pub city: HitCounter,
}

impl LocalityCounters {
    pub fn from_criteria(criteria: &Criteria) -> Self {
        Self {
            continent: HitCounter::new(CriterionKind::Continent, &criteria.values(CriterionKind::Continent)),
            region: HitCounter::new(CriterionKind::Region, &criteria.values(CriterionKind::Region)),
            city: HitCounter::new(CriterionKind::City, &criteria.values(CriterionKind::City)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.continent.is_empty() && self.region.is_empty() && self.city.is_empty()
    }

    pub fn into_counters(self) -> [HitCounter; 3] {
        [self.continent, self.region, self.city]
    }
}

/// Add a matched row to the builder, logging rows that are not addresses.
fn add_record(builder: &mut AddressSetBuilder, record: &RangeRecord) {
    if let Err(e) = builder.validate_and_add(&record.start, &record.end) {
        warn!("{}", e);
    }
}

/// Country pass over a country-kind dataset. Returns the number of matched rows.
pub fn filter_country<R: Read>(
    reader: DatasetReader<R>,
    counter: &mut HitCounter,
    builder: &mut AddressSetBuilder,
) -> usize {
    let mut matched = 0;
    for record in reader.records() {
        if let RecordAttributes::Country { country } = &record.attributes {
            if counter.record(&country.to_lowercase()) {
                add_record(builder, &record);
                matched += 1;
            }
        }
    }
    debug!("country pass matched {} rows", matched);
    matched
}

/// ASN pass over an asn-kind dataset.
///
/// A row matches on its AS number or its AS organization name; each of the two
/// that was requested is credited.
pub fn filter_asn<R: Read>(
    reader: DatasetReader<R>,
    counter: &mut HitCounter,
    builder: &mut AddressSetBuilder,
) -> usize {
    let mut matched = 0;
    for record in reader.records() {
        if let RecordAttributes::Asn { asn, organization } = &record.attributes {
            let asn_hit = counter.record(&asn.to_lowercase());
            let org_hit = !organization.is_empty() && counter.record(&organization.to_lowercase());
            if asn_hit || org_hit {
                add_record(builder, &record);
                matched += 1;
            }
        }
    }
    debug!("asn pass matched {} rows", matched);
    matched
}

/// Combined continent/region/city pass over a city-kind dataset, so the
/// largest dataset is read only once.
pub fn filter_locality<R: Read>(
    reader: DatasetReader<R>,
    counters: &mut LocalityCounters,
    builder: &mut AddressSetBuilder,
) -> usize {
    let mut matched = 0;
    for record in reader.records() {
        if let RecordAttributes::City {
            continent,
            region,
            city,
            ..
        } = &record.attributes
        {
            let continent_hit = !counters.continent.is_empty()
                && counters.continent.record(&continent.to_lowercase());
            let region_hit =
                !counters.region.is_empty() && counters.region.record(&region.to_lowercase());
            let city_hit = !counters.city.is_empty() && counters.city.record(&city.to_lowercase());

            if continent_hit || region_hit || city_hit {
                add_record(builder, &record);
                matched += 1;
            }
        }
    }
    debug!("locality pass matched {} rows", matched);
    matched
}
