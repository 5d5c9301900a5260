//! db-ip "lite" attribute datasets: file naming, selection and row parsing.
//!
//! Three kinds of CSV files are used, all keyed by an address range:
//!
//! ```text
//! country: start,end,country
//! city:    start,end,continent,country,region,city,...
//! asn:     start,end,asn,organization
//! ```
//!
//! Columns past the ones listed are ignored.

pub mod download;

use chrono::Local;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::error::GeoNftError;

/// Dataset kinds published by db-ip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetKind {
    Country,
    City,
    Asn,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [DatasetKind::Country, DatasetKind::City, DatasetKind::Asn];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Country => "country",
            DatasetKind::City => "city",
            DatasetKind::Asn => "asn",
        }
    }

    /// File name of the dataset for a period tag, e.g. `dbip-city-lite-2024-05.csv`.
    pub fn file_name(&self, period: &str) -> String {
        format!("dbip-{}-lite-{}.csv", self.as_str(), period)
    }

    /// Glob pattern matching every period of this kind.
    pub fn wildcard(&self) -> String {
        format!("dbip-{}-lite-*.csv", self.as_str())
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Period tag of the datasets published this month (`YYYY-MM`, local time).
pub fn current_period() -> String {
    Local::now().format("%Y-%m").to_string()
}

/// Kind-specific columns of a dataset row, kept as published (not case-folded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordAttributes {
    Country {
        country: String,
    },
    City {
        continent: String,
        country: String,
        region: String,
        city: String,
    },
    Asn {
        asn: String,
        organization: String,
    },
}

impl RecordAttributes {
    /// Named attribute values, in display order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            RecordAttributes::Country { country } => vec![("country", country.as_str())],
            RecordAttributes::City {
                continent,
                country,
                region,
                city,
            } => vec![
                ("continent", continent.as_str()),
                ("country", country.as_str()),
                ("region", region.as_str()),
                ("city", city.as_str()),
            ],
            RecordAttributes::Asn { asn, organization } => {
                vec![("asn", asn.as_str()), ("as-org", organization.as_str())]
            }
        }
    }
}

/// One dataset row. `start <= end` is trusted from upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRecord {
    pub start: String,
    pub end: String,
    pub attributes: RecordAttributes,
}

impl RangeRecord {
    /// Build a record from a CSV row. Rows with fewer than three columns are skipped.
    pub fn from_row(kind: DatasetKind, row: &csv::StringRecord) -> Option<Self> {
        if row.len() < 3 {
            return None;
        }
        let col = |i: usize| row.get(i).unwrap_or("").to_string();

        let attributes = match kind {
            DatasetKind::Country => RecordAttributes::Country { country: col(2) },
            DatasetKind::City => RecordAttributes::City {
                continent: col(2),
                country: col(3),
                region: col(4),
                city: col(5),
            },
            DatasetKind::Asn => RecordAttributes::Asn {
                asn: col(2),
                organization: col(3),
            },
        };

        Some(Self {
            start: col(0),
            end: col(1),
            attributes,
        })
    }

    /// Whether `ip` lies within `[start, end]`. Unparseable or cross-family bounds never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.start.parse::<IpAddr>(), self.end.parse::<IpAddr>()) {
            (Ok(IpAddr::V4(s)), Ok(IpAddr::V4(e))) => match ip {
                IpAddr::V4(ip) => s <= ip && ip <= e,
                IpAddr::V6(_) => false,
            },
            (Ok(IpAddr::V6(s)), Ok(IpAddr::V6(e))) => match ip {
                IpAddr::V6(ip) => s <= ip && ip <= e,
                IpAddr::V4(_) => false,
            },
            _ => false,
        }
    }
}

/// Streaming reader over the rows of one dataset.
pub struct DatasetReader<R: Read> {
    kind: DatasetKind,
    inner: csv::Reader<R>,
}

impl DatasetReader<File> {
    pub fn open(kind: DatasetKind, path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(kind, file))
    }
}

impl<R: Read> DatasetReader<R> {
    pub fn from_reader(kind: DatasetKind, reader: R) -> Self {
        let inner = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        Self { kind, inner }
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    /// Iterate over the parseable rows, skipping malformed ones.
    pub fn records(self) -> impl Iterator<Item = RangeRecord> {
        let kind = self.kind;
        self.inner
            .into_records()
            .filter_map(move |row| match row {
                Ok(row) => RangeRecord::from_row(kind, &row),
                Err(e) => {
                    debug!("Skipping unreadable {} row: {}", kind, e);
                    None
                }
            })
    }
}

/// Supplies the dataset file to read for a kind.
pub trait DatasetProvider: Send + Sync {
    /// Locate the freshest available dataset of `kind`.
    fn select(&self, kind: DatasetKind) -> Result<PathBuf, GeoNftError>;

    /// Open the selected dataset for reading.
    fn open(&self, kind: DatasetKind) -> Result<DatasetReader<File>, GeoNftError> {
        let path = self.select(kind)?;
        debug!("Reading {} database {}", kind, path.display());
        Ok(DatasetReader::open(kind, &path)?)
    }
}

/// Datasets stored in a local directory, one CSV per kind and period.
///
/// Prefers the file of the requested period; otherwise falls back to the
/// most recently modified file of the same kind. Selection only reads the
/// directory.
#[derive(Debug, Clone)]
pub struct DatasetDirectory {
    root: PathBuf,
    period: String,
    max_age: Option<Duration>,
}

impl DatasetDirectory {
    pub fn new(root: impl Into<PathBuf>, period: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            period: period.into(),
            max_age: None,
        }
    }

    /// Reject fallback files older than `max_age`.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    /// Every existing file of `kind`, with its modification time.
    pub fn candidates(&self, kind: DatasetKind) -> Vec<(PathBuf, SystemTime)> {
        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            kind.wildcard()
        );

        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Invalid dataset pattern {}: {}", pattern, e);
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .filter_map(|path| {
                let modified = path.metadata().and_then(|m| m.modified()).ok()?;
                Some((path, modified))
            })
            .collect()
    }
}

impl DatasetProvider for DatasetDirectory {
    fn select(&self, kind: DatasetKind) -> Result<PathBuf, GeoNftError> {
        let current = self.root.join(kind.file_name(&self.period));
        if current.is_file() {
            return Ok(current);
        }

        let newest = self
            .candidates(kind)
            .into_iter()
            .max_by_key(|(_, modified)| *modified);

        match newest {
            Some((path, modified)) => {
                if let Some(max_age) = self.max_age {
                    let age = modified.elapsed().unwrap_or_default();
                    if age > max_age {
                        warn!(
                            "{} database {} is {} days old, older than allowed",
                            kind,
                            path.display(),
                            age.as_secs() / 86_400
                        );
                        return Err(GeoNftError::DatasetMissing {
                            kind,
                            dir: self.root.clone(),
                        });
                    }
                }
                warn!(
                    "{} database for {} not found, using {}",
                    kind,
                    self.period,
                    path.display()
                );
                Ok(path)
            }
            None => Err(GeoNftError::DatasetMissing {
                kind,
                dir: self.root.clone(),
            }),
        }
    }
}
