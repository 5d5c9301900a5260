//! Error types for geonft.
//!
//! Most of these are non-fatal: the pipeline logs them and carries on with a
//! smaller (possibly empty) result. Only a failed artifact write stops a run.

use std::path::PathBuf;
use thiserror::Error;

use crate::dataset::DatasetKind;

#[derive(Error, Debug)]
pub enum GeoNftError {
    #[error("not an ip: {start} - {end}")]
    InvalidAddress { start: String, end: String },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("network has host bits set: {0}")]
    InvalidNetwork(String),

    #[error("{kind} database missing in {}", dir.display())]
    DatasetMissing { kind: DatasetKind, dir: PathBuf },

    #[error("no match for {kind} '{value}'")]
    NoMatch { kind: &'static str, value: String },

    #[error("{0} is not an address and not resolvable")]
    ResolutionFailure(String),

    #[error("set {0} is not active in nftables, not applied")]
    LiveSetNotFound(String),

    #[error("nft rejected the transaction: {0}")]
    TransactionFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Command error: {0}")]
    Command(String),
}
