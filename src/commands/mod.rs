//! CLI command implementations.

pub mod download;
pub mod generate;
pub mod query;

use crate::config::Config;
use crate::dataset::{current_period, DatasetDirectory};

/// Dataset directory for the current period, honouring the configured age limit.
pub(crate) fn dataset_directory(config: &Config) -> DatasetDirectory {
    DatasetDirectory::new(&config.database_path, current_period())
        .with_max_age(config.max_dataset_age())
}
