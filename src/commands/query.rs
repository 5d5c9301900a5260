//! Query command implementation.
//!
//! Shows what the databases know about a host, without generating anything.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::query::run_query;
use crate::resolver::SystemResolver;

/// Run the query command
pub async fn run(host: &str, config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let datasets = super::dataset_directory(&config);
    let reports = run_query(host, &datasets, &SystemResolver::new()).await?;

    println!();
    println!("Query: {}", host);
    println!();
    for report in &reports {
        print!("{}", report);
    }

    Ok(())
}
