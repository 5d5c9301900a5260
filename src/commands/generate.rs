//! Generate command implementation.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use super::download;
use crate::cli::GenerateArgs;
use crate::compiler::{compile, timestamp};
use crate::config::Config;
use crate::enforcer::{apply_if_live, check_root, NftablesEnforcer};
use crate::filter::{Criteria, CriterionKind};
use crate::lock::LockGuard;
use crate::pipeline::compile_sets;
use crate::resolver::SystemResolver;
use crate::utils::{format_count, join_values};

/// Run the generate command
pub async fn run(args: GenerateArgs, config_path: &Path) -> Result<()> {
    let criteria = args.criteria();
    if criteria.is_empty() {
        error!("no country, continent, region, city, asn or custom endpoint specified");
        return Ok(());
    }

    let mut config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let datasets = super::dataset_directory(&config);
    if !args.offline && config.download.enabled {
        if let Err(e) = download::refresh(&config, &datasets).await {
            error!("Database download failed: {:#}", e);
        }
    }

    let artifact = config.artifact_path();
    log_request(&artifact, &config.set_name, &criteria);

    let outcome = compile_sets(&criteria, &datasets, &SystemResolver::new()).await;
    if outcome.sets.ipv4.is_empty() {
        warn!("WARNING: ipv4 set is empty");
    }
    if outcome.sets.ipv6.is_empty() {
        warn!("WARNING: ipv6 set is empty");
    }

    let content = compile(&config.set_name, &outcome.sets, &timestamp());
    write_artifact(&artifact, &content)?;
    info!(
        "Wrote {} ({} IPv4, {} IPv6 elements)",
        artifact.display(),
        format_count(outcome.sets.ipv4.len()),
        format_count(outcome.sets.ipv6.len())
    );

    if args.apply {
        apply(&config, &artifact).await;
    }

    info!("done");
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &GenerateArgs) {
    if let Some(ref set_name) = args.set_name {
        config.set_name = set_name.clone();
    }
    if let Some(ref path) = args.database_path {
        config.database_path = path.clone();
    }
    if let Some(ref dir) = args.output_dir {
        config.output_dir = dir.clone();
    }
}

fn log_request(artifact: &Path, set_name: &str, criteria: &Criteria) {
    let line = |kind| join_values(&criteria.values(kind));
    info!(
        "generating {} with set name {} for:\n\
         - autonomous system: {}\n\
         - countries:         {}\n\
         - continents:        {}\n\
         - regions:           {}\n\
         - cities:            {}\n\
         - custom:            {}",
        artifact.display(),
        set_name,
        line(CriterionKind::Asn),
        line(CriterionKind::Country),
        line(CriterionKind::Continent),
        line(CriterionKind::Region),
        line(CriterionKind::City),
        line(CriterionKind::Custom),
    );
}

/// Load the artifact into the live sets, if they are loaded anywhere.
/// Any failure here is logged, the artifact on disk is the result of the run.
async fn apply(config: &Config, artifact: &Path) {
    let applied = match check_root().and_then(|_| LockGuard::acquire(&config.set_name)) {
        Ok(_lock) => {
            let enforcer = NftablesEnforcer::new(Some(config.nft_binary.as_str()));
            apply_if_live(&enforcer, &config.set_name, artifact).await.is_ok()
        }
        Err(e) => {
            error!("{:#}, not applied", e);
            false
        }
    };

    if !applied {
        info!("{} kept on disk for a later load", artifact.display());
    }
}

/// Write the artifact atomically (temp file in the same directory + rename).
pub fn write_artifact(path: &Path, content: &str) -> Result<()> {
    let parent_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .with_context(|| format!("Failed to create temporary file in {}", parent_dir.display()))?;

    temp_file.write_all(content.as_bytes())?;
    temp_file.as_file().sync_all()?;

    temp_file
        .persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
