//! nftables implementation of [`SetEnforcer`].
//!
//! The generated artifact holds bare set blocks, so applying it means
//! grafting it into whichever table already hosts the sets. The swap is one
//! `nft -f` run over a script that flushes both sets and re-includes the
//! artifact; nft checks and commits the whole file as a single transaction,
//! so the old contents stay in place if anything in it is rejected.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{nft_path, LiveSetLocation, SetEnforcer};
use crate::addrset::AddressFamily;
use crate::cmd_abstraction::{args_to_strings, CommandExecutor, RealCommandExecutor};
use crate::compiler::family_set_name;
use crate::error::GeoNftError;

const FAMILIES: [AddressFamily; 2] = [AddressFamily::Ipv4, AddressFamily::Ipv6];

/// nftables enforcer driving the `nft` binary through a [`CommandExecutor`].
pub struct NftablesEnforcer<E: CommandExecutor = RealCommandExecutor> {
    nft: String,
    executor: E,
    script_dir: PathBuf,
}

impl NftablesEnforcer<RealCommandExecutor> {
    pub fn new(nft: Option<&str>) -> Self {
        Self::with_executor(
            RealCommandExecutor::new(),
            nft.unwrap_or(nft_path()),
            std::env::temp_dir(),
        )
    }
}

impl<E: CommandExecutor> NftablesEnforcer<E> {
    pub fn with_executor(executor: E, nft: &str, script_dir: impl Into<PathBuf>) -> Self {
        Self {
            nft: nft.to_string(),
            executor,
            script_dir: script_dir.into(),
        }
    }

    /// Query `nft -j list sets` for the location of `set_name`'s sets.
    pub fn locate_set_sync(&self, set_name: &str) -> Option<LiveSetLocation> {
        let args = args_to_strings(&["-j", "list", "sets"]);
        let output = match self.executor.execute(&self.nft, &args) {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to run {}: {}", self.nft, e);
                return None;
            }
        };

        if !output.success {
            warn!("nft list sets failed: {}", output.stderr.trim());
            return None;
        }

        let names: Vec<String> = FAMILIES
            .iter()
            .map(|family| family_set_name(set_name, *family))
            .collect();
        find_set_location(&output.stdout, &names)
    }

    /// Write the transaction script, run it, and remove it again whatever the outcome.
    pub fn apply_sync(
        &self,
        location: &LiveSetLocation,
        set_name: &str,
        artifact: &Path,
    ) -> Result<(), GeoNftError> {
        let script = render_transaction(location, set_name, artifact)?;

        let mut file = tempfile::Builder::new()
            .prefix("geonft-apply-")
            .suffix(".nft")
            .tempfile_in(&self.script_dir)?;
        file.write_all(script.as_bytes())?;
        file.flush()?;
        debug!("Transaction script {}:\n{}", file.path().display(), script);

        let args = vec!["-f".to_string(), file.path().to_string_lossy().to_string()];
        let result = self.executor.execute(&self.nft, &args);

        if let Err(e) = file.close() {
            warn!("Failed to remove transaction script: {}", e);
        }

        let output = result
            .with_context(|| format!("Failed to execute {}", self.nft))
            .map_err(|e| GeoNftError::Command(format!("{:#}", e)))?;
        if !output.success {
            return Err(GeoNftError::TransactionFailure(output.stderr.trim().to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl<E: CommandExecutor> SetEnforcer for NftablesEnforcer<E> {
    async fn locate_set(&self, set_name: &str) -> Option<LiveSetLocation> {
        self.locate_set_sync(set_name)
    }

    async fn apply(
        &self,
        location: &LiveSetLocation,
        set_name: &str,
        artifact: &Path,
    ) -> Result<(), GeoNftError> {
        self.apply_sync(location, set_name, artifact)
    }
}

/// Find the first `set` entry named one of `names` in `nft -j list sets` output.
///
/// Malformed output is logged and treated as not found.
pub fn find_set_location(json: &str, names: &[String]) -> Option<LiveSetLocation> {
    let doc: Value = match serde_json::from_str(json) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Malformed nft json output: {}", e);
            return None;
        }
    };

    let Some(entries) = doc.get("nftables").and_then(Value::as_array) else {
        warn!("Malformed nft json output: no nftables array");
        return None;
    };

    entries
        .iter()
        .filter_map(|entry| entry.get("set"))
        .find(|set| {
            set.get("name")
                .and_then(Value::as_str)
                .map(|name| names.iter().any(|n| n == name))
                .unwrap_or(false)
        })
        .and_then(|set| {
            let family = set.get("family").and_then(Value::as_str);
            let table = set.get("table").and_then(Value::as_str);
            match (family, table) {
                (Some(family), Some(table)) => Some(LiveSetLocation {
                    family: family.to_string(),
                    table: table.to_string(),
                }),
                _ => {
                    warn!("Malformed nft json output: set without family or table");
                    None
                }
            }
        })
}

/// Script flushing both sets and re-including the artifact in their table.
pub fn render_transaction(
    location: &LiveSetLocation,
    set_name: &str,
    artifact: &Path,
) -> Result<String, GeoNftError> {
    let artifact = artifact.to_string_lossy();
    if artifact.contains('"') || artifact.contains('\n') {
        return Err(GeoNftError::Config(format!(
            "artifact path cannot be included by nft: {}",
            artifact
        )));
    }

    let mut script = String::new();
    for family in FAMILIES {
        script.push_str(&format!(
            "flush set {} {} {}\n",
            location.family,
            location.table,
            family_set_name(set_name, family)
        ));
    }
    script.push_str(&format!("table {} {} {{\n", location.family, location.table));
    script.push_str(&format!("  include \"{}\"\n", artifact));
    script.push_str("}\n");
    Ok(script)
}
