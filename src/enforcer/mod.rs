//! Live nftables side: finding where a set lives and swapping its contents.

mod nftables;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tracing::{error, info};

pub use nftables::{find_set_location, render_transaction, NftablesEnforcer};

use crate::error::GeoNftError;

/// Family and table currently hosting a named set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSetLocation {
    pub family: String,
    pub table: String,
}

impl fmt::Display for LiveSetLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.family, self.table)
    }
}

/// Enforcement point hosting the generated sets.
#[async_trait]
pub trait SetEnforcer: Send + Sync {
    /// Where the sets named after `set_name` are loaded, if anywhere.
    /// Lookup problems are logged and reported as not found.
    async fn locate_set(&self, set_name: &str) -> Option<LiveSetLocation>;

    /// Replace the contents of the live sets with `artifact` in one transaction.
    async fn apply(
        &self,
        location: &LiveSetLocation,
        set_name: &str,
        artifact: &Path,
    ) -> Result<(), GeoNftError>;
}

/// Apply `artifact` if its sets are currently loaded.
///
/// Nothing is attempted when the sets are not live; the artifact stays on
/// disk for a later or manual load either way.
pub async fn apply_if_live<E: SetEnforcer + ?Sized>(
    enforcer: &E,
    set_name: &str,
    artifact: &Path,
) -> Result<LiveSetLocation, GeoNftError> {
    let location = match enforcer.locate_set(set_name).await {
        Some(location) => location,
        None => {
            let err = GeoNftError::LiveSetNotFound(set_name.to_string());
            error!("{}", err);
            return Err(err);
        }
    };

    info!("Applying {} into table {}", artifact.display(), location);
    match enforcer.apply(&location, set_name, artifact).await {
        Ok(()) => {
            info!("applied");
            Ok(location)
        }
        Err(e) => {
            error!("error while applying nft set:\n{}", e);
            Err(e)
        }
    }
}

/// Locate the nft binary, preferring the usual sbin locations.
pub fn nft_path() -> &'static str {
    const CANDIDATES: [&str; 2] = ["/usr/sbin/nft", "/sbin/nft"];
    CANDIDATES
        .into_iter()
        .find(|p| Path::new(p).exists())
        .unwrap_or("nft")
}

/// Check if running as root (effective UID == 0)
pub fn check_root() -> anyhow::Result<()> {
    // SAFETY: geteuid() has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        anyhow::bail!(
            "Applying sets requires root privileges. Please run with sudo.\n\
             Alternatively, ensure the process has the CAP_NET_ADMIN capability."
        )
    }
    Ok(())
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// In-memory enforcer recording apply calls
    pub struct MockEnforcer {
        pub location: Option<LiveSetLocation>,
        pub reject_with: Option<String>,
        pub applied: Mutex<Vec<(LiveSetLocation, String, PathBuf)>>,
    }

    impl MockEnforcer {
        pub fn new(location: Option<LiveSetLocation>) -> Self {
            Self {
                location,
                reject_with: None,
                applied: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SetEnforcer for MockEnforcer {
        async fn locate_set(&self, _set_name: &str) -> Option<LiveSetLocation> {
            self.location.clone()
        }

        async fn apply(
            &self,
            location: &LiveSetLocation,
            set_name: &str,
            artifact: &Path,
        ) -> Result<(), GeoNftError> {
            self.applied.lock().unwrap().push((
                location.clone(),
                set_name.to_string(),
                artifact.to_path_buf(),
            ));
            match &self.reject_with {
                Some(msg) => Err(GeoNftError::TransactionFailure(msg.clone())),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockEnforcer;
    use super::*;

    fn raw_inet() -> LiveSetLocation {
        LiveSetLocation {
            family: "inet".to_string(),
            table: "raw".to_string(),
        }
    }

    #[tokio::test]
    async fn test_not_live_never_applies() {
        let enforcer = MockEnforcer::new(None);
        let result = apply_if_live(&enforcer, "geo_set", Path::new("/etc/geo_set.nft")).await;

        assert!(matches!(result, Err(GeoNftError::LiveSetNotFound(_))));
        assert!(enforcer.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_set_applied_into_its_table() {
        let enforcer = MockEnforcer::new(Some(raw_inet()));
        let location = apply_if_live(&enforcer, "geo_set", Path::new("/etc/geo_set.nft"))
            .await
            .unwrap();

        assert_eq!(location, raw_inet());
        let applied = enforcer.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].1, "geo_set");
        assert_eq!(applied[0].2, Path::new("/etc/geo_set.nft"));
    }

    #[tokio::test]
    async fn test_rejection_surfaces_diagnostic() {
        let mut enforcer = MockEnforcer::new(Some(raw_inet()));
        enforcer.reject_with = Some("Error: syntax error".to_string());

        let err = apply_if_live(&enforcer, "geo_set", Path::new("/etc/geo_set.nft"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Error: syntax error"));
    }

    #[test]
    fn test_location_display() {
        assert_eq!(raw_inet().to_string(), "inet raw");
    }

    #[test]
    fn test_nft_path_not_empty() {
        assert!(nft_path().ends_with("nft"));
    }
}
