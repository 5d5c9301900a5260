//! CLI argument parsing with clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::filter::{Criteria, CriterionKind};

#[derive(Parser)]
#[command(name = "geonft")]
#[command(
    author,
    version,
    about = "Build nftables sets from db-ip geolocation and ASN databases"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (only errors, for cron/systemd timer)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate the set file, optionally applying it to the live ruleset
    Generate(GenerateArgs),

    /// Show the database entries matching a host or address
    Query {
        /// IP address or host name
        host: String,
    },

    /// Download the current databases and remove outdated ones
    Download,

    /// Show version
    Version,
}

#[derive(Args, Debug, Default)]
pub struct GenerateArgs {
    /// Autonomous system numbers or names, exact match, case insensitive
    #[arg(short, long, num_args = 1.., value_name = "ASN")]
    pub asn: Vec<String>,

    /// Two letter ISO country codes, case insensitive
    #[arg(short, long, num_args = 1.., value_name = "CODE")]
    pub country: Vec<String>,

    /// Continent codes (EU, NA, ...), case insensitive
    #[arg(long, num_args = 1.., value_name = "CODE")]
    pub continent: Vec<String>,

    /// Regions, exact match, case insensitive
    #[arg(long, num_args = 1.., value_name = "NAME")]
    pub region: Vec<String>,

    /// Cities, exact match, case insensitive
    #[arg(long, num_args = 1.., value_name = "NAME")]
    pub city: Vec<String>,

    /// Extra addresses, networks, start-end ranges or host names
    #[arg(long, num_args = 1.., value_name = "ENDPOINT")]
    pub custom: Vec<String>,

    /// Set name prefix (overrides config)
    #[arg(long)]
    pub set_name: Option<String>,

    /// Database directory (overrides config)
    #[arg(long)]
    pub database_path: Option<PathBuf>,

    /// Output directory for the set file (overrides config)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Load the generated sets into the running ruleset
    #[arg(long)]
    pub apply: bool,

    /// Use the databases already on disk, never download
    #[arg(long)]
    pub offline: bool,
}

impl GenerateArgs {
    /// Collect the requested filter values, case-folded and deduplicated.
    pub fn criteria(&self) -> Criteria {
        let mut criteria = Criteria::new();
        criteria.extend(CriterionKind::Asn, &self.asn);
        criteria.extend(CriterionKind::Country, &self.country);
        criteria.extend(CriterionKind::Continent, &self.continent);
        criteria.extend(CriterionKind::Region, &self.region);
        criteria.extend(CriterionKind::City, &self.city);
        criteria.extend(CriterionKind::Custom, &self.custom);
        criteria
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses_help() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_version_command() {
        let cli = Cli::try_parse_from(["geonft", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn test_cli_default_config_path() {
        let cli = Cli::try_parse_from(["geonft", "download"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!cli.quiet);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_generate_multiple_values() {
        let cli = Cli::try_parse_from([
            "geonft", "generate", "-c", "BE", "NL", "--asn", "AS1234", "--city", "Ghent", "--apply",
        ])
        .unwrap();
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.country, vec!["BE", "NL"]);
                assert_eq!(args.asn, vec!["AS1234"]);
                assert!(args.apply);
                assert!(!args.offline);

                let criteria = args.criteria();
                assert_eq!(criteria.values(CriterionKind::Country), vec!["be", "nl"]);
                assert_eq!(criteria.values(CriterionKind::Asn), vec!["as1234"]);
                assert_eq!(criteria.values(CriterionKind::City), vec!["ghent"]);
            }
            _ => panic!("Expected Generate command"),
        }
    }

    #[test]
    fn test_cli_generate_without_criteria_parses() {
        let cli = Cli::try_parse_from(["geonft", "generate"]).unwrap();
        match cli.command {
            Commands::Generate(args) => assert!(args.criteria().is_empty()),
            _ => panic!("Expected Generate command"),
        }
    }

    #[test]
    fn test_cli_generate_overrides() {
        let cli = Cli::try_parse_from([
            "geonft",
            "generate",
            "--custom",
            "10.0.0.5-10.0.0.9",
            "--set-name",
            "blocked",
            "--output-dir",
            "/tmp",
            "--offline",
            "-q",
        ])
        .unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.set_name.as_deref(), Some("blocked"));
                assert_eq!(args.output_dir, Some(PathBuf::from("/tmp")));
                assert!(args.offline);
                assert_eq!(args.custom, vec!["10.0.0.5-10.0.0.9"]);
            }
            _ => panic!("Expected Generate command"),
        }
    }

    #[test]
    fn test_cli_query_command() {
        let cli = Cli::try_parse_from(["geonft", "query", "1.2.3.4"]).unwrap();
        match cli.command {
            Commands::Query { host } => assert_eq!(host, "1.2.3.4"),
            _ => panic!("Expected Query command"),
        }
    }
}
