//! # geonft - nftables sets from geolocation and ASN data
//!
//! Compiles db-ip "lite" country, city and ASN databases, plus hand-picked
//! addresses, networks, ranges and host names, into two nftables interval
//! sets (`<name>_ipv4`, `<name>_ipv6`) and can swap them into a running
//! ruleset in a single transaction.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        geonft                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: generate, query, download, version         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Dataset (csv, glob, reqwest + flate2)                      │
//! │    └── Selection by period, monthly download, cleanup       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline                                                   │
//! │    ├── Filter passes with hit counters                      │
//! │    ├── Custom endpoints (ipnet, dns-lookup)                 │
//! │    └── AddressSetBuilder -> sorted element lists            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Compiler                                                   │
//! │    └── `set` blocks, no table, ready for `include`          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer (SetEnforcer trait)                               │
//! │    └── nft -j list sets, flush + include transaction        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use geonft::compiler::{compile, timestamp};
//! use geonft::dataset::{current_period, DatasetDirectory};
//! use geonft::filter::{Criteria, CriterionKind};
//! use geonft::pipeline::compile_sets;
//! use geonft::resolver::SystemResolver;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let datasets = DatasetDirectory::new("/var/lib/dbip", current_period());
//!
//!     let mut criteria = Criteria::new();
//!     criteria.extend(CriterionKind::Country, ["be", "nl"]);
//!     criteria.push(CriterionKind::Custom, "192.168.1.0/24");
//!
//!     let outcome = compile_sets(&criteria, &datasets, &SystemResolver::new()).await;
//!     std::fs::write("/etc/geo_set.nft", compile("geo_set", &outcome.sets, &timestamp()))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`addrset`] - Per-family deduplicating address sets
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - External command execution (mockable)
//! - [`commands`] - CLI command implementations
//! - [`compiler`] - nftables set rendering
//! - [`config`] - Configuration parsing and validation
//! - [`dataset`] - Dataset naming, selection, parsing and download
//! - [`enforcer`] - Live set lookup and transactional apply
//! - [`error`] - Error taxonomy
//! - [`filter`] - Criteria, hit counters and filter passes
//! - [`lock`] - Per-set file locking
//! - [`pipeline`] - One compilation run
//! - [`query`] - Read-only host lookup
//! - [`resolver`] - Custom endpoint and DNS resolution
//! - [`utils`] - Formatting helpers

pub mod addrset;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod compiler;
pub mod config;
pub mod dataset;
pub mod enforcer;
pub mod error;
pub mod filter;
pub mod lock;
pub mod pipeline;
pub mod query;
pub mod resolver;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::GeoNftError;
