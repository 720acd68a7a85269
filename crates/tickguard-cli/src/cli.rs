//! CLI argument definitions for tickguard.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `validate` | Validate configuration from the environment |
//! | `resolve` | Resolve a value through cache and providers |
//! | `providers` | List providers, enabled flags and health |
//! | `cache` | Inspect or clear the L1/L2 entry cache |
//! | `artifacts` | Maintain the L3 artifact store |
//!
//! # Examples
//!
//! ```bash
//! tickguard validate --pretty
//! tickguard resolve quote AAPL
//! tickguard cache clear 'quote:*'
//! tickguard artifacts sentiment AAPL --from 2024-01-01 --to 2024-01-31
//! ```

use clap::{Args, Parser, Subcommand};
use tickguard_core::Capability;

/// Operator CLI for the tickguard market-data access layer.
#[derive(Debug, Parser)]
#[command(
    name = "tickguard",
    author,
    version,
    about = "Tiered market-data cache and provider fallback router"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate configuration; exits 2 when validation is fatal.
    Validate,

    /// Resolve one value; exits 3 when every provider is unavailable.
    ///
    /// # Examples
    ///
    ///   tickguard resolve quote AAPL
    ///   tickguard resolve news 123
    Resolve(ResolveArgs),

    /// List configured providers with health snapshots.
    Providers,

    /// Entry cache administration.
    Cache(CacheArgs),

    /// Artifact store administration.
    Artifacts(ArtifactsArgs),
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// quote, fundamentals, news or filing.
    #[arg(value_parser = parse_capability)]
    pub capability: Capability,

    /// Ticker or record identifier.
    pub identifier: String,
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Backend kind, size and hit/miss counters.
    Stats,

    /// Remove entries matching a glob pattern, or everything.
    Clear {
        /// Glob pattern such as `quote:*`.
        pattern: Option<String>,
    },

    /// Age of one entry in milliseconds.
    Age {
        /// Full cache key, e.g. `quote:AAPL:v1`.
        key: String,
    },

    /// Selected backend and its location.
    Details,
}

#[derive(Debug, Args)]
pub struct ArtifactsArgs {
    #[command(subcommand)]
    pub command: ArtifactsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ArtifactsCommand {
    /// Delete expired filing summaries and company profiles.
    Cleanup,

    /// Delete every artifact stored for a ticker.
    Clear {
        ticker: String,
    },

    /// News sentiment records and their average over a date range.
    Sentiment {
        ticker: String,

        /// First day, YYYY-MM-DD.
        #[arg(long)]
        from: String,

        /// Last day, YYYY-MM-DD.
        #[arg(long)]
        to: String,
    },
}

fn parse_capability(raw: &str) -> Result<Capability, String> {
    raw.parse::<Capability>().map_err(|error| error.to_string())
}
