//! Configuration management for tiledepot.
//!
//! This module provides the command-line interface, which supports:
//! - Subcommands for serving, listing packages and installing a package
//! - Environment variables with `TILEDEPOT_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use tiledepot::config::{Cli, Command};
//!
//! match Cli::parse().command {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Packages(config) => println!("Manifest: {}", config.manifest),
//!     Command::Install(config) => println!("Installing {}", config.package),
//!     Command::Clear(config) => println!("Clearing {}", config.dest.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `TILEDEPOT_HOST` - Server bind address (default: 127.0.0.1)
//! - `TILEDEPOT_PORT` - Server port (default: 3000)
//! - `TILEDEPOT_CACHE_DIR` - Disk cache directory (default: in-memory cache)
//! - `TILEDEPOT_MAX_CACHE_SIZE` - Cache budget, e.g. `500MB` (default: 500MiB)
//! - `TILEDEPOT_FRESHNESS_DAYS` - Days before a cached tile is refreshed (default: 30)
//! - `TILEDEPOT_ADMIN_TOKEN` - Bearer token for `POST /admin`
//! - `TILEDEPOT_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//! - `TILEDEPOT_USER_AGENT` - User-Agent sent upstream
//! - `TILEDEPOT_MANIFEST` - Package manifest path or URL
//! - `TILEDEPOT_DEST` - Package extraction directory

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::io::DEFAULT_USER_AGENT;
use crate::tile::DEFAULT_FRESHNESS_DAYS;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default cache budget.
pub const DEFAULT_MAX_CACHE_SIZE: &str = "500MiB";

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiledepot - An offline-first map tile cache and package installer.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiledepot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the caching tile agent.
    Serve(ServeConfig),

    /// List the packages in a manifest.
    Packages(PackagesConfig),

    /// Download and extract one package.
    Install(InstallConfig),

    /// Remove everything installed under a destination directory.
    Clear(ClearConfig),
}

/// Options for `tiledepot serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILEDEPOT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILEDEPOT_PORT")]
    pub port: u16,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Directory for the persistent tile cache.
    ///
    /// If not specified, tiles are kept in memory and lost on exit.
    #[arg(long, env = "TILEDEPOT_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Cache budget (e.g. "500MB", "1GiB", "1048576").
    #[arg(long, default_value = DEFAULT_MAX_CACHE_SIZE, env = "TILEDEPOT_MAX_CACHE_SIZE")]
    pub max_cache_size: String,

    /// Age in days after which a cached tile is refreshed from the network.
    #[arg(long, default_value_t = DEFAULT_FRESHNESS_DAYS, env = "TILEDEPOT_FRESHNESS_DAYS")]
    pub freshness_days: u32,

    // =========================================================================
    // Admin / HTTP Configuration
    // =========================================================================
    /// Bearer token required on `POST /admin`.
    ///
    /// If not specified, the admin endpoint is open.
    #[arg(long, env = "TILEDEPOT_ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TILEDEPOT_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// User-Agent sent to tile servers.
    #[arg(long, default_value = DEFAULT_USER_AGENT, env = "TILEDEPOT_USER_AGENT")]
    pub user_agent: String,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        let max = parse_size(&self.max_cache_size)
            .map_err(|e| format!("Invalid --max-cache-size: {}", e))?;
        if max == 0 {
            return Err("max_cache_size must be greater than 0".to_string());
        }

        if self.freshness_days == 0 {
            return Err("freshness_days must be greater than 0".to_string());
        }

        if self.user_agent.trim().is_empty() {
            return Err("user_agent must not be empty".to_string());
        }

        if matches!(&self.admin_token, Some(token) if token.trim().is_empty()) {
            return Err(
                "Admin token is empty. Omit --admin-token or TILEDEPOT_ADMIN_TOKEN to leave \
                 the admin endpoint open"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Cache budget in bytes (call validate() first).
    pub fn max_cache_bytes(&self) -> u64 {
        parse_size(&self.max_cache_size).unwrap_or(0)
    }
}

/// Options for `tiledepot packages`.
#[derive(Args, Debug, Clone)]
pub struct PackagesConfig {
    /// Manifest file path or http(s) URL.
    #[arg(long, env = "TILEDEPOT_MANIFEST")]
    pub manifest: String,

    /// Extraction directory whose usage is reported after the listing.
    #[arg(long, env = "TILEDEPOT_DEST")]
    pub dest: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Options for `tiledepot install`.
#[derive(Args, Debug, Clone)]
pub struct InstallConfig {
    /// Manifest file path or http(s) URL.
    #[arg(long, env = "TILEDEPOT_MANIFEST")]
    pub manifest: String,

    /// Name of the package to install.
    #[arg(long)]
    pub package: String,

    /// Directory to extract into.
    #[arg(long, env = "TILEDEPOT_DEST")]
    pub dest: PathBuf,

    /// User-Agent sent to the package server.
    #[arg(long, default_value = DEFAULT_USER_AGENT, env = "TILEDEPOT_USER_AGENT")]
    pub user_agent: String,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InstallConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.package.trim().is_empty() {
            return Err("Package name is required. Set --package".to_string());
        }
        if self.dest.as_os_str().is_empty() {
            return Err("Destination directory is required. Set --dest".to_string());
        }
        Ok(())
    }
}

/// Options for `tiledepot clear`.
#[derive(Args, Debug, Clone)]
pub struct ClearConfig {
    /// Extraction directory to empty.
    #[arg(long, env = "TILEDEPOT_DEST")]
    pub dest: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Size Parsing
// =============================================================================

/// Parse a human-readable size.
///
/// Accepts a bare byte count (`1024`), decimal units (`KB`, `MB`, `GB`, `TB`)
/// and binary units (`KiB`, `MiB`, `GiB`, `TiB`). Units are case-insensitive
/// and may be separated from the number by whitespace; `K`/`M`/`G`/`T` are
/// treated as decimal.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("size is empty".to_string());
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid number in size '{}'", input))?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "t" | "tb" => 1_000_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        "tib" => 1 << 40,
        other => return Err(format!("unknown size unit '{}'", other)),
    };

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes > u64::MAX as f64 {
        return Err(format!("size '{}' is out of range", input));
    }
    Ok(bytes.round() as u64)
}

// =============================================================================
// Tests
// =============================================================================
