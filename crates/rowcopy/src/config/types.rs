//! Option types for a copy run.

use std::fmt;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::debug;

/// Host resources used to size the metadata scan.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len().max(1);

        debug!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            total_memory_gb, cpu_cores
        );
        Self {
            total_memory_gb,
            cpu_cores,
        }
    }
}

/// What to do with the on-disk schema cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaCacheMode {
    /// Always scan the live catalog.
    #[default]
    None,
    /// Load the graph from the cache, scanning and storing it on a miss.
    Use,
    /// Delete the cache files for both connections and stop.
    Clear,
}

impl std::str::FromStr for SchemaCacheMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SchemaCacheMode::None),
            "use" => Ok(SchemaCacheMode::Use),
            "clear" => Ok(SchemaCacheMode::Clear),
            other => Err(format!(
                "invalid schema cache mode '{}', expected one of: none, use, clear",
                other
            )),
        }
    }
}

/// Effective options for one invocation.
#[derive(Clone, Serialize, Deserialize)]
pub struct CopyOptions {
    /// Source connection URL.
    #[serde(default)]
    pub source_connection: Option<String>,

    #[serde(default)]
    pub source_user: Option<String>,

    #[serde(default)]
    pub source_password: Option<String>,

    /// Target connection URL, or `file:<path>` for a SQL script.
    #[serde(default)]
    pub target_connection: Option<String>,

    #[serde(default)]
    pub target_user: Option<String>,

    #[serde(default)]
    pub target_password: Option<String>,

    /// Rows per chunked relationship query and per insert batch (default: 500).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Prepare every statement but execute no writes.
    #[serde(default)]
    pub dry_run: bool,

    /// 0 = warnings only, 1 = progress, 2 = details, 3 = SQL.
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,

    /// Tables the walk never enters.
    #[serde(default)]
    pub skip_tables: Vec<String>,

    /// Drop source columns the target lacks instead of failing.
    #[serde(default)]
    pub skip_missing_columns: bool,

    /// Update rows that already exist in the target.
    #[serde(default)]
    pub allow_update: bool,

    /// Print the reachable table tree and stop.
    #[serde(default)]
    pub show_copy_tree: bool,

    /// Skip inserts that collide with existing keys.
    #[serde(default)]
    pub ignore_existing: bool,

    #[serde(default)]
    pub schema_cache: SchemaCacheMode,

    /// Seed query text; several statements may be separated by `;`.
    #[serde(default)]
    pub query: String,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            source_connection: None,
            source_user: None,
            source_password: None,
            target_connection: None,
            target_user: None,
            target_password: None,
            chunk_size: default_chunk_size(),
            dry_run: false,
            verbosity: default_verbosity(),
            skip_tables: Vec::new(),
            skip_missing_columns: false,
            allow_update: false,
            show_copy_tree: false,
            ignore_existing: false,
            schema_cache: SchemaCacheMode::None,
            query: String::new(),
        }
    }
}

fn redact(password: &Option<String>) -> Option<&'static str> {
    password.as_ref().map(|_| "[REDACTED]")
}

impl fmt::Debug for CopyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyOptions")
            .field("source_connection", &self.source_connection)
            .field("source_user", &self.source_user)
            .field("source_password", &redact(&self.source_password))
            .field("target_connection", &self.target_connection)
            .field("target_user", &self.target_user)
            .field("target_password", &redact(&self.target_password))
            .field("chunk_size", &self.chunk_size)
            .field("dry_run", &self.dry_run)
            .field("verbosity", &self.verbosity)
            .field("skip_tables", &self.skip_tables)
            .field("skip_missing_columns", &self.skip_missing_columns)
            .field("allow_update", &self.allow_update)
            .field("show_copy_tree", &self.show_copy_tree)
            .field("ignore_existing", &self.ignore_existing)
            .field("schema_cache", &self.schema_cache)
            .field("query", &self.query)
            .finish()
    }
}

// Default value functions for serde
fn default_chunk_size() -> usize {
    500
}

fn default_verbosity() -> u8 {
    1
}
