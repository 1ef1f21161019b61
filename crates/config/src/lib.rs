//! Configuration types for the synchronizer: each type derives both `clap::Parser` and
//! `serde`, so the same struct can be populated from CLI flags or from a JSON config file and
//! merged (file first, flags override).

use std::path::PathBuf;

use clap::Parser;
use l2_sync_common::Verbosity;
use serde::{Deserialize, Serialize};
use url::Url;

/// Where the remote node lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Parser)]
pub struct NodeConfig {
    /// Base URL of the remote node's JSON-RPC endpoint.
    #[arg(long, env = "L2_SYNC_NODE_URL")]
    pub url: Url,
}

fn default_limit() -> u32 {
    1
}

fn default_retry_interval_ms() -> u64 {
    1_000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("l2-sync-client.db")
}

/// Top-level synchronizer configuration, parsed from CLI flags and overridable from a
/// config file loaded via [`SyncConfig::from_file`].
#[derive(Clone, Debug, Parser, Serialize, Deserialize)]
#[command(name = "l2-sync-client", about = "Synchronizes local note state against an L2 node")]
pub struct SyncConfig {
    #[command(flatten)]
    pub node: NodeConfig,

    /// Maximum number of blocks fetched per tick.
    #[arg(long, default_value_t = default_limit())]
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Delay, in milliseconds, before retrying after a tick makes no progress.
    #[arg(long, default_value_t = default_retry_interval_ms())]
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Path to the local note database.
    #[arg(long, default_value = "l2-sync-client.db")]
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Suppress non-essential stdout output.
    #[arg(long)]
    #[serde(default)]
    pub quiet: bool,

    /// Print more than the default amount of stdout output.
    #[arg(long)]
    #[serde(default)]
    pub verbose: bool,
}

impl SyncConfig {
    /// Loads a config from a JSON file, used to override defaults before CLI flags are applied.
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_prefers_quiet_over_verbose() {
        let mut cfg = SyncConfig {
            node: NodeConfig { url: Url::parse("http://localhost:8080").unwrap() },
            limit: default_limit(),
            retry_interval_ms: default_retry_interval_ms(),
            db_path: default_db_path(),
            quiet: true,
            verbose: true,
        };
        assert_eq!(cfg.verbosity(), Verbosity::Quiet);
        cfg.quiet = false;
        assert_eq!(cfg.verbosity(), Verbosity::Verbose);
    }

    #[test]
    fn defaults_match_documented_values() {
        assert_eq!(default_limit(), 1);
        assert_eq!(default_retry_interval_ms(), 1_000);
    }

    #[test]
    fn from_file_reads_a_partial_config_and_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync-config.json");
        std::fs::write(
            &path,
            r#"{"node": {"url": "http://node.local:8080"}, "limit": 50}"#,
        )
        .unwrap();

        let cfg = SyncConfig::from_file(&path).unwrap();
        assert_eq!(cfg.node.url.as_str(), "http://node.local:8080/");
        assert_eq!(cfg.limit, 50);
        assert_eq!(cfg.retry_interval_ms, default_retry_interval_ms());
        assert_eq!(cfg.db_path, default_db_path());
    }

    #[test]
    fn from_file_rejects_a_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist.json");
        assert!(SyncConfig::from_file(&missing).is_err());
    }
}
