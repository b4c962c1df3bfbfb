use std::collections::BTreeMap;
use std::env;

use anyhow::{Context, Result};

const MAX_BATCH_ROWS_DEFAULT: usize = 1024;
const WAL_SYNC_ON_WRITE_DEFAULT: bool = true;
const CHECKPOINT_INTERVAL_DEFAULT: usize = 32;
const PARALLEL_SCAN_MIN_ROWS_DEFAULT: usize = 2_048;

/// Tunables shared by every table opened through a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Upper bound on rows per result batch.
    pub max_batch_rows: usize,
    /// When true, every WAL append is followed by `fsync`.
    pub wal_sync_on_write: bool,
    /// Number of WAL records after which a table snapshot is rewritten.
    pub checkpoint_interval: usize,
    /// Row count from which exact scans fan out on the rayon pool.
    pub parallel_scan_min_rows: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_batch_rows: MAX_BATCH_ROWS_DEFAULT,
            wal_sync_on_write: WAL_SYNC_ON_WRITE_DEFAULT,
            checkpoint_interval: CHECKPOINT_INTERVAL_DEFAULT,
            parallel_scan_min_rows: PARALLEL_SCAN_MIN_ROWS_DEFAULT,
        }
    }
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self> {
        let max_batch_rows = parse_usize("LODESTONE_MAX_BATCH_ROWS", MAX_BATCH_ROWS_DEFAULT)?;
        let wal_sync_on_write =
            parse_bool_env("LODESTONE_WAL_SYNC_ON_WRITE", WAL_SYNC_ON_WRITE_DEFAULT)?;
        let checkpoint_interval =
            parse_usize("LODESTONE_CHECKPOINT_INTERVAL", CHECKPOINT_INTERVAL_DEFAULT)?;
        let parallel_scan_min_rows = parse_usize(
            "LODESTONE_PARALLEL_SCAN_MIN_ROWS",
            PARALLEL_SCAN_MIN_ROWS_DEFAULT,
        )?;

        let config = Self {
            max_batch_rows,
            wal_sync_on_write,
            checkpoint_interval,
            parallel_scan_min_rows,
        };
        config.validate()?;
        Ok(config)
    }

    /// Applies recognized storage options on top of `self`.
    ///
    /// Unknown keys are left alone; they belong to storage backends this
    /// engine does not implement.
    pub fn apply_storage_options(&mut self, options: &BTreeMap<String, String>) -> Result<()> {
        for (key, raw) in options {
            match key.as_str() {
                "max_batch_rows" => self.max_batch_rows = parse_usize_value(key, raw)?,
                "wal_sync_on_write" => self.wal_sync_on_write = parse_bool_value(key, raw)?,
                "checkpoint_interval" => self.checkpoint_interval = parse_usize_value(key, raw)?,
                "parallel_scan_min_rows" => {
                    self.parallel_scan_min_rows = parse_usize_value(key, raw)?
                }
                _ => tracing::debug!(option = %key, "ignoring unrecognized storage option"),
            }
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.max_batch_rows == 0 {
            anyhow::bail!("max_batch_rows must be > 0");
        }
        if self.checkpoint_interval == 0 {
            anyhow::bail!("checkpoint_interval must be > 0");
        }
        Ok(())
    }
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    parse_usize_value(key, &raw)
}

fn parse_usize_value(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))
}

fn parse_bool_env(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => parse_bool_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_bool_value(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{key} must be a boolean, got '{raw}'"),
    }
}
