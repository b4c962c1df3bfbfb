//! Per-table durability: a JSON snapshot plus a checksummed JSON-lines WAL.
//!
//! Layout of a table directory:
//! - `snapshot.json`: schema, version, row data and trained indices
//! - `wal.jsonl`: one record per mutation since the last checkpoint

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::batch::{Column, Schema};
use crate::config::CatalogConfig;
use crate::error::Error;
use crate::index::{IndexDefinition, IndexEntry};
use crate::table::{RowChanges, TableState};

mod fsync;
mod snapshot;
mod wal;

use fsync::sync_parent_dir;
use snapshot::{load_snapshot, write_snapshot};
use wal::{append_wal, replay_wal, truncate_wal};

const SNAPSHOT_FILE: &str = "snapshot.json";
const WAL_FILE: &str = "wal.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WalRecord {
    Append {
        version: u64,
        columns: Vec<Column>,
    },
    MergeInsert {
        version: u64,
        changes: RowChanges,
    },
    CreateIndex {
        definition: IndexDefinition,
    },
    DropIndex {
        name: String,
    },
}

#[derive(Debug)]
pub(crate) enum PersistenceError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    Table(Error),
    InvalidData(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(f, "io error: {error}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::Table(error) => write!(f, "table error: {error}"),
            Self::InvalidData(message) => write!(f, "invalid persistence data: {message}"),
        }
    }
}

impl StdError for PersistenceError {}

impl From<std::io::Error> for PersistenceError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl From<Error> for PersistenceError {
    fn from(value: Error) -> Self {
        Self::Table(value)
    }
}

impl From<PersistenceError> for Error {
    fn from(value: PersistenceError) -> Self {
        Error::internal(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PersistOutcome {
    /// Snapshot rewritten and WAL truncated.
    Checkpointed,
    /// Record appended to the WAL; no checkpoint was due.
    Logged,
    /// Record appended but the due checkpoint failed.
    WalOnly { reason: String },
}

/// Paths of one table's on-disk state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TableFiles {
    dir: PathBuf,
    snapshot: PathBuf,
    wal: PathBuf,
}

impl TableFiles {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self {
            snapshot: dir.join(SNAPSHOT_FILE),
            wal: dir.join(WAL_FILE),
            dir,
        }
    }

    /// True once the first snapshot has been written.
    pub(crate) fn is_initialized(&self) -> bool {
        self.snapshot.exists()
    }
}

/// A table reconstructed from disk.
#[derive(Debug)]
pub(crate) struct LoadedTable {
    pub(crate) name: String,
    pub(crate) schema: Schema,
    pub(crate) state: TableState,
    pub(crate) wal_records: usize,
}

pub(crate) fn create_table_files(
    files: &TableFiles,
    name: &str,
    schema: &Schema,
    state: &TableState,
) -> Result<(), PersistenceError> {
    fs::create_dir_all(&files.dir)?;
    sync_parent_dir(&files.dir)?;
    write_snapshot(&files.snapshot, name, schema, state)?;
    truncate_wal(&files.wal)?;
    Ok(())
}

pub(crate) fn remove_table_files(files: &TableFiles) -> Result<(), PersistenceError> {
    if files.dir.exists() {
        fs::remove_dir_all(&files.dir)?;
        sync_parent_dir(&files.dir)?;
    }
    Ok(())
}

pub(crate) fn load_table(
    files: &TableFiles,
    config: &CatalogConfig,
) -> Result<LoadedTable, PersistenceError> {
    let (name, schema, mut state) = load_snapshot(&files.snapshot, config)?;
    let wal_records = replay_wal(&files.wal, |record| {
        apply_wal_record(&mut state, &schema, config, record)
    })?;
    Ok(LoadedTable {
        name,
        schema,
        state,
        wal_records,
    })
}

/// Logs `record` and, when `checkpoint_due`, rewrites the snapshot from
/// `state` and truncates the WAL. A failed checkpoint is reported, not
/// raised: the WAL alone still reproduces `state`.
pub(crate) fn persist_change(
    files: &TableFiles,
    name: &str,
    schema: &Schema,
    state: &TableState,
    record: &WalRecord,
    sync_on_write: bool,
    checkpoint_due: bool,
) -> Result<PersistOutcome, PersistenceError> {
    append_wal(&files.wal, record, sync_on_write)?;
    if !checkpoint_due {
        return Ok(PersistOutcome::Logged);
    }

    match write_snapshot(&files.snapshot, name, schema, state).and_then(|_| truncate_wal(&files.wal))
    {
        Ok(()) => Ok(PersistOutcome::Checkpointed),
        Err(error) => Ok(PersistOutcome::WalOnly {
            reason: error.to_string(),
        }),
    }
}

/// Replays one WAL record onto `state`. Writes already reflected in the
/// snapshot are skipped by version; index records are idempotent.
pub(crate) fn apply_wal_record(
    state: &mut TableState,
    schema: &Schema,
    config: &CatalogConfig,
    record: WalRecord,
) -> Result<(), PersistenceError> {
    match record {
        WalRecord::Append { version, columns } => {
            if !next_version(state, version)? {
                return Ok(());
            }
            let changes = RowChanges {
                inserted: columns,
                ..RowChanges::default()
            };
            state.apply_changes(&changes)?;
            state.version = version;
        }
        WalRecord::MergeInsert { version, changes } => {
            if !next_version(state, version)? {
                return Ok(());
            }
            state.apply_changes(&changes)?;
            state.version = version;
        }
        WalRecord::CreateIndex { definition } => {
            let name = definition.name.clone();
            let entry = IndexEntry::build(definition, schema, &state.data, config)?;
            state.indices.insert(name, entry);
        }
        WalRecord::DropIndex { name } => {
            state.indices.remove(&name);
        }
    }
    Ok(())
}

fn next_version(state: &TableState, version: u64) -> Result<bool, PersistenceError> {
    if version <= state.version {
        return Ok(false);
    }
    if version != state.version + 1 {
        return Err(PersistenceError::InvalidData(format!(
            "wal jumps from version {} to {version}",
            state.version
        )));
    }
    Ok(true)
}

#[cfg(test)]
mod tests;
