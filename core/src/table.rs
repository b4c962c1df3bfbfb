//! Tables: an immutable schema, versioned row data and an index catalog.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::batch::{Column, RecordBatch, Schema};
use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::index::IndexEntry;
use crate::persistence::{self, PersistOutcome, TableFiles, WalRecord};

mod merge;
pub(crate) mod store;

pub use merge::{MergeInsertBuilder, MergeInsertConfig, MergeInsertStats};
pub(crate) use store::ColumnStore;

/// Row-level effect of one append or merge-insert.
///
/// `updated` holds the replacement rows for `updated_rows`, in the same
/// order; `inserted` holds rows appended at the end of the table. Either
/// side is an empty `Vec` when unused.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct RowChanges {
    pub(crate) updated_rows: Vec<u64>,
    pub(crate) updated: Vec<Column>,
    pub(crate) inserted: Vec<Column>,
}

impl RowChanges {
    fn inserted_rows(&self) -> usize {
        self.inserted.first().map(Column::len).unwrap_or(0)
    }
}

/// One published version of a table.
#[derive(Debug, Clone)]
pub(crate) struct TableState {
    pub(crate) version: u64,
    pub(crate) data: Arc<ColumnStore>,
    pub(crate) indices: BTreeMap<String, IndexEntry>,
}

impl TableState {
    pub(crate) fn new(version: u64, data: ColumnStore) -> Self {
        Self {
            version,
            data: Arc::new(data),
            indices: BTreeMap::new(),
        }
    }

    /// Applies `changes` to row data and keeps every index in step.
    pub(crate) fn apply_changes(&mut self, changes: &RowChanges) -> Result<()> {
        let num_rows = self.data.num_rows() as u64;
        if let Some(row) = changes.updated_rows.iter().find(|row| **row >= num_rows) {
            return Err(Error::internal(format!(
                "update targets row {row} but table has {num_rows} rows"
            )));
        }

        for entry in self.indices.values_mut() {
            entry.observe(&self.data, changes);
        }

        let data = Arc::make_mut(&mut self.data);
        for (source_row, row) in changes.updated_rows.iter().enumerate() {
            data.overwrite_row(*row as usize, &changes.updated, source_row)?;
        }
        if !changes.inserted.is_empty() {
            data.append_columns(&changes.inserted)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct TableWriter {
    wal_records: usize,
}

struct TableInner {
    name: String,
    schema: Schema,
    config: CatalogConfig,
    files: Option<TableFiles>,
    state: ArcSwap<TableState>,
    writer: Mutex<TableWriter>,
    dropped: AtomicBool,
}

/// Handle to a table. Clones share the same underlying table.
///
/// Reads load the latest published version without blocking; mutations
/// are serialized per table and publish a new version only on success.
#[derive(Clone)]
pub struct Table {
    inner: Arc<TableInner>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.inner.name)
            .field("version", &self.inner.state.load().version)
            .field("dropped", &self.inner.dropped.load(Ordering::Acquire))
            .finish()
    }
}

impl Table {
    /// Builds a brand-new table at version 1, persisting it when `files` is set.
    pub(crate) fn create(
        name: String,
        schema: Schema,
        config: CatalogConfig,
        files: Option<TableFiles>,
        initial: Vec<RecordBatch>,
    ) -> Result<Self> {
        validate_batches(&schema, &initial)?;
        let data = ColumnStore::from_batches(&schema, &initial)?;
        let state = TableState::new(1, data);
        if let Some(files) = &files {
            persistence::create_table_files(files, &name, &schema, &state)?;
        }
        Ok(Self::from_state(name, schema, config, files, state, 0))
    }

    pub(crate) fn from_state(
        name: String,
        schema: Schema,
        config: CatalogConfig,
        files: Option<TableFiles>,
        state: TableState,
        wal_records: usize,
    ) -> Self {
        Self {
            inner: Arc::new(TableInner {
                name,
                schema,
                config,
                files,
                state: ArcSwap::from_pointee(state),
                writer: Mutex::new(TableWriter { wal_records }),
                dropped: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn version(&self) -> Result<u64> {
        Ok(self.snapshot()?.version)
    }

    pub fn count_rows(&self) -> Result<usize> {
        Ok(self.snapshot()?.data.num_rows())
    }

    /// Appends every row of `batches` without deduplication and returns the
    /// new row count.
    pub fn append(&self, batches: Vec<RecordBatch>) -> Result<usize> {
        if batches.is_empty() {
            return Err(Error::invalid_argument("append requires at least one batch"));
        }
        validate_batches(&self.inner.schema, &batches)?;

        let appended: usize = batches.iter().map(RecordBatch::num_rows).sum();
        let columns = ColumnStore::from_batches(&self.inner.schema, &batches)?.into_columns();
        let (version, rows) = self.commit(|state| {
            let changes = RowChanges {
                inserted: columns,
                ..RowChanges::default()
            };
            let mut next = state.clone();
            next.version += 1;
            next.apply_changes(&changes)?;
            let output = (next.version, next.data.num_rows());
            let record = WalRecord::Append {
                version: next.version,
                columns: changes.inserted,
            };
            Ok((next, record, output))
        })?;

        tracing::debug!(table = %self.inner.name, version, appended, rows, "appended rows");
        Ok(rows)
    }

    /// Starts a key-based upsert on `on_columns`. Both update and insert
    /// branches are enabled unless toggled off on the builder.
    pub fn merge_insert(&self, on_columns: &[&str]) -> MergeInsertBuilder {
        MergeInsertBuilder::new(
            self.clone(),
            on_columns.iter().map(|name| name.to_string()).collect(),
        )
    }

    pub fn merge_insert_with_config(
        &self,
        batches: Vec<RecordBatch>,
        on_columns: &[&str],
        config: MergeInsertConfig,
    ) -> Result<MergeInsertStats> {
        let on_columns: Vec<String> = on_columns.iter().map(|name| name.to_string()).collect();
        merge::execute(self, batches, &on_columns, config)
    }

    pub(crate) fn config(&self) -> &CatalogConfig {
        &self.inner.config
    }

    pub(crate) fn snapshot(&self) -> Result<Arc<TableState>> {
        self.ensure_live()?;
        Ok(self.inner.state.load_full())
    }

    /// Runs `mutate` against the latest version under the writer lock,
    /// logs its record and publishes the resulting state.
    pub(crate) fn commit<T>(
        &self,
        mutate: impl FnOnce(&TableState) -> Result<(TableState, WalRecord, T)>,
    ) -> Result<T> {
        let mut writer = self
            .inner
            .writer
            .lock()
            .map_err(|_| Error::internal("table writer lock poisoned"))?;
        self.ensure_live()?;

        let current = self.inner.state.load_full();
        let (next, record, output) = mutate(&current)?;

        if let Some(files) = &self.inner.files {
            let checkpoint_due = writer.wal_records + 1 >= self.inner.config.checkpoint_interval;
            let outcome = persistence::persist_change(
                files,
                &self.inner.name,
                &self.inner.schema,
                &next,
                &record,
                self.inner.config.wal_sync_on_write,
                checkpoint_due,
            )?;
            match outcome {
                PersistOutcome::Checkpointed => writer.wal_records = 0,
                PersistOutcome::Logged => writer.wal_records += 1,
                PersistOutcome::WalOnly { reason } => {
                    writer.wal_records += 1;
                    tracing::warn!(
                        table = %self.inner.name,
                        %reason,
                        "checkpoint failed, wal remains authoritative"
                    );
                }
            }
        }

        self.inner.state.store(Arc::new(next));
        Ok(output)
    }

    /// Invalidates this table for every handle and removes its files.
    pub(crate) fn mark_dropped(&self) -> Result<()> {
        let _writer = self
            .inner
            .writer
            .lock()
            .map_err(|_| Error::internal("table writer lock poisoned"))?;
        self.inner.dropped.store(true, Ordering::Release);
        if let Some(files) = &self.inner.files {
            persistence::remove_table_files(files)?;
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.inner.dropped.load(Ordering::Acquire) {
            return Err(Error::not_found(format!(
                "table '{}' was dropped",
                self.inner.name
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_batches(schema: &Schema, batches: &[RecordBatch]) -> Result<()> {
    for (index, batch) in batches.iter().enumerate() {
        if batch.schema() != schema {
            return Err(Error::invalid_argument(format!(
                "batch {index} schema [{}] does not match table schema [{}]",
                describe_schema(batch.schema()),
                describe_schema(schema)
            )));
        }
    }
    Ok(())
}

fn describe_schema(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|field| format!("{}: {}", field.name(), field.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}
