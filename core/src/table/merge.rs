use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::batch::{RecordBatch, Schema};
use crate::error::{Error, Result};
use crate::persistence::WalRecord;
use crate::value::ScalarValue;

use super::{validate_batches, ColumnStore, RowChanges, Table};

/// Which branches of a merge-insert run. The default is a full upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeInsertConfig {
    pub when_matched_update_all: bool,
    pub when_not_matched_insert_all: bool,
}

impl Default for MergeInsertConfig {
    fn default() -> Self {
        Self {
            when_matched_update_all: true,
            when_not_matched_insert_all: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeInsertStats {
    /// Table version published by this merge.
    pub version: u64,
    pub num_inserted_rows: usize,
    pub num_updated_rows: usize,
    /// Existing rows whose key matched an incoming row.
    pub num_matched_rows: usize,
}

/// Owned merge-insert request; consumed by [`MergeInsertBuilder::execute`].
#[derive(Debug)]
pub struct MergeInsertBuilder {
    table: Table,
    on_columns: Vec<String>,
    config: MergeInsertConfig,
}

impl MergeInsertBuilder {
    pub(super) fn new(table: Table, on_columns: Vec<String>) -> Self {
        Self {
            table,
            on_columns,
            config: MergeInsertConfig::default(),
        }
    }

    pub fn when_matched_update_all(mut self, enabled: bool) -> Self {
        self.config.when_matched_update_all = enabled;
        self
    }

    pub fn when_not_matched_insert_all(mut self, enabled: bool) -> Self {
        self.config.when_not_matched_insert_all = enabled;
        self
    }

    pub fn execute(self, batches: Vec<RecordBatch>) -> Result<MergeInsertStats> {
        execute(&self.table, batches, &self.on_columns, self.config)
    }
}

pub(super) fn execute(
    table: &Table,
    batches: Vec<RecordBatch>,
    on_columns: &[String],
    config: MergeInsertConfig,
) -> Result<MergeInsertStats> {
    if batches.is_empty() {
        return Err(Error::invalid_argument(
            "merge insert requires at least one batch",
        ));
    }
    let schema = table.schema();
    let key_columns = resolve_key_columns(schema, on_columns)?;
    validate_batches(schema, &batches)?;
    let source = ColumnStore::from_batches(schema, &batches)?;

    let stats = table.commit(|state| {
        let plan = plan(&state.data, &source, &key_columns, config)?;
        let mut next = state.clone();
        next.version += 1;
        next.apply_changes(&plan.changes)?;
        let stats = MergeInsertStats {
            version: next.version,
            num_inserted_rows: plan.changes.inserted_rows(),
            num_updated_rows: plan.changes.updated_rows.len(),
            num_matched_rows: plan.matched,
        };
        let record = WalRecord::MergeInsert {
            version: next.version,
            changes: plan.changes,
        };
        Ok((next, record, stats))
    })?;

    tracing::debug!(
        table = %table.name(),
        version = stats.version,
        inserted = stats.num_inserted_rows,
        updated = stats.num_updated_rows,
        matched = stats.num_matched_rows,
        "merge insert committed"
    );
    Ok(stats)
}

fn resolve_key_columns(schema: &Schema, on_columns: &[String]) -> Result<Vec<usize>> {
    if on_columns.is_empty() {
        return Err(Error::invalid_argument(
            "merge insert requires at least one key column",
        ));
    }
    let mut seen = HashSet::new();
    let mut key_columns = Vec::with_capacity(on_columns.len());
    for name in on_columns {
        let index = schema.index_of(name).ok_or_else(|| {
            Error::invalid_argument(format!("merge key column '{name}' does not exist"))
        })?;
        if schema.fields()[index].data_type().is_vector() {
            return Err(Error::invalid_argument(format!(
                "merge key column '{name}' is a vector column"
            )));
        }
        if !seen.insert(index) {
            return Err(Error::invalid_argument(format!(
                "merge key column '{name}' is listed twice"
            )));
        }
        key_columns.push(index);
    }
    Ok(key_columns)
}

#[derive(Debug)]
struct MergePlan {
    changes: RowChanges,
    matched: usize,
}

fn plan(
    target: &ColumnStore,
    source: &ColumnStore,
    key_columns: &[usize],
    config: MergeInsertConfig,
) -> Result<MergePlan> {
    let mut lookup: HashMap<Vec<ScalarValue>, Vec<usize>> = HashMap::new();
    if source.num_rows() > 0 {
        for row in 0..target.num_rows() {
            lookup
                .entry(target.row_key(row, key_columns))
                .or_default()
                .push(row);
        }
    }

    let mut matched = HashSet::new();
    let mut updates: HashMap<usize, usize> = HashMap::new();
    let mut inserts = Vec::new();
    for source_row in 0..source.num_rows() {
        let key = source.row_key(source_row, key_columns);
        let Some(target_rows) = lookup.get(&key) else {
            if config.when_not_matched_insert_all {
                inserts.push(source_row);
            }
            continue;
        };

        matched.extend(target_rows.iter().copied());
        if !config.when_matched_update_all {
            continue;
        }
        for target_row in target_rows {
            match updates.entry(*target_row) {
                Entry::Vacant(slot) => {
                    slot.insert(source_row);
                }
                Entry::Occupied(_) => {
                    return Err(Error::invalid_argument(format!(
                        "ambiguous merge: several input rows match the existing row with key {}",
                        render_key(&key)
                    )));
                }
            }
        }
    }

    let mut updates: Vec<(usize, usize)> = updates.into_iter().collect();
    updates.sort_unstable();
    let source_rows: Vec<usize> = updates.iter().map(|(_, source_row)| *source_row).collect();

    let changes = RowChanges {
        updated_rows: updates.iter().map(|(row, _)| *row as u64).collect(),
        updated: if updates.is_empty() {
            Vec::new()
        } else {
            source.take(&source_rows)
        },
        inserted: if inserts.is_empty() {
            Vec::new()
        } else {
            source.take(&inserts)
        },
    };

    Ok(MergePlan {
        changes,
        matched: matched.len(),
    })
}

fn render_key(key: &[ScalarValue]) -> String {
    key.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Column, DataType, Field};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64),
            Field::new("score", DataType::Float64),
        ])
        .expect("schema must be valid")
    }

    fn store(ids: &[i64], scores: &[f64]) -> ColumnStore {
        ColumnStore::from_columns(
            &schema(),
            vec![Column::Int64(ids.to_vec()), Column::Float64(scores.to_vec())],
        )
        .expect("store must build")
    }

    #[test]
    fn plan_targets_every_row_sharing_a_key() {
        let target = store(&[1, 2, 1], &[0.0, 0.0, 0.0]);
        let source = store(&[1, 5], &[9.0, 5.0]);

        let plan = plan(&target, &source, &[0], MergeInsertConfig::default())
            .expect("plan must succeed");
        assert_eq!(plan.matched, 2);
        assert_eq!(plan.changes.updated_rows, vec![0, 2]);
        assert_eq!(plan.changes.updated[1], Column::Float64(vec![9.0, 9.0]));
        assert_eq!(plan.changes.inserted[0], Column::Int64(vec![5]));
    }

    #[test]
    fn plan_rejects_two_inputs_for_one_row() {
        let target = store(&[1], &[0.0]);
        let source = store(&[1, 1], &[1.0, 2.0]);

        let error = plan(&target, &source, &[0], MergeInsertConfig::default())
            .expect_err("must fail");
        assert!(matches!(error, Error::InvalidArgument(_)));

        let insert_only = MergeInsertConfig {
            when_matched_update_all: false,
            when_not_matched_insert_all: true,
        };
        let plan = plan(&target, &source, &[0], insert_only).expect("plan must succeed");
        assert!(plan.changes.updated_rows.is_empty());
        assert!(plan.changes.inserted.is_empty());
        assert_eq!(plan.matched, 1);
    }

    #[test]
    fn duplicate_unmatched_inputs_are_all_inserted() {
        let target = store(&[], &[]);
        let source = store(&[3, 3], &[1.0, 2.0]);

        let plan = plan(&target, &source, &[0], MergeInsertConfig::default())
            .expect("plan must succeed");
        assert_eq!(plan.changes.inserted_rows(), 2);
        assert_eq!(plan.matched, 0);
    }

    #[test]
    fn key_columns_are_validated() {
        let schema = schema();
        for on in [vec![], vec!["missing".to_string()], vec!["id".to_string(); 2]] {
            let error = resolve_key_columns(&schema, &on).expect_err("must fail");
            assert!(matches!(error, Error::InvalidArgument(_)));
        }
        assert_eq!(
            resolve_key_columns(&schema, &["score".to_string(), "id".to_string()])
                .expect("keys must resolve"),
            vec![1, 0]
        );
    }
}
