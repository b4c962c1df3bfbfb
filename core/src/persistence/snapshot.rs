use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::batch::{Column, Schema};
use crate::config::CatalogConfig;
use crate::index::vector::VectorIndex;
use crate::index::{Coverage, IndexBody, IndexDefinition, IndexEntry};
use crate::table::{ColumnStore, TableState};

use super::fsync::write_atomically;
use super::PersistenceError;

const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Debug, Serialize)]
struct SnapshotRef<'a> {
    format: u32,
    name: &'a str,
    schema: &'a Schema,
    version: u64,
    columns: &'a [Column],
    indices: Vec<SnapshotIndexRef<'a>>,
}

#[derive(Debug, Serialize)]
struct SnapshotIndexRef<'a> {
    definition: &'a IndexDefinition,
    #[serde(skip_serializing_if = "Option::is_none")]
    trained: Option<TrainedRef<'a>>,
}

#[derive(Debug, Serialize)]
struct TrainedRef<'a> {
    index: &'a VectorIndex,
    coverage: &'a Coverage,
}

#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    format: u32,
    name: String,
    schema: Schema,
    version: u64,
    columns: Vec<Column>,
    indices: Vec<SnapshotIndex>,
}

#[derive(Debug, Deserialize)]
struct SnapshotIndex {
    definition: IndexDefinition,
    #[serde(default)]
    trained: Option<Trained>,
}

#[derive(Debug, Deserialize)]
struct Trained {
    index: VectorIndex,
    coverage: Coverage,
}

pub(super) fn write_snapshot(
    path: &Path,
    name: &str,
    schema: &Schema,
    state: &TableState,
) -> Result<(), PersistenceError> {
    let indices = state
        .indices
        .values()
        .map(|entry| SnapshotIndexRef {
            definition: &entry.definition,
            trained: entry
                .vector()
                .map(|(index, coverage)| TrainedRef { index, coverage }),
        })
        .collect();
    let document = SnapshotRef {
        format: SNAPSHOT_FORMAT,
        name,
        schema,
        version: state.version,
        columns: state.data.columns(),
        indices,
    };
    let bytes = serde_json::to_vec(&document)?;
    write_atomically(path, &bytes)
}

/// Reads a snapshot. Scalar indices are rebuilt from the restored rows;
/// vector indices come back exactly as trained.
pub(super) fn load_snapshot(
    path: &Path,
    config: &CatalogConfig,
) -> Result<(String, Schema, TableState), PersistenceError> {
    let raw = fs::read(path)?;
    let document: SnapshotDocument = serde_json::from_slice(&raw)?;
    if document.format != SNAPSHOT_FORMAT {
        return Err(PersistenceError::InvalidData(format!(
            "unsupported snapshot format {}",
            document.format
        )));
    }

    let data = ColumnStore::from_columns(&document.schema, document.columns)?;
    let mut state = TableState::new(document.version, data);
    for entry in document.indices {
        let name = entry.definition.name.clone();
        let rebuilt = match entry.trained {
            Some(trained) => {
                let column_index = document
                    .schema
                    .index_of(&entry.definition.column)
                    .ok_or_else(|| {
                        PersistenceError::InvalidData(format!(
                            "index '{name}' references missing column '{}'",
                            entry.definition.column
                        ))
                    })?;
                IndexEntry {
                    definition: entry.definition,
                    column_index,
                    body: IndexBody::Vector {
                        index: Arc::new(trained.index),
                        coverage: trained.coverage,
                    },
                }
            }
            None => IndexEntry::build(entry.definition, &document.schema, &state.data, config)?,
        };
        state.indices.insert(name, rebuilt);
    }

    Ok((document.name, document.schema, state))
}
