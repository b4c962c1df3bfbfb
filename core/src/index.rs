//! Index manager: scalar BTREE indices and IVF-family vector indices.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::batch::Schema;
use crate::config::CatalogConfig;
use crate::distance::{dot, l2_squared, DistanceType};
use crate::error::{Error, Result};
use crate::persistence::WalRecord;
use crate::table::{ColumnStore, RowChanges, Table};

pub(crate) mod btree;
mod hnsw;
mod ivf;
mod kmeans;
mod pq;
mod sq;
pub(crate) mod vector;

use btree::BTreeIndex;
use vector::{VectorIndex, VectorIndexParams};

const DEFAULT_MAX_ITERATIONS: usize = 50;
const DEFAULT_SAMPLE_RATE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexType {
    #[serde(rename = "BTREE")]
    BTree,
    IvfFlat,
    IvfPq,
    IvfHnswPq,
    IvfHnswSq,
}

impl IndexType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BTree => "BTREE",
            Self::IvfFlat => "IVF_FLAT",
            Self::IvfPq => "IVF_PQ",
            Self::IvfHnswPq => "IVF_HNSW_PQ",
            Self::IvfHnswSq => "IVF_HNSW_SQ",
        }
    }

    pub const fn is_vector(self) -> bool {
        !matches!(self, Self::BTree)
    }

    fn uses_product_quantizer(self) -> bool {
        matches!(self, Self::IvfPq | Self::IvfHnswPq)
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BTREE" => Ok(Self::BTree),
            "IVF_FLAT" => Ok(Self::IvfFlat),
            "IVF_PQ" => Ok(Self::IvfPq),
            "IVF_HNSW_PQ" => Ok(Self::IvfHnswPq),
            "IVF_HNSW_SQ" => Ok(Self::IvfHnswSq),
            _ => Err(Error::invalid_argument(format!("unknown index type '{raw}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarIndexConfig {
    /// Replace an existing index on the same column instead of failing.
    pub replace: bool,
    /// Accepted for compatibility; statistics are always computed on build.
    pub force_update_statistics: bool,
}

impl Default for ScalarIndexConfig {
    fn default() -> Self {
        Self {
            replace: true,
            force_update_statistics: false,
        }
    }
}

/// Vector index options. `None` selects a value derived from the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    pub num_partitions: Option<usize>,
    /// Product-quantizer sub-vectors; must divide the vector dimension.
    pub num_sub_vectors: Option<usize>,
    pub max_iterations: Option<usize>,
    /// Training rows sampled per partition.
    pub sample_rate: Option<usize>,
    pub distance_type: DistanceType,
    /// Only `None` and `"cpu"` are available.
    pub accelerator: Option<String>,
    pub replace: bool,
    pub hnsw_m: Option<usize>,
    pub hnsw_ef_construction: Option<usize>,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            num_partitions: None,
            num_sub_vectors: None,
            max_iterations: None,
            sample_rate: None,
            distance_type: DistanceType::L2,
            accelerator: None,
            replace: true,
            hnsw_m: None,
            hnsw_ef_construction: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescription {
    pub name: String,
    pub columns: Vec<String>,
    pub index_type: IndexType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatistics {
    pub index_type: IndexType,
    pub distance_type: Option<DistanceType>,
    pub num_indexed_rows: usize,
    pub num_unindexed_rows: usize,
    pub num_partitions: Option<usize>,
    pub num_sub_vectors: Option<usize>,
    pub distinct_values: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum IndexOptions {
    Scalar(ScalarIndexConfig),
    Vector(VectorIndexConfig),
}

/// What was asked for; enough to retrain the index from table data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct IndexDefinition {
    pub(crate) name: String,
    pub(crate) column: String,
    pub(crate) index_type: IndexType,
    pub(crate) options: IndexOptions,
}

/// Rows a vector index can answer for. Rows at or beyond `indexed_rows`
/// and rows rewritten since training are searched exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Coverage {
    pub(crate) indexed_rows: u64,
    pub(crate) stale_rows: BTreeSet<u64>,
}

impl Coverage {
    pub(crate) fn covers(&self, row: u64) -> bool {
        row < self.indexed_rows && !self.stale_rows.contains(&row)
    }

    fn num_indexed(&self) -> usize {
        self.indexed_rows as usize - self.stale_rows.len()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum IndexBody {
    BTree(Arc<BTreeIndex>),
    Vector {
        index: Arc<VectorIndex>,
        coverage: Coverage,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub(crate) definition: IndexDefinition,
    pub(crate) column_index: usize,
    pub(crate) body: IndexBody,
}

impl IndexEntry {
    /// Trains or builds the index described by `definition` over `data`.
    pub(crate) fn build(
        definition: IndexDefinition,
        schema: &Schema,
        data: &ColumnStore,
        config: &CatalogConfig,
    ) -> Result<Self> {
        let column_index = schema.index_of(&definition.column).ok_or_else(|| {
            Error::invalid_argument(format!(
                "column '{}' does not exist",
                definition.column
            ))
        })?;
        let column = data.column(column_index);

        let body = match &definition.options {
            IndexOptions::Scalar(_) => IndexBody::BTree(Arc::new(BTreeIndex::build(column))),
            IndexOptions::Vector(options) => {
                let rows = data.num_rows();
                if rows == 0 {
                    return Err(Error::precondition_failed(format!(
                        "cannot train {} index on column '{}': table has no rows",
                        definition.index_type, definition.column
                    )));
                }
                let dimension = column.data_type().vector_dimension().ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "column '{}' is not a vector column",
                        definition.column
                    ))
                })?;
                let params = resolve_vector_params(options, definition.index_type, dimension, rows)?;
                let index = VectorIndex::train(
                    column,
                    definition.index_type,
                    options.distance_type,
                    params,
                    config.parallel_scan_min_rows,
                )?;
                IndexBody::Vector {
                    index: Arc::new(index),
                    coverage: Coverage {
                        indexed_rows: rows as u64,
                        stale_rows: BTreeSet::new(),
                    },
                }
            }
        };

        Ok(Self {
            definition,
            column_index,
            body,
        })
    }

    /// Updates index bookkeeping for `changes` about to be applied to `before`.
    pub(crate) fn observe(&mut self, before: &ColumnStore, changes: &RowChanges) {
        let column = before.column(self.column_index);
        match &mut self.body {
            IndexBody::BTree(index) => {
                let index = Arc::make_mut(index);
                if let Some(updated) = changes.updated.get(self.column_index) {
                    for (source_row, row) in changes.updated_rows.iter().enumerate() {
                        let old = column.scalar_at(*row as usize);
                        let new = updated.scalar_at(source_row);
                        if old == new {
                            continue;
                        }
                        if let Some(old) = old {
                            index.remove(&old, *row);
                        }
                        if let Some(new) = new {
                            index.insert(new, *row);
                        }
                    }
                }
                if let Some(inserted) = changes.inserted.get(self.column_index) {
                    let first_row = before.num_rows() as u64;
                    for source_row in 0..inserted.len() {
                        if let Some(value) = inserted.scalar_at(source_row) {
                            index.insert(value, first_row + source_row as u64);
                        }
                    }
                }
            }
            IndexBody::Vector { coverage, .. } => {
                let Some(updated) = changes.updated.get(self.column_index) else {
                    return;
                };
                for (source_row, row) in changes.updated_rows.iter().enumerate() {
                    if *row < coverage.indexed_rows
                        && column.vector_at(*row as usize) != updated.vector_at(source_row)
                    {
                        coverage.stale_rows.insert(*row);
                    }
                }
            }
        }
    }

    pub(crate) fn btree(&self) -> Option<&BTreeIndex> {
        match &self.body {
            IndexBody::BTree(index) => Some(index),
            IndexBody::Vector { .. } => None,
        }
    }

    pub(crate) fn vector(&self) -> Option<(&VectorIndex, &Coverage)> {
        match &self.body {
            IndexBody::Vector { index, coverage } => Some((index, coverage)),
            IndexBody::BTree(_) => None,
        }
    }

    fn statistics(&self, num_rows: usize) -> IndexStatistics {
        match &self.body {
            IndexBody::BTree(index) => IndexStatistics {
                index_type: self.definition.index_type,
                distance_type: None,
                num_indexed_rows: num_rows,
                num_unindexed_rows: 0,
                num_partitions: None,
                num_sub_vectors: None,
                distinct_values: Some(index.distinct_values()),
            },
            IndexBody::Vector { index, coverage } => {
                let indexed = coverage.num_indexed();
                IndexStatistics {
                    index_type: self.definition.index_type,
                    distance_type: Some(index.distance_type()),
                    num_indexed_rows: indexed,
                    num_unindexed_rows: num_rows.saturating_sub(indexed),
                    num_partitions: Some(index.num_partitions()),
                    num_sub_vectors: index.params().num_sub_vectors,
                    distinct_values: None,
                }
            }
        }
    }
}

/// Distance inside an index's training space. Cosine vectors are unit
/// length there, so half the squared L2 equals `1 - cos`.
pub(crate) fn space_distance(distance_type: DistanceType, left: &[f32], right: &[f32]) -> f32 {
    match distance_type {
        DistanceType::L2 => l2_squared(left, right),
        DistanceType::Cosine => l2_squared(left, right) / 2.0,
        DistanceType::Dot => 1.0 - dot(left, right),
    }
}

pub(crate) fn index_name(column: &str) -> String {
    format!("{column}_idx")
}

fn resolve_vector_params(
    options: &VectorIndexConfig,
    index_type: IndexType,
    dimension: usize,
    rows: usize,
) -> Result<VectorIndexParams> {
    let num_partitions = match options.num_partitions {
        Some(0) => return Err(Error::invalid_argument("num_partitions must be > 0")),
        Some(requested) if requested > rows => {
            tracing::warn!(
                requested,
                rows,
                "num_partitions exceeds row count, clamping"
            );
            rows
        }
        Some(requested) => requested,
        None => ivf::default_num_partitions(rows),
    };

    let num_sub_vectors = if index_type.uses_product_quantizer() {
        let value = match options.num_sub_vectors {
            Some(0) => return Err(Error::invalid_argument("num_sub_vectors must be > 0")),
            Some(value) => value,
            None => default_num_sub_vectors(dimension),
        };
        if dimension % value != 0 {
            return Err(Error::invalid_argument(format!(
                "num_sub_vectors {value} must divide vector dimension {dimension}"
            )));
        }
        Some(value)
    } else {
        None
    };

    let max_iterations = positive_or_default(
        options.max_iterations,
        DEFAULT_MAX_ITERATIONS,
        "max_iterations",
    )?;
    let sample_rate = positive_or_default(options.sample_rate, DEFAULT_SAMPLE_RATE, "sample_rate")?;
    let hnsw_m = positive_or_default(options.hnsw_m, hnsw::DEFAULT_M, "hnsw_m")?;
    let hnsw_ef_construction = positive_or_default(
        options.hnsw_ef_construction,
        hnsw::DEFAULT_EF_CONSTRUCTION,
        "hnsw_ef_construction",
    )?;

    Ok(VectorIndexParams {
        num_partitions,
        num_sub_vectors,
        max_iterations,
        sample_rate,
        hnsw_m,
        hnsw_ef_construction,
    })
}

fn positive_or_default(value: Option<usize>, default: usize, name: &str) -> Result<usize> {
    match value {
        Some(0) => Err(Error::invalid_argument(format!("{name} must be > 0"))),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

fn default_num_sub_vectors(dimension: usize) -> usize {
    if dimension % 16 == 0 {
        dimension / 16
    } else if dimension % 8 == 0 {
        dimension / 8
    } else {
        1
    }
}

fn single_column<'a>(columns: &[&'a str]) -> Result<&'a str> {
    match columns {
        [] => Err(Error::invalid_argument("index requires a column")),
        [column] => Ok(column),
        _ => Err(Error::not_supported(
            "multi-column indices are not supported",
        )),
    }
}

impl Table {
    /// Builds a BTREE index on one scalar column. Valid on empty tables.
    pub fn create_scalar_index(
        &self,
        columns: &[&str],
        index_type: IndexType,
        config: ScalarIndexConfig,
    ) -> Result<()> {
        let column = single_column(columns)?;
        if index_type != IndexType::BTree {
            return Err(Error::invalid_argument(format!(
                "{index_type} is not a scalar index type"
            )));
        }
        let field = self.schema().field_with_name(column).ok_or_else(|| {
            Error::invalid_argument(format!("column '{column}' does not exist"))
        })?;
        if field.data_type().is_vector() {
            return Err(Error::invalid_argument(format!(
                "column '{column}' is a vector column; use a vector index"
            )));
        }

        let replace = config.replace;
        self.install_index(
            IndexDefinition {
                name: index_name(column),
                column: column.to_string(),
                index_type,
                options: IndexOptions::Scalar(config),
            },
            replace,
        )
    }

    /// Trains an IVF-family index on one vector column. Requires rows.
    pub fn create_vector_index(
        &self,
        columns: &[&str],
        index_type: IndexType,
        config: VectorIndexConfig,
    ) -> Result<()> {
        let column = single_column(columns)?;
        if !index_type.is_vector() {
            return Err(Error::invalid_argument(format!(
                "{index_type} is not a vector index type"
            )));
        }
        if let Some(accelerator) = &config.accelerator {
            if !accelerator.eq_ignore_ascii_case("cpu") {
                return Err(Error::not_supported(format!(
                    "accelerator '{accelerator}' is not available"
                )));
            }
        }
        let field = self.schema().field_with_name(column).ok_or_else(|| {
            Error::invalid_argument(format!("column '{column}' does not exist"))
        })?;
        if !field.data_type().is_vector() {
            return Err(Error::invalid_argument(format!(
                "column '{column}' is not a vector column"
            )));
        }

        let replace = config.replace;
        self.install_index(
            IndexDefinition {
                name: index_name(column),
                column: column.to_string(),
                index_type,
                options: IndexOptions::Vector(config),
            },
            replace,
        )
    }

    /// Index names in ascending order.
    pub fn list_indices(&self) -> Result<Vec<String>> {
        Ok(self.snapshot()?.indices.keys().cloned().collect())
    }

    pub fn describe_indices(&self) -> Result<Vec<IndexDescription>> {
        Ok(self
            .snapshot()?
            .indices
            .values()
            .map(|entry| IndexDescription {
                name: entry.definition.name.clone(),
                columns: vec![entry.definition.column.clone()],
                index_type: entry.definition.index_type,
            })
            .collect())
    }

    pub fn index_stats(&self, name: &str) -> Result<IndexStatistics> {
        let state = self.snapshot()?;
        let entry = state
            .indices
            .get(name)
            .ok_or_else(|| Error::not_found(format!("index '{name}' does not exist")))?;
        Ok(entry.statistics(state.data.num_rows()))
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.commit(|state| {
            if !state.indices.contains_key(name) {
                return Err(Error::not_found(format!("index '{name}' does not exist")));
            }
            let mut next = state.clone();
            next.indices.remove(name);
            let record = WalRecord::DropIndex {
                name: name.to_string(),
            };
            Ok((next, record, ()))
        })?;
        tracing::info!(table = %self.name(), index = %name, "dropped index");
        Ok(())
    }

    fn install_index(&self, definition: IndexDefinition, replace: bool) -> Result<()> {
        let started = Instant::now();
        let name = definition.name.clone();
        let index_type = definition.index_type;
        self.commit(|state| {
            if state.indices.contains_key(&definition.name) && !replace {
                return Err(Error::precondition_failed(format!(
                    "index '{}' already exists on column '{}'",
                    definition.name, definition.column
                )));
            }
            let entry =
                IndexEntry::build(definition.clone(), self.schema(), &state.data, self.config())?;
            let mut next = state.clone();
            next.indices.insert(definition.name.clone(), entry);
            Ok((next, WalRecord::CreateIndex { definition }, ()))
        })?;

        tracing::info!(
            table = %self.name(),
            index = %name,
            index_type = %index_type,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "created index"
        );
        Ok(())
    }
}
