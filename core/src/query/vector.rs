use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;

use crate::batch::{Column, Schema};
use crate::distance::{validate_query, DistanceType, PreparedQuery};
use crate::error::{Error, Result};
use crate::index::vector::IndexSearch;
use crate::index::IndexEntry;
use crate::table::Table;

use super::{assemble, filter, Extras, QueryOptions, QueryResult};

const DEFAULT_LIMIT: usize = 10;
const DEFAULT_NPROBES: usize = 20;
const PARALLEL_CHUNK_ROWS: usize = 1_024;

/// Nearest-neighbor query. Results are ordered by ascending distance,
/// ties broken by row id.
#[derive(Debug)]
pub struct VectorQuery {
    table: Table,
    options: QueryOptions,
    vector: Vec<f32>,
    column: Option<String>,
    distance_type: Option<DistanceType>,
    nprobes: Option<usize>,
    refine_factor: Option<usize>,
    ef: Option<usize>,
    with_distance: bool,
}

impl VectorQuery {
    pub(super) fn new(table: Table, options: QueryOptions, vector: Vec<f32>) -> Self {
        Self {
            table,
            options,
            vector,
            column: None,
            distance_type: None,
            nprobes: None,
            refine_factor: None,
            ef: None,
            with_distance: true,
        }
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.options.select = Some(columns.iter().map(|name| name.to_string()).collect());
        self
    }

    /// Prefilter: only rows accepted by `filter` are ranked.
    pub fn only_if(mut self, filter: impl Into<String>) -> Self {
        self.options.filter = Some(filter.into());
        self
    }

    /// Number of neighbors to return. Defaults to 10.
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.options.offset = offset;
        self
    }

    pub fn with_row_id(mut self, enabled: bool) -> Self {
        self.options.with_row_id = enabled;
        self
    }

    /// Vector column to search. Optional when the schema has exactly one.
    pub fn column(mut self, column: &str) -> Self {
        self.column = Some(column.to_string());
        self
    }

    pub fn distance_type(mut self, distance_type: DistanceType) -> Self {
        self.distance_type = Some(distance_type);
        self
    }

    /// IVF partitions probed first. Ignored without an IVF index.
    pub fn nprobes(mut self, nprobes: usize) -> Self {
        self.nprobes = Some(nprobes);
        self
    }

    /// Re-ranks `limit * refine_factor` index candidates by exact distance.
    pub fn refine_factor(mut self, refine_factor: usize) -> Self {
        self.refine_factor = Some(refine_factor);
        self
    }

    /// HNSW search breadth. Ignored without an HNSW index.
    pub fn ef(mut self, ef: usize) -> Self {
        self.ef = Some(ef);
        self
    }

    /// Appends a `_distance` column. On by default.
    pub fn with_distance(mut self, enabled: bool) -> Self {
        self.with_distance = enabled;
        self
    }

    pub fn execute(self) -> Result<QueryResult> {
        let state = self.table.snapshot()?;
        let schema = self.table.schema();
        let config = self.table.config();

        let column_index = resolve_vector_column(schema, self.column.as_deref())?;
        let dimension = schema.fields()[column_index]
            .data_type()
            .vector_dimension()
            .ok_or_else(|| Error::internal("resolved column is not a vector column"))?;
        let index = state
            .indices
            .values()
            .filter(|entry| entry.column_index == column_index)
            .find_map(IndexEntry::vector);
        let distance_type = self
            .distance_type
            .or_else(|| index.map(|(index, _)| index.distance_type()))
            .unwrap_or_default();
        validate_query(&self.vector, dimension, distance_type)?;
        let nprobes = positive(self.nprobes, "nprobes")?;
        let refine_factor = positive(self.refine_factor, "refine_factor")?;
        let ef = positive(self.ef, "ef")?;
        let limit = match self.options.limit {
            Some(0) => return Err(Error::invalid_argument("vector query limit must be > 0")),
            Some(limit) => limit,
            None => DEFAULT_LIMIT,
        };
        let projection = self.options.projection(schema)?;
        let allowed: Option<Vec<bool>> = self.options.predicate(schema)?.map(|predicate| {
            let mut mask = vec![false; state.data.num_rows()];
            for row in filter::matching_rows(&predicate, &state, config.parallel_scan_min_rows) {
                mask[row] = true;
            }
            mask
        });
        let is_allowed = |row: u64| {
            allowed
                .as_ref()
                .map_or(true, |mask| mask.get(row as usize).copied().unwrap_or(false))
        };

        let column = state.data.column(column_index);
        let prepared = PreparedQuery::new(distance_type, &self.vector);
        let k = limit.saturating_add(self.options.offset);
        let num_rows = state.data.num_rows();

        let ranked = match index.filter(|(index, _)| index.distance_type() == distance_type) {
            Some((index, coverage)) => {
                let request = IndexSearch {
                    k: k.saturating_mul(refine_factor.unwrap_or(1)),
                    nprobes: nprobes.unwrap_or(DEFAULT_NPROBES),
                    ef,
                    filtered: allowed.is_some(),
                };
                let mut candidates = index.search(&self.vector, column, request, |row| {
                    coverage.covers(row) && is_allowed(row)
                });
                if refine_factor.is_some() {
                    for candidate in &mut candidates {
                        if let Some(values) = column.vector_at(candidate.0 as usize) {
                            candidate.1 = prepared.distance(values);
                        }
                    }
                }

                let uncovered: Vec<usize> = (0..num_rows)
                    .filter(|row| !coverage.covers(*row as u64) && is_allowed(*row as u64))
                    .collect();
                candidates.extend(exact_top_k(
                    column,
                    &prepared,
                    k,
                    &uncovered,
                    config.parallel_scan_min_rows,
                ));
                candidates.sort_by(|left, right| {
                    left.1.total_cmp(&right.1).then(left.0.cmp(&right.0))
                });
                candidates.truncate(k);
                candidates
            }
            None => {
                let rows: Vec<usize> = (0..num_rows).filter(|row| is_allowed(*row as u64)).collect();
                exact_top_k(column, &prepared, k, &rows, config.parallel_scan_min_rows)
            }
        };

        let (rows, distances): (Vec<usize>, Vec<f32>) = ranked
            .into_iter()
            .skip(self.options.offset)
            .map(|(row, distance)| (row as usize, distance))
            .unzip();

        tracing::debug!(
            table = %self.table.name(),
            version = state.version,
            %distance_type,
            indexed = index.is_some_and(|(index, _)| index.distance_type() == distance_type),
            rows = rows.len(),
            "vector query executed"
        );
        assemble(
            schema,
            &state.data,
            &projection,
            &rows,
            Extras {
                distances: self.with_distance.then_some(distances.as_slice()),
                with_row_id: self.options.with_row_id,
            },
            config.max_batch_rows,
        )
    }
}

fn positive(value: Option<usize>, name: &str) -> Result<Option<usize>> {
    match value {
        Some(0) => Err(Error::invalid_argument(format!("{name} must be > 0"))),
        other => Ok(other),
    }
}

/// Explicit `column`, or the schema's only vector column.
fn resolve_vector_column(schema: &Schema, column: Option<&str>) -> Result<usize> {
    if let Some(name) = column {
        let index = schema
            .index_of(name)
            .ok_or_else(|| Error::invalid_argument(format!("column '{name}' does not exist")))?;
        if !schema.fields()[index].data_type().is_vector() {
            return Err(Error::invalid_argument(format!(
                "column '{name}' is not a vector column"
            )));
        }
        return Ok(index);
    }

    let vectors: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| field.data_type().is_vector())
        .map(|(index, _)| index)
        .collect();
    match vectors.as_slice() {
        [index] => Ok(*index),
        [] => Err(Error::invalid_argument(
            "table has no vector column to search",
        )),
        _ => Err(Error::invalid_argument(format!(
            "table has {} vector columns; choose one with column()",
            vectors.len()
        ))),
    }
}

/// Exact top-`k` over `rows`, nearest first.
fn exact_top_k(
    column: &Column,
    prepared: &PreparedQuery,
    k: usize,
    rows: &[usize],
    parallel_min_rows: usize,
) -> Vec<(u64, f32)> {
    if k == 0 || rows.is_empty() {
        return Vec::new();
    }
    let score_chunk = |chunk: &[usize]| {
        let mut heap = BinaryHeap::new();
        for row in chunk {
            if let Some(values) = column.vector_at(*row) {
                push_bounded(
                    &mut heap,
                    k,
                    Candidate {
                        distance: prepared.distance(values),
                        row: *row as u64,
                    },
                );
            }
        }
        heap
    };

    let heap = if rows.len() >= parallel_min_rows {
        rows.par_chunks(PARALLEL_CHUNK_ROWS)
            .map(score_chunk)
            .reduce(BinaryHeap::new, |mut left, right| {
                for candidate in right {
                    push_bounded(&mut left, k, candidate);
                }
                left
            })
    } else {
        score_chunk(rows)
    };

    heap.into_sorted_vec()
        .into_iter()
        .map(|candidate| (candidate.row, candidate.distance))
        .collect()
}

fn push_bounded(heap: &mut BinaryHeap<Candidate>, k: usize, candidate: Candidate) {
    if heap.len() < k {
        heap.push(candidate);
        return;
    }
    let should_replace = heap.peek().is_some_and(|worst| candidate < *worst);
    if should_replace {
        let _ = heap.pop();
        heap.push(candidate);
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    row: u64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.row.cmp(&other.row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{DataType, Field};

    #[test]
    fn top_k_keeps_nearest_rows_in_order() {
        let column = Column::Vector {
            dimension: 2,
            values: vec![5.0, 0.0, 1.0, 0.0, 3.0, 0.0, 1.0, 0.0],
        };
        let prepared = PreparedQuery::new(DistanceType::L2, &[0.0, 0.0]);
        let rows = [0, 1, 2, 3];
        let sequential = exact_top_k(&column, &prepared, 3, &rows, usize::MAX);
        assert_eq!(sequential, vec![(1, 1.0), (3, 1.0), (2, 9.0)]);
        let parallel = exact_top_k(&column, &prepared, 3, &rows, 0);
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn resolves_the_only_vector_column() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int32),
            Field::new("item", DataType::Vector { dimension: 4 }),
        ])
        .expect("schema must be valid");
        assert_eq!(resolve_vector_column(&schema, None).expect("must resolve"), 1);
        let error = resolve_vector_column(&schema, Some("id")).expect_err("must fail");
        assert_eq!(error.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn ambiguous_or_missing_vector_columns_are_rejected() {
        let two = Schema::new(vec![
            Field::new("a", DataType::Vector { dimension: 2 }),
            Field::new("b", DataType::Vector { dimension: 2 }),
        ])
        .expect("schema must be valid");
        assert!(resolve_vector_column(&two, None).is_err());
        assert_eq!(resolve_vector_column(&two, Some("b")).expect("must resolve"), 1);

        let none = Schema::new(vec![Field::new("id", DataType::Int32)]).expect("schema must be valid");
        assert!(resolve_vector_column(&none, None).is_err());
    }
}
