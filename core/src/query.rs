//! Query engine. Builders are owned values consumed by `execute`.

use crate::batch::{Column, DataType, Field, RecordBatch, Schema};
use crate::error::{Error, Result};
use crate::table::{ColumnStore, Table};

mod filter;
mod vector;

use filter::Predicate;
pub use vector::VectorQuery;

pub const ROW_ID_COLUMN: &str = "_rowid";
pub const DISTANCE_COLUMN: &str = "_distance";

/// Options shared by filter and vector queries.
#[derive(Debug, Clone, Default)]
struct QueryOptions {
    select: Option<Vec<String>>,
    filter: Option<String>,
    limit: Option<usize>,
    offset: usize,
    with_row_id: bool,
}

impl QueryOptions {
    fn projection(&self, schema: &Schema) -> Result<Vec<usize>> {
        match &self.select {
            Some(columns) => schema.resolve(columns),
            None => Ok((0..schema.len()).collect()),
        }
    }

    fn predicate(&self, schema: &Schema) -> Result<Option<Predicate>> {
        self.filter
            .as_deref()
            .map(|source| filter::compile(source, schema))
            .transpose()
    }
}

/// Rows produced by one query execution. No matches means no batches.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    schema: Schema,
    batches: Vec<RecordBatch>,
}

impl QueryResult {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// `name` concatenated across every batch.
    pub fn column(&self, name: &str) -> Option<Column> {
        let index = self.schema.index_of(name)?;
        let mut merged = Column::empty(self.schema.fields()[index].data_type());
        for batch in &self.batches {
            merged.extend_from(&batch.columns()[index]).ok()?;
        }
        Some(merged)
    }
}

/// Exact filter query over one table version.
#[derive(Debug)]
pub struct Query {
    table: Table,
    options: QueryOptions,
}

impl Query {
    pub(crate) fn new(table: Table) -> Self {
        Self {
            table,
            options: QueryOptions::default(),
        }
    }

    /// Output columns, in this order. Defaults to every column.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.options.select = Some(columns.iter().map(|name| name.to_string()).collect());
        self
    }

    /// SQL-like row filter, e.g. `key IN ('a', 'b') AND score >= 0.5`.
    pub fn only_if(mut self, filter: impl Into<String>) -> Self {
        self.options.filter = Some(filter.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.options.offset = offset;
        self
    }

    /// Appends a `_rowid` column holding each row's position.
    pub fn with_row_id(mut self, enabled: bool) -> Self {
        self.options.with_row_id = enabled;
        self
    }

    /// Turns this into a nearest-neighbor query, keeping the options set so far.
    pub fn nearest_to(self, vector: &[f32]) -> VectorQuery {
        VectorQuery::new(self.table, self.options, vector.to_vec())
    }

    pub fn execute(self) -> Result<QueryResult> {
        let state = self.table.snapshot()?;
        let schema = self.table.schema();
        let config = self.table.config();
        let projection = self.options.projection(schema)?;

        let rows = match self.options.predicate(schema)? {
            Some(predicate) => {
                filter::matching_rows(&predicate, &state, config.parallel_scan_min_rows)
            }
            None => (0..state.data.num_rows()).collect(),
        };
        let rows: Vec<usize> = rows
            .into_iter()
            .skip(self.options.offset)
            .take(self.options.limit.unwrap_or(usize::MAX))
            .collect();

        tracing::debug!(
            table = %self.table.name(),
            version = state.version,
            rows = rows.len(),
            "filter query executed"
        );
        assemble(
            schema,
            &state.data,
            &projection,
            &rows,
            Extras {
                distances: None,
                with_row_id: self.options.with_row_id,
            },
            config.max_batch_rows,
        )
    }
}

/// Generated columns appended after the projection.
struct Extras<'a> {
    distances: Option<&'a [f32]>,
    with_row_id: bool,
}

fn assemble(
    schema: &Schema,
    data: &ColumnStore,
    projection: &[usize],
    rows: &[usize],
    extras: Extras<'_>,
    max_batch_rows: usize,
) -> Result<QueryResult> {
    let mut fields: Vec<Field> = projection
        .iter()
        .map(|index| schema.fields()[*index].clone())
        .collect();
    if extras.distances.is_some() {
        fields.push(Field::new(DISTANCE_COLUMN, DataType::Float32));
    }
    if extras.with_row_id {
        fields.push(Field::new(ROW_ID_COLUMN, DataType::UInt64));
    }
    if fields.is_empty() {
        return Err(Error::invalid_argument("query selects no columns"));
    }
    let output = Schema::new(fields)?;

    let mut batches = Vec::with_capacity(rows.len().div_ceil(max_batch_rows));
    for (chunk_index, chunk) in rows.chunks(max_batch_rows).enumerate() {
        let mut columns: Vec<Column> = projection
            .iter()
            .map(|index| data.column(*index).take(chunk))
            .collect();
        if let Some(distances) = extras.distances {
            let start = chunk_index * max_batch_rows;
            columns.push(Column::Float32(
                distances[start..start + chunk.len()].to_vec(),
            ));
        }
        if extras.with_row_id {
            columns.push(Column::UInt64(chunk.iter().map(|row| *row as u64).collect()));
        }
        batches.push(RecordBatch::try_new(output.clone(), columns)?);
    }

    Ok(QueryResult {
        schema: output,
        batches,
    })
}

impl Table {
    /// Starts a filter query against the latest version.
    pub fn query(&self) -> Query {
        Query::new(self.clone())
    }

    /// Starts a nearest-neighbor query for `vector`.
    pub fn vector_search(&self, vector: &[f32]) -> VectorQuery {
        self.query().nearest_to(vector)
    }

    /// One-shot nearest-neighbor search with default tunables.
    pub fn nearest_to(
        &self,
        vector: &[f32],
        limit: usize,
        column: Option<&str>,
    ) -> Result<QueryResult> {
        let mut query = self.vector_search(vector).limit(limit);
        if let Some(column) = column {
            query = query.column(column);
        }
        query.execute()
    }
}

#[cfg(test)]
mod tests;
