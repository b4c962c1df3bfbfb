use crate::batch::{Column, RecordBatch, Schema};
use crate::error::Result;
use crate::value::ScalarValue;

/// Row data of one table version. Row ids are row positions and stay
/// stable because rows are only ever appended or rewritten in place.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnStore {
    columns: Vec<Column>,
    num_rows: usize,
}

impl ColumnStore {
    pub(crate) fn empty(schema: &Schema) -> Self {
        Self {
            columns: schema
                .fields()
                .iter()
                .map(|field| Column::empty(field.data_type()))
                .collect(),
            num_rows: 0,
        }
    }

    /// Rebuilds a store from persisted columns, checking them against `schema`.
    pub(crate) fn from_columns(schema: &Schema, columns: Vec<Column>) -> Result<Self> {
        let batch = RecordBatch::try_new(schema.clone(), columns)?;
        let num_rows = batch.num_rows();
        let (_, columns) = batch.into_parts();
        Ok(Self { columns, num_rows })
    }

    /// Concatenates batches that already passed schema validation.
    pub(crate) fn from_batches(schema: &Schema, batches: &[RecordBatch]) -> Result<Self> {
        let mut store = Self::empty(schema);
        for batch in batches {
            store.append_columns(batch.columns())?;
        }
        Ok(store)
    }

    pub(crate) fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub(crate) fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub(crate) fn append_columns(&mut self, columns: &[Column]) -> Result<()> {
        let added = columns.first().map(Column::len).unwrap_or(0);
        for (target, source) in self.columns.iter_mut().zip(columns) {
            target.extend_from(source)?;
        }
        self.num_rows += added;
        Ok(())
    }

    /// Overwrites every column of `row` with `source_row` of `source`.
    pub(crate) fn overwrite_row(
        &mut self,
        row: usize,
        source: &[Column],
        source_row: usize,
    ) -> Result<()> {
        for (target, column) in self.columns.iter_mut().zip(source) {
            target.set_from(row, column, source_row)?;
        }
        Ok(())
    }

    pub(crate) fn take(&self, rows: &[usize]) -> Vec<Column> {
        self.columns.iter().map(|column| column.take(rows)).collect()
    }

    pub(crate) fn row_key(&self, row: usize, key_columns: &[usize]) -> Vec<ScalarValue> {
        key_columns
            .iter()
            .filter_map(|index| self.columns[*index].scalar_at(row))
            .collect()
    }
}
