//! Columnar data model: schemas, typed columns and record batches.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Utf8,
    /// Fixed-width list of `dimension` float32 values.
    Vector { dimension: usize },
}

impl DataType {
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector { .. })
    }

    pub fn vector_dimension(&self) -> Option<usize> {
        match self {
            Self::Vector { dimension } => Some(*dimension),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("boolean"),
            Self::Int32 => f.write_str("int32"),
            Self::Int64 => f.write_str("int64"),
            Self::UInt64 => f.write_str("uint64"),
            Self::Float32 => f.write_str("float32"),
            Self::Float64 => f.write_str("float64"),
            Self::Utf8 => f.write_str("utf8"),
            Self::Vector { dimension } => write!(f, "vector<float32, {dimension}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    name: String,
    data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

/// Ordered, non-empty list of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::invalid_argument("schema must have at least one field"));
        }
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(Error::invalid_argument("field names must not be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::invalid_argument(format!(
                    "duplicate field '{}' in schema",
                    field.name
                )));
            }
            if field.data_type.vector_dimension() == Some(0) {
                return Err(Error::invalid_argument(format!(
                    "vector field '{}' must have dimension > 0",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn field_with_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    /// Resolves `columns` into field positions, in the requested order.
    pub(crate) fn resolve(&self, columns: &[String]) -> Result<Vec<usize>> {
        columns
            .iter()
            .map(|name| {
                self.index_of(name).ok_or_else(|| {
                    Error::invalid_argument(format!("column '{name}' does not exist"))
                })
            })
            .collect()
    }
}

/// Typed column storage. Vector values are stored flat, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Column {
    Boolean(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Utf8(Vec<String>),
    Vector { dimension: usize, values: Vec<f32> },
}

impl Column {
    pub fn empty(data_type: DataType) -> Self {
        match data_type {
            DataType::Boolean => Self::Boolean(Vec::new()),
            DataType::Int32 => Self::Int32(Vec::new()),
            DataType::Int64 => Self::Int64(Vec::new()),
            DataType::UInt64 => Self::UInt64(Vec::new()),
            DataType::Float32 => Self::Float32(Vec::new()),
            DataType::Float64 => Self::Float64(Vec::new()),
            DataType::Utf8 => Self::Utf8(Vec::new()),
            DataType::Vector { dimension } => Self::Vector {
                dimension,
                values: Vec::new(),
            },
        }
    }

    /// Builds a vector column from one `Vec` per row.
    pub fn from_vectors(dimension: usize, rows: Vec<Vec<f32>>) -> Result<Self> {
        let mut values = Vec::with_capacity(dimension * rows.len());
        for (row, vector) in rows.into_iter().enumerate() {
            if vector.len() != dimension {
                return Err(Error::invalid_argument(format!(
                    "vector at row {row} has dimension {}, expected {dimension}",
                    vector.len()
                )));
            }
            values.extend(vector);
        }
        Ok(Self::Vector { dimension, values })
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
            Self::Vector { dimension, .. } => DataType::Vector {
                dimension: *dimension,
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Boolean(values) => values.len(),
            Self::Int32(values) => values.len(),
            Self::Int64(values) => values.len(),
            Self::UInt64(values) => values.len(),
            Self::Float32(values) => values.len(),
            Self::Float64(values) => values.len(),
            Self::Utf8(values) => values.len(),
            Self::Vector { dimension, values } => values.len() / (*dimension).max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cell at `row` for non-vector columns.
    pub fn scalar_at(&self, row: usize) -> Option<ScalarValue> {
        match self {
            Self::Boolean(values) => values.get(row).map(|v| ScalarValue::Boolean(*v)),
            Self::Int32(values) => values.get(row).map(|v| ScalarValue::Int(i64::from(*v))),
            Self::Int64(values) => values.get(row).map(|v| ScalarValue::Int(*v)),
            Self::UInt64(values) => values.get(row).map(|v| ScalarValue::UInt(*v)),
            Self::Float32(values) => values.get(row).map(|v| ScalarValue::Float(f64::from(*v))),
            Self::Float64(values) => values.get(row).map(|v| ScalarValue::Float(*v)),
            Self::Utf8(values) => values.get(row).map(|v| ScalarValue::Utf8(v.clone())),
            Self::Vector { .. } => None,
        }
    }

    pub fn vector_at(&self, row: usize) -> Option<&[f32]> {
        match self {
            Self::Vector { dimension, values } => {
                let start = row.checked_mul(*dimension)?;
                values.get(start..start + *dimension)
            }
            _ => None,
        }
    }

    /// Gathers `rows` into a new column of the same type.
    pub fn take(&self, rows: &[usize]) -> Self {
        match self {
            Self::Boolean(values) => Self::Boolean(rows.iter().map(|r| values[*r]).collect()),
            Self::Int32(values) => Self::Int32(rows.iter().map(|r| values[*r]).collect()),
            Self::Int64(values) => Self::Int64(rows.iter().map(|r| values[*r]).collect()),
            Self::UInt64(values) => Self::UInt64(rows.iter().map(|r| values[*r]).collect()),
            Self::Float32(values) => Self::Float32(rows.iter().map(|r| values[*r]).collect()),
            Self::Float64(values) => Self::Float64(rows.iter().map(|r| values[*r]).collect()),
            Self::Utf8(values) => Self::Utf8(rows.iter().map(|r| values[*r].clone()).collect()),
            Self::Vector { dimension, values } => {
                let mut taken = Vec::with_capacity(rows.len() * dimension);
                for row in rows {
                    let start = row * dimension;
                    taken.extend_from_slice(&values[start..start + dimension]);
                }
                Self::Vector {
                    dimension: *dimension,
                    values: taken,
                }
            }
        }
    }

    pub fn slice(&self, offset: usize, len: usize) -> Self {
        let rows: Vec<usize> = (offset..offset.saturating_add(len).min(self.len())).collect();
        self.take(&rows)
    }

    /// Appends every row of `other`; both columns must share a data type.
    pub(crate) fn extend_from(&mut self, other: &Column) -> Result<()> {
        match (self, other) {
            (Self::Boolean(left), Self::Boolean(right)) => left.extend_from_slice(right),
            (Self::Int32(left), Self::Int32(right)) => left.extend_from_slice(right),
            (Self::Int64(left), Self::Int64(right)) => left.extend_from_slice(right),
            (Self::UInt64(left), Self::UInt64(right)) => left.extend_from_slice(right),
            (Self::Float32(left), Self::Float32(right)) => left.extend_from_slice(right),
            (Self::Float64(left), Self::Float64(right)) => left.extend_from_slice(right),
            (Self::Utf8(left), Self::Utf8(right)) => left.extend_from_slice(right),
            (
                Self::Vector {
                    dimension: left_dim,
                    values: left,
                },
                Self::Vector {
                    dimension: right_dim,
                    values: right,
                },
            ) if left_dim == right_dim => left.extend_from_slice(right),
            (left, right) => {
                return Err(Error::internal(format!(
                    "cannot extend {} column with {} values",
                    left.data_type(),
                    right.data_type()
                )))
            }
        }
        Ok(())
    }

    /// Overwrites `row` with row `source_row` of `source`.
    pub(crate) fn set_from(&mut self, row: usize, source: &Column, source_row: usize) -> Result<()> {
        match (self, source) {
            (Self::Boolean(left), Self::Boolean(right)) => left[row] = right[source_row],
            (Self::Int32(left), Self::Int32(right)) => left[row] = right[source_row],
            (Self::Int64(left), Self::Int64(right)) => left[row] = right[source_row],
            (Self::UInt64(left), Self::UInt64(right)) => left[row] = right[source_row],
            (Self::Float32(left), Self::Float32(right)) => left[row] = right[source_row],
            (Self::Float64(left), Self::Float64(right)) => left[row] = right[source_row],
            (Self::Utf8(left), Self::Utf8(right)) => left[row] = right[source_row].clone(),
            (
                Self::Vector {
                    dimension,
                    values: left,
                },
                Self::Vector {
                    dimension: source_dim,
                    values: right,
                },
            ) if dimension == source_dim => {
                let dim = *dimension;
                left[row * dim..(row + 1) * dim]
                    .copy_from_slice(&right[source_row * dim..(source_row + 1) * dim]);
            }
            (left, right) => {
                return Err(Error::internal(format!(
                    "cannot assign {} value into {} column",
                    right.data_type(),
                    left.data_type()
                )))
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Vector { dimension, values } => {
                if *dimension == 0 || values.len() % dimension != 0 {
                    return Err(Error::invalid_argument(format!(
                        "vector column holds {} values, not a multiple of dimension {dimension}",
                        values.len()
                    )));
                }
                if let Some(index) = values.iter().position(|value| !value.is_finite()) {
                    return Err(Error::invalid_argument(format!(
                        "vector column contains non-finite value at row {}",
                        index / dimension
                    )));
                }
            }
            Self::Float32(values) => {
                if let Some(row) = values.iter().position(|value| !value.is_finite()) {
                    return Err(Error::invalid_argument(format!(
                        "float column contains non-finite value at row {row}"
                    )));
                }
            }
            Self::Float64(values) => {
                if let Some(row) = values.iter().position(|value| !value.is_finite()) {
                    return Err(Error::invalid_argument(format!(
                        "float column contains non-finite value at row {row}"
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// A schema plus equally long columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    schema: Schema,
    columns: Vec<Column>,
    num_rows: usize,
}

impl RecordBatch {
    pub fn try_new(schema: Schema, columns: Vec<Column>) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(Error::invalid_argument(format!(
                "batch has {} columns but schema declares {}",
                columns.len(),
                schema.len()
            )));
        }

        let num_rows = columns.first().map(Column::len).unwrap_or(0);
        for (field, column) in schema.fields().iter().zip(&columns) {
            if column.data_type() != field.data_type() {
                return Err(Error::invalid_argument(format!(
                    "column '{}' has type {}, schema declares {}",
                    field.name(),
                    column.data_type(),
                    field.data_type()
                )));
            }
            column.validate()?;
            if column.len() != num_rows {
                return Err(Error::invalid_argument(format!(
                    "column '{}' has {} rows, expected {num_rows}",
                    field.name(),
                    column.len()
                )));
            }
        }

        Ok(Self {
            schema,
            columns,
            num_rows,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.schema
            .index_of(name)
            .and_then(|index| self.columns.get(index))
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn slice(&self, offset: usize, len: usize) -> Self {
        let columns: Vec<Column> = self
            .columns
            .iter()
            .map(|column| column.slice(offset, len))
            .collect();
        let num_rows = columns.first().map(Column::len).unwrap_or(0);
        Self {
            schema: self.schema.clone(),
            columns,
            num_rows,
        }
    }

    pub fn into_parts(self) -> (Schema, Vec<Column>) {
        (self.schema, self.columns)
    }
}
