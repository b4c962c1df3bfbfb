#![forbid(unsafe_code)]
//! Core of Lodestone, a single-node, file-backed vector database.
//!
//! A [`Catalog`] maps names to versioned columnar [`Table`]s. Tables carry
//! scalar BTREE and IVF-family vector indices and answer exact filter
//! queries and nearest-neighbor queries through owned builders.

pub mod batch;
pub mod catalog;
pub mod config;
pub mod distance;
pub mod error;
pub mod index;
mod persistence;
pub mod query;
pub mod table;
pub mod value;

pub use batch::{Column, DataType, Field, RecordBatch, Schema};
pub use catalog::{connect, Catalog, ConnectBuilder};
pub use config::CatalogConfig;
pub use distance::DistanceType;
pub use error::{Error, ErrorKind, Result};
pub use index::{
    IndexDescription, IndexStatistics, IndexType, ScalarIndexConfig, VectorIndexConfig,
};
pub use query::{Query, QueryResult, VectorQuery, DISTANCE_COLUMN, ROW_ID_COLUMN};
pub use table::{MergeInsertBuilder, MergeInsertConfig, MergeInsertStats, Table};
pub use value::ScalarValue;
