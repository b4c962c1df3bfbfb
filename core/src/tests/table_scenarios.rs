use crate::{Column, DataType, ErrorKind, Field, RecordBatch, Schema};

use super::{id_vector_batch, id_vector_schema, keyed_batch, keyed_schema, memory_catalog};

#[test]
fn empty_table_starts_at_version_one() {
    let catalog = memory_catalog();
    let table = catalog
        .create("empty", id_vector_schema(128), Vec::new())
        .expect("create must succeed");

    assert_eq!(table.count_rows().expect("count must read"), 0);
    assert_eq!(table.version().expect("version must read"), 1);
}

#[test]
fn each_append_bumps_version_by_one() {
    let catalog = memory_catalog();
    let table = catalog
        .create("appends", id_vector_schema(128), Vec::new())
        .expect("create must succeed");

    let rows = table
        .append(vec![id_vector_batch(128, 0..10)])
        .expect("append must succeed");
    assert_eq!(rows, 10);
    assert_eq!(table.version().expect("version must read"), 2);

    let rows = table
        .append(vec![id_vector_batch(128, 10..17)])
        .expect("append must succeed");
    assert_eq!(rows, 17);
    assert_eq!(table.count_rows().expect("count must read"), 17);
    assert_eq!(table.version().expect("version must read"), 3);
}

#[test]
fn create_with_rows_is_still_version_one() {
    let catalog = memory_catalog();
    let table = catalog
        .create("seeded", keyed_schema(), vec![keyed_batch(0..5, 0), keyed_batch(5..8, 0)])
        .expect("create must succeed");

    assert_eq!(table.count_rows().expect("count must read"), 8);
    assert_eq!(table.version().expect("version must read"), 1);
}

#[test]
fn append_keeps_duplicate_keys() {
    let catalog = memory_catalog();
    let table = catalog
        .create("dups", keyed_schema(), vec![keyed_batch(0..10, 0)])
        .expect("create must succeed");

    table
        .append(vec![keyed_batch(0..10, 0)])
        .expect("append must succeed");
    assert_eq!(table.count_rows().expect("count must read"), 20);

    let result = table
        .query()
        .only_if("key = 'key_3'")
        .execute()
        .expect("query must succeed");
    assert_eq!(result.num_rows(), 2);
}

#[test]
fn a_zero_row_append_still_bumps_version() {
    let catalog = memory_catalog();
    let table = catalog
        .create("zero_rows", keyed_schema(), vec![keyed_batch(0..3, 0)])
        .expect("create must succeed");

    let rows = table
        .append(vec![keyed_batch(3..3, 0)])
        .expect("append must succeed");
    assert_eq!(rows, 3);
    assert_eq!(table.version().expect("version must read"), 2);
}

#[test]
fn rejected_appends_leave_table_unchanged() {
    let catalog = memory_catalog();
    let table = catalog
        .create("strict", keyed_schema(), vec![keyed_batch(0..3, 0)])
        .expect("create must succeed");

    let error = table.append(Vec::new()).expect_err("must fail");
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);

    let other_schema = Schema::new(vec![
        Field::new("key", DataType::Utf8),
        Field::new("data", DataType::Int32),
    ])
    .expect("schema must be valid");
    let wrong = RecordBatch::try_new(
        other_schema,
        vec![
            Column::Utf8(vec!["key_9".to_string()]),
            Column::Int32(vec![90]),
        ],
    )
    .expect("batch must be valid");
    let error = table
        .append(vec![keyed_batch(3..5, 0), wrong])
        .expect_err("must fail");
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);

    assert_eq!(table.count_rows().expect("count must read"), 3);
    assert_eq!(table.version().expect("version must read"), 1);
}

#[test]
fn non_finite_vectors_are_rejected_at_batch_construction() {
    let error = RecordBatch::try_new(
        id_vector_schema(2),
        vec![
            Column::Int32(vec![1]),
            Column::Vector {
                dimension: 2,
                values: vec![f32::NAN, 0.0],
            },
        ],
    )
    .expect_err("must fail");
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
}
