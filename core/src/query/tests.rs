use crate::batch::{Column, DataType};
use crate::error::ErrorKind;
use crate::table::ColumnStore;
use crate::tests::{
    keyed_batch, keyed_schema, memory_catalog, scattered_vector, uint64_values, utf8_values,
    DIMENSION,
};

use super::{assemble, Extras, DISTANCE_COLUMN, ROW_ID_COLUMN};

fn store() -> ColumnStore {
    ColumnStore::from_batches(&keyed_schema(), &[keyed_batch(0..5, 0)])
        .expect("store must build")
}

#[test]
fn assemble_appends_distance_then_row_id() {
    let schema = keyed_schema();
    let distances = [0.5, 0.25];
    let result = assemble(
        &schema,
        &store(),
        &[1, 0],
        &[4, 2],
        Extras {
            distances: Some(&distances),
            with_row_id: true,
        },
        1024,
    )
    .expect("assemble must succeed");

    assert_eq!(
        result.schema().names(),
        vec!["data", "key", DISTANCE_COLUMN, ROW_ID_COLUMN]
    );
    assert_eq!(
        result.schema().field_with_name(DISTANCE_COLUMN).map(|field| field.data_type()),
        Some(DataType::Float32)
    );
    assert_eq!(utf8_values(result.column("key")), vec!["key_4", "key_2"]);
    assert_eq!(uint64_values(result.column(ROW_ID_COLUMN)), vec![4, 2]);
}

#[test]
fn assemble_splits_distances_with_their_rows() {
    let schema = keyed_schema();
    let distances = [1.0, 2.0, 3.0, 4.0, 5.0];
    let result = assemble(
        &schema,
        &store(),
        &[0],
        &[0, 1, 2, 3, 4],
        Extras {
            distances: Some(&distances),
            with_row_id: false,
        },
        2,
    )
    .expect("assemble must succeed");

    assert_eq!(result.num_batches(), 3);
    let last = &result.batches()[2];
    assert_eq!(last.num_rows(), 1);
    assert_eq!(
        last.column_by_name(DISTANCE_COLUMN),
        Some(&Column::Float32(vec![5.0]))
    );
}

#[test]
fn empty_selection_is_rejected_unless_something_is_generated() {
    let schema = keyed_schema();
    let error = assemble(
        &schema,
        &store(),
        &[],
        &[0],
        Extras {
            distances: None,
            with_row_id: false,
        },
        16,
    )
    .expect_err("must fail");
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);

    let ids_only = assemble(
        &schema,
        &store(),
        &[],
        &[3],
        Extras {
            distances: None,
            with_row_id: true,
        },
        16,
    )
    .expect("assemble must succeed");
    assert_eq!(ids_only.schema().names(), vec![ROW_ID_COLUMN]);
}

#[test]
fn empty_result_keeps_schema_and_yields_empty_columns() {
    let result = assemble(
        &keyed_schema(),
        &store(),
        &[0, 1],
        &[],
        Extras {
            distances: None,
            with_row_id: false,
        },
        16,
    )
    .expect("assemble must succeed");

    assert!(result.is_empty());
    assert_eq!(result.num_rows(), 0);
    assert_eq!(result.schema().names(), vec!["key", "data"]);
    assert_eq!(result.column("key"), Some(Column::Utf8(Vec::new())));
    assert_eq!(result.column("item"), None);
    assert_eq!(result.clone().into_batches().len(), 0);
}

#[test]
fn options_carry_over_into_vector_queries() {
    let catalog = memory_catalog();
    let table = catalog
        .create("carry", keyed_schema(), vec![keyed_batch(0..20, 0)])
        .expect("create must succeed");

    let result = table
        .query()
        .select(&["key"])
        .only_if("data >= 100")
        .with_row_id(true)
        .limit(2)
        .nearest_to(&scattered_vector(3, DIMENSION))
        .execute()
        .expect("search must succeed");
    assert_eq!(
        result.schema().names(),
        vec!["key", DISTANCE_COLUMN, ROW_ID_COLUMN]
    );
    assert_eq!(result.num_rows(), 2);
    assert!(uint64_values(result.column(ROW_ID_COLUMN))
        .iter()
        .all(|row| *row >= 10));
}

#[test]
fn builders_read_the_version_current_at_execute() {
    let catalog = memory_catalog();
    let table = catalog
        .create("late", keyed_schema(), vec![keyed_batch(0..3, 0)])
        .expect("create must succeed");

    let pending = table.query().select(&["key"]);
    let before = table.query().execute().expect("query must succeed");
    table
        .append(vec![keyed_batch(3..5, 0)])
        .expect("append must succeed");

    assert_eq!(before.num_rows(), 3);
    assert_eq!(pending.execute().expect("query must succeed").num_rows(), 5);

    catalog.drop("late").expect("drop must succeed");
    let error = table.query().execute().expect_err("must fail");
    assert_eq!(error.kind(), ErrorKind::NotFound);
}
