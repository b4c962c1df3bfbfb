use crate::{ErrorKind, MergeInsertConfig};

use super::{int64_values, keyed_batch, keyed_schema, memory_catalog};

#[test]
fn upsert_updates_matches_and_inserts_the_rest() {
    let catalog = memory_catalog();
    let table = catalog
        .create("upsert", keyed_schema(), vec![keyed_batch(0..10, 0)])
        .expect("create must succeed");

    let stats = table
        .merge_insert(&["key"])
        .when_matched_update_all(true)
        .when_not_matched_insert_all(true)
        .execute(vec![keyed_batch(5..15, 1)])
        .expect("merge must succeed");

    assert_eq!(stats.num_updated_rows, 5);
    assert_eq!(stats.num_inserted_rows, 5);
    assert_eq!(stats.num_matched_rows, 5);
    assert_eq!(stats.version, 2);
    assert_eq!(table.count_rows().expect("count must read"), 15);
    assert_eq!(table.version().expect("version must read"), 2);

    let result = table
        .query()
        .only_if("key IN ('key_4', 'key_5', 'key_14')")
        .select(&["data"])
        .execute()
        .expect("query must succeed");
    assert_eq!(int64_values(result.column("data")), vec![40, 51, 141]);
}

#[test]
fn rerunning_the_same_upsert_keeps_rows_and_bumps_version() {
    let catalog = memory_catalog();
    let table = catalog
        .create("rerun", keyed_schema(), vec![keyed_batch(0..10, 0)])
        .expect("create must succeed");

    for expected_version in 2..=4 {
        table
            .merge_insert(&["key"])
            .execute(vec![keyed_batch(5..15, 0)])
            .expect("merge must succeed");
        assert_eq!(table.count_rows().expect("count must read"), 15);
        assert_eq!(
            table.version().expect("version must read"),
            expected_version
        );
    }
}

#[test]
fn insert_only_merge_leaves_matches_untouched() {
    let catalog = memory_catalog();
    let table = catalog
        .create("insert_only", keyed_schema(), vec![keyed_batch(0..10, 0)])
        .expect("create must succeed");

    let stats = table
        .merge_insert_with_config(
            vec![keyed_batch(5..15, 1)],
            &["key"],
            MergeInsertConfig {
                when_matched_update_all: false,
                when_not_matched_insert_all: true,
            },
        )
        .expect("merge must succeed");

    assert_eq!(stats.num_updated_rows, 0);
    assert_eq!(stats.num_inserted_rows, 5);
    assert_eq!(table.count_rows().expect("count must read"), 15);

    let result = table
        .query()
        .only_if("key = 'key_7'")
        .execute()
        .expect("query must succeed");
    assert_eq!(int64_values(result.column("data")), vec![70]);
}

#[test]
fn update_only_merge_drops_unmatched_rows() {
    let catalog = memory_catalog();
    let table = catalog
        .create("update_only", keyed_schema(), vec![keyed_batch(0..10, 0)])
        .expect("create must succeed");

    let stats = table
        .merge_insert(&["key"])
        .when_not_matched_insert_all(false)
        .execute(vec![keyed_batch(5..15, 1)])
        .expect("merge must succeed");

    assert_eq!(stats.num_updated_rows, 5);
    assert_eq!(stats.num_inserted_rows, 0);
    assert_eq!(table.count_rows().expect("count must read"), 10);
    assert_eq!(table.version().expect("version must read"), 2);
}

#[test]
fn fully_disabled_merge_changes_nothing_but_version() {
    let catalog = memory_catalog();
    let table = catalog
        .create("noop", keyed_schema(), vec![keyed_batch(0..10, 0)])
        .expect("create must succeed");

    let stats = table
        .merge_insert(&["key"])
        .when_matched_update_all(false)
        .when_not_matched_insert_all(false)
        .execute(vec![keyed_batch(5..15, 1)])
        .expect("merge must succeed");

    assert_eq!(stats.num_updated_rows + stats.num_inserted_rows, 0);
    assert_eq!(stats.num_matched_rows, 5);
    assert_eq!(table.count_rows().expect("count must read"), 10);
    assert_eq!(table.version().expect("version must read"), 2);
}

#[test]
fn invalid_merges_leave_table_unchanged() {
    let catalog = memory_catalog();
    let table = catalog
        .create("invalid_merge", keyed_schema(), vec![keyed_batch(0..10, 0)])
        .expect("create must succeed");

    let cases = [
        table.merge_insert(&[]).execute(vec![keyed_batch(0..2, 1)]),
        table.merge_insert(&["key"]).execute(Vec::new()),
        table.merge_insert(&["missing"]).execute(vec![keyed_batch(0..2, 1)]),
        table.merge_insert(&["item"]).execute(vec![keyed_batch(0..2, 1)]),
        table
            .merge_insert(&["key"])
            .execute(vec![keyed_batch(3..4, 1), keyed_batch(3..4, 2)]),
    ];
    for result in cases {
        let error = result.expect_err("must fail");
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    assert_eq!(table.count_rows().expect("count must read"), 10);
    assert_eq!(table.version().expect("version must read"), 1);
}

#[test]
fn composite_keys_match_on_every_column() {
    let catalog = memory_catalog();
    let table = catalog
        .create("composite", keyed_schema(), vec![keyed_batch(0..4, 0)])
        .expect("create must succeed");

    // key_1 with data 11 differs on `data`, so it is inserted, not matched.
    let stats = table
        .merge_insert(&["key", "data"])
        .execute(vec![keyed_batch(1..2, 1), keyed_batch(2..3, 0)])
        .expect("merge must succeed");

    assert_eq!(stats.num_matched_rows, 1);
    assert_eq!(stats.num_inserted_rows, 1);
    assert_eq!(table.count_rows().expect("count must read"), 5);
}
