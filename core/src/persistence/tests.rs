use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;

use crate::config::CatalogConfig;
use crate::index::{Coverage, IndexDefinition, IndexEntry, IndexOptions, IndexType};
use crate::index::{ScalarIndexConfig, VectorIndexConfig};
use crate::table::{ColumnStore, RowChanges, TableState};
use crate::tests::{cleanup, keyed_batch, keyed_schema, temp_root};

use super::snapshot::{load_snapshot, write_snapshot};
use super::wal::{append_wal, replay_wal};
use super::{
    apply_wal_record, create_table_files, load_table, persist_change, remove_table_files,
    PersistOutcome, PersistenceError, TableFiles, WalRecord,
};

fn initial_state(rows: std::ops::Range<usize>) -> TableState {
    let data = ColumnStore::from_batches(&keyed_schema(), &[keyed_batch(rows, 0)])
        .expect("store must build");
    TableState::new(1, data)
}

fn append_record(version: u64, rows: std::ops::Range<usize>) -> WalRecord {
    let (_, columns) = keyed_batch(rows, 0).into_parts();
    WalRecord::Append { version, columns }
}

fn scalar_definition(column: &str) -> IndexDefinition {
    IndexDefinition {
        name: format!("{column}_idx"),
        column: column.to_string(),
        index_type: IndexType::BTree,
        options: IndexOptions::Scalar(ScalarIndexConfig::default()),
    }
}

fn vector_definition() -> IndexDefinition {
    IndexDefinition {
        name: "item_idx".to_string(),
        column: "item".to_string(),
        index_type: IndexType::IvfPq,
        options: IndexOptions::Vector(VectorIndexConfig::default()),
    }
}

fn apply(state: &mut TableState, record: WalRecord) -> Result<(), PersistenceError> {
    apply_wal_record(state, &keyed_schema(), &CatalogConfig::default(), record)
}

#[test]
fn wal_records_apply_in_order() {
    let mut state = initial_state(0..2);

    apply(&mut state, append_record(2, 2..4)).expect("append must apply");
    apply(
        &mut state,
        WalRecord::CreateIndex {
            definition: scalar_definition("key"),
        },
    )
    .expect("index must apply");
    let (_, updated) = keyed_batch(1..2, 7).into_parts();
    apply(
        &mut state,
        WalRecord::MergeInsert {
            version: 3,
            changes: RowChanges {
                updated_rows: vec![1],
                updated,
                inserted: Vec::new(),
            },
        },
    )
    .expect("merge must apply");

    assert_eq!(state.version, 3);
    assert_eq!(state.data.num_rows(), 4);
    assert_eq!(
        state.data.column(1),
        &crate::batch::Column::Int64(vec![0, 17, 20, 30])
    );
    assert!(state.indices.contains_key("key_idx"));

    apply(
        &mut state,
        WalRecord::DropIndex {
            name: "key_idx".to_string(),
        },
    )
    .expect("drop must apply");
    apply(
        &mut state,
        WalRecord::DropIndex {
            name: "key_idx".to_string(),
        },
    )
    .expect("repeated drop must be a no-op");
    assert!(state.indices.is_empty());
}

#[test]
fn records_already_in_the_snapshot_are_skipped() {
    let mut state = initial_state(0..3);
    state.version = 5;

    apply(&mut state, append_record(5, 3..4)).expect("old append must be skipped");
    apply(&mut state, append_record(4, 3..4)).expect("old append must be skipped");
    assert_eq!(state.data.num_rows(), 3);
    assert_eq!(state.version, 5);

    apply(&mut state, append_record(6, 3..4)).expect("next append must apply");
    assert_eq!(state.data.num_rows(), 4);
}

#[test]
fn version_gaps_are_rejected() {
    let mut state = initial_state(0..1);
    let error = apply(&mut state, append_record(3, 1..2)).expect_err("must fail");
    assert!(matches!(error, PersistenceError::InvalidData(_)));
    assert_eq!(state.version, 1);
    assert_eq!(state.data.num_rows(), 1);
}

#[test]
fn replay_drops_a_torn_tail_and_truncates() {
    let root = temp_root("persist_torn");
    let wal = root.join("wal.jsonl");
    append_wal(&wal, &append_record(2, 0..1), false).expect("wal append must succeed");
    append_wal(&wal, &append_record(3, 1..2), false).expect("wal append must succeed");
    let intact = fs::metadata(&wal).expect("wal must exist").len();

    let mut file = OpenOptions::new()
        .append(true)
        .open(&wal)
        .expect("wal must open");
    file.write_all(b"deadbeef {\"type\":\"app")
        .expect("partial write must succeed");
    drop(file);

    let mut versions = Vec::new();
    let count = replay_wal(&wal, |record| {
        if let WalRecord::Append { version, .. } = record {
            versions.push(version);
        }
        Ok(())
    })
    .expect("replay must succeed");
    assert_eq!(count, 2);
    assert_eq!(versions, vec![2, 3]);
    assert_eq!(fs::metadata(&wal).expect("wal must exist").len(), intact);
    cleanup(&root);
}

#[test]
fn append_after_a_partial_line_starts_a_fresh_record() {
    let root = temp_root("persist_partial_append");
    let wal = root.join("wal.jsonl");
    append_wal(&wal, &append_record(2, 0..1), false).expect("wal append must succeed");

    let mut file = OpenOptions::new()
        .append(true)
        .open(&wal)
        .expect("wal must open");
    file.write_all(b"1a2b").expect("partial write must succeed");
    drop(file);

    append_wal(&wal, &append_record(3, 1..2), false).expect("wal append must succeed");
    let raw = fs::read_to_string(&wal).expect("wal must be readable");
    assert_eq!(raw.lines().count(), 2);

    let mut versions = Vec::new();
    replay_wal(&wal, |record| {
        if let WalRecord::Append { version, .. } = record {
            versions.push(version);
        }
        Ok(())
    })
    .expect("replay must succeed");
    assert_eq!(versions, vec![2, 3]);
    cleanup(&root);
}

#[test]
fn a_wal_holding_only_a_partial_line_is_emptied_before_append() {
    let root = temp_root("persist_partial_only");
    let wal = root.join("wal.jsonl");
    fs::create_dir_all(&root).expect("root must be creatable");
    fs::write(&wal, b"0badc0de {\"type\"").expect("wal must be writable");

    append_wal(&wal, &append_record(2, 0..1), false).expect("wal append must succeed");
    let count = replay_wal(&wal, |_| Ok(())).expect("replay must succeed");
    assert_eq!(count, 1);
    cleanup(&root);
}

#[test]
fn replay_rejects_checksum_mismatch_before_the_tail() {
    let root = temp_root("persist_checksum");
    let wal = root.join("wal.jsonl");
    append_wal(&wal, &append_record(2, 0..1), false).expect("wal append must succeed");
    append_wal(&wal, &append_record(3, 1..2), false).expect("wal append must succeed");

    let raw = fs::read_to_string(&wal).expect("wal must be readable");
    let tampered = raw.replacen("\"version\":2", "\"version\":9", 1);
    assert_ne!(raw, tampered);
    fs::write(&wal, tampered).expect("wal must be writable");

    let error = replay_wal(&wal, |_| Ok(())).expect_err("must fail");
    assert!(matches!(error, PersistenceError::InvalidData(message) if message.contains("line 1")));
    cleanup(&root);
}

#[test]
fn replay_of_a_missing_wal_reads_nothing() {
    let root = temp_root("persist_missing");
    let count = replay_wal(&root.join("wal.jsonl"), |_| Ok(())).expect("replay must succeed");
    assert_eq!(count, 0);
}

#[test]
fn snapshot_keeps_trained_vector_indices_and_rebuilds_btrees() {
    let root = temp_root("persist_snapshot");
    let path = root.join("snapshot.json");
    let schema = keyed_schema();
    let config = CatalogConfig::default();

    let mut state = initial_state(0..30);
    state.version = 4;
    let mut vector = IndexEntry::build(vector_definition(), &schema, &state.data, &config)
        .expect("vector index must build");
    if let crate::index::IndexBody::Vector { coverage, .. } = &mut vector.body {
        *coverage = Coverage {
            indexed_rows: 28,
            stale_rows: BTreeSet::from([3]),
        };
    }
    let btree = IndexEntry::build(scalar_definition("data"), &schema, &state.data, &config)
        .expect("btree must build");
    state.indices.insert("item_idx".to_string(), vector.clone());
    state.indices.insert("data_idx".to_string(), btree);

    write_snapshot(&path, "persisted", &schema, &state).expect("snapshot must write");
    let (name, loaded_schema, loaded) = load_snapshot(&path, &config).expect("snapshot must load");

    assert_eq!(name, "persisted");
    assert_eq!(loaded_schema, schema);
    assert_eq!(loaded.version, 4);
    assert_eq!(*loaded.data, *state.data);
    let (index, coverage) = loaded.indices["item_idx"]
        .vector()
        .expect("vector index must load");
    let (original, _) = vector.vector().expect("vector index must exist");
    assert_eq!(index, original);
    assert_eq!(coverage.indexed_rows, 28);
    assert_eq!(coverage.stale_rows, BTreeSet::from([3]));
    assert_eq!(
        loaded.indices["data_idx"]
            .btree()
            .expect("btree must rebuild")
            .distinct_values(),
        30
    );
    cleanup(&root);
}

#[test]
fn persist_change_checkpoints_when_due() {
    let root = temp_root("persist_checkpoint");
    let files = TableFiles::new(root.join("t.table"));
    let schema = keyed_schema();
    let mut state = initial_state(0..2);
    create_table_files(&files, "t", &schema, &state).expect("files must be created");
    assert!(files.is_initialized());

    let record = append_record(2, 2..3);
    apply(&mut state, record.clone()).expect("append must apply");
    let outcome = persist_change(&files, "t", &schema, &state, &record, false, false)
        .expect("persist must succeed");
    assert_eq!(outcome, PersistOutcome::Logged);
    assert!(fs::metadata(&files.wal).expect("wal must exist").len() > 0);

    let record = append_record(3, 3..4);
    apply(&mut state, record.clone()).expect("append must apply");
    let outcome = persist_change(&files, "t", &schema, &state, &record, true, true)
        .expect("persist must succeed");
    assert_eq!(outcome, PersistOutcome::Checkpointed);
    assert_eq!(fs::metadata(&files.wal).expect("wal must exist").len(), 0);

    let loaded = load_table(&files, &CatalogConfig::default()).expect("table must load");
    assert_eq!(loaded.name, "t");
    assert_eq!(loaded.state.version, 3);
    assert_eq!(loaded.state.data.num_rows(), 4);
    assert_eq!(loaded.wal_records, 0);
    cleanup(&root);
}

#[test]
fn failed_checkpoint_keeps_the_wal_authoritative() {
    let root = temp_root("persist_wal_only");
    let files = TableFiles::new(root.join("t.table"));
    let schema = keyed_schema();
    let mut state = initial_state(0..2);
    create_table_files(&files, "t", &schema, &state).expect("files must be created");

    // A directory in place of the snapshot makes the rename fail.
    fs::remove_file(&files.snapshot).expect("snapshot must be removable");
    fs::create_dir(&files.snapshot).expect("blocking dir must be creatable");
    fs::write(files.snapshot.join("keep"), b"x").expect("marker must be writable");

    let record = append_record(2, 2..3);
    apply(&mut state, record.clone()).expect("append must apply");
    let outcome = persist_change(&files, "t", &schema, &state, &record, false, true)
        .expect("persist must succeed");
    assert!(matches!(outcome, PersistOutcome::WalOnly { .. }));

    let count = replay_wal(&files.wal, |_| Ok(())).expect("replay must succeed");
    assert_eq!(count, 1);
    cleanup(&root);
}

#[test]
fn remove_table_files_is_idempotent() {
    let root = temp_root("persist_remove");
    let files = TableFiles::new(root.join("gone.table"));
    create_table_files(&files, "gone", &keyed_schema(), &initial_state(0..1))
        .expect("files must be created");
    assert!(files.dir.is_dir());

    remove_table_files(&files).expect("remove must succeed");
    assert!(!files.dir.exists());
    remove_table_files(&files).expect("second remove must succeed");
    cleanup(&root);
}
