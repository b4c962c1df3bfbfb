use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use lodestone_core::{connect, CatalogConfig, Table};

use crate::{percentile_ms, summarize_ms, vector_batch, vector_schema};

const DIMENSION: usize = 64;
const ROWS_PER_WRITE: usize = 16;
const WRITES: usize = 512;
const CHECKPOINT_INTERVAL: usize = 128;

#[derive(Clone, Copy)]
enum Operation {
    Append,
    MergeInsert,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::MergeInsert => "merge_insert",
        }
    }
}

pub(crate) fn run_write_bench(mode: &str) -> bool {
    let root = temp_root();
    println!(
        "bench=write mode={mode} writes={WRITES} rows_per_write={ROWS_PER_WRITE} dimension={DIMENSION} checkpoint_interval={CHECKPOINT_INTERVAL}"
    );
    println!("| operation | sync | p50_ms | p95_ms | p99_ms | avg_ms | writes_per_s |");
    println!("|---|---:|---:|---:|---:|---:|---:|");

    let mut ok = true;
    'outer: for sync in [true, false] {
        for operation in [Operation::Append, Operation::MergeInsert] {
            let dir = root.join(format!("{}_{sync}", operation.as_str()));
            let Some((elapsed, latencies_ms)) = run_writes(&dir, operation, sync) else {
                ok = false;
                break 'outer;
            };
            let (p50_ms, p95_ms, avg_ms) = summarize_ms(&latencies_ms);
            let p99_ms = percentile_ms(&latencies_ms, 0.99);
            let per_second = WRITES as f64 / elapsed.as_secs_f64();
            println!(
                "| {} | {sync} | {p50_ms:.6} | {p95_ms:.6} | {p99_ms:.6} | {avg_ms:.6} | {per_second:.2} |",
                operation.as_str()
            );
            println!(
                "bench=write_row operation={} sync={sync} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} p99_ms={p99_ms:.6} avg_ms={avg_ms:.6} writes_per_s={per_second:.2}",
                operation.as_str()
            );
        }
    }

    clean_root(&root);
    ok
}

fn run_writes(dir: &Path, operation: Operation, sync: bool) -> Option<(Duration, Vec<f64>)> {
    let config = CatalogConfig {
        wal_sync_on_write: sync,
        checkpoint_interval: CHECKPOINT_INTERVAL,
        ..CatalogConfig::default()
    };
    let catalog = match connect(&dir.to_string_lossy()).config(config).execute() {
        Ok(catalog) => catalog,
        Err(error) => {
            eprintln!("error=catalog_open_failed dir={} detail=\"{error}\"", dir.display());
            return None;
        }
    };
    let table = match vector_schema(DIMENSION)
        .and_then(|schema| catalog.create("writes", schema, Vec::new()))
    {
        Ok(table) => table,
        Err(error) => {
            eprintln!("error=table_create_failed detail=\"{error}\"");
            return None;
        }
    };

    let mut latencies_ms = Vec::with_capacity(WRITES);
    let started_at = Instant::now();
    for write in 0..WRITES {
        // Merge-inserts cycle over a fixed key space so half of them update.
        let first = match operation {
            Operation::Append => write * ROWS_PER_WRITE,
            Operation::MergeInsert => (write % (WRITES / 2)) * ROWS_PER_WRITE,
        };
        let write_started = Instant::now();
        if let Err(error) = write_once(&table, operation, first) {
            eprintln!(
                "error=write_failed operation={} write={write} detail=\"{error}\"",
                operation.as_str()
            );
            return None;
        }
        latencies_ms.push(write_started.elapsed().as_secs_f64() * 1_000.0);
    }
    Some((started_at.elapsed(), latencies_ms))
}

fn write_once(table: &Table, operation: Operation, first: usize) -> lodestone_core::Result<()> {
    let batch = vector_batch(first..first + ROWS_PER_WRITE, DIMENSION)?;
    match operation {
        Operation::Append => table.append(vec![batch]).map(|_| ()),
        Operation::MergeInsert => table.merge_insert(&["id"]).execute(vec![batch]).map(|_| ()),
    }
}

fn temp_root() -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir().join(format!("lodestone_write_bench_{timestamp}"))
}

fn clean_root(root: &Path) {
    if let Err(error) = fs::remove_dir_all(root) {
        if root.exists() {
            eprintln!(
                "warning=bench_cleanup_failed root={} detail=\"{error}\"",
                root.display()
            );
        }
    }
}
