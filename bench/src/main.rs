#![forbid(unsafe_code)]
//! Table, index and query benchmarks for Lodestone.
//!
//! Scenarios, selected with `LODESTONE_BENCH_SCENARIO`:
//! - `scan`: exact top-10 vector search over an in-memory table
//! - `filter`: filter queries with and without a BTREE index
//! - `search_quality`: recall@10 and latency per vector index type
//! - `write`: append and merge-insert latency against a file catalog
//!
//! Output is one `key=value` line per measurement.

use std::env;
use std::process;
use std::time::{Duration, Instant};

use lodestone_core::{
    connect, Catalog, Column, DataType, Field, IndexType, RecordBatch, ScalarIndexConfig, Schema,
    Table,
};
use tracing_subscriber::EnvFilter;

mod search_quality;
mod write_bench;

const DIMENSION: usize = 128;
const DATASET_SIZE: usize = 10_000;
const WARMUP_RUNS: usize = 8;
const MEASURED_RUNS: usize = 50;

fn main() {
    init_tracing();

    if cfg!(debug_assertions) && env::var("LODESTONE_ALLOW_DEBUG_BENCH").as_deref() != Ok("1") {
        eprintln!(
            "error=debug_build_not_allowed message=\"run `cargo run --release -p lodestone-bench`\""
        );
        process::exit(2);
    }

    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };

    let scenario = env::var("LODESTONE_BENCH_SCENARIO").unwrap_or_else(|_| "all".to_string());
    tracing::info!(%scenario, mode, "starting benchmarks");
    let ok = match scenario.as_str() {
        "all" => {
            run_scan_bench(mode)
                && run_filter_bench(mode)
                && search_quality::run_search_quality_bench(mode)
                && write_bench::run_write_bench(mode)
        }
        "scan" => run_scan_bench(mode),
        "filter" => run_filter_bench(mode),
        "search_quality" => search_quality::run_search_quality_bench(mode),
        "write" => write_bench::run_write_bench(mode),
        _ => {
            eprintln!(
                "error=invalid_scenario scenario=\"{scenario}\" allowed=\"all,scan,filter,search_quality,write\""
            );
            false
        }
    };

    if !ok {
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to initialize tracing subscriber: {error}");
    }
}

fn run_scan_bench(mode: &str) -> bool {
    let Some((_catalog, table)) = build_table("scan", DATASET_SIZE, DIMENSION) else {
        return false;
    };
    let query = deterministic_vector(1337, DIMENSION);

    for _ in 0..WARMUP_RUNS {
        if search_once(&table, &query).is_none() {
            return false;
        }
    }

    let mut samples_ms = Vec::with_capacity(MEASURED_RUNS);
    let mut total = Duration::ZERO;
    let mut last_rows = 0usize;
    for _ in 0..MEASURED_RUNS {
        let Some((elapsed, rows)) = search_once(&table, &query) else {
            return false;
        };
        samples_ms.push(elapsed.as_secs_f64() * 1_000.0);
        total += elapsed;
        last_rows = rows;
    }

    let (p50_ms, p95_ms, avg_ms) = summarize_ms(&samples_ms);
    let qps = MEASURED_RUNS as f64 / total.as_secs_f64();
    println!(
        "bench=exact_scan mode={mode} dataset_size={DATASET_SIZE} dimension={DIMENSION} warmup_runs={WARMUP_RUNS} measured_runs={MEASURED_RUNS} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} avg_ms={avg_ms:.6} qps={qps:.2} rows={last_rows}"
    );
    true
}

fn search_once(table: &Table, query: &[f32]) -> Option<(Duration, usize)> {
    let started_at = Instant::now();
    match table.vector_search(query).limit(10).execute() {
        Ok(result) => Some((started_at.elapsed(), result.num_rows())),
        Err(error) => {
            eprintln!("error=vector_search_failed detail=\"{error}\"");
            None
        }
    }
}

fn run_filter_bench(mode: &str) -> bool {
    let Some((_catalog, table)) = build_table("filter", DATASET_SIZE, 8) else {
        return false;
    };
    let filters = ["id = 4242", "id >= 9000 AND id < 9100", "id IN (1, 10, 100, 1000)"];

    for indexed in [false, true] {
        if indexed {
            if let Err(error) =
                table.create_scalar_index(&["id"], IndexType::BTree, ScalarIndexConfig::default())
            {
                eprintln!("error=scalar_index_failed detail=\"{error}\"");
                return false;
            }
        }
        for filter in filters {
            let mut samples_ms = Vec::with_capacity(MEASURED_RUNS);
            let mut matched = 0usize;
            for run in 0..WARMUP_RUNS + MEASURED_RUNS {
                let started_at = Instant::now();
                let result = match table.query().only_if(filter).execute() {
                    Ok(result) => result,
                    Err(error) => {
                        eprintln!("error=filter_query_failed filter=\"{filter}\" detail=\"{error}\"");
                        return false;
                    }
                };
                if run >= WARMUP_RUNS {
                    samples_ms.push(started_at.elapsed().as_secs_f64() * 1_000.0);
                }
                matched = result.num_rows();
            }
            let (p50_ms, p95_ms, avg_ms) = summarize_ms(&samples_ms);
            println!(
                "bench=filter mode={mode} dataset_size={DATASET_SIZE} indexed={indexed} filter=\"{filter}\" p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} avg_ms={avg_ms:.6} matched={matched}"
            );
        }
    }
    true
}

/// In-memory table `{id: int64, item: vector}` with `rows` deterministic rows.
fn build_table(name: &str, rows: usize, dimension: usize) -> Option<(Catalog, Table)> {
    let catalog = match connect("memory://").execute() {
        Ok(catalog) => catalog,
        Err(error) => {
            eprintln!("error=catalog_open_failed detail=\"{error}\"");
            return None;
        }
    };
    let batch = match vector_batch(0..rows, dimension) {
        Ok(batch) => batch,
        Err(error) => {
            eprintln!("error=batch_build_failed detail=\"{error}\"");
            return None;
        }
    };
    match catalog.create(name, batch.schema().clone(), vec![batch]) {
        Ok(table) => Some((catalog, table)),
        Err(error) => {
            eprintln!("error=table_create_failed table={name} detail=\"{error}\"");
            None
        }
    }
}

fn vector_schema(dimension: usize) -> lodestone_core::Result<Schema> {
    Schema::new(vec![
        Field::new("id", DataType::Int64),
        Field::new("item", DataType::Vector { dimension }),
    ])
}

fn vector_batch(
    ids: std::ops::Range<usize>,
    dimension: usize,
) -> lodestone_core::Result<RecordBatch> {
    let vectors = ids
        .clone()
        .map(|id| deterministic_vector(id as u64, dimension))
        .collect();
    RecordBatch::try_new(
        vector_schema(dimension)?,
        vec![
            Column::Int64(ids.map(|id| id as i64).collect()),
            Column::from_vectors(dimension, vectors)?,
        ],
    )
}

fn summarize_ms(samples_ms: &[f64]) -> (f64, f64, f64) {
    let p50_ms = percentile_ms(samples_ms, 0.50);
    let p95_ms = percentile_ms(samples_ms, 0.95);
    let avg_ms = if samples_ms.is_empty() {
        0.0
    } else {
        samples_ms.iter().sum::<f64>() / samples_ms.len() as f64
    };
    (p50_ms, p95_ms, avg_ms)
}

fn percentile_ms(samples_ms: &[f64], quantile: f64) -> f64 {
    if samples_ms.is_empty() {
        return 0.0;
    }

    let mut sorted = samples_ms.to_vec();
    sorted.sort_by(f64::total_cmp);
    let last_index = sorted.len().saturating_sub(1);
    let position = (quantile.clamp(0.0, 1.0) * last_index as f64).round() as usize;
    sorted[position]
}

fn deterministic_vector(seed: u64, dimension: usize) -> Vec<f32> {
    (0..dimension as u64)
        .map(|index| {
            let mut z = seed
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .wrapping_add(index.wrapping_mul(0xBF58_476D_1CE4_E5B9));
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^= z >> 31;
            (z >> 40) as f32 / (1u64 << 24) as f32
        })
        .collect()
}
