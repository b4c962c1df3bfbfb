use std::collections::HashSet;
use std::time::Instant;

use lodestone_core::{Column, IndexType, Table, VectorIndexConfig};

use crate::{build_table, deterministic_vector, percentile_ms};

const POINTS: usize = 20_000;
const DIMENSION: usize = 64;
const TOPK: usize = 10;
const QUERY_COUNT: usize = 128;
const NPROBES: usize = 20;
const REFINE_FACTOR: usize = 4;

struct BenchRow {
    index: &'static str,
    build_ms: f64,
    recall_at_k: f64,
    p50_ms: f64,
    p95_ms: f64,
    p99_ms: f64,
}

pub(crate) fn run_search_quality_bench(mode: &str) -> bool {
    let Some((_catalog, table)) = build_table("search_quality", POINTS, DIMENSION) else {
        return false;
    };
    let queries: Vec<Vec<f32>> = (0..QUERY_COUNT)
        .map(|seed| deterministic_vector(1_000_000 + seed as u64, DIMENSION))
        .collect();
    let Some(references) = queries
        .iter()
        .map(|query| top_row_ids(&table, query, false))
        .collect::<Option<Vec<_>>>()
    else {
        return false;
    };

    println!(
        "bench=search_quality mode={mode} points={POINTS} dimension={DIMENSION} query_count={QUERY_COUNT} topk={TOPK} nprobes={NPROBES} refine_factor={REFINE_FACTOR}"
    );
    println!("| index | build_ms | recall@{TOPK} | p50_ms | p95_ms | p99_ms |");
    println!("|---|---:|---:|---:|---:|---:|");

    for index_type in [
        IndexType::IvfFlat,
        IndexType::IvfPq,
        IndexType::IvfHnswPq,
        IndexType::IvfHnswSq,
    ] {
        let Some(row) = run_index(&table, index_type, &queries, &references) else {
            return false;
        };
        println!(
            "| {} | {:.3} | {:.4} | {:.6} | {:.6} | {:.6} |",
            row.index, row.build_ms, row.recall_at_k, row.p50_ms, row.p95_ms, row.p99_ms
        );
        println!(
            "bench=search_quality_row index={} build_ms={:.3} recall_at_k={:.6} p50_ms={:.6} p95_ms={:.6} p99_ms={:.6}",
            row.index, row.build_ms, row.recall_at_k, row.p50_ms, row.p95_ms, row.p99_ms
        );
    }
    true
}

fn run_index(
    table: &Table,
    index_type: IndexType,
    queries: &[Vec<f32>],
    references: &[Vec<u64>],
) -> Option<BenchRow> {
    let started_at = Instant::now();
    if let Err(error) =
        table.create_vector_index(&["item"], index_type, VectorIndexConfig::default())
    {
        eprintln!("error=index_build_failed index={index_type} detail=\"{error}\"");
        return None;
    }
    let build_ms = started_at.elapsed().as_secs_f64() * 1_000.0;

    let mut latencies_ms = Vec::with_capacity(queries.len());
    let mut recall_sum = 0.0f64;
    for (query, reference) in queries.iter().zip(references) {
        let started_at = Instant::now();
        let found = top_row_ids(table, query, true)?;
        latencies_ms.push(started_at.elapsed().as_secs_f64() * 1_000.0);

        let expected: HashSet<u64> = reference.iter().copied().collect();
        let hits = found.iter().filter(|row| expected.contains(row)).count();
        recall_sum += hits as f64 / reference.len().max(1) as f64;
    }

    Some(BenchRow {
        index: index_type.as_str(),
        build_ms,
        recall_at_k: recall_sum / queries.len().max(1) as f64,
        p50_ms: percentile_ms(&latencies_ms, 0.50),
        p95_ms: percentile_ms(&latencies_ms, 0.95),
        p99_ms: percentile_ms(&latencies_ms, 0.99),
    })
}

fn top_row_ids(table: &Table, query: &[f32], tuned: bool) -> Option<Vec<u64>> {
    let mut search = table
        .vector_search(query)
        .limit(TOPK)
        .with_row_id(true)
        .with_distance(false)
        .select(&[]);
    if tuned {
        search = search.nprobes(NPROBES).refine_factor(REFINE_FACTOR);
    }
    let result = match search.execute() {
        Ok(result) => result,
        Err(error) => {
            eprintln!("error=vector_search_failed detail=\"{error}\"");
            return None;
        }
    };
    match result.column(lodestone_core::ROW_ID_COLUMN) {
        Some(Column::UInt64(rows)) => Some(rows),
        other => {
            eprintln!("error=row_ids_missing detail=\"{other:?}\"");
            None
        }
    }
}
