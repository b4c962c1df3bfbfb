use std::borrow::Cow;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::batch::Column;
use crate::distance::{normalized, DistanceType, PreparedQuery};
use crate::error::{Error, Result};

use super::hnsw::HnswGraph;
use super::ivf::IvfModel;
use super::kmeans::{sample_rows, KMeans};
use super::pq::ProductQuantizer;
use super::sq::ScalarQuantizer;
use super::{space_distance, IndexType};

/// Training parameters after defaults have been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct VectorIndexParams {
    pub(crate) num_partitions: usize,
    pub(crate) num_sub_vectors: Option<usize>,
    pub(crate) max_iterations: usize,
    pub(crate) sample_rate: usize,
    pub(crate) hnsw_m: usize,
    pub(crate) hnsw_ef_construction: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Quantizer {
    Flat,
    Product(ProductQuantizer),
    Scalar(ScalarQuantizer),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Partition {
    row_ids: Vec<u64>,
    /// Quantized rows, `code_width` bytes each, parallel to `row_ids`.
    codes: Vec<u8>,
    graph: Option<HnswGraph>,
}

/// A trained IVF-family index over one vector column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct VectorIndex {
    index_type: IndexType,
    distance_type: DistanceType,
    dimension: usize,
    params: VectorIndexParams,
    ivf: IvfModel,
    quantizer: Quantizer,
    partitions: Vec<Partition>,
}

/// Per-query knobs for [`VectorIndex::search`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct IndexSearch {
    pub(crate) k: usize,
    pub(crate) nprobes: usize,
    pub(crate) ef: Option<usize>,
    /// Set when a row predicate restricts candidates; graph walks are
    /// skipped because they cannot see past filtered-out nodes. Partitions
    /// no larger than `ef` are scanned in full as well.
    pub(crate) filtered: bool,
}

impl VectorIndex {
    pub(crate) fn train(
        column: &Column,
        index_type: IndexType,
        distance_type: DistanceType,
        params: VectorIndexParams,
        parallel_min_rows: usize,
    ) -> Result<Self> {
        let Column::Vector { dimension, values } = column else {
            return Err(Error::internal("vector index requires a vector column"));
        };
        let dimension = *dimension;
        let rows = column.len();
        let started = Instant::now();

        let space = to_index_space(distance_type, values, dimension);
        let sample = sample_rows(
            &space,
            dimension,
            params.num_partitions.saturating_mul(params.sample_rate),
        );
        let ivf = IvfModel::train(
            &sample,
            dimension,
            KMeans {
                k: params.num_partitions,
                max_iterations: params.max_iterations,
                parallel_min_rows,
            },
        );
        let assignments = ivf.assign(&space, parallel_min_rows);

        let quantizer = match index_type {
            IndexType::IvfFlat => Quantizer::Flat,
            IndexType::IvfPq | IndexType::IvfHnswPq => {
                let num_sub_vectors = params.num_sub_vectors.unwrap_or(1);
                Quantizer::Product(ProductQuantizer::train(
                    &sample,
                    dimension,
                    num_sub_vectors,
                    params.max_iterations,
                    parallel_min_rows,
                ))
            }
            IndexType::IvfHnswSq => Quantizer::Scalar(ScalarQuantizer::train(&space, dimension)),
            IndexType::BTree => {
                return Err(Error::internal("BTREE is not a vector index type"));
            }
        };

        let mut partitions: Vec<Partition> = (0..ivf.num_partitions())
            .map(|_| Partition {
                row_ids: Vec::new(),
                codes: Vec::new(),
                graph: None,
            })
            .collect();
        for (row, (values, partition)) in space
            .chunks_exact(dimension)
            .zip(&assignments)
            .enumerate()
        {
            let target = &mut partitions[*partition];
            target.row_ids.push(row as u64);
            match &quantizer {
                Quantizer::Flat => {}
                Quantizer::Product(pq) => pq.encode(values, &mut target.codes),
                Quantizer::Scalar(sq) => sq.encode(values, &mut target.codes),
            }
        }

        if matches!(index_type, IndexType::IvfHnswPq | IndexType::IvfHnswSq) {
            for (seed, partition) in partitions.iter_mut().enumerate() {
                let vector = |node: usize| {
                    let row = partition.row_ids[node] as usize;
                    &space[row * dimension..(row + 1) * dimension]
                };
                let graph = HnswGraph::build(
                    partition.row_ids.len(),
                    params.hnsw_m,
                    params.hnsw_ef_construction,
                    seed as u64,
                    |left, right| space_distance(distance_type, vector(left), vector(right)),
                );
                partition.graph = Some(graph);
            }
        }

        tracing::debug!(
            index_type = %index_type,
            %distance_type,
            rows,
            partitions = partitions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "trained vector index"
        );

        Ok(Self {
            index_type,
            distance_type,
            dimension,
            params,
            ivf,
            quantizer,
            partitions,
        })
    }

    pub(crate) fn distance_type(&self) -> DistanceType {
        self.distance_type
    }

    pub(crate) fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub(crate) fn params(&self) -> &VectorIndexParams {
        &self.params
    }

    /// Returns up to `request.k` `(row_id, distance)` pairs accepted by
    /// `allowed`, nearest first. Distances are approximate for quantized
    /// index types.
    ///
    /// Probing starts with `request.nprobes` partitions and widens until
    /// `k` candidates are found or every partition has been visited.
    pub(crate) fn search(
        &self,
        query: &[f32],
        column: &Column,
        request: IndexSearch,
        allowed: impl Fn(u64) -> bool,
    ) -> Vec<(u64, f32)> {
        let space_query = match self.distance_type {
            DistanceType::Cosine => normalized(query),
            DistanceType::L2 | DistanceType::Dot => query.to_vec(),
        };
        let scorer = RowScorer::new(self, query, &space_query, column);
        let mut results: Vec<(u64, f32)> = Vec::new();

        for (probed, partition_idx) in self
            .ivf
            .probe_order(self.distance_type, &space_query)
            .into_iter()
            .enumerate()
        {
            if probed >= request.nprobes && results.len() >= request.k {
                break;
            }
            let partition = &self.partitions[partition_idx];
            let ef = request.ef.unwrap_or(request.k).max(request.k);
            match (&partition.graph, request.filtered) {
                (Some(graph), false) if ef < partition.row_ids.len() => {
                    for (node, distance) in graph.search(ef, |node| scorer.score(partition, node)) {
                        let row = partition.row_ids[node];
                        if allowed(row) {
                            results.push((row, distance));
                        }
                    }
                }
                _ => {
                    for (node, row) in partition.row_ids.iter().enumerate() {
                        if allowed(*row) {
                            results.push((*row, scorer.score(partition, node)));
                        }
                    }
                }
            }
        }

        results.sort_by(|left, right| left.1.total_cmp(&right.1).then(left.0.cmp(&right.0)));
        results.truncate(request.k);
        results
    }
}

enum RowScorer<'a> {
    Exact {
        prepared: PreparedQuery,
        column: &'a Column,
    },
    Product {
        table: super::pq::DistanceTable,
        width: usize,
    },
    Scalar {
        quantizer: &'a ScalarQuantizer,
        query: Vec<f32>,
        distance_type: DistanceType,
        width: usize,
    },
}

impl<'a> RowScorer<'a> {
    fn new(index: &'a VectorIndex, query: &[f32], space_query: &[f32], column: &'a Column) -> Self {
        match &index.quantizer {
            Quantizer::Flat => Self::Exact {
                prepared: PreparedQuery::new(index.distance_type, query),
                column,
            },
            Quantizer::Product(pq) => Self::Product {
                table: pq.distance_table(index.distance_type, space_query),
                width: pq.num_sub_vectors(),
            },
            Quantizer::Scalar(sq) => Self::Scalar {
                quantizer: sq,
                query: space_query.to_vec(),
                distance_type: index.distance_type,
                width: index.dimension,
            },
        }
    }

    fn score(&self, partition: &Partition, node: usize) -> f32 {
        match self {
            Self::Exact { prepared, column } => column
                .vector_at(partition.row_ids[node] as usize)
                .map(|values| prepared.distance(values))
                .unwrap_or(f32::INFINITY),
            Self::Product { table, width } => {
                table.distance(&partition.codes[node * width..(node + 1) * width])
            }
            Self::Scalar {
                quantizer,
                query,
                distance_type,
                width,
            } => {
                let decoded = quantizer.decode(&partition.codes[node * width..(node + 1) * width]);
                space_distance(*distance_type, query, &decoded)
            }
        }
    }
}

fn to_index_space(distance_type: DistanceType, values: &[f32], dimension: usize) -> Cow<'_, [f32]> {
    match distance_type {
        DistanceType::Cosine => Cow::Owned(
            values
                .chunks_exact(dimension)
                .flat_map(normalized)
                .collect(),
        ),
        DistanceType::L2 | DistanceType::Dot => Cow::Borrowed(values),
    }
}
