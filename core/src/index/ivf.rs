use serde::{Deserialize, Serialize};

use crate::distance::DistanceType;

use super::kmeans::{self, KMeans};
use super::space_distance;

const MAX_PARTITIONS: usize = 256;

/// Coarse IVF quantizer: one centroid per partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct IvfModel {
    dimension: usize,
    centroids: Vec<f32>,
}

impl IvfModel {
    pub(crate) fn train(sample: &[f32], dimension: usize, kmeans: KMeans) -> Self {
        Self {
            dimension,
            centroids: kmeans.train(sample, dimension),
        }
    }

    pub(crate) fn num_partitions(&self) -> usize {
        self.centroids.len() / self.dimension
    }

    pub(crate) fn assign(&self, data: &[f32], parallel_min_rows: usize) -> Vec<usize> {
        kmeans::assign(data, self.dimension, &self.centroids, parallel_min_rows)
    }

    /// Partition ids ordered from the closest centroid to the farthest.
    pub(crate) fn probe_order(&self, distance_type: DistanceType, query: &[f32]) -> Vec<usize> {
        let mut scored: Vec<(usize, f32)> = self
            .centroids
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(idx, centroid)| (idx, space_distance(distance_type, query, centroid)))
            .collect();
        scored.sort_by(|left, right| left.1.total_cmp(&right.1).then(left.0.cmp(&right.0)));
        scored.into_iter().map(|(idx, _)| idx).collect()
    }
}

/// Default partition count: `round(sqrt(rows))`, at most 256 and at most `rows`.
pub(crate) fn default_num_partitions(rows: usize) -> usize {
    let sqrt = (rows as f64).sqrt().round() as usize;
    sqrt.clamp(1, MAX_PARTITIONS).min(rows.max(1))
}
