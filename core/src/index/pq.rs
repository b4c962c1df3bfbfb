use serde::{Deserialize, Serialize};

use crate::distance::{dot, l2_squared, DistanceType};

use super::kmeans::{nearest_centroid, KMeans};

const MAX_CODES: usize = 256;

/// Product quantizer with 8-bit codes per sub-vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ProductQuantizer {
    dimension: usize,
    num_sub_vectors: usize,
    num_codes: usize,
    /// `num_sub_vectors * num_codes` centroids, each `sub_dimension` wide.
    codebooks: Vec<f32>,
}

impl ProductQuantizer {
    pub(crate) fn train(
        data: &[f32],
        dimension: usize,
        num_sub_vectors: usize,
        max_iterations: usize,
        parallel_min_rows: usize,
    ) -> Self {
        let rows = data.len() / dimension;
        let sub_dimension = dimension / num_sub_vectors;
        let num_codes = rows.clamp(1, MAX_CODES);
        let kmeans = KMeans {
            k: num_codes,
            max_iterations,
            parallel_min_rows,
        };

        let mut codebooks = Vec::with_capacity(num_sub_vectors * num_codes * sub_dimension);
        for sub in 0..num_sub_vectors {
            let start = sub * sub_dimension;
            let mut sub_data = Vec::with_capacity(rows * sub_dimension);
            for row in data.chunks_exact(dimension) {
                sub_data.extend_from_slice(&row[start..start + sub_dimension]);
            }
            codebooks.extend(kmeans.train(&sub_data, sub_dimension));
        }

        Self {
            dimension,
            num_sub_vectors,
            num_codes,
            codebooks,
        }
    }

    pub(crate) fn num_sub_vectors(&self) -> usize {
        self.num_sub_vectors
    }

    fn sub_dimension(&self) -> usize {
        self.dimension / self.num_sub_vectors
    }

    fn codebook(&self, sub: usize) -> &[f32] {
        let width = self.num_codes * self.sub_dimension();
        &self.codebooks[sub * width..(sub + 1) * width]
    }

    pub(crate) fn encode(&self, row: &[f32], out: &mut Vec<u8>) {
        let sub_dimension = self.sub_dimension();
        for (sub, values) in row.chunks_exact(sub_dimension).enumerate() {
            let code = nearest_centroid(values, self.codebook(sub), sub_dimension);
            out.push(code as u8);
        }
    }

    pub(crate) fn decode(&self, codes: &[u8]) -> Vec<f32> {
        let sub_dimension = self.sub_dimension();
        let mut values = Vec::with_capacity(self.dimension);
        for (sub, code) in codes.iter().enumerate() {
            let start = usize::from(*code) * sub_dimension;
            values.extend_from_slice(&self.codebook(sub)[start..start + sub_dimension]);
        }
        values
    }

    /// Precomputes per-code partial distances for asymmetric scoring.
    ///
    /// For cosine the query and the encoded rows must already be unit length.
    pub(crate) fn distance_table(&self, distance_type: DistanceType, query: &[f32]) -> DistanceTable {
        let sub_dimension = self.sub_dimension();
        let mut partials = Vec::with_capacity(self.num_sub_vectors * self.num_codes);
        for (sub, values) in query.chunks_exact(sub_dimension).enumerate() {
            for centroid in self.codebook(sub).chunks_exact(sub_dimension) {
                partials.push(match distance_type {
                    DistanceType::Dot => dot(values, centroid),
                    DistanceType::L2 | DistanceType::Cosine => l2_squared(values, centroid),
                });
            }
        }
        DistanceTable {
            distance_type,
            num_codes: self.num_codes,
            partials,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DistanceTable {
    distance_type: DistanceType,
    num_codes: usize,
    partials: Vec<f32>,
}

impl DistanceTable {
    pub(crate) fn distance(&self, codes: &[u8]) -> f32 {
        let sum: f32 = codes
            .iter()
            .enumerate()
            .map(|(sub, code)| self.partials[sub * self.num_codes + usize::from(*code)])
            .sum();
        match self.distance_type {
            DistanceType::L2 => sum,
            DistanceType::Cosine => sum / 2.0,
            DistanceType::Dot => 1.0 - sum,
        }
    }
}
