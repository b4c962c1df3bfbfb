use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wide::f32x8;

use crate::error::{Error, Result};

const SIMD_WIDTH: usize = 8;
const ZERO_NORM_EPSILON: f32 = f32::EPSILON;

/// Distance function used to rank vector search results. Smaller is closer
/// for every variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceType {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// `1 - cosine_similarity`.
    Cosine,
    /// `1 - dot_product`.
    Dot,
}

impl DistanceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Cosine => "cosine",
            Self::Dot => "dot",
        }
    }
}

impl fmt::Display for DistanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceType {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Self::L2),
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            _ => Err(Error::invalid_argument(format!(
                "unknown distance type '{raw}'"
            ))),
        }
    }
}

/// Checks a query vector against the target column dimension and metric.
pub(crate) fn validate_query(
    query: &[f32],
    dimension: usize,
    distance_type: DistanceType,
) -> Result<()> {
    if query.is_empty() {
        return Err(Error::invalid_argument("query vector is empty"));
    }
    if query.len() != dimension {
        return Err(Error::invalid_argument(format!(
            "query vector dimension mismatch: expected {dimension}, got {}",
            query.len()
        )));
    }
    if let Some(index) = query.iter().position(|value| !value.is_finite()) {
        return Err(Error::invalid_argument(format!(
            "query vector contains non-finite value at index {index}"
        )));
    }
    if distance_type == DistanceType::Cosine && squared_norm(query) <= ZERO_NORM_EPSILON {
        return Err(Error::invalid_argument(
            "cosine distance is undefined for a zero-norm query vector",
        ));
    }
    Ok(())
}

/// Squared Euclidean distance between two same-length vectors.
pub fn l2_squared(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    let mut lanes = f32x8::ZERO;
    let mut tail = 0.0f32;
    simd_zip(
        left,
        right,
        |l, r| {
            let delta = l - r;
            lanes += delta * delta;
        },
        |l, r| tail += (l - r) * (l - r),
    );
    lanes.reduce_add() + tail
}

/// Dot product between two same-length vectors.
pub fn dot(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    let mut lanes = f32x8::ZERO;
    let mut tail = 0.0f32;
    simd_zip(left, right, |l, r| lanes += l * r, |l, r| tail += l * r);
    lanes.reduce_add() + tail
}

pub(crate) fn squared_norm(values: &[f32]) -> f32 {
    dot(values, values)
}

/// Returns a unit-length copy of `values`; zero vectors are returned as-is.
pub(crate) fn normalized(values: &[f32]) -> Vec<f32> {
    let norm = squared_norm(values).sqrt();
    if norm <= ZERO_NORM_EPSILON {
        return values.to_vec();
    }
    values.iter().map(|value| value / norm).collect()
}

/// Computes `distance_type` between two vectors without a prepared query.
pub fn distance(distance_type: DistanceType, left: &[f32], right: &[f32]) -> f32 {
    PreparedQuery::new(distance_type, left).distance(right)
}

/// A query vector packed into SIMD lanes once and reused against many rows.
#[derive(Debug, Clone)]
pub(crate) struct PreparedQuery {
    distance_type: DistanceType,
    lanes: Vec<f32x8>,
    tail: Vec<f32>,
    squared_norm: f32,
}

impl PreparedQuery {
    pub(crate) fn new(distance_type: DistanceType, query: &[f32]) -> Self {
        let mut chunks = query.chunks_exact(SIMD_WIDTH);
        let lanes = chunks.by_ref().map(load_f32x8).collect();
        let tail = chunks.remainder().to_vec();
        Self {
            distance_type,
            lanes,
            tail,
            squared_norm: squared_norm(query),
        }
    }

    pub(crate) fn distance(&self, row: &[f32]) -> f32 {
        match self.distance_type {
            DistanceType::L2 => self.l2_squared(row),
            DistanceType::Dot => 1.0 - self.dot_and_row_norm(row).0,
            DistanceType::Cosine => {
                let (dot, row_sq) = self.dot_and_row_norm(row);
                if row_sq <= ZERO_NORM_EPSILON || self.squared_norm <= ZERO_NORM_EPSILON {
                    return 1.0;
                }
                1.0 - dot / (self.squared_norm.sqrt() * row_sq.sqrt())
            }
        }
    }

    fn l2_squared(&self, row: &[f32]) -> f32 {
        let prefix = self.lanes.len() * SIMD_WIDTH;
        let mut sum = f32x8::ZERO;
        for (query, chunk) in self.lanes.iter().zip(row[..prefix].chunks_exact(SIMD_WIDTH)) {
            let delta = *query - load_f32x8(chunk);
            sum += delta * delta;
        }
        let tail: f32 = self
            .tail
            .iter()
            .zip(&row[prefix..])
            .map(|(query, value)| (query - value) * (query - value))
            .sum();
        sum.reduce_add() + tail
    }

    fn dot_and_row_norm(&self, row: &[f32]) -> (f32, f32) {
        let prefix = self.lanes.len() * SIMD_WIDTH;
        let mut dot_sum = f32x8::ZERO;
        let mut norm_sum = f32x8::ZERO;
        for (query, chunk) in self.lanes.iter().zip(row[..prefix].chunks_exact(SIMD_WIDTH)) {
            let value = load_f32x8(chunk);
            dot_sum += *query * value;
            norm_sum += value * value;
        }
        let mut dot_tail = 0.0f32;
        let mut norm_tail = 0.0f32;
        for (query, value) in self.tail.iter().zip(&row[prefix..]) {
            dot_tail += query * value;
            norm_tail += value * value;
        }
        (
            dot_sum.reduce_add() + dot_tail,
            norm_sum.reduce_add() + norm_tail,
        )
    }
}

fn load_f32x8(values: &[f32]) -> f32x8 {
    debug_assert_eq!(values.len(), SIMD_WIDTH);
    f32x8::from([
        values[0], values[1], values[2], values[3], values[4], values[5], values[6], values[7],
    ])
}

fn simd_zip(
    left: &[f32],
    right: &[f32],
    mut lanes_step: impl FnMut(f32x8, f32x8),
    mut scalar_step: impl FnMut(f32, f32),
) {
    let mut left_chunks = left.chunks_exact(SIMD_WIDTH);
    let mut right_chunks = right.chunks_exact(SIMD_WIDTH);
    for (l, r) in left_chunks.by_ref().zip(right_chunks.by_ref()) {
        lanes_step(load_f32x8(l), load_f32x8(r));
    }
    for (&l, &r) in left_chunks.remainder().iter().zip(right_chunks.remainder()) {
        scalar_step(l, r);
    }
}

#[cfg(test)]
mod tests;
