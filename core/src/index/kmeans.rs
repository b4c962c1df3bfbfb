use std::borrow::Cow;

use rayon::prelude::*;

use crate::distance::l2_squared;

/// Lloyd's k-means over flat row-major data.
#[derive(Debug, Clone, Copy)]
pub(crate) struct KMeans {
    pub(crate) k: usize,
    pub(crate) max_iterations: usize,
    pub(crate) parallel_min_rows: usize,
}

impl KMeans {
    /// Returns `min(k, rows)` centroids, flattened row-major.
    pub(crate) fn train(&self, data: &[f32], dimension: usize) -> Vec<f32> {
        let rows = data.len() / dimension;
        if rows == 0 {
            return Vec::new();
        }
        let k = self.k.clamp(1, rows);
        let mut centroids = initial_centroids(data, dimension, k);
        let mut assignments = vec![usize::MAX; rows];

        for _ in 0..self.max_iterations {
            let next = assign(data, dimension, &centroids, self.parallel_min_rows);
            let changed = next
                .iter()
                .zip(&assignments)
                .filter(|(left, right)| left != right)
                .count();
            assignments = next;
            recompute_centroids(data, dimension, &assignments, &mut centroids);
            if changed == 0 {
                break;
            }
        }
        centroids
    }
}

pub(crate) fn assign(
    data: &[f32],
    dimension: usize,
    centroids: &[f32],
    parallel_min_rows: usize,
) -> Vec<usize> {
    let rows = data.len() / dimension;
    if rows >= parallel_min_rows {
        data.par_chunks_exact(dimension)
            .map(|row| nearest_centroid(row, centroids, dimension))
            .collect()
    } else {
        data.chunks_exact(dimension)
            .map(|row| nearest_centroid(row, centroids, dimension))
            .collect()
    }
}

pub(crate) fn nearest_centroid(row: &[f32], centroids: &[f32], dimension: usize) -> usize {
    let mut best_idx = 0usize;
    let mut best_dist = f32::INFINITY;
    for (idx, centroid) in centroids.chunks_exact(dimension).enumerate() {
        let distance = l2_squared(row, centroid);
        if distance < best_dist {
            best_dist = distance;
            best_idx = idx;
        }
    }
    best_idx
}

/// Picks at most `max_rows` rows with a fixed stride.
pub(crate) fn sample_rows(data: &[f32], dimension: usize, max_rows: usize) -> Cow<'_, [f32]> {
    let rows = data.len() / dimension;
    if rows <= max_rows || max_rows == 0 {
        return Cow::Borrowed(data);
    }
    let mut sample = Vec::with_capacity(max_rows * dimension);
    for pick in 0..max_rows {
        let row = pick * rows / max_rows;
        sample.extend_from_slice(&data[row * dimension..(row + 1) * dimension]);
    }
    Cow::Owned(sample)
}

/// Farthest-point seeding from a data-dependent start row.
fn initial_centroids(data: &[f32], dimension: usize, k: usize) -> Vec<f32> {
    let rows = data.len() / dimension;
    let row = |idx: usize| &data[idx * dimension..(idx + 1) * dimension];

    let first = seeded_start_index(data, dimension);
    let mut centroids = Vec::with_capacity(k * dimension);
    centroids.extend_from_slice(row(first));
    let mut nearest: Vec<f32> = (0..rows).map(|idx| l2_squared(row(idx), row(first))).collect();

    while centroids.len() / dimension < k {
        let mut best_idx = 0usize;
        let mut best_distance = f32::NEG_INFINITY;
        for (idx, distance) in nearest.iter().enumerate() {
            if *distance > best_distance {
                best_distance = *distance;
                best_idx = idx;
            }
        }
        let picked = row(best_idx);
        centroids.extend_from_slice(picked);
        for (idx, distance) in nearest.iter_mut().enumerate() {
            *distance = distance.min(l2_squared(row(idx), picked));
        }
    }
    centroids
}

fn seeded_start_index(data: &[f32], dimension: usize) -> usize {
    let rows = data.len() / dimension;
    let stride = (rows / 64).max(1);
    let mut hash = 0x9E37_79B9_7F4A_7C15_u64 ^ rows as u64;
    for (idx, values) in data.chunks_exact(dimension).enumerate().step_by(stride) {
        hash ^= (idx as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        if let Some(value) = values.first() {
            hash ^= u64::from(value.to_bits()).wrapping_mul(0x94D0_49BB_1331_11EB);
        }
        hash = hash.rotate_left(17).wrapping_mul(0x9E37_79B1_85EB_CA87);
    }
    (hash % rows as u64) as usize
}

fn recompute_centroids(
    data: &[f32],
    dimension: usize,
    assignments: &[usize],
    centroids: &mut [f32],
) {
    let k = centroids.len() / dimension;
    let mut sums = vec![0.0f64; k * dimension];
    let mut counts = vec![0usize; k];

    for (values, centroid_idx) in data.chunks_exact(dimension).zip(assignments) {
        counts[*centroid_idx] += 1;
        let sum = &mut sums[centroid_idx * dimension..(centroid_idx + 1) * dimension];
        for (acc, value) in sum.iter_mut().zip(values) {
            *acc += f64::from(*value);
        }
    }

    for (centroid_idx, count) in counts.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        let sum = &sums[centroid_idx * dimension..(centroid_idx + 1) * dimension];
        let centroid = &mut centroids[centroid_idx * dimension..(centroid_idx + 1) * dimension];
        for (target, acc) in centroid.iter_mut().zip(sum) {
            *target = (*acc / *count as f64) as f32;
        }
    }
}
