use serde::{Deserialize, Serialize};

/// 8-bit scalar quantizer with a per-dimension `[min, max]` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScalarQuantizer {
    mins: Vec<f32>,
    steps: Vec<f32>,
}

impl ScalarQuantizer {
    pub(crate) fn train(data: &[f32], dimension: usize) -> Self {
        let mut mins = vec![f32::INFINITY; dimension];
        let mut maxs = vec![f32::NEG_INFINITY; dimension];
        for row in data.chunks_exact(dimension) {
            for (dim, value) in row.iter().enumerate() {
                mins[dim] = mins[dim].min(*value);
                maxs[dim] = maxs[dim].max(*value);
            }
        }
        let steps = mins
            .iter()
            .zip(&maxs)
            .map(|(min, max)| {
                let range = max - min;
                if range.is_finite() && range > 0.0 {
                    range / 255.0
                } else {
                    0.0
                }
            })
            .collect();
        let mins = mins
            .into_iter()
            .map(|min| if min.is_finite() { min } else { 0.0 })
            .collect();
        Self { mins, steps }
    }

    pub(crate) fn encode(&self, row: &[f32], out: &mut Vec<u8>) {
        for ((value, min), step) in row.iter().zip(&self.mins).zip(&self.steps) {
            let code = if *step > 0.0 {
                ((value - min) / step).round().clamp(0.0, 255.0) as u8
            } else {
                0
            };
            out.push(code);
        }
    }

    pub(crate) fn decode(&self, codes: &[u8]) -> Vec<f32> {
        codes
            .iter()
            .zip(&self.mins)
            .zip(&self.steps)
            .map(|((code, min), step)| min + f32::from(*code) * step)
            .collect()
    }
}
