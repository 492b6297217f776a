//! Class balancing for training matrices: random undersampling and SMOTE.
//!
//! Both are deterministic for a fixed seed.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{FeatureMatrix, PipelineEvent, PipelineObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleStrategy {
    None,
    Undersample,
    Smote,
}

impl ResampleStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Undersample => "undersample",
            Self::Smote => "smote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResamplingConfig {
    pub strategy: ResampleStrategy,
    pub seed: u64,
    pub smote_neighbors: usize,
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        Self {
            strategy: ResampleStrategy::Smote,
            seed: 42,
            smote_neighbors: 5,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResampleError {
    #[error("cannot resample an empty matrix")]
    EmptyInput,
    #[error("matrix has {rows} rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("class {class} has {count} samples; SMOTE needs at least 2")]
    TooFewSamples { class: u8, count: usize },
    #[error("smote_neighbors must be >= 1")]
    InvalidNeighbors,
}

pub fn resample(
    matrix: &FeatureMatrix,
    cfg: &ResamplingConfig,
    observer: &dyn PipelineObserver,
) -> Result<FeatureMatrix, ResampleError> {
    match cfg.strategy {
        ResampleStrategy::None => Ok(matrix.clone()),
        ResampleStrategy::Undersample => resample_undersample(matrix, cfg.seed, observer),
        ResampleStrategy::Smote => resample_smote(matrix, cfg.smote_neighbors, cfg.seed, observer),
    }
}

/// Shrinks every class to the size of the smallest one. Kept rows stay in
/// their original order.
pub fn resample_undersample(
    matrix: &FeatureMatrix,
    seed: u64,
    observer: &dyn PipelineObserver,
) -> Result<FeatureMatrix, ResampleError> {
    let by_class = class_indices(matrix)?;
    let target = by_class.values().map(Vec::len).min().unwrap_or(0);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut keep: Vec<usize> = Vec::with_capacity(target * by_class.len());
    for indices in by_class.values() {
        let picked = rand::seq::index::sample(&mut rng, indices.len(), target);
        keep.extend(picked.iter().map(|pos| indices[pos]));
    }
    keep.sort_unstable();

    let out = FeatureMatrix {
        columns: matrix.columns.clone(),
        rows: keep.iter().map(|idx| matrix.rows[*idx].clone()).collect(),
        labels: keep.iter().map(|idx| matrix.labels[*idx]).collect(),
    };
    report(observer, ResampleStrategy::Undersample, matrix.len(), out.len());
    Ok(out)
}

/// Grows every class to the size of the largest one with synthetic rows
/// interpolated between a sample and one of its `k` nearest same-class
/// neighbours. Original rows come first, synthetic rows are appended.
pub fn resample_smote(
    matrix: &FeatureMatrix,
    k: usize,
    seed: u64,
    observer: &dyn PipelineObserver,
) -> Result<FeatureMatrix, ResampleError> {
    if k == 0 {
        return Err(ResampleError::InvalidNeighbors);
    }
    let by_class = class_indices(matrix)?;
    let target = by_class.values().map(Vec::len).max().unwrap_or(0);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut out = matrix.clone();
    for (class, indices) in &by_class {
        let deficit = target - indices.len();
        if deficit == 0 {
            continue;
        }
        if indices.len() < 2 {
            return Err(ResampleError::TooFewSamples {
                class: *class,
                count: indices.len(),
            });
        }

        let samples: Vec<&[f64]> = indices.iter().map(|idx| matrix.rows[*idx].as_slice()).collect();
        let neighbors = nearest_neighbors(&samples, k.min(samples.len() - 1));
        for _ in 0..deficit {
            let base = rng.gen_range(0..samples.len());
            let candidates = &neighbors[base];
            let other = candidates[rng.gen_range(0..candidates.len())];
            let gap: f64 = rng.gen();
            let synthetic = samples[base]
                .iter()
                .zip(samples[other])
                .map(|(a, b)| a + gap * (b - a))
                .collect();
            out.rows.push(synthetic);
            out.labels.push(*class);
        }
    }

    report(observer, ResampleStrategy::Smote, matrix.len(), out.len());
    Ok(out)
}

fn class_indices(matrix: &FeatureMatrix) -> Result<BTreeMap<u8, Vec<usize>>, ResampleError> {
    if matrix.rows.len() != matrix.labels.len() {
        return Err(ResampleError::LengthMismatch {
            rows: matrix.rows.len(),
            labels: matrix.labels.len(),
        });
    }
    if matrix.is_empty() {
        return Err(ResampleError::EmptyInput);
    }

    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (idx, label) in matrix.labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(idx);
    }
    Ok(by_class)
}

/// Brute-force k nearest neighbours (squared Euclidean), excluding self.
/// Ties resolve to the lower position.
fn nearest_neighbors(samples: &[&[f64]], k: usize) -> Vec<Vec<usize>> {
    samples
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let mut distances: Vec<(f64, usize)> = samples
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, b)| (squared_distance(a, b), j))
                .collect();
            distances.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
            distances.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn report(observer: &dyn PipelineObserver, strategy: ResampleStrategy, before: usize, after: usize) {
    observer.on_event(&PipelineEvent::Resampled {
        strategy: strategy.as_str().to_string(),
        before,
        after,
    });
}
