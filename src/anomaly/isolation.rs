// CrabScore - GPL-3.0-or-later
// This file is part of CrabScore.
//
// Copyright (C) 2025 Daniel Freiermuth
//
// CrabScore is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// CrabScore is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with CrabScore.  If not, see <https://www.gnu.org/licenses/>.

//! Isolation-score detector.
//!
//! An ensemble of random partitioning trees. Points that are easy to cut
//! off from the rest end up in short branches, so the mean path length to
//! isolate a point is a measure of how normal it is.

use crate::anomaly::scorer::{AnomalyDetector, DetectorKind};
use crate::anomaly::{check_training_shape, quantile};
use crate::config::IsolationConfig;
use crate::error::Result;
use crate::features::FeatureMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Rows drawn per tree when not configured
const DEFAULT_MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// One tree, nodes stored in an arena with the root at index 0
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(training: &FeatureMatrix, sample: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow_node(training, sample, 0, height_limit, rng);
        tree
    }

    fn grow_node(
        &mut self,
        training: &FeatureMatrix,
        indices: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            size: indices.len(),
        });

        if depth >= height_limit || indices.len() <= 1 {
            return id;
        }

        // Draw features until one has a spread inside this node
        let mut candidates: Vec<usize> = (0..training.n_cols()).collect();
        let split = loop {
            if candidates.is_empty() {
                break None;
            }
            let pick = rng.gen_range(0..candidates.len());
            let feature = candidates[pick];
            let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = training.get(i, feature);
                (lo.min(v), hi.max(v))
            });
            if hi > lo {
                break Some((feature, lo, hi));
            }
            candidates.swap_remove(pick);
        };

        // All rows identical on every feature
        let Some((feature, lo, hi)) = split else {
            return id;
        };

        // Threshold in [lo, hi): lo goes left, hi goes right, both sides non-empty
        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| training.get(i, feature) <= threshold);

        let left = self.grow_node(training, left_rows, depth + 1, height_limit, rng);
        let right = self.grow_node(training, right_rows, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Edges from the root to the leaf holding `x`, plus the expected
    /// remaining depth of that leaf's population
    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

/// Average path length of an unsuccessful binary search tree lookup among
/// `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Fitted isolation ensemble
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    threshold: f64,
}

impl IsolationForest {
    pub fn fit(training: &FeatureMatrix, config: &IsolationConfig) -> Result<Self> {
        profiling::scope!("IsolationForest::fit");
        check_training_shape(DetectorKind::Isolation, training)?;

        let n = training.n_rows();
        let sample_size = config.max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).clamp(1, n);
        let height_limit = (sample_size as f64).log2().ceil() as usize;

        // Per-tree seeds come from one master stream, so trees can grow in
        // parallel and still be reproducible
        let mut master = StdRng::seed_from_u64(config.seed);
        let seeds: Vec<u64> = (0..config.trees).map(|_| master.gen()).collect();

        let trees: Vec<IsolationTree> = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let sample = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::grow(training, sample, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            threshold: 0.0,
        };

        let training_scores = forest.score(training);
        forest.threshold = quantile(&training_scores, 1.0 - config.contamination).unwrap_or(0.5);
        Ok(forest)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn score_row(&self, x: &[f64]) -> f64 {
        let mean_path =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        let normalizer = average_path_length(self.sample_size);
        let normalizer = if normalizer > 0.0 { normalizer } else { 1.0 };
        (-mean_path / normalizer).exp2()
    }
}

impl AnomalyDetector for IsolationForest {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Isolation
    }

    /// `2^(-E[h(x)] / c(sample_size))`, in (0, 1]
    fn score(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        profiling::scope!("IsolationForest::score");
        (0..matrix.n_rows())
            .into_par_iter()
            .map(|i| self.score_row(matrix.row(i)))
            .collect()
    }

    fn threshold(&self) -> Option<f64> {
        Some(self.threshold)
    }

    fn summary(&self) -> String {
        format!(
            "{} trees on {} rows each, contamination threshold {:.4}",
            self.trees.len(),
            self.sample_size,
            self.threshold
        )
    }
}
