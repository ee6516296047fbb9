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

//! Subspace-reconstruction detector.
//!
//! Keeps the principal components that explain most of the training
//! variance. Records that do not fit the learned subspace lose much of
//! themselves when projected onto it and mapped back.

use crate::anomaly::check_training_shape;
use crate::anomaly::scorer::{AnomalyDetector, DetectorKind};
use crate::config::SubspaceConfig;
use crate::error::Result;
use crate::features::FeatureMatrix;
use nalgebra::{DMatrix, SymmetricEigen};
use rayon::prelude::*;

// Cumulative ratios this close below the target still count as reaching it
const RATIO_SLACK: f64 = 1e-12;

/// Principal subspace of the training data
pub struct SubspaceModel {
    mean: Vec<f64>,
    /// Unit-length principal axes, strongest first
    components: Vec<Vec<f64>>,
    explained_ratio: f64,
}

impl SubspaceModel {
    pub fn fit(training: &FeatureMatrix, config: &SubspaceConfig) -> Result<Self> {
        profiling::scope!("SubspaceModel::fit");
        check_training_shape(DetectorKind::Subspace, training)?;

        let n = training.n_rows();
        let d = training.n_cols();
        let mean: Vec<f64> = (0..d).map(|col| training.column_moments(col).0).collect();

        let centered = DMatrix::from_fn(n, d, |r, c| training.get(r, c) - mean[c]);
        let covariance = (centered.transpose() * &centered) / (n.saturating_sub(1).max(1) as f64);
        let eigen = SymmetricEigen::new(covariance);

        // Rounding can leave tiny negative eigenvalues on singular data
        let mut axes: Vec<(f64, Vec<f64>)> = eigen
            .eigenvalues
            .iter()
            .enumerate()
            .map(|(i, &value)| (value.max(0.0), eigen.eigenvectors.column(i).iter().copied().collect()))
            .collect();
        axes.sort_by(|a, b| b.0.total_cmp(&a.0));

        let total: f64 = axes.iter().map(|(value, _)| value).sum();
        let mut components = Vec::new();
        let mut explained = 0.0;
        if total > 0.0 {
            for (value, axis) in axes {
                if explained >= config.variance_retained - RATIO_SLACK {
                    break;
                }
                explained += value / total;
                components.push(axis);
            }
        }

        tracing::debug!(
            "Subspace keeps {} of {d} components ({:.2}% variance)",
            components.len(),
            explained * 100.0
        );

        Ok(Self {
            mean,
            components,
            explained_ratio: explained,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub const fn explained_ratio(&self) -> f64 {
        self.explained_ratio
    }

    /// Mean squared difference between `x` and its reconstruction
    fn reconstruction_error(&self, x: &[f64]) -> f64 {
        let centered: Vec<f64> = x.iter().zip(&self.mean).map(|(v, m)| v - m).collect();

        let mut residual = centered.clone();
        for axis in &self.components {
            let coord: f64 = centered.iter().zip(axis).map(|(c, a)| c * a).sum();
            for (r, a) in residual.iter_mut().zip(axis) {
                *r -= coord * a;
            }
        }

        residual.iter().map(|r| r * r).sum::<f64>() / residual.len() as f64
    }
}

impl AnomalyDetector for SubspaceModel {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Subspace
    }

    fn score(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        profiling::scope!("SubspaceModel::score");
        (0..matrix.n_rows())
            .into_par_iter()
            .map(|i| self.reconstruction_error(matrix.row(i)))
            .collect()
    }

    fn summary(&self) -> String {
        format!(
            "{} of {} components, {:.2}% variance explained",
            self.components.len(),
            self.mean.len(),
            self.explained_ratio * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    /// Points on the line y = 2x with a little noise off it
    fn line() -> FeatureMatrix {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let x = f64::from(i) / 10.0;
                let wobble = 0.01 * (f64::from(i) * 1.7).sin();
                vec![x, 2.0 * x + wobble]
            })
            .collect();
        FeatureMatrix::from_rows(names(2), &rows).expect("rectangular")
    }

    #[test]
    fn test_keeps_dominant_axis_only() {
        let model = SubspaceModel::fit(&line(), &SubspaceConfig::default()).expect("fitted");
        assert_eq!(model.n_components(), 1);
        assert!(model.explained_ratio() >= 0.95);
    }

    #[test]
    fn test_off_subspace_point_scores_higher() {
        let model = SubspaceModel::fit(&line(), &SubspaceConfig::default()).expect("fitted");
        let probe = FeatureMatrix::from_rows(names(2), &[vec![1.0, 2.0], vec![1.0, -2.0]])
            .expect("rectangular");
        let scores = model.score(&probe);
        assert!(scores[0] < 1e-3);
        assert!(scores[1] > 1.0);
    }

    #[test]
    fn test_full_rank_reconstructs_exactly() {
        let config = SubspaceConfig {
            variance_retained: 1.0,
        };
        let model = SubspaceModel::fit(&line(), &config).expect("fitted");
        assert_eq!(model.n_components(), 2);
        assert!(model.score(&line()).iter().all(|e| *e < 1e-20));
    }

    #[test]
    fn test_constant_training_keeps_nothing() {
        let m = FeatureMatrix::from_rows(names(2), &vec![vec![0.0, 0.0]; 10]).expect("rectangular");
        let model = SubspaceModel::fit(&m, &SubspaceConfig::default()).expect("fitted");
        assert_eq!(model.n_components(), 0);

        let probe = FeatureMatrix::from_rows(names(2), &[vec![1.0, 3.0]]).expect("rectangular");
        // Nothing projected away from the mean: error is the plain squared norm / d
        assert!((model.score(&probe)[0] - 5.0).abs() < 1e-12);
    }
}
