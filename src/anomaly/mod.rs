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

pub mod boundary;
pub mod isolation;
pub mod scorer;
pub mod subspace;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::features::FeatureMatrix;
use boundary::OneClassBoundary;
use isolation::IsolationForest;
use scorer::{AnomalyDetector, DetectorKind, RawScores};
use subspace::SubspaceModel;

/// Fitted state summary of one detector
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSummary {
    pub kind: DetectorKind,
    pub description: String,
    pub threshold: Option<f64>,
}

/// The three detectors, fitted once on the scaled training matrix
pub struct DetectorBank {
    feature_names: Vec<String>,
    isolation: IsolationForest,
    subspace: SubspaceModel,
    boundary: OneClassBoundary,
}

impl DetectorBank {
    /// Fit all detectors; any failure fails the bank
    ///
    /// The detectors are independent and are fitted in parallel.
    pub fn fit(training: &FeatureMatrix, config: &PipelineConfig) -> Result<Self> {
        profiling::scope!("DetectorBank::fit");
        let start = std::time::Instant::now();

        let (isolation, (subspace, boundary)) = rayon::join(
            || IsolationForest::fit(training, &config.isolation),
            || {
                rayon::join(
                    || SubspaceModel::fit(training, &config.subspace),
                    || OneClassBoundary::fit(training, &config.boundary),
                )
            },
        );

        let bank = Self {
            feature_names: training.names().to_vec(),
            isolation: isolation?,
            subspace: subspace?,
            boundary: boundary?,
        };

        for detector in bank.detectors() {
            tracing::info!("Fitted {} detector: {}", detector.kind(), detector.summary());
        }
        tracing::debug!("Detector bank fitted in {:?}", start.elapsed());

        Ok(bank)
    }

    pub fn detectors(&self) -> [&dyn AnomalyDetector; 3] {
        [&self.isolation, &self.subspace, &self.boundary]
    }

    /// Raw scores of every detector for each row of `matrix`
    pub fn score(&self, matrix: &FeatureMatrix) -> Result<RawScores> {
        profiling::scope!("DetectorBank::score");
        if matrix.names() != self.feature_names.as_slice() {
            return Err(Error::FeatureMismatch {
                expected: self.feature_names.clone(),
                got: matrix.names().to_vec(),
            });
        }

        let (isolation, (subspace, boundary)) = rayon::join(
            || self.isolation.score(matrix),
            || rayon::join(|| self.subspace.score(matrix), || self.boundary.score(matrix)),
        );

        Ok(RawScores {
            isolation,
            subspace,
            boundary,
        })
    }

    pub fn summaries(&self) -> Vec<DetectorSummary> {
        self.detectors()
            .iter()
            .map(|d| DetectorSummary {
                kind: d.kind(),
                description: d.summary(),
                threshold: d.threshold(),
            })
            .collect()
    }
}

/// Reject training matrices no detector can be fitted on
pub(crate) fn check_training_shape(kind: DetectorKind, training: &FeatureMatrix) -> Result<()> {
    let reason = if training.n_cols() == 0 {
        Some("training matrix has no features".to_string())
    } else if training.n_rows() == 0 {
        Some("training matrix has no rows".to_string())
    } else if training.n_rows() < training.n_cols() {
        Some(format!(
            "{} rows is fewer than {} features",
            training.n_rows(),
            training.n_cols()
        ))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::DetectorFit {
            detector: kind.name(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Linear-interpolated quantile, `q` in [0, 1]
pub(crate) fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Rescale scores to the 0-100 range
///
/// The minimum maps to 0 and the maximum to 100. If every score is equal
/// there is no range to stretch, and all scores map to 0.
///
/// Only finite scores set the range. A score that overflowed to `+inf`
/// maps to 100; `-inf` and NaN map to 0.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    let (min_score, max_score) = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s), hi.max(s))
        });
    let range = max_score - min_score;
    let has_range = range.is_finite() && range > 0.0;

    scores
        .iter()
        .map(|&s| {
            if s.is_infinite() && s.is_sign_positive() {
                100.0
            } else if s.is_finite() && has_range {
                (((s - min_score) / range) * 100.0).clamp(0.0, 100.0)
            } else {
                0.0
            }
        })
        .collect()
}
