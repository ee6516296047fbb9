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

use crate::anomaly::normalize_scores;
use crate::config::EnsembleWeights;
use crate::error::{Error, Result};
use crate::features::FeatureMatrix;
use std::fmt;

/// The three detectors of the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DetectorKind {
    Isolation,
    Subspace,
    Boundary,
}

impl DetectorKind {
    pub const ALL: [Self; 3] = [Self::Isolation, Self::Subspace, Self::Boundary];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Isolation => "isolation",
            Self::Subspace => "subspace",
            Self::Boundary => "boundary",
        }
    }

    /// Output column holding this detector's raw score
    pub const fn score_column(self) -> &'static str {
        match self {
            Self::Isolation => "isolation_score",
            Self::Subspace => "subspace_score",
            Self::Boundary => "boundary_score",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// A fitted unsupervised anomaly detector
pub trait AnomalyDetector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// One raw score per matrix row; higher = more anomalous
    fn score(&self, matrix: &FeatureMatrix) -> Vec<f64>;

    /// Raw score above which a record counts as outlying at the configured
    /// expected anomaly fraction, if the detector has one
    fn threshold(&self) -> Option<f64> {
        None
    }

    /// One-line description of the fitted state
    fn summary(&self) -> String;
}

/// Raw scores of every detector, aligned with the scored rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawScores {
    pub isolation: Vec<f64>,
    pub subspace: Vec<f64>,
    pub boundary: Vec<f64>,
}

impl RawScores {
    pub fn get(&self, kind: DetectorKind) -> &[f64] {
        match kind {
            DetectorKind::Isolation => &self.isolation,
            DetectorKind::Subspace => &self.subspace,
            DetectorKind::Boundary => &self.boundary,
        }
    }

    pub fn len(&self) -> usize {
        self.isolation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.isolation.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DetectorKind, &[f64])> + '_ {
        DetectorKind::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }
}

/// Weighted combination of raw detector scores on a 0-100 scale
#[derive(Debug, Clone)]
pub struct Ensembler {
    weights: EnsembleWeights,
}

impl Ensembler {
    /// Weights must be non-negative and sum to one
    pub fn new(weights: EnsembleWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub const fn weight(&self, kind: DetectorKind) -> f64 {
        match kind {
            DetectorKind::Isolation => self.weights.isolation,
            DetectorKind::Subspace => self.weights.subspace,
            DetectorKind::Boundary => self.weights.boundary,
        }
    }

    /// Weighted sum per record, before rescaling
    ///
    /// Detectors with zero weight are left out, so an infinite raw score
    /// from a muted detector cannot turn into NaN.
    pub fn combine_raw(&self, scores: &RawScores) -> Result<Vec<f64>> {
        let expected = scores.len();
        for (_, values) in scores.iter() {
            if values.len() != expected {
                return Err(Error::ScoreLengthMismatch {
                    expected,
                    got: values.len(),
                });
            }
        }

        Ok((0..expected)
            .map(|i| {
                scores
                    .iter()
                    .filter(|(kind, _)| self.weight(*kind) > 0.0)
                    .map(|(kind, values)| self.weight(kind) * values[i])
                    .sum()
            })
            .collect())
    }

    /// Composite scores in [0, 100]
    pub fn combine(&self, scores: &RawScores) -> Result<Vec<f64>> {
        Ok(normalize_scores(&self.combine_raw(scores)?))
    }
}

impl Default for Ensembler {
    fn default() -> Self {
        Self {
            weights: EnsembleWeights::default(),
        }
    }
}
