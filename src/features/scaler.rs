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

//! Standardization fitted on training data.

use super::FeatureMatrix;
use crate::error::{Error, Result};

/// Fitted per-feature statistics
#[derive(Debug, Clone, PartialEq)]
pub struct ScalerState {
    pub names: Vec<String>,
    pub means: Vec<f64>,
    /// Divisors; zero-variance features carry 1.0
    pub stds: Vec<f64>,
}

/// Z-score scaler: `(value - mean) / std`
#[derive(Debug, Clone, Default)]
pub struct FeatureScaler {
    state: Option<ScalerState>,
}

impl FeatureScaler {
    pub const fn new() -> Self {
        Self { state: None }
    }

    /// Compute means and population standard deviations
    pub fn fit(&mut self, training: &FeatureMatrix) -> &ScalerState {
        profiling::scope!("FeatureScaler::fit");

        let (means, stds): (Vec<f64>, Vec<f64>) = (0..training.n_cols())
            .map(|col| {
                let (mean, variance) = training.column_moments(col);
                (mean, effective_std(mean, variance))
            })
            .unzip();

        let constant = stds.iter().filter(|s| **s == 1.0).count();
        tracing::debug!(
            "Scaler fitted on {} rows, {} features ({constant} with unit divisor)",
            training.n_rows(),
            means.len()
        );

        self.state.insert(ScalerState {
            names: training.names().to_vec(),
            means,
            stds,
        })
    }

    pub const fn state(&self) -> Option<&ScalerState> {
        self.state.as_ref()
    }

    /// Scale a matrix with the fitted statistics
    pub fn transform(&self, matrix: &FeatureMatrix) -> Result<FeatureMatrix> {
        let state = self.state.as_ref().ok_or(Error::ScalerNotFitted)?;
        if matrix.names() != state.names.as_slice() {
            return Err(Error::FeatureMismatch {
                expected: state.names.clone(),
                got: matrix.names().to_vec(),
            });
        }
        Ok(matrix.map_columns(|col, v| (v - state.means[col]) / state.stds[col]))
    }

    pub fn fit_transform(&mut self, training: &FeatureMatrix) -> Result<FeatureMatrix> {
        self.fit(training);
        self.transform(training)
    }
}

/// Standard deviation used as divisor
///
/// Variance at rounding-noise level relative to the mean counts as zero,
/// and zero maps to 1.0 so constant features scale to zero.
fn effective_std(mean: f64, variance: f64) -> f64 {
    let std = variance.sqrt();
    let noise_floor = 10.0 * f64::EPSILON * mean.abs().max(1.0);
    if !std.is_finite() || std <= noise_floor {
        1.0
    } else {
        std
    }
}
