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

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Allowed slack when checking that ensemble weights sum to one
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// How gaps in the test partition are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationStrategy {
    /// Each partition is filled with its own column means
    #[default]
    PerPartition,
    /// Test gaps are filled with training column means
    Training,
}

/// Settings of the isolation-score detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Number of trees in the ensemble
    pub trees: usize,
    /// Rows drawn per tree; `None` means `min(256, rows)`
    pub max_samples: Option<usize>,
    /// Expected share of anomalies, used for the reported threshold only
    pub contamination: f64,
    /// Master seed for tree growth
    pub seed: u64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            trees: 200,
            max_samples: None,
            contamination: 0.05,
            seed: 42,
        }
    }
}

/// Settings of the subspace-reconstruction detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubspaceConfig {
    /// Share of training variance the kept components must explain
    pub variance_retained: f64,
}

impl Default for SubspaceConfig {
    fn default() -> Self {
        Self {
            variance_retained: 0.95,
        }
    }
}

/// Kernel family of the boundary detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kernel {
    Rbf,
    Linear,
    Poly { degree: i32, coef0: f64 },
    Sigmoid { coef0: f64 },
}

impl Default for Kernel {
    fn default() -> Self {
        Self::Rbf
    }
}

/// Kernel coefficient
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gamma {
    /// `1 / (features * variance of all training values)`
    #[default]
    Scale,
    /// `1 / features`
    Auto,
    Value(f64),
}

/// Settings of the boundary-density detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub kernel: Kernel,
    pub gamma: Gamma,
    /// Expected share of anomalies (the nu parameter)
    pub nu: f64,
    /// Stopping tolerance of the dual solver
    pub tolerance: f64,
    /// Iteration cap; `None` means `max(10_000_000, 100 * rows)`
    pub max_iterations: Option<usize>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            kernel: Kernel::Rbf,
            gamma: Gamma::Scale,
            nu: 0.05,
            tolerance: 1e-3,
            max_iterations: None,
        }
    }
}

/// Contribution of each detector to the composite score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleWeights {
    pub isolation: f64,
    pub subspace: f64,
    pub boundary: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            isolation: 0.5,
            subspace: 0.3,
            boundary: 0.2,
        }
    }
}

impl EnsembleWeights {
    /// Weights must be finite, non-negative and sum to one
    pub fn validate(&self) -> Result<()> {
        let weights = [self.isolation, self.subspace, self.boundary];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidWeights {
                reason: format!("weights must be finite and non-negative, got {weights:?}"),
            });
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::InvalidWeights {
                reason: format!("weights must sum to 1.0, got {sum}"),
            });
        }
        Ok(())
    }
}

/// Everything one scoring run needs to know
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Column holding the record timestamps
    pub time_column: String,
    /// Share of records (oldest first) used for training
    pub split_fraction: f64,
    pub imputation: ImputationStrategy,
    /// Number of ranked features copied into the output
    pub top_features: usize,
    pub weights: EnsembleWeights,
    pub isolation: IsolationConfig,
    pub subspace: SubspaceConfig,
    pub boundary: BoundaryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            time_column: "Time".to_string(),
            split_fraction: 0.7,
            imputation: ImputationStrategy::PerPartition,
            top_features: 7,
            weights: EnsembleWeights::default(),
            isolation: IsolationConfig::default(),
            subspace: SubspaceConfig::default(),
            boundary: BoundaryConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Get the path to the user config file
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("crabscore").join("config.json"))
    }

    /// Load configuration
    ///
    /// An explicit path must exist and parse. Without one, the user config
    /// file is used when present and readable, defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            tracing::info!("Loaded config from {}", path.display());
            return Ok(config);
        }

        if let Some(path) = Self::config_path() {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => {
                        tracing::info!("Loaded user config from {}", path.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable config {}: {e}", path.display());
                    }
                }
            } else {
                tracing::debug!("No user config found, using defaults");
            }
        }

        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Reject settings no stage could run with
    pub fn validate(&self) -> Result<()> {
        if self.time_column.is_empty() {
            return Err(Error::InvalidConfig("time column name is empty".into()));
        }
        if !(self.split_fraction > 0.0 && self.split_fraction < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "split fraction must be in (0, 1), got {}",
                self.split_fraction
            )));
        }
        if self.isolation.trees == 0 {
            return Err(Error::InvalidConfig("isolation tree count must be positive".into()));
        }
        if self.isolation.max_samples == Some(0) {
            return Err(Error::InvalidConfig("isolation max_samples must be positive".into()));
        }
        if !(self.isolation.contamination > 0.0 && self.isolation.contamination <= 0.5) {
            return Err(Error::InvalidConfig(format!(
                "isolation contamination must be in (0, 0.5], got {}",
                self.isolation.contamination
            )));
        }
        if !(self.subspace.variance_retained > 0.0 && self.subspace.variance_retained <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "retained variance must be in (0, 1], got {}",
                self.subspace.variance_retained
            )));
        }
        if !(self.boundary.nu > 0.0 && self.boundary.nu <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "boundary nu must be in (0, 1], got {}",
                self.boundary.nu
            )));
        }
        if !(self.boundary.tolerance > 0.0) {
            return Err(Error::InvalidConfig("boundary tolerance must be positive".into()));
        }
        if let Gamma::Value(gamma) = self.boundary.gamma {
            if !(gamma.is_finite() && gamma > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "kernel gamma must be positive, got {gamma}"
                )));
            }
        }
        self.weights.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.time_column, "Time");
        assert_eq!(config.isolation.trees, 200);
        assert_eq!(config.top_features, 7);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = EnsembleWeights {
            isolation: 0.5,
            subspace: 0.5,
            boundary: 0.5,
        };
        assert!(matches!(weights.validate(), Err(Error::InvalidWeights { .. })));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = EnsembleWeights {
            isolation: 1.2,
            subspace: -0.2,
            boundary: 0.0,
        };
        assert!(matches!(weights.validate(), Err(Error::InvalidWeights { .. })));
    }

    #[test]
    fn test_split_fraction_bounds() {
        let config = PipelineConfig {
            split_fraction: 1.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "time_column": "timestamp",
            "weights": { "isolation": 0.6, "subspace": 0.2, "boundary": 0.2 },
            "boundary": { "kernel": { "type": "poly", "degree": 3, "coef0": 1.0 } }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).expect("valid json");

        assert_eq!(config.time_column, "timestamp");
        assert!((config.weights.isolation - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.boundary.kernel, Kernel::Poly { degree: 3, coef0: 1.0 });
        assert!((config.boundary.nu - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.isolation.seed, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_explicit() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.json");
        let config = PipelineConfig {
            imputation: ImputationStrategy::Training,
            ..PipelineConfig::default()
        };
        config.save(&path).expect("save");

        let loaded = PipelineConfig::load(Some(&path)).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("absent.json");
        assert!(PipelineConfig::load(Some(&missing)).is_err());
    }
}
