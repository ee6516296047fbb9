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

//! Error taxonomy of a scoring run.
//!
//! Every variant is fatal to the run that produced it. Nothing inside the
//! pipeline retries or substitutes default scores.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no numeric feature columns left after preparation")]
    EmptyFeatureSet,

    #[error("temporal split left an empty partition (train: {train}, test: {test})")]
    InsufficientData { train: usize, test: usize },

    #[error("feature scaler used before fit()")]
    ScalerNotFitted,

    #[error("{detector} detector could not be fitted: {reason}")]
    DetectorFit {
        detector: &'static str,
        reason: String,
    },

    #[error("invalid ensemble weights: {reason}")]
    InvalidWeights { reason: String },

    #[error("column '{0}' not found in dataset")]
    MissingColumn(String),

    #[error("row {row}: cannot parse timestamp '{value}'")]
    InvalidTimestamp { row: usize, value: String },

    #[error("feature columns do not match the fitted scaler (expected {expected:?}, got {got:?})")]
    FeatureMismatch {
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("row {row} has {got} cells, header has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("{got} scores for {expected} test records")]
    ScoreLengthMismatch { expected: usize, got: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
