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

//! Unsupervised anomaly scoring for time-stamped tabular data.
//!
//! A dataset is split in time, a training prefix fits three detectors
//! (isolation forest, principal subspace, one-class boundary) and every
//! record of the test suffix gets a composite score in `[0, 100]`.

pub mod anomaly;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod output;
pub mod pipeline;
pub mod split;

pub use config::PipelineConfig;
pub use dataset::{Dataset, Value};
pub use error::{Error, Result};
pub use output::OutputTable;
pub use pipeline::{AnomalyPipeline, PipelineReport};
