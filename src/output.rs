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

//! Scored output table.
//!
//! One row per test record in temporal order: the original cells, then the
//! composite and per-detector scores, then a copy of every ranked feature's
//! original value.

use crate::anomaly::scorer::{DetectorKind, RawScores};
use crate::dataset::io::write_table;
use crate::dataset::{Dataset, Value};
use crate::error::{Error, Result};
use std::path::Path;

pub const COMPOSITE_COLUMN: &str = "composite_score";

/// Suffix of the ranked-feature copy columns
pub const COPY_SUFFIX: &str = "_copy";

#[derive(Debug, Clone, PartialEq)]
pub struct OutputTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl OutputTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, `None` if the column does not exist
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let col = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[col]).collect())
    }

    /// CSV, or JSON when the path ends in `.json`
    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        profiling::scope!("OutputTable::write_to_path");
        write_table(&self.columns, &self.rows, path)
    }
}

pub struct OutputAssembler<'a> {
    ranked_features: &'a [String],
}

impl<'a> OutputAssembler<'a> {
    pub const fn new(ranked_features: &'a [String]) -> Self {
        Self { ranked_features }
    }

    /// Join test records with their scores
    ///
    /// `composite` and every score vector in `raw` must have one entry per
    /// test record. Copy columns take the value from the unscaled test
    /// record before imputation; a ranked feature absent from the test
    /// header yields empty cells.
    pub fn assemble(&self, test: &Dataset, composite: &[f64], raw: &RawScores) -> Result<OutputTable> {
        profiling::scope!("OutputAssembler::assemble");

        let lengths = std::iter::once(composite.len()).chain(raw.iter().map(|(_, s)| s.len()));
        for got in lengths {
            if got != test.len() {
                return Err(Error::ScoreLengthMismatch {
                    expected: test.len(),
                    got,
                });
            }
        }

        let appended = std::iter::once(COMPOSITE_COLUMN.to_string())
            .chain(DetectorKind::ALL.iter().map(|k| k.score_column().to_string()))
            .chain(self.ranked_features.iter().map(|f| format!("{f}{COPY_SUFFIX}")));
        let mut columns = test.columns().to_vec();
        for name in appended {
            let unique = unique_column(&columns, name);
            columns.push(unique);
        }

        let copy_sources: Vec<Option<usize>> = self
            .ranked_features
            .iter()
            .map(|f| test.column_index(f))
            .collect();

        let rows = test
            .rows()
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let mut row = Vec::with_capacity(columns.len());
                row.extend(record.iter().cloned());
                row.push(Value::Number(composite[i]));
                row.extend(DetectorKind::ALL.iter().map(|&k| Value::Number(raw.get(k)[i])));
                row.extend(
                    copy_sources
                        .iter()
                        .map(|src| src.map_or(Value::Missing, |col| record[col].clone())),
                );
                row
            })
            .collect();

        Ok(OutputTable { columns, rows })
    }
}

/// `name`, or `name_2`, `name_3`, ... if the header already has it
fn unique_column(columns: &[String], name: String) -> String {
    if !columns.contains(&name) {
        return name;
    }
    let renamed = (2..)
        .map(|n| format!("{name}_{n}"))
        .find(|candidate| !columns.contains(candidate))
        .unwrap_or_default();
    tracing::warn!("Input already has a '{name}' column, writing scores as '{renamed}'");
    renamed
}
