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

//! Numeric feature matrices and the transforms applied to them.

pub mod prepare;
pub mod ranking;
pub mod scaler;

pub use prepare::{DataPreparer, PreparedFeatures};
pub use ranking::FeatureRanker;
pub use scaler::FeatureScaler;

use crate::error::{Error, Result};

/// Dense row-major matrix of feature values with named columns
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    rows: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Build from named columns and a flat row-major buffer
    pub fn new(names: Vec<String>, rows: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * names.len() {
            return Err(Error::RaggedRow {
                row: data.len() / names.len().max(1),
                expected: rows * names.len(),
                got: data.len(),
            });
        }
        Ok(Self { names, rows, data })
    }

    /// Build from per-row vectors
    pub fn from_rows(names: Vec<String>, rows: &[Vec<f64>]) -> Result<Self> {
        let width = names.len();
        if let Some((row, cells)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(Error::RaggedRow {
                row,
                expected: width,
                got: cells.len(),
            });
        }
        let data = rows.iter().flatten().copied().collect();
        Ok(Self {
            names,
            rows: rows.len(),
            data,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub const fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.n_cols();
        &self.data[index * width..(index + 1) * width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n_cols() + col]
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows().map(move |row| row[col])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Population mean and variance of one column
    pub fn column_moments(&self, col: usize) -> (f64, f64) {
        if self.rows == 0 {
            return (0.0, 0.0);
        }
        let n = self.rows as f64;
        let mean = self.column(col).sum::<f64>() / n;
        let variance = self.column(col).map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, variance)
    }

    /// Same names, every value passed through `f(col, value)`
    pub(crate) fn map_columns(&self, f: impl Fn(usize, f64) -> f64) -> Self {
        let width = self.n_cols().max(1);
        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, &v)| f(i % width, v))
            .collect();
        Self {
            names: self.names.clone(),
            rows: self.rows,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_row_major_layout() {
        let m = FeatureMatrix::from_rows(names(&["a", "b"]), &[vec![1.0, 2.0], vec![3.0, 4.0]])
            .expect("rectangular");
        assert_eq!(m.n_rows(), 2);
        assert_eq!(m.row(1), &[3.0, 4.0]);
        assert!((m.get(0, 1) - 2.0).abs() < f64::EPSILON);
        assert_eq!(m.column(0).collect::<Vec<_>>(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_column_moments() {
        let m = FeatureMatrix::from_rows(
            names(&["x"]),
            &[vec![2.0], vec![4.0], vec![4.0], vec![4.0], vec![5.0], vec![5.0], vec![7.0], vec![9.0]],
        )
        .expect("rectangular");
        let (mean, var) = m.column_moments(0);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((var - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_buffer_length_checked() {
        assert!(FeatureMatrix::new(names(&["a", "b"]), 2, vec![1.0, 2.0, 3.0]).is_err());
    }
}
