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

//! In-memory tabular dataset.
//!
//! A [`Dataset`] is an ordered header plus rows of typed cells. Every row has
//! exactly one cell per header column, so a row doubles as a mapping from
//! column name to value via [`Dataset::column_index`].

pub mod io;
pub mod timestamp;

use crate::error::{Error, Result};
use std::fmt;

/// Spellings that mean "no value" in exported tables
const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "nan", "null", "none"];

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

impl Value {
    /// Type a raw cell: missing markers, then finite numbers, then text
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if MISSING_MARKERS
            .iter()
            .any(|marker| trimmed.eq_ignore_ascii_case(marker))
        {
            return Self::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() => Self::Number(number),
            // inf/-inf are not usable as feature values
            Ok(_) => Self::Missing,
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }

    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) | Self::Missing => None,
        }
    }

    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Missing => Ok(()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Ordered records sharing one header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Build a dataset, rejecting rows whose width differs from the header
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != columns.len())
        {
            return Err(Error::RaggedRow {
                row,
                expected: columns.len(),
                got: cells.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Look up one cell by row and column name
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|cells| &cells[col])
    }

    /// Iterate one column top to bottom
    pub fn column_values(&self, col: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |cells| &cells[col])
    }

    /// A dataset with the same header and the given rows
    pub(crate) fn with_rows(&self, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse(" 3.5 "), Value::Number(3.5));
        assert_eq!(Value::parse("-2"), Value::Number(-2.0));
        assert_eq!(Value::parse(""), Value::Missing);
        assert_eq!(Value::parse("NaN"), Value::Missing);
        assert_eq!(Value::parse("N/A"), Value::Missing);
        assert_eq!(Value::parse("inf"), Value::Missing);
        assert_eq!(
            Value::parse("2024-01-01 10:00:00"),
            Value::Text("2024-01-01 10:00:00".to_string())
        );
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = Dataset::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![Value::Number(1.0), Value::Number(2.0)], vec![Value::Number(1.0)]],
        )
        .expect_err("second row is short");
        assert!(matches!(
            err,
            Error::RaggedRow {
                row: 1,
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_value_lookup_by_name() {
        let ds = Dataset::new(
            vec!["Time".to_string(), "cpu".to_string()],
            vec![vec![Value::from("t0"), Value::Number(0.25)]],
        )
        .expect("valid dataset");
        assert_eq!(ds.value(0, "cpu"), Some(&Value::Number(0.25)));
        assert_eq!(ds.value(0, "mem"), None);
        assert_eq!(ds.value(1, "cpu"), None);
    }
}
