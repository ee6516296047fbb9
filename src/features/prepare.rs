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

//! Numeric column selection and mean imputation.

use super::FeatureMatrix;
use crate::config::ImputationStrategy;
use crate::dataset::{Dataset, Value};
use crate::error::{Error, Result};

/// A partition turned into features, plus the means used to fill its gaps
#[derive(Debug, Clone)]
pub struct PreparedFeatures {
    pub matrix: FeatureMatrix,
    /// Fill value per feature, in matrix column order
    pub fill_values: Vec<f64>,
    /// Number of cells that were imputed
    pub imputed: usize,
}

impl PreparedFeatures {
    pub fn feature_names(&self) -> &[String] {
        self.matrix.names()
    }
}

/// Turns dataset partitions into feature matrices
pub struct DataPreparer {
    time_column: String,
}

impl DataPreparer {
    pub fn new(time_column: impl Into<String>) -> Self {
        Self {
            time_column: time_column.into(),
        }
    }

    /// Prepare the training partition
    ///
    /// Keeps columns whose present cells are all numbers (at least one
    /// present), in dataset order, and fills gaps with the column mean of
    /// this partition.
    pub fn prepare(&self, partition: &Dataset) -> Result<PreparedFeatures> {
        profiling::scope!("DataPreparer::prepare");

        let numeric: Vec<usize> = partition
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| **name != self.time_column)
            .filter(|(col, _)| is_numeric_column(partition, *col))
            .map(|(col, _)| col)
            .collect();

        if numeric.is_empty() {
            return Err(Error::EmptyFeatureSet);
        }

        let dropped = partition.columns().len() - numeric.len();
        tracing::debug!(
            "Selected {} numeric columns, skipped {dropped} (time column included)",
            numeric.len()
        );

        let columns: Vec<Vec<Option<f64>>> = numeric
            .iter()
            .map(|&col| partition.column_values(col).map(Value::as_number).collect())
            .collect();
        let fill_values: Vec<f64> = columns
            .iter()
            .map(|cells| observed_mean(cells).unwrap_or(0.0))
            .collect();

        let names = numeric
            .iter()
            .map(|&col| partition.columns()[col].clone())
            .collect();
        assemble(names, partition.len(), &columns, fill_values)
    }

    /// Prepare a later partition against the training features
    ///
    /// Training column order is kept and other columns are dropped. Within a
    /// training feature, non-numeric cells count as missing. Gaps are filled
    /// according to `strategy`; a feature with no observed value in this
    /// partition always falls back to the training mean.
    pub fn prepare_aligned(
        &self,
        partition: &Dataset,
        training: &PreparedFeatures,
        strategy: ImputationStrategy,
    ) -> Result<PreparedFeatures> {
        profiling::scope!("DataPreparer::prepare_aligned");

        let mut columns = Vec::with_capacity(training.feature_names().len());
        let mut fill_values = Vec::with_capacity(training.feature_names().len());

        for (name, &training_mean) in training.feature_names().iter().zip(&training.fill_values) {
            let cells: Vec<Option<f64>> = if let Some(col) = partition.column_index(name) {
                let mut non_numeric = 0usize;
                let cells = partition
                    .column_values(col)
                    .map(|value| {
                        if matches!(value, Value::Text(_)) {
                            non_numeric += 1;
                        }
                        value.as_number()
                    })
                    .collect();
                if non_numeric > 0 {
                    tracing::warn!(
                        "Column '{name}': {non_numeric} non-numeric cells treated as missing"
                    );
                }
                cells
            } else {
                tracing::warn!("Column '{name}' missing from partition, filling with training mean");
                vec![None; partition.len()]
            };

            let fill = match strategy {
                ImputationStrategy::PerPartition => observed_mean(&cells).unwrap_or(training_mean),
                ImputationStrategy::Training => training_mean,
            };
            columns.push(cells);
            fill_values.push(fill);
        }

        assemble(
            training.feature_names().to_vec(),
            partition.len(),
            &columns,
            fill_values,
        )
    }
}

fn is_numeric_column(partition: &Dataset, col: usize) -> bool {
    let mut seen_number = false;
    for value in partition.column_values(col) {
        match value {
            Value::Number(_) => seen_number = true,
            Value::Missing => {}
            Value::Text(_) => return false,
        }
    }
    seen_number
}

fn observed_mean(cells: &[Option<f64>]) -> Option<f64> {
    let (sum, count) = cells
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn assemble(
    names: Vec<String>,
    rows: usize,
    columns: &[Vec<Option<f64>>],
    fill_values: Vec<f64>,
) -> Result<PreparedFeatures> {
    let width = columns.len();
    let mut data = vec![0.0; rows * width];
    let mut imputed = 0;

    for (col, cells) in columns.iter().enumerate() {
        for (row, cell) in cells.iter().enumerate() {
            data[row * width + col] = cell.unwrap_or_else(|| {
                imputed += 1;
                fill_values[col]
            });
        }
    }

    Ok(PreparedFeatures {
        matrix: FeatureMatrix::new(names, rows, data)?,
        fill_values,
        imputed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(columns: &[&str], rows: Vec<Vec<Value>>) -> Dataset {
        Dataset::new(columns.iter().map(ToString::to_string).collect(), rows).expect("valid")
    }

    #[test]
    fn test_selects_numeric_columns_only() {
        let ds = dataset(
            &["Time", "cpu", "host", "mem"],
            vec![
                vec![Value::Number(1.0), Value::Number(0.5), Value::from("a"), Value::Number(10.0)],
                vec![Value::Number(2.0), Value::Number(0.7), Value::from("b"), Value::Missing],
            ],
        );
        let prepared = DataPreparer::new("Time").prepare(&ds).expect("features");

        assert_eq!(prepared.feature_names(), ["cpu", "mem"]);
        assert_eq!(prepared.matrix.row(1), &[0.7, 10.0]);
        assert_eq!(prepared.imputed, 1);
    }

    #[test]
    fn test_mixed_column_dropped() {
        let ds = dataset(
            &["Time", "code"],
            vec![
                vec![Value::Number(1.0), Value::Number(200.0)],
                vec![Value::Number(2.0), Value::from("timeout")],
            ],
        );
        let err = DataPreparer::new("Time").prepare(&ds).expect_err("no features left");
        assert!(matches!(err, Error::EmptyFeatureSet));
    }

    #[test]
    fn test_all_missing_column_dropped() {
        let ds = dataset(
            &["Time", "x", "y"],
            vec![
                vec![Value::Number(1.0), Value::Missing, Value::Number(1.0)],
                vec![Value::Number(2.0), Value::Missing, Value::Number(2.0)],
            ],
        );
        let prepared = DataPreparer::new("Time").prepare(&ds).expect("features");
        assert_eq!(prepared.feature_names(), ["y"]);
    }

    fn train_and_test() -> (Dataset, Dataset) {
        let train = dataset(
            &["Time", "x"],
            vec![
                vec![Value::Number(1.0), Value::Number(1.0)],
                vec![Value::Number(2.0), Value::Number(3.0)],
            ],
        );
        let test = dataset(
            &["Time", "x", "extra"],
            vec![
                vec![Value::Number(3.0), Value::Number(10.0), Value::Number(5.0)],
                vec![Value::Number(4.0), Value::Missing, Value::Number(6.0)],
                vec![Value::Number(5.0), Value::Number(20.0), Value::Number(7.0)],
            ],
        );
        (train, test)
    }

    #[test]
    fn test_per_partition_imputation_uses_test_mean() {
        let (train, test) = train_and_test();
        let preparer = DataPreparer::new("Time");
        let training = preparer.prepare(&train).expect("train");
        let prepared = preparer
            .prepare_aligned(&test, &training, ImputationStrategy::PerPartition)
            .expect("test");

        // Gap filled with the test mean (15), not the training mean (2)
        assert_eq!(prepared.feature_names(), ["x"]);
        assert!((prepared.matrix.get(1, 0) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_training_imputation_uses_train_mean() {
        let (train, test) = train_and_test();
        let preparer = DataPreparer::new("Time");
        let training = preparer.prepare(&train).expect("train");
        let prepared = preparer
            .prepare_aligned(&test, &training, ImputationStrategy::Training)
            .expect("test");

        assert!((prepared.matrix.get(1, 0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_unobserved_feature_falls_back_to_training_mean() {
        let (train, _) = train_and_test();
        let test = dataset(
            &["Time", "x"],
            vec![
                vec![Value::Number(3.0), Value::Missing],
                vec![Value::Number(4.0), Value::from("n/a-ish")],
            ],
        );
        let preparer = DataPreparer::new("Time");
        let training = preparer.prepare(&train).expect("train");
        let prepared = preparer
            .prepare_aligned(&test, &training, ImputationStrategy::PerPartition)
            .expect("test");

        assert_eq!(prepared.matrix.column(0).collect::<Vec<_>>(), vec![2.0, 2.0]);
        assert_eq!(prepared.imputed, 2);
    }
}
