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

//! Time-ordered train/test partitioning.

use crate::dataset::timestamp::timestamp_of;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};

/// Training prefix and test suffix of a time-sorted dataset
#[derive(Debug, Clone)]
pub struct TemporalSplit {
    pub train: Dataset,
    pub test: Dataset,
    /// Parsed timestamps, aligned with `train` rows
    pub train_times: Vec<DateTime<Utc>>,
    /// Parsed timestamps, aligned with `test` rows
    pub test_times: Vec<DateTime<Utc>>,
}

pub struct TemporalSplitter {
    time_column: String,
    fraction: f64,
}

impl TemporalSplitter {
    pub fn new(time_column: impl Into<String>, fraction: f64) -> Self {
        Self {
            time_column: time_column.into(),
            fraction,
        }
    }

    /// Sort by timestamp (stable) and cut at `floor(n * fraction)`
    pub fn split(&self, dataset: &Dataset) -> Result<TemporalSplit> {
        profiling::scope!("TemporalSplitter::split");

        let col = dataset
            .column_index(&self.time_column)
            .ok_or_else(|| Error::MissingColumn(self.time_column.clone()))?;

        let mut keyed = dataset
            .column_values(col)
            .enumerate()
            .map(|(row, value)| {
                timestamp_of(value)
                    .map(|ts| (ts, row))
                    .ok_or_else(|| Error::InvalidTimestamp {
                        row,
                        value: value.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        // sort_by_key is stable, equal timestamps keep row order
        keyed.sort_by_key(|(ts, _)| *ts);

        let n = keyed.len();
        let k = (n as f64 * self.fraction).floor() as usize;
        if k == 0 || k >= n {
            return Err(Error::InsufficientData {
                train: k.min(n),
                test: n.saturating_sub(k),
            });
        }

        let gather = |range: &[(DateTime<Utc>, usize)]| -> (Vec<_>, Vec<_>) {
            range
                .iter()
                .map(|(ts, row)| (dataset.rows()[*row].clone(), *ts))
                .unzip()
        };
        let (train_rows, train_times) = gather(&keyed[..k]);
        let (test_rows, test_times) = gather(&keyed[k..]);

        tracing::info!("Train size: {} | Test size: {}", train_rows.len(), test_rows.len());

        Ok(TemporalSplit {
            train: dataset.with_rows(train_rows),
            test: dataset.with_rows(test_rows),
            train_times,
            test_times,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;

    fn dataset(times: &[&str]) -> Dataset {
        let rows = times
            .iter()
            .enumerate()
            .map(|(i, t)| vec![Value::parse(t), Value::Number(i as f64)])
            .collect();
        Dataset::new(vec!["Time".to_string(), "id".to_string()], rows).expect("valid")
    }

    #[test]
    fn test_sorted_and_partitioned() {
        let ds = dataset(&[
            "2024-01-01 00:03:00",
            "2024-01-01 00:01:00",
            "2024-01-01 00:04:00",
            "2024-01-01 00:00:00",
            "2024-01-01 00:02:00",
        ]);
        let split = TemporalSplitter::new("Time", 0.6).split(&ds).expect("split");

        assert_eq!(split.train.len() + split.test.len(), ds.len());
        assert_eq!(split.train.len(), 3);
        let ids: Vec<_> = split.train.column_values(1).chain(split.test.column_values(1)).cloned().collect();
        assert_eq!(
            ids,
            vec![3.0, 1.0, 4.0, 0.0, 2.0].into_iter().map(Value::Number).collect::<Vec<_>>()
        );
        let max_train = split.train_times.iter().max().expect("non-empty");
        let min_test = split.test_times.iter().min().expect("non-empty");
        assert!(max_train <= min_test);
    }

    #[test]
    fn test_ties_keep_row_order() {
        let ds = dataset(&["5", "1", "1", "1", "0"]);
        let split = TemporalSplitter::new("Time", 0.4).split(&ds).expect("split");
        let ids: Vec<_> = split.train.column_values(1).chain(split.test.column_values(1)).cloned().collect();
        assert_eq!(
            ids,
            vec![4.0, 1.0, 2.0, 3.0, 0.0].into_iter().map(Value::Number).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_floor_of_fraction() {
        let ds = dataset(&["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"]);
        let split = TemporalSplitter::new("Time", 0.75).split(&ds).expect("split");
        assert_eq!((split.train.len(), split.test.len()), (7, 3));
    }

    #[test]
    fn test_empty_partition_rejected() {
        let ds = dataset(&["1"]);
        let err = TemporalSplitter::new("Time", 0.7).split(&ds).expect_err("one row");
        assert!(matches!(err, Error::InsufficientData { train: 0, test: 1 }));
    }

    #[test]
    fn test_malformed_timestamp() {
        let ds = dataset(&["2024-01-01", "not a time", "2024-01-03"]);
        let err = TemporalSplitter::new("Time", 0.5).split(&ds).expect_err("bad row");
        assert!(matches!(err, Error::InvalidTimestamp { row: 1, .. }));
    }

    #[test]
    fn test_missing_time_column() {
        let ds = dataset(&["1", "2"]);
        let err = TemporalSplitter::new("timestamp", 0.5).split(&ds).expect_err("no column");
        assert!(matches!(err, Error::MissingColumn(name) if name == "timestamp"));
    }
}
