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

//! End-to-end scoring run.
//!
//! split -> prepare -> scale -> fit detectors -> score -> combine -> rank
//! -> assemble. Every run fits its own models; nothing is cached between
//! runs and a failing stage fails the run without partial output.

use crate::anomaly::scorer::{DetectorKind, Ensembler, RawScores};
use crate::anomaly::{DetectorBank, DetectorSummary};
use crate::config::PipelineConfig;
use crate::dataset::io::read_dataset;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::features::ranking::RankedFeature;
use crate::features::{DataPreparer, FeatureRanker, FeatureScaler};
use crate::output::{OutputAssembler, OutputTable};
use crate::split::TemporalSplitter;
use std::path::Path;
use std::time::Instant;

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub table: OutputTable,
    /// Feature columns the detectors were fitted on
    pub feature_names: Vec<String>,
    pub ranked_features: Vec<RankedFeature>,
    pub train_size: usize,
    pub test_size: usize,
    /// Cells filled by imputation in the training and test partitions
    pub imputed: (usize, usize),
    pub raw_scores: RawScores,
    /// Composite score per test record, aligned with `table.rows`
    pub composite: Vec<f64>,
    pub detectors: Vec<DetectorSummary>,
}

impl PipelineReport {
    /// Test rows with a composite score above `threshold`, highest first
    pub fn flagged(&self, threshold: f64) -> Vec<(usize, f64)> {
        let mut flagged: Vec<(usize, f64)> = self
            .composite
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, score)| *score > threshold)
            .collect();
        flagged.sort_by(|a, b| b.1.total_cmp(&a.1));
        flagged
    }

    /// Test rows each detector places beyond its own fitted threshold
    pub fn detector_outliers(&self) -> Vec<(DetectorKind, usize)> {
        self.detectors
            .iter()
            .filter_map(|summary| {
                let threshold = summary.threshold?;
                let count = self
                    .raw_scores
                    .get(summary.kind)
                    .iter()
                    .filter(|s| **s > threshold)
                    .count();
                Some((summary.kind, count))
            })
            .collect()
    }
}

pub struct AnomalyPipeline {
    config: PipelineConfig,
}

impl AnomalyPipeline {
    /// Rejects invalid configuration before any stage runs
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, dataset: &Dataset) -> Result<PipelineReport> {
        profiling::scope!("AnomalyPipeline::run");
        let start = Instant::now();
        let config = &self.config;

        let split =
            TemporalSplitter::new(&config.time_column, config.split_fraction).split(dataset)?;

        let preparer = DataPreparer::new(&config.time_column);
        let train = preparer.prepare(&split.train)?;
        let test = preparer.prepare_aligned(&split.test, &train, config.imputation)?;
        tracing::info!(
            "Prepared {} features ({} training and {} test cells imputed)",
            train.feature_names().len(),
            train.imputed,
            test.imputed
        );

        let mut scaler = FeatureScaler::new();
        let train_scaled = scaler.fit_transform(&train.matrix)?;
        let test_scaled = scaler.transform(&test.matrix)?;

        let bank = DetectorBank::fit(&train_scaled, config)?;
        let raw_scores = bank.score(&test_scaled)?;

        let composite = Ensembler::new(config.weights)?.combine(&raw_scores)?;

        let ranked_features = FeatureRanker::new(config.top_features).rank(&train_scaled);
        let ranked_names: Vec<String> = ranked_features.iter().map(|f| f.name.clone()).collect();
        tracing::info!("Top variance features: {}", ranked_names.join(", "));

        let table = OutputAssembler::new(&ranked_names).assemble(&split.test, &composite, &raw_scores)?;

        tracing::info!(
            "Scored {} test records in {:?}",
            table.len(),
            start.elapsed()
        );

        Ok(PipelineReport {
            table,
            feature_names: train.feature_names().to_vec(),
            ranked_features,
            train_size: split.train.len(),
            test_size: split.test.len(),
            imputed: (train.imputed, test.imputed),
            raw_scores,
            composite,
            detectors: bank.summaries(),
        })
    }

    /// Read `input` as CSV, run, and write the table to `output`
    pub fn run_csv(&self, input: &Path, output: &Path) -> Result<PipelineReport> {
        let dataset = read_dataset(input)?;
        let report = self.run(&dataset)?;
        report.table.write_to_path(output)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnsembleWeights;
    use crate::dataset::io::write_csv;
    use crate::dataset::Value;
    use crate::error::Error;
    use chrono::{Duration, TimeZone, Utc};
    use std::fs::File;
    use tempfile::TempDir;

    const OUTLIER_ROW: usize = 85;

    fn timestamp(i: usize) -> Value {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().expect("valid date");
        let ts = base + Duration::minutes(i64::try_from(i).expect("small"));
        Value::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string())
    }

    /// 100 records, one minute apart, with one extreme value in the test range
    fn synthetic() -> Dataset {
        with_outlier(40.0)
    }

    fn with_outlier(value: f64) -> Dataset {
        let rows = (0..100)
            .map(|i| {
                let f1 = if i == OUTLIER_ROW {
                    value
                } else {
                    ((i * 7) % 13) as f64 / 13.0
                };
                let f2 = ((i * 5) % 11) as f64 / 11.0;
                vec![timestamp(i), Value::Number(f1), Value::Number(f2)]
            })
            .collect();
        Dataset::new(
            vec!["Time".to_string(), "f1".to_string(), "f2".to_string()],
            rows,
        )
        .expect("valid")
    }

    fn small_forest() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.isolation.trees = 100;
        config
    }

    #[test]
    fn test_outlier_ranks_at_top() {
        let report = AnomalyPipeline::new(PipelineConfig::default())
            .expect("valid config")
            .run(&synthetic())
            .expect("run");

        assert_eq!(report.train_size, 70);
        assert_eq!(report.test_size, 30);

        let outlier = OUTLIER_ROW - report.train_size;
        let outlier_score = report.composite[outlier];
        let beaten = report
            .composite
            .iter()
            .enumerate()
            .filter(|&(i, &s)| i != outlier && s < outlier_score)
            .count();
        assert!(
            beaten as f64 >= 0.95 * (report.test_size - 1) as f64,
            "outlier beat only {beaten} records"
        );
        assert_eq!(report.flagged(80.0).first().map(|(i, _)| *i), Some(outlier));
    }

    #[test]
    fn test_overflowing_outlier_still_ranks_at_top() {
        let report = AnomalyPipeline::new(small_forest())
            .expect("valid config")
            .run(&with_outlier(1e200))
            .expect("run");

        let outlier = OUTLIER_ROW - report.train_size;
        // squared reconstruction error overflows
        assert!(report.raw_scores.subspace[outlier].is_infinite());
        assert!((report.composite[outlier] - 100.0).abs() < f64::EPSILON);
        assert!(report.composite.iter().all(|s| s.is_finite()));

        let beaten = report
            .composite
            .iter()
            .enumerate()
            .filter(|&(i, &s)| i != outlier && s < report.composite[outlier])
            .count();
        assert!(beaten as f64 >= 0.95 * (report.test_size - 1) as f64);
    }

    #[test]
    fn test_rerun_is_bit_identical() {
        let pipeline = AnomalyPipeline::new(small_forest()).expect("valid config");
        let a = pipeline.run(&synthetic()).expect("run");
        let b = pipeline.run(&synthetic()).expect("run");

        assert_eq!(a.composite, b.composite);
        assert_eq!(a.table, b.table);
    }

    #[test]
    fn test_composite_bounds() {
        let report = AnomalyPipeline::new(small_forest())
            .expect("valid config")
            .run(&synthetic())
            .expect("run");

        assert!(report.composite.iter().all(|s| (0.0..=100.0).contains(s)));
        let max = report.composite.iter().copied().fold(f64::MIN, f64::max);
        let min = report.composite.iter().copied().fold(f64::MAX, f64::min);
        assert!((max - 100.0).abs() < 1e-9);
        assert!(min.abs() < 1e-9);
    }

    #[test]
    fn test_constant_feature_is_harmless() {
        let base = synthetic();
        let mut columns = base.columns().to_vec();
        columns.push("flat".to_string());
        let rows = base
            .rows()
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.push(Value::Number(3.0));
                row
            })
            .collect();
        let dataset = Dataset::new(columns, rows).expect("valid");

        let report = AnomalyPipeline::new(small_forest())
            .expect("valid config")
            .run(&dataset)
            .expect("run");

        assert_eq!(report.feature_names, ["f1", "f2", "flat"]);
        for (_, scores) in report.raw_scores.iter() {
            assert!(scores.iter().all(|s| s.is_finite()));
        }
        assert!(report.composite.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_invalid_weights_fail_before_running() {
        let config = PipelineConfig {
            weights: EnsembleWeights {
                isolation: 0.5,
                subspace: 0.5,
                boundary: 0.5,
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            AnomalyPipeline::new(config),
            Err(Error::InvalidWeights { .. })
        ));
    }

    #[test]
    fn test_missing_time_column() {
        let config = PipelineConfig {
            time_column: "timestamp".to_string(),
            ..small_forest()
        };
        let result = AnomalyPipeline::new(config)
            .expect("valid config")
            .run(&synthetic());
        assert!(matches!(result, Err(Error::MissingColumn(name)) if name == "timestamp"));
    }

    #[test]
    fn test_output_layout_and_order() {
        let report = AnomalyPipeline::new(small_forest())
            .expect("valid config")
            .run(&synthetic())
            .expect("run");

        assert_eq!(
            report.table.columns,
            [
                "Time",
                "f1",
                "f2",
                "composite_score",
                "isolation_score",
                "subspace_score",
                "boundary_score",
                "f1_copy",
                "f2_copy"
            ]
        );
        // test partition keeps temporal order
        assert_eq!(report.table.rows[0][0], timestamp(70));
        assert_eq!(report.table.rows[29][0], timestamp(99));
        assert_eq!(report.detector_outliers().len(), 2);
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = TempDir::new().expect("temp dir");
        let input = dir.path().join("metrics.csv");
        let output = dir.path().join("scored.csv");

        let dataset = synthetic();
        let file = File::create(&input).expect("create input");
        write_csv(dataset.columns(), dataset.rows(), file).expect("write input");

        let report = AnomalyPipeline::new(small_forest())
            .expect("valid config")
            .run_csv(&input, &output)
            .expect("run");

        let scored = read_dataset(&output).expect("read output");
        assert_eq!(scored.len(), report.test_size);
        assert_eq!(scored.columns(), report.table.columns.as_slice());
        assert_eq!(scored.value(0, "Time"), Some(&timestamp(70)));
    }
}
