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

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crabscore::config::ImputationStrategy;
use crabscore::{AnomalyPipeline, PipelineConfig, PipelineReport};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "ram-profiling")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// Flagged rows printed after a run
const SHOWN_ROWS: usize = 10;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Imputation {
    /// Fill test gaps with test-partition means
    PerPartition,
    /// Fill test gaps with training means
    Training,
}

impl From<Imputation> for ImputationStrategy {
    fn from(value: Imputation) -> Self {
        match value {
            Imputation::PerPartition => Self::PerPartition,
            Imputation::Training => Self::Training,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "crabscore")]
#[command(author = "CrabScore Team")]
#[command(version = VERSION)]
#[command(about = "Score time-stamped tabular data with an ensemble of anomaly detectors", long_about = None)]
struct Args {
    /// CSV file with a header row
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Where to write the scored test records (.json for JSON, CSV otherwise)
    #[arg(short, long, value_name = "OUTPUT", default_value = "output.csv")]
    output: PathBuf,

    /// Name of the timestamp column
    #[arg(long, value_name = "NAME")]
    time_column: Option<String>,

    /// Share of the records (oldest first) used for training
    #[arg(long, value_name = "F")]
    split_fraction: Option<f64>,

    /// Number of highest-variance features to report and copy
    #[arg(long, value_name = "K")]
    top_features: Option<usize>,

    /// Trees in the isolation forest
    #[arg(long, value_name = "N")]
    trees: Option<usize>,

    /// Seed for the isolation forest
    #[arg(long, value_name = "S")]
    seed: Option<u64>,

    /// How gaps in the test partition are filled
    #[arg(long, value_enum)]
    imputation: Option<Imputation>,

    /// JSON config file (defaults to the user config when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Composite score above which a record is reported
    #[arg(long, value_name = "T", default_value_t = 80.0)]
    threshold: f64,

    /// Path for the DHAT heap profiling output (only used when built with --features ram-profiling)
    #[cfg(feature = "ram-profiling")]
    #[arg(
        long = "profile-output",
        value_name = "PROFILE_FILE",
        default_value = "dhat-heap.json"
    )]
    profile_output: PathBuf,
}

impl Args {
    /// Config file settings with command-line overrides applied
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?;

        if let Some(name) = &self.time_column {
            config.time_column.clone_from(name);
        }
        if let Some(fraction) = self.split_fraction {
            config.split_fraction = fraction;
        }
        if let Some(k) = self.top_features {
            config.top_features = k;
        }
        if let Some(trees) = self.trees {
            config.isolation.trees = trees;
        }
        if let Some(seed) = self.seed {
            config.isolation.seed = seed;
        }
        if let Some(imputation) = self.imputation {
            config.imputation = imputation.into();
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    // Set RUST_LOG to override (e.g. RUST_LOG=crabscore=debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    #[cfg(feature = "ram-profiling")]
    let _profiler = {
        tracing::info!("RAM profiling enabled, output: {:?}", args.profile_output);
        dhat::Profiler::builder()
            .file_name(args.profile_output.clone())
            .build()
    };

    #[cfg(feature = "cpu-profiling")]
    {
        tracing::info!("CPU profiling enabled with Tracy - run Tracy profiler to connect");
    }

    tracing::info!("CrabScore {VERSION}");

    let config = args.pipeline_config()?;
    let pipeline = AnomalyPipeline::new(config).context("Invalid pipeline configuration")?;
    let report = pipeline
        .run_csv(&args.input, &args.output)
        .with_context(|| format!("Failed to score {}", args.input.display()))?;

    print_summary(&report, args.threshold);
    Ok(())
}

fn print_summary(report: &PipelineReport, threshold: f64) {
    println!("Train size: {} | Test size: {}", report.train_size, report.test_size);

    println!("\nTop variance features:");
    for (rank, feature) in report.ranked_features.iter().enumerate() {
        println!("  {:>2}. {:<24} {:.4}", rank + 1, feature.name, feature.variance);
    }

    println!("\nDetectors:");
    for summary in &report.detectors {
        println!("  {:<10} {}", summary.kind, summary.description);
    }
    for (kind, count) in report.detector_outliers() {
        println!("  {count} records beyond the {kind} threshold");
    }

    let flagged = report.flagged(threshold);
    println!(
        "\n{} of {} records score above {threshold}",
        flagged.len(),
        report.test_size
    );
    for &(row, score) in flagged.iter().take(SHOWN_ROWS) {
        let cells: Vec<String> = report.table.rows[row]
            .iter()
            .take(report.table.columns.len() - report.ranked_features.len())
            .zip(&report.table.columns)
            .map(|(value, column)| format!("{column}={value}"))
            .collect();
        println!("  {score:>6.2}  {}", cells.join(", "));
    }
}
