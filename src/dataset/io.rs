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

//! CSV ingestion and table export.

use super::{Dataset, Value};
use crate::error::Result;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Load a CSV file with a header row
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let start = std::time::Instant::now();
    let file = File::open(path)?;
    let dataset = read_dataset_from(BufReader::new(file))?;
    tracing::info!(
        "Read {} rows x {} columns from {} in {:?}",
        dataset.len(),
        dataset.columns().len(),
        path.display(),
        start.elapsed()
    );
    Ok(dataset)
}

pub fn read_dataset_from<R: Read>(reader: R) -> Result<Dataset> {
    profiling::scope!("read_dataset");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Value::parse).collect());
    }

    Dataset::new(columns, rows)
}

/// Write a header and rows as CSV; missing cells become empty fields
pub fn write_csv<W: Write>(columns: &[String], rows: &[Vec<Value>], writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(row.iter().map(ToString::to_string))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write rows as a JSON array of objects keyed by column name
pub fn write_json<W: Write>(columns: &[String], rows: &[Vec<Value>], writer: W) -> Result<()> {
    let objects: Vec<serde_json::Map<String, serde_json::Value>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(name, value)| {
                    let json = match value {
                        Value::Number(n) => serde_json::Number::from_f64(*n)
                            .map_or(serde_json::Value::Null, serde_json::Value::Number),
                        Value::Text(s) => serde_json::Value::String(s.clone()),
                        Value::Missing => serde_json::Value::Null,
                    };
                    (name.clone(), json)
                })
                .collect()
        })
        .collect();
    serde_json::to_writer_pretty(writer, &objects)?;
    Ok(())
}

/// Write a table to `path`, choosing JSON for `.json` and CSV otherwise
pub fn write_table(columns: &[String], rows: &[Vec<Value>], path: &Path) -> Result<()> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let mut writer = BufWriter::new(File::create(path)?);
    if is_json {
        write_json(columns, rows, &mut writer)?;
    } else {
        write_csv(columns, rows, &mut writer)?;
    }
    writer.flush()?;

    tracing::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
