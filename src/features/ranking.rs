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

use super::FeatureMatrix;

/// Relative gap below which two variances count as equal
const VARIANCE_TIE_TOLERANCE: f64 = 1e-9;

/// A feature and its training variance
#[derive(Debug, Clone, PartialEq)]
pub struct RankedFeature {
    pub name: String,
    pub variance: f64,
}

/// Picks the highest-variance features for display
pub struct FeatureRanker {
    k: usize,
}

impl FeatureRanker {
    pub const fn new(k: usize) -> Self {
        Self { k }
    }

    /// Top `k` features by variance, descending, ties in column order
    ///
    /// Variances within rounding noise of each other are ties. On a scaled
    /// matrix every non-constant feature has variance one, give or take a
    /// few ulps, and those ulps must not reorder the columns.
    pub fn rank(&self, matrix: &FeatureMatrix) -> Vec<RankedFeature> {
        let mut ranked: Vec<(usize, RankedFeature)> = matrix
            .names()
            .iter()
            .enumerate()
            .map(|(col, name)| {
                let feature = RankedFeature {
                    name: name.clone(),
                    variance: matrix.column_moments(col).1,
                };
                (col, feature)
            })
            .collect();

        ranked.sort_by(|a, b| b.1.variance.total_cmp(&a.1.variance));

        // Runs of near-equal variances go back to column order
        let mut start = 0;
        while start < ranked.len() {
            let lead = ranked[start].1.variance;
            let run = ranked[start..]
                .iter()
                .take_while(|(_, f)| nearly_equal(f.variance, lead))
                .count();
            ranked[start..start + run].sort_by_key(|(col, _)| *col);
            start += run;
        }

        ranked.truncate(self.k);
        ranked.into_iter().map(|(_, feature)| feature).collect()
    }

    pub fn top_names(&self, matrix: &FeatureMatrix) -> Vec<String> {
        self.rank(matrix).into_iter().map(|f| f.name).collect()
    }
}

fn nearly_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= VARIANCE_TIE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

impl Default for FeatureRanker {
    fn default() -> Self {
        Self::new(7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureScaler;

    #[test]
    fn test_rank_by_variance() {
        let a = 10f64.sqrt();
        let rows: Vec<Vec<f64>> = (0..4)
            .map(|i| {
                let sign = if i % 2 == 0 { -1.0 } else { 1.0 };
                vec![sign * a, sign, sign * 10.0]
            })
            .collect();
        let m = FeatureMatrix::from_rows(
            vec!["ten".to_string(), "one".to_string(), "hundred".to_string()],
            &rows,
        )
        .expect("rectangular");

        let ranked = FeatureRanker::new(2).rank(&m);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].name, "hundred");
        assert_eq!(ranked[1].name, "ten");
        assert!((ranked[0].variance - 100.0).abs() < 1e-9);
        assert!((ranked[1].variance - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_ties_keep_column_order() {
        let m = FeatureMatrix::from_rows(
            vec!["b".to_string(), "a".to_string(), "c".to_string()],
            &[vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]],
        )
        .expect("rectangular");
        assert_eq!(FeatureRanker::new(7).top_names(&m), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_scaled_features_keep_column_order() {
        let rows: Vec<Vec<f64>> = (0..70)
            .map(|i| {
                let t = i as f64;
                vec![
                    ((i * 7) % 13) as f64 / 13.0,
                    ((i * 5) % 11) as f64 / 11.0,
                    (t * 0.37).sin() * 1e3,
                    t * 1e-4 + 5.0,
                    1.0,
                ]
            })
            .collect();
        let names: Vec<String> = ["f1", "f2", "wave", "drift", "flat"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let raw = FeatureMatrix::from_rows(names, &rows).expect("rectangular");
        let scaled = FeatureScaler::new().fit_transform(&raw).expect("fitted");

        let ranked = FeatureRanker::new(5).rank(&scaled);
        let names: Vec<&str> = ranked.iter().map(|f| f.name.as_str()).collect();
        // unit variance up to rounding for all but the constant column
        assert_eq!(names, ["f1", "f2", "wave", "drift", "flat"]);
        assert!(ranked[..4].iter().all(|f| (f.variance - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_rounding_gap_is_a_tie() {
        let one = 1.0;
        let above = 1.0 + 4.0 * f64::EPSILON;
        assert!(nearly_equal(one, above));
        assert!(!nearly_equal(one, 1.001));
    }
}
