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

//! Boundary-density detector.
//!
//! A one-class support vector machine in the nu formulation. The dual
//!
//! ```text
//! min 0.5 * a'Qa   subject to   0 <= a_i <= 1,   sum(a) = nu * l
//! ```
//!
//! is solved with sequential minimal optimization, picking working pairs by
//! maximal violation and second-order gain. The decision function is
//! `f(x) = sum_i a_i K(x_i, x) - rho`; points outside the boundary have
//! `f(x) < 0`, so the anomaly score is `-f(x)`.

use crate::anomaly::check_training_shape;
use crate::anomaly::scorer::{AnomalyDetector, DetectorKind};
use crate::config::{BoundaryConfig, Gamma, Kernel};
use crate::error::{Error, Result};
use crate::features::FeatureMatrix;
use rayon::prelude::*;
use std::borrow::Cow;

/// Largest training set whose kernel matrix is kept in memory
const DENSE_GRAM_LIMIT: usize = 2048;

/// Floor for the curvature of a working pair
const TAU: f64 = 1e-12;

/// Upper box bound of each dual variable
const C: f64 = 1.0;

/// Kernel with a resolved coefficient
#[derive(Debug, Clone, Copy)]
pub struct KernelFn {
    kernel: Kernel,
    gamma: f64,
}

impl KernelFn {
    /// Resolve `gamma` against the training data
    pub fn new(kernel: Kernel, gamma: Gamma, training: &FeatureMatrix) -> Self {
        let d = training.n_cols().max(1) as f64;
        let gamma = match gamma {
            Gamma::Value(g) => g,
            Gamma::Auto => 1.0 / d,
            Gamma::Scale => {
                let values = training.as_slice();
                let n = values.len().max(1) as f64;
                let mean = values.iter().sum::<f64>() / n;
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                if variance > 0.0 {
                    1.0 / (d * variance)
                } else {
                    1.0
                }
            }
        };
        Self { kernel, gamma }
    }

    pub const fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn eval(&self, x: &[f64], y: &[f64]) -> f64 {
        let dot = || x.iter().zip(y).map(|(a, b)| a * b).sum::<f64>();
        match self.kernel {
            Kernel::Rbf => {
                let sq: f64 = x.iter().zip(y).map(|(a, b)| (a - b) * (a - b)).sum();
                (-self.gamma * sq).exp()
            }
            Kernel::Linear => dot(),
            Kernel::Poly { degree, coef0 } => self.gamma.mul_add(dot(), coef0).powi(degree),
            Kernel::Sigmoid { coef0 } => self.gamma.mul_add(dot(), coef0).tanh(),
        }
    }
}

/// Kernel matrix access: precomputed for small sets, row by row otherwise
enum Gram<'a> {
    Dense(Vec<Vec<f64>>),
    OnDemand {
        training: &'a FeatureMatrix,
        kernel: KernelFn,
    },
}

impl<'a> Gram<'a> {
    fn new(training: &'a FeatureMatrix, kernel: KernelFn) -> Self {
        let l = training.n_rows();
        if l <= DENSE_GRAM_LIMIT {
            let rows = (0..l)
                .into_par_iter()
                .map(|i| {
                    let xi = training.row(i);
                    (0..l).map(|j| kernel.eval(xi, training.row(j))).collect()
                })
                .collect();
            Self::Dense(rows)
        } else {
            tracing::debug!("{l} training rows, computing kernel rows on demand");
            Self::OnDemand { training, kernel }
        }
    }

    fn row(&self, i: usize) -> Cow<'_, [f64]> {
        match self {
            Self::Dense(rows) => Cow::Borrowed(&rows[i]),
            Self::OnDemand { training, kernel } => {
                let xi = training.row(i);
                Cow::Owned(
                    (0..training.n_rows())
                        .into_par_iter()
                        .map(|j| kernel.eval(xi, training.row(j)))
                        .collect(),
                )
            }
        }
    }

    fn diagonal(&self) -> Vec<f64> {
        match self {
            Self::Dense(rows) => rows.iter().enumerate().map(|(i, row)| row[i]).collect(),
            Self::OnDemand { training, kernel } => training
                .rows()
                .map(|x| kernel.eval(x, x))
                .collect(),
        }
    }
}

/// Dual solution
struct Solution {
    alpha: Vec<f64>,
    rho: f64,
    iterations: usize,
}

struct Solver<'a> {
    gram: Gram<'a>,
    diag: Vec<f64>,
    alpha: Vec<f64>,
    grad: Vec<f64>,
    eps: f64,
}

impl<'a> Solver<'a> {
    fn new(gram: Gram<'a>, nu: f64, eps: f64) -> Self {
        let diag = gram.diagonal();
        let l = diag.len();

        // Feasible start: the first floor(nu * l) variables at the upper
        // bound, the next one holding the remainder
        let total = nu * l as f64;
        let full = (total.floor() as usize).min(l);
        let mut alpha = vec![0.0; l];
        for a in alpha.iter_mut().take(full) {
            *a = C;
        }
        if full < l {
            alpha[full] = total - full as f64;
        }

        let mut grad = vec![0.0; l];
        for (j, &a) in alpha.iter().enumerate() {
            if a > 0.0 {
                let q_j = gram.row(j);
                for (g, q) in grad.iter_mut().zip(q_j.iter()) {
                    *g += a * q;
                }
            }
        }

        Self {
            gram,
            diag,
            alpha,
            grad,
            eps,
        }
    }

    /// Working pair, or `None` once the KKT gap is below tolerance
    fn select_working_set(&self) -> Option<(usize, usize)> {
        let mut g_max = f64::NEG_INFINITY;
        let mut i_best = None;
        for (t, (&a, &g)) in self.alpha.iter().zip(&self.grad).enumerate() {
            if a < C && -g >= g_max {
                g_max = -g;
                i_best = Some(t);
            }
        }
        let i = i_best?;
        let q_i = self.gram.row(i);

        let mut g_max2 = f64::NEG_INFINITY;
        let mut j_best = None;
        let mut obj_diff_min = f64::INFINITY;
        for (j, (&a, &g)) in self.alpha.iter().zip(&self.grad).enumerate() {
            if a > 0.0 {
                if g >= g_max2 {
                    g_max2 = g;
                }
                let grad_diff = g_max + g;
                if grad_diff > 0.0 {
                    let quad = self.diag[i] + self.diag[j] - 2.0 * q_i[j];
                    let obj_diff = -(grad_diff * grad_diff) / if quad > 0.0 { quad } else { TAU };
                    if obj_diff <= obj_diff_min {
                        obj_diff_min = obj_diff;
                        j_best = Some(j);
                    }
                }
            }
        }

        if g_max + g_max2 < self.eps {
            return None;
        }
        j_best.map(|j| (i, j))
    }

    fn update_pair(&mut self, i: usize, j: usize) {
        let q_i = self.gram.row(i);
        let q_j = self.gram.row(j);

        let quad = self.diag[i] + self.diag[j] - 2.0 * q_i[j];
        let quad = if quad > 0.0 { quad } else { TAU };
        let delta = (self.grad[i] - self.grad[j]) / quad;

        let (old_i, old_j) = (self.alpha[i], self.alpha[j]);
        let sum = old_i + old_j;
        let mut a_i = old_i - delta;
        let mut a_j = old_j + delta;

        // Clip back into the box while keeping a_i + a_j fixed
        if sum > C {
            if a_i > C {
                a_i = C;
                a_j = sum - C;
            }
        } else if a_j < 0.0 {
            a_j = 0.0;
            a_i = sum;
        }
        if sum > C {
            if a_j > C {
                a_j = C;
                a_i = sum - C;
            }
        } else if a_i < 0.0 {
            a_i = 0.0;
            a_j = sum;
        }

        self.alpha[i] = a_i;
        self.alpha[j] = a_j;

        let (d_i, d_j) = (a_i - old_i, a_j - old_j);
        for ((g, qi), qj) in self.grad.iter_mut().zip(q_i.iter()).zip(q_j.iter()) {
            *g += qi * d_i + qj * d_j;
        }
    }

    /// Offset of the decision function
    ///
    /// Mean gradient over free variables; without any, the midpoint of the
    /// feasible interval.
    fn rho(&self) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut free = 0usize;

        for (&a, &g) in self.alpha.iter().zip(&self.grad) {
            if a >= C {
                lower = lower.max(g);
            } else if a <= 0.0 {
                upper = upper.min(g);
            } else {
                free += 1;
                free_sum += g;
            }
        }

        if free > 0 {
            free_sum / free as f64
        } else if upper.is_finite() && lower.is_finite() {
            (upper + lower) / 2.0
        } else if lower.is_finite() {
            lower
        } else {
            upper
        }
    }

    fn solve(mut self, max_iterations: usize) -> Solution {
        let mut iterations = 0;
        while iterations < max_iterations {
            let Some((i, j)) = self.select_working_set() else {
                break;
            };
            self.update_pair(i, j);
            iterations += 1;
        }
        if iterations >= max_iterations {
            tracing::warn!("One-class solver stopped at the iteration cap ({max_iterations})");
        }

        Solution {
            rho: self.rho(),
            alpha: self.alpha,
            iterations,
        }
    }
}

/// Fitted one-class boundary
pub struct OneClassBoundary {
    kernel: KernelFn,
    support_vectors: Vec<Vec<f64>>,
    coefficients: Vec<f64>,
    rho: f64,
    iterations: usize,
}

impl OneClassBoundary {
    pub fn fit(training: &FeatureMatrix, config: &BoundaryConfig) -> Result<Self> {
        profiling::scope!("OneClassBoundary::fit");
        check_training_shape(DetectorKind::Boundary, training)?;
        if !(config.nu > 0.0 && config.nu <= 1.0) {
            return Err(Error::DetectorFit {
                detector: DetectorKind::Boundary.name(),
                reason: format!("nu must be in (0, 1], got {}", config.nu),
            });
        }

        let kernel = KernelFn::new(config.kernel, config.gamma, training);
        let l = training.n_rows();
        let max_iterations = config
            .max_iterations
            .unwrap_or_else(|| 10_000_000_usize.max(100 * l));

        let solution = Solver::new(Gram::new(training, kernel), config.nu, config.tolerance)
            .solve(max_iterations);

        if !solution.rho.is_finite() {
            return Err(Error::DetectorFit {
                detector: DetectorKind::Boundary.name(),
                reason: "dual solver produced a non-finite offset".to_string(),
            });
        }

        let (support_vectors, coefficients): (Vec<Vec<f64>>, Vec<f64>) = solution
            .alpha
            .iter()
            .enumerate()
            .filter(|(_, a)| **a > 0.0)
            .map(|(i, &a)| (training.row(i).to_vec(), a))
            .unzip();

        tracing::debug!(
            "One-class solver converged after {} iterations, gamma {:.4}",
            solution.iterations,
            kernel.gamma()
        );

        Ok(Self {
            kernel,
            support_vectors,
            coefficients,
            rho: solution.rho,
            iterations: solution.iterations,
        })
    }

    /// Signed distance: positive inside the boundary
    pub fn decision_function(&self, x: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.coefficients)
            .map(|(sv, a)| a * self.kernel.eval(sv, x))
            .sum::<f64>()
            - self.rho
    }

    pub fn support_vector_count(&self) -> usize {
        self.support_vectors.len()
    }

    /// Dual coefficients of the support vectors
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub const fn rho(&self) -> f64 {
        self.rho
    }
}

impl AnomalyDetector for OneClassBoundary {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Boundary
    }

    fn score(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        profiling::scope!("OneClassBoundary::score");
        (0..matrix.n_rows())
            .into_par_iter()
            .map(|i| -self.decision_function(matrix.row(i)))
            .collect()
    }

    /// Outside the boundary once the score turns positive
    fn threshold(&self) -> Option<f64> {
        Some(0.0)
    }

    fn summary(&self) -> String {
        format!(
            "{} support vectors, rho {:.4}, gamma {:.4}, {} solver iterations",
            self.support_vectors.len(),
            self.rho,
            self.kernel.gamma(),
            self.iterations
        )
    }
}
