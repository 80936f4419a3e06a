//! Regime model outputs and the versioned parameter layout.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version tag written into every serialized [`RegimeModelParameters`].
pub const PARAMETERS_FORMAT_VERSION: u32 = 1;

const STOCHASTIC_TOL: f64 = 1e-6;

/// Emission covariance structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceType {
    /// Full symmetric positive-definite matrix per state.
    #[default]
    Full,
    /// Independent per-feature variances per state.
    #[serde(rename = "diag")]
    Diagonal,
}

impl CovarianceType {
    /// Free covariance parameters for `n_states` states over `n_features`.
    pub fn parameter_count(&self, n_states: usize, n_features: usize) -> usize {
        match self {
            CovarianceType::Full => n_states * n_features * (n_features + 1) / 2,
            CovarianceType::Diagonal => n_states * n_features,
        }
    }
}

impl fmt::Display for CovarianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CovarianceType::Full => write!(f, "full"),
            CovarianceType::Diagonal => write!(f, "diag"),
        }
    }
}

impl FromStr for CovarianceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(CovarianceType::Full),
            "diag" | "diagonal" => Ok(CovarianceType::Diagonal),
            other => Err(Error::Unsupported(format!(
                "covariance type '{other}' (supported: full, diag)"
            ))),
        }
    }
}

/// One regime label per row, aligned by position with the feature matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeSequence {
    n_states: usize,
    labels: Vec<usize>,
}

impl RegimeSequence {
    pub fn new(n_states: usize, labels: Vec<usize>) -> Result<Self> {
        if n_states == 0 {
            return Err(Error::Config("state count must be positive".into()));
        }
        if let Some(pos) = labels.iter().position(|&l| l >= n_states) {
            return Err(Error::InvalidData(format!(
                "label {} at position {pos} outside [0, {n_states})",
                labels[pos]
            )));
        }
        Ok(Self { n_states, labels })
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Keeps the given positions in order.
    pub fn select(&self, positions: &[usize]) -> Self {
        Self {
            n_states: self.n_states,
            labels: positions.iter().map(|&p| self.labels[p]).collect(),
        }
    }

    /// Number of rows assigned to each state.
    pub fn occupancy(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_states];
        for &l in &self.labels {
            counts[l] += 1;
        }
        counts
    }
}

/// Row-major `T x K` matrix of state membership probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorMatrix {
    n_states: usize,
    values: Vec<f64>,
}

impl PosteriorMatrix {
    /// Validates shape, range and that each row sums to one.
    pub fn new(n_states: usize, values: Vec<f64>) -> Result<Self> {
        if n_states == 0 || values.len() % n_states != 0 {
            return Err(Error::LengthMismatch {
                what: "posterior values vs state count".into(),
                left: values.len(),
                right: n_states,
            });
        }
        for (t, row) in values.chunks_exact(n_states).enumerate() {
            if row.iter().any(|p| !(0.0..=1.0 + STOCHASTIC_TOL).contains(p)) {
                return Err(Error::InvalidData(format!(
                    "posterior row {t} has a value outside [0, 1]"
                )));
            }
            let total: f64 = row.iter().sum();
            if (total - 1.0).abs() > STOCHASTIC_TOL {
                return Err(Error::InvalidData(format!(
                    "posterior row {t} sums to {total}"
                )));
            }
        }
        Ok(Self { n_states, values })
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn n_rows(&self) -> usize {
        self.values.len() / self.n_states
    }

    pub fn row(&self, t: usize) -> &[f64] {
        &self.values[t * self.n_states..(t + 1) * self.n_states]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks_exact(self.n_states)
    }

    pub fn column(&self, k: usize) -> Vec<f64> {
        self.rows().map(|r| r[k]).collect()
    }

    pub fn select(&self, positions: &[usize]) -> Self {
        let mut values = Vec::with_capacity(positions.len() * self.n_states);
        for &p in positions {
            values.extend_from_slice(self.row(p));
        }
        Self {
            n_states: self.n_states,
            values,
        }
    }

    /// Most probable state per row; ties go to the lower index.
    pub fn argmax(&self) -> Vec<usize> {
        self.rows()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (k, &p)| {
                        if p > best.1 {
                            (k, p)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }
}

/// Frozen Gaussian HMM parameters with a fixed, versioned field layout.
///
/// Covariances are always stored as full `F x F` matrices; diagonal models
/// carry zeros off the diagonal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RegimeModelParameters {
    pub format_version: u32,
    pub n_states: usize,
    pub n_features: usize,
    pub covariance_type: CovarianceType,
    pub means: Vec<Vec<f64>>,
    pub covariances: Vec<Vec<Vec<f64>>>,
    pub transition_matrix: Vec<Vec<f64>>,
    pub initial_distribution: Vec<f64>,
}

impl RegimeModelParameters {
    /// Structural checks that do not need a factorization: version, shapes,
    /// finiteness, symmetry, positive diagonals and stochastic rows.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != PARAMETERS_FORMAT_VERSION {
            return Err(Error::SchemaValidation(format!(
                "parameter format version {} (expected {PARAMETERS_FORMAT_VERSION})",
                self.format_version
            )));
        }
        let (k, f) = (self.n_states, self.n_features);
        if k == 0 || f == 0 {
            return Err(Error::SchemaValidation(
                "state and feature counts must be positive".into(),
            ));
        }
        let shape_err = |what: &str, left: usize, right: usize| Error::LengthMismatch {
            what: what.to_string(),
            left,
            right,
        };
        if self.means.len() != k {
            return Err(shape_err("means vs states", self.means.len(), k));
        }
        if let Some(m) = self.means.iter().find(|m| m.len() != f) {
            return Err(shape_err("mean vector vs features", m.len(), f));
        }
        if self.covariances.len() != k {
            return Err(shape_err("covariances vs states", self.covariances.len(), k));
        }
        for (s, cov) in self.covariances.iter().enumerate() {
            if cov.len() != f || cov.iter().any(|r| r.len() != f) {
                return Err(Error::SchemaValidation(format!(
                    "covariance of state {s} is not {f}x{f}"
                )));
            }
            for i in 0..f {
                if !cov[i][i].is_finite() || cov[i][i] <= 0.0 {
                    return Err(Error::SingularCovariance { state: s });
                }
                for j in 0..i {
                    let (a, b) = (cov[i][j], cov[j][i]);
                    if !a.is_finite() || (a - b).abs() > 1e-9 * (1.0 + a.abs().max(b.abs())) {
                        return Err(Error::SchemaValidation(format!(
                            "covariance of state {s} is not symmetric at ({i}, {j})"
                        )));
                    }
                    if self.covariance_type == CovarianceType::Diagonal && a != 0.0 {
                        return Err(Error::SchemaValidation(format!(
                            "diagonal covariance of state {s} has off-diagonal entry at ({i}, {j})"
                        )));
                    }
                }
            }
        }
        if self.means.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::SchemaValidation("means must be finite".into()));
        }
        if self.transition_matrix.len() != k {
            return Err(shape_err("transition rows vs states", self.transition_matrix.len(), k));
        }
        for (i, row) in self.transition_matrix.iter().enumerate() {
            check_distribution(row, k, &format!("transition row {i}"))?;
        }
        check_distribution(&self.initial_distribution, k, "initial distribution")?;
        Ok(())
    }

    /// Free parameters: means, covariances, off-diagonal transitions and
    /// the initial distribution.
    pub fn parameter_count(&self) -> usize {
        let (k, f) = (self.n_states, self.n_features);
        k * f + self.covariance_type.parameter_count(k, f) + k * (k - 1) + (k - 1)
    }
}

fn check_distribution(values: &[f64], k: usize, what: &str) -> Result<()> {
    if values.len() != k {
        return Err(Error::LengthMismatch {
            what: what.to_string(),
            left: values.len(),
            right: k,
        });
    }
    if values.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(Error::SchemaValidation(format!("{what} has negative or non-finite entries")));
    }
    let total: f64 = values.iter().sum();
    if (total - 1.0).abs() > STOCHASTIC_TOL {
        return Err(Error::SchemaValidation(format!("{what} sums to {total}")));
    }
    Ok(())
}

/// Fit metadata stored next to the parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelSummary {
    pub n_states: usize,
    pub n_features: usize,
    pub n_samples: usize,
    pub n_segments: usize,
    pub covariance_type: CovarianceType,
    pub n_parameters: usize,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub converged: bool,
    pub iterations: usize,
    pub feature_names: Vec<String>,
}
