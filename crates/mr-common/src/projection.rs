//! Frozen standardize-then-project transform.
//!
//! The fitting side lives with feature assembly; this type only carries the
//! learned parameters so that a model bundle can re-apply the exact same
//! projection to new data.

use crate::error::{Error, Result};
use crate::matrix::FeatureMatrix;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Projection {
    /// Columns the projection was fit on, in order.
    pub input_names: Vec<String>,
    pub means: Vec<f64>,
    /// Population standard deviations; zero-variance columns store 1.
    pub scales: Vec<f64>,
    /// Principal axes, one row per retained component.
    pub components: Vec<Vec<f64>>,
    pub explained_variance_ratio: Vec<f64>,
    /// Requested cumulative variance fraction.
    pub variance_fraction: f64,
}

impl Projection {
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn output_names(&self) -> Vec<String> {
        (1..=self.components.len()).map(|i| format!("pc{i}")).collect()
    }

    /// Standardizes and projects one row into `out`.
    pub fn transform_row(&self, row: &[f64], out: &mut Vec<f64>) {
        out.clear();
        for axis in &self.components {
            let mut acc = 0.0;
            for (j, &x) in row.iter().enumerate() {
                acc += (x - self.means[j]) / self.scales[j] * axis[j];
            }
            out.push(acc);
        }
    }

    /// Applies the projection to a matrix with the same columns it was fit on.
    pub fn transform(&self, matrix: &FeatureMatrix) -> Result<FeatureMatrix> {
        if matrix.n_features() != self.input_names.len() {
            return Err(Error::InconsistentWidth {
                expected: self.input_names.len(),
                actual: matrix.n_features(),
                segment: 0,
            });
        }
        if matrix.feature_names() != self.input_names.as_slice() {
            return Err(Error::InvalidData(
                "projection was fit on different feature columns".into(),
            ));
        }
        let mut values = Vec::with_capacity(matrix.n_rows() * self.n_components());
        let mut buf = Vec::with_capacity(self.n_components());
        for row in matrix.rows() {
            self.transform_row(row, &mut buf);
            values.extend_from_slice(&buf);
        }
        matrix.with_values(self.output_names(), values)
    }
}
