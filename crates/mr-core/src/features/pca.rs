//! Standardization and variance-retaining principal component projection.
//!
//! Fit once on the full batch; the resulting [`Projection`] is frozen and
//! stored in the model bundle so decoding applies the identical transform.

use mr_common::{FeatureMatrix, Projection};
use nalgebra::{DMatrix, SymmetricEigen};
use tracing::debug;

use super::{FeatureError, Result};

/// Per-column centering and population-std scaling.
///
/// Zero-variance columns keep a scale of 1 so they map to all zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(matrix: &FeatureMatrix) -> Self {
        let f = matrix.n_features();
        let n = matrix.n_rows().max(1) as f64;
        let mut means = vec![0.0; f];
        for row in matrix.rows() {
            for (m, x) in means.iter_mut().zip(row) {
                *m += x;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut ss = vec![0.0; f];
        for row in matrix.rows() {
            for j in 0..f {
                let d = row[j] - means[j];
                ss[j] += d * d;
            }
        }
        let scales = ss
            .into_iter()
            .map(|s| {
                let sd = (s / n).sqrt();
                if sd > 0.0 && sd.is_finite() {
                    sd
                } else {
                    1.0
                }
            })
            .collect();
        Self { means, scales }
    }

    /// Standardized values, row-major.
    pub fn transform_values(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        let mut out = Vec::with_capacity(matrix.values().len());
        for row in matrix.rows() {
            for (j, x) in row.iter().enumerate() {
                out.push((x - self.means[j]) / self.scales[j]);
            }
        }
        out
    }

    pub fn transform(&self, matrix: &FeatureMatrix) -> Result<FeatureMatrix> {
        if matrix.n_features() != self.means.len() {
            return Err(mr_common::Error::InconsistentWidth {
                expected: self.means.len(),
                actual: matrix.n_features(),
                segment: 0,
            }
            .into());
        }
        let values = self.transform_values(matrix);
        Ok(matrix.with_values(matrix.feature_names().to_vec(), values)?)
    }
}

/// Standardizes, then keeps the fewest principal components whose
/// cumulative explained variance reaches `variance_fraction`.
pub fn fit_projection(matrix: &FeatureMatrix, variance_fraction: f64) -> Result<Projection> {
    if !(variance_fraction > 0.0 && variance_fraction <= 1.0) {
        return Err(FeatureError::DegenerateProjection(format!(
            "variance fraction {variance_fraction} outside (0, 1]"
        )));
    }
    let (n, f) = (matrix.n_rows(), matrix.n_features());
    if n < 2 {
        return Err(FeatureError::DegenerateProjection(format!(
            "{n} rows are not enough to estimate a covariance"
        )));
    }

    let scaler = StandardScaler::fit(matrix);
    let z = DMatrix::from_row_slice(n, f, &scaler.transform_values(matrix));
    let cov = (z.transpose() * &z) / (n as f64 - 1.0);

    let eig = SymmetricEigen::new(cov);
    let mut order: Vec<usize> = (0..f).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
    let variances: Vec<f64> = order.iter().map(|&i| eig.eigenvalues[i].max(0.0)).collect();
    let total: f64 = variances.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return Err(FeatureError::DegenerateProjection(
            "every column is constant".into(),
        ));
    }
    let ratios: Vec<f64> = variances.iter().map(|v| v / total).collect();

    // Count of cumulative ratios at or below the target, plus one.
    let mut cumulative = 0.0;
    let mut below = 0;
    for r in &ratios {
        cumulative += r;
        if cumulative <= variance_fraction {
            below += 1;
        } else {
            break;
        }
    }
    let keep = if variance_fraction >= 1.0 {
        f
    } else {
        (below + 1).min(f)
    };

    let components: Vec<Vec<f64>> = order[..keep]
        .iter()
        .map(|&i| {
            let mut axis: Vec<f64> = eig.eigenvectors.column(i).iter().copied().collect();
            let pivot = axis
                .iter()
                .copied()
                .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                .unwrap_or(0.0);
            if pivot < 0.0 {
                axis.iter_mut().for_each(|v| *v = -*v);
            }
            axis
        })
        .collect();

    debug!(
        components = keep,
        input_features = f,
        retained = ratios[..keep].iter().sum::<f64>(),
        "principal components selected"
    );

    Ok(Projection {
        input_names: matrix.feature_names().to_vec(),
        means: scaler.means,
        scales: scaler.scales,
        components,
        explained_variance_ratio: ratios[..keep].to_vec(),
        variance_fraction,
    })
}
