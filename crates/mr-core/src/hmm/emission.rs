//! Multivariate Gaussian emission densities.
//!
//! Each state caches the lower Cholesky factor of its covariance so that a
//! log-density costs one triangular solve. A covariance that does not admit
//! a factorization is reported as singular instead of being regularized
//! behind the caller's back.

use mr_math::LN_2PI;
use nalgebra::{Cholesky, DMatrix};
use rand::Rng;
use rand_distr::StandardNormal;

use super::HmmError;

#[derive(Debug, Clone)]
pub struct GaussianEmission {
    mean: Vec<f64>,
    /// Lower-triangular factor `L` with `Σ = L Lᵀ`, row-major.
    chol: Vec<f64>,
    /// `-0.5 · (F ln 2π + ln|Σ|)`.
    log_norm: f64,
}

impl GaussianEmission {
    pub fn new(state: usize, mean: Vec<f64>, covariance: &DMatrix<f64>) -> Result<Self, HmmError> {
        let f = mean.len();
        if covariance.nrows() != f || covariance.ncols() != f {
            return Err(HmmError::DimensionMismatch {
                expected: f,
                actual: covariance.nrows(),
            });
        }
        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(HmmError::SingularCovariance { state });
        }
        let factor = Cholesky::new(covariance.clone())
            .ok_or(HmmError::SingularCovariance { state })?;
        let l = factor.l();
        let mut log_det = 0.0;
        for i in 0..f {
            let d = l[(i, i)];
            if !(d > 0.0 && d.is_finite()) {
                return Err(HmmError::SingularCovariance { state });
            }
            log_det += d.ln();
        }
        log_det *= 2.0;
        if !log_det.is_finite() {
            return Err(HmmError::SingularCovariance { state });
        }
        let mut chol = Vec::with_capacity(f * f);
        for i in 0..f {
            for j in 0..f {
                chol.push(l[(i, j)]);
            }
        }
        Ok(Self {
            mean,
            chol,
            log_norm: -0.5 * (f as f64 * LN_2PI + log_det),
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Log-density at `x`; `scratch` must hold at least `dim()` values.
    pub fn log_density(&self, x: &[f64], scratch: &mut [f64]) -> f64 {
        let f = self.dim();
        let mut maha = 0.0;
        // Forward substitution: L y = x - μ.
        for i in 0..f {
            let row = &self.chol[i * f..i * f + i + 1];
            let mut acc = x[i] - self.mean[i];
            for j in 0..i {
                acc -= row[j] * scratch[j];
            }
            let y = acc / row[i];
            scratch[i] = y;
            maha += y * y;
        }
        self.log_norm - 0.5 * maha
    }

    /// Draws one observation into `out`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut Vec<f64>) {
        let f = self.dim();
        let z: Vec<f64> = (0..f).map(|_| rng.sample(StandardNormal)).collect();
        out.clear();
        for i in 0..f {
            let row = &self.chol[i * f..i * f + i + 1];
            let shift: f64 = row.iter().zip(&z).map(|(l, z)| l * z).sum();
            out.push(self.mean[i] + shift);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn standard_normal_density() {
        let e = GaussianEmission::new(0, vec![0.0, 0.0], &DMatrix::identity(2, 2)).unwrap();
        let mut scratch = vec![0.0; 2];
        let at_zero = e.log_density(&[0.0, 0.0], &mut scratch);
        assert!((at_zero + LN_2PI).abs() < 1e-12);
        let at_one = e.log_density(&[1.0, 0.0], &mut scratch);
        assert!((at_zero - at_one - 0.5).abs() < 1e-12);
    }

    #[test]
    fn correlated_density_matches_closed_form() {
        // Σ = [[2, 1], [1, 2]], |Σ| = 3, Σ⁻¹ = [[2, -1], [-1, 2]] / 3
        let cov = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        let e = GaussianEmission::new(0, vec![1.0, -1.0], &cov).unwrap();
        let mut scratch = vec![0.0; 2];
        let x = [2.0, 0.0];
        let d = [1.0, 1.0];
        let maha = (2.0 * d[0] * d[0] - 2.0 * d[0] * d[1] + 2.0 * d[1] * d[1]) / 3.0;
        let expected = -0.5 * (2.0 * LN_2PI + 3.0_f64.ln() + maha);
        assert!((e.log_density(&x, &mut scratch) - expected).abs() < 1e-12);
    }

    #[test]
    fn singular_covariance_is_reported() {
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let err = GaussianEmission::new(3, vec![0.0, 0.0], &cov).unwrap_err();
        assert!(matches!(err, HmmError::SingularCovariance { state: 3 }));
    }

    #[test]
    fn samples_follow_the_covariance() {
        let cov = DMatrix::from_row_slice(2, 2, &[4.0, 1.5, 1.5, 1.0]);
        let e = GaussianEmission::new(0, vec![3.0, -2.0], &cov).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut buf = Vec::new();
        let n = 20_000;
        let (mut sx, mut sy, mut sxy) = (0.0, 0.0, 0.0);
        let mut draws = Vec::with_capacity(n);
        for _ in 0..n {
            e.sample(&mut rng, &mut buf);
            sx += buf[0];
            sy += buf[1];
            draws.push((buf[0], buf[1]));
        }
        let (mx, my) = (sx / n as f64, sy / n as f64);
        for (x, y) in &draws {
            sxy += (x - mx) * (y - my);
        }
        assert!((mx - 3.0).abs() < 0.05);
        assert!((my + 2.0).abs() < 0.05);
        assert!((sxy / n as f64 - 1.5).abs() < 0.1);
    }
}
