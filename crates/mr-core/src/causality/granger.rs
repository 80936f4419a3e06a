//! Pairwise Granger test on posterior columns (ssr-based F test).
//!
//! For lag `p` the restricted model regresses `y_t` on a constant and
//! `y_{t-1..t-p}`; the unrestricted model adds `x_{t-1..t-p}`. With
//! `nobs` usable rows the statistic is
//! `((SSR_r - SSR_u) / SSR_u) · (nobs - 2p - 1) / p`, referred to
//! `F(p, nobs - 2p - 1)`.

use mr_common::{CellOutcome, Segment, SkipReason};
use mr_math::fisher_f_sf;
use nalgebra::{DMatrix, DVector};

use super::align::valid_rows;

/// Relative pivot size below which a design is treated as rank deficient.
const RANK_TOL: f64 = 1e-10;

/// Does `source` Granger-cause `target` at `lag`?
pub fn granger_test(
    target: &[f64],
    source: &[f64],
    segments: &[Segment],
    lag: usize,
) -> CellOutcome {
    if lag == 0 {
        return CellOutcome::skipped(SkipReason::InsufficientSamples, "lag must be at least 1");
    }
    let rows = valid_rows(segments, lag);
    let nobs = rows.len();
    if nobs <= 2 * lag + 1 {
        return CellOutcome::skipped(
            SkipReason::InsufficientSamples,
            format!("{nobs} aligned rows for lag {lag}"),
        );
    }
    let y = DVector::from_iterator(nobs, rows.iter().map(|&t| target[t]));
    let first = y[0];
    if y.iter().all(|&v| v == first) {
        return CellOutcome::skipped(SkipReason::ConstantSeries, "target column never varies");
    }

    let restricted = design(target, None, &rows, lag);
    let unrestricted = design(target, Some(source), &rows, lag);
    let Some(ssr_r) = ols_ssr(&restricted, &y) else {
        return CellOutcome::skipped(
            SkipReason::SingularDesign,
            "restricted design is rank deficient",
        );
    };
    let Some(ssr_u) = ols_ssr(&unrestricted, &y) else {
        return CellOutcome::skipped(
            SkipReason::SingularDesign,
            "unrestricted design is rank deficient",
        );
    };
    if !(ssr_u > 0.0) {
        return CellOutcome::skipped(SkipReason::SingularDesign, "unrestricted model fits exactly");
    }

    let df_num = lag as f64;
    let df_denom = (nobs - 2 * lag - 1) as f64;
    let f = (((ssr_r - ssr_u) / ssr_u) * df_denom / df_num).max(0.0);
    CellOutcome::Computed {
        statistic: f,
        p_value: fisher_f_sf(f, df_num, df_denom),
        df: Some(df_denom),
    }
}

/// `[1, y lags, (x lags)]` for every aligned row.
fn design(target: &[f64], source: Option<&[f64]>, rows: &[usize], lag: usize) -> DMatrix<f64> {
    let cols = 1 + lag * if source.is_some() { 2 } else { 1 };
    DMatrix::from_fn(rows.len(), cols, |i, j| {
        let t = rows[i];
        match j {
            0 => 1.0,
            j if j <= lag => target[t - j],
            j => source.map_or(0.0, |x| x[t - (j - lag)]),
        }
    })
}

/// Residual sum of squares of least squares via the normal equations.
/// `None` when the design is numerically rank deficient.
fn ols_ssr(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<f64> {
    let xtx = x.transpose() * x;
    let xty = x.transpose() * y;
    let scale = xtx.diagonal().iter().copied().fold(0.0f64, f64::max);
    let chol = xtx.cholesky()?;
    let l = chol.l();
    if (0..l.nrows()).any(|i| l[(i, i)] * l[(i, i)] <= RANK_TOL * scale) {
        return None;
    }
    let beta = chol.solve(&xty);
    let resid = y - x * beta;
    Some(resid.norm_squared())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mr_common::segments_from_lengths;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.random::<f64>()).collect()
    }

    #[test]
    fn lagged_driver_is_detected() {
        let x = noise(600, 1);
        let e = noise(600, 2);
        let mut y = vec![0.0; 600];
        for t in 1..600 {
            y[t] = 0.8 * x[t - 1] + 0.2 * e[t];
        }
        let segs = segments_from_lengths(&[600]);
        let forward = granger_test(&y, &x, &segs, 1);
        assert!(forward.p_value().unwrap() < 1e-6);
        let backward = granger_test(&x, &y, &segs, 1);
        assert!(backward.p_value().unwrap() > 1e-3);
    }

    #[test]
    fn df_follows_aligned_rows() {
        let x = noise(100, 3);
        let y = noise(100, 4);
        let out = granger_test(&y, &x, &segments_from_lengths(&[50, 50]), 3);
        // 2 segments x (50 - 3) rows, minus 2p + 1 parameters
        match out {
            CellOutcome::Computed { df, p_value, .. } => {
                assert_eq!(df, Some(94.0 - 7.0));
                assert!((0.0..=1.0).contains(&p_value));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn degenerate_inputs_are_skipped() {
        let segs = segments_from_lengths(&[40]);
        let constant = vec![0.5; 40];
        let x = noise(40, 5);
        assert!(matches!(
            granger_test(&constant, &x, &segs, 1),
            CellOutcome::Skipped { reason: SkipReason::ConstantSeries, .. }
        ));
        // Constant source duplicates the intercept.
        assert!(matches!(
            granger_test(&x, &constant, &segs, 1),
            CellOutcome::Skipped { reason: SkipReason::SingularDesign, .. }
        ));
        assert!(matches!(
            granger_test(&x, &x, &segments_from_lengths(&[3, 37]), 20),
            CellOutcome::Skipped { reason: SkipReason::InsufficientSamples, .. }
        ));
    }
}
