//! Descriptive statistics over `f64` slices.
//!
//! Empty input yields NaN rather than panicking. Quantities that are
//! mathematically undefined for a valid input (a coefficient of variation
//! with zero mean) are `None`, never a silent zero.

use serde::{Deserialize, Serialize};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Variance with `ddof` delta degrees of freedom.
pub fn variance(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    ss / (values.len() - ddof) as f64
}

pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    variance(values, ddof).sqrt()
}

/// Median; averages the two middle values for even lengths.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

/// Pearson correlation. NaN when either side is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return f64::NAN;
    }
    let mx = mean(x);
    let my = mean(y);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    sxy / (sxx * syy).sqrt()
}

/// Lag-`k` autocorrelation as the Pearson correlation of the series with its
/// own shift.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    if lag >= values.len() {
        return f64::NAN;
    }
    pearson(&values[lag..], &values[..values.len() - lag])
}

/// First differences `x[t] - x[t-1]`.
pub fn diff(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Sample standard deviation over mean; `None` when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values);
    if m.is_nan() || m == 0.0 {
        return None;
    }
    Some(std_dev(values, 1) / m)
}

/// Five-number-style summary of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Self {
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let empty = values.is_empty();
        Self {
            count: values.len(),
            mean: mean(values),
            std: std_dev(values, 1),
            min: if empty { f64::NAN } else { min },
            median: median(values),
            max: if empty { f64::NAN } else { max },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn moments() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(close(mean(&v), 5.0, 1e-12));
        assert!(close(variance(&v, 0), 4.0, 1e-12));
        assert!(close(std_dev(&v, 1), (32.0f64 / 7.0).sqrt(), 1e-12));
        assert!(variance(&[1.0], 1).is_nan());
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn autocorrelation_of_alternating_series() {
        let v: Vec<f64> = (0..50).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(close(autocorrelation(&v, 1), -1.0, 1e-12));
        assert!(close(autocorrelation(&v, 2), 1.0, 1e-12));
    }

    #[test]
    fn constant_series_has_undefined_correlation() {
        assert!(autocorrelation(&[1.0; 10], 1).is_nan());
    }

    #[test]
    fn cv_is_none_for_zero_mean() {
        assert_eq!(coefficient_of_variation(&[-1.0, 1.0]), None);
        let cv = coefficient_of_variation(&[1.0, 3.0]).unwrap();
        assert!(close(cv, 2f64.sqrt() / 2.0, 1e-12));
    }

    #[test]
    fn diff_shortens_by_one() {
        assert_eq!(diff(&[1.0, 4.0, 9.0]), vec![3.0, 5.0]);
        assert!(diff(&[1.0]).is_empty());
    }

    #[test]
    fn summary_of_column() {
        let s = Summary::of(&[1.0, 2.0, 3.0, 10.0]);
        assert_eq!(s.count, 4);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 10.0);
        assert_eq!(s.median, 2.5);
        assert!(close(s.mean, 4.0, 1e-12));
    }
}
