//! Per-feature and per-regime descriptive diagnostics.

use mr_common::FeatureMatrix;
use mr_math::descriptive::{
    autocorrelation, coefficient_of_variation, diff, std_dev, variance, Summary,
};
use serde::{Deserialize, Serialize};

/// Lags reported in the autocorrelation profile.
pub const ACF_LAGS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVariance {
    pub feature: String,
    pub variance: f64,
}

/// Population variance of every column, largest first.
pub fn variance_ranking(matrix: &FeatureMatrix) -> Vec<FeatureVariance> {
    let mut ranking: Vec<FeatureVariance> = matrix
        .feature_names()
        .iter()
        .enumerate()
        .map(|(j, name)| FeatureVariance {
            feature: name.clone(),
            variance: variance(&matrix.column(j), 0),
        })
        .collect();
    ranking.sort_by(|a, b| b.variance.total_cmp(&a.variance));
    ranking
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDiagnostics {
    pub feature: String,
    pub lag1_autocorrelation: f64,
    pub std: f64,
    pub diff_std: f64,
    /// Undefined for a zero-mean column.
    pub coefficient_of_variation: Option<f64>,
    /// Autocorrelation at lags `1..=ACF_LAGS`.
    pub acf: Vec<f64>,
}

pub fn feature_diagnostics(matrix: &FeatureMatrix) -> Vec<FeatureDiagnostics> {
    matrix
        .feature_names()
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let col = matrix.column(j);
            let acf: Vec<f64> = (1..=ACF_LAGS).map(|lag| autocorrelation(&col, lag)).collect();
            FeatureDiagnostics {
                feature: name.clone(),
                lag1_autocorrelation: acf[0],
                std: std_dev(&col, 1),
                diff_std: std_dev(&diff(&col), 1),
                coefficient_of_variation: coefficient_of_variation(&col),
                acf,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeProfile {
    pub regime: usize,
    pub count: usize,
    pub share: f64,
    /// One summary per feature, in column order. Empty for unused regimes.
    pub features: Vec<(String, Summary)>,
}

pub fn regime_profiles(
    matrix: &FeatureMatrix,
    labels: &[usize],
    n_states: usize,
) -> Vec<RegimeProfile> {
    let n = labels.len().max(1) as f64;
    (0..n_states)
        .map(|regime| {
            let rows: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == regime)
                .map(|(i, _)| i)
                .collect();
            let features = if rows.is_empty() {
                Vec::new()
            } else {
                matrix
                    .feature_names()
                    .iter()
                    .enumerate()
                    .map(|(j, name)| {
                        let values: Vec<f64> = rows.iter().map(|&r| matrix.row(r)[j]).collect();
                        (name.clone(), Summary::of(&values))
                    })
                    .collect()
            };
            RegimeProfile {
                regime,
                count: rows.len(),
                share: rows.len() as f64 / n,
                features,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> FeatureMatrix {
        // a: 1..=6, b: constant zero
        let values: Vec<f64> = (1..=6).flat_map(|i| [i as f64, 0.0]).collect();
        FeatureMatrix::single_segment(vec!["a".into(), "b".into()], (0..6).collect(), values)
            .unwrap()
    }

    #[test]
    fn ranking_is_descending_population_variance() {
        let r = variance_ranking(&matrix());
        assert_eq!(r[0].feature, "a");
        assert!((r[0].variance - 35.0 / 12.0).abs() < 1e-12);
        assert_eq!(r[1].variance, 0.0);
    }

    #[test]
    fn zero_mean_column_has_undefined_cv() {
        let d = feature_diagnostics(&matrix());
        assert_eq!(d[1].coefficient_of_variation, None);
        assert!(d[0].coefficient_of_variation.is_some());
        assert!((d[0].diff_std - 0.0).abs() < 1e-12);
        assert_eq!(d[0].acf.len(), ACF_LAGS);
    }

    #[test]
    fn profiles_cover_every_state() {
        let p = regime_profiles(&matrix(), &[0, 0, 0, 1, 1, 1], 3);
        assert_eq!(p.len(), 3);
        assert_eq!(p[0].count, 3);
        assert!((p[1].share - 0.5).abs() < 1e-12);
        assert_eq!(p[0].features[0].1.median, 2.0);
        assert!(p[2].features.is_empty());
    }
}
