//! Property-based tests for mr-math numerical functions.

use proptest::prelude::*;
use mr_math::{
    chi_squared_cdf, chi_squared_sf, conditional_mutual_information, entropy, fisher_f_sf,
    log_sum_exp, mutual_information, regularized_incomplete_beta,
};

const TOL: f64 = 1e-10;

fn labels(max: usize, len: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..max, len)
}

// ============================================================================
// log-domain arithmetic
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn log_sum_exp_bounded_by_max_and_max_plus_log_n(
        values in prop::collection::vec(-300.0..300.0f64, 1..20)
    ) {
        let peak = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let lse = log_sum_exp(&values);
        prop_assert!(lse >= peak - TOL);
        prop_assert!(lse <= peak + (values.len() as f64).ln() + TOL);
    }
}

// ============================================================================
// distributions
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn chi_squared_cdf_is_monotone_and_bounded(
        x in 0.0..200.0f64, dx in 0.0..20.0f64, df in 1u32..40
    ) {
        let df = df as f64;
        let lo = chi_squared_cdf(x, df);
        let hi = chi_squared_cdf(x + dx, df);
        prop_assert!((0.0..=1.0).contains(&lo));
        prop_assert!(hi >= lo - 1e-12);
        prop_assert!((lo + chi_squared_sf(x, df) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn f_sf_is_a_probability_and_decreasing(
        f in 0.0..50.0f64, df1 in 1u32..12, df2 in 5u32..2000
    ) {
        let (d1, d2) = (df1 as f64, df2 as f64);
        let p = fisher_f_sf(f, d1, d2);
        let q = fisher_f_sf(f + 0.5, d1, d2);
        prop_assert!((0.0..=1.0).contains(&p));
        prop_assert!(q <= p + 1e-12);
    }

    #[test]
    fn incomplete_beta_in_unit_interval(
        x in 0.0..=1.0f64, a in 0.1..30.0f64, b in 0.1..30.0f64
    ) {
        let v = regularized_incomplete_beta(x, a, b);
        prop_assert!((0.0..=1.0).contains(&v));
    }
}

// ============================================================================
// information measures
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn mutual_information_is_symmetric_and_bounded(
        pair in (1usize..200).prop_flat_map(|n| (labels(4, n), labels(5, n)))
    ) {
        let (x, y) = pair;
        let xy = mutual_information(&x, &y);
        let yx = mutual_information(&y, &x);
        prop_assert!(xy >= 0.0);
        prop_assert!((xy - yx).abs() < 1e-10);
        prop_assert!(xy <= entropy(&x).min(entropy(&y)) + 1e-10);
    }

    #[test]
    fn conditional_mutual_information_is_nonnegative(
        triple in (1usize..300).prop_flat_map(|n| (labels(3, n), labels(3, n), labels(4, n)))
    ) {
        let (x, y, z) = triple;
        prop_assert!(conditional_mutual_information(&x, &y, &z) >= -1e-10);
    }
}
