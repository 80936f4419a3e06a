//! Log-domain primitives used by the forward-backward recursions and the
//! special functions.

use std::f64::consts::PI;

/// `ln(2π)`, the constant term of every Gaussian log-density.
pub const LN_2PI: f64 = 1.837_877_066_409_345_5;

const LANCZOS_G: f64 = 7.0;
#[allow(clippy::excessive_precision)]
const LANCZOS_COEFFS: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

/// Stable `ln(Σ exp(values))`.
///
/// Empty input and all-`-inf` input both give `-inf`; any NaN gives NaN.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    for &v in values {
        if v.is_nan() {
            return f64::NAN;
        }
        if v > peak {
            peak = v;
        }
    }
    if peak == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if peak == f64::INFINITY {
        return f64::INFINITY;
    }
    let acc: f64 = values.iter().map(|&v| (v - peak).exp()).sum();
    peak + acc.ln()
}

/// `x · ln(y)` with the convention `0 · ln(0) = 0`.
///
/// This is the building block of every multinomial log-likelihood where
/// empty cells must contribute nothing.
pub fn xlogy(x: f64, y: f64) -> f64 {
    if x == 0.0 && !y.is_nan() {
        0.0
    } else {
        x * y.ln()
    }
}

/// `ln Γ(z)` via the Lanczos approximation (g = 7, n = 9).
///
/// Uses the reflection formula for `z < 0.5`. Poles return `+inf`.
pub fn log_gamma(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z <= 0.0 && z.fract() == 0.0 {
        return f64::INFINITY;
    }
    if z < 0.5 {
        let s = (PI * z).sin().abs();
        return (PI / s).ln() - log_gamma(1.0 - z);
    }
    let shifted = z - 1.0;
    let mut series = LANCZOS_COEFFS[0];
    for (i, &c) in LANCZOS_COEFFS.iter().enumerate().skip(1) {
        series += c / (shifted + i as f64);
    }
    let t = shifted + LANCZOS_G + 0.5;
    0.5 * LN_2PI + (shifted + 0.5) * t.ln() - t + series.ln()
}

/// `ln B(a, b) = ln Γ(a) + ln Γ(b) - ln Γ(a + b)`.
pub fn log_beta(a: f64, b: f64) -> f64 {
    log_gamma(a) + log_gamma(b) - log_gamma(a + b)
}
