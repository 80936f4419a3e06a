//! Forward–backward and Viterbi over one contiguous segment.
//!
//! All functions take row-major `T x K` emission log-probabilities, a
//! length-K initial distribution and a row-major `K x K` transition matrix.
//! Callers run them once per segment, which is what keeps evidence from
//! crossing a segment boundary.
//!
//! The forward–backward pass uses per-row scaling (emissions are shifted by
//! their row maximum before exponentiation, alphas are normalized by `c_t`),
//! so the log-likelihood is `Σ_t (ln c_t + max_k log b_t(k))`.

use super::{HmmError, Result};

/// Smoothed state marginals and transition counts of one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPosteriors {
    /// `T x K` state-occupancy probabilities.
    pub gamma: Vec<f64>,
    /// `K x K` expected transition counts summed over the segment.
    pub xi_sum: Vec<f64>,
    pub log_likelihood: f64,
}

/// Exponentiates each row relative to its maximum. Returns the scaled
/// emissions and the row maxima.
fn scaled_emissions(log_b: &[f64], k: usize) -> (Vec<f64>, Vec<f64>) {
    let mut b = Vec::with_capacity(log_b.len());
    let mut shifts = Vec::with_capacity(log_b.len() / k);
    for row in log_b.chunks_exact(k) {
        let m = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        shifts.push(m);
        b.extend(row.iter().map(|v| (v - m).exp()));
    }
    (b, shifts)
}

/// Scaled forward pass; returns normalized alphas and scale factors.
fn forward(
    b: &[f64],
    k: usize,
    startprob: &[f64],
    transmat: &[f64],
    row_offset: usize,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let t_len = b.len() / k;
    let mut alpha = vec![0.0; b.len()];
    let mut scales = Vec::with_capacity(t_len);
    for t in 0..t_len {
        let (prev, cur) = alpha.split_at_mut(t * k);
        let cur = &mut cur[..k];
        if t == 0 {
            for j in 0..k {
                cur[j] = startprob[j] * b[j];
            }
        } else {
            let prev = &prev[(t - 1) * k..];
            for j in 0..k {
                let mut acc = 0.0;
                for i in 0..k {
                    acc += prev[i] * transmat[i * k + j];
                }
                cur[j] = acc * b[t * k + j];
            }
        }
        let c: f64 = cur.iter().sum();
        if !(c > 0.0 && c.is_finite()) {
            return Err(HmmError::ImpossibleObservation {
                row: row_offset + t,
            });
        }
        cur.iter_mut().for_each(|a| *a /= c);
        scales.push(c);
    }
    Ok((alpha, scales))
}

fn log_likelihood_of(scales: &[f64], shifts: &[f64]) -> f64 {
    scales.iter().zip(shifts).map(|(c, m)| c.ln() + m).sum()
}

/// Log-likelihood of one segment without the backward pass.
pub fn segment_log_likelihood(
    log_b: &[f64],
    k: usize,
    startprob: &[f64],
    transmat: &[f64],
    row_offset: usize,
) -> Result<f64> {
    let (b, shifts) = scaled_emissions(log_b, k);
    let (_, scales) = forward(&b, k, startprob, transmat, row_offset)?;
    Ok(log_likelihood_of(&scales, &shifts))
}

pub fn forward_backward(
    log_b: &[f64],
    k: usize,
    startprob: &[f64],
    transmat: &[f64],
    row_offset: usize,
) -> Result<SegmentPosteriors> {
    let t_len = log_b.len() / k;
    let (b, shifts) = scaled_emissions(log_b, k);
    let (alpha, scales) = forward(&b, k, startprob, transmat, row_offset)?;

    let mut beta = vec![1.0; log_b.len()];
    let mut xi_sum = vec![0.0; k * k];
    for t in (0..t_len.saturating_sub(1)).rev() {
        let c_next = scales[t + 1];
        let (head, tail) = beta.split_at_mut((t + 1) * k);
        let next = &tail[..k];
        let cur = &mut head[t * k..];
        let b_next = &b[(t + 1) * k..(t + 2) * k];
        let a_t = &alpha[t * k..(t + 1) * k];
        for i in 0..k {
            let mut acc = 0.0;
            for j in 0..k {
                let w = transmat[i * k + j] * b_next[j] * next[j] / c_next;
                acc += w;
                xi_sum[i * k + j] += a_t[i] * w;
            }
            cur[i] = acc;
        }
    }

    let mut gamma = Vec::with_capacity(log_b.len());
    for t in 0..t_len {
        let row = &alpha[t * k..(t + 1) * k];
        let brow = &beta[t * k..(t + 1) * k];
        let start = gamma.len();
        gamma.extend(row.iter().zip(brow).map(|(a, b)| a * b));
        let total: f64 = gamma[start..].iter().sum();
        if total > 0.0 {
            gamma[start..].iter_mut().for_each(|g| *g /= total);
        }
    }

    Ok(SegmentPosteriors {
        gamma,
        xi_sum,
        log_likelihood: log_likelihood_of(&scales, &shifts),
    })
}

/// Most likely state path and its joint log-probability.
pub fn viterbi(log_b: &[f64], k: usize, startprob: &[f64], transmat: &[f64]) -> (Vec<usize>, f64) {
    let t_len = log_b.len() / k;
    if t_len == 0 {
        return (Vec::new(), 0.0);
    }
    let log_start: Vec<f64> = startprob.iter().map(|p| p.ln()).collect();
    let log_trans: Vec<f64> = transmat.iter().map(|p| p.ln()).collect();

    let mut delta: Vec<f64> = (0..k).map(|j| log_start[j] + log_b[j]).collect();
    let mut next = vec![0.0; k];
    let mut backptr = vec![0usize; t_len * k];
    for t in 1..t_len {
        for j in 0..k {
            let mut best = f64::NEG_INFINITY;
            let mut arg = 0;
            for i in 0..k {
                let v = delta[i] + log_trans[i * k + j];
                if v > best {
                    best = v;
                    arg = i;
                }
            }
            next[j] = best + log_b[t * k + j];
            backptr[t * k + j] = arg;
        }
        std::mem::swap(&mut delta, &mut next);
    }

    let (mut state, mut best) = (0, f64::NEG_INFINITY);
    for (j, &v) in delta.iter().enumerate() {
        if v > best {
            best = v;
            state = j;
        }
    }
    let mut path = vec![0; t_len];
    path[t_len - 1] = state;
    for t in (1..t_len).rev() {
        state = backptr[t * k + state];
        path[t - 1] = state;
    }
    (path, best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mr_math::log_sum_exp;

    /// Brute-force log-likelihood over every path.
    fn brute_force(log_b: &[f64], k: usize, pi: &[f64], a: &[f64]) -> f64 {
        let t_len = log_b.len() / k;
        let total_paths = k.pow(t_len as u32);
        let mut terms = Vec::with_capacity(total_paths);
        for code in 0..total_paths {
            let mut c = code;
            let path: Vec<usize> = (0..t_len)
                .map(|_| {
                    let s = c % k;
                    c /= k;
                    s
                })
                .collect();
            let mut lp = pi[path[0]].ln() + log_b[path[0]];
            for t in 1..t_len {
                lp += a[path[t - 1] * k + path[t]].ln() + log_b[t * k + path[t]];
            }
            terms.push(lp);
        }
        log_sum_exp(&terms)
    }

    fn fixture() -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let log_b = vec![-1.0, -3.0, -2.5, -0.5, -4.0, -1.2, -0.7, -2.2];
        let pi = vec![0.6, 0.4];
        let a = vec![0.7, 0.3, 0.2, 0.8];
        (log_b, pi, a)
    }

    #[test]
    fn likelihood_matches_path_enumeration() {
        let (log_b, pi, a) = fixture();
        let fb = forward_backward(&log_b, 2, &pi, &a, 0).unwrap();
        let expected = brute_force(&log_b, 2, &pi, &a);
        assert!((fb.log_likelihood - expected).abs() < 1e-10);
        let fwd = segment_log_likelihood(&log_b, 2, &pi, &a, 0).unwrap();
        assert!((fwd - expected).abs() < 1e-10);
    }

    #[test]
    fn gamma_rows_are_distributions_and_xi_counts_transitions() {
        let (log_b, pi, a) = fixture();
        let fb = forward_backward(&log_b, 2, &pi, &a, 0).unwrap();
        for row in fb.gamma.chunks_exact(2) {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
        let transitions: f64 = fb.xi_sum.iter().sum();
        assert!((transitions - 3.0).abs() < 1e-10);
        // Row sums of xi equal occupancy of the first T-1 steps.
        let occ0: f64 = fb.gamma.chunks_exact(2).take(3).map(|r| r[0]).sum();
        assert!((fb.xi_sum[0] + fb.xi_sum[1] - occ0).abs() < 1e-10);
    }

    #[test]
    fn viterbi_finds_best_path() {
        let (log_b, pi, a) = fixture();
        let (path, lp) = viterbi(&log_b, 2, &pi, &a);
        let mut best = f64::NEG_INFINITY;
        for code in 0..16usize {
            let p: Vec<usize> = (0..4).map(|t| (code >> t) & 1).collect();
            let mut v = pi[p[0]].ln() + log_b[p[0]];
            for t in 1..4 {
                v += a[p[t - 1] * 2 + p[t]].ln() + log_b[t * 2 + p[t]];
            }
            best = best.max(v);
        }
        assert!((lp - best).abs() < 1e-12);
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn single_row_segment_has_no_transitions() {
        let fb = forward_backward(&[-1.0, -2.0], 2, &[0.5, 0.5], &[0.9, 0.1, 0.1, 0.9], 0).unwrap();
        assert!(fb.xi_sum.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn unreachable_observation_is_an_error() {
        // State 1 is the only one that can explain row 1, but it can't be reached.
        let log_b = vec![0.0, 0.0, f64::NEG_INFINITY, 0.0];
        let err = forward_backward(&log_b, 2, &[1.0, 0.0], &[1.0, 0.0, 0.0, 1.0], 10).unwrap_err();
        assert_eq!(err, HmmError::ImpossibleObservation { row: 11 });
    }
}
