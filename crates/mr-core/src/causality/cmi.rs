//! Conditional mutual information `I(X; Z | Y)` with a permutation null.
//!
//! `X = target[t]`, `Y = target[t-1]`, `Z = source[t-lag]`. Only `Z` is
//! shuffled, so the null keeps the target's own dynamics intact. Every
//! replicate owns an RNG derived from `(seed, lag, replicate)`, which makes
//! the p-value independent of thread count and of other lags.

use mr_common::{CellOutcome, Segment, SkipReason};
use mr_math::conditional_mutual_information;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::align::valid_rows;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CmiResult {
    pub observed: f64,
    /// Share of permuted values at or above the observed one.
    pub p_value: f64,
    pub permutations: usize,
}

impl From<CmiResult> for CellOutcome {
    fn from(r: CmiResult) -> Self {
        CellOutcome::Computed {
            statistic: r.observed,
            p_value: r.p_value,
            df: None,
        }
    }
}

/// splitmix64 finalizer.
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Seed of one replicate.
pub fn replicate_seed(seed: u64, lag: usize, replicate: usize) -> u64 {
    seed ^ mix64(((lag as u64) << 32) ^ replicate as u64)
}

/// Aligned `(X, Y, Z)` for a lag; rows never look back across a segment.
pub fn aligned_triples(
    target: &[usize],
    source: &[usize],
    segments: &[Segment],
    lag: usize,
) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let rows = valid_rows(segments, lag.max(1));
    let x = rows.iter().map(|&t| target[t]).collect();
    let y = rows.iter().map(|&t| target[t - 1]).collect();
    let z = rows.iter().map(|&t| source[t - lag]).collect();
    (x, y, z)
}

pub fn cmi_permutation_test(
    target: &[usize],
    source: &[usize],
    segments: &[Segment],
    lag: usize,
    permutations: usize,
    seed: u64,
) -> Result<CmiResult, CellOutcome> {
    let (x, y, z) = aligned_triples(target, source, segments, lag);
    if x.len() < 2 {
        return Err(CellOutcome::skipped(
            SkipReason::InsufficientSamples,
            format!("{} aligned rows for lag {lag}", x.len()),
        ));
    }
    if permutations == 0 {
        return Err(CellOutcome::skipped(
            SkipReason::InsufficientSamples,
            "no permutations requested",
        ));
    }
    for (side, values) in [("target", &x), ("source", &z)] {
        let mut distinct = values.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() < 2 {
            return Err(CellOutcome::skipped(
                SkipReason::DegenerateTable,
                format!("{} distinct {side} state(s) in the aligned sample", distinct.len()),
            ));
        }
    }
    let observed = conditional_mutual_information(&x, &y, &z);
    if !observed.is_finite() {
        return Err(CellOutcome::skipped(
            SkipReason::DegenerateTable,
            "conditional mutual information is undefined",
        ));
    }

    let exceed = (0..permutations)
        .into_par_iter()
        .filter(|&r| {
            let mut rng = StdRng::seed_from_u64(replicate_seed(seed, lag, r));
            let mut shuffled = z.clone();
            shuffled.shuffle(&mut rng);
            conditional_mutual_information(&x, &y, &shuffled) >= observed
        })
        .count();

    Ok(CmiResult {
        observed,
        p_value: exceed as f64 / permutations as f64,
        permutations,
    })
}
