//! Nested first-order Markov likelihood-ratio test on hard labels.
//!
//! Model 0 predicts `target[t]` from `target[t-1]`; Model 1 conditions
//! additionally on `source[t-lag]`. Both are fit by normalized counts on the
//! same aligned rows, and `Λ = 2 (ln L1 - ln L0)` is referred to
//! `χ²((K_t - 1) K_t (K_s - 1))`.

use mr_common::{CellOutcome, Segment, SkipReason};
use mr_math::{chi_squared_sf, xlogy};

use super::align::valid_rows;

/// Multinomial log-likelihood of a table whose rows are conditioning
/// contexts. Empty rows contribute zero.
fn table_log_likelihood(counts: &[f64], width: usize) -> f64 {
    counts
        .chunks_exact(width)
        .map(|row| {
            let total: f64 = row.iter().sum();
            if total == 0.0 {
                0.0
            } else {
                row.iter().map(|&c| xlogy(c, c / total)).sum()
            }
        })
        .sum()
}

/// Does `source` lagged by `lag` explain target transitions?
///
/// `k_target` and `k_source` are the model state counts, which fix the
/// degrees of freedom whether or not every state is observed.
pub fn markov_lrt(
    target: &[usize],
    source: &[usize],
    k_target: usize,
    k_source: usize,
    segments: &[Segment],
    lag: usize,
) -> CellOutcome {
    let df = k_target.saturating_sub(1) * k_target * k_source.saturating_sub(1);
    if df == 0 {
        return CellOutcome::skipped(
            SkipReason::DegenerateTable,
            format!("no degrees of freedom with {k_target} target and {k_source} source states"),
        );
    }
    let rows = valid_rows(segments, lag.max(1));
    if rows.is_empty() {
        return CellOutcome::skipped(
            SkipReason::InsufficientSamples,
            format!("no aligned rows for lag {lag}"),
        );
    }

    let mut seen = vec![false; k_target];
    let mut seen_source = vec![false; k_source];
    let mut m0 = vec![0.0; k_target * k_target];
    // Contexts are (prev, source) pairs; columns are the next target state.
    let mut m1 = vec![0.0; k_target * k_source * k_target];
    for &t in &rows {
        let (prev, next, s) = (target[t - 1], target[t], source[t - lag]);
        if prev >= k_target || next >= k_target || s >= k_source {
            return CellOutcome::skipped(
                SkipReason::DegenerateTable,
                format!("label out of range at row {t}"),
            );
        }
        seen[next] = true;
        seen_source[s] = true;
        m0[prev * k_target + next] += 1.0;
        m1[(prev * k_source + s) * k_target + next] += 1.0;
    }
    let distinct = seen.iter().filter(|&&s| s).count();
    if distinct < 2 {
        return CellOutcome::skipped(
            SkipReason::DegenerateTable,
            format!("{distinct} distinct target state(s) in the aligned sample"),
        );
    }
    let distinct_source = seen_source.iter().filter(|&&s| s).count();
    if distinct_source < 2 {
        return CellOutcome::skipped(
            SkipReason::DegenerateTable,
            format!("{distinct_source} distinct source state(s) in the aligned sample"),
        );
    }

    let ll0 = table_log_likelihood(&m0, k_target);
    let ll1 = table_log_likelihood(&m1, k_target);
    let statistic = (2.0 * (ll1 - ll0)).max(0.0);
    let df = df as f64;
    CellOutcome::Computed {
        statistic,
        p_value: chi_squared_sf(statistic, df),
        df: Some(df),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mr_common::segments_from_lengths;

    #[test]
    fn hand_computed_statistic() {
        // Target alternates with the source lagged by one; Model 1 is perfect.
        let source = [0, 1, 1, 0, 1, 0, 0, 1, 0, 1];
        let mut target = [0usize; 10];
        for t in 1..10 {
            target[t] = source[t - 1];
        }
        let segs = segments_from_lengths(&[10]);
        let out = markov_lrt(&target, &source, 2, 2, &segs, 1);
        let CellOutcome::Computed { statistic, df, .. } = out else {
            panic!("expected a computed cell");
        };
        assert_eq!(df, Some(2.0));
        // Model 1 log-likelihood is 0; the statistic is -2 ln L0.
        let t = &target;
        let mut m0 = vec![0.0; 4];
        for i in 1..10 {
            m0[t[i - 1] * 2 + t[i]] += 1.0;
        }
        let expected = -2.0 * table_log_likelihood(&m0, 2);
        assert!((statistic - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_count_rows_contribute_nothing() {
        assert_eq!(table_log_likelihood(&[0.0, 0.0, 3.0, 0.0], 2), 0.0);
        let ll = table_log_likelihood(&[1.0, 1.0], 2);
        assert!((ll - 2.0 * 0.5f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn degenerate_tables_are_skipped() {
        let segs = segments_from_lengths(&[6]);
        let flat = [1usize; 6];
        let src = [0usize, 1, 0, 1, 0, 1];
        assert!(matches!(
            markov_lrt(&flat, &src, 3, 2, &segs, 1),
            CellOutcome::Skipped { reason: SkipReason::DegenerateTable, .. }
        ));
        assert!(matches!(
            markov_lrt(&src, &src, 2, 1, &segs, 1),
            CellOutcome::Skipped { reason: SkipReason::DegenerateTable, .. }
        ));
        assert!(matches!(
            markov_lrt(&src, &src, 2, 2, &segs, 6),
            CellOutcome::Skipped { reason: SkipReason::InsufficientSamples, .. }
        ));
    }

    #[test]
    fn constant_source_is_skipped_not_scored() {
        let segs = segments_from_lengths(&[500]);
        let target: Vec<usize> = (0..500).map(|i| (i * 7 + i / 3) % 3).collect();
        let source = vec![0usize; 500];
        assert!(matches!(
            markov_lrt(&target, &source, 3, 3, &segs, 1),
            CellOutcome::Skipped { reason: SkipReason::DegenerateTable, .. }
        ));
        // The lagged window decides, not the full series.
        let mut late_switch = vec![0usize; 500];
        late_switch[499] = 1;
        assert!(matches!(
            markov_lrt(&target, &late_switch, 3, 2, &segs, 1),
            CellOutcome::Skipped { reason: SkipReason::DegenerateTable, .. }
        ));
    }
}
