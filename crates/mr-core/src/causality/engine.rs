//! Runs every enabled test over the (direction, column, lag) grid.

use mr_common::{
    sort_results, CausalTestKind, CausalTestResult, CellOutcome, Direction, RunId, Segment,
};
use mr_config::CausalityConfig;
use mr_tables::posterior_column;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::align::{AlignedPair, RegimeSeries};
use super::cmi::cmi_permutation_test;
use super::diagnostics::{co_occurrence, lagged_cross_correlation, CrossCorrelation};
use super::granger::granger_test;
use super::markov::markov_lrt;
use super::CausalError;
use crate::logging::event_names;

/// Column name used for hard-label tests.
pub const LABEL_COLUMN: &str = "regime";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairDiagnostics {
    /// Source state by target state counts over the aligned rows.
    pub co_occurrence: Vec<Vec<u64>>,
    pub cross_correlation: Vec<CrossCorrelation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalReport {
    pub run_id: RunId,
    pub source: String,
    pub target: String,
    pub n_rows: usize,
    pub n_segments: usize,
    /// Sorted by lag, then ascending p-value with skipped cells last.
    pub results: Vec<CausalTestResult>,
    pub diagnostics: PairDiagnostics,
}

impl CausalReport {
    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_skipped()).count()
    }

    /// Computed cells with `p < alpha`, in report order.
    pub fn significant(&self, alpha: f64) -> impl Iterator<Item = &CausalTestResult> {
        self.results
            .iter()
            .filter(move |r| r.p_value().is_some_and(|p| p < alpha))
    }
}

#[derive(Debug, Clone, Copy)]
enum Cell {
    Granger {
        direction: Direction,
        cause_col: usize,
        effect_col: usize,
        lag: usize,
    },
    MarkovLrt {
        direction: Direction,
        lag: usize,
    },
    Cmi {
        direction: Direction,
        lag: usize,
    },
}

pub struct CausalSignificanceEngine {
    config: CausalityConfig,
}

impl CausalSignificanceEngine {
    pub fn new(config: CausalityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CausalityConfig {
        &self.config
    }

    /// Runs the grid, on a dedicated pool when `workers` is configured.
    pub fn run(&self, pair: &AlignedPair, run_id: &RunId) -> Result<CausalReport, CausalError> {
        match self.config.workers {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| CausalError::ThreadPool(e.to_string()))?;
                Ok(pool.install(|| self.run_on_current_pool(pair, run_id)))
            }
            None => Ok(self.run_on_current_pool(pair, run_id)),
        }
    }

    fn run_on_current_pool(&self, pair: &AlignedPair, run_id: &RunId) -> CausalReport {
        let cells = self.cells(pair);
        let mut results: Vec<CausalTestResult> = cells
            .par_iter()
            .map(|cell| self.evaluate(pair, *cell))
            .collect();
        sort_results(&mut results);

        for r in results.iter().filter(|r| r.outcome.is_skipped()) {
            if let CellOutcome::Skipped { reason, detail } = &r.outcome {
                debug!(
                    event = event_names::CAUSALITY_CELL_SKIPPED,
                    test = %r.test,
                    direction = %r.direction,
                    source_column = %r.source_column,
                    target_column = %r.target_column,
                    lag = r.lag,
                    reason = %reason,
                    detail = %detail,
                    "cell skipped"
                );
            }
        }
        let report = CausalReport {
            run_id: run_id.clone(),
            source: pair.source.label.clone(),
            target: pair.target.label.clone(),
            n_rows: pair.len(),
            n_segments: pair.segments.len(),
            diagnostics: self.diagnostics(pair),
            results,
        };
        info!(
            event = event_names::CAUSALITY_COMPLETED,
            source = %report.source,
            target = %report.target,
            cells = report.results.len(),
            skipped = report.skipped(),
            "causality grid evaluated"
        );
        report
    }

    fn cells(&self, pair: &AlignedPair) -> Vec<Cell> {
        let c = &self.config;
        let ks = pair.source.posteriors.n_states();
        let kt = pair.target.posteriors.n_states();
        let mut cells = Vec::new();
        for direction in [Direction::SourceToTarget, Direction::TargetToSource] {
            if c.granger {
                let (k_cause, k_effect) = match direction {
                    Direction::SourceToTarget => (ks, kt),
                    Direction::TargetToSource => (kt, ks),
                };
                for cause_col in 0..k_cause {
                    for effect_col in 0..k_effect {
                        for lag in 1..=c.max_lag {
                            cells.push(Cell::Granger {
                                direction,
                                cause_col,
                                effect_col,
                                lag,
                            });
                        }
                    }
                }
            }
            if c.markov_lrt {
                cells.extend((1..=c.markov_max_lag).map(|lag| Cell::MarkovLrt { direction, lag }));
            }
            if c.cmi {
                cells.extend((1..=c.cmi_max_lag).map(|lag| Cell::Cmi { direction, lag }));
            }
        }
        cells
    }

    fn evaluate(&self, pair: &AlignedPair, cell: Cell) -> CausalTestResult {
        let segments: &[Segment] = &pair.segments;
        let (test, direction, cause_column, effect_column, lag, outcome) = match cell {
            Cell::Granger {
                direction,
                cause_col,
                effect_col,
                lag,
            } => {
                let (cause, effect) = oriented(pair, direction);
                let x = cause.posteriors.column(cause_col);
                let y = effect.posteriors.column(effect_col);
                (
                    CausalTestKind::Granger,
                    direction,
                    posterior_column(cause_col),
                    posterior_column(effect_col),
                    lag,
                    granger_test(&y, &x, segments, lag),
                )
            }
            Cell::MarkovLrt { direction, lag } => {
                let (cause, effect) = oriented(pair, direction);
                let outcome = markov_lrt(
                    effect.labels.labels(),
                    cause.labels.labels(),
                    effect.labels.n_states(),
                    cause.labels.n_states(),
                    segments,
                    lag,
                );
                (
                    CausalTestKind::MarkovLrt,
                    direction,
                    LABEL_COLUMN.to_string(),
                    LABEL_COLUMN.to_string(),
                    lag,
                    outcome,
                )
            }
            Cell::Cmi { direction, lag } => {
                let (cause, effect) = oriented(pair, direction);
                let outcome = cmi_permutation_test(
                    effect.labels.labels(),
                    cause.labels.labels(),
                    segments,
                    lag,
                    self.config.permutations,
                    self.cmi_seed(direction),
                )
                .map_or_else(|skipped| skipped, CellOutcome::from);
                (
                    CausalTestKind::Cmi,
                    direction,
                    LABEL_COLUMN.to_string(),
                    LABEL_COLUMN.to_string(),
                    lag,
                    outcome,
                )
            }
        };
        let (cause, effect) = oriented(pair, direction);
        CausalTestResult {
            test,
            direction,
            source: cause.label.clone(),
            target: effect.label.clone(),
            source_column: cause_column,
            target_column: effect_column,
            lag,
            outcome,
        }
    }

    /// Reverse direction draws from a distinct stream.
    fn cmi_seed(&self, direction: Direction) -> u64 {
        match direction {
            Direction::SourceToTarget => self.config.cmi_seed,
            Direction::TargetToSource => self.config.cmi_seed.rotate_left(32) ^ 0x5bd1_e995,
        }
    }

    fn diagnostics(&self, pair: &AlignedPair) -> PairDiagnostics {
        let ks = pair.source.labels.n_states();
        let kt = pair.target.labels.n_states();
        let co = co_occurrence(pair.source.labels.labels(), pair.target.labels.labels(), ks, kt);
        let mut cross_correlation = Vec::with_capacity(ks * kt);
        for s in 0..ks {
            let x = pair.source.posteriors.column(s);
            for t in 0..kt {
                let y = pair.target.posteriors.column(t);
                let (lags, values) =
                    lagged_cross_correlation(&x, &y, &pair.segments, self.config.max_lag);
                cross_correlation.push(CrossCorrelation {
                    source_column: posterior_column(s),
                    target_column: posterior_column(t),
                    lags,
                    values,
                });
            }
        }
        PairDiagnostics {
            co_occurrence: co,
            cross_correlation,
        }
    }
}

/// `(cause, effect)` for a direction.
fn oriented(pair: &AlignedPair, direction: Direction) -> (&RegimeSeries, &RegimeSeries) {
    match direction {
        Direction::SourceToTarget => (&pair.source, &pair.target),
        Direction::TargetToSource => (&pair.target, &pair.source),
    }
}
