//! Cross-series causal test results.
//!
//! Every cell of the (test, direction, source column, target column, lag)
//! grid produces a [`CausalTestResult`]. Cells that cannot be computed are
//! kept in the output as [`CellOutcome::Skipped`] with a reason, so a
//! missing row never masquerades as "no evidence".

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CausalTestKind {
    /// ssr-based F test on posterior columns.
    Granger,
    /// Nested first-order Markov likelihood-ratio test on hard labels.
    MarkovLrt,
    /// Conditional mutual information with a permutation null.
    Cmi,
}

impl CausalTestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CausalTestKind::Granger => "granger",
            CausalTestKind::MarkovLrt => "markov_lrt",
            CausalTestKind::Cmi => "cmi",
        }
    }
}

impl fmt::Display for CausalTestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    SourceToTarget,
    TargetToSource,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::SourceToTarget => "source_to_target",
            Direction::TargetToSource => "target_to_source",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A contingency table with no usable degrees of freedom.
    DegenerateTable,
    /// The regression design matrix could not be inverted.
    SingularDesign,
    /// Too few aligned observations for the requested lag.
    InsufficientSamples,
    /// The dependent series never varies.
    ConstantSeries,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::DegenerateTable => "degenerate_table",
            SkipReason::SingularDesign => "singular_design",
            SkipReason::InsufficientSamples => "insufficient_samples",
            SkipReason::ConstantSeries => "constant_series",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellOutcome {
    Computed {
        statistic: f64,
        p_value: f64,
        /// Degrees of freedom; `None` for permutation tests.
        df: Option<f64>,
    },
    Skipped {
        reason: SkipReason,
        detail: String,
    },
}

impl CellOutcome {
    pub fn skipped(reason: SkipReason, detail: impl Into<String>) -> Self {
        CellOutcome::Skipped {
            reason,
            detail: detail.into(),
        }
    }

    pub fn p_value(&self) -> Option<f64> {
        match self {
            CellOutcome::Computed { p_value, .. } => Some(*p_value),
            CellOutcome::Skipped { .. } => None,
        }
    }

    pub fn statistic(&self) -> Option<f64> {
        match self {
            CellOutcome::Computed { statistic, .. } => Some(*statistic),
            CellOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CellOutcome::Skipped { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalTestResult {
    pub test: CausalTestKind,
    pub direction: Direction,
    /// Series label of the hypothesized cause.
    pub source: String,
    /// Series label of the hypothesized effect.
    pub target: String,
    pub source_column: String,
    pub target_column: String,
    pub lag: usize,
    #[serde(flatten)]
    pub outcome: CellOutcome,
}

impl CausalTestResult {
    pub fn p_value(&self) -> Option<f64> {
        self.outcome.p_value()
    }
}

/// Orders by lag, then ascending p-value with skipped cells last, then by
/// the cell coordinates so the order is total and stable across runs.
pub fn compare_results(a: &CausalTestResult, b: &CausalTestResult) -> Ordering {
    let by_p = match (a.p_value(), b.p_value()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    a.lag
        .cmp(&b.lag)
        .then(by_p)
        .then(a.test.cmp(&b.test))
        .then(a.direction.cmp(&b.direction))
        .then_with(|| a.source_column.cmp(&b.source_column))
        .then_with(|| a.target_column.cmp(&b.target_column))
}

pub fn sort_results(results: &mut [CausalTestResult]) {
    results.sort_by(compare_results);
}
