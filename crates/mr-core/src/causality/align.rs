//! Lag alignment inside segments.
//!
//! Pairing `target[t]` with `source[t - lag]` keeps only rows whose
//! look-back stays inside the same segment. The first `depth` rows of every
//! segment are dropped rather than padded.

use mr_common::{PosteriorMatrix, RegimeSequence, Segment};
use serde::{Deserialize, Serialize};

use super::CausalError;

/// Rows `t` for which `t - depth` lies in the same segment as `t`.
pub fn valid_rows(segments: &[Segment], depth: usize) -> Vec<usize> {
    segments
        .iter()
        .filter(|seg| seg.len > depth)
        .flat_map(|seg| seg.start + depth..seg.end())
        .collect()
}

/// One instrument's decoded regimes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSeries {
    pub label: String,
    pub labels: RegimeSequence,
    pub posteriors: PosteriorMatrix,
}

impl RegimeSeries {
    pub fn new(
        label: impl Into<String>,
        labels: RegimeSequence,
        posteriors: PosteriorMatrix,
    ) -> Result<Self, CausalError> {
        let label = label.into();
        if labels.len() != posteriors.n_rows() || labels.n_states() != posteriors.n_states() {
            return Err(CausalError::ShapeMismatch {
                series: label,
                labels: labels.len(),
                posterior_rows: posteriors.n_rows(),
            });
        }
        Ok(Self {
            label,
            labels,
            posteriors,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Keeps the given row positions, in order.
    pub fn select(&self, positions: &[usize]) -> Self {
        Self {
            label: self.label.clone(),
            labels: self.labels.select(positions),
            posteriors: self.posteriors.select(positions),
        }
    }
}

/// Source and target on a shared time grid with shared segments.
#[derive(Debug, Clone)]
pub struct AlignedPair {
    pub source: RegimeSeries,
    pub target: RegimeSeries,
    pub segments: Vec<Segment>,
}

impl AlignedPair {
    pub fn new(
        source: RegimeSeries,
        target: RegimeSeries,
        segments: Vec<Segment>,
    ) -> Result<Self, CausalError> {
        if source.len() != target.len() {
            return Err(CausalError::LengthMismatch {
                source_rows: source.len(),
                target_rows: target.len(),
            });
        }
        if source.is_empty() {
            return Err(CausalError::Empty);
        }
        let mut next = 0;
        for seg in &segments {
            if seg.start != next || seg.len == 0 {
                return Err(CausalError::InvalidSegments(format!(
                    "segment starting at {} does not continue at row {next}",
                    seg.start
                )));
            }
            next = seg.end();
        }
        if next != source.len() {
            return Err(CausalError::InvalidSegments(format!(
                "segments cover {next} of {} rows",
                source.len()
            )));
        }
        Ok(Self {
            source,
            target,
            segments,
        })
    }

    /// A pair treated as one uninterrupted run.
    pub fn contiguous(source: RegimeSeries, target: RegimeSeries) -> Result<Self, CausalError> {
        let n = source.len();
        Self::new(source, target, vec![Segment { start: 0, len: n }])
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

/// Inner join of two sorted timestamp vectors: matching positions in each.
pub fn intersect_timestamps(left: &[i64], right: &[i64]) -> (Vec<usize>, Vec<usize>) {
    let (mut i, mut j) = (0, 0);
    let (mut li, mut ri) = (Vec::new(), Vec::new());
    while i < left.len() && j < right.len() {
        match left[i].cmp(&right[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                li.push(i);
                ri.push(j);
                i += 1;
                j += 1;
            }
        }
    }
    (li, ri)
}

/// Segments of the kept rows: runs of consecutive positions that came from
/// one original segment.
pub fn segments_of_selection(positions: &[usize], segment_ids: &[usize]) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();
    let mut previous: Option<(usize, usize)> = None;
    for (k, &p) in positions.iter().enumerate() {
        let id = segment_ids[p];
        let continues = matches!(
            previous,
            Some((prev_pos, prev_id)) if prev_id == id && p == prev_pos + 1
        );
        match out.last_mut() {
            Some(seg) if continues => seg.len += 1,
            _ => out.push(Segment { start: k, len: 1 }),
        }
        previous = Some((p, id));
    }
    out
}
