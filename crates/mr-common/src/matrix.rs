//! Feature matrices partitioned into independent contiguous segments.
//!
//! A [`FeatureMatrix`] is the hand-off between feature assembly and the
//! regime model. Rows are stored row-major. Each [`Segment`] is one
//! independent time run (a trading session, a separate file); models must
//! never carry state across a segment boundary.
//!
//! Invariants enforced at construction:
//! - every row has exactly `n_features()` values
//! - every value is finite
//! - timestamps strictly increase within each segment
//! - segments are non-empty and tile the rows in order

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A contiguous half-open run of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: usize,
    pub len: usize,
}

impl Segment {
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }
}

/// Builds segments from consecutive lengths.
pub fn segments_from_lengths(lengths: &[usize]) -> Vec<Segment> {
    let mut start = 0;
    lengths
        .iter()
        .map(|&len| {
            let seg = Segment { start, len };
            start += len;
            seg
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    timestamps: Vec<i64>,
    values: Vec<f64>,
    segments: Vec<Segment>,
}

impl FeatureMatrix {
    /// Creates a matrix from row-major values and per-segment row counts.
    pub fn new(
        names: Vec<String>,
        timestamps: Vec<i64>,
        values: Vec<f64>,
        segment_lengths: &[usize],
    ) -> Result<Self> {
        let width = names.len();
        if width == 0 {
            return Err(Error::InvalidData("feature matrix has no columns".into()));
        }
        let n_rows = timestamps.len();
        if values.len() != n_rows * width {
            return Err(Error::LengthMismatch {
                what: "values vs rows x features".into(),
                left: values.len(),
                right: n_rows * width,
            });
        }
        let covered: usize = segment_lengths.iter().sum();
        if covered != n_rows {
            return Err(Error::LengthMismatch {
                what: "segment lengths vs rows".into(),
                left: covered,
                right: n_rows,
            });
        }
        if let Some(idx) = segment_lengths.iter().position(|&l| l == 0) {
            return Err(Error::InvalidData(format!("segment {idx} is empty")));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidData(format!(
                "non-finite value at row {}, column '{}'",
                pos / width,
                names[pos % width]
            )));
        }
        let segments = segments_from_lengths(segment_lengths);
        for (idx, seg) in segments.iter().enumerate() {
            let ts = &timestamps[seg.range()];
            if let Some(off) = ts.windows(2).position(|w| w[1] <= w[0]) {
                return Err(Error::NonIncreasingTimestamp {
                    segment: idx,
                    row: seg.start + off + 1,
                });
            }
        }
        Ok(Self {
            names,
            timestamps,
            values,
            segments,
        })
    }

    /// Creates a matrix from explicit rows, failing fast on a row whose
    /// width differs from the column count.
    pub fn from_rows(
        names: Vec<String>,
        timestamps: Vec<i64>,
        rows: &[Vec<f64>],
        segment_lengths: &[usize],
    ) -> Result<Self> {
        let width = names.len();
        let segments = segments_from_lengths(segment_lengths);
        let mut values = Vec::with_capacity(rows.len() * width);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                let segment = segments
                    .iter()
                    .position(|s| s.range().contains(&i))
                    .unwrap_or(segments.len());
                return Err(Error::InconsistentWidth {
                    expected: width,
                    actual: row.len(),
                    segment,
                });
            }
            values.extend_from_slice(row);
        }
        Self::new(names, timestamps, values, segment_lengths)
    }

    /// Single-segment convenience constructor.
    pub fn single_segment(
        names: Vec<String>,
        timestamps: Vec<i64>,
        values: Vec<f64>,
    ) -> Result<Self> {
        let n = timestamps.len();
        let lengths = if n == 0 { vec![] } else { vec![n] };
        Self::new(names, timestamps, values, &lengths)
    }

    /// Stacks several matrices; each keeps its own segments.
    pub fn concat(parts: Vec<FeatureMatrix>) -> Result<Self> {
        let mut iter = parts.into_iter();
        let Some(first) = iter.next() else {
            return Err(Error::InvalidData("no feature matrices to combine".into()));
        };
        let FeatureMatrix {
            names,
            mut timestamps,
            mut values,
            segments,
        } = first;
        let mut lengths: Vec<usize> = segments.iter().map(|s| s.len).collect();
        for part in iter {
            if part.n_features() != names.len() {
                return Err(Error::InconsistentWidth {
                    expected: names.len(),
                    actual: part.n_features(),
                    segment: lengths.len(),
                });
            }
            if part.names != names {
                return Err(Error::InvalidData(format!(
                    "column names differ between segments: {:?} vs {:?}",
                    names, part.names
                )));
            }
            lengths.extend(part.segments.iter().map(|s| s.len));
            timestamps.extend(part.timestamps);
            values.extend(part.values);
        }
        Self::new(names, timestamps, values, &lengths)
    }

    /// Same rows, timestamps and segments with new column values.
    pub fn with_values(&self, names: Vec<String>, values: Vec<f64>) -> Result<Self> {
        let lengths: Vec<usize> = self.segments.iter().map(|s| s.len).collect();
        Self::new(names, self.timestamps.clone(), values, &lengths)
    }

    /// Keeps the given rows in order.
    ///
    /// A new segment starts wherever the original segment changes or the
    /// selected rows stop being adjacent, so the result stays gap-free.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self> {
        let ids = self.segment_ids();
        let width = self.n_features();
        let mut timestamps = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len() * width);
        let mut lengths: Vec<usize> = Vec::new();
        let mut prev: Option<usize> = None;
        for &r in rows {
            if r >= self.n_rows() {
                return Err(Error::InvalidData(format!("row {r} out of bounds")));
            }
            match prev {
                Some(p) if r == p + 1 && ids[r] == ids[p] => {
                    if let Some(last) = lengths.last_mut() {
                        *last += 1;
                    }
                }
                _ => lengths.push(1),
            }
            timestamps.push(self.timestamps[r]);
            values.extend_from_slice(self.row(r));
            prev = Some(r);
        }
        Self::new(self.names.clone(), timestamps, values, &lengths)
    }

    pub fn n_rows(&self) -> usize {
        self.timestamps.len()
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Row-major backing storage.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let w = self.n_features();
        &self.values[i * w..(i + 1) * w]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks_exact(self.n_features())
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows().map(|r| r[j]).collect()
    }

    /// Segment index of each row.
    pub fn segment_ids(&self) -> Vec<usize> {
        let mut ids = vec![0; self.n_rows()];
        for (idx, seg) in self.segments.iter().enumerate() {
            ids[seg.range()].fill(idx);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn builds_segments_in_order() {
        let m = FeatureMatrix::new(
            names(2),
            vec![1, 2, 3, 10, 11],
            (0..10).map(f64::from).collect(),
            &[3, 2],
        )
        .unwrap();
        assert_eq!(m.n_rows(), 5);
        assert_eq!(m.segments()[1], Segment { start: 3, len: 2 });
        assert_eq!(m.row(3), &[6.0, 7.0]);
        assert_eq!(m.column(1), vec![1.0, 3.0, 5.0, 7.0, 9.0]);
        assert_eq!(m.segment_ids(), vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn timestamps_may_reset_across_segments_but_not_within() {
        assert!(FeatureMatrix::new(names(1), vec![5, 6, 1, 2], vec![0.0; 4], &[2, 2]).is_ok());
        let err = FeatureMatrix::new(names(1), vec![5, 6, 6, 7], vec![0.0; 4], &[4]).unwrap_err();
        assert!(matches!(err, Error::NonIncreasingTimestamp { segment: 0, row: 2 }));
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = FeatureMatrix::single_segment(names(2), vec![1, 2], vec![0.0, 1.0, f64::NAN, 2.0])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn inconsistent_row_width_fails_fast() {
        let rows = vec![vec![1.0, 2.0], vec![1.0, 2.0], vec![3.0]];
        let err = FeatureMatrix::from_rows(names(2), vec![1, 2, 3], &rows, &[2, 1]).unwrap_err();
        assert!(matches!(
            err,
            Error::InconsistentWidth {
                expected: 2,
                actual: 1,
                segment: 1
            }
        ));
    }

    #[test]
    fn concat_checks_widths() {
        let a = FeatureMatrix::single_segment(names(2), vec![1], vec![0.0, 0.0]).unwrap();
        let b = FeatureMatrix::single_segment(names(3), vec![1], vec![0.0; 3]).unwrap();
        assert!(matches!(
            FeatureMatrix::concat(vec![a.clone(), b]),
            Err(Error::InconsistentWidth { .. })
        ));
        let joined = FeatureMatrix::concat(vec![a.clone(), a]).unwrap();
        assert_eq!(joined.segments().len(), 2);
    }

    #[test]
    fn select_rows_splits_on_gaps() {
        let m = FeatureMatrix::new(names(1), vec![1, 2, 3, 4, 5], vec![0.0; 5], &[5]).unwrap();
        let s = m.select_rows(&[0, 1, 3, 4]).unwrap();
        assert_eq!(s.segments().len(), 2);
        assert_eq!(s.timestamps(), &[1, 2, 4, 5]);
    }
}
