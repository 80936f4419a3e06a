//! Plug-in information measures over discrete label sequences, in nats.
//!
//! Labels are small non-negative integers (regime indices), so contingency
//! tables are dense. Mutual information is clipped at zero, which matches the
//! usual plug-in estimator; conditional mutual information is a difference of
//! two such terms and is left unclipped.

/// Dense contingency table of two aligned label sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct Contingency {
    rows: usize,
    cols: usize,
    counts: Vec<u64>,
    total: u64,
}

impl Contingency {
    /// Builds the table; `None` when the inputs differ in length.
    pub fn from_labels(x: &[usize], y: &[usize]) -> Option<Self> {
        if x.len() != y.len() {
            return None;
        }
        let rows = x.iter().copied().max().map_or(0, |m| m + 1);
        let cols = y.iter().copied().max().map_or(0, |m| m + 1);
        let mut counts = vec![0u64; rows * cols];
        for (&a, &b) in x.iter().zip(y) {
            counts[a * cols + b] += 1;
        }
        Some(Self {
            rows,
            cols,
            counts,
            total: x.len() as u64,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.counts[row * self.cols + col]
    }

    pub fn row_sums(&self) -> Vec<u64> {
        (0..self.rows)
            .map(|r| self.counts[r * self.cols..(r + 1) * self.cols].iter().sum())
            .collect()
    }

    pub fn col_sums(&self) -> Vec<u64> {
        let mut sums = vec![0u64; self.cols];
        for r in 0..self.rows {
            for (c, s) in sums.iter_mut().enumerate() {
                *s += self.counts[r * self.cols + c];
            }
        }
        sums
    }

    /// Plug-in mutual information of the two margins.
    pub fn mutual_information(&self) -> f64 {
        if self.total == 0 {
            return f64::NAN;
        }
        let n = self.total as f64;
        let rs = self.row_sums();
        let cs = self.col_sums();
        let mut mi = 0.0;
        for r in 0..self.rows {
            if rs[r] == 0 {
                continue;
            }
            for c in 0..self.cols {
                let nij = self.counts[r * self.cols + c];
                if nij == 0 {
                    continue;
                }
                let nij = nij as f64;
                mi += nij / n * (nij * n / (rs[r] as f64 * cs[c] as f64)).ln();
            }
        }
        mi.max(0.0)
    }
}

/// Shannon entropy of a label sequence. NaN for empty input.
pub fn entropy(labels: &[usize]) -> f64 {
    if labels.is_empty() {
        return f64::NAN;
    }
    let size = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut counts = vec![0u64; size];
    for &l in labels {
        counts[l] += 1;
    }
    let n = labels.len() as f64;
    -counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            p * p.ln()
        })
        .sum::<f64>()
}

/// Mutual information `I(X; Y)`.
///
/// NaN when the sequences are empty or differ in length.
pub fn mutual_information(x: &[usize], y: &[usize]) -> f64 {
    Contingency::from_labels(x, y).map_or(f64::NAN, |t| t.mutual_information())
}

/// Injective pairing of two label sequences: `y · (max(z) + 1) + z`.
pub fn joint_encode(y: &[usize], z: &[usize]) -> Vec<usize> {
    let width = z.iter().copied().max().map_or(1, |m| m + 1);
    y.iter().zip(z).map(|(&a, &b)| a * width + b).collect()
}

/// Conditional mutual information `I(X; Z | Y) = I(X; (Y, Z)) - I(X; Y)`.
pub fn conditional_mutual_information(x: &[usize], y: &[usize], z: &[usize]) -> f64 {
    if x.len() != y.len() || y.len() != z.len() {
        return f64::NAN;
    }
    mutual_information(x, &joint_encode(y, z)) - mutual_information(x, y)
}
