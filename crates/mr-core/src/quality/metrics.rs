//! Cluster-separation scores over labeled rows.
//!
//! Inputs are row-major values with `n_features` columns and one label per
//! row. Only labels that actually occur count as clusters. Each score
//! refuses to run when fewer than two clusters are present or a present
//! cluster has a single member.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use super::QualityError;

/// Present clusters as `(label, member rows)`, validated.
fn clusters(labels: &[usize]) -> Result<Vec<(usize, Vec<usize>)>, QualityError> {
    let k = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (row, &l) in labels.iter().enumerate() {
        members[l].push(row);
    }
    let present: Vec<(usize, Vec<usize>)> = members
        .into_iter()
        .enumerate()
        .filter(|(_, m)| !m.is_empty())
        .collect();
    if present.len() < 2 {
        return Err(QualityError::SingleRegime {
            present: present.len(),
        });
    }
    if let Some((label, _)) = present.iter().find(|(_, m)| m.len() < 2) {
        return Err(QualityError::SingletonRegime { label: *label });
    }
    Ok(present)
}

fn row(values: &[f64], f: usize, i: usize) -> &[f64] {
    &values[i * f..(i + 1) * f]
}

fn dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn centroid(values: &[f64], f: usize, rows: &[usize]) -> Vec<f64> {
    let mut c = vec![0.0; f];
    for &r in rows {
        for (acc, x) in c.iter_mut().zip(row(values, f, r)) {
            *acc += x;
        }
    }
    c.iter_mut().for_each(|v| *v /= rows.len() as f64);
    c
}

/// Mean silhouette coefficient, Euclidean.
///
/// With `sample_size` below the row count a seeded random subset is scored,
/// and clusters are re-validated on that subset.
pub fn silhouette(
    values: &[f64],
    n_features: usize,
    labels: &[usize],
    sample_size: Option<usize>,
    seed: u64,
) -> Result<f64, QualityError> {
    clusters(labels)?;
    let n = labels.len();
    let rows: Vec<usize> = match sample_size {
        Some(size) if size < n => {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut picked = rand::seq::index::sample(&mut rng, n, size).into_vec();
            picked.sort_unstable();
            picked
        }
        _ => (0..n).collect(),
    };
    let sub_labels: Vec<usize> = rows.iter().map(|&r| labels[r]).collect();
    let present = clusters(&sub_labels)?;
    let k = sub_labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; k];
    for (label, members) in &present {
        sizes[*label] = members.len();
    }

    let scores: Vec<f64> = (0..rows.len())
        .into_par_iter()
        .map(|i| {
            let xi = row(values, n_features, rows[i]);
            let mut sums = vec![0.0; k];
            for (j, &r) in rows.iter().enumerate() {
                if j != i {
                    sums[sub_labels[j]] += dist(xi, row(values, n_features, r));
                }
            }
            let own = sub_labels[i];
            let a = sums[own] / (sizes[own] - 1) as f64;
            let b = (0..k)
                .filter(|&c| c != own && sizes[c] > 0)
                .map(|c| sums[c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .collect();
    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Davies–Bouldin index; lower means better separated.
pub fn davies_bouldin(
    values: &[f64],
    n_features: usize,
    labels: &[usize],
) -> Result<f64, QualityError> {
    let present = clusters(labels)?;
    let centroids: Vec<Vec<f64>> = present
        .iter()
        .map(|(_, m)| centroid(values, n_features, m))
        .collect();
    let scatter: Vec<f64> = present
        .iter()
        .zip(&centroids)
        .map(|((_, m), c)| {
            m.iter()
                .map(|&r| dist(row(values, n_features, r), c))
                .sum::<f64>()
                / m.len() as f64
        })
        .collect();
    let n_clusters = present.len();
    let mut total = 0.0;
    for i in 0..n_clusters {
        let mut worst = 0.0f64;
        for j in 0..n_clusters {
            if i == j {
                continue;
            }
            let sep = dist(&centroids[i], &centroids[j]);
            // Coincident centroids contribute nothing.
            if sep > 0.0 {
                worst = worst.max((scatter[i] + scatter[j]) / sep);
            }
        }
        total += worst;
    }
    Ok(total / n_clusters as f64)
}

/// Calinski–Harabasz variance ratio; higher means better separated.
pub fn calinski_harabasz(
    values: &[f64],
    n_features: usize,
    labels: &[usize],
) -> Result<f64, QualityError> {
    let present = clusters(labels)?;
    let n = labels.len();
    let all: Vec<usize> = (0..n).collect();
    let grand = centroid(values, n_features, &all);
    let mut between = 0.0;
    let mut within = 0.0;
    for (_, members) in &present {
        let c = centroid(values, n_features, members);
        let d = dist(&c, &grand);
        between += members.len() as f64 * d * d;
        for &r in members {
            let e = dist(row(values, n_features, r), &c);
            within += e * e;
        }
    }
    if within == 0.0 {
        return Err(QualityError::ZeroDispersion);
    }
    let k = present.len() as f64;
    Ok(between * (n as f64 - k) / (within * (k - 1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two tight 1-D clusters at 0 and 10.
    fn two_clusters() -> (Vec<f64>, Vec<usize>) {
        (vec![0.0, 1.0, 10.0, 11.0], vec![0, 0, 1, 1])
    }

    #[test]
    fn silhouette_reference_value() {
        let (v, l) = two_clusters();
        // Point 0: a = 1, b = (10 + 11) / 2 = 10.5 -> 9.5 / 10.5
        // Point 1: a = 1, b = 9.5 -> 8.5 / 9.5 (and symmetric for cluster 1)
        let expected = (9.5 / 10.5 + 8.5 / 9.5) / 2.0;
        let s = silhouette(&v, 1, &l, None, 0).unwrap();
        assert!((s - expected).abs() < 1e-12);
    }

    #[test]
    fn sampled_silhouette_is_seeded() {
        let values: Vec<f64> = (0..400)
            .map(|i| (i / 200) as f64 * 5.0 + (i % 13) as f64 * 0.1)
            .collect();
        let labels: Vec<usize> = (0..400).map(|i| i / 200).collect();
        let a = silhouette(&values, 1, &labels, Some(100), 7).unwrap();
        let b = silhouette(&values, 1, &labels, Some(100), 7).unwrap();
        assert_eq!(a, b);
        assert!(a > 0.5);
    }

    #[test]
    fn davies_bouldin_reference_value() {
        let (v, l) = two_clusters();
        // scatter 0.5 each, centroids 0.5 and 10.5
        let db = davies_bouldin(&v, 1, &l).unwrap();
        assert!((db - 0.1).abs() < 1e-12);
    }

    #[test]
    fn calinski_harabasz_reference_value() {
        let (v, l) = two_clusters();
        // between = 2·25 + 2·25 = 100, within = 4·0.25 = 1, (n-k)/(k-1) = 2
        let ch = calinski_harabasz(&v, 1, &l).unwrap();
        assert!((ch - 200.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_labelings_are_errors() {
        let v = vec![0.0, 1.0, 2.0];
        assert!(matches!(
            silhouette(&v, 1, &[0, 0, 0], None, 0),
            Err(QualityError::SingleRegime { present: 1 })
        ));
        assert!(matches!(
            davies_bouldin(&v, 1, &[0, 0, 2]),
            Err(QualityError::SingletonRegime { label: 2 })
        ));
        assert!(matches!(
            calinski_harabasz(&[1.0, 1.0, 2.0, 2.0], 1, &[0, 0, 1, 1]),
            Err(QualityError::ZeroDispersion)
        ));
    }
}
