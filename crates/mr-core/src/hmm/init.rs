//! Starting parameters for EM.
//!
//! All randomness comes from the caller's RNG; nothing here touches a
//! global or thread-local generator.

use mr_common::{CovarianceType, FeatureMatrix};
use mr_config::TransitionInit;
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::Exp1;

use super::{HmmError, Result};

const KMEANS_MAX_ITER: usize = 100;
/// Centroid shift, relative to the overall spread of the data, that ends
/// Lloyd iterations.
const KMEANS_TOL: f64 = 1e-6;

/// Seeded k-means++ centroids refined by Lloyd iterations.
pub fn kmeans_means<R: Rng + ?Sized>(
    data: &FeatureMatrix,
    k: usize,
    rng: &mut R,
) -> Result<Vec<Vec<f64>>> {
    let n = data.n_rows();
    if n < k {
        return Err(HmmError::InsufficientData { rows: n, states: k });
    }
    let mut centroids = plus_plus_centroids(data, k, rng);
    let f = data.n_features();
    let spread = feature_floors(data, 1.0).iter().sum::<f64>().sqrt();
    let mut assignments = vec![0usize; n];
    for _ in 0..KMEANS_MAX_ITER {
        for (i, row) in data.rows().enumerate() {
            assignments[i] = nearest(row, &centroids).0;
        }
        let mut sums = vec![vec![0.0; f]; k];
        let mut counts = vec![0usize; k];
        for (row, &c) in data.rows().zip(&assignments) {
            counts[c] += 1;
            for (s, x) in sums[c].iter_mut().zip(row) {
                *s += x;
            }
        }
        let mut max_shift = 0.0f64;
        for c in 0..k {
            if counts[c] == 0 {
                // Empty cluster keeps its previous centroid.
                continue;
            }
            let updated: Vec<f64> = sums[c].iter().map(|s| s / counts[c] as f64).collect();
            max_shift = max_shift.max(sq_dist(&updated, &centroids[c]).sqrt());
            centroids[c] = updated;
        }
        if max_shift < KMEANS_TOL * spread {
            break;
        }
    }
    Ok(centroids)
}

fn plus_plus_centroids<R: Rng + ?Sized>(
    data: &FeatureMatrix,
    k: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    let n = data.n_rows();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data.row(rng.random_range(0..n)).to_vec());
    let mut dist: Vec<f64> = data.rows().map(|r| sq_dist(r, &centroids[0])).collect();
    while centroids.len() < k {
        let total: f64 = dist.iter().sum();
        let chosen = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut idx = n - 1;
            for (i, d) in dist.iter().enumerate() {
                cumulative += d;
                if cumulative >= target && *d > 0.0 {
                    idx = i;
                    break;
                }
            }
            idx
        } else {
            // Every row coincides with a centroid already.
            rng.random_range(0..n)
        };
        let centroid = data.row(chosen).to_vec();
        for (d, row) in dist.iter_mut().zip(data.rows()) {
            *d = d.min(sq_dist(row, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

/// Means of `k` equal blocks of rows ordered by the first feature.
pub fn stratified_means(data: &FeatureMatrix, k: usize) -> Result<Vec<Vec<f64>>> {
    let n = data.n_rows();
    if n < k {
        return Err(HmmError::InsufficientData { rows: n, states: k });
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| data.row(a)[0].total_cmp(&data.row(b)[0]));
    let f = data.n_features();
    Ok((0..k)
        .map(|c| {
            let block = &order[c * n / k..(c + 1) * n / k];
            let mut mean = vec![0.0; f];
            for &r in block {
                for (m, x) in mean.iter_mut().zip(data.row(r)) {
                    *m += x;
                }
            }
            mean.iter_mut().for_each(|m| *m /= block.len() as f64);
            mean
        })
        .collect())
}

/// Per-feature diagonal floor: `floor` times the feature's population
/// variance over the batch, or `floor` itself for a constant feature.
///
/// Scaling keeps the floor negligible next to the data whatever its units.
pub fn feature_floors(data: &FeatureMatrix, floor: f64) -> Vec<f64> {
    let n = data.n_rows().max(1) as f64;
    (0..data.n_features())
        .map(|j| {
            let column = data.column(j);
            let mean = column.iter().sum::<f64>() / n;
            let var = column.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
            if var > 0.0 && var.is_finite() {
                floor * var
            } else {
                floor
            }
        })
        .collect()
}

/// Sample covariance of the whole batch plus the per-feature floors, shared
/// by every state as the starting point.
pub fn pooled_covariance(
    data: &FeatureMatrix,
    covariance_type: CovarianceType,
    floors: &[f64],
) -> DMatrix<f64> {
    let (n, f) = (data.n_rows(), data.n_features());
    let mut mean = vec![0.0; f];
    for row in data.rows() {
        for (m, x) in mean.iter_mut().zip(row) {
            *m += x;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n.max(1) as f64);
    let mut cov = DMatrix::zeros(f, f);
    for row in data.rows() {
        for i in 0..f {
            let di = row[i] - mean[i];
            for j in 0..=i {
                cov[(i, j)] += di * (row[j] - mean[j]);
            }
        }
    }
    let denom = (n.max(2) - 1) as f64;
    for i in 0..f {
        for j in 0..=i {
            let v = cov[(i, j)] / denom;
            cov[(i, j)] = v;
            cov[(j, i)] = v;
        }
    }
    if covariance_type == CovarianceType::Diagonal {
        cov = DMatrix::from_diagonal(&cov.diagonal());
    }
    for (i, floor) in floors.iter().enumerate().take(f) {
        cov[(i, i)] += floor;
    }
    cov
}

/// Row-major `K x K` starting transition matrix.
pub fn initial_transitions<R: Rng + ?Sized>(
    k: usize,
    mode: TransitionInit,
    rng: &mut R,
) -> Vec<f64> {
    match mode {
        TransitionInit::Uniform => vec![1.0 / k as f64; k * k],
        TransitionInit::Random => (0..k).flat_map(|_| dirichlet_ones(k, rng)).collect(),
    }
}

pub fn initial_distribution<R: Rng + ?Sized>(
    k: usize,
    mode: TransitionInit,
    rng: &mut R,
) -> Vec<f64> {
    match mode {
        TransitionInit::Uniform => vec![1.0 / k as f64; k],
        TransitionInit::Random => dirichlet_ones(k, rng),
    }
}

/// A draw from the flat Dirichlet: normalized unit exponentials.
fn dirichlet_ones<R: Rng + ?Sized>(k: usize, rng: &mut R) -> Vec<f64> {
    let draws: Vec<f64> = (0..k).map(|_| rng.sample::<f64, _>(Exp1)).collect();
    let total: f64 = draws.iter().sum();
    if total > 0.0 {
        draws.into_iter().map(|d| d / total).collect()
    } else {
        vec![1.0 / k as f64; k]
    }
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(row: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.iter().enumerate() {
        let d = sq_dist(row, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn blobs() -> FeatureMatrix {
        let mut values = Vec::new();
        for i in 0..60 {
            let jitter = (i % 7) as f64 * 0.01;
            let center = if i < 30 { -5.0 } else { 5.0 };
            values.extend([center + jitter, center - jitter]);
        }
        FeatureMatrix::single_segment(
            vec!["a".into(), "b".into()],
            (0..60).collect(),
            values,
        )
        .unwrap()
    }

    #[test]
    fn kmeans_separates_blobs_and_is_seeded() {
        let data = blobs();
        let a = kmeans_means(&data, 2, &mut StdRng::seed_from_u64(45)).unwrap();
        let b = kmeans_means(&data, 2, &mut StdRng::seed_from_u64(45)).unwrap();
        assert_eq!(a, b);
        let mut firsts: Vec<f64> = a.iter().map(|m| m[0]).collect();
        firsts.sort_by(f64::total_cmp);
        assert!((firsts[0] + 4.97).abs() < 0.1);
        assert!((firsts[1] - 5.03).abs() < 0.1);
    }

    #[test]
    fn too_few_rows_for_states() {
        let data = FeatureMatrix::single_segment(vec!["a".into()], vec![1], vec![0.0]).unwrap();
        assert!(matches!(
            kmeans_means(&data, 2, &mut StdRng::seed_from_u64(1)),
            Err(HmmError::InsufficientData { rows: 1, states: 2 })
        ));
    }

    #[test]
    fn stratified_blocks_are_ordered() {
        let means = stratified_means(&blobs(), 2).unwrap();
        assert!(means[0][0] < 0.0 && means[1][0] > 0.0);
    }

    #[test]
    fn pooled_covariance_is_symmetric_with_floor() {
        let floors = feature_floors(&blobs(), 0.5);
        let cov = pooled_covariance(&blobs(), CovarianceType::Full, &floors);
        assert_eq!(cov[(0, 1)], cov[(1, 0)]);
        assert!(cov[(0, 0)] > 25.0);
        let diag = pooled_covariance(&blobs(), CovarianceType::Diagonal, &floors);
        assert_eq!(diag[(0, 1)], 0.0);
        assert_eq!(diag[(0, 0)], cov[(0, 0)]);
    }

    #[test]
    fn floors_follow_feature_scale() {
        let data = FeatureMatrix::single_segment(
            vec!["tiny".into(), "flat".into()],
            vec![1, 2, 3, 4],
            vec![1e-4, 7.0, -1e-4, 7.0, 1e-4, 7.0, -1e-4, 7.0],
        )
        .unwrap();
        let floors = feature_floors(&data, 1e-6);
        assert!((floors[0] - 1e-14).abs() < 1e-20);
        assert_eq!(floors[1], 1e-6);
    }

    #[test]
    fn random_transitions_are_stochastic() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = initial_transitions(4, TransitionInit::Random, &mut rng);
        for row in a.chunks_exact(4) {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            assert!(row.iter().all(|&p| p >= 0.0));
        }
        let u = initial_transitions(2, TransitionInit::Uniform, &mut rng);
        assert_eq!(u, vec![0.5; 4]);
    }
}
