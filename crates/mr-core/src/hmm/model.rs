//! Gaussian HMM: construction, Baum–Welch fitting, decoding and sampling.

use mr_common::{
    CovarianceType, FeatureMatrix, ModelSummary, PosteriorMatrix, RegimeModelParameters,
    RegimeSequence, Segment, PARAMETERS_FORMAT_VERSION,
};
use mr_config::{MeanInit, ModelConfig, TransitionInit};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::algorithms::{forward_backward, segment_log_likelihood, viterbi};
use super::emission::GaussianEmission;
use super::init::{
    feature_floors, initial_distribution, initial_transitions, kmeans_means, pooled_covariance,
    stratified_means,
};
use super::{HmmError, Result};
use crate::logging::event_names;

/// States whose total posterior mass falls below this are empty.
const MIN_STATE_MASS: f64 = 1e-8;

/// Allowed log-likelihood drop between iterations, relative to its
/// magnitude, before EM is declared broken.
const LL_DECREASE_SLACK: f64 = 1e-7;

/// EM settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub n_states: usize,
    pub covariance_type: CovarianceType,
    pub n_iter: usize,
    pub tolerance: f64,
    /// Relative to each feature's batch variance.
    pub covariance_floor: f64,
    pub transition_init: TransitionInit,
    pub mean_init: MeanInit,
    pub seed: u64,
}

impl FitOptions {
    pub fn from_config(model: &ModelConfig, seed: u64) -> Self {
        Self {
            n_states: model.n_states,
            covariance_type: model.covariance_type,
            n_iter: model.n_iter,
            tolerance: model.tolerance,
            covariance_floor: model.covariance_floor,
            transition_init: model.transition_init,
            mean_init: model.mean_init,
            seed,
        }
    }
}

impl Default for FitOptions {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default(), 45)
    }
}

/// What happened during EM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub iterations: usize,
    pub converged: bool,
    /// Log-likelihood of the returned parameters.
    pub log_likelihood: f64,
    /// Log-likelihood evaluated at the start of every iteration.
    pub history: Vec<f64>,
}

impl FitReport {
    pub fn is_monotone(&self) -> bool {
        self.history
            .windows(2)
            .all(|w| w[1] >= w[0] - LL_DECREASE_SLACK * (1.0 + w[0].abs()))
    }
}

/// `(AIC, BIC)` for a log-likelihood, free parameter count and sample size.
pub fn model_selection(log_likelihood: f64, n_params: usize, n_samples: usize) -> (f64, f64) {
    let p = n_params as f64;
    let aic = -2.0 * log_likelihood + 2.0 * p;
    let bic = -2.0 * log_likelihood + p * (n_samples as f64).ln();
    (aic, bic)
}

/// Expected sufficient statistics of one E-step.
#[derive(Debug, Clone)]
struct SufficientStats {
    gamma_sum: Vec<f64>,
    start_sum: Vec<f64>,
    xi_sum: Vec<f64>,
    /// `K x F` posterior-weighted sums.
    x_sum: Vec<f64>,
    /// `K x F x F` posterior-weighted outer products (lower triangle).
    xx_sum: Vec<f64>,
    log_likelihood: f64,
}

impl SufficientStats {
    fn zeros(k: usize, f: usize) -> Self {
        Self {
            gamma_sum: vec![0.0; k],
            start_sum: vec![0.0; k],
            xi_sum: vec![0.0; k * k],
            x_sum: vec![0.0; k * f],
            xx_sum: vec![0.0; k * f * f],
            log_likelihood: 0.0,
        }
    }

    fn merge(mut self, other: &SufficientStats) -> Self {
        let add = |a: &mut Vec<f64>, b: &Vec<f64>| a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
        add(&mut self.gamma_sum, &other.gamma_sum);
        add(&mut self.start_sum, &other.start_sum);
        add(&mut self.xi_sum, &other.xi_sum);
        add(&mut self.x_sum, &other.x_sum);
        add(&mut self.xx_sum, &other.xx_sum);
        self.log_likelihood += other.log_likelihood;
        self
    }
}

/// A Gaussian HMM with frozen or in-fit parameters.
#[derive(Debug, Clone)]
pub struct GaussianHmm {
    n_states: usize,
    n_features: usize,
    covariance_type: CovarianceType,
    means: Vec<Vec<f64>>,
    covariances: Vec<DMatrix<f64>>,
    startprob: Vec<f64>,
    /// Row-major `K x K`.
    transmat: Vec<f64>,
    emissions: Vec<GaussianEmission>,
}

impl GaussianHmm {
    pub fn new(
        covariance_type: CovarianceType,
        means: Vec<Vec<f64>>,
        covariances: Vec<DMatrix<f64>>,
        startprob: Vec<f64>,
        transmat: Vec<f64>,
    ) -> Result<Self> {
        let k = means.len();
        let f = means.first().map_or(0, Vec::len);
        if k == 0 || f == 0 {
            return Err(HmmError::InvalidParameters(
                "model needs at least one state and one feature".into(),
            ));
        }
        if covariances.len() != k || startprob.len() != k || transmat.len() != k * k {
            return Err(HmmError::InvalidParameters(format!(
                "{k} states but {} covariances, {} initial probabilities, {} transition entries",
                covariances.len(),
                startprob.len(),
                transmat.len()
            )));
        }
        let emissions = means
            .iter()
            .zip(&covariances)
            .enumerate()
            .map(|(s, (m, c))| {
                if m.len() != f {
                    return Err(HmmError::DimensionMismatch {
                        expected: f,
                        actual: m.len(),
                    });
                }
                GaussianEmission::new(s, m.clone(), c)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            n_states: k,
            n_features: f,
            covariance_type,
            means,
            covariances,
            startprob,
            transmat,
            emissions,
        })
    }

    /// Fits from scratch: seeded initialization followed by EM.
    pub fn fit(data: &FeatureMatrix, options: &FitOptions) -> Result<(Self, FitReport)> {
        let k = options.n_states;
        if k == 0 || data.n_rows() < k {
            return Err(HmmError::InsufficientData {
                rows: data.n_rows(),
                states: k,
            });
        }
        let mut rng = StdRng::seed_from_u64(options.seed);
        let means = match options.mean_init {
            MeanInit::Kmeans => kmeans_means(data, k, &mut rng)?,
            MeanInit::Stratified => stratified_means(data, k)?,
            MeanInit::WarmStart => {
                return Err(HmmError::InvalidParameters(
                    "warm start needs initial parameters".into(),
                ));
            }
        };
        let floors = feature_floors(data, options.covariance_floor);
        let cov = pooled_covariance(data, options.covariance_type, &floors);
        let startprob = initial_distribution(k, options.transition_init, &mut rng);
        let transmat = initial_transitions(k, options.transition_init, &mut rng);
        let model = Self::new(
            options.covariance_type,
            means,
            vec![cov; k],
            startprob,
            transmat,
        )?;
        info!(
            event = event_names::HMM_INITIALIZED,
            states = k,
            features = data.n_features(),
            init = ?options.mean_init,
            seed = options.seed,
            "EM initialized"
        );
        model.refine(data, options)
    }

    /// Runs EM starting exactly from `self`; no randomized re-initialization.
    pub fn refine(
        mut self,
        data: &FeatureMatrix,
        options: &FitOptions,
    ) -> Result<(Self, FitReport)> {
        if data.n_features() != self.n_features {
            return Err(HmmError::DimensionMismatch {
                expected: self.n_features,
                actual: data.n_features(),
            });
        }
        let result = self.run_em(data, options);
        match result {
            Ok(report) => Ok((self, report)),
            Err(err) => {
                warn!(event = event_names::HMM_FIT_FAILED, error = %err, "EM failed");
                Err(err)
            }
        }
    }

    fn run_em(&mut self, data: &FeatureMatrix, options: &FitOptions) -> Result<FitReport> {
        let floors = feature_floors(data, options.covariance_floor);
        let mut history: Vec<f64> = Vec::new();
        let mut converged = false;
        let mut iterations = 0;
        for iteration in 1..=options.n_iter {
            let stats = self.expectation(data)?;
            let ll = stats.log_likelihood;
            self.check_progress(&history, ll, iteration)?;
            let gain = history.last().map(|prev| ll - prev);
            history.push(ll);
            iterations = iteration;
            debug!(
                event = event_names::HMM_ITERATION,
                iteration,
                log_likelihood = ll,
                gain = gain.unwrap_or(f64::NAN),
                "EM iteration"
            );
            if matches!(gain, Some(g) if g < options.tolerance) {
                converged = true;
                break;
            }
            self.maximization(&stats, &floors, iteration)?;
        }

        let log_likelihood = if converged {
            history.last().copied().unwrap_or(f64::NAN)
        } else {
            // Parameters moved after the last evaluation.
            let ll = self.score(data)?;
            self.check_progress(&history, ll, iterations + 1)?;
            history.push(ll);
            ll
        };

        if converged {
            info!(
                event = event_names::HMM_CONVERGED,
                iterations,
                log_likelihood,
                "EM converged"
            );
        } else {
            warn!(
                event = event_names::HMM_NOT_CONVERGED,
                iterations,
                log_likelihood,
                "EM stopped at the iteration cap"
            );
        }
        Ok(FitReport {
            iterations,
            converged,
            log_likelihood,
            history,
        })
    }

    fn check_progress(&self, history: &[f64], ll: f64, iteration: usize) -> Result<()> {
        if !ll.is_finite() {
            return Err(HmmError::NonFiniteLikelihood { iteration });
        }
        if let Some(&prev) = history.last() {
            if ll < prev - LL_DECREASE_SLACK * (1.0 + prev.abs()) {
                return Err(HmmError::LikelihoodDecreased {
                    iteration,
                    previous: prev,
                    current: ll,
                });
            }
        }
        Ok(())
    }

    fn expectation(&self, data: &FeatureMatrix) -> Result<SufficientStats> {
        let parts = data
            .segments()
            .par_iter()
            .map(|seg| self.segment_stats(data, seg))
            .collect::<Result<Vec<_>>>()?;
        // Sequential fold keeps the sums independent of thread scheduling.
        Ok(parts.iter().fold(
            SufficientStats::zeros(self.n_states, self.n_features),
            SufficientStats::merge,
        ))
    }

    fn segment_stats(&self, data: &FeatureMatrix, seg: &Segment) -> Result<SufficientStats> {
        let (k, f) = (self.n_states, self.n_features);
        let log_b = self.emission_log_probs(data, seg);
        let post = forward_backward(&log_b, k, &self.startprob, &self.transmat, seg.start)?;
        let mut stats = SufficientStats::zeros(k, f);
        stats.log_likelihood = post.log_likelihood;
        stats.xi_sum = post.xi_sum;
        stats.start_sum.copy_from_slice(&post.gamma[..k]);
        let diagonal = self.covariance_type == CovarianceType::Diagonal;
        for (t, row) in seg.range().enumerate() {
            let x = data.row(row);
            for s in 0..k {
                let g = post.gamma[t * k + s];
                if g == 0.0 {
                    continue;
                }
                stats.gamma_sum[s] += g;
                let xs = &mut stats.x_sum[s * f..(s + 1) * f];
                for (acc, v) in xs.iter_mut().zip(x) {
                    *acc += g * v;
                }
                let xx = &mut stats.xx_sum[s * f * f..(s + 1) * f * f];
                for i in 0..f {
                    let gi = g * x[i];
                    if diagonal {
                        xx[i * f + i] += gi * x[i];
                    } else {
                        for j in 0..=i {
                            xx[i * f + j] += gi * x[j];
                        }
                    }
                }
            }
        }
        Ok(stats)
    }

    fn maximization(
        &mut self,
        stats: &SufficientStats,
        floors: &[f64],
        iteration: usize,
    ) -> Result<()> {
        let (k, f) = (self.n_states, self.n_features);
        let diagonal = self.covariance_type == CovarianceType::Diagonal;
        let mut means = Vec::with_capacity(k);
        let mut covariances = Vec::with_capacity(k);
        for s in 0..k {
            let mass = stats.gamma_sum[s];
            if !(mass > MIN_STATE_MASS) {
                return Err(HmmError::EmptyState {
                    state: s,
                    iteration,
                });
            }
            let mean: Vec<f64> = stats.x_sum[s * f..(s + 1) * f]
                .iter()
                .map(|v| v / mass)
                .collect();
            let xx = &stats.xx_sum[s * f * f..(s + 1) * f * f];
            let mut cov = DMatrix::zeros(f, f);
            for i in 0..f {
                let second = xx[i * f + i] / mass;
                let var = second - mean[i] * mean[i];
                // Zero within rounding of the second moment: a collapsed state.
                if var <= f64::EPSILON * second.abs().max(f64::MIN_POSITIVE) * 16.0 {
                    return Err(HmmError::SingularCovariance { state: s });
                }
                cov[(i, i)] = var + floors[i];
                if !diagonal {
                    for j in 0..i {
                        let c = xx[i * f + j] / mass - mean[i] * mean[j];
                        cov[(i, j)] = c;
                        cov[(j, i)] = c;
                    }
                }
            }
            means.push(mean);
            covariances.push(cov);
        }

        let start_total: f64 = stats.start_sum.iter().sum();
        let startprob: Vec<f64> = if start_total > 0.0 {
            stats.start_sum.iter().map(|p| p / start_total).collect()
        } else {
            self.startprob.clone()
        };

        let mut transmat = self.transmat.clone();
        for i in 0..k {
            let row = &stats.xi_sum[i * k..(i + 1) * k];
            let total: f64 = row.iter().sum();
            // A state never left keeps its previous row.
            if total > 0.0 {
                for j in 0..k {
                    transmat[i * k + j] = row[j] / total;
                }
            }
        }

        let emissions = means
            .iter()
            .zip(&covariances)
            .enumerate()
            .map(|(s, (m, c))| GaussianEmission::new(s, m.clone(), c))
            .collect::<Result<Vec<_>>>()?;
        self.means = means;
        self.covariances = covariances;
        self.startprob = startprob;
        self.transmat = transmat;
        self.emissions = emissions;
        Ok(())
    }

    fn emission_log_probs(&self, data: &FeatureMatrix, seg: &Segment) -> Vec<f64> {
        let mut scratch = vec![0.0; self.n_features];
        let mut log_b = Vec::with_capacity(seg.len * self.n_states);
        for row in seg.range() {
            let x = data.row(row);
            for e in &self.emissions {
                log_b.push(e.log_density(x, &mut scratch));
            }
        }
        log_b
    }

    fn check_width(&self, data: &FeatureMatrix) -> Result<()> {
        if data.n_features() != self.n_features {
            return Err(HmmError::DimensionMismatch {
                expected: self.n_features,
                actual: data.n_features(),
            });
        }
        Ok(())
    }

    /// Total log-likelihood of `data`, segments scored independently.
    pub fn score(&self, data: &FeatureMatrix) -> Result<f64> {
        self.check_width(data)?;
        let parts = data
            .segments()
            .par_iter()
            .map(|seg| {
                let log_b = self.emission_log_probs(data, seg);
                segment_log_likelihood(
                    &log_b,
                    self.n_states,
                    &self.startprob,
                    &self.transmat,
                    seg.start,
                )
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(parts.iter().sum())
    }

    /// Smoothed state probabilities per row.
    pub fn predict_proba(&self, data: &FeatureMatrix) -> Result<PosteriorMatrix> {
        self.check_width(data)?;
        let parts = data
            .segments()
            .par_iter()
            .map(|seg| {
                let log_b = self.emission_log_probs(data, seg);
                forward_backward(&log_b, self.n_states, &self.startprob, &self.transmat, seg.start)
                    .map(|p| p.gamma)
            })
            .collect::<Result<Vec<_>>>()?;
        PosteriorMatrix::new(self.n_states, parts.concat())
            .map_err(|e| HmmError::InvalidParameters(e.to_string()))
    }

    /// Viterbi labels and the summed per-segment path log-probability.
    pub fn decode(&self, data: &FeatureMatrix) -> Result<(RegimeSequence, f64)> {
        self.check_width(data)?;
        let parts: Vec<(Vec<usize>, f64)> = data
            .segments()
            .par_iter()
            .map(|seg| {
                let log_b = self.emission_log_probs(data, seg);
                viterbi(&log_b, self.n_states, &self.startprob, &self.transmat)
            })
            .collect();
        let log_prob: f64 = parts.iter().map(|(_, lp)| lp).sum();
        let labels: Vec<usize> = parts.into_iter().flat_map(|(p, _)| p).collect();
        let seq = RegimeSequence::new(self.n_states, labels)
            .map_err(|e| HmmError::InvalidParameters(e.to_string()))?;
        Ok((seq, log_prob))
    }

    /// Simulates one independent run per entry of `segment_lengths`.
    ///
    /// Timestamps are row indices in milliseconds expressed as nanoseconds.
    pub fn simulate(
        &self,
        segment_lengths: &[usize],
        seed: u64,
    ) -> Result<(FeatureMatrix, RegimeSequence)> {
        let mut rng = StdRng::seed_from_u64(seed);
        let total: usize = segment_lengths.iter().sum();
        let mut values = Vec::with_capacity(total * self.n_features);
        let mut states = Vec::with_capacity(total);
        let mut buf = Vec::with_capacity(self.n_features);
        for &len in segment_lengths {
            let mut state = draw(&self.startprob, &mut rng);
            for t in 0..len {
                if t > 0 {
                    let k = self.n_states;
                    state = draw(&self.transmat[state * k..(state + 1) * k], &mut rng);
                }
                self.emissions[state].sample(&mut rng, &mut buf);
                values.extend_from_slice(&buf);
                states.push(state);
            }
        }
        let names = (0..self.n_features).map(|j| format!("f{j}")).collect();
        let timestamps = (0..total as i64).map(|i| i * 1_000_000).collect();
        let matrix = FeatureMatrix::new(names, timestamps, values, segment_lengths)
            .map_err(|e| HmmError::InvalidParameters(e.to_string()))?;
        let seq = RegimeSequence::new(self.n_states, states)
            .map_err(|e| HmmError::InvalidParameters(e.to_string()))?;
        Ok((matrix, seq))
    }

    /// Single-run convenience over [`GaussianHmm::simulate`].
    pub fn sample(&self, n: usize, seed: u64) -> Result<(FeatureMatrix, RegimeSequence)> {
        self.simulate(&[n], seed)
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn covariance_type(&self) -> CovarianceType {
        self.covariance_type
    }

    pub fn means(&self) -> &[Vec<f64>] {
        &self.means
    }

    pub fn covariances(&self) -> &[DMatrix<f64>] {
        &self.covariances
    }

    pub fn startprob(&self) -> &[f64] {
        &self.startprob
    }

    /// Transition matrix as rows.
    pub fn transition_matrix(&self) -> Vec<Vec<f64>> {
        self.transmat
            .chunks_exact(self.n_states)
            .map(<[f64]>::to_vec)
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        let (k, f) = (self.n_states, self.n_features);
        k * f + self.covariance_type.parameter_count(k, f) + k * (k - 1) + (k - 1)
    }

    pub fn to_params(&self) -> RegimeModelParameters {
        RegimeModelParameters {
            format_version: PARAMETERS_FORMAT_VERSION,
            n_states: self.n_states,
            n_features: self.n_features,
            covariance_type: self.covariance_type,
            means: self.means.clone(),
            covariances: self
                .covariances
                .iter()
                .map(|c| c.row_iter().map(|r| r.iter().copied().collect()).collect())
                .collect(),
            transition_matrix: self.transition_matrix(),
            initial_distribution: self.startprob.clone(),
        }
    }

    /// Validates and loads frozen parameters.
    pub fn from_params(params: &RegimeModelParameters) -> Result<Self> {
        params.validate().map_err(|e| match e {
            mr_common::Error::SingularCovariance { state } => {
                HmmError::SingularCovariance { state }
            }
            other => HmmError::InvalidParameters(other.to_string()),
        })?;
        let f = params.n_features;
        let covariances = params
            .covariances
            .iter()
            .map(|rows| DMatrix::from_row_iterator(f, f, rows.iter().flatten().copied()))
            .collect();
        Self::new(
            params.covariance_type,
            params.means.clone(),
            covariances,
            params.initial_distribution.clone(),
            params.transition_matrix.concat(),
        )
    }

    /// Fit metadata for the bundle and the `model_runs` table.
    pub fn summary(&self, data: &FeatureMatrix, report: &FitReport) -> ModelSummary {
        let n_parameters = self.parameter_count();
        let (aic, bic) = model_selection(report.log_likelihood, n_parameters, data.n_rows());
        ModelSummary {
            n_states: self.n_states,
            n_features: self.n_features,
            n_samples: data.n_rows(),
            n_segments: data.segments().len(),
            covariance_type: self.covariance_type,
            n_parameters,
            log_likelihood: report.log_likelihood,
            aic,
            bic,
            converged: report.converged,
            iterations: report.iterations,
            feature_names: data.feature_names().to_vec(),
        }
    }
}

fn draw<R: Rng + ?Sized>(probs: &[f64], rng: &mut R) -> usize {
    let u: f64 = rng.random();
    let mut cumulative = 0.0;
    for (i, p) in probs.iter().enumerate() {
        cumulative += p;
        if u < cumulative {
            return i;
        }
    }
    probs.len() - 1
}
