//! Monte Carlo efficient-frontier sampler.
//!
//! Each sample draws one independent uniform per asset and normalizes them to
//! sum to 1. That is not a uniform distribution over the simplex (it favours
//! the centre); the cloud is descriptive only and is never used to pick the
//! final portfolio.

use crate::domain::error::PortfolioError;
use crate::domain::optimizer::{quadratic_form, WeightVector};
use crate::domain::returns::ReturnsMatrix;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_SAMPLE_COUNT: usize = 1000;
pub const DEFAULT_SEED: u64 = 42;

/// Risk at or below this is treated as zero.
pub const RISK_FLOOR: f64 = 1e-12;

/// One random feasible portfolio in (risk, return, Sharpe) coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierSample {
    pub weights: Vec<f64>,
    pub risk: f64,
    pub expected_return: f64,
    pub sharpe: f64,
}

/// Finite, lazy stream of frontier samples. Re-create with the same seed to replay.
pub struct FrontierSampler {
    sigma: DMatrix<f64>,
    expected_returns: DVector<f64>,
    rng: StdRng,
    remaining: usize,
}

impl FrontierSampler {
    pub fn new(
        matrix: &ReturnsMatrix,
        expected_returns: &DVector<f64>,
        count: usize,
        seed: u64,
    ) -> Result<Self, PortfolioError> {
        if expected_returns.len() != matrix.n_assets() {
            return Err(PortfolioError::DimensionMismatch {
                expected: matrix.n_assets(),
                actual: expected_returns.len(),
            });
        }
        Ok(Self {
            sigma: matrix.covariance(),
            expected_returns: expected_returns.clone(),
            rng: StdRng::seed_from_u64(seed),
            remaining: count,
        })
    }

    fn draw_weights(&mut self) -> Vec<f64> {
        let n = self.expected_returns.len();
        loop {
            let raw: Vec<f64> = (0..n).map(|_| self.rng.gen_range(0.0..1.0)).collect();
            let total: f64 = raw.iter().sum();
            if total > 0.0 {
                return raw.into_iter().map(|u| u / total).collect();
            }
        }
    }
}

impl Iterator for FrontierSampler {
    type Item = Result<FrontierSample, PortfolioError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let weights = self.draw_weights();
        let expected_return: f64 = weights
            .iter()
            .zip(self.expected_returns.iter())
            .map(|(w, m)| w * m)
            .sum();
        let risk = quadratic_form(&self.sigma, &weights).max(0.0).sqrt();

        if !(risk > RISK_FLOOR) {
            return Some(Err(PortfolioError::DegenerateRisk { risk }));
        }

        Some(Ok(FrontierSample {
            weights,
            risk,
            expected_return,
            sharpe: expected_return / risk,
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for FrontierSampler {}

/// A portfolio placed in the same coordinates as the sample cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrontierPoint {
    pub risk: f64,
    pub expected_return: f64,
    /// None when the risk is degenerate.
    pub sharpe: Option<f64>,
}

impl FrontierPoint {
    pub fn from_weights(
        weights: &WeightVector,
        sigma: &DMatrix<f64>,
        expected_returns: &DVector<f64>,
    ) -> Self {
        let risk = weights.variance(sigma).max(0.0).sqrt();
        let expected_return = weights.expected_return(expected_returns);
        Self {
            risk,
            expected_return,
            sharpe: (risk > RISK_FLOOR).then(|| expected_return / risk),
        }
    }
}

/// How the optimized portfolio sits relative to the random cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierComparison {
    pub samples: Vec<FrontierSample>,
    pub degenerate: usize,
    pub optimum: FrontierPoint,
    pub min_risk: Option<FrontierSample>,
    pub max_sharpe: Option<FrontierSample>,
    /// Share of usable samples at least as risky as the optimum.
    pub share_riskier: f64,
}

impl FrontierComparison {
    /// Drain the sampler; degenerate samples are counted and skipped.
    pub fn collect(sampler: FrontierSampler, optimum: FrontierPoint) -> Self {
        let mut samples = Vec::with_capacity(sampler.len());
        let mut degenerate = 0;
        for item in sampler {
            match item {
                Ok(sample) => samples.push(sample),
                Err(err) => {
                    tracing::debug!(%err, "skipping frontier sample");
                    degenerate += 1;
                }
            }
        }
        if degenerate > 0 {
            tracing::warn!(degenerate, "frontier samples with zero risk were skipped");
        }

        let min_risk = samples
            .iter()
            .min_by(|a, b| a.risk.total_cmp(&b.risk))
            .cloned();
        let max_sharpe = samples
            .iter()
            .max_by(|a, b| a.sharpe.total_cmp(&b.sharpe))
            .cloned();
        let share_riskier = if samples.is_empty() {
            0.0
        } else {
            let riskier = samples
                .iter()
                .filter(|s| s.risk >= optimum.risk - RISK_FLOOR)
                .count();
            riskier as f64 / samples.len() as f64
        };

        Self {
            samples,
            degenerate,
            optimum,
            min_risk,
            max_sharpe,
            share_riskier,
        }
    }
}
