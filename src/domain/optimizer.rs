//! Minimum-variance portfolio optimizer.
//!
//! Minimizes `wᵀΣw` subject to `1ᵀw = 1` and, when long-only, `w ≥ 0`, where
//! Σ is the sample covariance of the returns matrix. The numerical method sits
//! behind [`MinVarianceSolver`]; [`ActiveSetSolver`] is the default and
//! [`RandomSearchSolver`] is a seeded derivative-free alternative.

use crate::domain::error::PortfolioError;
use crate::domain::returns::ReturnsMatrix;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Allowed deviation of the weight sum from 1 and of weights below 0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Ridge added to the diagonal, relative to the mean variance, on retry.
const RIDGE_FACTOR: f64 = 1e-6;

/// Smallest accepted ratio between the smallest and largest LU pivot.
const PIVOT_RATIO_FLOOR: f64 = 1e-14;

const RANDOM_SEARCH_PATIENCE: usize = 50;
const RANDOM_SEARCH_MIN_RADIUS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    /// Weights sum to 1.
    pub full_investment: bool,
    /// Weights are non-negative.
    pub long_only: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            full_investment: true,
            long_only: true,
        }
    }
}

/// Portfolio weights, one per asset, checked against the constraints they were built under.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    pub fn new(weights: Vec<f64>, constraints: &Constraints) -> Result<Self, PortfolioError> {
        if weights.is_empty() {
            return Err(PortfolioError::InsufficientData {
                scope: "weight vector".into(),
                observations: 0,
                minimum: 1,
            });
        }
        if let Some((i, w)) = weights.iter().enumerate().find(|(_, w)| !w.is_finite()) {
            return Err(PortfolioError::InvalidConstraints {
                reason: format!("weight {w} at index {i} is not finite"),
            });
        }
        if constraints.long_only {
            if let Some((i, w)) = weights.iter().enumerate().find(|(_, w)| **w < 0.0) {
                return Err(PortfolioError::InvalidConstraints {
                    reason: format!("weight {w} at index {i} is negative under long-only"),
                });
            }
        }
        if constraints.full_investment {
            let sum: f64 = weights.iter().sum();
            if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
                return Err(PortfolioError::InvalidConstraints {
                    reason: format!("weights sum to {sum}, expected 1"),
                });
            }
        }
        Ok(Self(weights))
    }

    pub fn equal(n: usize) -> Self {
        Self(vec![1.0 / n as f64; n])
    }

    /// Everything in one asset.
    pub fn single(n: usize, index: usize) -> Self {
        let mut w = vec![0.0; n];
        w[index] = 1.0;
        Self(w)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }

    pub fn variance(&self, sigma: &DMatrix<f64>) -> f64 {
        quadratic_form(sigma, &self.0)
    }

    pub fn expected_return(&self, expected_returns: &DVector<f64>) -> f64 {
        self.0.iter().zip(expected_returns.iter()).map(|(w, m)| w * m).sum()
    }
}

/// `wᵀΣw`.
pub fn quadratic_form(sigma: &DMatrix<f64>, weights: &[f64]) -> f64 {
    let w = DVector::from_column_slice(weights);
    w.dot(&(sigma * &w))
}

/// Swappable numerical method for the minimum-variance program.
pub trait MinVarianceSolver {
    fn name(&self) -> &'static str;

    /// Seed of a randomized solver, recorded in provenance.
    fn seed(&self) -> Option<u64> {
        None
    }

    fn solve_min_variance(
        &self,
        sigma: &DMatrix<f64>,
        constraints: &Constraints,
    ) -> Result<Vec<f64>, PortfolioError>;
}

/// Primal active-set method. The budget constraint is kept as an equality
/// throughout; bound constraints enter the working set when a step would cross
/// zero and leave it when their multiplier turns negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSetSolver {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ActiveSetSolver {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-12,
        }
    }
}

impl ActiveSetSolver {
    fn solve_bounded(&self, sigma: &DMatrix<f64>, long_only: bool) -> Result<Vec<f64>, PortfolioError> {
        let n = sigma.nrows();
        let mut w = DVector::from_element(n, 1.0 / n as f64);
        let mut pinned = vec![false; n];

        for _ in 0..self.max_iterations {
            let free: Vec<usize> = (0..n).filter(|&i| !pinned[i]).collect();
            let gradient = sigma * &w;
            let step = equality_step(sigma, &gradient, &free)?;

            let mut alpha = 1.0;
            let mut blocking = None;
            if long_only {
                for &i in &free {
                    if step[i] < 0.0 {
                        let ratio = (-w[i] / step[i]).max(0.0);
                        if ratio < alpha {
                            alpha = ratio;
                            blocking = Some(i);
                        }
                    }
                }
            }

            w.axpy(alpha, &step, 1.0);

            if let Some(i) = blocking {
                w[i] = 0.0;
                pinned[i] = true;
                continue;
            }

            if !long_only {
                return Ok(w.iter().copied().collect());
            }

            // At the optimum of the current face: g = λ·1 on free assets,
            // and each pinned asset needs a non-negative multiplier g_i - λ.
            let gradient = sigma * &w;
            let free: Vec<usize> = (0..n).filter(|&i| !pinned[i]).collect();
            let lambda = free.iter().map(|&i| gradient[i]).sum::<f64>() / free.len() as f64;
            let scale = sigma.amax().max(f64::MIN_POSITIVE);

            let release = (0..n)
                .filter(|&i| pinned[i])
                .map(|i| (i, gradient[i] - lambda))
                .filter(|&(_, mu)| mu < -self.tolerance * scale)
                .min_by(|a, b| a.1.total_cmp(&b.1));

            match release {
                Some((i, _)) => pinned[i] = false,
                None => return Ok(w.iter().copied().collect()),
            }
        }

        Err(PortfolioError::IllConditionedCovariance {
            reason: format!(
                "active-set solver did not converge within {} iterations",
                self.max_iterations
            ),
        })
    }
}

impl MinVarianceSolver for ActiveSetSolver {
    fn name(&self) -> &'static str {
        "active_set"
    }

    fn solve_min_variance(
        &self,
        sigma: &DMatrix<f64>,
        constraints: &Constraints,
    ) -> Result<Vec<f64>, PortfolioError> {
        match self.solve_bounded(sigma, constraints.long_only) {
            Err(PortfolioError::IllConditionedCovariance { reason }) => {
                tracing::warn!(%reason, "retrying with ridge-regularized covariance");
                self.solve_bounded(&regularize(sigma), constraints.long_only)
            }
            other => other,
        }
    }
}

/// Step `p` over the free assets minimizing the objective along the face:
/// solves `[Σ_FF 1; 1ᵀ 0] [p_F; ν] = [-g_F; 0]`.
fn equality_step(
    sigma: &DMatrix<f64>,
    gradient: &DVector<f64>,
    free: &[usize],
) -> Result<DVector<f64>, PortfolioError> {
    let k = free.len();
    let mut kkt = DMatrix::zeros(k + 1, k + 1);
    let mut rhs = DVector::zeros(k + 1);
    for (a, &i) in free.iter().enumerate() {
        for (b, &j) in free.iter().enumerate() {
            kkt[(a, b)] = sigma[(i, j)];
        }
        kkt[(a, k)] = 1.0;
        kkt[(k, a)] = 1.0;
        rhs[a] = -gradient[i];
    }

    let lu = kkt.lu();
    let pivots = lu.u().diagonal();
    let largest = pivots.amax();
    let smallest = pivots.iter().fold(f64::INFINITY, |m, p| m.min(p.abs()));
    if !(largest > 0.0) || smallest / largest < PIVOT_RATIO_FLOOR {
        return Err(PortfolioError::IllConditionedCovariance {
            reason: format!("KKT system near-singular (pivot ratio {:e})", smallest / largest),
        });
    }

    let solution = lu
        .solve(&rhs)
        .filter(|x| x.iter().all(|v| v.is_finite()))
        .ok_or_else(|| PortfolioError::IllConditionedCovariance {
            reason: "KKT system has no finite solution".into(),
        })?;

    let mut step = DVector::zeros(sigma.nrows());
    for (a, &i) in free.iter().enumerate() {
        step[i] = solution[a];
    }
    Ok(step)
}

/// Σ + εI with ε proportional to the mean variance.
fn regularize(sigma: &DMatrix<f64>) -> DMatrix<f64> {
    let n = sigma.nrows();
    let mean_variance = sigma.trace() / n as f64;
    let scale = if mean_variance > 0.0 { mean_variance } else { 1.0 };
    sigma + DMatrix::<f64>::identity(n, n) * (RIDGE_FACTOR * scale)
}

/// Derivative-free adaptive random search: perturb the incumbent, project
/// back onto the feasible set, keep improvements, shrink the radius after a
/// run of misses. Reproducible for a fixed seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomSearchSolver {
    pub seed: u64,
    pub iterations: usize,
}

impl RandomSearchSolver {
    pub fn new(seed: u64, iterations: usize) -> Self {
        Self { seed, iterations }
    }
}

impl MinVarianceSolver for RandomSearchSolver {
    fn name(&self) -> &'static str {
        "random_search"
    }

    fn seed(&self) -> Option<u64> {
        Some(self.seed)
    }

    fn solve_min_variance(
        &self,
        sigma: &DMatrix<f64>,
        constraints: &Constraints,
    ) -> Result<Vec<f64>, PortfolioError> {
        let n = sigma.nrows();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let project = |v: &[f64]| {
            if constraints.long_only {
                project_onto_simplex(v)
            } else {
                project_onto_budget(v)
            }
        };

        let mut best = vec![1.0 / n as f64; n];
        let mut best_variance = quadratic_form(sigma, &best);

        // global phase: scattered starting points
        for _ in 0..(20 * n) {
            let draw: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();
            let candidate = project(&draw);
            let variance = quadratic_form(sigma, &candidate);
            if variance < best_variance {
                best = candidate;
                best_variance = variance;
            }
        }

        let mut radius = 0.5;
        let mut misses = 0;
        for _ in 0..self.iterations {
            let trial: Vec<f64> = best
                .iter()
                .map(|w| w + rng.gen_range(-radius..=radius))
                .collect();
            let candidate = project(&trial);
            let variance = quadratic_form(sigma, &candidate);
            if variance < best_variance {
                best = candidate;
                best_variance = variance;
                misses = 0;
            } else {
                misses += 1;
                if misses >= RANDOM_SEARCH_PATIENCE {
                    radius = (radius * 0.5).max(RANDOM_SEARCH_MIN_RADIUS);
                    misses = 0;
                }
            }
        }

        if !best_variance.is_finite() {
            return Err(PortfolioError::IllConditionedCovariance {
                reason: "objective is not finite".into(),
            });
        }
        Ok(best)
    }
}

/// Euclidean projection onto `{w : w ≥ 0, 1ᵀw = 1}`.
pub fn project_onto_simplex(v: &[f64]) -> Vec<f64> {
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (k, &u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - 1.0) / (k as f64 + 1.0);
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }

    v.iter().map(|x| (x - theta).max(0.0)).collect()
}

/// Euclidean projection onto `{w : 1ᵀw = 1}`.
pub fn project_onto_budget(v: &[f64]) -> Vec<f64> {
    let shift = (1.0 - v.iter().sum::<f64>()) / v.len() as f64;
    v.iter().map(|x| x + shift).collect()
}

/// Minimum-variance weights for the matrix under the given constraints.
pub fn optimize(
    matrix: &ReturnsMatrix,
    constraints: &Constraints,
    solver: &dyn MinVarianceSolver,
) -> Result<WeightVector, PortfolioError> {
    if !constraints.full_investment {
        return Err(PortfolioError::InvalidConstraints {
            reason: "minimum variance without full investment is the zero portfolio".into(),
        });
    }

    let n = matrix.n_assets();
    if n == 1 {
        return WeightVector::new(vec![1.0], constraints);
    }

    let sigma = matrix.covariance();
    if sigma.iter().any(|v| !v.is_finite()) {
        return Err(PortfolioError::IllConditionedCovariance {
            reason: "covariance has non-finite entries".into(),
        });
    }

    tracing::debug!(
        solver = solver.name(),
        assets = n,
        observations = matrix.n_observations(),
        "solving minimum-variance program"
    );

    let raw = solver.solve_min_variance(&sigma, constraints)?;
    if raw.len() != n {
        return Err(PortfolioError::DimensionMismatch {
            expected: n,
            actual: raw.len(),
        });
    }
    if raw.iter().any(|w| !w.is_finite()) {
        return Err(PortfolioError::IllConditionedCovariance {
            reason: format!("{} returned non-finite weights", solver.name()),
        });
    }

    WeightVector::new(tidy(raw, constraints.long_only), constraints)
}

/// Clamp round-off negatives to zero and renormalize to a unit sum.
fn tidy(mut weights: Vec<f64>, long_only: bool) -> Vec<f64> {
    if long_only {
        for w in weights.iter_mut() {
            if *w < 0.0 && *w > -WEIGHT_TOLERANCE {
                *w = 0.0;
            }
        }
    }
    let sum: f64 = weights.iter().sum();
    if sum.abs() > f64::EPSILON {
        for w in weights.iter_mut() {
            *w /= sum;
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn matrix(columns: &[&[f64]]) -> ReturnsMatrix {
        let t = columns[0].len();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ReturnsMatrix::from_rows(
            (0..columns.len()).map(|j| format!("A{j}")).collect(),
            (0..t)
                .map(|i| start + chrono::Duration::days(i as i64))
                .collect(),
            (0..t).map(|i| columns.iter().map(|c| c[i]).collect()).collect(),
        )
        .unwrap()
    }

    fn solve(m: &ReturnsMatrix) -> WeightVector {
        optimize(m, &Constraints::default(), &ActiveSetSolver::default()).unwrap()
    }

    #[test]
    fn zero_variance_asset_takes_everything() {
        let m = matrix(&[&[0.01, -0.01, 0.01, -0.01], &[0.02, 0.02, 0.02, 0.02]]);
        let w = solve(&m);
        assert_relative_eq!(w.as_slice()[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(w.as_slice()[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn single_asset_gets_full_weight() {
        let m = matrix(&[&[0.01, 0.05, -0.03]]);
        assert_eq!(solve(&m).as_slice(), &[1.0]);
    }

    #[test]
    fn uncorrelated_assets_weighted_by_inverse_variance() {
        // zero sample covariance; variances 4e-4/3 and 16e-4/3
        let m = matrix(&[&[0.01, -0.01, 0.01, -0.01], &[0.02, 0.02, -0.02, -0.02]]);
        let w = solve(&m);
        assert_relative_eq!(w.as_slice()[0], 0.8, epsilon = 1e-9);
        assert_relative_eq!(w.as_slice()[1], 0.2, epsilon = 1e-9);
    }

    #[test]
    fn long_only_pins_the_short_leg_at_zero() {
        // B = 2A: the unconstrained optimum is (2, -1)
        let a = [0.01, -0.01, 0.01, -0.01];
        let b = [0.02, -0.02, 0.02, -0.02];
        let m = matrix(&[&a, &b]);

        let long_only = solve(&m);
        assert_relative_eq!(long_only.as_slice()[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(long_only.as_slice()[1], 0.0, epsilon = 1e-9);

        let shorts = Constraints {
            long_only: false,
            ..Constraints::default()
        };
        let unconstrained = optimize(&m, &shorts, &ActiveSetSolver::default()).unwrap();
        assert_relative_eq!(unconstrained.as_slice()[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(unconstrained.as_slice()[1], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn duplicated_assets_are_regularized_not_nan() {
        let a = [0.01, -0.02, 0.015, 0.003, -0.007];
        let c = [0.002, 0.01, -0.01, 0.02, 0.0];
        let m = matrix(&[&a, &a, &c]);

        let w = solve(&m);
        assert!(w.as_slice().iter().all(|x| x.is_finite() && *x >= 0.0));
        assert_relative_eq!(w.as_slice().iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(w.as_slice()[0], w.as_slice()[1], epsilon = 1e-6);
    }

    #[test]
    fn without_full_investment_is_rejected() {
        let m = matrix(&[&[0.01, -0.01, 0.02], &[0.0, 0.01, 0.01]]);
        let constraints = Constraints {
            full_investment: false,
            long_only: true,
        };
        let err = optimize(&m, &constraints, &ActiveSetSolver::default()).unwrap_err();
        assert!(matches!(err, PortfolioError::InvalidConstraints { .. }));
    }

    #[test]
    fn random_search_is_reproducible_and_close_to_active_set() {
        let m = matrix(&[
            &[0.01, -0.02, 0.015, 0.003, -0.007, 0.011],
            &[0.002, 0.01, -0.01, 0.02, 0.0, -0.004],
            &[-0.005, 0.004, 0.012, -0.01, 0.006, 0.001],
        ]);
        let solver = RandomSearchSolver::new(7, 5_000);
        let first = optimize(&m, &Constraints::default(), &solver).unwrap();
        let second = optimize(&m, &Constraints::default(), &solver).unwrap();
        assert_eq!(first, second);

        let sigma = m.covariance();
        let exact = solve(&m);
        assert!(first.variance(&sigma) >= exact.variance(&sigma) - 1e-15);
        assert_relative_eq!(first.variance(&sigma), exact.variance(&sigma), max_relative = 1e-4);
    }

    #[test]
    fn simplex_projection() {
        assert_eq!(project_onto_simplex(&[0.5, 0.5]), vec![0.5, 0.5]);
        assert_eq!(project_onto_simplex(&[2.0, 0.0]), vec![1.0, 0.0]);
        let p = project_onto_simplex(&[0.3, -0.4, 0.9]);
        assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(p.iter().all(|x| *x >= 0.0));
        assert_eq!(p[1], 0.0);
    }

    #[test]
    fn weight_vector_rejects_violations() {
        let c = Constraints::default();
        assert!(WeightVector::new(vec![0.5, 0.5], &c).is_ok());
        assert!(WeightVector::new(vec![1.2, -0.2], &c).is_err());
        assert!(WeightVector::new(vec![0.5, 0.4], &c).is_err());
        assert!(WeightVector::new(vec![f64::NAN, 1.0], &c).is_err());
        assert!(WeightVector::new(vec![], &c).is_err());
    }
}
