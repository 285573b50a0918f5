//! Performance evaluation of a per-period return series.

use crate::domain::error::PortfolioError;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Standard deviation at or below this is treated as zero.
const VOLATILITY_FLOOR: f64 = 1e-15;

/// What Sortino reports when no return falls below the MAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoDownsidePolicy {
    #[default]
    Fail,
    ReportZero,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluatorConfig {
    pub periods_per_year: f64,
    /// Per-period risk-free rate.
    pub risk_free_rate: f64,
    pub minimum_acceptable_return: f64,
    pub no_downside: NoDownsidePolicy,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            periods_per_year: TRADING_DAYS_PER_YEAR,
            risk_free_rate: 0.0,
            minimum_acceptable_return: 0.0,
            no_downside: NoDownsidePolicy::Fail,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceReport {
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
}

impl PerformanceReport {
    pub fn compute(returns: &[f64], config: &EvaluatorConfig) -> Result<Self, PortfolioError> {
        if returns.is_empty() {
            return Err(PortfolioError::EmptySeries);
        }
        let factor = config.periods_per_year;

        Ok(PerformanceReport {
            annualized_return: annualized_return(returns, factor)?,
            annualized_volatility: annualized_volatility(returns, factor)?,
            sharpe_ratio: sharpe_ratio(returns, config.risk_free_rate, factor)?,
            sortino_ratio: sortino_ratio(
                returns,
                config.minimum_acceptable_return,
                config.no_downside,
            )?,
            max_drawdown: drawdown(returns).0,
        })
    }
}

fn mean(returns: &[f64]) -> f64 {
    returns.iter().sum::<f64>() / returns.len() as f64
}

/// Sample standard deviation (divisor n - 1).
pub fn sample_std_dev(returns: &[f64]) -> Result<f64, PortfolioError> {
    if returns.is_empty() {
        return Err(PortfolioError::EmptySeries);
    }
    if returns.len() < 2 {
        return Err(PortfolioError::InsufficientData {
            scope: "standard deviation".into(),
            observations: returns.len(),
            minimum: 2,
        });
    }
    let m = mean(returns);
    let variance =
        returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    Ok(variance.sqrt())
}

/// `∏(1 + r) - 1`.
pub fn total_return(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |wealth, r| wealth * (1.0 + r)) - 1.0
}

/// Geometric mean return compounded over `factor` periods.
pub fn annualized_return(returns: &[f64], factor: f64) -> Result<f64, PortfolioError> {
    if returns.is_empty() {
        return Err(PortfolioError::EmptySeries);
    }
    let wealth = 1.0 + total_return(returns);
    if wealth <= 0.0 {
        return Ok(-1.0);
    }
    let per_period = wealth.powf(1.0 / returns.len() as f64) - 1.0;
    Ok((1.0 + per_period).powf(factor) - 1.0)
}

pub fn annualized_volatility(returns: &[f64], factor: f64) -> Result<f64, PortfolioError> {
    Ok(sample_std_dev(returns)? * factor.sqrt())
}

pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, factor: f64) -> Result<f64, PortfolioError> {
    let std = sample_std_dev(returns)?;
    if std <= VOLATILITY_FLOOR {
        return Err(PortfolioError::ZeroVolatility);
    }
    Ok((mean(returns) - risk_free_rate) / std * factor.sqrt())
}

/// Root mean square shortfall below `mar`, averaged over every observation.
/// `None` when nothing falls below.
pub fn downside_deviation(returns: &[f64], mar: f64) -> Option<f64> {
    let shortfall: f64 = returns
        .iter()
        .map(|r| (r - mar).min(0.0).powi(2))
        .sum();
    if shortfall == 0.0 {
        return None;
    }
    Some((shortfall / returns.len() as f64).sqrt())
}

/// Not annualized.
pub fn sortino_ratio(
    returns: &[f64],
    mar: f64,
    policy: NoDownsidePolicy,
) -> Result<f64, PortfolioError> {
    if returns.is_empty() {
        return Err(PortfolioError::EmptySeries);
    }
    match (downside_deviation(returns, mar), policy) {
        (Some(dd), _) => Ok((mean(returns) - mar) / dd),
        (None, NoDownsidePolicy::ReportZero) => Ok(0.0),
        (None, NoDownsidePolicy::Fail) => Err(PortfolioError::NoDownsideObservations { mar }),
    }
}

/// Maximum drawdown of the wealth curve starting at 1, and the longest run
/// of periods spent below a running peak.
pub fn drawdown(returns: &[f64]) -> (f64, usize) {
    let mut wealth = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_dd = 0.0_f64;
    let mut run = 0usize;
    let mut longest = 0usize;

    for r in returns {
        wealth *= 1.0 + r;
        if wealth >= peak {
            peak = wealth;
            run = 0;
        } else {
            let dd = (peak - wealth) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            run += 1;
            longest = longest.max(run);
        }
    }

    (max_dd.clamp(0.0, 1.0), longest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SCENARIO: [f64; 5] = [0.01, -0.02, 0.03, -0.01, 0.02];

    #[test]
    fn scenario_matches_closed_forms() {
        let report = PerformanceReport::compute(&SCENARIO, &EvaluatorConfig::default()).unwrap();

        let wealth: f64 = SCENARIO.iter().map(|r| 1.0 + r).product();
        let g = wealth.powf(1.0 / 5.0) - 1.0;
        let expected_annual = (1.0 + g).powf(252.0) - 1.0;
        // deviations from 0.006 squared: 1.72e-3 in total, over n - 1 = 4
        let std = (1.72e-3_f64 / 4.0).sqrt();

        assert_relative_eq!(report.annualized_return, expected_annual, epsilon = 1e-9);
        assert_relative_eq!(report.annualized_volatility, std * 252.0_f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(report.sharpe_ratio, 0.006 / std * 252.0_f64.sqrt(), epsilon = 1e-9);
        // downside: (0.02² + 0.01²) / 5 = 1e-4, so dd = 0.01
        assert_relative_eq!(report.sortino_ratio, 0.6, epsilon = 1e-9);
        // 1.01 -> 0.9898
        assert_relative_eq!(report.max_drawdown, 0.02, epsilon = 1e-9);
    }

    #[test]
    fn empty_series_is_an_error() {
        assert!(matches!(
            PerformanceReport::compute(&[], &EvaluatorConfig::default()),
            Err(PortfolioError::EmptySeries)
        ));
    }

    #[test]
    fn single_observation_has_no_volatility_estimate() {
        assert!(matches!(
            sample_std_dev(&[0.01]),
            Err(PortfolioError::InsufficientData { observations: 1, .. })
        ));
    }

    #[test]
    fn constant_returns_have_zero_volatility() {
        assert!(matches!(
            sharpe_ratio(&[0.01, 0.01, 0.01], 0.0, 252.0),
            Err(PortfolioError::ZeroVolatility)
        ));
    }

    #[test]
    fn no_downside_follows_policy() {
        let returns = [0.01, 0.0, 0.02];
        assert!(matches!(
            sortino_ratio(&returns, 0.0, NoDownsidePolicy::Fail),
            Err(PortfolioError::NoDownsideObservations { .. })
        ));
        assert_eq!(sortino_ratio(&returns, 0.0, NoDownsidePolicy::ReportZero).unwrap(), 0.0);
    }

    #[test]
    fn mar_shifts_the_downside() {
        let returns = [0.01, 0.02, 0.03];
        // shortfalls below 0.02: only 0.01
        let dd = downside_deviation(&returns, 0.02).unwrap();
        assert_relative_eq!(dd, (1e-4_f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(
            sortino_ratio(&returns, 0.02, NoDownsidePolicy::Fail).unwrap(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn total_loss_annualizes_to_minus_one() {
        assert_eq!(annualized_return(&[0.1, -1.0, 0.2], 252.0).unwrap(), -1.0);
    }

    #[test]
    fn drawdown_counts_first_period_loss() {
        let (dd, duration) = drawdown(&[-0.1, 0.05]);
        assert_relative_eq!(dd, 0.1, epsilon = 1e-12);
        assert_eq!(duration, 2);
    }

    #[test]
    fn drawdown_zero_for_non_decreasing_wealth() {
        assert_eq!(drawdown(&[0.0, 0.01, 0.0, 0.02]), (0.0, 0));
    }

    #[test]
    fn drawdown_duration_is_longest_underwater_run() {
        // under, under, recover, under
        let (_, duration) = drawdown(&[-0.01, -0.01, 0.05, -0.01]);
        assert_eq!(duration, 2);
    }
}
