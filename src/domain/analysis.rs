//! End-to-end analysis: fetch, build returns, optimize, sample the frontier,
//! evaluate and compare against a benchmark.

use crate::domain::benchmark::{self, BenchmarkComparison};
use crate::domain::error::{Component, PortfolioError};
use crate::domain::evaluator::{EvaluatorConfig, PerformanceReport};
use crate::domain::frontier::{
    FrontierComparison, FrontierPoint, FrontierSampler, DEFAULT_SAMPLE_COUNT, DEFAULT_SEED,
};
use crate::domain::optimizer::{
    optimize, ActiveSetSolver, Constraints, MinVarianceSolver, RandomSearchSolver, WeightVector,
};
use crate::domain::price::{PriceField, PriceSeries};
use crate::domain::returns::{ReturnSeries, ReturnsMatrix};
use crate::ports::data_port::PriceDataPort;
use chrono::NaiveDate;

pub const DEFAULT_RANDOM_SEARCH_ITERATIONS: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverChoice {
    ActiveSet,
    RandomSearch { seed: u64, iterations: usize },
}

impl SolverChoice {
    pub fn build(&self) -> Box<dyn MinVarianceSolver> {
        match *self {
            SolverChoice::ActiveSet => Box::new(ActiveSetSolver::default()),
            SolverChoice::RandomSearch { seed, iterations } => {
                Box::new(RandomSearchSolver::new(seed, iterations))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub tickers: Vec<String>,
    pub benchmark: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price_field: PriceField,
    pub constraints: Constraints,
    pub solver: SolverChoice,
    pub frontier_samples: usize,
    pub frontier_seed: u64,
    pub evaluator: EvaluatorConfig,
}

impl AnalysisConfig {
    /// Defaults for everything but the universe and the date range.
    pub fn new(tickers: Vec<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            tickers,
            benchmark: None,
            start_date,
            end_date,
            price_field: PriceField::default(),
            constraints: Constraints::default(),
            solver: SolverChoice::ActiveSet,
            frontier_samples: DEFAULT_SAMPLE_COUNT,
            frontier_seed: DEFAULT_SEED,
            evaluator: EvaluatorConfig::default(),
        }
    }
}

/// What is needed to reproduce a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub solver: String,
    pub solver_seed: Option<u64>,
    pub frontier_seed: u64,
    pub frontier_samples: usize,
    pub tickers: Vec<String>,
    pub benchmark: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub observations: usize,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub matrix: ReturnsMatrix,
    pub weights: WeightVector,
    pub portfolio_returns: ReturnSeries,
    pub report: PerformanceReport,
    pub frontier: FrontierComparison,
    pub benchmark: Option<BenchmarkComparison>,
    pub provenance: Provenance,
}

impl AnalysisOutcome {
    /// `(ticker, weight)` in asset order.
    pub fn allocation(&self) -> impl Iterator<Item = (&str, f64)> {
        self.matrix
            .assets()
            .iter()
            .map(String::as_str)
            .zip(self.weights.as_slice().iter().copied())
    }
}

pub fn fetch_universe(
    data: &dyn PriceDataPort,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<PriceSeries>, PortfolioError> {
    tickers
        .iter()
        .map(|t| {
            let series = data.fetch_prices(t, start, end)?;
            tracing::debug!(ticker = %t, prices = series.len(), "fetched");
            Ok(series)
        })
        .collect()
}

pub fn run_analysis(
    data: &dyn PriceDataPort,
    config: &AnalysisConfig,
) -> Result<AnalysisOutcome, PortfolioError> {
    let (start, end) = (config.start_date, config.end_date);
    let tickers = &config.tickers;
    let ctx = |component: Component| {
        move |e: PortfolioError| e.during(component, tickers, start, end)
    };

    let prices = {
        let _span = tracing::info_span!("fetch", assets = tickers.len()).entered();
        fetch_universe(data, tickers, start, end).map_err(ctx(Component::DataSource))?
    };

    let matrix = {
        let _span = tracing::info_span!("returns").entered();
        ReturnsMatrix::build(&prices, config.price_field).map_err(ctx(Component::ReturnsBuilder))?
    };
    let (first, last) = matrix.date_range();
    tracing::info!(
        assets = matrix.n_assets(),
        observations = matrix.n_observations(),
        %first,
        %last,
        "returns matrix built"
    );

    let solver = config.solver.build();
    let weights = {
        let _span = tracing::info_span!("optimize", solver = solver.name()).entered();
        optimize(&matrix, &config.constraints, solver.as_ref()).map_err(ctx(Component::Optimizer))?
    };
    tracing::info!(weights = ?weights.as_slice(), "minimum-variance weights");

    let frontier = {
        let _span = tracing::info_span!("frontier", samples = config.frontier_samples).entered();
        let mu = matrix.expected_returns();
        let optimum = FrontierPoint::from_weights(&weights, &matrix.covariance(), &mu);
        let sampler =
            FrontierSampler::new(&matrix, &mu, config.frontier_samples, config.frontier_seed)
                .map_err(ctx(Component::FrontierSampler))?;
        FrontierComparison::collect(sampler, optimum)
    };
    tracing::info!(
        usable = frontier.samples.len(),
        degenerate = frontier.degenerate,
        share_riskier = frontier.share_riskier,
        "frontier sampled"
    );

    let (portfolio_returns, report) = {
        let _span = tracing::info_span!("evaluate").entered();
        let series = matrix
            .portfolio_returns(weights.as_slice())
            .map_err(ctx(Component::Evaluator))?;
        let report = PerformanceReport::compute(series.values(), &config.evaluator)
            .map_err(ctx(Component::Evaluator))?;
        (series, report)
    };
    tracing::info!(
        annualized_return = report.annualized_return,
        sharpe = report.sharpe_ratio,
        max_drawdown = report.max_drawdown,
        "portfolio evaluated"
    );

    let benchmark = match &config.benchmark {
        Some(name) => {
            let _span = tracing::info_span!("benchmark", %name).entered();
            let wrap = |component: Component| {
                move |e: PortfolioError| e.during(component, std::slice::from_ref(name), start, end)
            };
            let prices = data
                .fetch_prices(name, start, end)
                .map_err(wrap(Component::DataSource))?;
            let series = ReturnSeries::from_prices(&prices, PriceField::AdjustedClose)
                .map_err(wrap(Component::Benchmark))?;
            let comparison =
                benchmark::compare(&portfolio_returns, name, &series, &config.evaluator)
                    .map_err(wrap(Component::Benchmark))?;
            tracing::info!(
                periods = comparison.periods(),
                excess = comparison.excess_annualized_return,
                "benchmark compared"
            );
            Some(comparison)
        }
        None => None,
    };

    let provenance = Provenance {
        solver: solver.name().to_string(),
        solver_seed: solver.seed(),
        frontier_seed: config.frontier_seed,
        frontier_samples: config.frontier_samples,
        tickers: matrix.assets().to_vec(),
        benchmark: config.benchmark.clone(),
        start_date: first,
        end_date: last,
        observations: matrix.n_observations(),
    };

    Ok(AnalysisOutcome {
        matrix,
        weights,
        portfolio_returns,
        report,
        frontier,
        benchmark,
        provenance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_choice_builds_named_solvers() {
        let exact = SolverChoice::ActiveSet.build();
        assert_eq!(exact.name(), "active_set");
        assert_eq!(exact.seed(), None);

        let random = SolverChoice::RandomSearch {
            seed: 11,
            iterations: 10,
        }
        .build();
        assert_eq!(random.name(), "random_search");
        assert_eq!(random.seed(), Some(11));
    }

    #[test]
    fn new_config_uses_defaults() {
        let d = |m| NaiveDate::from_ymd_opt(2024, m, 1).unwrap();
        let config = AnalysisConfig::new(vec!["A".into()], d(1), d(6));
        assert_eq!(config.frontier_samples, 1000);
        assert_eq!(config.frontier_seed, 42);
        assert_eq!(config.solver, SolverChoice::ActiveSet);
        assert!(config.constraints.long_only && config.constraints.full_investment);
        assert_eq!(config.evaluator.periods_per_year, 252.0);
    }
}
