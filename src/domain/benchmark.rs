//! Portfolio versus benchmark comparison over their common dates.

use crate::domain::error::PortfolioError;
use crate::domain::evaluator::{self, EvaluatorConfig, PerformanceReport};
use crate::domain::returns::{ReturnSeries, MIN_OBSERVATIONS};
use chrono::NaiveDate;
use std::collections::HashSet;

/// One side of the comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub name: String,
    pub total_return: f64,
    pub report: PerformanceReport,
    pub max_drawdown_duration: usize,
    /// Aligned per-period returns and the wealth curve they compound to.
    pub returns: Vec<f64>,
    pub wealth: Vec<f64>,
}

impl ComparisonRow {
    fn evaluate(
        name: &str,
        series: &ReturnSeries,
        config: &EvaluatorConfig,
    ) -> Result<Self, PortfolioError> {
        let values = series.values();
        Ok(Self {
            name: name.to_string(),
            total_return: evaluator::total_return(values),
            report: PerformanceReport::compute(values, config)?,
            max_drawdown_duration: evaluator::drawdown(values).1,
            returns: values.to_vec(),
            wealth: series.cumulative_wealth(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkComparison {
    pub dates: Vec<NaiveDate>,
    pub portfolio: ComparisonRow,
    pub benchmark: ComparisonRow,
    /// Portfolio minus benchmark annualized return.
    pub excess_annualized_return: f64,
}

impl BenchmarkComparison {
    pub fn periods(&self) -> usize {
        self.dates.len()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.dates.first()?, *self.dates.last()?))
    }
}

/// Restrict both series to the dates they share.
pub fn align(
    portfolio: &ReturnSeries,
    benchmark: &ReturnSeries,
) -> Result<(ReturnSeries, ReturnSeries), PortfolioError> {
    let left: HashSet<NaiveDate> = portfolio.dates().iter().copied().collect();
    let common: HashSet<NaiveDate> = benchmark
        .dates()
        .iter()
        .copied()
        .filter(|d| left.contains(d))
        .collect();

    if common.len() < MIN_OBSERVATIONS {
        return Err(PortfolioError::InsufficientData {
            scope: "portfolio/benchmark overlap".into(),
            observations: common.len(),
            minimum: MIN_OBSERVATIONS,
        });
    }

    Ok((portfolio.restrict_to(&common), benchmark.restrict_to(&common)))
}

pub fn compare(
    portfolio: &ReturnSeries,
    benchmark_name: &str,
    benchmark: &ReturnSeries,
    config: &EvaluatorConfig,
) -> Result<BenchmarkComparison, PortfolioError> {
    let (p, b) = align(portfolio, benchmark)?;
    tracing::debug!(periods = p.len(), benchmark = benchmark_name, "aligned benchmark");

    let portfolio = ComparisonRow::evaluate("portfolio", &p, config)?;
    let benchmark = ComparisonRow::evaluate(benchmark_name, &b, config)?;
    let excess_annualized_return =
        portfolio.report.annualized_return - benchmark.report.annualized_return;

    Ok(BenchmarkComparison {
        dates: p.dates().to_vec(),
        portfolio,
        benchmark,
        excess_annualized_return,
    })
}
