//! CSV report adapter implementing ReportPort.
//!
//! Writes one file per table into the output directory: `weights.csv`,
//! `frontier.csv`, `returns.csv`, `summary.csv` and `provenance.csv`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::analysis::AnalysisOutcome;
use crate::domain::error::PortfolioError;
use crate::domain::evaluator::PerformanceReport;
use crate::ports::report_port::ReportPort;

pub const WEIGHTS_FILE: &str = "weights.csv";
pub const FRONTIER_FILE: &str = "frontier.csv";
pub const RETURNS_FILE: &str = "returns.csv";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const PROVENANCE_FILE: &str = "provenance.csv";

#[derive(Serialize)]
struct WeightRow<'a> {
    ticker: &'a str,
    weight: f64,
}

#[derive(Serialize)]
struct ReturnRow {
    date: String,
    portfolio_return: f64,
    portfolio_wealth: f64,
    benchmark_return: Option<f64>,
    benchmark_wealth: Option<f64>,
}

#[derive(Serialize)]
struct SummaryRow {
    metric: &'static str,
    portfolio: f64,
    benchmark: Option<f64>,
}

#[derive(Serialize)]
struct ProvenanceRow<'a> {
    key: &'a str,
    value: String,
}

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, outcome: &AnalysisOutcome, output_dir: &Path) -> Result<(), PortfolioError> {
        fs::create_dir_all(output_dir)?;

        write_weights(outcome, &output_dir.join(WEIGHTS_FILE))?;
        write_frontier(outcome, &output_dir.join(FRONTIER_FILE))?;
        write_returns(outcome, &output_dir.join(RETURNS_FILE))?;
        write_summary(outcome, &output_dir.join(SUMMARY_FILE))?;
        write_provenance(outcome, &output_dir.join(PROVENANCE_FILE))?;

        tracing::info!(dir = %output_dir.display(), "report written");
        Ok(())
    }
}

fn write_weights(outcome: &AnalysisOutcome, path: &Path) -> Result<(), PortfolioError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for (ticker, weight) in outcome.allocation() {
        wtr.serialize(WeightRow { ticker, weight })?;
    }
    wtr.flush()?;
    Ok(())
}

/// One row per usable sample with its weights spread over one column per ticker.
fn write_frontier(outcome: &AnalysisOutcome, path: &Path) -> Result<(), PortfolioError> {
    let mut wtr = csv::Writer::from_path(path)?;
    let assets = outcome.matrix.assets();

    let mut header = vec!["sample", "risk", "expected_return", "sharpe"];
    header.extend(assets.iter().map(String::as_str));
    wtr.write_record(&header)?;

    for (i, s) in outcome.frontier.samples.iter().enumerate() {
        let mut record = vec![
            i.to_string(),
            s.risk.to_string(),
            s.expected_return.to_string(),
            s.sharpe.to_string(),
        ];
        record.extend(s.weights.iter().map(|w| w.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_returns(outcome: &AnalysisOutcome, path: &Path) -> Result<(), PortfolioError> {
    let benchmark: HashMap<NaiveDate, (f64, f64)> = outcome
        .benchmark
        .as_ref()
        .map(|b| {
            b.dates
                .iter()
                .copied()
                .zip(
                    b.benchmark
                        .returns
                        .iter()
                        .copied()
                        .zip(b.benchmark.wealth.iter().copied()),
                )
                .collect()
        })
        .unwrap_or_default();

    let series = &outcome.portfolio_returns;
    let mut wtr = csv::Writer::from_path(path)?;
    for ((date, r), wealth) in series
        .dates()
        .iter()
        .zip(series.values())
        .zip(series.cumulative_wealth())
    {
        let bench = benchmark.get(date);
        wtr.serialize(ReturnRow {
            date: date.to_string(),
            portfolio_return: *r,
            portfolio_wealth: wealth,
            benchmark_return: bench.map(|b| b.0),
            benchmark_wealth: bench.map(|b| b.1),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn summary_rows(
    portfolio: &PerformanceReport,
    benchmark: Option<&PerformanceReport>,
) -> Vec<SummaryRow> {
    let pick = |f: fn(&PerformanceReport) -> f64| (f(portfolio), benchmark.map(f));
    [
        ("annualized_return", pick(|r| r.annualized_return)),
        ("annualized_volatility", pick(|r| r.annualized_volatility)),
        ("sharpe_ratio", pick(|r| r.sharpe_ratio)),
        ("sortino_ratio", pick(|r| r.sortino_ratio)),
        ("max_drawdown", pick(|r| r.max_drawdown)),
    ]
    .into_iter()
    .map(|(metric, (portfolio, benchmark))| SummaryRow {
        metric,
        portfolio,
        benchmark,
    })
    .collect()
}

/// Report metrics of the full portfolio series, then (with a benchmark) the
/// rows computed over the window both series share.
fn write_summary(outcome: &AnalysisOutcome, path: &Path) -> Result<(), PortfolioError> {
    let mut wtr = csv::Writer::from_path(path)?;
    let bench = outcome.benchmark.as_ref();
    for row in summary_rows(&outcome.report, bench.map(|b| &b.benchmark.report)) {
        wtr.serialize(row)?;
    }
    if let Some(b) = bench {
        wtr.serialize(SummaryRow {
            metric: "total_return",
            portfolio: b.portfolio.total_return,
            benchmark: Some(b.benchmark.total_return),
        })?;
        wtr.serialize(SummaryRow {
            metric: "max_drawdown_duration",
            portfolio: b.portfolio.max_drawdown_duration as f64,
            benchmark: Some(b.benchmark.max_drawdown_duration as f64),
        })?;
        wtr.serialize(SummaryRow {
            metric: "excess_annualized_return",
            portfolio: b.excess_annualized_return,
            benchmark: None,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_provenance(outcome: &AnalysisOutcome, path: &Path) -> Result<(), PortfolioError> {
    let p = &outcome.provenance;
    let rows = [
        ("solver", p.solver.clone()),
        (
            "solver_seed",
            p.solver_seed.map(|s| s.to_string()).unwrap_or_default(),
        ),
        ("frontier_seed", p.frontier_seed.to_string()),
        ("frontier_samples", p.frontier_samples.to_string()),
        ("frontier_degenerate", outcome.frontier.degenerate.to_string()),
        ("tickers", p.tickers.join(",")),
        ("benchmark", p.benchmark.clone().unwrap_or_default()),
        ("start_date", p.start_date.to_string()),
        ("end_date", p.end_date.to_string()),
        ("observations", p.observations.to_string()),
    ];

    let mut wtr = csv::Writer::from_path(path)?;
    for (key, value) in rows {
        wtr.serialize(ProvenanceRow { key, value })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(x: f64) -> PerformanceReport {
        PerformanceReport {
            annualized_return: x,
            annualized_volatility: x + 1.0,
            sharpe_ratio: x + 2.0,
            sortino_ratio: x + 3.0,
            max_drawdown: x + 4.0,
        }
    }

    #[test]
    fn summary_rows_without_benchmark() {
        let rows = summary_rows(&report(0.0), None);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[2].metric, "sharpe_ratio");
        assert_eq!(rows[2].portfolio, 2.0);
        assert!(rows.iter().all(|r| r.benchmark.is_none()));
    }

    #[test]
    fn summary_rows_pair_metrics() {
        let bench = report(10.0);
        let rows = summary_rows(&report(0.0), Some(&bench));
        assert_eq!(rows[4].metric, "max_drawdown");
        assert_eq!(rows[4].portfolio, 4.0);
        assert_eq!(rows[4].benchmark, Some(14.0));
    }
}
