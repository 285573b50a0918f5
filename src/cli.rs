//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvPriceAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::analysis::{
    run_analysis, AnalysisConfig, AnalysisOutcome, SolverChoice, DEFAULT_RANDOM_SEARCH_ITERATIONS,
};
use crate::domain::config_validation::{
    parse_date, parse_method, parse_no_downside, parse_price_field, parse_value,
    validate_analysis_config, SolverMethod,
};
use crate::domain::error::PortfolioError;
use crate::domain::evaluator::{EvaluatorConfig, TRADING_DAYS_PER_YEAR};
use crate::domain::frontier::{DEFAULT_SAMPLE_COUNT, DEFAULT_SEED};
use crate::domain::optimizer::Constraints;
use crate::domain::universe::{check_coverage, parse_tickers};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceDataPort;
use crate::ports::report_port::ReportPort;

pub const DEFAULT_OUTPUT_DIR: &str = "./report";

#[derive(Parser, Debug)]
#[command(name = "minvar", about = "Minimum-variance portfolio analysis")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Optimize, sample the frontier, evaluate and write the report
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma-separated tickers overriding [analysis] tickers
        #[arg(long)]
        tickers: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show stored data range for the configured tickers or one ticker
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
    },
    /// List tickers available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Analyze {
            config,
            output,
            tickers,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, tickers.as_deref())
            } else {
                run_analyze(&config, output.as_deref(), tickers.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, ticker } => run_info(&config, ticker.as_deref()),
        Command::ListSymbols { config } => run_list_symbols(&config),
    }
}

fn fail(err: &PortfolioError) -> ExitCode {
    tracing::debug!(?err, "command failed");
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// Load and validate in one step.
fn load_valid_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    validate_analysis_config(&adapter).map_err(|e| fail(&e))?;
    Ok(adapter)
}

pub fn data_adapter(config: &dyn ConfigPort) -> Result<CsvPriceAdapter, PortfolioError> {
    let path = config
        .get_non_empty("data", "path")
        .ok_or_else(|| PortfolioError::ConfigMissing {
            section: "data".into(),
            key: "path".into(),
        })?;
    Ok(CsvPriceAdapter::new(PathBuf::from(path)))
}

pub fn resolve_output_dir(override_dir: Option<&Path>, config: &dyn ConfigPort) -> PathBuf {
    match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => PathBuf::from(
            config
                .get_non_empty("report", "output_dir")
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
        ),
    }
}

pub fn build_analysis_config(
    config: &dyn ConfigPort,
    ticker_override: Option<&str>,
) -> Result<AnalysisConfig, PortfolioError> {
    let raw_tickers = match ticker_override {
        Some(t) => t.to_string(),
        None => config
            .get_string("analysis", "tickers")
            .ok_or_else(|| PortfolioError::ConfigMissing {
                section: "analysis".into(),
                key: "tickers".into(),
            })?,
    };
    let tickers = parse_tickers(&raw_tickers).map_err(|e| PortfolioError::ConfigInvalid {
        section: "analysis".into(),
        key: "tickers".into(),
        reason: e.to_string(),
    })?;

    let benchmark = config
        .get_non_empty("analysis", "benchmark")
        .map(|b| b.to_uppercase());

    let solver = match parse_method(config)? {
        SolverMethod::ActiveSet => SolverChoice::ActiveSet,
        SolverMethod::RandomSearch => SolverChoice::RandomSearch {
            seed: parse_value(config, "optimizer", "seed")?.unwrap_or(DEFAULT_SEED),
            iterations: parse_value(config, "optimizer", "iterations")?
                .unwrap_or(DEFAULT_RANDOM_SEARCH_ITERATIONS),
        },
    };

    Ok(AnalysisConfig {
        tickers,
        benchmark,
        start_date: parse_date(config, "analysis", "start_date")?,
        end_date: parse_date(config, "analysis", "end_date")?,
        price_field: parse_price_field(config)?,
        constraints: Constraints {
            full_investment: config.get_bool("optimizer", "full_investment", true),
            long_only: config.get_bool("optimizer", "long_only", true),
        },
        solver,
        frontier_samples: parse_value(config, "frontier", "samples")?
            .unwrap_or(DEFAULT_SAMPLE_COUNT),
        frontier_seed: parse_value(config, "frontier", "seed")?.unwrap_or(DEFAULT_SEED),
        evaluator: EvaluatorConfig {
            periods_per_year: config.get_double(
                "evaluation",
                "periods_per_year",
                TRADING_DAYS_PER_YEAR,
            ),
            risk_free_rate: config.get_double("evaluation", "risk_free_rate", 0.0),
            minimum_acceptable_return: config.get_double(
                "evaluation",
                "minimum_acceptable_return",
                0.0,
            ),
            no_downside: parse_no_downside(config)?,
        },
    })
}

fn run_analyze(
    config_path: &Path,
    output: Option<&Path>,
    ticker_override: Option<&str>,
) -> ExitCode {
    // Stage 1: load and validate config
    let adapter = match load_valid_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: build analysis config
    let analysis = match build_analysis_config(&adapter, ticker_override) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let data = match data_adapter(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };

    // Stage 3: run the pipeline
    eprintln!(
        "Analyzing {} assets, {} to {}",
        analysis.tickers.len(),
        analysis.start_date,
        analysis.end_date
    );
    let outcome = match run_analysis(&data, &analysis) {
        Ok(o) => o,
        Err(e) => return fail(&e),
    };

    // Stage 4: print results
    print_summary(&outcome);

    // Stage 5: write report
    let output_dir = resolve_output_dir(output, &adapter);
    match CsvReportAdapter::new().write(&outcome, &output_dir) {
        Ok(()) => {
            eprintln!("\nReport written to: {}", output_dir.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

pub fn print_summary(outcome: &AnalysisOutcome) {
    println!("=== Minimum-Variance Weights ===");
    for (ticker, weight) in outcome.allocation() {
        println!("  {:<10} {:>8.2}%", ticker, weight * 100.0);
    }

    let r = &outcome.report;
    println!("\n=== Portfolio Performance ===");
    println!("Annualized Return:     {:.2}%", r.annualized_return * 100.0);
    println!("Annualized Volatility: {:.2}%", r.annualized_volatility * 100.0);
    println!("Sharpe Ratio:          {:.2}", r.sharpe_ratio);
    println!("Sortino Ratio:         {:.2}", r.sortino_ratio);
    println!("Max Drawdown:          -{:.1}%", r.max_drawdown * 100.0);

    let f = &outcome.frontier;
    println!("\n=== Efficient Frontier ===");
    println!(
        "Samples:               {} usable, {} degenerate",
        f.samples.len(),
        f.degenerate
    );
    println!("Optimum Risk:          {:.4}%", f.optimum.risk * 100.0);
    if let Some(min) = &f.min_risk {
        println!("Lowest Sampled Risk:   {:.4}%", min.risk * 100.0);
    }
    if let Some(best) = &f.max_sharpe {
        println!("Best Sampled Sharpe:   {:.4}", best.sharpe);
    }
    println!("Samples At Least As Risky: {:.1}%", f.share_riskier * 100.0);

    if let Some(b) = &outcome.benchmark {
        println!("\n=== Benchmark ({}) ===", b.benchmark.name);
        println!("Aligned Periods:       {}", b.periods());
        println!(
            "Total Return:          {:.2}% vs {:.2}%",
            b.portfolio.total_return * 100.0,
            b.benchmark.total_return * 100.0
        );
        println!(
            "Max Drawdown:          -{:.1}% vs -{:.1}%",
            b.portfolio.report.max_drawdown * 100.0,
            b.benchmark.report.max_drawdown * 100.0
        );
        println!(
            "Excess Annualized:     {:+.2}%",
            b.excess_annualized_return * 100.0
        );
    }
}

pub fn run_dry_run(config_path: &Path, ticker_override: Option<&str>) -> ExitCode {
    let adapter = match load_valid_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let analysis = match build_analysis_config(&adapter, ticker_override) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    eprintln!("Config validated successfully");

    eprintln!("\nUniverse:");
    eprintln!("  tickers: {}", analysis.tickers.join(", "));
    if let Some(b) = &analysis.benchmark {
        eprintln!("  benchmark: {}", b);
    }
    eprintln!("  range: {} to {}", analysis.start_date, analysis.end_date);
    eprintln!("\nOptimizer: {:?}", analysis.solver);
    eprintln!(
        "Frontier: {} samples, seed {}",
        analysis.frontier_samples, analysis.frontier_seed
    );

    let data = match data_adapter(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    let mut all = analysis.tickers.clone();
    all.extend(analysis.benchmark.iter().cloned());
    let coverage = match check_coverage(&data, &all) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    eprintln!("\nData coverage:");
    let mut missing = false;
    for c in &coverage {
        match c.range {
            Some((first, last, rows)) => {
                let flag = if c.is_usable() { "OK" } else { "TOO SHORT" };
                eprintln!("  {}: {} to {} ({} rows) [{}]", c.ticker, first, last, rows, flag);
            }
            None => eprintln!("  {}: no data", c.ticker),
        }
        missing |= !c.is_usable();
    }

    if missing {
        let err = PortfolioError::DataSource {
            reason: "some tickers have no usable data".into(),
        };
        return fail(&err);
    }

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    match load_valid_config(config_path) {
        Ok(_) => {
            println!("Configuration is valid: {}", config_path.display());
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}

fn run_info(config_path: &Path, ticker: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data = match data_adapter(&config) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };

    let tickers = match ticker {
        Some(t) => vec![t.to_uppercase()],
        None => match data.list_symbols() {
            Ok(s) => s,
            Err(e) => return fail(&e),
        },
    };

    let coverage = match check_coverage(&data, &tickers) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    if coverage.is_empty() {
        eprintln!("No data found");
        return ExitCode::SUCCESS;
    }
    println!("{:<10} {:<12} {:<12} {:>8}", "Ticker", "First", "Last", "Rows");
    for c in &coverage {
        match c.range {
            Some((first, last, rows)) => {
                println!("{:<10} {:<12} {:<12} {:>8}", c.ticker, first, last, rows)
            }
            None => println!("{:<10} {:<12} {:<12} {:>8}", c.ticker, "-", "-", 0),
        }
    }
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data = match data_adapter(&config) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    match data.list_symbols() {
        Ok(symbols) => {
            if symbols.is_empty() {
                eprintln!("No symbols found");
            }
            for symbol in &symbols {
                println!("{}", symbol);
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
