//! Configuration validation.
//!
//! Every field is checked before any price data is read. Numeric keys are
//! parsed strictly here: the config port falls back to defaults on garbage,
//! which would otherwise hide typos.

use crate::domain::error::PortfolioError;
use crate::domain::evaluator::NoDownsidePolicy;
use crate::domain::price::PriceField;
use crate::domain::universe::parse_tickers;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

/// Optimizer method named in `[optimizer] method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverMethod {
    ActiveSet,
    RandomSearch,
}

pub fn validate_analysis_config(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    validate_data(config)?;
    validate_dates(config)?;
    validate_tickers(config)?;
    validate_optimizer(config)?;
    validate_frontier(config)?;
    validate_evaluation(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> PortfolioError {
    PortfolioError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> PortfolioError {
    PortfolioError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// Strictly parsed optional value.
pub fn parse_value<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, PortfolioError>
where
    T::Err: std::fmt::Display,
{
    match config.get_non_empty(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(section, key, format!("cannot parse {raw:?}: {e}"))),
    }
}

pub fn parse_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<NaiveDate, PortfolioError> {
    let raw = config
        .get_non_empty(section, key)
        .ok_or_else(|| missing(section, key))?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| invalid(section, key, format!("invalid {key} format, expected YYYY-MM-DD")))
}

pub fn parse_method(config: &dyn ConfigPort) -> Result<SolverMethod, PortfolioError> {
    match config.get_non_empty("optimizer", "method").as_deref() {
        None | Some("active_set") => Ok(SolverMethod::ActiveSet),
        Some("random_search") => Ok(SolverMethod::RandomSearch),
        Some(other) => Err(invalid(
            "optimizer",
            "method",
            format!("unknown method {other:?}, expected active_set or random_search"),
        )),
    }
}

pub fn parse_no_downside(config: &dyn ConfigPort) -> Result<NoDownsidePolicy, PortfolioError> {
    match config.get_non_empty("evaluation", "no_downside").as_deref() {
        None | Some("fail") => Ok(NoDownsidePolicy::Fail),
        Some("zero") => Ok(NoDownsidePolicy::ReportZero),
        Some(other) => Err(invalid(
            "evaluation",
            "no_downside",
            format!("unknown policy {other:?}, expected fail or zero"),
        )),
    }
}

pub fn parse_price_field(config: &dyn ConfigPort) -> Result<PriceField, PortfolioError> {
    match config.get_non_empty("data", "price_field").as_deref() {
        None | Some("close") => Ok(PriceField::Close),
        Some("adj_close") => Ok(PriceField::AdjustedClose),
        Some(other) => Err(invalid(
            "data",
            "price_field",
            format!("unknown field {other:?}, expected close or adj_close"),
        )),
    }
}

fn validate_data(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    config
        .get_non_empty("data", "path")
        .ok_or_else(|| missing("data", "path"))?;
    parse_price_field(config)?;
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    let start = parse_date(config, "analysis", "start_date")?;
    let end = parse_date(config, "analysis", "end_date")?;
    if start >= end {
        return Err(invalid(
            "analysis",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn validate_tickers(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    let raw = config
        .get_string("analysis", "tickers")
        .ok_or_else(|| missing("analysis", "tickers"))?;
    parse_tickers(&raw).map_err(|e| invalid("analysis", "tickers", e.to_string()))?;

    if let Some(raw) = config.get_string("analysis", "benchmark") {
        let parsed = parse_tickers(&raw).map_err(|e| invalid("analysis", "benchmark", e.to_string()))?;
        if parsed.len() != 1 {
            return Err(invalid("analysis", "benchmark", "expected a single ticker"));
        }
    }
    Ok(())
}

fn validate_optimizer(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    parse_method(config)?;
    parse_value::<u64>(config, "optimizer", "seed")?;
    if let Some(0) = parse_value::<usize>(config, "optimizer", "iterations")? {
        return Err(invalid("optimizer", "iterations", "iterations must be positive"));
    }
    for key in ["long_only", "full_investment"] {
        parse_value::<BoolFlag>(config, "optimizer", key)?;
    }
    Ok(())
}

fn validate_frontier(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    if let Some(0) = parse_value::<usize>(config, "frontier", "samples")? {
        return Err(invalid("frontier", "samples", "samples must be positive"));
    }
    parse_value::<u64>(config, "frontier", "seed")?;
    Ok(())
}

fn validate_evaluation(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    if let Some(ppy) = parse_value::<f64>(config, "evaluation", "periods_per_year")? {
        if !(ppy.is_finite() && ppy > 0.0) {
            return Err(invalid(
                "evaluation",
                "periods_per_year",
                "periods_per_year must be positive",
            ));
        }
    }
    for key in ["risk_free_rate", "minimum_acceptable_return"] {
        if let Some(rate) = parse_value::<f64>(config, "evaluation", key)? {
            if !rate.is_finite() {
                return Err(invalid("evaluation", key, format!("{key} must be finite")));
            }
        }
    }
    parse_no_downside(config)?;
    Ok(())
}

/// Booleans in the spellings the config adapter accepts.
struct BoolFlag;

impl FromStr for BoolFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "true" | "yes" | "1" | "false" | "no" | "0" => Ok(BoolFlag),
            _ => Err("expected true/false, yes/no or 1/0".into()),
        }
    }
}
