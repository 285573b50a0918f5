//! Ticker universe parsing and data coverage checks.

use crate::domain::error::PortfolioError;
use crate::domain::returns::MIN_OBSERVATIONS;
use crate::ports::data_port::PriceDataPort;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),
}

/// Comma-separated tickers, trimmed and upper-cased, order preserved.
pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let ticker = trimmed.to_uppercase();
        if !seen.insert(ticker.clone()) {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
        tickers.push(ticker);
    }

    Ok(tickers)
}

/// Stored coverage for one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub ticker: String,
    pub range: Option<(chrono::NaiveDate, chrono::NaiveDate, usize)>,
}

impl Coverage {
    pub fn is_usable(&self) -> bool {
        matches!(self.range, Some((_, _, rows)) if rows >= MIN_OBSERVATIONS)
    }
}

/// Look up the stored range of every ticker without loading prices.
pub fn check_coverage(
    data_port: &dyn PriceDataPort,
    tickers: &[String],
) -> Result<Vec<Coverage>, PortfolioError> {
    tickers
        .iter()
        .map(|t| {
            let range = data_port.get_data_range(t)?;
            if range.is_none() {
                tracing::warn!(ticker = %t, "no stored data");
            }
            Ok(Coverage {
                ticker: t.clone(),
                range,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trimmed_upper_cased_tickers() {
        let result = parse_tickers("  aapl , MSFT ,spy").unwrap();
        assert_eq!(result, vec!["AAPL", "MSFT", "SPY"]);
    }

    #[test]
    fn single_ticker() {
        assert_eq!(parse_tickers("GLD").unwrap(), vec!["GLD"]);
    }

    #[test]
    fn empty_token_is_rejected() {
        assert_eq!(parse_tickers("AAPL,,MSFT"), Err(UniverseError::EmptyToken));
        assert_eq!(parse_tickers(""), Err(UniverseError::EmptyToken));
    }

    #[test]
    fn duplicates_are_rejected_case_insensitively() {
        assert_eq!(
            parse_tickers("AAPL,msft,aapl"),
            Err(UniverseError::DuplicateTicker("AAPL".into()))
        );
    }

    #[test]
    fn coverage_needs_two_rows() {
        let d = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let one = Coverage {
            ticker: "X".into(),
            range: Some((d, d, 1)),
        };
        let none = Coverage {
            ticker: "Y".into(),
            range: None,
        };
        assert!(!one.is_usable());
        assert!(!none.is_usable());
    }
}
