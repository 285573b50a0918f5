//! Daily close price series.

use crate::domain::error::PortfolioError;
use chrono::NaiveDate;

/// Which price column returns are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceField {
    #[default]
    Close,
    /// Adjusted close, falling back to close where no adjusted value exists.
    AdjustedClose,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
    pub adj_close: Option<f64>,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            close,
            adj_close: None,
        }
    }

    pub fn with_adjusted(date: NaiveDate, close: f64, adj_close: f64) -> Self {
        Self {
            date,
            close,
            adj_close: Some(adj_close),
        }
    }

    pub fn value(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Close => self.close,
            PriceField::AdjustedClose => self.adj_close.unwrap_or(self.close),
        }
    }
}

/// A ticker and its chronologically ordered prices.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub ticker: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(ticker: impl Into<String>, points: Vec<PricePoint>) -> Self {
        Self {
            ticker: ticker.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date)),
            _ => None,
        }
    }

    /// Dates strictly increasing, prices finite and positive.
    pub fn validate(&self, field: PriceField) -> Result<(), PortfolioError> {
        for pair in self.points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(PortfolioError::InvalidPriceSeries {
                    ticker: self.ticker.clone(),
                    reason: format!(
                        "dates not strictly increasing at {} -> {}",
                        pair[0].date, pair[1].date
                    ),
                });
            }
        }

        if let Some(bad) = self.points.iter().find(|p| {
            let v = p.value(field);
            !v.is_finite() || v <= 0.0
        }) {
            return Err(PortfolioError::InvalidPriceSeries {
                ticker: self.ticker.clone(),
                reason: format!("non-positive price {} on {}", bad.value(field), bad.date),
            });
        }

        Ok(())
    }

    /// Simple returns `p_t / p_{t-1} - 1`, each dated at `t`.
    pub fn simple_returns(&self, field: PriceField) -> Vec<(NaiveDate, f64)> {
        self.points
            .windows(2)
            .map(|w| (w[1].date, w[1].value(field) / w[0].value(field) - 1.0))
            .collect()
    }
}
