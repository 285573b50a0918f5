//! Returns matrix builder and return series.
//!
//! Per-asset simple returns are aligned on the dates every asset shares
//! (inner join). Row order is chronological and is never changed after
//! construction: drawdown and every other time-series metric depend on it.

use crate::domain::error::PortfolioError;
use crate::domain::price::{PriceField, PriceSeries};
use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use std::collections::{HashMap, HashSet};

/// Fewest prices per asset, and fewest aligned return rows, accepted.
pub const MIN_OBSERVATIONS: usize = 2;

/// A dated sequence of per-period returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ReturnSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self, PortfolioError> {
        if dates.len() != values.len() {
            return Err(PortfolioError::DimensionMismatch {
                expected: dates.len(),
                actual: values.len(),
            });
        }
        if dates.windows(2).any(|w| w[1] <= w[0]) {
            return Err(PortfolioError::InvalidPriceSeries {
                ticker: "return series".into(),
                reason: "dates not strictly increasing".into(),
            });
        }
        Ok(Self { dates, values })
    }

    /// Returns of one asset from its price series.
    pub fn from_prices(series: &PriceSeries, field: PriceField) -> Result<Self, PortfolioError> {
        series.validate(field)?;
        let (dates, values) = series.simple_returns(field).into_iter().unzip();
        Ok(Self { dates, values })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.dates.first(), self.dates.last()) {
            (Some(&a), Some(&b)) => Some((a, b)),
            _ => None,
        }
    }

    /// Wealth after each period, starting from 1: `∏(1 + r)`.
    pub fn cumulative_wealth(&self) -> Vec<f64> {
        self.values
            .iter()
            .scan(1.0_f64, |wealth, r| {
                *wealth *= 1.0 + r;
                Some(*wealth)
            })
            .collect()
    }

    /// Keep only the observations whose date is in `keep`, preserving order.
    pub fn restrict_to(&self, keep: &HashSet<NaiveDate>) -> Self {
        let (dates, values) = self
            .dates
            .iter()
            .zip(&self.values)
            .filter(|(d, _)| keep.contains(*d))
            .map(|(&d, &v)| (d, v))
            .unzip();
        Self { dates, values }
    }
}

/// Asset returns aligned on common dates: one row per date, one column per asset.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnsMatrix {
    assets: Vec<String>,
    dates: Vec<NaiveDate>,
    rows: Vec<Vec<f64>>,
}

impl ReturnsMatrix {
    /// Build from per-asset price series; assets keep the order given.
    pub fn build(series: &[PriceSeries], field: PriceField) -> Result<Self, PortfolioError> {
        if series.is_empty() {
            return Err(PortfolioError::InsufficientData {
                scope: "asset universe".into(),
                observations: 0,
                minimum: 1,
            });
        }

        let mut seen = HashSet::new();
        let mut per_asset: Vec<HashMap<NaiveDate, f64>> = Vec::with_capacity(series.len());
        let mut first_dates: Vec<NaiveDate> = Vec::new();

        for s in series {
            if !seen.insert(s.ticker.as_str()) {
                return Err(PortfolioError::InvalidPriceSeries {
                    ticker: s.ticker.clone(),
                    reason: "duplicate ticker".into(),
                });
            }
            if s.len() < MIN_OBSERVATIONS {
                return Err(PortfolioError::InsufficientData {
                    scope: s.ticker.clone(),
                    observations: s.len(),
                    minimum: MIN_OBSERVATIONS,
                });
            }
            let returns = ReturnSeries::from_prices(s, field)?;
            if first_dates.is_empty() {
                first_dates = returns.dates.clone();
            }
            per_asset.push(returns.dates.into_iter().zip(returns.values).collect());
        }

        let mut dates = Vec::new();
        let mut rows = Vec::new();
        for date in first_dates {
            let row: Option<Vec<f64>> = per_asset.iter().map(|m| m.get(&date).copied()).collect();
            match row {
                Some(row) if row.iter().all(|v| v.is_finite()) => {
                    dates.push(date);
                    rows.push(row);
                }
                _ => {}
            }
        }

        let assets = series.iter().map(|s| s.ticker.clone()).collect();
        Self::from_rows(assets, dates, rows)
    }

    /// Build directly from aligned rows.
    pub fn from_rows(
        assets: Vec<String>,
        dates: Vec<NaiveDate>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, PortfolioError> {
        if assets.is_empty() {
            return Err(PortfolioError::InsufficientData {
                scope: "asset universe".into(),
                observations: 0,
                minimum: 1,
            });
        }
        if dates.len() != rows.len() {
            return Err(PortfolioError::DimensionMismatch {
                expected: dates.len(),
                actual: rows.len(),
            });
        }
        if rows.len() < MIN_OBSERVATIONS {
            return Err(PortfolioError::InsufficientData {
                scope: "aligned returns".into(),
                observations: rows.len(),
                minimum: MIN_OBSERVATIONS,
            });
        }
        if let Some(row) = rows.iter().find(|r| r.len() != assets.len()) {
            return Err(PortfolioError::DimensionMismatch {
                expected: assets.len(),
                actual: row.len(),
            });
        }
        if dates.windows(2).any(|w| w[1] <= w[0]) {
            return Err(PortfolioError::InvalidPriceSeries {
                ticker: assets.join(","),
                reason: "return dates not strictly increasing".into(),
            });
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(PortfolioError::InvalidPriceSeries {
                ticker: assets.join(","),
                reason: "non-finite return".into(),
            });
        }

        Ok(Self {
            assets,
            dates,
            rows,
        })
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn n_observations(&self) -> usize {
        self.rows.len()
    }

    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        // from_rows guarantees at least MIN_OBSERVATIONS rows
        (self.dates[0], self.dates[self.dates.len() - 1])
    }

    pub fn column(&self, asset: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[asset]).collect()
    }

    /// Column means.
    pub fn expected_returns(&self) -> DVector<f64> {
        let t = self.n_observations() as f64;
        DVector::from_fn(self.n_assets(), |j, _| {
            self.rows.iter().map(|row| row[j]).sum::<f64>() / t
        })
    }

    /// Sample covariance of the columns (divisor T - 1).
    pub fn covariance(&self) -> DMatrix<f64> {
        let n = self.n_assets();
        let t = self.n_observations();
        let means = self.expected_returns();
        let centered = DMatrix::from_fn(t, n, |i, j| self.rows[i][j] - means[j]);
        (centered.transpose() * &centered) / (t as f64 - 1.0)
    }

    /// Weighted sum of each row: the realized portfolio return series.
    pub fn portfolio_returns(&self, weights: &[f64]) -> Result<ReturnSeries, PortfolioError> {
        if weights.len() != self.n_assets() {
            return Err(PortfolioError::DimensionMismatch {
                expected: self.n_assets(),
                actual: weights.len(),
            });
        }
        let values = self
            .rows
            .iter()
            .map(|row| row.iter().zip(weights).map(|(r, w)| r * w).sum())
            .collect();
        Ok(ReturnSeries {
            dates: self.dates.clone(),
            values,
        })
    }
}
