//! Price data access port trait.

use crate::domain::error::PortfolioError;
use crate::domain::price::PriceSeries;
use chrono::NaiveDate;

pub trait PriceDataPort {
    /// Prices for `ticker` within the inclusive range, oldest first.
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, PortfolioError>;

    fn list_symbols(&self) -> Result<Vec<String>, PortfolioError>;

    /// First date, last date and row count, or `None` for an unknown ticker.
    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortfolioError>;
}
