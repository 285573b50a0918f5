#![allow(dead_code)]

use chrono::NaiveDate;
use minvar::domain::error::PortfolioError;
use minvar::domain::price::{PricePoint, PriceSeries};
use minvar::ports::data_port::PriceDataPort;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub struct MockPriceDataPort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockPriceDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_prices(mut self, ticker: &str, points: Vec<PricePoint>) -> Self {
        self.data.insert(ticker.to_string(), points);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl PriceDataPort for MockPriceDataPort {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, PortfolioError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(PortfolioError::DataSource {
                reason: reason.clone(),
            });
        }
        let points = self.data.get(ticker).ok_or_else(|| PortfolioError::NoData {
            ticker: ticker.to_string(),
        })?;
        Ok(PriceSeries::new(
            ticker,
            points
                .iter()
                .filter(|p| p.date >= start_date && p.date <= end_date)
                .copied()
                .collect(),
        ))
    }

    fn list_symbols(&self) -> Result<Vec<String>, PortfolioError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortfolioError> {
        Ok(self.data.get(ticker).and_then(|points| {
            let first = points.iter().map(|p| p.date).min()?;
            let last = points.iter().map(|p| p.date).max()?;
            Some((first, last, points.len()))
        }))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Prices compounding the given returns from `start_price`, one per day.
pub fn prices_from_returns(start: NaiveDate, start_price: f64, returns: &[f64]) -> Vec<PricePoint> {
    let mut price = start_price;
    let mut points = vec![PricePoint::new(start, price)];
    for (i, r) in returns.iter().enumerate() {
        price *= 1.0 + r;
        points.push(PricePoint::new(
            start + chrono::Duration::days(i as i64 + 1),
            price,
        ));
    }
    points
}

/// Seeded random walk with the given daily drift and volatility.
pub fn random_walk(seed: u64, start: NaiveDate, days: usize, drift: f64, vol: f64) -> Vec<PricePoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let returns: Vec<f64> = (0..days)
        .map(|_| drift + vol * rng.gen_range(-1.0..1.0))
        .collect();
    prices_from_returns(start, 100.0, &returns)
}

/// A mock port holding a few distinct random walks plus an `SPY` benchmark.
pub fn sample_market() -> MockPriceDataPort {
    let start = date(2023, 1, 1);
    MockPriceDataPort::new()
        .with_prices("AAA", random_walk(1, start, 120, 0.0005, 0.010))
        .with_prices("BBB", random_walk(2, start, 120, 0.0003, 0.020))
        .with_prices("CCC", random_walk(3, start, 120, 0.0008, 0.015))
        .with_prices("SPY", random_walk(4, start, 120, 0.0004, 0.012))
}

/// Write `<TICKER>.csv` with `date,close` rows.
pub fn write_price_csv(dir: &Path, ticker: &str, points: &[PricePoint]) {
    let mut content = String::from("date,close\n");
    for p in points {
        content.push_str(&format!("{},{}\n", p.date, p.close));
    }
    fs::write(dir.join(format!("{ticker}.csv")), content).unwrap();
}
