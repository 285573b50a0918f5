//! CSV file price data adapter: one `<TICKER>.csv` per ticker.

use crate::domain::error::PortfolioError;
use crate::domain::price::{PricePoint, PriceSeries};
use crate::ports::data_port::PriceDataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Extra columns are ignored; `adj_close` is optional.
#[derive(Debug, Deserialize)]
struct PriceRow {
    date: String,
    close: f64,
    #[serde(default)]
    adj_close: Option<f64>,
}

pub struct CsvPriceAdapter {
    base_path: PathBuf,
}

impl CsvPriceAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{ticker}.csv"))
    }

    /// Every row of the file, sorted by date, duplicates rejected.
    fn read_all(&self, ticker: &str) -> Result<Vec<PricePoint>, PortfolioError> {
        let path = self.csv_path(ticker);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PortfolioError::NoData {
                ticker: ticker.to_string(),
            },
            _ => PortfolioError::DataSource {
                reason: format!("failed to read {}: {}", path.display(), e),
            },
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut points = Vec::new();

        for (line, result) in rdr.deserialize::<PriceRow>().enumerate() {
            let row = result.map_err(|e| PortfolioError::DataSource {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").map_err(|e| {
                PortfolioError::DataSource {
                    reason: format!(
                        "{} row {}: invalid date {:?}: {}",
                        path.display(),
                        line + 1,
                        row.date,
                        e
                    ),
                }
            })?;
            points.push(PricePoint {
                date,
                close: row.close,
                adj_close: row.adj_close,
            });
        }

        points.sort_by_key(|p| p.date);
        if let Some(pair) = points.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(PortfolioError::InvalidPriceSeries {
                ticker: ticker.to_string(),
                reason: format!("duplicate date {}", pair[0].date),
            });
        }
        Ok(points)
    }
}

impl PriceDataPort for CsvPriceAdapter {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, PortfolioError> {
        let points = self
            .read_all(ticker)?
            .into_iter()
            .filter(|p| p.date >= start_date && p.date <= end_date)
            .collect();
        Ok(PriceSeries::new(ticker, points))
    }

    fn list_symbols(&self) -> Result<Vec<String>, PortfolioError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| PortfolioError::DataSource {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PortfolioError::DataSource {
                reason: format!("directory entry error: {}", e),
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortfolioError> {
        let points = match self.read_all(ticker) {
            Ok(points) => points,
            Err(PortfolioError::NoData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(match (points.first(), points.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, points.len())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        // out of order on purpose; volume is an ignored extra column
        fs::write(
            path.join("AAPL.csv"),
            "date,close,adj_close,volume\n\
             2024-01-17,115.0,114.0,55000\n\
             2024-01-15,105.0,104.0,50000\n\
             2024-01-16,110.0,,60000\n",
        )
        .unwrap();
        fs::write(path.join("GLD.csv"), "date,close\n2024-01-15,180.5\n").unwrap();
        fs::write(path.join("EMPTY.csv"), "date,close\n").unwrap();
        fs::write(
            path.join("DUP.csv"),
            "date,close\n2024-01-15,1.0\n2024-01-15,2.0\n",
        )
        .unwrap();
        fs::write(path.join("notes.txt"), "not prices").unwrap();

        (dir, path)
    }

    #[test]
    fn fetch_prices_sorts_and_reads_optional_adjusted() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);

        let series = adapter
            .fetch_prices("AAPL", date(1, 1), date(1, 31))
            .unwrap();

        assert_eq!(series.ticker, "AAPL");
        assert_eq!(series.len(), 3);
        assert_eq!(series.points[0].date, date(1, 15));
        assert_eq!(series.points[0].close, 105.0);
        assert_eq!(series.points[0].adj_close, Some(104.0));
        assert_eq!(series.points[1].adj_close, None);
        assert_eq!(series.points[2].date, date(1, 17));
    }

    #[test]
    fn fetch_prices_filters_inclusive_range() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);

        let series = adapter
            .fetch_prices("AAPL", date(1, 16), date(1, 17))
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].date, date(1, 16));
    }

    #[test]
    fn close_only_file_has_no_adjusted() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);
        let series = adapter.fetch_prices("GLD", date(1, 1), date(12, 31)).unwrap();
        assert_eq!(series.points[0].adj_close, None);
    }

    #[test]
    fn missing_file_is_no_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);
        let result = adapter.fetch_prices("XYZ", date(1, 1), date(1, 31));
        assert!(matches!(result, Err(PortfolioError::NoData { ticker }) if ticker == "XYZ"));
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);
        let result = adapter.fetch_prices("DUP", date(1, 1), date(1, 31));
        assert!(matches!(result, Err(PortfolioError::InvalidPriceSeries { .. })));
    }

    #[test]
    fn malformed_row_is_a_data_source_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("BAD.csv"), "date,close\n2024-01-15,abc\n").unwrap();
        let adapter = CsvPriceAdapter::new(dir.path().to_path_buf());
        let result = adapter.fetch_prices("BAD", date(1, 1), date(1, 31));
        assert!(matches!(result, Err(PortfolioError::DataSource { .. })));
    }

    #[test]
    fn list_symbols_returns_csv_stems_sorted() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);
        assert_eq!(
            adapter.list_symbols().unwrap(),
            vec!["AAPL", "DUP", "EMPTY", "GLD"]
        );
    }

    #[test]
    fn get_data_range_reports_span_and_count() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);

        assert_eq!(
            adapter.get_data_range("AAPL").unwrap(),
            Some((date(1, 15), date(1, 17), 3))
        );
        assert_eq!(adapter.get_data_range("EMPTY").unwrap(), None);
        assert_eq!(adapter.get_data_range("XYZ").unwrap(), None);
    }
}
