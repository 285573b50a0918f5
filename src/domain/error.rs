//! Domain error types.

use chrono::NaiveDate;
use std::fmt;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    DataSource,
    ReturnsBuilder,
    Optimizer,
    FrontierSampler,
    Evaluator,
    Benchmark,
    Report,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::DataSource => "data source",
            Component::ReturnsBuilder => "returns builder",
            Component::Optimizer => "optimizer",
            Component::FrontierSampler => "frontier sampler",
            Component::Evaluator => "performance evaluator",
            Component::Benchmark => "benchmark comparison",
            Component::Report => "report",
        };
        f.write_str(name)
    }
}

/// Top-level error type for minvar.
#[derive(Debug, thiserror::Error)]
pub enum PortfolioError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("no price data for {ticker}")]
    NoData { ticker: String },

    #[error("invalid price series for {ticker}: {reason}")]
    InvalidPriceSeries { ticker: String, reason: String },

    #[error("insufficient data for {scope}: have {observations} observations, need {minimum}")]
    InsufficientData {
        scope: String,
        observations: usize,
        minimum: usize,
    },

    #[error("ill-conditioned covariance matrix: {reason}")]
    IllConditionedCovariance { reason: String },

    #[error("unsupported constraint set: {reason}")]
    InvalidConstraints { reason: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("degenerate portfolio risk {risk:e}")]
    DegenerateRisk { risk: f64 },

    #[error("return series is empty")]
    EmptySeries,

    #[error("no return falls below the minimum acceptable return {mar}")]
    NoDownsideObservations { mar: f64 },

    #[error("return series has zero volatility")]
    ZeroVolatility,

    #[error("{component} failed for [{assets}] over {start} to {end}: {source}")]
    Stage {
        component: Component,
        assets: String,
        start: NaiveDate,
        end: NaiveDate,
        source: Box<PortfolioError>,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortfolioError {
    /// Attach the failing component, the assets involved and the date range.
    pub fn during(
        self,
        component: Component,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        PortfolioError::Stage {
            component,
            assets: assets.join(","),
            start,
            end,
            source: Box::new(self),
        }
    }

    /// The innermost error, with any stage context peeled off.
    pub fn root(&self) -> &PortfolioError {
        match self {
            PortfolioError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// The outermost component this error was attributed to, if any.
    pub fn component(&self) -> Option<Component> {
        match self {
            PortfolioError::Stage { component, .. } => Some(*component),
            _ => None,
        }
    }
}

impl From<&PortfolioError> for std::process::ExitCode {
    fn from(err: &PortfolioError) -> Self {
        let code: u8 = match err.root() {
            PortfolioError::Io(_) | PortfolioError::Csv(_) => 1,
            PortfolioError::ConfigParse { .. }
            | PortfolioError::ConfigMissing { .. }
            | PortfolioError::ConfigInvalid { .. } => 2,
            PortfolioError::DataSource { .. } | PortfolioError::NoData { .. } => 3,
            PortfolioError::InvalidPriceSeries { .. } | PortfolioError::InsufficientData { .. } => 4,
            PortfolioError::IllConditionedCovariance { .. }
            | PortfolioError::InvalidConstraints { .. }
            | PortfolioError::DimensionMismatch { .. } => 5,
            PortfolioError::DegenerateRisk { .. }
            | PortfolioError::EmptySeries
            | PortfolioError::NoDownsideObservations { .. }
            | PortfolioError::ZeroVolatility => 6,
            PortfolioError::Stage { .. } => 1,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn stage_message_names_component_assets_and_range() {
        let err = PortfolioError::IllConditionedCovariance {
            reason: "singular".into(),
        }
        .during(
            Component::Optimizer,
            &["AAPL".to_string(), "MSFT".to_string()],
            date(2020, 1, 1),
            date(2020, 12, 31),
        );

        let msg = err.to_string();
        assert!(msg.starts_with("optimizer failed for [AAPL,MSFT] over 2020-01-01 to 2020-12-31"));
        assert!(msg.ends_with("ill-conditioned covariance matrix: singular"));
    }

    #[test]
    fn root_peels_nested_stages() {
        let err = PortfolioError::EmptySeries
            .during(Component::Evaluator, &[], date(2020, 1, 1), date(2020, 2, 1))
            .during(Component::Benchmark, &[], date(2020, 1, 1), date(2020, 2, 1));

        assert!(matches!(err.root(), PortfolioError::EmptySeries));
        assert_eq!(err.component(), Some(Component::Benchmark));
    }

    #[test]
    fn exit_code_follows_root_kind() {
        let wrapped = PortfolioError::ConfigMissing {
            section: "analysis".into(),
            key: "tickers".into(),
        }
        .during(Component::DataSource, &[], date(2020, 1, 1), date(2020, 2, 1));

        let code: std::process::ExitCode = (&wrapped).into();
        assert_eq!(
            format!("{code:?}"),
            format!("{:?}", std::process::ExitCode::from(2))
        );
    }
}
