//! Report generation port trait.

use crate::domain::analysis::AnalysisOutcome;
use crate::domain::error::PortfolioError;
use std::path::Path;

/// Port for writing analysis reports.
pub trait ReportPort {
    fn write(&self, outcome: &AnalysisOutcome, output_dir: &Path) -> Result<(), PortfolioError>;
}
