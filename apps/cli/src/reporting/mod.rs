use std::io::Write;

use fwd_core::DiagnosticReport;

pub trait Reporter {
	fn name(&self) -> &'static str;
	fn render(&self, report: &DiagnosticReport, out: &mut dyn Write) -> anyhow::Result<()>;
}

pub mod csv;
pub mod json_summary;
pub mod registry;
pub mod text;

pub use csv::CsvReporter;
pub use json_summary::JsonSummaryReporter;
pub use text::HumanReporter;
