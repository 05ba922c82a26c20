use std::io::Write;

use anyhow::Result;
use fwd_core::DiagnosticReport;

use super::Reporter;

/// The whole report, as saved next to the logs
#[derive(Debug, Default)]
pub struct JsonSummaryReporter;

impl Reporter for JsonSummaryReporter {
	fn name(&self) -> &'static str {
		"json"
	}

	fn render(&self, report: &DiagnosticReport, out: &mut dyn Write) -> Result<()> {
		serde_json::to_writer_pretty(&mut *out, report)?;
		writeln!(out)?;
		Ok(())
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	use crate::reporting::test_utils::report;

	#[test]
	fn renders_backend_outcomes() {
		let mut out = Vec::new();
		JsonSummaryReporter.render(&report(), &mut out).unwrap();

		let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
		let backends = value["backends"].as_array().unwrap();

		assert_eq!(backends.len(), 3);
		assert_eq!(backends[0]["outcome"]["status"], "verified");
		assert_eq!(backends[0]["outcome"]["verdict"]["delivered_count"], 2);
		assert_eq!(backends[2]["outcome"]["status"], "unavailable");
		assert_eq!(backends[2]["outcome"]["failure"]["kind"], "unavailable");
	}
}
