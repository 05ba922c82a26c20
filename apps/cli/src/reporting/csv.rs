use std::{io::Write, time::Duration};

use anyhow::Result;
use fwd_core::{BackendOutcome, DiagnosticReport};

use super::Reporter;

const HEADER: &str = "Backend,Status,Operations,Delivered,Missed,Coalesced,Reordered,Duplicated,\
	Reliability,Notified,Mean_latency_ms,Max_latency_ms,Records,Unrelated,Overflows,Failure";

/// One row per backend
#[derive(Debug, Default)]
pub struct CsvReporter;

impl Reporter for CsvReporter {
	fn name(&self) -> &'static str {
		"csv"
	}

	fn render(&self, report: &DiagnosticReport, out: &mut dyn Write) -> Result<()> {
		writeln!(out, "{HEADER}")?;

		for backend in &report.backends {
			match &backend.outcome {
				BackendOutcome::Verified {
					verdict,
					record_count,
					unrelated_records,
					overflow_events,
					interrupted,
					..
				} => writeln!(
					out,
					"{},verified,{},{},{},{},{},{},{:.4},{:.4},{},{},{},{},{},{}",
					backend.backend_id,
					verdict.total_operations,
					verdict.delivered_count,
					verdict.missed_count,
					verdict.coalesced_count,
					verdict.reordered_count,
					verdict.duplicated_count,
					verdict.reliability_ratio,
					verdict.notified_ratio,
					millis(verdict.mean_latency),
					millis(verdict.max_latency),
					record_count,
					unrelated_records,
					overflow_events,
					interrupted
						.as_ref()
						.map(|failure| escape(&failure.to_string()))
						.unwrap_or_default(),
				)?,
				BackendOutcome::Unavailable { failure } => writeln!(
					out,
					"{},unavailable,{},,,,,,,,,,,,,{}",
					backend.backend_id,
					report.operations.len(),
					escape(&failure.to_string()),
				)?,
			}
		}

		Ok(())
	}
}

fn millis(latency: Option<Duration>) -> String {
	latency
		.map(|latency| format!("{:.3}", latency.as_secs_f64() * 1_000.0))
		.unwrap_or_default()
}

fn escape(field: &str) -> String {
	if field.contains([',', '"', '\n']) {
		format!("\"{}\"", field.replace('"', "\"\""))
	} else {
		field.to_string()
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	use crate::reporting::test_utils::report;

	#[test]
	fn one_row_per_backend() {
		let mut out = Vec::new();
		CsvReporter.render(&report(), &mut out).unwrap();
		let out = String::from_utf8(out).unwrap();
		let lines = out.lines().collect::<Vec<_>>();

		assert_eq!(lines.len(), 4);
		assert_eq!(lines[0].split(',').count(), 16);
		assert_eq!(
			lines[1],
			"inotify,verified,2,2,0,0,0,0,1.0000,1.0000,2.000,2.000,2,0,0,"
		);
		assert!(lines[2].starts_with("poll,verified,2,1,1,0,0,0,0.5000,0.5000,"));
		assert_eq!(
			lines[3],
			"broken,unavailable,2,,,,,,,,,,,,,\"backend unavailable: no \"\"inotify\"\", sorry\""
		);
	}
}
