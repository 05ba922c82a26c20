use std::{io::Write, time::Duration};

use anyhow::Result;
use fwd_core::{
	quick_check::{CheckKind, QuickCheckReport},
	BackendOutcome, BackendReport, DiagnosticReport, Notice,
};
use fwd_sys_probe::WatchLimits;

use super::Reporter;

/// Summary meant for a terminal
#[derive(Debug, Default)]
pub struct HumanReporter;

impl Reporter for HumanReporter {
	fn name(&self) -> &'static str {
		"human"
	}

	fn render(&self, report: &DiagnosticReport, out: &mut dyn Write) -> Result<()> {
		writeln!(out, "File watch diagnostics {}", report.run_id)?;
		writeln!(out, "  Scratch directory: {}", report.scratch_dir.display())?;
		writeln!(out, "  Operations issued: {}", report.operations.len())?;

		if let Some(host) = &report.host {
			writeln!(
				out,
				"  Host: {} {} (kernel {}), {} CPUs, {} MiB",
				host.os_name.as_deref().unwrap_or("unknown"),
				host.os_version.as_deref().unwrap_or(""),
				host.kernel_version.as_deref().unwrap_or("unknown"),
				host.cpu_count,
				host.total_memory_bytes / (1024 * 1024)
			)?;
		}

		if let Some(fs) = &report.filesystem {
			writeln!(
				out,
				"  Filesystem: {} mounted at {}{}",
				fs.fs_type,
				fs.mount_point.display(),
				if fs.is_watch_compatible() {
					""
				} else {
					" (limited inotify support)"
				}
			)?;
		}

		if let Some(limits) = &report.watch_limits {
			writeln!(out, "  Watches: {}", watch_usage(limits))?;
		}

		for backend in &report.backends {
			writeln!(out)?;
			render_backend(backend, out)?;
		}

		if !report.notices.is_empty() {
			writeln!(out)?;
			writeln!(out, "Notices:")?;
			for notice in &report.notices {
				match notice {
					Notice::PartialRunTimeout {
						deadline,
						completed_operations,
						planned_operations,
					} => writeln!(
						out,
						"  - run deadline of {} reached after {completed_operations} of \
						{planned_operations} operations",
						humantime::format_duration(*deadline)
					)?,
					Notice::ProbeFailed { probe, reason } => {
						writeln!(out, "  - {probe} probe failed: {reason}")?;
					}
				}
			}
		}

		Ok(())
	}
}

fn render_backend(backend: &BackendReport, out: &mut dyn Write) -> Result<()> {
	match &backend.outcome {
		BackendOutcome::Verified {
			verdict,
			record_count,
			unrelated_records,
			overflow_events,
			interrupted,
			..
		} => {
			writeln!(out, "Backend {}: VERIFIED", backend.backend_id)?;
			writeln!(
				out,
				"  delivered {}, missed {}, coalesced {}, reordered {}, duplicated {}",
				verdict.delivered_count,
				verdict.missed_count,
				verdict.coalesced_count,
				verdict.reordered_count,
				verdict.duplicated_count
			)?;
			writeln!(
				out,
				"  reliability {:.1}%, notified {:.1}%",
				verdict.reliability_ratio * 100.0,
				verdict.notified_ratio * 100.0
			)?;
			if let (Some(mean), Some(max)) = (verdict.mean_latency, verdict.max_latency) {
				writeln!(
					out,
					"  latency mean {}, max {}",
					millis(mean),
					millis(max)
				)?;
			}
			writeln!(
				out,
				"  records {record_count} (unrelated {unrelated_records}, overflows {overflow_events})"
			)?;
			if let Some(failure) = interrupted {
				writeln!(out, "  incomplete: {failure}")?;
			}
		}
		BackendOutcome::Unavailable { failure } => {
			writeln!(out, "Backend {}: UNAVAILABLE", backend.backend_id)?;
			writeln!(out, "  {failure}")?;
		}
	}

	for hint in &backend.hints {
		writeln!(out, "  hint [{}]: {}", hint.kind, hint.message)?;
	}

	Ok(())
}

pub fn render_quick_check(report: &QuickCheckReport, out: &mut dyn Write) -> Result<()> {
	writeln!(out, "Quick check of {}", report.directory.display())?;

	for check in &report.checks {
		let title = match check.kind {
			CheckKind::SystemLimits => "System Limits",
			CheckKind::FilesystemCompatibility => "Filesystem Compatibility",
			CheckKind::ResourceConstraints => "Resource Constraints",
			CheckKind::EventDelivery => "Event Delivery",
		};

		writeln!(
			out,
			"  {title}: {}",
			check.status.to_string().to_uppercase()
		)?;
		if let Some(message) = &check.message {
			writeln!(out, "    - {message}")?;
		}
	}

	writeln!(
		out,
		"Overall Status: {}",
		report.status.to_string().to_uppercase()
	)?;

	Ok(())
}

pub fn render_limits(limits: &WatchLimits, out: &mut dyn Write) -> Result<()> {
	writeln!(out, "inotify limits")?;
	writeln!(out, "  max_user_watches:   {}", limits.max_user_watches)?;
	writeln!(out, "  max_user_instances: {}", limits.max_user_instances)?;
	writeln!(out, "  max_queued_events:  {}", limits.max_queued_events)?;
	writeln!(out, "  watches in use:     {}", watch_usage(limits))?;
	writeln!(
		out,
		"  instances in use:   {} of {}",
		limits.current_instances, limits.max_user_instances
	)?;

	if !limits.top_consumers.is_empty() {
		writeln!(out, "Top watch consumers")?;
		for consumer in &limits.top_consumers {
			writeln!(
				out,
				"  {:>8} {:<24} {:>8} watches {:>3} instances",
				consumer.pid, consumer.name, consumer.watch_count, consumer.instance_count
			)?;
		}
	}

	Ok(())
}

fn watch_usage(limits: &WatchLimits) -> String {
	match limits.watch_usage() {
		Some(usage) => format!(
			"{} of {} ({:.1}%)",
			limits.current_watches,
			limits.max_user_watches,
			usage * 100.0
		),
		None => format!("{} of {}", limits.current_watches, limits.max_user_watches),
	}
}

fn millis(latency: Duration) -> String {
	format!("{:.3}ms", latency.as_secs_f64() * 1_000.0)
}
