//! Fast health check of a directory: limits, filesystem, host load and a tiny workload

use std::{
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};

use fwd_fs_watcher::{BackendKind, WatchBackend};
use fwd_sys_probe::{FilesystemInfo, ResourceSnapshot, WatchLimits};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, instrument};

use crate::{
	advisor::RESOURCE_PRESSURE_PERCENT,
	probe::{HostProbe, StaticProbe, SystemProbe},
	report::{BackendOutcome, DiagnosticReport},
	run::Diagnostic,
	DiagnosticConfig, PlanStep, ProbeError, RunError,
};

const CRITICAL_WATCH_USAGE: f64 = 0.9;
const HIGH_WATCH_USAGE: f64 = 0.7;

const TEST_FILE: &str = "quick_check_test.txt";
const TEST_DELAY: Duration = Duration::from_millis(500);

/// Ordered from best to worst, so the overall status is the maximum
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Serialize,
	Deserialize,
	Display,
	EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckStatus {
	Ok,
	Warning,
	Error,
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckKind {
	SystemLimits,
	FilesystemCompatibility,
	ResourceConstraints,
	EventDelivery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
	pub kind: CheckKind,
	pub status: CheckStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl CheckResult {
	fn ok(kind: CheckKind) -> Self {
		Self {
			kind,
			status: CheckStatus::Ok,
			message: None,
		}
	}

	fn with(kind: CheckKind, status: CheckStatus, message: impl Into<String>) -> Self {
		Self {
			kind,
			status,
			message: Some(message.into()),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickCheckReport {
	pub directory: PathBuf,
	pub status: CheckStatus,
	pub checks: Vec<CheckResult>,
	pub watch_limits: Option<WatchLimits>,
	pub filesystem: Option<FilesystemInfo>,
	pub resources: Option<ResourceSnapshot>,
}

pub struct QuickCheck {
	directory: PathBuf,
	probe: Arc<dyn HostProbe>,
	backends: Option<Vec<Arc<dyn WatchBackend>>>,
}

impl QuickCheck {
	#[must_use]
	pub fn new(directory: impl Into<PathBuf>) -> Self {
		Self {
			directory: directory.into(),
			probe: Arc::new(SystemProbe),
			backends: None,
		}
	}

	#[must_use]
	pub fn with_probe(mut self, probe: impl HostProbe) -> Self {
		self.probe = Arc::new(probe);
		self
	}

	/// Candidates for the delivery check, the first one that starts is used
	#[must_use]
	pub fn with_backends(
		mut self,
		backends: impl IntoIterator<Item = Arc<dyn WatchBackend>>,
	) -> Self {
		self.backends = Some(backends.into_iter().collect());
		self
	}

	#[instrument(name = "quick_check", skip_all, fields(directory = %self.directory.display()))]
	pub async fn run(self) -> QuickCheckReport {
		let Self {
			directory,
			probe,
			backends,
		} = self;

		let watch_limits = probe.watch_limits().await;
		let filesystem = probe.filesystem(&directory).await;
		let resources = probe.resources().await;

		let mut config = DiagnosticConfig {
			scratch_dir: directory.clone(),
			plan: Some(vec![
				PlanStep::create(TEST_FILE),
				PlanStep::modify(TEST_FILE),
				PlanStep::delete(TEST_FILE),
			]),
			inter_op_delay: TEST_DELAY,
			..Default::default()
		};

		let diagnostic = match backends {
			Some(backends) => Diagnostic::new(config).with_backends(backends),
			None => {
				config.backends = BackendKind::ALL.to_vec();
				Diagnostic::new(config)
			}
		};

		// Host facts are already known, the workload run doesn't need to sample them again
		let delivery = diagnostic.with_probe(StaticProbe::default()).run().await;

		let checks = vec![
			check_limits(&watch_limits),
			check_filesystem(&filesystem),
			check_resources(&resources),
			check_delivery(&delivery),
		];

		let status = checks
			.iter()
			.map(|check| check.status)
			.max()
			.unwrap_or(CheckStatus::Ok);

		info!(%status, "Quick check finished;");

		QuickCheckReport {
			directory,
			status,
			checks,
			watch_limits: watch_limits.ok(),
			filesystem: filesystem.ok(),
			resources: resources.ok(),
		}
	}
}

/// Runs every check against the running host
pub async fn quick_check(directory: impl AsRef<Path>) -> QuickCheckReport {
	QuickCheck::new(directory.as_ref()).run().await
}

pub fn check_limits(limits: &Result<WatchLimits, ProbeError>) -> CheckResult {
	let kind = CheckKind::SystemLimits;

	let limits = match limits {
		Ok(limits) => limits,
		Err(e) => return CheckResult::with(kind, CheckStatus::Error, e.to_string()),
	};

	let Some(usage) = limits.watch_usage() else {
		return CheckResult::with(kind, CheckStatus::Error, "max_user_watches is zero");
	};

	let usage_message = |threshold: f64| {
		format!(
			"Using {}/{} watches (>{:.0}%)",
			limits.current_watches,
			limits.max_user_watches,
			threshold * 100.0
		)
	};

	if usage >= CRITICAL_WATCH_USAGE {
		CheckResult::with(kind, CheckStatus::Warning, usage_message(CRITICAL_WATCH_USAGE))
	} else if usage >= HIGH_WATCH_USAGE {
		CheckResult::with(kind, CheckStatus::Warning, usage_message(HIGH_WATCH_USAGE))
	} else {
		CheckResult::ok(kind)
	}
}

pub fn check_filesystem(filesystem: &Result<FilesystemInfo, ProbeError>) -> CheckResult {
	let kind = CheckKind::FilesystemCompatibility;

	match filesystem {
		Ok(fs) if fs.is_watch_compatible() => CheckResult::ok(kind),
		Ok(fs) => CheckResult::with(
			kind,
			CheckStatus::Warning,
			format!("Filesystem type '{}' may have limited inotify support", fs.fs_type),
		),
		Err(e) => CheckResult::with(kind, CheckStatus::Error, e.to_string()),
	}
}

pub fn check_resources(resources: &Result<ResourceSnapshot, ProbeError>) -> CheckResult {
	let kind = CheckKind::ResourceConstraints;

	let snapshot = match resources {
		Ok(snapshot) => snapshot,
		Err(e) => return CheckResult::with(kind, CheckStatus::Error, e.to_string()),
	};

	let mut issues = Vec::new();
	if snapshot.mem_percent > RESOURCE_PRESSURE_PERCENT {
		issues.push(format!("High memory usage ({:.1}%)", snapshot.mem_percent));
	}
	if snapshot.cpu_percent > RESOURCE_PRESSURE_PERCENT {
		issues.push(format!("high CPU usage ({:.1}%)", snapshot.cpu_percent));
	}

	if issues.is_empty() {
		CheckResult::ok(kind)
	} else {
		CheckResult::with(kind, CheckStatus::Warning, issues.join(", "))
	}
}

/// Judges the tiny workload on the first backend that could be verified
pub fn check_delivery(delivery: &Result<DiagnosticReport, RunError>) -> CheckResult {
	let kind = CheckKind::EventDelivery;

	let report = match delivery {
		Ok(report) => report,
		Err(e) => {
			return CheckResult::with(
				kind,
				CheckStatus::Error,
				format!("Error during file operations: {e}"),
			)
		}
	};

	let verified = report.backends.iter().find_map(|backend| match &backend.outcome {
		BackendOutcome::Verified { verdict, .. } => Some((&backend.backend_id, verdict)),
		BackendOutcome::Unavailable { .. } => None,
	});

	let Some((backend_id, verdict)) = verified else {
		return CheckResult::with(kind, CheckStatus::Error, "No watch backend could be started");
	};

	let notified = verdict.delivered_count + verdict.reordered_count + verdict.duplicated_count;

	if notified < verdict.total_operations {
		CheckResult::with(
			kind,
			CheckStatus::Warning,
			format!(
				"Only {notified} of {} operations were notified through {backend_id}",
				verdict.total_operations
			),
		)
	} else {
		CheckResult::ok(kind)
	}
}
