//! Hints pointing at the likely cause of a backend's losses
//!
//! Hints read the host facts gathered around the run and the verdict; they never feed back
//! into matching.

use fwd_sys_probe::{FilesystemInfo, ResourceSnapshot, WatchLimits};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{verifier::Verification, BackendFailure};

/// Watch quota usage from which limits are suspected
pub const WATCH_USAGE_THRESHOLD: f64 = 0.9;

/// CPU or memory percentage from which the host is considered under pressure
pub const RESOURCE_PRESSURE_PERCENT: f64 = 90.0;

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HintKind {
	WatchLimitNearExhausted,
	IncompatibleFilesystem,
	ResourcePressure,
	QueueOverflow,
	EventCoalescing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
	pub kind: HintKind,
	pub message: String,
}

/// Host facts available to the advisor, any of which may be missing
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFacts<'a> {
	pub watch_limits: Option<&'a WatchLimits>,
	pub filesystem: Option<&'a FilesystemInfo>,
	pub resources_start: Option<&'a ResourceSnapshot>,
	pub resources_end: Option<&'a ResourceSnapshot>,
}

impl HostFacts<'_> {
	fn watch_usage(&self) -> Option<f64> {
		self.watch_limits.and_then(WatchLimits::watch_usage)
	}

	fn pressured_snapshot(&self) -> Option<&ResourceSnapshot> {
		[self.resources_start, self.resources_end]
			.into_iter()
			.flatten()
			.find(|snapshot| snapshot.is_under_pressure(RESOURCE_PRESSURE_PERCENT))
	}
}

/// Hints for a backend that was verified
#[must_use]
pub fn advise(verification: &Verification, facts: &HostFacts<'_>) -> Vec<Hint> {
	let verdict = &verification.verdict;
	let missed = verdict.missed_count > 0;
	let mut hints = Vec::new();

	if missed {
		if let Some(usage) = facts
			.watch_usage()
			.filter(|&usage| usage >= WATCH_USAGE_THRESHOLD)
		{
			hints.push(watch_limit_hint(usage, facts.watch_limits));
		}

		if let Some(fs) = facts.filesystem.filter(|fs| !fs.is_watch_compatible()) {
			hints.push(Hint {
				kind: HintKind::IncompatibleFilesystem,
				message: format!(
					"{} operations were missed on a {} filesystem mounted at {}; \
					kernel watches don't see changes made by other clients of it",
					verdict.missed_count,
					fs.fs_type,
					fs.mount_point.display()
				),
			});
		}

		if let Some(snapshot) = facts.pressured_snapshot() {
			hints.push(Hint {
				kind: HintKind::ResourcePressure,
				message: format!(
					"{} operations were missed while the host ran at {:.0}% CPU and {:.0}% memory",
					verdict.missed_count, snapshot.cpu_percent, snapshot.mem_percent
				),
			});
		}
	}

	if verification.overflow_events > 0 {
		hints.push(Hint {
			kind: HintKind::QueueOverflow,
			message: format!(
				"the backend reported {} queue overflows{}; raise the event queue size",
				verification.overflow_events,
				facts
					.watch_limits
					.map(|limits| format!(
						" (max_queued_events is {})",
						limits.max_queued_events
					))
					.unwrap_or_default()
			),
		});
	}

	if verdict.coalesced_count > 0 {
		hints.push(Hint {
			kind: HintKind::EventCoalescing,
			message: format!(
				"{} rapid operations on the same path were merged into fewer notifications; \
				consumers must not expect one notification per change",
				verdict.coalesced_count
			),
		});
	}

	hints
}

/// Hints for a backend that could not be verified at all
#[must_use]
pub fn advise_unavailable(failure: &BackendFailure, facts: &HostFacts<'_>) -> Vec<Hint> {
	let quota_exhausted = matches!(
		failure,
		BackendFailure::Unavailable {
			quota_exhausted: true,
			..
		}
	);

	let usage = facts.watch_usage();

	if quota_exhausted || usage.is_some_and(|usage| usage >= WATCH_USAGE_THRESHOLD) {
		vec![watch_limit_hint(usage.unwrap_or(1.0), facts.watch_limits)]
	} else {
		Vec::new()
	}
}

fn watch_limit_hint(usage: f64, limits: Option<&WatchLimits>) -> Hint {
	let detail = limits
		.map(|limits| {
			format!(
				" ({} of {} watches in use)",
				limits.current_watches, limits.max_user_watches
			)
		})
		.unwrap_or_default();

	Hint {
		kind: HintKind::WatchLimitNearExhausted,
		message: format!(
			"inotify watch quota is {:.0}% used{detail}; raise fs.inotify.max_user_watches",
			usage * 100.0
		),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::{path::PathBuf, time::Duration};

	use chrono::Utc;
	use fwd_fs_watcher::{BackendId, RawKind};
	use pretty_assertions::assert_eq;

	use crate::{
		verifier::{
			test_utils::{op, record},
			verify, VerifierSettings,
		},
		OperationKind::*,
	};

	const SETTINGS: VerifierSettings = VerifierSettings {
		max_latency_window: Duration::from_secs(5),
		coalesce_window: Duration::from_millis(50),
	};

	fn limits(current_watches: u64) -> WatchLimits {
		WatchLimits {
			max_user_watches: 100,
			max_user_instances: 128,
			max_queued_events: 16_384,
			current_watches,
			current_instances: 1,
			top_consumers: vec![],
		}
	}

	fn filesystem(fs_type: &str) -> FilesystemInfo {
		FilesystemInfo {
			path: PathBuf::from("/mnt/share/scratch"),
			mount_point: PathBuf::from("/mnt/share"),
			fs_type: fs_type.to_string(),
			total_bytes: 0,
			free_bytes: 0,
			available_bytes: 0,
			inodes_total: 0,
			inodes_free: 0,
			max_filename_length: 255,
		}
	}

	fn missed_everything() -> Verification {
		verify(
			BackendId::new("test"),
			&[op(1, Create, "a", 0), op(2, Create, "b", 100)],
			&[],
			&SETTINGS,
		)
	}

	fn kinds(hints: &[Hint]) -> Vec<HintKind> {
		hints.iter().map(|hint| hint.kind).collect()
	}

	#[test]
	fn misses_on_saturated_host_explain_themselves() {
		let limits = limits(95);
		let fs = filesystem("nfs4");
		let busy = ResourceSnapshot {
			taken_at: Utc::now(),
			cpu_percent: 97.0,
			mem_percent: 30.0,
			process_count: 10,
		};

		let hints = advise(
			&missed_everything(),
			&HostFacts {
				watch_limits: Some(&limits),
				filesystem: Some(&fs),
				resources_start: None,
				resources_end: Some(&busy),
			},
		);

		assert_eq!(
			kinds(&hints),
			vec![
				HintKind::WatchLimitNearExhausted,
				HintKind::IncompatibleFilesystem,
				HintKind::ResourcePressure
			]
		);
		assert!(hints[0].message.contains("95 of 100"));
	}

	#[test]
	fn healthy_host_gives_no_hints() {
		let limits = limits(10);
		let fs = filesystem("ext4");

		let hints = advise(
			&missed_everything(),
			&HostFacts {
				watch_limits: Some(&limits),
				filesystem: Some(&fs),
				..Default::default()
			},
		);

		assert!(hints.is_empty());
	}

	#[test]
	fn overflow_and_coalescing_are_reported_without_misses() {
		let verification = verify(
			BackendId::new("test"),
			&[op(1, Create, "a", 0), op(2, Modify, "a", 1)],
			&[
				record(0, RawKind::Created, "a", 3),
				record(1, RawKind::Overflow, "", 4),
			],
			&SETTINGS,
		);

		let hints = advise(&verification, &HostFacts::default());

		assert_eq!(
			kinds(&hints),
			vec![HintKind::QueueOverflow, HintKind::EventCoalescing]
		);
	}

	#[test]
	fn quota_failure_points_at_watch_limits() {
		let failure = BackendFailure::Unavailable {
			reason: "no space left on device".to_string(),
			quota_exhausted: true,
		};

		assert_eq!(
			kinds(&advise_unavailable(&failure, &HostFacts::default())),
			vec![HintKind::WatchLimitNearExhausted]
		);
		assert!(advise_unavailable(&BackendFailure::CollectorCrashed, &HostFacts::default())
			.is_empty());
	}
}
