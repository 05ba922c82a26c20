use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use fwd_fs_watcher::BackendId;
use fwd_sys_probe::{FilesystemInfo, HostInfo, ResourceSnapshot, WatchLimits};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	advisor::Hint,
	verifier::{MatchResult, ReliabilityVerdict},
	BackendFailure, DiagnosticConfig, Operation,
};

/// Everything one diagnostic run established
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
	pub run_id: Uuid,
	pub started_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
	pub config: DiagnosticConfig,
	/// Where the workload ran; already removed when the report is returned
	pub scratch_dir: PathBuf,
	pub operations: Vec<Operation>,
	pub backends: Vec<BackendReport>,
	pub notices: Vec<Notice>,
	pub resources_start: Option<ResourceSnapshot>,
	pub resources_end: Option<ResourceSnapshot>,
	pub watch_limits: Option<WatchLimits>,
	pub filesystem: Option<FilesystemInfo>,
	pub host: Option<HostInfo>,
}

impl DiagnosticReport {
	/// Verdicts of the backends that could be verified
	pub fn verdicts(&self) -> impl Iterator<Item = &ReliabilityVerdict> {
		self.backends.iter().filter_map(BackendReport::verdict)
	}

	#[must_use]
	pub fn backend(&self, backend_id: &str) -> Option<&BackendReport> {
		self.backends
			.iter()
			.find(|backend| backend.backend_id.as_str() == backend_id)
	}

	#[must_use]
	pub fn is_partial(&self) -> bool {
		self.notices
			.iter()
			.any(|notice| matches!(notice, Notice::PartialRunTimeout { .. }))
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendReport {
	pub backend_id: BackendId,
	pub outcome: BackendOutcome,
	pub hints: Vec<Hint>,
}

impl BackendReport {
	#[must_use]
	pub fn verdict(&self) -> Option<&ReliabilityVerdict> {
		match &self.outcome {
			BackendOutcome::Verified { verdict, .. } => Some(verdict),
			BackendOutcome::Unavailable { .. } => None,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendOutcome {
	Verified {
		verdict: ReliabilityVerdict,
		results: Vec<MatchResult>,
		record_count: usize,
		unrelated_records: usize,
		overflow_events: usize,
		/// Set when collection ended early; the verdict covers what was gathered
		interrupted: Option<BackendFailure>,
	},
	/// No record log at all, so no verdict: distinct from a backend that heard nothing
	Unavailable { failure: BackendFailure },
}

/// Run-level conditions that don't abort the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
	/// The deadline stopped the run; unissued operations are absent from every verdict
	PartialRunTimeout {
		#[serde(with = "humantime_serde")]
		deadline: Duration,
		completed_operations: usize,
		planned_operations: usize,
	},
	ProbeFailed { probe: String, reason: String },
}
