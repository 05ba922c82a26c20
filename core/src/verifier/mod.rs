//! Reconciliation of the issued workload with what a backend reported
//!
//! Every operation gets exactly one [`MatchResult`]:
//! - `Delivered` when a compatible record on its path was observed within the latency window;
//! - `Reordered` when it was notified after a later-issued operation on another path;
//! - `Duplicated` when more than one compatible record notified it;
//! - `Coalesced` when it went unnotified inside a notified burst on its path that produced
//!   fewer records than operations, the earliest ones first up to that shortfall;
//! - `Missed` otherwise.

use std::time::Duration;

use fwd_fs_watcher::{BackendId, RawEventRecord};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::Operation;

mod compat;
mod matching;
mod verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierSettings {
	#[serde(with = "humantime_serde")]
	pub max_latency_window: Duration,
	#[serde(with = "humantime_serde")]
	pub coalesce_window: Duration,
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchStatus {
	Delivered,
	Missed,
	Coalesced,
	Reordered,
	Duplicated,
}

impl MatchStatus {
	/// The operation was observed at all, whatever the quality of the notification
	#[must_use]
	pub const fn is_notified(self) -> bool {
		matches!(self, Self::Delivered | Self::Reordered | Self::Duplicated)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
	pub operation_id: u64,
	pub backend_id: BackendId,
	pub status: MatchStatus,
	/// From issue to the matched record, only for notified operations
	#[serde(with = "humantime_serde")]
	pub latency: Option<Duration>,
	pub matched_record_seq: Option<u64>,
	pub extra_records: usize,
	/// Secondary notifications the operation caused, like a write after a create
	pub echo_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityVerdict {
	pub backend_id: BackendId,
	pub total_operations: usize,
	pub delivered_count: usize,
	pub missed_count: usize,
	pub coalesced_count: usize,
	pub reordered_count: usize,
	pub duplicated_count: usize,
	#[serde(with = "humantime_serde")]
	pub mean_latency: Option<Duration>,
	#[serde(with = "humantime_serde")]
	pub max_latency: Option<Duration>,
	/// Share of operations delivered cleanly, 1.0 for an empty workload
	pub reliability_ratio: f64,
	/// Share of operations notified in any way, 1.0 for an empty workload
	pub notified_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
	pub verdict: ReliabilityVerdict,
	/// In operation id order
	pub results: Vec<MatchResult>,
	pub record_count: usize,
	/// Records no operation could account for
	pub unrelated_records: usize,
	/// Queue overflow notifications: the backend admits having lost records
	pub overflow_events: usize,
}

/// Reconciles one backend's record log with the issued operations.
///
/// Pure: the same inputs always give the same verification.
#[must_use]
pub fn verify(
	backend_id: BackendId,
	operations: &[Operation],
	records: &[RawEventRecord],
	settings: &VerifierSettings,
) -> Verification {
	let matching = matching::match_records(operations, records, settings.max_latency_window);
	let statuses = verdict::classify(operations, records, &matching, settings);

	let mut results = operations
		.iter()
		.zip(&matching.operations)
		.zip(&statuses)
		.map(|((op, op_match), &status)| MatchResult {
			operation_id: op.id,
			backend_id: backend_id.clone(),
			status,
			latency: op_match
				.record
				.and_then(|record| record.observed_at.checked_duration_since(op.issued_at)),
			matched_record_seq: op_match.record.map(|record| record.sequence_no),
			extra_records: op_match.extra_records,
			echo_records: op_match.echo_records,
		})
		.collect::<Vec<_>>();
	results.sort_by_key(|result| result.operation_id);

	let verdict = verdict::aggregate(backend_id, operations, &matching, &statuses);

	debug!(
		backend = %verdict.backend_id,
		delivered = verdict.delivered_count,
		missed = verdict.missed_count,
		coalesced = verdict.coalesced_count,
		reordered = verdict.reordered_count,
		duplicated = verdict.duplicated_count,
		unrelated = matching.unrelated_records,
		overflows = matching.overflow_events,
		"Verified backend;",
	);

	Verification {
		verdict,
		results,
		record_count: records.len(),
		unrelated_records: matching.unrelated_records,
		overflow_events: matching.overflow_events,
	}
}

#[cfg(test)]
pub(crate) mod test_utils {
	use std::path::PathBuf;

	use fwd_fs_watcher::{BackendId, RawEventRecord, RawKind, Timestamp};

	use crate::{Operation, OperationKind};

	fn scratch(name: &str) -> PathBuf {
		PathBuf::from("/scratch").join(name)
	}

	pub(crate) fn op(id: u64, kind: OperationKind, name: &str, issued_ms: u64) -> Operation {
		Operation {
			id,
			kind,
			path: scratch(name),
			target: None,
			issued_at: Timestamp::from_millis(issued_ms),
		}
	}

	pub(crate) fn rename_op(id: u64, name: &str, target: &str, issued_ms: u64) -> Operation {
		Operation {
			target: Some(scratch(target)),
			..op(id, OperationKind::Rename, name, issued_ms)
		}
	}

	pub(crate) fn record(
		sequence_no: u64,
		raw_kind: RawKind,
		name: &str,
		observed_ms: u64,
	) -> RawEventRecord {
		RawEventRecord {
			backend_id: BackendId::new("test"),
			raw_kind,
			native_kind: raw_kind.to_string(),
			path: scratch(name),
			observed_at: Timestamp::from_millis(observed_ms),
			sequence_no,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use fwd_fs_watcher::RawKind;
	use pretty_assertions::assert_eq;

	use super::test_utils::{op, record, rename_op};
	use crate::OperationKind::*;

	const SETTINGS: VerifierSettings = VerifierSettings {
		max_latency_window: Duration::from_secs(5),
		coalesce_window: Duration::from_millis(50),
	};

	fn backend() -> BackendId {
		BackendId::new("test")
	}

	#[test]
	fn every_operation_gets_one_result() {
		let operations = [
			op(1, Create, "a", 0),
			op(2, Modify, "a", 100),
			rename_op(3, "a", "b", 200),
			op(4, Delete, "b", 300),
		];
		let records = [
			record(0, RawKind::Created, "a", 1),
			record(1, RawKind::Modified, "a", 101),
			record(2, RawKind::RenamedFrom, "a", 201),
			record(3, RawKind::RenamedTo, "b", 201),
		];

		let verification = verify(backend(), &operations, &records, &SETTINGS);

		let ids = verification
			.results
			.iter()
			.map(|result| result.operation_id)
			.collect::<Vec<_>>();
		assert_eq!(ids, vec![1, 2, 3, 4]);

		let verdict = &verification.verdict;
		assert_eq!(verdict.total_operations, 4);
		assert_eq!(
			verdict.delivered_count
				+ verdict.missed_count
				+ verdict.coalesced_count
				+ verdict.reordered_count
				+ verdict.duplicated_count,
			4
		);
		assert_eq!(verdict.delivered_count, 3);
		assert_eq!(verdict.missed_count, 1);
		assert_eq!(verification.results[3].status, MatchStatus::Missed);
		assert_eq!(verification.record_count, 4);
	}

	#[test]
	fn full_delivery_scores_one() {
		let operations = (1..=5)
			.map(|id| op(id, Create, &format!("f{id}"), id * 100))
			.collect::<Vec<_>>();
		let records = (1..=5)
			.map(|id| record(id - 1, RawKind::Created, &format!("f{id}"), id * 100 + 3))
			.collect::<Vec<_>>();

		let verification = verify(backend(), &operations, &records, &SETTINGS);
		let verdict = &verification.verdict;

		assert!(verification
			.results
			.iter()
			.all(|result| result.status == MatchStatus::Delivered));
		assert!((verdict.reliability_ratio - 1.0).abs() < f64::EPSILON);
		assert!((verdict.notified_ratio - 1.0).abs() < f64::EPSILON);
		assert_eq!(verdict.mean_latency, Some(Duration::from_millis(3)));
		assert_eq!(verdict.max_latency, Some(Duration::from_millis(3)));
	}

	#[test]
	fn silent_backend_misses_everything() {
		let operations = (1..=10)
			.map(|id| op(id, Create, &format!("f{id}"), id * 100))
			.collect::<Vec<_>>();

		let verdict = verify(backend(), &operations, &[], &SETTINGS).verdict;

		assert_eq!(verdict.missed_count, 10);
		assert!(verdict.reliability_ratio.abs() < f64::EPSILON);
		assert!(verdict.notified_ratio.abs() < f64::EPSILON);
		assert_eq!(verdict.mean_latency, None);
		assert_eq!(verdict.max_latency, None);
	}

	#[test]
	fn ratios_stay_bounded_and_ordered() {
		let operations = [
			op(1, Create, "a", 0),
			op(2, Create, "b", 10),
			op(3, Delete, "c", 20),
			op(4, Create, "d", 30),
		];
		let records = [
			record(0, RawKind::Created, "b", 12),
			record(1, RawKind::Created, "a", 13),
			record(2, RawKind::Removed, "c", 22),
			record(3, RawKind::Removed, "c", 23),
		];

		let verdict = verify(backend(), &operations, &records, &SETTINGS).verdict;

		assert_eq!(verdict.reordered_count, 1);
		assert_eq!(verdict.duplicated_count, 1);
		assert_eq!(verdict.missed_count, 1);
		assert!((0.0..=1.0).contains(&verdict.reliability_ratio));
		assert!((0.0..=1.0).contains(&verdict.notified_ratio));
		assert!(verdict.reliability_ratio <= verdict.notified_ratio);
		assert!((verdict.reliability_ratio - 0.25).abs() < f64::EPSILON);
		assert!((verdict.notified_ratio - 0.75).abs() < f64::EPSILON);
	}

	#[test]
	fn latency_never_exceeds_window() {
		let operations = [op(1, Create, "a", 0), op(2, Create, "b", 0)];
		let records = [
			record(0, RawKind::Created, "a", 5_000),
			record(1, RawKind::Created, "b", 5_001),
		];

		let verification = verify(backend(), &operations, &records, &SETTINGS);

		assert_eq!(
			verification.results[0].latency,
			Some(SETTINGS.max_latency_window)
		);
		assert_eq!(verification.results[1].status, MatchStatus::Missed);
		assert!(verification
			.results
			.iter()
			.filter_map(|result| result.latency)
			.all(|latency| latency <= SETTINGS.max_latency_window));
		assert_eq!(verification.unrelated_records, 1);
	}

	#[test]
	fn empty_workload_is_fully_reliable() {
		let records = [record(0, RawKind::Created, "stray", 1)];

		let verification = verify(backend(), &[], &records, &SETTINGS);

		assert!(verification.results.is_empty());
		assert_eq!(verification.verdict.total_operations, 0);
		assert!((verification.verdict.reliability_ratio - 1.0).abs() < f64::EPSILON);
		assert!((verification.verdict.notified_ratio - 1.0).abs() < f64::EPSILON);
		assert_eq!(verification.unrelated_records, 1);
	}

	#[test]
	fn same_inputs_same_verification() {
		let operations = [op(1, Create, "a", 0), op(2, Modify, "a", 10)];
		let records = [
			record(0, RawKind::Created, "a", 2),
			record(1, RawKind::ClosedWrite, "a", 3),
			record(2, RawKind::Overflow, "", 4),
		];

		let first = verify(backend(), &operations, &records, &SETTINGS);
		let second = verify(backend(), &operations, &records, &SETTINGS);

		assert_eq!(first, second);
		assert_eq!(first.overflow_events, 1);
	}
}
