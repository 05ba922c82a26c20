//! Per-operation classification and per-backend aggregation

use std::{collections::HashMap, path::Path, time::Duration};

use fwd_fs_watcher::RawEventRecord;

use super::{
	compat::{is_primary, Side},
	matching::{MatchedRecord, Matching},
	MatchStatus, ReliabilityVerdict, VerifierSettings,
};
use crate::Operation;

/// Status of every operation, indexed like `operations`
pub(crate) fn classify(
	operations: &[Operation],
	records: &[RawEventRecord],
	matching: &Matching,
	settings: &VerifierSettings,
) -> Vec<MatchStatus> {
	let mut issue_order = (0..operations.len()).collect::<Vec<_>>();
	issue_order.sort_by_key(|&pos| (operations[pos].id, operations[pos].issued_at));

	let reordered = inverted_arrivals(operations, matching, &issue_order);

	let mut statuses = vec![MatchStatus::Missed; operations.len()];

	for (pos, op_match) in matching.operations.iter().enumerate() {
		if op_match.record.is_some() {
			statuses[pos] = if reordered[pos] {
				MatchStatus::Reordered
			} else if op_match.extra_records > 0 {
				MatchStatus::Duplicated
			} else {
				MatchStatus::Delivered
			};
		}
	}

	for burst in bursts(operations, &issue_order, settings.coalesce_window) {
		let notified = burst
			.iter()
			.filter(|&&pos| matching.operations[pos].record.is_some())
			.count();

		// A silent burst is missed, not merged
		if notified == 0 {
			continue;
		}

		let seen = notified + loose_records(&burst, operations, records, matching, settings);
		let shortfall = burst.len().saturating_sub(seen);

		for &pos in burst
			.iter()
			.filter(|&&pos| matching.operations[pos].record.is_none())
			.take(shortfall)
		{
			statuses[pos] = MatchStatus::Coalesced;
		}
	}

	statuses
}

/// Records on the burst's path, during the burst, that could have notified one of its
/// operations but were attributed to none
fn loose_records(
	burst: &[usize],
	operations: &[Operation],
	records: &[RawEventRecord],
	matching: &Matching,
	settings: &VerifierSettings,
) -> usize {
	let (Some(&first), Some(&last)) = (burst.first(), burst.last()) else {
		return 0;
	};
	let path = operations[first].path.as_path();
	let start = operations[first].issued_at;
	let end = operations[last]
		.issued_at
		.saturating_add(settings.max_latency_window);

	records
		.iter()
		.zip(&matching.attributed)
		.filter(|&(record, &attributed)| {
			!attributed
				&& record.path == path
				&& (start..=end).contains(&record.observed_at)
				&& burst
					.iter()
					.any(|&pos| is_primary(operations[pos].kind, Side::Source, record.raw_kind))
		})
		.count()
}

/// Groups of two or more operations on one path, each issued within `coalesce_window` of
/// the previous one
fn bursts(
	operations: &[Operation],
	issue_order: &[usize],
	coalesce_window: Duration,
) -> Vec<Vec<usize>> {
	let mut by_path = HashMap::<&Path, Vec<usize>>::new();
	for &pos in issue_order {
		by_path
			.entry(operations[pos].path.as_path())
			.or_default()
			.push(pos);
	}

	let mut bursts = Vec::new();

	for positions in by_path.into_values() {
		let mut current = Vec::new();

		for pos in positions {
			let chained = current.last().is_some_and(|&prev: &usize| {
				operations[pos]
					.issued_at
					.checked_duration_since(operations[prev].issued_at)
					.unwrap_or_default()
					<= coalesce_window
			});

			if !chained && current.len() > 1 {
				bursts.push(std::mem::take(&mut current));
			} else if !chained {
				current.clear();
			}

			current.push(pos);
		}

		if current.len() > 1 {
			bursts.push(current);
		}
	}

	bursts
}

/// Flags each matched operation for which a later-issued operation on another path was
/// notified by an earlier-arriving record
fn inverted_arrivals(
	operations: &[Operation],
	matching: &Matching,
	issue_order: &[usize],
) -> Vec<bool> {
	#[derive(Clone, Copy)]
	struct Arrival<'a> {
		sequence_no: u64,
		path: &'a Path,
	}

	let mut inverted = vec![false; operations.len()];

	// Earliest arrival among the operations issued after the current one, and the earliest
	// among those on a different path than that first one
	let mut earliest: Option<Arrival<'_>> = None;
	let mut earliest_elsewhere: Option<Arrival<'_>> = None;

	for &pos in issue_order.iter().rev() {
		let Some(MatchedRecord { sequence_no, .. }) = matching.operations[pos].record else {
			continue;
		};
		let path = operations[pos].path.as_path();

		inverted[pos] = [earliest, earliest_elsewhere]
			.into_iter()
			.flatten()
			.any(|arrival| arrival.path != path && arrival.sequence_no < sequence_no);

		let arrival = Arrival { sequence_no, path };

		match earliest {
			None => earliest = Some(arrival),
			Some(first) if first.path == path => {
				if sequence_no < first.sequence_no {
					earliest = Some(arrival);
				}
			}
			Some(first) if sequence_no < first.sequence_no => {
				earliest_elsewhere = earliest;
				earliest = Some(arrival);
			}
			Some(_) => {
				if earliest_elsewhere.map_or(true, |second| sequence_no < second.sequence_no) {
					earliest_elsewhere = Some(arrival);
				}
			}
		}
	}

	inverted
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn aggregate(
	backend_id: fwd_fs_watcher::BackendId,
	operations: &[Operation],
	matching: &Matching,
	statuses: &[MatchStatus],
) -> ReliabilityVerdict {
	let count = |status: MatchStatus| statuses.iter().filter(|&&s| s == status).count();

	let total_operations = operations.len();
	let delivered_count = count(MatchStatus::Delivered);
	let reordered_count = count(MatchStatus::Reordered);
	let duplicated_count = count(MatchStatus::Duplicated);

	let latencies = operations
		.iter()
		.zip(&matching.operations)
		.filter_map(|(op, op_match)| {
			op_match
				.record
				.and_then(|record| record.observed_at.checked_duration_since(op.issued_at))
		})
		.collect::<Vec<_>>();

	let mean_latency = u32::try_from(latencies.len())
		.ok()
		.filter(|&n| n > 0)
		.map(|n| latencies.iter().sum::<Duration>() / n);

	let ratio = |numerator: usize| {
		if total_operations == 0 {
			1.0
		} else {
			numerator as f64 / total_operations as f64
		}
	};

	ReliabilityVerdict {
		backend_id,
		total_operations,
		delivered_count,
		missed_count: count(MatchStatus::Missed),
		coalesced_count: count(MatchStatus::Coalesced),
		reordered_count,
		duplicated_count,
		mean_latency,
		max_latency: latencies.iter().max().copied(),
		reliability_ratio: ratio(delivered_count),
		notified_ratio: ratio(delivered_count + reordered_count + duplicated_count),
	}
}
