//! Assignment of records to operations

use std::{collections::HashMap, path::Path, time::Duration};

use fwd_fs_watcher::{RawEventRecord, RawKind, Timestamp};

use super::compat::{is_echo, is_primary, Side};
use crate::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MatchedRecord {
	pub(crate) sequence_no: u64,
	pub(crate) observed_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct OperationMatch {
	/// The record that notified the operation, a rename's companion when it had no primary
	pub(crate) record: Option<MatchedRecord>,
	/// Primary-compatible records beyond the matched one
	pub(crate) extra_records: usize,
	pub(crate) echo_records: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Matching {
	/// Indexed like the operations given to [`match_records`]
	pub(crate) operations: Vec<OperationMatch>,
	/// Indexed like the records: matched, or absorbed as the echo of a match
	pub(crate) attributed: Vec<bool>,
	pub(crate) unrelated_records: usize,
	pub(crate) overflow_events: usize,
}

/// An operation's interest in a path: its own, or the target of a rename
#[derive(Debug, Clone, Copy)]
struct Claim {
	pos: usize,
	side: Side,
	/// Position in the path's log of the record matched through this claim
	matched_at: Option<usize>,
}

fn in_window(op: &Operation, record: &RawEventRecord, window: Duration) -> bool {
	record.observed_at >= op.issued_at && record.observed_at <= op.issued_at.saturating_add(window)
}

/// Matches the operations of each path, in issue order, with the records of that path in
/// arrival order.
///
/// An operation takes the first primary-compatible record within `window` that arrived
/// after everything attributed to the operations before it, then absorbs the echoes that
/// follow. Leftover records go to the latest operation on their path whose window contains
/// them and whose match did not arrive after them.
pub(crate) fn match_records(
	operations: &[Operation],
	records: &[RawEventRecord],
	window: Duration,
) -> Matching {
	let mut matching = Matching {
		operations: vec![OperationMatch::default(); operations.len()],
		attributed: vec![false; records.len()],
		..Default::default()
	};

	let mut logs = HashMap::<&Path, Vec<usize>>::new();
	for (index, record) in records.iter().enumerate() {
		if record.raw_kind == RawKind::Overflow {
			matching.overflow_events += 1;
			continue;
		}
		logs.entry(record.path.as_path()).or_default().push(index);
	}

	let mut log_position = vec![0; records.len()];
	for log in logs.values_mut() {
		log.sort_by_key(|&index| (records[index].observed_at, records[index].sequence_no));
		for (at, &index) in log.iter().enumerate() {
			log_position[index] = at;
		}
	}

	let mut issue_order = (0..operations.len()).collect::<Vec<_>>();
	issue_order.sort_by_key(|&pos| (operations[pos].id, operations[pos].issued_at));

	let mut claims = HashMap::<&Path, Vec<Claim>>::new();
	for &pos in &issue_order {
		let op = &operations[pos];
		let sides = std::iter::once((op.path.as_path(), Side::Source))
			.chain(op.target.as_deref().map(|target| (target, Side::Target)));

		for (path, side) in sides {
			claims.entry(path).or_default().push(Claim {
				pos,
				side,
				matched_at: None,
			});
		}
	}

	for (path, path_claims) in &mut claims {
		let Some(log) = logs.get(path) else {
			continue;
		};
		let mut cursor = 0;

		for i in 0..path_claims.len() {
			let Claim { pos, side, .. } = path_claims[i];
			let op = &operations[pos];

			let Some(offset) = log[cursor..].iter().position(|&index| {
				is_primary(op.kind, side, records[index].raw_kind)
					&& in_window(op, &records[index], window)
			}) else {
				continue;
			};

			let at = cursor + offset;
			path_claims[i].matched_at = Some(at);
			matching.attributed[log[at]] = true;
			cursor = at + 1;

			let next_issue = path_claims
				.get(i + 1)
				.map(|next| operations[next.pos].issued_at);
			let echoes = echo_run(&log[cursor..], records, op, side, next_issue, window);

			for &index in &log[cursor..cursor + echoes] {
				matching.attributed[index] = true;
			}
			matching.operations[pos].echo_records += echoes;
			cursor += echoes;
		}
	}

	for (path, path_claims) in &claims {
		let Some(log) = logs.get(path) else {
			continue;
		};

		for claim in path_claims {
			let Some(at) = claim.matched_at else {
				continue;
			};

			// A rename's own path wins over its companion
			let op_match = &mut matching.operations[claim.pos];
			if claim.side == Side::Source || op_match.record.is_none() {
				let record = &records[log[at]];
				op_match.record = Some(MatchedRecord {
					sequence_no: record.sequence_no,
					observed_at: record.observed_at,
				});
			}
		}
	}

	for (index, record) in records.iter().enumerate() {
		if matching.attributed[index] || record.raw_kind == RawKind::Overflow {
			continue;
		}

		let owner = claims.get(record.path.as_path()).and_then(|path_claims| {
			path_claims.iter().rev().find(|claim| {
				in_window(&operations[claim.pos], record, window)
					&& claim.matched_at.map_or(true, |at| at < log_position[index])
			})
		});

		let Some(&Claim { pos, side, .. }) = owner else {
			matching.unrelated_records += 1;
			continue;
		};

		let op = &operations[pos];
		let op_match = &mut matching.operations[pos];

		if is_echo(op.kind, side, record.raw_kind) {
			op_match.echo_records += 1;
		} else if op_match.record.is_some() && is_primary(op.kind, side, record.raw_kind) {
			op_match.extra_records += 1;
		} else {
			matching.unrelated_records += 1;
		}
	}

	matching
}

/// How many of `following`, the records arriving right after `op`'s match, are its echoes.
///
/// Records are stamped when read, so an echo read late can't be told from the next
/// operation's notification by time alone. The run ends with the close that finishes the
/// operation's writes; without one, only records observed before the next operation on the
/// path was issued are taken.
fn echo_run(
	following: &[usize],
	records: &[RawEventRecord],
	op: &Operation,
	side: Side,
	next_issue: Option<Timestamp>,
	window: Duration,
) -> usize {
	let run = following
		.iter()
		.take_while(|&&index| {
			is_echo(op.kind, side, records[index].raw_kind)
				&& in_window(op, &records[index], window)
		})
		.count();
	let run = &following[..run];

	match run
		.iter()
		.position(|&index| records[index].raw_kind == RawKind::ClosedWrite)
	{
		Some(close) => close + 1,
		None => run
			.iter()
			.take_while(|&&index| {
				next_issue.map_or(true, |next| records[index].observed_at < next)
			})
			.count(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	use crate::verifier::test_utils::{op, record, rename_op};
	use crate::OperationKind::*;

	const WINDOW: Duration = Duration::from_secs(5);

	#[test]
	fn earliest_compatible_record_wins() {
		let operations = [op(1, Create, "a", 0)];
		let records = [
			record(0, RawKind::Created, "a", 7),
			record(1, RawKind::Modified, "a", 8),
			record(2, RawKind::Created, "a", 9),
		];

		let matching = match_records(&operations, &records, WINDOW);

		assert_eq!(
			matching.operations[0],
			OperationMatch {
				record: Some(MatchedRecord {
					sequence_no: 0,
					observed_at: Timestamp::from_millis(7),
				}),
				extra_records: 1,
				echo_records: 1,
			}
		);
		assert_eq!(matching.unrelated_records, 0);
	}

	#[test]
	fn late_echoes_stay_with_their_operation() {
		// Everything is read after the modify was issued, echoes of the create included
		let operations = [op(1, Create, "a", 0), op(2, Modify, "a", 1)];
		let records = [
			record(0, RawKind::Created, "a", 10),
			record(1, RawKind::Modified, "a", 10),
			record(2, RawKind::ClosedWrite, "a", 10),
			record(3, RawKind::Modified, "a", 10),
			record(4, RawKind::ClosedWrite, "a", 10),
		];

		let matching = match_records(&operations, &records, WINDOW);

		assert_eq!(matching.operations[0].echo_records, 2);
		assert_eq!(
			matching.operations[1],
			OperationMatch {
				record: Some(MatchedRecord {
					sequence_no: 3,
					observed_at: Timestamp::from_millis(10),
				}),
				extra_records: 0,
				echo_records: 1,
			}
		);
		assert_eq!(matching.unrelated_records, 0);
	}

	#[test]
	fn unclosed_echoes_are_left_to_later_operations() {
		// No close ends the create's run, so a modification read after the next issue is
		// the next operation's
		let operations = [op(1, Create, "a", 0), op(2, Modify, "a", 1)];
		let records = [
			record(0, RawKind::Created, "a", 10),
			record(1, RawKind::Modified, "a", 11),
		];

		let matching = match_records(&operations, &records, WINDOW);

		assert_eq!(matching.operations[0].echo_records, 0);
		assert_eq!(
			matching.operations[1].record.map(|r| r.sequence_no),
			Some(1)
		);
	}

	#[test]
	fn records_before_a_match_are_not_claimed_by_it() {
		let operations = [op(1, Create, "a", 0)];
		let records = [
			record(0, RawKind::Modified, "a", 5),
			record(1, RawKind::Created, "a", 7),
		];

		let matching = match_records(&operations, &records, WINDOW);

		assert_eq!(
			matching.operations[0].record.map(|r| r.sequence_no),
			Some(1)
		);
		assert_eq!(matching.operations[0].echo_records, 0);
		assert_eq!(matching.unrelated_records, 1);
		assert_eq!(matching.attributed, vec![false, true]);
	}

	#[test]
	fn records_outside_the_window_do_not_match() {
		let operations = [op(1, Create, "a", 1_000)];
		let records = [
			record(0, RawKind::Created, "a", 999),
			record(1, RawKind::Created, "a", 6_001),
		];

		let matching = match_records(&operations, &records, WINDOW);

		assert_eq!(matching.operations[0].record, None);
		assert_eq!(matching.unrelated_records, 2);
	}

	#[test]
	fn consumed_records_are_not_reused() {
		let operations = [op(1, Modify, "a", 0), op(2, Modify, "a", 1)];
		let records = [record(0, RawKind::Modified, "a", 3)];

		let matching = match_records(&operations, &records, WINDOW);

		assert!(matching.operations[0].record.is_some());
		assert_eq!(matching.operations[1].record, None);
	}

	#[test]
	fn rename_consumes_its_companion() {
		let operations = [rename_op(1, "a", "b", 0)];
		let records = [
			record(0, RawKind::RenamedFrom, "a", 2),
			record(1, RawKind::RenamedTo, "b", 2),
		];

		let matching = match_records(&operations, &records, WINDOW);

		assert_eq!(
			matching.operations[0].record.map(|r| r.sequence_no),
			Some(0)
		);
		assert_eq!(matching.operations[0].extra_records, 0);
		assert_eq!(matching.unrelated_records, 0);
	}

	#[test]
	fn rename_companion_alone_is_a_match() {
		let operations = [rename_op(1, "a", "b", 0)];
		let records = [record(4, RawKind::Created, "b", 150)];

		let matching = match_records(&operations, &records, WINDOW);

		assert_eq!(
			matching.operations[0].record.map(|r| r.sequence_no),
			Some(4)
		);
	}

	#[test]
	fn leftovers_belong_to_latest_operation_on_path() {
		let operations = [op(1, Create, "a", 0), op(2, Delete, "a", 100)];
		let records = [
			record(0, RawKind::Created, "a", 10),
			record(1, RawKind::Removed, "a", 110),
			// Echo of the delete
			record(2, RawKind::MetadataChanged, "a", 111),
			// Owned by the delete, which expects no creation
			record(3, RawKind::Created, "a", 112),
			record(4, RawKind::Created, "elsewhere", 20),
			record(5, RawKind::Overflow, "", 30),
		];

		let matching = match_records(&operations, &records, WINDOW);

		assert_eq!(matching.operations[0].echo_records, 0);
		assert_eq!(matching.operations[1].echo_records, 1);
		assert_eq!(matching.operations[1].extra_records, 0);
		assert_eq!(matching.unrelated_records, 2);
		assert_eq!(matching.overflow_events, 1);
	}
}
