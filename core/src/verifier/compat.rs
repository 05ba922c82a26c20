//! Which normalised notifications an operation is expected to produce

use fwd_fs_watcher::RawKind;

use crate::OperationKind;

/// Path of an operation a record is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
	/// The operation's own path (the source, for a rename)
	Source,
	/// The target path of a rename
	Target,
}

/// Kinds that count as the notification of the operation
pub(crate) fn is_primary(kind: OperationKind, side: Side, raw: RawKind) -> bool {
	use RawKind::*;

	match (kind, side) {
		(OperationKind::Create, Side::Source) => matches!(raw, Created),
		(OperationKind::Modify, Side::Source) => {
			matches!(raw, Modified | ClosedWrite | MetadataChanged)
		}
		(OperationKind::Delete, Side::Source) => matches!(raw, Removed),
		(OperationKind::Rename, Side::Source) => matches!(raw, RenamedFrom | Renamed | Removed),
		(OperationKind::Rename, Side::Target) => matches!(raw, RenamedTo | Renamed | Created),
		(_, Side::Target) => false,
	}
}

/// Secondary kinds the same syscalls produce, absorbed without affecting the verdict
pub(crate) fn is_echo(kind: OperationKind, side: Side, raw: RawKind) -> bool {
	use RawKind::*;

	match (kind, side) {
		(OperationKind::Create, Side::Source) => {
			matches!(raw, Modified | ClosedWrite | MetadataChanged | Accessed)
		}
		(OperationKind::Modify, Side::Source) => {
			matches!(raw, ClosedWrite | MetadataChanged | Accessed)
		}
		(OperationKind::Delete, Side::Source) => matches!(raw, MetadataChanged),
		(OperationKind::Rename, Side::Target) => matches!(raw, MetadataChanged | Accessed),
		(OperationKind::Rename, Side::Source) | (_, Side::Target) => false,
	}
}
