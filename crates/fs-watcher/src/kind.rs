use notify::{
	event::{AccessKind, AccessMode, ModifyKind, RenameMode},
	EventKind,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Normalised notification vocabulary shared by every backend.
///
/// Backends keep the granularity of their mechanism (a close-after-write is not folded into
/// a modification) so the verifier can tell a primary notification from its echoes.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RawKind {
	Created,
	Modified,
	ClosedWrite,
	MetadataChanged,
	Removed,
	RenamedFrom,
	RenamedTo,
	/// Rename reported without telling which side the path is on
	Renamed,
	Accessed,
	/// The mechanism lost events (kernel queue overflow or a rescan request)
	Overflow,
	Other,
}

impl RawKind {
	/// Maps a `notify` event kind.
	///
	/// `None` for rename notifications carrying both paths: the inotify-backed watcher
	/// already reported the `From` and `To` halves individually.
	#[must_use]
	pub fn from_notify(kind: &EventKind) -> Option<Self> {
		Some(match kind {
			EventKind::Create(_) => Self::Created,
			EventKind::Remove(_) => Self::Removed,
			EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return None,
			EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Self::RenamedFrom,
			EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Self::RenamedTo,
			EventKind::Modify(ModifyKind::Name(_)) => Self::Renamed,
			EventKind::Modify(ModifyKind::Metadata(_)) => Self::MetadataChanged,
			EventKind::Modify(_) => Self::Modified,
			EventKind::Access(AccessKind::Close(AccessMode::Write)) => Self::ClosedWrite,
			EventKind::Access(_) => Self::Accessed,
			EventKind::Any | EventKind::Other => Self::Other,
		})
	}

	#[cfg(target_os = "linux")]
	#[must_use]
	pub fn from_inotify(mask: inotify::EventMask) -> Self {
		use inotify::EventMask;

		if mask.contains(EventMask::Q_OVERFLOW) {
			Self::Overflow
		} else if mask.contains(EventMask::CREATE) {
			Self::Created
		} else if mask.contains(EventMask::DELETE) {
			Self::Removed
		} else if mask.contains(EventMask::MOVED_FROM) {
			Self::RenamedFrom
		} else if mask.contains(EventMask::MOVED_TO) {
			Self::RenamedTo
		} else if mask.contains(EventMask::MODIFY) {
			Self::Modified
		} else if mask.contains(EventMask::CLOSE_WRITE) {
			Self::ClosedWrite
		} else if mask.contains(EventMask::ATTRIB) {
			Self::MetadataChanged
		} else if mask.intersects(EventMask::ACCESS | EventMask::OPEN | EventMask::CLOSE_NOWRITE) {
			Self::Accessed
		} else {
			Self::Other
		}
	}
}
