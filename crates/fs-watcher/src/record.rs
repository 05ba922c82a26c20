use std::{fmt, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{RawKind, Timestamp};

/// Name of a backend, as shown in verdicts and reports
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(Arc<str>);

impl BackendId {
	#[must_use]
	pub fn new(name: impl AsRef<str>) -> Self {
		Self(Arc::from(name.as_ref()))
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for BackendId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for BackendId {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

/// One notification as delivered by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEventRecord {
	pub backend_id: BackendId,
	pub raw_kind: RawKind,
	/// The mechanism's own name for the notification
	pub native_kind: String,
	pub path: PathBuf,
	pub observed_at: Timestamp,
	/// Per-backend arrival order, starting at 0
	pub sequence_no: u64,
}

/// Hands out arrival sequence numbers for one backend session
#[derive(Debug, Default)]
pub(crate) struct Sequencer {
	next: u64,
}

impl Sequencer {
	pub(crate) fn record(
		&mut self,
		backend_id: &BackendId,
		raw_kind: RawKind,
		native_kind: String,
		path: PathBuf,
		observed_at: Timestamp,
	) -> RawEventRecord {
		let sequence_no = self.next;
		self.next += 1;

		RawEventRecord {
			backend_id: backend_id.clone(),
			raw_kind,
			native_kind,
			path,
			observed_at,
			sequence_no,
		}
	}
}
