use std::{io, path::Path};

use thiserror::Error;

use crate::BackendId;

#[derive(Debug, Error)]
pub enum Error {
	#[error("watch backend unavailable <backend='{backend}'>: {reason}")]
	Unavailable { backend: BackendId, reason: String },

	#[error("failed to initialise notification mechanism <backend='{backend}'>: {source}")]
	Init {
		backend: BackendId,
		#[source]
		source: io::Error,
	},

	#[error("unable to watch path <backend='{backend}', path='{}'>: {source}", .path.display())]
	Watch {
		backend: BackendId,
		path: Box<Path>,
		#[source]
		source: io::Error,
	},

	#[error("failed to read notifications <backend='{backend}'>: {source}")]
	Read {
		backend: BackendId,
		#[source]
		source: io::Error,
	},

	#[error("notify watcher error <backend='{backend}'>: {source}")]
	Notify {
		backend: BackendId,
		#[source]
		source: notify::Error,
	},
}

impl Error {
	/// Whether the failure comes from an exhausted watch or instance quota
	#[must_use]
	pub fn is_quota_exhausted(&self) -> bool {
		match self {
			Self::Init { source, .. } | Self::Watch { source, .. } | Self::Read { source, .. } => {
				is_quota_errno(source)
			}
			Self::Notify { source, .. } => match &source.kind {
				notify::ErrorKind::MaxFilesWatch => true,
				notify::ErrorKind::Io(e) => is_quota_errno(e),
				_ => false,
			},
			Self::Unavailable { .. } => false,
		}
	}
}

fn is_quota_errno(e: &io::Error) -> bool {
	matches!(e.raw_os_error(), Some(libc::ENOSPC | libc::EMFILE))
}
