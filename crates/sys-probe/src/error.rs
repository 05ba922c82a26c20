use std::{io, path::Path};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("failed to read <path='{}'>: {source}", .path.display())]
	Read {
		path: Box<Path>,
		#[source]
		source: io::Error,
	},

	#[error("malformed value <path='{}', value='{value}'>", .path.display())]
	Malformed { path: Box<Path>, value: String },

	#[error("no mount entry covers <path='{}'>", .0.display())]
	MountNotFound(Box<Path>),

	#[error("statvfs failed <path='{}'>: {source}", .path.display())]
	Statvfs {
		path: Box<Path>,
		#[source]
		source: io::Error,
	},

	#[error("filesystem statistics are not available on this platform")]
	Unsupported,
}

impl Error {
	pub(crate) fn read(path: impl AsRef<Path>, source: io::Error) -> Self {
		Self::Read {
			path: path.as_ref().into(),
			source,
		}
	}
}
