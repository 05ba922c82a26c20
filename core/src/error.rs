use std::{
	fmt::{self, Display},
	io,
	path::Path,
	time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinError;

use crate::OperationKind;

/// File I/O error that includes the path that caused the error
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<&'static str>,
}

impl Display for FileIOError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"file I/O error{}: {}; path: '{}'",
			self.maybe_context
				.map(|ctx| format!(" ({ctx})"))
				.unwrap_or_default(),
			self.source,
			self.path.display()
		)
	}
}

impl FileIOError {
	pub fn from_std_io_err(path: impl AsRef<Path>, source: io::Error) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: None,
		}
	}

	pub fn from_std_io_err_with_msg(
		path: impl AsRef<Path>,
		source: io::Error,
		msg: &'static str,
	) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(msg),
		}
	}
}

impl From<(&Path, io::Error)> for FileIOError {
	fn from((path, source): (&Path, io::Error)) -> Self {
		Self::from_std_io_err(path, source)
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error(transparent)]
	Read(#[from] FileIOError),
	#[error("malformed YAML configuration <path='{}'>: {source}", .path.display())]
	Yaml {
		path: Box<Path>,
		#[source]
		source: serde_yaml::Error,
	},
	#[error("malformed JSON configuration <path='{}'>: {source}", .path.display())]
	Json {
		path: Box<Path>,
		#[source]
		source: serde_json::Error,
	},
	#[error("{0}")]
	Invalid(String),
}

/// Errors that abort a whole diagnostic run
#[derive(Debug, Error)]
pub enum RunError {
	#[error("invalid configuration: {0}")]
	InvalidConfig(#[from] ConfigError),
	#[error("scratch directory failure: {0}")]
	ScratchDir(FileIOError),
	#[error("workload operation failed <id='{operation_id}', kind='{kind}'>: {source}")]
	Workload {
		operation_id: u64,
		kind: OperationKind,
		#[source]
		source: FileIOError,
	},
	#[error("workload task failed: {0}")]
	TaskJoin(#[from] JoinError),
}

/// Why a backend produced no verdict, or an incomplete record log.
///
/// None of these abort the run: the other backends are still verified.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendFailure {
	#[error("backend unavailable: {reason}")]
	Unavailable {
		reason: String,
		/// The start failed on an exhausted watch or instance quota
		quota_exhausted: bool,
	},
	#[error("backend did not acknowledge start within {setup_timeout:?}")]
	CollectionTimeout {
		#[serde(with = "humantime_serde")]
		setup_timeout: Duration,
	},
	#[error("collection interrupted after {records_kept} records: {reason}")]
	Interrupted { reason: String, records_kept: usize },
	#[error("collector task crashed")]
	CollectorCrashed,
}

impl From<&fwd_fs_watcher::Error> for BackendFailure {
	fn from(e: &fwd_fs_watcher::Error) -> Self {
		Self::Unavailable {
			reason: e.to_string(),
			quota_exhausted: e.is_quota_exhausted(),
		}
	}
}

/// A host probe that could not produce its value
#[derive(Debug, Error)]
pub enum ProbeError {
	#[error(transparent)]
	SysProbe(#[from] fwd_sys_probe::Error),
	#[error("probe task failed: {0}")]
	TaskJoin(#[from] JoinError),
	#[error("not provided by this probe")]
	NotProvided,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn file_io_error_carries_path_and_context() {
		let e = FileIOError::from_std_io_err_with_msg(
			"/scratch/file_0000.txt",
			io::Error::from(io::ErrorKind::NotFound),
			"rename source",
		);

		let message = e.to_string();
		assert!(message.contains("(rename source)"));
		assert!(message.contains("path: '/scratch/file_0000.txt'"));
	}

	#[test]
	fn unavailable_failure_keeps_quota_flag() {
		let failure = BackendFailure::from(&fwd_fs_watcher::Error::Init {
			backend: "inotify".into(),
			source: io::Error::from_raw_os_error(24), // EMFILE
		});

		assert!(matches!(
			failure,
			BackendFailure::Unavailable {
				quota_exhausted: true,
				..
			}
		));
	}
}
