use std::{
	fs,
	path::{Path, PathBuf},
};

use tempfile::{Builder, TempDir};
use tracing::debug;

use crate::{FileIOError, RunError};

const SCRATCH_PREFIX: &str = "fwd-";

/// Directory the workload runs in, removed when dropped or closed
#[derive(Debug)]
pub struct ScratchArea {
	dir: TempDir,
	root: PathBuf,
}

impl ScratchArea {
	pub fn create(base: &Path) -> Result<Self, RunError> {
		fs::create_dir_all(base).map_err(|e| {
			RunError::ScratchDir(FileIOError::from_std_io_err_with_msg(
				base,
				e,
				"scratch base directory",
			))
		})?;

		let dir = Builder::new()
			.prefix(SCRATCH_PREFIX)
			.tempdir_in(base)
			.map_err(|e| RunError::ScratchDir(FileIOError::from_std_io_err(base, e)))?;

		// Backends report resolved paths, so operations must use them too
		let root = dir
			.path()
			.canonicalize()
			.map_err(|e| RunError::ScratchDir(FileIOError::from_std_io_err(dir.path(), e)))?;

		debug!(root = %root.display(), "Created scratch area;");

		Ok(Self { dir, root })
	}

	#[must_use]
	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Removes the directory, reporting failures that a plain drop would swallow
	pub fn close(self) -> Result<(), RunError> {
		let Self { dir, root } = self;

		dir.close()
			.map_err(|e| RunError::ScratchDir(FileIOError::from_std_io_err(&root, e)))?;

		debug!(root = %root.display(), "Removed scratch area;");

		Ok(())
	}
}
