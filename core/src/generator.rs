//! Synthetic workload
//!
//! Runs an operation plan sequentially against the scratch directory, stamping every
//! operation with the run clock right before its filesystem call.

use std::{
	collections::BTreeSet,
	fs::{self, OpenOptions},
	io::{self, Write},
	path::{Path, PathBuf},
	time::Duration,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::time::sleep;
use tracing::{debug, info, instrument, trace};

use crate::{FileIOError, Operation, OperationKind, PlanStep, RunContext, RunError};

#[derive(Debug)]
pub struct WorkloadGenerator {
	root: PathBuf,
	plan: Vec<PlanStep>,
	inter_op_delay: Duration,
	content_size: usize,
	rng: StdRng,
}

impl WorkloadGenerator {
	#[must_use]
	pub fn new(
		root: impl Into<PathBuf>,
		plan: Vec<PlanStep>,
		inter_op_delay: Duration,
		content_size: usize,
		seed: Option<u64>,
	) -> Self {
		Self {
			root: root.into(),
			plan,
			inter_op_delay,
			content_size,
			rng: seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
		}
	}

	/// Creates the directories the plan needs, before anything is watched
	pub async fn prepare(&self) -> Result<(), RunError> {
		let parents = self
			.plan
			.iter()
			.flat_map(|step| std::iter::once(&step.path).chain(&step.target))
			.filter_map(|path| path.parent())
			.filter(|parent| !parent.as_os_str().is_empty())
			.collect::<BTreeSet<_>>();

		for parent in parents {
			let dir = self.root.join(parent);
			tokio::fs::create_dir_all(&dir).await.map_err(|e| {
				RunError::ScratchDir(FileIOError::from_std_io_err_with_msg(
					&dir,
					e,
					"plan directory",
				))
			})?;
		}

		Ok(())
	}

	/// Issues every step of the plan, or those issued before `stop` was raised.
	///
	/// A failed filesystem call ends the workload with [`RunError::Workload`].
	#[instrument(skip_all, fields(steps = self.plan.len()))]
	pub async fn run(mut self, ctx: RunContext) -> Result<Vec<Operation>, RunError> {
		let plan = std::mem::take(&mut self.plan);
		let mut operations = Vec::with_capacity(plan.len());

		for (index, step) in plan.into_iter().enumerate() {
			if ctx.stop.is_triggered() {
				info!(issued = operations.len(), "Workload stopped early;");
				break;
			}

			if index > 0 && !self.inter_op_delay.is_zero() {
				tokio::select! {
					() = sleep(self.inter_op_delay) => {}
					() = ctx.stop.wait() => {
						info!(issued = operations.len(), "Workload stopped during delay;");
						break;
					}
				}
			}

			let id = operations.len() as u64 + 1;
			operations.push(self.issue(id, step, &ctx)?);
		}

		debug!(issued = operations.len(), "Workload finished;");

		Ok(operations)
	}

	fn issue(&mut self, id: u64, step: PlanStep, ctx: &RunContext) -> Result<Operation, RunError> {
		let PlanStep { kind, path, target } = step;
		let path = self.root.join(path);
		let target = target.map(|target| self.root.join(target));

		let content = match kind {
			OperationKind::Create | OperationKind::Modify => self.content(),
			OperationKind::Delete | OperationKind::Rename => Vec::new(),
		};

		let issued_at = ctx.clock.now();

		// Blocking calls on purpose, nothing may run between the stamp and the syscall
		let res = match (kind, &target) {
			(OperationKind::Create, _) => fs::write(&path, &content)
				.map_err(|e| FileIOError::from_std_io_err_with_msg(&path, e, "create")),
			(OperationKind::Modify, _) => overwrite(&path, &content)
				.map_err(|e| FileIOError::from_std_io_err_with_msg(&path, e, "modify")),
			(OperationKind::Delete, _) => fs::remove_file(&path)
				.map_err(|e| FileIOError::from_std_io_err_with_msg(&path, e, "delete")),
			(OperationKind::Rename, Some(target)) => fs::rename(&path, target)
				.map_err(|e| FileIOError::from_std_io_err_with_msg(&path, e, "rename")),
			(OperationKind::Rename, None) => Err(FileIOError::from_std_io_err_with_msg(
				&path,
				io::Error::new(io::ErrorKind::InvalidInput, "rename without a target"),
				"rename",
			)),
		};

		res.map_err(|source| RunError::Workload {
			operation_id: id,
			kind,
			source,
		})?;

		trace!(id, %kind, path = %path.display(), %issued_at, "Issued operation;");

		Ok(Operation {
			id,
			kind,
			path,
			target,
			issued_at,
		})
	}

	/// Lowercase text from the seeded generator
	fn content(&mut self) -> Vec<u8> {
		(0..self.content_size)
			.map(|_| self.rng.gen_range(b'a'..=b'z'))
			.collect()
	}
}

/// Rewrites the file in place: truncating first would add a notification of its own
fn overwrite(path: &Path, content: &[u8]) -> io::Result<()> {
	let mut file = OpenOptions::new().write(true).open(path)?;
	file.write_all(content)?;

	let len = content.len() as u64;
	if file.metadata()?.len() > len {
		file.set_len(len)?;
	}

	Ok(())
}
