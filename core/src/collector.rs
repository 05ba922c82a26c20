//! Drains one backend into a record log for the duration of a run

use std::{path::PathBuf, sync::Arc, time::Duration};

use fwd_fs_watcher::{BackendId, RawEventRecord, WatchBackend};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, trace, warn};

use crate::{BackendFailure, RunContext};

/// Everything a collector gathered, frozen once it returns
#[derive(Debug)]
pub struct Collection {
	pub backend_id: BackendId,
	pub records: Vec<RawEventRecord>,
	/// Set when the log is incomplete or missing altogether
	pub failure: Option<BackendFailure>,
}

impl Collection {
	#[must_use]
	pub fn failed(backend_id: BackendId, failure: BackendFailure) -> Self {
		Self {
			backend_id,
			records: Vec::new(),
			failure: Some(failure),
		}
	}
}

pub(crate) type StartAck = oneshot::Sender<Result<(), BackendFailure>>;

pub(crate) struct Collector {
	backend: Arc<dyn WatchBackend>,
	root: PathBuf,
	poll_timeout: Duration,
}

impl Collector {
	pub(crate) fn new(
		backend: Arc<dyn WatchBackend>,
		root: PathBuf,
		poll_timeout: Duration,
	) -> Self {
		Self {
			backend,
			root,
			poll_timeout,
		}
	}

	/// Starts the backend, acknowledges through `ack`, then polls from the start signal to the
	/// stop signal.
	///
	/// A start failure is sent through `ack` and returned; a poll failure ends collection
	/// and keeps what was gathered.
	#[instrument(
		name = "collector",
		skip_all,
		fields(backend = %self.backend.id(), root = %self.root.display()),
	)]
	pub(crate) async fn run(self, ctx: RunContext, ack: StartAck) -> Collection {
		let backend_id = self.backend.id();

		let mut session = match self.backend.start(&self.root, ctx.clock).await {
			Ok(session) => session,
			Err(e) => {
				let failure = BackendFailure::from(&e);
				warn!(?e, "Backend unavailable;");
				// The run may already have given up on us
				let _ = ack.send(Err(failure.clone()));
				return Collection::failed(backend_id, failure);
			}
		};

		if ack.send(Ok(())).is_err() {
			debug!("Run stopped waiting for this collector;");
		}

		tokio::select! {
			() = ctx.start.wait() => {}
			() = ctx.stop.wait() => {}
		}

		let mut records = Vec::new();
		let mut failure = None;

		if !ctx.stop.is_triggered() {
			info!("Collecting records;");
		}

		while !ctx.stop.is_triggered() {
			match session.poll(self.poll_timeout).await {
				Ok(batch) => {
					if !batch.is_empty() {
						trace!(count = batch.len(), "Received records;");
					}
					records.extend(batch);
				}
				Err(e) => {
					warn!(?e, records_kept = records.len(), "Collection interrupted;");
					failure = Some(BackendFailure::Interrupted {
						reason: e.to_string(),
						records_kept: records.len(),
					});
					break;
				}
			}
		}

		if failure.is_none() {
			match session.poll(Duration::ZERO).await {
				Ok(batch) => records.extend(batch),
				Err(e) => warn!(?e, "Failed to drain remaining records;"),
			}
		}

		if let Err(e) = session.stop().await {
			warn!(?e, "Failed to stop backend session cleanly;");
		}

		info!(records = records.len(), "Collection finished;");

		Collection {
			backend_id,
			records,
			failure,
		}
	}
}
