use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use async_channel as chan;
use async_trait::async_trait;
use notify::{Config, Event, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::time::timeout;
use tracing::{debug, error, instrument, trace, warn};

use crate::{
	record::Sequencer, BackendId, Error, RawEventRecord, RawKind, Result, RunClock, WatchBackend,
	WatchSession,
};

/// Which of `notify`'s watchers to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyFlavor {
	/// The platform's native watcher (inotify on Linux)
	Recommended,
	/// Periodic directory scans
	Poll { interval: Duration },
}

#[derive(Debug, Clone)]
pub struct NotifyBackend {
	id: BackendId,
	flavor: NotifyFlavor,
	queue_capacity: usize,
}

impl NotifyBackend {
	#[must_use]
	pub fn new(flavor: NotifyFlavor, queue_capacity: usize) -> Self {
		let id = match flavor {
			NotifyFlavor::Recommended => "notify",
			NotifyFlavor::Poll { .. } => "poll",
		};

		Self {
			id: BackendId::new(id),
			flavor,
			queue_capacity: queue_capacity.max(1),
		}
	}

	fn event_handler(
		&self,
		root: PathBuf,
		clock: RunClock,
		records_tx: chan::Sender<RawEventRecord>,
	) -> impl FnMut(notify::Result<Event>) + Send + 'static {
		let backend_id = self.id.clone();
		let mut sequencer = Sequencer::default();

		move |result| {
			let observed_at = clock.now();

			let event = match result {
				Ok(event) => event,
				Err(e) => {
					warn!(%backend_id, ?e, "Watcher reported an error;");
					return;
				}
			};

			let raw_kind = if event.need_rescan() {
				RawKind::Overflow
			} else if let Some(raw_kind) = RawKind::from_notify(&event.kind) {
				raw_kind
			} else {
				trace!(%backend_id, ?event, "Skipping paired rename notification;");
				return;
			};

			let native_kind = format!("{:?}", event.kind);

			let paths = if event.paths.is_empty() {
				vec![root.clone()]
			} else {
				event.paths
			};

			for path in paths {
				let record =
					sequencer.record(&backend_id, raw_kind, native_kind.clone(), path, observed_at);

				if records_tx.is_closed() {
					debug!(%backend_id, "Dropping notification for a stopped session;");
					return;
				}

				// Blocks the watcher thread while the queue is full, so the kernel side
				// overflows instead of records being silently discarded here
				if records_tx.send_blocking(record).is_err() {
					error!(%backend_id, "Unable to queue watcher notification;");
					return;
				}
			}
		}
	}
}

#[async_trait]
impl WatchBackend for NotifyBackend {
	fn id(&self) -> BackendId {
		self.id.clone()
	}

	#[instrument(skip(self, clock), fields(backend = %self.id, path = %path.display()), err)]
	async fn start(&self, path: &Path, clock: RunClock) -> Result<Box<dyn WatchSession>> {
		let (records_tx, records_rx) = chan::bounded(self.queue_capacity);
		let handler = self.event_handler(path.to_path_buf(), clock, records_tx);

		let notify_error = |source| Error::Notify {
			backend: self.id.clone(),
			source,
		};

		let mut watcher: Box<dyn Watcher + Send> = match self.flavor {
			NotifyFlavor::Recommended => {
				Box::new(RecommendedWatcher::new(handler, Config::default()).map_err(notify_error)?)
			}
			NotifyFlavor::Poll { interval } => Box::new(
				PollWatcher::new(handler, Config::default().with_poll_interval(interval))
					.map_err(notify_error)?,
			),
		};

		watcher
			.watch(path, RecursiveMode::Recursive)
			.map_err(notify_error)?;

		debug!("Watching scratch tree;");

		Ok(Box::new(NotifySession {
			backend_id: self.id.clone(),
			root: path.to_path_buf(),
			watcher,
			records_rx,
		}))
	}
}

struct NotifySession {
	backend_id: BackendId,
	root: PathBuf,
	watcher: Box<dyn Watcher + Send>,
	records_rx: chan::Receiver<RawEventRecord>,
}

#[async_trait]
impl WatchSession for NotifySession {
	async fn poll(&mut self, wait: Duration) -> Result<Vec<RawEventRecord>> {
		let mut batch = Vec::new();

		match timeout(wait, self.records_rx.recv()).await {
			Ok(Ok(record)) => batch.push(record),
			// Closed or idle
			Ok(Err(_)) | Err(_) => return Ok(batch),
		}

		while let Ok(record) = self.records_rx.try_recv() {
			batch.push(record);
		}

		Ok(batch)
	}

	async fn stop(mut self: Box<Self>) -> Result<()> {
		if let Err(e) = self.watcher.unwatch(&self.root) {
			// The tree is usually already gone by now
			debug!(backend = %self.backend_id, ?e, "Failed to unwatch scratch tree;");
		}

		self.records_rx.close();
		drop(self.watcher);

		trace!(backend = %self.backend_id, "Session stopped;");

		Ok(())
	}
}
