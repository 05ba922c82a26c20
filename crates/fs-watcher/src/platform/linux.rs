//! Raw inotify backend
//!
//! inotify watches are not recursive, so the session keeps one watch per directory of the
//! tree and adds a watch for every directory created (or moved in) while it runs.

use std::{
	collections::HashMap,
	ffi::OsString,
	fs, io,
	path::{Path, PathBuf},
	time::Duration,
};

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use inotify::{Event, EventMask, EventStream, Inotify, WatchDescriptor, WatchMask, Watches};
use tokio::time::timeout;
use tracing::{debug, instrument, trace, warn};

use crate::{
	record::Sequencer, BackendId, Error, RawEventRecord, RawKind, Result, RunClock, WatchBackend,
	WatchSession,
};

const EVENT_BUFFER_SIZE: usize = 4096;

fn watch_mask() -> WatchMask {
	WatchMask::CREATE
		| WatchMask::DELETE
		| WatchMask::MODIFY
		| WatchMask::CLOSE_WRITE
		| WatchMask::ATTRIB
		| WatchMask::MOVED_FROM
		| WatchMask::MOVED_TO
		| WatchMask::DELETE_SELF
		| WatchMask::MOVE_SELF
}

#[derive(Debug, Clone)]
pub struct InotifyBackend {
	id: BackendId,
}

impl InotifyBackend {
	#[must_use]
	pub fn new() -> Self {
		Self {
			id: BackendId::new("inotify"),
		}
	}
}

impl Default for InotifyBackend {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl WatchBackend for InotifyBackend {
	fn id(&self) -> BackendId {
		self.id.clone()
	}

	#[instrument(skip(self, clock), fields(backend = %self.id, path = %path.display()), err)]
	async fn start(&self, path: &Path, clock: RunClock) -> Result<Box<dyn WatchSession>> {
		let inotify = Inotify::init().map_err(|source| Error::Init {
			backend: self.id.clone(),
			source,
		})?;

		// Watches must be taken before the instance is consumed by its stream
		let mut watches = inotify.watches();

		let mut dirs = HashMap::new();
		add_tree(&mut watches, &mut dirs, path).map_err(|(dir, source)| {
			Error::Watch {
				backend: self.id.clone(),
				path: dir.into_boxed_path(),
				source,
			}
		})?;

		let stream = inotify
			.into_event_stream([0u8; EVENT_BUFFER_SIZE])
			.map_err(|source| Error::Init {
				backend: self.id.clone(),
				source,
			})?;

		debug!(watched_dirs = dirs.len(), "Watching scratch tree;");

		Ok(Box::new(InotifySession {
			backend_id: self.id.clone(),
			root: path.to_path_buf(),
			clock,
			sequencer: Sequencer::default(),
			watches,
			dirs,
			stream,
			pending_error: None,
		}))
	}
}

/// Watches `dir` and every directory below it
fn add_tree(
	watches: &mut Watches,
	dirs: &mut HashMap<WatchDescriptor, PathBuf>,
	dir: &Path,
) -> std::result::Result<(), (PathBuf, io::Error)> {
	let wd = watches
		.add(dir, watch_mask())
		.map_err(|e| (dir.to_path_buf(), e))?;
	dirs.insert(wd, dir.to_path_buf());

	let entries = fs::read_dir(dir).map_err(|e| (dir.to_path_buf(), e))?;
	for entry in entries.flatten() {
		if entry.file_type().is_ok_and(|file_type| file_type.is_dir()) {
			add_tree(watches, dirs, &entry.path())?;
		}
	}

	Ok(())
}

struct InotifySession {
	backend_id: BackendId,
	root: PathBuf,
	clock: RunClock,
	sequencer: Sequencer,
	watches: Watches,
	dirs: HashMap<WatchDescriptor, PathBuf>,
	stream: EventStream<[u8; EVENT_BUFFER_SIZE]>,
	/// Read failure hit while draining, reported by the next poll
	pending_error: Option<Error>,
}

impl InotifySession {
	fn handle_event(
		&mut self,
		event: io::Result<Event<OsString>>,
		batch: &mut Vec<RawEventRecord>,
	) -> Result<()> {
		let observed_at = self.clock.now();

		let Event { wd, mask, name, .. } = event.map_err(|source| Error::Read {
			backend: self.backend_id.clone(),
			source,
		})?;

		if mask.contains(EventMask::IGNORED) {
			self.dirs.remove(&wd);
			return Ok(());
		}

		let path = match (self.dirs.get(&wd), name) {
			(Some(dir), Some(name)) => dir.join(name),
			(Some(dir), None) => dir.clone(),
			// Queue overflows carry no watch descriptor
			(None, _) => self.root.clone(),
		};

		if mask.contains(EventMask::ISDIR)
			&& mask.intersects(EventMask::CREATE | EventMask::MOVED_TO)
		{
			if let Err((dir, e)) = add_tree(&mut self.watches, &mut self.dirs, &path) {
				warn!(
					backend = %self.backend_id,
					dir = %dir.display(),
					?e,
					"Failed to watch new directory;",
				);
			}
		}

		batch.push(self.sequencer.record(
			&self.backend_id,
			RawKind::from_inotify(mask),
			format!("{mask:?}"),
			path,
			observed_at,
		));

		Ok(())
	}
}

#[async_trait]
impl WatchSession for InotifySession {
	async fn poll(&mut self, wait: Duration) -> Result<Vec<RawEventRecord>> {
		if let Some(e) = self.pending_error.take() {
			return Err(e);
		}

		let mut batch = Vec::new();

		let first = match timeout(wait, self.stream.next()).await {
			Ok(Some(event)) => event,
			Ok(None) | Err(_) => return Ok(batch),
		};
		self.handle_event(first, &mut batch)?;

		while let Some(Some(event)) = self.stream.next().now_or_never() {
			if let Err(e) = self.handle_event(event, &mut batch) {
				// Records already read stay valid, the caller learns of the failure next time
				self.pending_error = Some(e);
				break;
			}
		}

		Ok(batch)
	}

	async fn stop(mut self: Box<Self>) -> Result<()> {
		for (wd, dir) in self.dirs.drain() {
			if let Err(e) = self.watches.remove(wd) {
				// Directories removed by the workload already dropped their watch
				trace!(backend = %self.backend_id, dir = %dir.display(), ?e, "Watch already gone;");
			}
		}

		trace!(backend = %self.backend_id, "Session stopped;");

		Ok(())
	}
}
