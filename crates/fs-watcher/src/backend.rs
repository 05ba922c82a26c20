use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
	BackendId, InotifyBackend, NotifyBackend, NotifyFlavor, RawEventRecord, Result, RunClock,
};

/// A notification mechanism able to watch a directory tree.
#[async_trait]
pub trait WatchBackend: Send + Sync + 'static {
	fn id(&self) -> BackendId;

	/// Begins watching `path` recursively.
	///
	/// Fails with [`Error::Unavailable`](crate::Error::Unavailable) (or a more specific
	/// variant) when the mechanism can't be initialised; callers treat that as a reason to
	/// skip this backend, not to abort.
	async fn start(&self, path: &Path, clock: RunClock) -> Result<Box<dyn WatchSession>>;
}

/// A live watch created by [`WatchBackend::start`].
#[async_trait]
pub trait WatchSession: Send {
	/// Waits up to `timeout` for records, then returns everything already queued.
	///
	/// An idle or closed mechanism yields an empty batch, never an error. A failure met after
	/// some records were read returns those records first and the error on the next call.
	async fn poll(&mut self, timeout: Duration) -> Result<Vec<RawEventRecord>>;

	async fn stop(self: Box<Self>) -> Result<()>;
}

/// Tuning shared by the backends we know how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendOptions {
	/// Capacity of the queue between a callback thread and the session
	pub queue_capacity: usize,
	/// Scan interval of the polling watcher
	pub poll_interval: Duration,
}

impl Default for BackendOptions {
	fn default() -> Self {
		Self {
			queue_capacity: 4096,
			poll_interval: Duration::from_millis(100),
		}
	}
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BackendKind {
	/// Raw kernel inotify
	Inotify,
	/// `notify`'s recommended watcher
	Notify,
	/// `notify`'s polling watcher
	Poll,
}

impl BackendKind {
	pub const ALL: [Self; 3] = [Self::Inotify, Self::Notify, Self::Poll];

	#[must_use]
	pub fn build(self, options: &BackendOptions) -> Arc<dyn WatchBackend> {
		match self {
			Self::Inotify => Arc::new(InotifyBackend::new()),
			Self::Notify => Arc::new(NotifyBackend::new(
				NotifyFlavor::Recommended,
				options.queue_capacity,
			)),
			Self::Poll => Arc::new(NotifyBackend::new(
				NotifyFlavor::Poll {
					interval: options.poll_interval,
				},
				options.queue_capacity,
			)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backend_kinds_parse_from_names() {
		assert_eq!("inotify".parse::<BackendKind>().ok(), Some(BackendKind::Inotify));
		assert_eq!("Notify".parse::<BackendKind>().ok(), Some(BackendKind::Notify));
		assert_eq!("poll".parse::<BackendKind>().ok(), Some(BackendKind::Poll));
		assert!("fsevents".parse::<BackendKind>().is_err());
	}

	#[test]
	fn built_backends_are_named_after_their_kind() {
		let options = BackendOptions::default();
		for kind in BackendKind::ALL {
			assert_eq!(kind.build(&options).id().as_str(), kind.to_string());
		}
	}
}
