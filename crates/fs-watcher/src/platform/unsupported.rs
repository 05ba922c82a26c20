use std::path::Path;

use async_trait::async_trait;

use crate::{BackendId, Error, Result, RunClock, WatchBackend, WatchSession};

/// Stand-in for hosts without inotify; never starts
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

	async fn start(&self, _path: &Path, _clock: RunClock) -> Result<Box<dyn WatchSession>> {
		Err(Error::Unavailable {
			backend: self.id.clone(),
			reason: "inotify is only available on Linux".to_string(),
		})
	}
}
