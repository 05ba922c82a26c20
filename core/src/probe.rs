//! Host facts gathered around a run, used for annotations and hints only

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fwd_sys_probe::{FilesystemInfo, HostInfo, ResourceSnapshot, WatchLimits};
use tokio::task::spawn_blocking;

use crate::ProbeError;

#[async_trait]
pub trait HostProbe: Send + Sync + 'static {
	async fn watch_limits(&self) -> Result<WatchLimits, ProbeError>;

	async fn filesystem(&self, path: &Path) -> Result<FilesystemInfo, ProbeError>;

	async fn resources(&self) -> Result<ResourceSnapshot, ProbeError>;

	async fn host(&self) -> Result<HostInfo, ProbeError>;
}

/// Reads the running host; every probe runs on the blocking pool
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

#[async_trait]
impl HostProbe for SystemProbe {
	async fn watch_limits(&self) -> Result<WatchLimits, ProbeError> {
		Ok(spawn_blocking(WatchLimits::read).await??)
	}

	async fn filesystem(&self, path: &Path) -> Result<FilesystemInfo, ProbeError> {
		let path = path.to_path_buf();
		Ok(spawn_blocking(move || FilesystemInfo::probe(path)).await??)
	}

	async fn resources(&self) -> Result<ResourceSnapshot, ProbeError> {
		Ok(spawn_blocking(ResourceSnapshot::take).await?)
	}

	async fn host(&self) -> Result<HostInfo, ProbeError> {
		Ok(spawn_blocking(HostInfo::collect).await?)
	}
}

/// Fixed answers, for tests and for hosts whose facts are known in advance.
///
/// Unset facts fail with [`ProbeError::NotProvided`].
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
	pub watch_limits: Option<WatchLimits>,
	pub filesystem: Option<FilesystemInfo>,
	pub resources: Option<ResourceSnapshot>,
	pub host: Option<HostInfo>,
}

#[async_trait]
impl HostProbe for StaticProbe {
	async fn watch_limits(&self) -> Result<WatchLimits, ProbeError> {
		self.watch_limits.clone().ok_or(ProbeError::NotProvided)
	}

	async fn filesystem(&self, path: &Path) -> Result<FilesystemInfo, ProbeError> {
		self.filesystem
			.clone()
			.map(|info| FilesystemInfo {
				path: PathBuf::from(path),
				..info
			})
			.ok_or(ProbeError::NotProvided)
	}

	async fn resources(&self) -> Result<ResourceSnapshot, ProbeError> {
		self.resources.clone().ok_or(ProbeError::NotProvided)
	}

	async fn host(&self) -> Result<HostInfo, ProbeError> {
		self.host.clone().ok_or(ProbeError::NotProvided)
	}
}
