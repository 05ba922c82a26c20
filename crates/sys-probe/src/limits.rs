use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{Error, Result};

/// How many processes [`WatchLimits::top_consumers`] lists at most
pub const TOP_CONSUMERS: usize = 10;

const INOTIFY_FD_TARGET: &str = "anon_inode:inotify";

/// inotify limits of the host and how much of them is in use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchLimits {
	pub max_user_watches: u64,
	pub max_user_instances: u64,
	pub max_queued_events: u64,
	/// Watches held by every process we are allowed to inspect
	pub current_watches: u64,
	pub current_instances: u64,
	/// Biggest watch holders, most watches first
	pub top_consumers: Vec<WatchConsumer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConsumer {
	pub pid: u32,
	pub name: String,
	pub watch_count: u64,
	pub instance_count: u64,
}

impl WatchLimits {
	/// Reads limits and usage from `/proc`.
	pub fn read() -> Result<Self> {
		Self::read_from(Path::new("/proc"))
	}

	/// Same as [`WatchLimits::read`] against an arbitrary procfs root.
	///
	/// Limits that can't be read are an error. Processes we can't inspect are skipped, so
	/// usage numbers are a lower bound when running unprivileged.
	pub fn read_from(proc_root: &Path) -> Result<Self> {
		let inotify_dir = proc_root.join("sys/fs/inotify");

		let max_user_watches = read_u64(&inotify_dir.join("max_user_watches"))?;
		let max_user_instances = read_u64(&inotify_dir.join("max_user_instances"))?;
		let max_queued_events = read_u64(&inotify_dir.join("max_queued_events"))?;

		let mut consumers = scan_consumers(proc_root);

		let current_watches = consumers.iter().map(|c| c.watch_count).sum();
		let current_instances = consumers.iter().map(|c| c.instance_count).sum();

		consumers.sort_by(|a, b| b.watch_count.cmp(&a.watch_count).then(a.pid.cmp(&b.pid)));
		consumers.truncate(TOP_CONSUMERS);

		debug!(
			max_user_watches,
			current_watches, current_instances, "Read inotify limits;"
		);

		Ok(Self {
			max_user_watches,
			max_user_instances,
			max_queued_events,
			current_watches,
			current_instances,
			top_consumers: consumers,
		})
	}

	/// Share of the watch quota in use, in `[0, 1]` unless the quota is already exceeded
	#[must_use]
	pub fn watch_usage(&self) -> Option<f64> {
		ratio(self.current_watches, self.max_user_watches)
	}

	#[must_use]
	pub fn instance_usage(&self) -> Option<f64> {
		ratio(self.current_instances, self.max_user_instances)
	}
}

#[allow(clippy::cast_precision_loss)]
fn ratio(used: u64, max: u64) -> Option<f64> {
	(max > 0).then(|| used as f64 / max as f64)
}

fn read_u64(path: &Path) -> Result<u64> {
	let raw = fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
	let value = raw.trim();

	value.parse().map_err(|_| Error::Malformed {
		path: path.into(),
		value: value.to_string(),
	})
}

/// Counts the `inotify wd:` lines of an fdinfo file, one per watch
#[must_use]
pub fn count_inotify_watches(fdinfo: &str) -> u64 {
	fdinfo
		.lines()
		.filter(|line| line.trim_start().starts_with("inotify wd:"))
		.count() as u64
}

fn scan_consumers(proc_root: &Path) -> Vec<WatchConsumer> {
	let Ok(entries) = fs::read_dir(proc_root) else {
		return vec![];
	};

	entries
		.flatten()
		.filter_map(|entry| {
			let pid = entry.file_name().to_str()?.parse::<u32>().ok()?;
			inspect_process(&entry.path(), pid)
		})
		.collect()
}

fn inspect_process(process_dir: &Path, pid: u32) -> Option<WatchConsumer> {
	// Other users' processes are unreadable without privileges
	let fds = fs::read_dir(process_dir.join("fd")).ok()?;

	let mut instance_count = 0;
	let mut watch_count = 0;

	for fd in fds.flatten() {
		let Ok(target) = fs::read_link(fd.path()) else {
			continue;
		};

		if target.as_os_str() != INOTIFY_FD_TARGET {
			continue;
		}

		instance_count += 1;

		match fs::read_to_string(process_dir.join("fdinfo").join(fd.file_name())) {
			Ok(fdinfo) => watch_count += count_inotify_watches(&fdinfo),
			Err(e) => trace!(pid, ?e, "Unable to read fdinfo;"),
		}
	}

	(instance_count > 0).then(|| WatchConsumer {
		pid,
		name: fs::read_to_string(process_dir.join("comm"))
			.map(|comm| comm.trim().to_string())
			.unwrap_or_else(|_| "unknown".to_string()),
		watch_count,
		instance_count,
	})
}
