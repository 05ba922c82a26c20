//! Host probes for file-watch diagnostics.
//!
//! Nothing here takes part in verifying event delivery; the values only annotate a run and
//! back the advisory hints shown next to a verdict.

#![warn(
	clippy::all,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	unused_allocation,
	clippy::dbg_macro,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod error;
mod filesystem;
mod host;
mod limits;
mod resources;

pub use error::Error;
pub use filesystem::{parse_mounts, FilesystemInfo, MountEntry, INCOMPATIBLE_FILESYSTEMS};
pub use host::HostInfo;
pub use limits::{count_inotify_watches, WatchConsumer, WatchLimits, TOP_CONSUMERS};
pub use resources::ResourceSnapshot;

pub type Result<T> = std::result::Result<T, Error>;
