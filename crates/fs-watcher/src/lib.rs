//!
//! # Watch backends
//!
//! A uniform capability over the notification mechanisms a host offers, so that the same
//! synthetic workload can be observed through several of them and the results compared.
//!
//! Every backend turns its native notifications into [`RawEventRecord`]s carrying:
//! - the normalised [`RawKind`] plus the mechanism's own label;
//! - the affected path;
//! - an `observed_at` [`Timestamp`] taken from the run's shared [`RunClock`];
//! - a per-backend `sequence_no` giving the arrival order.
//!
//! ## Basic example
//!
//! ```no_run
//! use fwd_fs_watcher::{BackendKind, BackendOptions, RunClock};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), fwd_fs_watcher::Error> {
//! let backend = BackendKind::Notify.build(&BackendOptions::default());
//! let clock = RunClock::start();
//!
//! let mut session = backend.start("/tmp".as_ref(), clock).await?;
//! let records = session.poll(Duration::from_millis(100)).await?;
//! println!("{} records", records.len());
//! session.stop().await?;
//! # Ok(())
//! # }
//! ```

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
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::dbg_macro,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod backend;
mod clock;
mod error;
mod kind;
mod notify_backend;
mod platform;
mod record;

pub use backend::{BackendKind, BackendOptions, WatchBackend, WatchSession};
pub use clock::{RunClock, Timestamp};
pub use error::Error;
pub use kind::RawKind;
pub use notify_backend::{NotifyBackend, NotifyFlavor};
pub use platform::InotifyBackend;
pub use record::{BackendId, RawEventRecord};

pub type Result<T> = std::result::Result<T, Error>;
