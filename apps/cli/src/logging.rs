use std::{
	fs, io,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "file_watch_diagnostics";

/// Logs to stderr and to `<log_dir>/file_watch_diagnostics_<stamp>.log`.
///
/// `RUST_LOG` overrides `level`. Records written to the file are only flushed while the
/// returned guard is alive.
pub fn init(log_dir: &Path, level: LevelFilter, stamp: &str) -> Result<(WorkerGuard, PathBuf)> {
	fs::create_dir_all(log_dir)
		.with_context(|| format!("creating log directory {}", log_dir.display()))?;

	let file_name = format!("{LOG_FILE_PREFIX}_{stamp}.log");
	let (non_blocking, guard) = tracing_appender::non_blocking(rolling::never(log_dir, &file_name));

	tracing_subscriber::registry()
		.with(
			EnvFilter::builder()
				.with_default_directive(level.into())
				.from_env_lossy(),
		)
		.with(fmt::layer().with_writer(io::stderr))
		.with(
			fmt::layer()
				.with_writer(non_blocking)
				.with_ansi(false)
				.with_target(true),
		)
		.try_init()
		.context("installing the tracing subscriber")?;

	Ok((guard, log_dir.join(file_name)))
}
