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

use std::{
	env, fs,
	io::{self, Write},
	path::{Path, PathBuf},
	time::Duration,
};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use fwd_core::{quick_check::QuickCheck, run_diagnostic, DiagnosticConfig, DiagnosticReport};
use fwd_fs_watcher::BackendKind;
use fwd_sys_probe::WatchLimits;
use tracing::{info, level_filters::LevelFilter};

mod logging;
mod reporting;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
	Human,
	Json,
	Csv,
}

impl OutputFormat {
	fn reporter_name(self) -> &'static str {
		match self {
			Self::Human => "human",
			Self::Json => "json",
			Self::Csv => "csv",
		}
	}
}

#[derive(Parser, Debug)]
#[command(name = "fwd", version, about = "Finds out why file-watch notifications go missing")]
struct Cli {
	/// Directory for log files and saved reports
	#[arg(long, global = true, env = "FWD_LOG_DIR", default_value = "logs")]
	log_dir: PathBuf,

	/// Default log level, `RUST_LOG` takes precedence
	#[arg(long, global = true, default_value = "info")]
	log_level: LevelFilter,

	/// Output format
	#[arg(long, global = true, value_enum, default_value = "human")]
	format: OutputFormat,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Run the synthetic workload against every backend and verify what each one reported
	Run(RunArgs),
	/// Check watch limits, filesystem, host load and event delivery for a directory
	QuickCheck {
		/// Directory to check (default: current directory)
		directory: Option<PathBuf>,
	},
	/// Show inotify limits and the processes holding the most watches
	Limits,
}

#[derive(Args, Debug)]
struct RunArgs {
	/// YAML or JSON configuration file; flags below override its values
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Base directory for the scratch area
	#[arg(long)]
	scratch_dir: Option<PathBuf>,

	/// Number of files in the default workload
	#[arg(short = 'n', long)]
	operations: Option<usize>,

	/// Pause between operations, e.g. `250ms`
	#[arg(long, value_parser = humantime::parse_duration)]
	delay: Option<Duration>,

	/// How long to keep listening once the workload is done
	#[arg(long, value_parser = humantime::parse_duration)]
	grace: Option<Duration>,

	/// Latest a notification may arrive and still count
	#[arg(long, value_parser = humantime::parse_duration)]
	window: Option<Duration>,

	/// Operations on one path closer than this form a burst
	#[arg(long, value_parser = humantime::parse_duration)]
	coalesce_window: Option<Duration>,

	/// Hard stop for the whole run
	#[arg(long, value_parser = humantime::parse_duration)]
	deadline: Option<Duration>,

	/// Backends to compare, comma separated
	#[arg(long = "backend", value_delimiter = ',')]
	backends: Vec<BackendKind>,

	/// Seed of the file content generator
	#[arg(long)]
	seed: Option<u64>,

	/// Don't save the JSON report in the log directory
	#[arg(long)]
	no_save: bool,
}

impl RunArgs {
	fn apply(&self, config: &mut DiagnosticConfig) {
		if let Some(scratch_dir) = &self.scratch_dir {
			config.scratch_dir.clone_from(scratch_dir);
		}
		if let Some(operations) = self.operations {
			config.operation_count = operations;
			config.plan = None;
		}
		if let Some(delay) = self.delay {
			config.inter_op_delay = delay;
		}
		if let Some(grace) = self.grace {
			config.observation_grace_period = grace;
		}
		if let Some(window) = self.window {
			config.max_latency_window = window;
		}
		if self.coalesce_window.is_some() {
			config.coalesce_window = self.coalesce_window;
		}
		if self.deadline.is_some() {
			config.run_deadline = self.deadline;
		}
		if !self.backends.is_empty() {
			config.backends.clone_from(&self.backends);
		}
		if self.seed.is_some() {
			config.seed = self.seed;
		}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
	let (_log_guard, log_file) = logging::init(&cli.log_dir, cli.log_level, &stamp)?;
	info!(log_file = %log_file.display(), "Logging initialised;");

	let mut stdout = io::stdout().lock();

	match cli.command {
		Commands::Run(args) => {
			let report = run(&args, &cli.log_dir, &stamp).await?;
			let reporter = reporting::registry::reporter(cli.format.reporter_name())
				.context("no reporter for the requested format")?;
			reporter.render(&report, &mut stdout)?;
		}
		Commands::QuickCheck { directory } => {
			let directory = match directory {
				Some(directory) => directory,
				None => env::current_dir().context("reading the current directory")?,
			};

			let report = QuickCheck::new(directory).run().await;

			match cli.format {
				OutputFormat::Human => reporting::text::render_quick_check(&report, &mut stdout)?,
				OutputFormat::Json => print_json(&report, &mut stdout)?,
				OutputFormat::Csv => bail!("csv output is only available for `run`"),
			}
		}
		Commands::Limits => {
			let limits = WatchLimits::read().context("reading inotify limits")?;

			match cli.format {
				OutputFormat::Human => reporting::text::render_limits(&limits, &mut stdout)?,
				OutputFormat::Json => print_json(&limits, &mut stdout)?,
				OutputFormat::Csv => bail!("csv output is only available for `run`"),
			}
		}
	}

	stdout.flush()?;

	Ok(())
}

async fn run(args: &RunArgs, log_dir: &Path, stamp: &str) -> Result<DiagnosticReport> {
	let mut config = match &args.config {
		Some(path) => DiagnosticConfig::load_from(path)?,
		None => DiagnosticConfig::default(),
	};
	args.apply(&mut config);

	let report = run_diagnostic(config).await?;

	if !args.no_save {
		let path = save_report(&report, log_dir, stamp)?;
		info!(path = %path.display(), "Saved report;");
	}

	Ok(report)
}

fn save_report(report: &DiagnosticReport, log_dir: &Path, stamp: &str) -> Result<PathBuf> {
	let path = log_dir.join(format!("{}_{stamp}.json", logging::LOG_FILE_PREFIX));
	let json = serde_json::to_vec_pretty(report).context("serializing report")?;
	fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;

	Ok(path)
}

fn print_json(value: &impl serde::Serialize, out: &mut impl Write) -> Result<()> {
	serde_json::to_writer_pretty(&mut *out, value)?;
	writeln!(out)?;
	Ok(())
}
