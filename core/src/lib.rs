//!
//! # File-watch reliability diagnostics
//!
//! Issues a synthetic workload against a scratch directory while one collector per watch
//! backend records every notification, then reconciles both logs into per-backend verdicts.
//!
//! ```no_run
//! use fwd_core::{run_diagnostic, DiagnosticConfig};
//!
//! # async fn example() -> Result<(), fwd_core::RunError> {
//! let report = run_diagnostic(DiagnosticConfig::default()).await?;
//!
//! for verdict in report.verdicts() {
//! 	println!("{}: {:.1}%", verdict.backend_id, verdict.reliability_ratio * 100.0);
//! }
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

pub mod advisor;
mod collector;
mod config;
mod context;
mod error;
mod generator;
mod operation;
pub mod probe;
pub mod quick_check;
mod report;
mod run;
mod scratch;
pub mod verifier;

pub use collector::Collection;
pub use config::DiagnosticConfig;
pub use context::{RunContext, Signal};
pub use error::{BackendFailure, ConfigError, FileIOError, ProbeError, RunError};
pub use generator::WorkloadGenerator;
pub use operation::{default_plan, Operation, OperationKind, PlanStep};
pub use report::{BackendOutcome, BackendReport, DiagnosticReport, Notice};
pub use run::{run_diagnostic, Diagnostic};
pub use scratch::ScratchArea;
