//! Orchestration of one diagnostic run

use std::{pin::pin, sync::Arc};

use chrono::Utc;
use futures_concurrency::future::Join;
use fwd_fs_watcher::{BackendId, WatchBackend};
use tokio::{
	spawn,
	sync::oneshot,
	task::JoinHandle,
	time::{sleep, timeout_at, Instant},
};
use tracing::{debug, error, field, info, instrument, warn, Instrument, Span};

use crate::{
	advisor::{advise, advise_unavailable, HostFacts},
	collector::{Collection, Collector},
	context::TriggerOnDrop,
	generator::WorkloadGenerator,
	probe::{HostProbe, SystemProbe},
	report::{BackendOutcome, BackendReport, DiagnosticReport, Notice},
	scratch::ScratchArea,
	verifier::{verify, VerifierSettings},
	BackendFailure, DiagnosticConfig, Operation, ProbeError, RunContext, RunError,
};

/// A diagnostic run waiting to be started.
///
/// Backends default to those named in the configuration and host facts to [`SystemProbe`];
/// both can be replaced, which is how tests drive the run with stub mechanisms.
pub struct Diagnostic {
	config: DiagnosticConfig,
	backends: Option<Vec<Arc<dyn WatchBackend>>>,
	probe: Arc<dyn HostProbe>,
}

impl Diagnostic {
	#[must_use]
	pub fn new(config: DiagnosticConfig) -> Self {
		Self {
			config,
			backends: None,
			probe: Arc::new(SystemProbe),
		}
	}

	#[must_use]
	pub fn with_backends(
		mut self,
		backends: impl IntoIterator<Item = Arc<dyn WatchBackend>>,
	) -> Self {
		self.backends = Some(backends.into_iter().collect());
		self
	}

	#[must_use]
	pub fn with_probe(mut self, probe: impl HostProbe) -> Self {
		self.probe = Arc::new(probe);
		self
	}

	/// Runs the workload while every backend collects, then verifies each record log.
	///
	/// Only configuration, scratch directory and workload failures abort the run; a backend
	/// that can't be used is reported as unavailable and the others are still verified.
	#[instrument(name = "diagnostic", skip_all, fields(run_id = field::Empty), err)]
	pub async fn run(self) -> Result<DiagnosticReport, RunError> {
		let Self {
			config,
			backends,
			probe,
		} = self;

		config.validate()?;

		let backends = backends.unwrap_or_else(|| {
			let options = config.backend_options();
			config
				.backends
				.iter()
				.map(|kind| kind.build(&options))
				.collect()
		});

		let config = Arc::new(config);
		let started_at = Utc::now();

		let scratch = ScratchArea::create(&config.scratch_dir)?;
		let ctx = RunContext::new(Arc::clone(&config), Span::current());
		ctx.span.record("run_id", field::display(ctx.run_id));

		// Whatever way we leave, collectors and the workload must wind down
		let _stop_on_exit = TriggerOnDrop(ctx.stop.clone());

		let mut notices = Vec::new();

		let (watch_limits, filesystem, resources_start, host) = (
			probe.watch_limits(),
			probe.filesystem(scratch.root()),
			probe.resources(),
			probe.host(),
		)
			.join()
			.await;

		let watch_limits = probed(&mut notices, "watch_limits", watch_limits);
		let filesystem = probed(&mut notices, "filesystem", filesystem);
		let resources_start = probed(&mut notices, "resources_start", resources_start);
		let host = probed(&mut notices, "host", host);

		let plan = config.operation_plan().into_owned();
		let planned_operations = plan.len();

		let generator = WorkloadGenerator::new(
			scratch.root(),
			plan,
			config.inter_op_delay,
			config.content_size,
			config.seed,
		);
		generator.prepare().await?;

		info!(
			backends = backends.len(),
			planned_operations,
			root = %scratch.root().display(),
			"Starting collectors;"
		);

		let slots = start_collectors(backends, &scratch, &ctx).await;

		ctx.start.trigger();
		info!("Issuing workload;");

		let deadline = config.run_deadline();
		let mut deadline_sleep = pin!(sleep(deadline));
		let mut workload = spawn(generator.run(ctx.clone()).in_current_span());

		let (operations, deadline_hit) = tokio::select! {
			res = &mut workload => {
				let operations = res??;
				debug!(issued = operations.len(), "Workload done, observing grace period;");

				tokio::select! {
					() = sleep(config.observation_grace_period) => (operations, false),
					() = &mut deadline_sleep => (operations, true),
				}
			}
			() = &mut deadline_sleep => {
				warn!(?deadline, "Run deadline reached during the workload;");
				ctx.stop.trigger();
				(workload.await??, true)
			}
		};

		ctx.stop.trigger();

		if deadline_hit {
			notices.push(Notice::PartialRunTimeout {
				deadline,
				completed_operations: operations.len(),
				planned_operations,
			});
		}

		let collections = join_collectors(slots).await;

		let resources_end = probed(&mut notices, "resources_end", probe.resources().await);

		let facts = HostFacts {
			watch_limits: watch_limits.as_ref(),
			filesystem: filesystem.as_ref(),
			resources_start: resources_start.as_ref(),
			resources_end: resources_end.as_ref(),
		};
		let settings = config.verifier_settings();

		let backends = collections
			.into_iter()
			.map(|collection| backend_report(collection, &operations, &settings, &facts))
			.collect::<Vec<_>>();

		let scratch_dir = scratch.root().to_path_buf();
		scratch.close()?;

		info!(
			operations = operations.len(),
			backends = backends.len(),
			partial = deadline_hit,
			"Diagnostic run finished;"
		);

		Ok(DiagnosticReport {
			run_id: ctx.run_id,
			started_at,
			finished_at: Utc::now(),
			config: config.as_ref().clone(),
			scratch_dir,
			operations,
			backends,
			notices,
			resources_start,
			resources_end,
			watch_limits,
			filesystem,
			host,
		})
	}
}

/// Runs a diagnostic with the backends named in `config` against the running host
pub async fn run_diagnostic(config: DiagnosticConfig) -> Result<DiagnosticReport, RunError> {
	Diagnostic::new(config).run().await
}

enum CollectorSlot {
	Running {
		backend_id: BackendId,
		handle: JoinHandle<Collection>,
	},
	Done(Collection),
}

/// Spawns one collector per backend and waits for every acknowledgment, sharing one setup
/// deadline. Backends that fail or don't answer in time are settled right away.
async fn start_collectors(
	backends: Vec<Arc<dyn WatchBackend>>,
	scratch: &ScratchArea,
	ctx: &RunContext,
) -> Vec<CollectorSlot> {
	let setup_timeout = ctx.config.setup_timeout;

	let pending = backends
		.into_iter()
		.map(|backend| {
			let backend_id = backend.id();
			let (ack_tx, ack_rx) = oneshot::channel();
			let handle = spawn(
				Collector::new(backend, scratch.root().to_path_buf(), ctx.config.poll_timeout)
					.run(ctx.clone(), ack_tx)
					.in_current_span(),
			);

			(backend_id, handle, ack_rx)
		})
		.collect::<Vec<_>>();

	let setup_deadline = Instant::now() + setup_timeout;
	let mut slots = Vec::with_capacity(pending.len());

	for (backend_id, handle, ack_rx) in pending {
		let slot = match timeout_at(setup_deadline, ack_rx).await {
			Ok(Ok(Ok(()))) => {
				debug!(backend = %backend_id, "Collector ready;");
				CollectorSlot::Running { backend_id, handle }
			}
			Ok(Ok(Err(failure))) => {
				warn!(backend = %backend_id, %failure, "Skipping unavailable backend;");
				CollectorSlot::Done(Collection::failed(backend_id, failure))
			}
			Ok(Err(_)) => {
				error!(backend = %backend_id, "Collector exited before acknowledging start;");
				handle.abort();
				CollectorSlot::Done(Collection::failed(
					backend_id,
					BackendFailure::CollectorCrashed,
				))
			}
			Err(_) => {
				warn!(backend = %backend_id, ?setup_timeout, "Backend didn't start in time;");
				handle.abort();
				CollectorSlot::Done(Collection::failed(
					backend_id,
					BackendFailure::CollectionTimeout { setup_timeout },
				))
			}
		};

		slots.push(slot);
	}

	slots
}

/// Waits for every running collector; they return once the stop signal is raised
async fn join_collectors(slots: Vec<CollectorSlot>) -> Vec<Collection> {
	slots
		.into_iter()
		.map(|slot| async move {
			match slot {
				CollectorSlot::Done(collection) => collection,
				CollectorSlot::Running { backend_id, handle } => {
					handle.await.unwrap_or_else(|e| {
						error!(backend = %backend_id, ?e, "Collector task failed;");
						Collection::failed(backend_id, BackendFailure::CollectorCrashed)
					})
				}
			}
		})
		.collect::<Vec<_>>()
		.join()
		.await
}

fn backend_report(
	Collection {
		backend_id,
		records,
		failure,
	}: Collection,
	operations: &[Operation],
	settings: &VerifierSettings,
	facts: &HostFacts<'_>,
) -> BackendReport {
	match failure {
		// Without a record log there is nothing to verify
		Some(failure) if !matches!(failure, BackendFailure::Interrupted { .. }) => BackendReport {
			hints: advise_unavailable(&failure, facts),
			outcome: BackendOutcome::Unavailable { failure },
			backend_id,
		},
		interrupted => {
			let verification = verify(backend_id.clone(), operations, &records, settings);
			let hints = advise(&verification, facts);

			info!(
				backend = %backend_id,
				reliability_ratio = verification.verdict.reliability_ratio,
				notified_ratio = verification.verdict.notified_ratio,
				records = verification.record_count,
				"Backend verified;"
			);

			BackendReport {
				backend_id,
				outcome: BackendOutcome::Verified {
					verdict: verification.verdict,
					results: verification.results,
					record_count: verification.record_count,
					unrelated_records: verification.unrelated_records,
					overflow_events: verification.overflow_events,
					interrupted,
				},
				hints,
			}
		}
	}
}

/// Keeps a probe's value, turning its failure into a notice
fn probed<T>(
	notices: &mut Vec<Notice>,
	probe: &'static str,
	res: Result<T, ProbeError>,
) -> Option<T> {
	match res {
		Ok(value) => Some(value),
		Err(ProbeError::NotProvided) => {
			debug!(probe, "Probe not provided;");
			None
		}
		Err(e) => {
			warn!(probe, ?e, "Host probe failed;");
			notices.push(Notice::ProbeFailed {
				probe: probe.to_string(),
				reason: e.to_string(),
			});
			None
		}
	}
}
