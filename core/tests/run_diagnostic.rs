#![allow(clippy::unwrap_used)]

use fwd_core::{
	probe::StaticProbe, verifier::MatchStatus, BackendFailure, BackendOutcome, Diagnostic,
	DiagnosticConfig, Notice, OperationKind, PlanStep, RunError,
};
use fwd_fs_watcher::{BackendId, RawEventRecord, RunClock, WatchBackend, WatchSession};

use std::{future::pending, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use tempfile::tempdir;
use tracing_test::traced_test;

/// Starts fine and never reports anything
struct SilentBackend;

struct SilentSession;

#[async_trait]
impl WatchBackend for SilentBackend {
	fn id(&self) -> BackendId {
		BackendId::new("silent")
	}

	async fn start(
		&self,
		_path: &Path,
		_clock: RunClock,
	) -> fwd_fs_watcher::Result<Box<dyn WatchSession>> {
		Ok(Box::new(SilentSession))
	}
}

#[async_trait]
impl WatchSession for SilentSession {
	async fn poll(&mut self, timeout: Duration) -> fwd_fs_watcher::Result<Vec<RawEventRecord>> {
		tokio::time::sleep(timeout).await;
		Ok(vec![])
	}

	async fn stop(self: Box<Self>) -> fwd_fs_watcher::Result<()> {
		Ok(())
	}
}

/// Refuses to start, like a mechanism missing from the host
struct UnavailableBackend;

#[async_trait]
impl WatchBackend for UnavailableBackend {
	fn id(&self) -> BackendId {
		BackendId::new("unavailable")
	}

	async fn start(
		&self,
		_path: &Path,
		_clock: RunClock,
	) -> fwd_fs_watcher::Result<Box<dyn WatchSession>> {
		Err(fwd_fs_watcher::Error::Unavailable {
			backend: self.id(),
			reason: "not on this host".to_string(),
		})
	}
}

/// Never finishes starting
struct StuckBackend;

#[async_trait]
impl WatchBackend for StuckBackend {
	fn id(&self) -> BackendId {
		BackendId::new("stuck")
	}

	async fn start(
		&self,
		_path: &Path,
		_clock: RunClock,
	) -> fwd_fs_watcher::Result<Box<dyn WatchSession>> {
		pending().await
	}
}

fn creates(count: usize) -> Vec<PlanStep> {
	(0..count)
		.map(|i| PlanStep::create(format!("file_{i:04}.txt")))
		.collect()
}

fn config(scratch_dir: &Path, plan: Vec<PlanStep>, inter_op_delay: Duration) -> DiagnosticConfig {
	DiagnosticConfig {
		scratch_dir: scratch_dir.to_path_buf(),
		plan: Some(plan),
		inter_op_delay,
		observation_grace_period: Duration::from_millis(500),
		max_latency_window: Duration::from_secs(5),
		setup_timeout: Duration::from_secs(2),
		..Default::default()
	}
}

fn assert_scratch_removed(base: &Path) {
	assert_eq!(std::fs::read_dir(base).unwrap().count(), 0);
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn compliant_backend_delivers_every_create() {
	use fwd_fs_watcher::{BackendKind, BackendOptions};

	let base = tempdir().unwrap();

	let report = Diagnostic::new(config(base.path(), creates(10), Duration::from_secs(1)))
		.with_backends([BackendKind::Inotify.build(&BackendOptions::default())])
		.with_probe(StaticProbe::default())
		.run()
		.await
		.unwrap();

	assert_eq!(report.operations.len(), 10);
	assert!(report.notices.is_empty());

	let BackendOutcome::Verified {
		verdict, results, ..
	} = &report.backends[0].outcome
	else {
		panic!("inotify must be verified: {:?}", report.backends[0].outcome);
	};

	assert_eq!(verdict.delivered_count, 10);
	assert!((verdict.reliability_ratio - 1.0).abs() < f64::EPSILON);
	assert!(results
		.iter()
		.all(|result| result.status == MatchStatus::Delivered));
	assert!(results
		.iter()
		.filter_map(|result| result.latency)
		.all(|latency| latency <= Duration::from_secs(5)));

	assert_scratch_removed(base.path());
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn default_workload_without_delay_is_fully_delivered() {
	use fwd_fs_watcher::{BackendKind, BackendOptions};

	let base = tempdir().unwrap();
	let config = DiagnosticConfig {
		plan: None,
		..config(base.path(), vec![], Duration::ZERO)
	};

	let report = Diagnostic::new(config)
		.with_backends([BackendKind::Inotify.build(&BackendOptions::default())])
		.with_probe(StaticProbe::default())
		.run()
		.await
		.unwrap();

	let verdict = report.backend("inotify").unwrap().verdict().unwrap();

	// Creates, modifications, then deletes and renames
	assert_eq!(verdict.total_operations, 30);
	assert_eq!(verdict.reordered_count, 0);
	assert_eq!(verdict.duplicated_count, 0);
	assert_eq!(verdict.delivered_count, 30);
	assert!((verdict.reliability_ratio - 1.0).abs() < f64::EPSILON);

	assert_scratch_removed(base.path());
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn silent_backend_still_gets_a_verdict() {
	let base = tempdir().unwrap();

	let report = Diagnostic::new(config(base.path(), creates(10), Duration::from_millis(20)))
		.with_backends([Arc::new(SilentBackend) as Arc<dyn WatchBackend>])
		.with_probe(StaticProbe::default())
		.run()
		.await
		.unwrap();

	let verdict = report.backend("silent").unwrap().verdict().unwrap();

	assert_eq!(verdict.total_operations, 10);
	assert_eq!(verdict.missed_count, 10);
	assert!(verdict.reliability_ratio.abs() < f64::EPSILON);

	assert_scratch_removed(base.path());
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn failing_backends_are_skipped() {
	let base = tempdir().unwrap();
	let mut config = config(base.path(), creates(3), Duration::ZERO);
	config.setup_timeout = Duration::from_millis(300);

	let report = Diagnostic::new(config)
		.with_backends([
			Arc::new(UnavailableBackend) as Arc<dyn WatchBackend>,
			Arc::new(StuckBackend),
			Arc::new(SilentBackend),
		])
		.with_probe(StaticProbe::default())
		.run()
		.await
		.unwrap();

	let ids = report
		.backends
		.iter()
		.map(|backend| backend.backend_id.as_str())
		.collect::<Vec<_>>();
	assert_eq!(ids, vec!["unavailable", "stuck", "silent"]);

	assert!(matches!(
		&report.backends[0].outcome,
		BackendOutcome::Unavailable {
			failure: BackendFailure::Unavailable {
				quota_exhausted: false,
				..
			}
		}
	));
	assert!(matches!(
		&report.backends[1].outcome,
		BackendOutcome::Unavailable {
			failure: BackendFailure::CollectionTimeout { .. }
		}
	));
	assert!(report.backends[2].verdict().is_some());
	assert_eq!(report.verdicts().count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn deadline_cuts_the_workload_short() {
	let base = tempdir().unwrap();
	let mut config = config(base.path(), creates(10), Duration::from_millis(500));
	config.run_deadline = Some(Duration::from_millis(1_200));

	let report = Diagnostic::new(config)
		.with_backends([Arc::new(SilentBackend) as Arc<dyn WatchBackend>])
		.with_probe(StaticProbe::default())
		.run()
		.await
		.unwrap();

	assert!(report.is_partial());
	let Some(Notice::PartialRunTimeout {
		completed_operations,
		planned_operations,
		..
	}) = report.notices.first()
	else {
		panic!("expected a partial run notice: {:?}", report.notices);
	};

	assert_eq!(*planned_operations, 10);
	assert!(*completed_operations < 10);
	assert_eq!(report.operations.len(), *completed_operations);
	assert_eq!(
		report.backends[0].verdict().unwrap().total_operations,
		*completed_operations
	);

	assert_scratch_removed(base.path());
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn invalid_configuration_is_rejected() {
	let base = tempdir().unwrap();
	let mut config = config(base.path(), creates(1), Duration::ZERO);
	config.backends.clear();

	let e = Diagnostic::new(config)
		.with_probe(StaticProbe::default())
		.run()
		.await
		.unwrap_err();

	assert!(matches!(e, RunError::InvalidConfig(_)));
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn failed_operation_aborts_and_cleans_up() {
	let base = tempdir().unwrap();
	let plan = vec![PlanStep::create("a.txt"), PlanStep::delete("missing.txt")];

	let e = Diagnostic::new(config(base.path(), plan, Duration::ZERO))
		.with_backends([Arc::new(SilentBackend) as Arc<dyn WatchBackend>])
		.with_probe(StaticProbe::default())
		.run()
		.await
		.unwrap_err();

	assert!(matches!(
		e,
		RunError::Workload {
			operation_id: 2,
			kind: OperationKind::Delete,
			..
		}
	));
	assert_scratch_removed(base.path());
}
