use std::sync::Arc;

use fwd_fs_watcher::RunClock;
use tokio::sync::watch;
use tracing::Span;
use uuid::Uuid;

use crate::DiagnosticConfig;

/// Everything the tasks of one diagnostic run share
#[derive(Debug, Clone)]
pub struct RunContext {
	pub run_id: Uuid,
	pub clock: RunClock,
	pub config: Arc<DiagnosticConfig>,
	/// Raised once every collector acknowledged its backend
	pub start: Signal,
	/// Raised when the workload, the grace period or the deadline is over
	pub stop: Signal,
	pub span: Span,
}

impl RunContext {
	#[must_use]
	pub fn new(config: Arc<DiagnosticConfig>, span: Span) -> Self {
		Self {
			run_id: Uuid::new_v4(),
			clock: RunClock::start(),
			config,
			start: Signal::new(),
			stop: Signal::new(),
			span,
		}
	}
}

/// One-shot broadcast flag: once triggered it stays triggered
#[derive(Debug, Clone)]
pub struct Signal {
	tx: Arc<watch::Sender<bool>>,
	rx: watch::Receiver<bool>,
}

impl Signal {
	#[must_use]
	pub fn new() -> Self {
		let (tx, rx) = watch::channel(false);
		Self {
			tx: Arc::new(tx),
			rx,
		}
	}

	pub fn trigger(&self) {
		self.tx.send_replace(true);
	}

	#[must_use]
	pub fn is_triggered(&self) -> bool {
		*self.rx.borrow()
	}

	/// Resolves once the signal is triggered
	pub async fn wait(&self) {
		let mut rx = self.rx.clone();
		// The sender lives as long as any clone of this signal, so this can't fail
		let _ = rx.wait_for(|triggered| *triggered).await;
	}
}

impl Default for Signal {
	fn default() -> Self {
		Self::new()
	}
}

/// Triggers its signal when dropped, so no task outlives an early return
#[derive(Debug)]
pub(crate) struct TriggerOnDrop(pub(crate) Signal);

impl Drop for TriggerOnDrop {
	fn drop(&mut self) {
		self.0.trigger();
	}
}
