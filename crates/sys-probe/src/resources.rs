use std::thread;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

/// CPU, memory and process count at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
	pub taken_at: DateTime<Utc>,
	pub cpu_percent: f64,
	pub mem_percent: f64,
	pub process_count: usize,
}

impl ResourceSnapshot {
	/// Samples the host.
	///
	/// Blocks for [`MINIMUM_CPU_UPDATE_INTERVAL`], since CPU usage is the difference
	/// between two refreshes.
	#[must_use]
	pub fn take() -> Self {
		let mut sys = System::new();

		sys.refresh_cpu();
		thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
		sys.refresh_cpu();
		sys.refresh_memory();
		sys.refresh_processes();

		Self {
			taken_at: Utc::now(),
			cpu_percent: f64::from(sys.global_cpu_info().cpu_usage()),
			mem_percent: percent(sys.used_memory(), sys.total_memory()),
			process_count: sys.processes().len(),
		}
	}

	/// Whether CPU or memory usage is above `threshold` percent
	#[must_use]
	pub fn is_under_pressure(&self, threshold: f64) -> bool {
		self.cpu_percent > threshold || self.mem_percent > threshold
	}
}

#[allow(clippy::cast_precision_loss)]
fn percent(used: u64, total: u64) -> f64 {
	if total == 0 {
		0.0
	} else {
		used as f64 * 100.0 / total as f64
	}
}
