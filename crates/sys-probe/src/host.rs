use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Static description of the host a diagnostic ran on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
	pub os_name: Option<String>,
	pub os_version: Option<String>,
	pub kernel_version: Option<String>,
	pub host_name: Option<String>,
	pub cpu_count: usize,
	pub total_memory_bytes: u64,
}

impl HostInfo {
	#[must_use]
	pub fn collect() -> Self {
		let mut sys = System::new();
		sys.refresh_cpu();
		sys.refresh_memory();

		Self {
			os_name: System::name(),
			os_version: System::os_version(),
			kernel_version: System::kernel_version(),
			host_name: System::host_name(),
			cpu_count: sys.cpus().len(),
			total_memory_bytes: sys.total_memory(),
		}
	}
}
