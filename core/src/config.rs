//! Diagnostic run configuration

use std::{
	borrow::Cow,
	collections::HashSet,
	env, fs,
	path::{Path, PathBuf},
	time::Duration,
};

use fwd_fs_watcher::{BackendKind, BackendOptions};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
	operation::{default_plan, validate_plan},
	verifier::VerifierSettings,
	ConfigError, FileIOError, PlanStep,
};

/// Added to the expected workload duration to get the default run deadline
const DEADLINE_MARGIN: Duration = Duration::from_secs(10);

/// Lower bound of the default burst window
const MIN_COALESCE_WINDOW: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticConfig {
	/// Base directory under which the run's scratch directory is created
	pub scratch_dir: PathBuf,

	/// Number of files in the default plan, ignored when `plan` is set
	pub operation_count: usize,

	/// Explicit workload, relative to the scratch directory
	pub plan: Option<Vec<PlanStep>>,

	#[serde(with = "humantime_serde")]
	pub inter_op_delay: Duration,

	/// How long collectors keep listening once the workload is done
	#[serde(with = "humantime_serde")]
	pub observation_grace_period: Duration,

	/// Records observed later than this after their operation don't match it
	#[serde(with = "humantime_serde")]
	pub max_latency_window: Duration,

	/// Operations on one path closer than this form a burst;
	/// defaults to `max(inter_op_delay, 50ms)`
	#[serde(with = "humantime_serde")]
	pub coalesce_window: Option<Duration>,

	pub backends: Vec<BackendKind>,

	/// Hard stop for the workload and the collectors; derived from the workload when unset
	#[serde(with = "humantime_serde")]
	pub run_deadline: Option<Duration>,

	/// How long a backend may take to acknowledge that it is watching
	#[serde(with = "humantime_serde")]
	pub setup_timeout: Duration,

	#[serde(with = "humantime_serde")]
	pub poll_timeout: Duration,

	pub queue_capacity: usize,

	#[serde(with = "humantime_serde")]
	pub poll_interval: Duration,

	/// Bytes written by every create and modify
	pub content_size: usize,

	/// Seed of the file content generator, random when unset
	pub seed: Option<u64>,
}

impl Default for DiagnosticConfig {
	fn default() -> Self {
		let backend_options = BackendOptions::default();

		Self {
			scratch_dir: env::temp_dir(),
			operation_count: 10,
			plan: None,
			inter_op_delay: Duration::ZERO,
			observation_grace_period: Duration::from_secs(2),
			max_latency_window: Duration::from_secs(5),
			coalesce_window: None,
			backends: vec![BackendKind::Inotify, BackendKind::Notify],
			run_deadline: None,
			setup_timeout: Duration::from_secs(5),
			poll_timeout: Duration::from_millis(100),
			queue_capacity: backend_options.queue_capacity,
			poll_interval: backend_options.poll_interval,
			content_size: 1024,
			seed: None,
		}
	}
}

impl DiagnosticConfig {
	/// Loads a configuration file, YAML for `.yaml`/`.yml` and JSON otherwise.
	///
	/// Missing keys take their default value.
	pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		info!(path = %path.display(), "Loading configuration;");

		let raw = fs::read_to_string(path)
			.map_err(|e| FileIOError::from_std_io_err_with_msg(path, e, "configuration file"))?;

		let is_yaml = path
			.extension()
			.and_then(|ext| ext.to_str())
			.is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

		let config: Self = if is_yaml {
			serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
				path: path.into(),
				source,
			})?
		} else {
			serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
				path: path.into(),
				source,
			})?
		};

		config.validate()?;

		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));

		match &self.plan {
			Some(plan) => validate_plan(plan)?,
			None if self.operation_count == 0 => {
				return invalid("operation_count must be at least 1");
			}
			None => {}
		}

		if self.backends.is_empty() {
			return invalid("at least one backend is required");
		}

		let mut seen = HashSet::with_capacity(self.backends.len());
		if !self.backends.iter().all(|kind| seen.insert(kind)) {
			return invalid("backends must not repeat");
		}

		if self.max_latency_window.is_zero() {
			return invalid("max_latency_window must be positive");
		}

		if self.poll_timeout.is_zero() {
			return invalid("poll_timeout must be positive");
		}

		if self.setup_timeout.is_zero() {
			return invalid("setup_timeout must be positive");
		}

		if self.queue_capacity == 0 {
			return invalid("queue_capacity must be at least 1");
		}

		if self.poll_interval.is_zero() {
			return invalid("poll_interval must be positive");
		}

		if self.run_deadline.is_some_and(|deadline| deadline.is_zero()) {
			return invalid("run_deadline must be positive");
		}

		Ok(())
	}

	/// The explicit plan, or the default one for `operation_count` files
	#[must_use]
	pub fn operation_plan(&self) -> Cow<'_, [PlanStep]> {
		match &self.plan {
			Some(plan) => Cow::Borrowed(plan),
			None => Cow::Owned(default_plan(self.operation_count)),
		}
	}

	#[must_use]
	pub fn coalesce_window(&self) -> Duration {
		self.coalesce_window
			.unwrap_or_else(|| self.inter_op_delay.max(MIN_COALESCE_WINDOW))
	}

	/// Expected workload time plus grace period plus a fixed margin, unless configured
	#[must_use]
	pub fn run_deadline(&self) -> Duration {
		self.run_deadline.unwrap_or_else(|| {
			let operations = u32::try_from(self.operation_plan().len()).unwrap_or(u32::MAX);
			self.inter_op_delay
				.saturating_mul(operations)
				.saturating_add(self.observation_grace_period)
				.saturating_add(DEADLINE_MARGIN)
		})
	}

	#[must_use]
	pub fn backend_options(&self) -> BackendOptions {
		BackendOptions {
			queue_capacity: self.queue_capacity,
			poll_interval: self.poll_interval,
		}
	}

	#[must_use]
	pub fn verifier_settings(&self) -> VerifierSettings {
		VerifierSettings {
			max_latency_window: self.max_latency_window,
			coalesce_window: self.coalesce_window(),
		}
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;
	use tempfile::tempdir;

	#[test]
	fn defaults_are_valid() {
		let config = DiagnosticConfig::default();
		assert!(config.validate().is_ok());
		assert_eq!(config.operation_plan().len(), 30);
		assert_eq!(config.coalesce_window(), Duration::from_millis(50));
		assert_eq!(config.run_deadline(), Duration::from_secs(12));
	}

	#[test]
	fn derived_windows_follow_delay() {
		let config = DiagnosticConfig {
			operation_count: 2,
			inter_op_delay: Duration::from_millis(200),
			..Default::default()
		};

		assert_eq!(config.coalesce_window(), Duration::from_millis(200));
		// 6 operations * 200ms + 2s grace + 10s margin
		assert_eq!(config.run_deadline(), Duration::from_millis(13_200));
	}

	#[test]
	fn rejects_invalid_values() {
		let no_backends = DiagnosticConfig {
			backends: vec![],
			..Default::default()
		};
		assert!(no_backends.validate().is_err());

		let repeated = DiagnosticConfig {
			backends: vec![BackendKind::Notify, BackendKind::Notify],
			..Default::default()
		};
		assert!(repeated.validate().is_err());

		let no_operations = DiagnosticConfig {
			operation_count: 0,
			..Default::default()
		};
		assert!(no_operations.validate().is_err());

		let empty_plan = DiagnosticConfig {
			plan: Some(vec![]),
			..Default::default()
		};
		assert!(empty_plan.validate().is_err());
	}

	#[test]
	fn loads_partial_yaml() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("diagnostic.yaml");
		fs::write(
			&path,
			"operation_count: 3\ninter_op_delay: 250ms\nbackends: [poll]\nmax_latency_window: 2s\n",
		)
		.unwrap();

		let config = DiagnosticConfig::load_from(&path).unwrap();

		assert_eq!(config.operation_count, 3);
		assert_eq!(config.inter_op_delay, Duration::from_millis(250));
		assert_eq!(config.backends, vec![BackendKind::Poll]);
		assert_eq!(config.max_latency_window, Duration::from_secs(2));
		assert_eq!(config.observation_grace_period, Duration::from_secs(2));
	}

	#[test]
	fn loads_json_with_plan() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("diagnostic.json");
		fs::write(
			&path,
			r#"{"plan": [{"kind": "create", "path": "a.txt"}], "coalesce_window": "10ms"}"#,
		)
		.unwrap();

		let config = DiagnosticConfig::load_from(&path).unwrap();

		assert_eq!(config.operation_plan().as_ref(), &[PlanStep::create("a.txt")]);
		assert_eq!(config.coalesce_window(), Duration::from_millis(10));
	}

	#[test]
	fn malformed_file_reports_path() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("broken.yml");
		fs::write(&path, "operation_count: [").unwrap();

		let e = DiagnosticConfig::load_from(&path).unwrap_err();
		assert!(matches!(e, ConfigError::Yaml { .. }));
		assert!(e.to_string().contains("broken.yml"));
	}
}
