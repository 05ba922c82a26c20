use std::path::{Component, Path, PathBuf};

use fwd_fs_watcher::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::ConfigError;

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
	Create,
	Modify,
	Delete,
	Rename,
}

/// One step of a workload plan, relative to the scratch directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
	pub kind: OperationKind,
	pub path: PathBuf,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target: Option<PathBuf>,
}

impl PlanStep {
	pub fn create(path: impl Into<PathBuf>) -> Self {
		Self {
			kind: OperationKind::Create,
			path: path.into(),
			target: None,
		}
	}

	pub fn modify(path: impl Into<PathBuf>) -> Self {
		Self {
			kind: OperationKind::Modify,
			path: path.into(),
			target: None,
		}
	}

	pub fn delete(path: impl Into<PathBuf>) -> Self {
		Self {
			kind: OperationKind::Delete,
			path: path.into(),
			target: None,
		}
	}

	pub fn rename(path: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
		Self {
			kind: OperationKind::Rename,
			path: path.into(),
			target: Some(target.into()),
		}
	}
}

/// A synthetic filesystem action as it was issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
	/// Strictly increasing in issue order, starting at 1
	pub id: u64,
	pub kind: OperationKind,
	pub path: PathBuf,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target: Option<PathBuf>,
	/// Taken right before the filesystem call
	pub issued_at: Timestamp,
}

/// `count` creates, a modification of each file, then deletion of the first half and
/// renaming of the rest
#[must_use]
pub fn default_plan(count: usize) -> Vec<PlanStep> {
	let name = |i: usize| format!("file_{i:04}.txt");
	let deleted = count / 2;

	(0..count)
		.map(|i| PlanStep::create(name(i)))
		.chain((0..count).map(|i| PlanStep::modify(name(i))))
		.chain((0..deleted).map(|i| PlanStep::delete(name(i))))
		.chain(
			(deleted..count)
				.map(|i| PlanStep::rename(name(i), format!("file_{i:04}.renamed.txt"))),
		)
		.collect()
}

pub fn validate_plan(plan: &[PlanStep]) -> Result<(), ConfigError> {
	if plan.is_empty() {
		return Err(ConfigError::Invalid("operation plan is empty".to_string()));
	}

	for (index, step) in plan.iter().enumerate() {
		check_relative(index, &step.path)?;

		match (step.kind, &step.target) {
			(OperationKind::Rename, Some(target)) => check_relative(index, target)?,
			(OperationKind::Rename, None) => {
				return Err(ConfigError::Invalid(format!(
					"plan step {index}: rename without a target"
				)));
			}
			(kind, Some(_)) => {
				return Err(ConfigError::Invalid(format!(
					"plan step {index}: {kind} does not take a target"
				)));
			}
			(_, None) => {}
		}
	}

	Ok(())
}

fn check_relative(index: usize, path: &Path) -> Result<(), ConfigError> {
	if !matches!(path.components().next_back(), Some(Component::Normal(_))) {
		return Err(ConfigError::Invalid(format!(
			"plan step {index}: path '{}' does not name a file",
			path.display()
		)));
	}

	if !path
		.components()
		.all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
	{
		return Err(ConfigError::Invalid(format!(
			"plan step {index}: path '{}' must stay inside the scratch directory",
			path.display()
		)));
	}

	Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	#[test]
	fn default_plan_shape() {
		let plan = default_plan(4);
		let kinds = plan.iter().map(|step| step.kind).collect::<Vec<_>>();

		use OperationKind::*;
		assert_eq!(
			kinds,
			vec![
				Create, Create, Create, Create, Modify, Modify, Modify, Modify, Delete, Delete,
				Rename, Rename
			]
		);
		assert_eq!(plan[8].path, PathBuf::from("file_0000.txt"));
		assert_eq!(
			plan[11],
			PlanStep::rename("file_0003.txt", "file_0003.renamed.txt")
		);
		assert!(validate_plan(&plan).is_ok());
	}

	#[test]
	fn rejects_escaping_paths() {
		assert!(validate_plan(&[PlanStep::create("../outside")]).is_err());
		assert!(validate_plan(&[PlanStep::create("/etc/passwd")]).is_err());
		assert!(validate_plan(&[PlanStep::create("")]).is_err());
		assert!(validate_plan(&[PlanStep::create(".")]).is_err());
		assert!(validate_plan(&[PlanStep::create("nested/./ok.txt")]).is_ok());
	}

	#[test]
	fn rejects_malformed_steps() {
		assert!(validate_plan(&[]).is_err());

		let missing_target = PlanStep {
			kind: OperationKind::Rename,
			path: "a".into(),
			target: None,
		};
		assert!(validate_plan(&[missing_target]).is_err());

		let stray_target = PlanStep {
			kind: OperationKind::Delete,
			path: "a".into(),
			target: Some("b".into()),
		};
		assert!(validate_plan(&[stray_target]).is_err());
	}

	#[test]
	fn plan_steps_deserialize_from_yaml() {
		let plan: Vec<PlanStep> = serde_yaml::from_str(
			"- { kind: create, path: a.txt }\n- { kind: rename, path: a.txt, target: b.txt }\n",
		)
		.unwrap();

		assert_eq!(
			plan,
			vec![PlanStep::create("a.txt"), PlanStep::rename("a.txt", "b.txt")]
		);
	}
}
