use std::{
	fmt,
	time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Offset from the origin of a [`RunClock`], with microsecond resolution.
///
/// Operations and records of one run are stamped by the same clock, so any two timestamps
/// are comparable and their difference is a latency.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
	pub const ZERO: Self = Self(0);

	#[must_use]
	pub const fn from_micros(micros: u64) -> Self {
		Self(micros)
	}

	#[must_use]
	pub const fn from_millis(millis: u64) -> Self {
		Self(millis.saturating_mul(1_000))
	}

	#[must_use]
	pub const fn as_micros(self) -> u64 {
		self.0
	}

	#[must_use]
	pub const fn as_offset(self) -> Duration {
		Duration::from_micros(self.0)
	}

	/// `None` when `earlier` is after `self`
	#[must_use]
	pub fn checked_duration_since(self, earlier: Self) -> Option<Duration> {
		self.0.checked_sub(earlier.0).map(Duration::from_micros)
	}

	#[must_use]
	pub fn saturating_add(self, duration: Duration) -> Self {
		let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
		Self(self.0.saturating_add(micros))
	}
}

impl fmt::Display for Timestamp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "+{:.6}s", self.as_offset().as_secs_f64())
	}
}

/// Monotonic clock shared by every component of a diagnostic run.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
	origin: Instant,
	wall_origin: DateTime<Utc>,
}

impl RunClock {
	#[must_use]
	pub fn start() -> Self {
		Self {
			origin: Instant::now(),
			wall_origin: Utc::now(),
		}
	}

	#[must_use]
	pub fn now(&self) -> Timestamp {
		self.stamp(Instant::now())
	}

	#[must_use]
	pub fn stamp(&self, instant: Instant) -> Timestamp {
		let micros = instant.saturating_duration_since(self.origin).as_micros();
		Timestamp(u64::try_from(micros).unwrap_or(u64::MAX))
	}

	#[must_use]
	pub const fn wall_origin(&self) -> DateTime<Utc> {
		self.wall_origin
	}

	/// Wall-clock rendering of a timestamp taken by this clock
	#[must_use]
	pub fn wall_time(&self, timestamp: Timestamp) -> DateTime<Utc> {
		chrono::Duration::from_std(timestamp.as_offset())
			.ok()
			.and_then(|offset| self.wall_origin.checked_add_signed(offset))
			.unwrap_or(self.wall_origin)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn timestamps_are_monotonic() {
		let clock = RunClock::start();
		let first = clock.now();
		std::thread::sleep(Duration::from_millis(2));
		let second = clock.now();

		assert!(second > first);
		assert!(second.checked_duration_since(first).is_some());
		assert!(first.checked_duration_since(second).is_none());
	}

	#[test]
	fn wall_time_follows_offset() {
		let clock = RunClock::start();
		let later = clock.wall_time(Timestamp::from_millis(1_500));

		assert_eq!(
			(later - clock.wall_origin()).num_milliseconds(),
			1_500,
			"wall time must be origin + offset"
		);
	}

	#[test]
	fn saturating_add_window() {
		let ts = Timestamp::from_millis(10);
		assert_eq!(
			ts.saturating_add(Duration::from_secs(5)),
			Timestamp::from_millis(5_010)
		);
		assert_eq!(
			Timestamp::from_micros(u64::MAX).saturating_add(Duration::from_secs(1)),
			Timestamp::from_micros(u64::MAX)
		);
	}
}
