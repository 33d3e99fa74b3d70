//! Restart strategies applied by a parent to its failing children.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Which siblings restart when one child fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
	/// Only the failing child restarts.
	OneForOne,
	/// Every child of the same parent restarts.
	OneForAll,
}

/// Whether a process is ever restarted after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartType {
	/// Restarted according to the parent's strategy.
	#[default]
	Permanent,
	/// Never restarted; a failure stops it.
	Temporary,
}

/// Restart strategy a parent applies to its children.
///
/// Restart intensity is bounded: more than `max_restarts` failures of one
/// child within `within` stops that child for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStrategy {
	pub(crate) kind: StrategyKind,
	pub(crate) max_restarts: u32,
	pub(crate) within: Duration,
	pub(crate) backoff: Duration,
}

impl SupervisorStrategy {
	/// One-for-one strategy with the given intensity.
	pub fn one_for_one(max_restarts: u32, within: Duration) -> Self {
		Self {
			kind: StrategyKind::OneForOne,
			max_restarts,
			within,
			backoff: Duration::ZERO,
		}
	}

	/// One-for-all strategy with the given intensity.
	pub fn one_for_all(max_restarts: u32, within: Duration) -> Self {
		Self {
			kind: StrategyKind::OneForAll,
			max_restarts,
			within,
			backoff: Duration::ZERO,
		}
	}

	/// Strategy that never restarts.
	pub fn never() -> Self {
		Self::one_for_one(0, Duration::ZERO)
	}

	/// Sets the delay before a restarted child is recreated.
	#[must_use]
	pub fn backoff(mut self, backoff: Duration) -> Self {
		self.backoff = backoff;
		self
	}

	pub fn kind(&self) -> StrategyKind {
		self.kind
	}

	pub fn max_restarts(&self) -> u32 {
		self.max_restarts
	}

	pub fn within(&self) -> Duration {
		self.within
	}

	pub fn backoff_delay(&self) -> Duration {
		self.backoff
	}

	/// Records one failure and decides what to do with the child.
	///
	/// A zero `within` window counts every failure ever seen.
	pub(crate) fn decide(&self, stats: &mut RestartStats, now: Instant) -> Directive {
		stats.failures.push_back(now);
		if !self.within.is_zero() {
			while let Some(first) = stats.failures.front() {
				if now.saturating_duration_since(*first) > self.within {
					stats.failures.pop_front();
				} else {
					break;
				}
			}
		}
		if stats.failures.len() as u64 > u64::from(self.max_restarts) {
			Directive::Stop
		} else {
			Directive::Restart
		}
	}
}

impl Default for SupervisorStrategy {
	fn default() -> Self {
		Self::one_for_one(10, Duration::from_secs(10))
	}
}

/// Failure timestamps of one child.
#[derive(Debug, Default)]
pub(crate) struct RestartStats {
	failures: VecDeque<Instant>,
}

/// Supervisor verdict for a failed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Directive {
	Restart,
	Stop,
}
