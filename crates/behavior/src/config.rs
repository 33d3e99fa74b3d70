use std::time::Duration;

use crate::spec::DEFAULT_SPAWN_TIMEOUT;

/// Timeout used by [`GeneralServer::request_future_default`](crate::GeneralServer::request_future_default)
/// and [`GeneralServer::call`](crate::GeneralServer::call).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// What happens to a process whose `on_started` fails.
///
/// Either way the starter gets [`StartError::InitFailed`](crate::StartError::InitFailed)
/// and the process it spawned is stopped. The policy matters for later
/// incarnations, whose start failures nobody waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartFailurePolicy {
	/// Report the failure to the runtime and let the parent's strategy decide.
	#[default]
	Supervise,
	/// Stop the process.
	Terminate,
}

/// Engine-wide defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
	pub(crate) spawn_timeout: Duration,
	pub(crate) request_timeout: Duration,
	pub(crate) default_receive_timeout: Option<Duration>,
	pub(crate) start_failure: StartFailurePolicy,
}

impl EngineConfig {
	/// Readiness wait for starts by id. Zero disables the wait.
	#[must_use]
	pub fn spawn_timeout(mut self, timeout: Duration) -> Self {
		self.spawn_timeout = timeout;
		self
	}

	#[must_use]
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	/// Receive timeout for specs that inherit it.
	#[must_use]
	pub fn default_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.default_receive_timeout = timeout;
		self
	}

	#[must_use]
	pub fn start_failure(mut self, policy: StartFailurePolicy) -> Self {
		self.start_failure = policy;
		self
	}

	pub fn spawn_timeout_setting(&self) -> Duration {
		self.spawn_timeout
	}

	pub fn request_timeout_setting(&self) -> Duration {
		self.request_timeout
	}

	pub fn default_receive_timeout_setting(&self) -> Option<Duration> {
		self.default_receive_timeout
	}

	pub fn start_failure_policy(&self) -> StartFailurePolicy {
		self.start_failure
	}
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			spawn_timeout: DEFAULT_SPAWN_TIMEOUT,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			default_receive_timeout: None,
			start_failure: StartFailurePolicy::Supervise,
		}
	}
}
