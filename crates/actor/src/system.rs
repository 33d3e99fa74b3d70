use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::process::{self, Parent, Pid, ProcessRef};
use crate::props::Props;
use crate::supervision::SupervisorStrategy;

/// Default bound of every mailbox unless [`Props::mailbox_capacity`] says otherwise.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// Refusal to create a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
	#[error("actor system is shut down")]
	SystemShutdown,
	#[error("parent process is stopping")]
	ParentStopping,
	#[error("mailbox capacity must be greater than zero")]
	InvalidMailboxCapacity,
}

/// System-wide defaults.
#[derive(Debug, Clone)]
pub struct SystemConfig {
	pub(crate) mailbox_capacity: usize,
	pub(crate) root_strategy: SupervisorStrategy,
}

impl SystemConfig {
	/// Sets the default mailbox capacity.
	#[must_use]
	pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
		self.mailbox_capacity = capacity;
		self
	}

	/// Sets the strategy applied to processes spawned directly on the system.
	#[must_use]
	pub fn root_strategy(mut self, strategy: SupervisorStrategy) -> Self {
		self.root_strategy = strategy;
		self
	}

	pub fn default_mailbox_capacity(&self) -> usize {
		self.mailbox_capacity
	}

	pub fn default_root_strategy(&self) -> &SupervisorStrategy {
		&self.root_strategy
	}
}

impl Default for SystemConfig {
	fn default() -> Self {
		Self {
			mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
			root_strategy: SupervisorStrategy::default(),
		}
	}
}

/// Anything that can create processes: the system itself for roots, a
/// process context for children.
pub trait Spawner: Send + Sync {
	/// Spawns a process. Returns once the process is registered; its
	/// `Started` signal is delivered asynchronously.
	fn spawn(&self, props: Props) -> Result<ProcessRef, SpawnError>;

	/// The system every process of this spawner belongs to.
	fn system(&self) -> &ActorSystem;
}

/// Root of a process tree.
///
/// Cheap to clone; every clone refers to the same set of processes.
#[derive(Clone)]
pub struct ActorSystem {
	inner: Arc<SystemInner>,
}

struct SystemInner {
	config: SystemConfig,
	next_pid: AtomicU64,
	roots: Mutex<Vec<ProcessRef>>,
	shut_down: AtomicBool,
}

impl ActorSystem {
	pub fn new() -> Self {
		Self::with_config(SystemConfig::default())
	}

	pub fn with_config(config: SystemConfig) -> Self {
		Self {
			inner: Arc::new(SystemInner {
				config,
				next_pid: AtomicU64::new(1),
				roots: Mutex::new(Vec::new()),
				shut_down: AtomicBool::new(false),
			}),
		}
	}

	pub fn config(&self) -> &SystemConfig {
		&self.inner.config
	}

	/// Live processes spawned directly on the system, in spawn order.
	pub fn roots(&self) -> Vec<ProcessRef> {
		self.inner.roots.lock().clone()
	}

	pub fn is_shut_down(&self) -> bool {
		self.inner.shut_down.load(Ordering::Acquire)
	}

	/// Stops every root process in reverse spawn order and waits for each
	/// tree to terminate. Later spawns are refused.
	pub async fn shutdown(&self) {
		self.inner.shut_down.store(true, Ordering::Release);
		let roots = self.roots();
		tracing::debug!(roots = roots.len(), "bosun.system.shutdown");
		for root in roots.iter().rev() {
			root.stop_and_wait().await;
		}
	}

	pub(crate) fn next_pid(&self) -> Pid {
		Pid::new(self.inner.next_pid.fetch_add(1, Ordering::Relaxed))
	}

	pub(crate) fn attach_root(&self, process: ProcessRef) {
		self.inner.roots.lock().push(process);
	}

	pub(crate) fn detach_root(&self, pid: Pid) {
		self.inner.roots.lock().retain(|root| root.pid() != pid);
	}
}

impl Default for ActorSystem {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for ActorSystem {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ActorSystem")
			.field("roots", &self.inner.roots.lock().len())
			.field("shut_down", &self.is_shut_down())
			.finish()
	}
}

impl Spawner for ActorSystem {
	fn spawn(&self, props: Props) -> Result<ProcessRef, SpawnError> {
		process::launch(self, Parent::Root, props)
	}

	fn system(&self) -> &ActorSystem {
		self
	}
}
