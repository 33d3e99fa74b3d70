use std::fmt;
use std::sync::Arc;

use crate::signal::Process;
use crate::supervision::{RestartType, SupervisorStrategy};

pub(crate) type ProcessFactory = Arc<dyn Fn() -> Box<dyn Process> + Send + Sync>;

/// Construction descriptor handed to a [`Spawner`](crate::Spawner).
///
/// The producer runs once per incarnation: at spawn time and again on every
/// supervised restart.
pub struct Props {
	pub(crate) factory: ProcessFactory,
	pub(crate) name: Option<String>,
	pub(crate) child_strategy: Option<SupervisorStrategy>,
	pub(crate) restart: RestartType,
	pub(crate) mailbox_capacity: Option<usize>,
}

impl Props {
	/// Creates props from a typed producer.
	pub fn from_producer<P, F>(producer: F) -> Self
	where
		P: Process,
		F: Fn() -> P + Send + Sync + 'static,
	{
		Self::from_boxed(move || Box::new(producer()) as Box<dyn Process>)
	}

	/// Creates props from a producer of boxed processes.
	pub fn from_boxed(producer: impl Fn() -> Box<dyn Process> + Send + Sync + 'static) -> Self {
		Self {
			factory: Arc::new(producer),
			name: None,
			child_strategy: None,
			restart: RestartType::Permanent,
			mailbox_capacity: None,
		}
	}

	/// Names the process for logs and diagnostics.
	#[must_use]
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Sets the strategy this process applies to its own children.
	#[must_use]
	pub fn with_supervisor(mut self, strategy: SupervisorStrategy) -> Self {
		self.child_strategy = Some(strategy);
		self
	}

	/// Sets whether the process may be restarted after a failure.
	#[must_use]
	pub fn restart(mut self, restart: RestartType) -> Self {
		self.restart = restart;
		self
	}

	/// Overrides the system-wide mailbox capacity.
	#[must_use]
	pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
		self.mailbox_capacity = Some(capacity);
		self
	}
}

impl fmt::Debug for Props {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Props")
			.field("name", &self.name)
			.field("child_strategy", &self.child_strategy)
			.field("restart", &self.restart)
			.field("mailbox_capacity", &self.mailbox_capacity)
			.finish_non_exhaustive()
	}
}
