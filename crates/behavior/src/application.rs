use std::fmt;
use std::time::Duration;

use bosun_actor::{Pid, ProcessRef, StrategyKind, SupervisorStrategy};

use crate::error::ServerError;
use crate::registry::ProducerKind;
use crate::server::GeneralServer;
use crate::spec::BehaviorId;

/// Restart strategy an application declares for its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorFlag {
	kind: StrategyKind,
	max_restarts: u32,
	within: Duration,
	backoff: Duration,
}

impl SupervisorFlag {
	pub fn one_for_one(max_restarts: u32, within: Duration) -> Self {
		Self {
			kind: StrategyKind::OneForOne,
			max_restarts,
			within,
			backoff: Duration::ZERO,
		}
	}

	pub fn one_for_all(max_restarts: u32, within: Duration) -> Self {
		Self {
			kind: StrategyKind::OneForAll,
			max_restarts,
			within,
			backoff: Duration::ZERO,
		}
	}

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
}

impl Default for SupervisorFlag {
	fn default() -> Self {
		Self::one_for_one(10, Duration::from_secs(10))
	}
}

impl From<SupervisorFlag> for SupervisorStrategy {
	fn from(flag: SupervisorFlag) -> Self {
		let strategy = match flag.kind {
			StrategyKind::OneForOne => SupervisorStrategy::one_for_one(flag.max_restarts, flag.within),
			StrategyKind::OneForAll => SupervisorStrategy::one_for_all(flag.max_restarts, flag.within),
		};
		strategy.backoff(flag.backoff)
	}
}

/// Handle to a started application.
///
/// Same surface as [`GeneralServer`] plus the children started from the
/// application's supervision tree.
#[derive(Clone)]
pub struct Application {
	server: GeneralServer,
}

impl Application {
	pub(crate) fn new(server: GeneralServer) -> Self {
		Self { server }
	}

	pub fn id(&self) -> &BehaviorId {
		self.server.id()
	}

	pub fn pid(&self) -> Option<Pid> {
		self.server.pid()
	}

	pub fn process(&self) -> Option<ProcessRef> {
		self.server.process()
	}

	pub fn is_running(&self) -> bool {
		self.server.is_running()
	}

	pub fn server(&self) -> &GeneralServer {
		&self.server
	}

	/// Children of the current incarnation, in start order.
	pub fn children(&self) -> Vec<ChildHandle> {
		self.server.children()
	}

	/// First child started from the given behavior id.
	pub fn child(&self, id: &str) -> Option<ChildHandle> {
		self.children().into_iter().find(|child| child.id() == id)
	}

	pub fn stop(&self) -> Result<(), ServerError> {
		self.server.stop()
	}

	pub async fn stop_and_wait(&self) -> Result<(), ServerError> {
		self.server.stop_and_wait().await
	}

	pub async fn poison_and_wait(&self) -> Result<(), ServerError> {
		self.server.poison_and_wait().await
	}
}

impl fmt::Debug for Application {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Application")
			.field("id", self.id())
			.field("pid", &self.pid())
			.field("children", &self.children().len())
			.finish()
	}
}

/// A started child of an application.
#[derive(Debug, Clone)]
pub enum ChildHandle {
	Server(GeneralServer),
	Application(Application),
}

impl ChildHandle {
	pub(crate) fn from_started(kind: ProducerKind, server: GeneralServer) -> Self {
		match kind {
			ProducerKind::GeneralServer => Self::Server(server),
			ProducerKind::Application => Self::Application(Application::new(server)),
		}
	}

	pub fn id(&self) -> &BehaviorId {
		self.server().id()
	}

	pub fn server(&self) -> &GeneralServer {
		match self {
			Self::Server(server) => server,
			Self::Application(app) => app.server(),
		}
	}

	pub fn as_application(&self) -> Option<&Application> {
		match self {
			Self::Application(app) => Some(app),
			Self::Server(_) => None,
		}
	}
}
