//! Starting behaviors as supervised processes.

use std::fmt;
use std::sync::Arc;

use bosun_actor::{ProcessRef, Spawner};

use crate::application::{Application, ChildHandle};
use crate::config::EngineConfig;
use crate::delegate::{self, Seed};
use crate::error::{RegistryError, StartError};
use crate::readiness::readiness;
use crate::registry::{ProducerKind, Registry};
use crate::server::GeneralServer;
use crate::spec::{BehaviorId, SpawnSpec};

struct EngineInner {
	registry: Registry,
	config: EngineConfig,
}

/// Starts registered behaviors under a [`Spawner`] and hands back their
/// handles once they are ready.
///
/// Cheap to clone; every started delegate keeps a clone so applications can
/// start their children through the same registry.
#[derive(Clone)]
pub struct Engine {
	inner: Arc<EngineInner>,
}

impl Engine {
	pub fn new(registry: Registry) -> Self {
		Self::with_config(registry, EngineConfig::default())
	}

	pub fn with_config(registry: Registry, config: EngineConfig) -> Self {
		Self {
			inner: Arc::new(EngineInner { registry, config }),
		}
	}

	/// Engine over [`Registry::global`] with the default configuration.
	pub fn global() -> Result<Self, RegistryError> {
		Registry::global().map(|registry| Self::new(registry.clone()))
	}

	pub fn registry(&self) -> &Registry {
		&self.inner.registry
	}

	pub fn config(&self) -> &EngineConfig {
		&self.inner.config
	}

	/// Spec for `id` carrying the configured spawn timeout.
	pub fn spec(&self, id: impl Into<BehaviorId>) -> SpawnSpec {
		SpawnSpec::new(id).spawn_timeout(self.inner.config.spawn_timeout)
	}

	/// Starts the general server registered as `id`.
	pub async fn start(&self, parent: &dyn Spawner, id: impl Into<BehaviorId>) -> Result<GeneralServer, StartError> {
		self.start_spec(parent, self.spec(id)).await
	}

	pub async fn start_spec(&self, parent: &dyn Spawner, spec: SpawnSpec) -> Result<GeneralServer, StartError> {
		self.spawn(parent, spec, Some(ProducerKind::GeneralServer), Late::KeepRunning).await
	}

	pub async fn start_application(&self, parent: &dyn Spawner, id: impl Into<BehaviorId>) -> Result<Application, StartError> {
		self.start_application_spec(parent, self.spec(id)).await
	}

	pub async fn start_application_spec(&self, parent: &dyn Spawner, spec: SpawnSpec) -> Result<Application, StartError> {
		let server = self.spawn(parent, spec, Some(ProducerKind::Application), Late::KeepRunning).await?;
		Ok(Application::new(server))
	}

	/// Like [`start_application_spec`](Self::start_application_spec), but an
	/// application that misses its readiness deadline is stopped as well.
	pub(crate) async fn boot_application(&self, parent: &dyn Spawner, spec: SpawnSpec) -> Result<Application, StartError> {
		let server = self.spawn(parent, spec, Some(ProducerKind::Application), Late::Stop).await?;
		Ok(Application::new(server))
	}

	/// Starts a supervision-tree entry of either kind.
	pub async fn start_child(&self, parent: &dyn Spawner, spec: SpawnSpec) -> Result<ChildHandle, StartError> {
		let server = self.spawn(parent, spec, None, Late::KeepRunning).await?;
		Ok(ChildHandle::from_started(server.kind(), server))
	}

	async fn spawn(&self, parent: &dyn Spawner, spec: SpawnSpec, expected: Option<ProducerKind>, late: Late) -> Result<GeneralServer, StartError> {
		let id = spec.id().clone();
		let entry = self
			.inner
			.registry
			.get(id.as_str())
			.ok_or_else(|| StartError::NotRegistered(id.clone()))?;
		let kind = entry.kind();
		if let Some(expected) = expected
			&& expected != kind
		{
			return Err(StartError::WrongProducerKind { id, expected, actual: kind });
		}

		// Applications have no timeout callback, so only servers inherit the default.
		let inherited = match kind {
			ProducerKind::GeneralServer => self.inner.config.default_receive_timeout,
			ProducerKind::Application => None,
		};
		let receive_timeout = spec.receive_timeout_setting().resolve(inherited);
		let server = GeneralServer::new(id.clone(), kind, spec.init_args().clone(), receive_timeout, self.inner.config.request_timeout);

		let (signal, waiter) = match spec.spawn_timeout_setting() {
			Some(timeout) => {
				let (signal, waiter) = readiness(timeout);
				(Some(signal), Some(waiter))
			}
			None => (None, None),
		};

		let seed = Seed {
			engine: self.clone(),
			id: id.clone(),
			producer: entry.producer().clone(),
			owner: Arc::downgrade(&server.shared),
			init_args: spec.init_args().clone(),
			receive_timeout,
			readiness: signal,
			start_failure: self.inner.config.start_failure,
		};
		let process = parent.spawn(delegate::props(seed, &spec))?;
		tracing::debug!(id = %id, pid = %process.pid(), kind = %kind, wait = ?spec.spawn_timeout_setting(), "bosun.server.start");

		if let Some(waiter) = waiter
			&& let Err(err) = waiter.wait(&id).await
		{
			abandon(&process, &err, late).await;
			return Err(err);
		}

		if process.is_alive() {
			server.set_process(process);
		}
		Ok(server)
	}
}

/// Fate of a process that missed its readiness deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Late {
	KeepRunning,
	Stop,
}

/// A start that reported failure never hands out its process. A process that
/// merely missed the readiness deadline keeps running unless `late` says
/// otherwise, in which case it is gone before this returns.
async fn abandon(process: &ProcessRef, err: &StartError, late: Late) {
	if !matches!(err, StartError::ReadinessTimeout { .. }) {
		process.stop();
		return;
	}
	tracing::warn!(pid = %process.pid(), error = %err, stop = late == Late::Stop, "bosun.server.ready_timeout");
	if late == Late::Stop {
		process.stop_and_wait().await;
	}
}

impl fmt::Debug for Engine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Engine")
			.field("behaviors", &self.inner.registry.len())
			.field("config", &self.inner.config)
			.finish()
	}
}

impl GeneralServer {
	/// Shorthand for [`Engine::start`].
	pub async fn start(engine: &Engine, parent: &dyn Spawner, id: impl Into<BehaviorId>) -> Result<Self, StartError> {
		engine.start(parent, id).await
	}

	/// Shorthand for [`Engine::start_spec`].
	pub async fn start_spec(engine: &Engine, parent: &dyn Spawner, spec: SpawnSpec) -> Result<Self, StartError> {
		engine.start_spec(parent, spec).await
	}
}

impl Application {
	/// Shorthand for [`Engine::start_application`].
	pub async fn start(engine: &Engine, parent: &dyn Spawner, id: impl Into<BehaviorId>) -> Result<Self, StartError> {
		engine.start_application(parent, id).await
	}
}
