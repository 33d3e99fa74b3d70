//! Dependency-ordered startup of applications.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use bosun_actor::{ActorSystem, RestartType};

use crate::application::Application;
use crate::engine::Engine;
use crate::error::{BootError, ServerError};
use crate::registry::{ProducerKind, Registry};
use crate::spec::{BehaviorId, DEFAULT_SPAWN_TIMEOUT};

/// Orders `roots` and their transitive dependencies so that every
/// application comes after the applications it depends on.
///
/// Ties are broken by registration order. Nothing is started here, so a
/// failure leaves no process behind.
pub fn startup_order(registry: &Registry, roots: &[BehaviorId]) -> Result<Vec<BehaviorId>, BootError> {
	let mut pending: Vec<BehaviorId> = Vec::with_capacity(roots.len());
	for root in roots {
		match registry.kind(root.as_str()) {
			None => return Err(BootError::NotRegistered(root.clone())),
			Some(ProducerKind::GeneralServer) => return Err(BootError::NotAnApplication(root.clone())),
			Some(ProducerKind::Application) => pending.push(root.clone()),
		}
	}

	let mut nodes: HashSet<BehaviorId> = HashSet::new();
	while let Some(id) = pending.pop() {
		if !nodes.insert(id.clone()) {
			continue;
		}
		for dependency in registry.dependencies(id.as_str()) {
			match registry.kind(dependency.as_str()) {
				None => {
					return Err(BootError::UnknownDependency {
						app: id.clone(),
						dependency: dependency.clone(),
					});
				}
				Some(ProducerKind::GeneralServer) => return Err(BootError::NotAnApplication(dependency.clone())),
				Some(ProducerKind::Application) => pending.push(dependency.clone()),
			}
		}
	}

	// Kahn's algorithm over registration positions.
	let position = |id: &BehaviorId| registry.position(id.as_str()).unwrap_or(usize::MAX);
	let mut by_position: HashMap<usize, BehaviorId> = HashMap::with_capacity(nodes.len());
	let mut waiting_on: HashMap<usize, usize> = HashMap::with_capacity(nodes.len());
	let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
	for id in &nodes {
		let at = position(id);
		by_position.insert(at, id.clone());
		let dependencies = registry.dependencies(id.as_str());
		waiting_on.insert(at, dependencies.len());
		for dependency in dependencies {
			dependents.entry(position(dependency)).or_default().push(at);
		}
	}

	let mut ready: BTreeSet<usize> = waiting_on.iter().filter(|(_, count)| **count == 0).map(|(at, _)| *at).collect();
	let mut order = Vec::with_capacity(nodes.len());
	while let Some(at) = ready.pop_first() {
		if let Some(id) = by_position.remove(&at) {
			order.push(id);
		}
		for dependent in dependents.remove(&at).unwrap_or_default() {
			if let Some(count) = waiting_on.get_mut(&dependent) {
				*count -= 1;
				if *count == 0 {
					ready.insert(dependent);
				}
			}
		}
	}

	if order.len() < nodes.len() {
		let mut cycle: Vec<(usize, BehaviorId)> = by_position.into_iter().collect();
		cycle.sort_by_key(|(at, _)| *at);
		return Err(BootError::DependencyCycle(cycle.into_iter().map(|(_, id)| id).collect()));
	}
	Ok(order)
}

/// Applications brought up by one [`Engine::launch`], in start order.
pub struct Node {
	system: ActorSystem,
	applications: Vec<Application>,
}

impl Node {
	pub fn system(&self) -> &ActorSystem {
		&self.system
	}

	pub fn applications(&self) -> &[Application] {
		&self.applications
	}

	pub fn application(&self, id: &str) -> Option<&Application> {
		self.applications.iter().find(|app| app.id() == id)
	}

	/// Stops every application in reverse start order.
	pub async fn shutdown(self) {
		tracing::info!(applications = self.applications.len(), "bosun.boot.shutdown");
		stop_in_reverse(&self.applications).await;
	}
}

impl fmt::Debug for Node {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.applications.iter().map(Application::id)).finish()
	}
}

async fn stop_in_reverse(applications: &[Application]) {
	for app in applications.iter().rev() {
		match app.stop_and_wait().await {
			Ok(()) | Err(ServerError::NotRunning(_)) => {}
			Err(err) => tracing::warn!(app = %app.id(), error = %err, "bosun.boot.stop_failed"),
		}
	}
}

impl Engine {
	/// [`startup_order`] over this engine's registry.
	pub fn startup_order(&self, roots: &[BehaviorId]) -> Result<Vec<BehaviorId>, BootError> {
		startup_order(self.registry(), roots)
	}

	/// Starts `roots` and everything they depend on as top-level processes.
	///
	/// Each application is fully ready before the next one starts. If one
	/// fails or misses its deadline, it is stopped along with the ones
	/// already started.
	pub async fn launch(&self, system: &ActorSystem, roots: &[BehaviorId]) -> Result<Node, BootError> {
		let order = self.startup_order(roots)?;
		tracing::info!(order = ?order, "bosun.boot.order");

		let mut timeout = self.config().spawn_timeout_setting();
		if timeout.is_zero() {
			timeout = DEFAULT_SPAWN_TIMEOUT;
		}

		let mut applications = Vec::with_capacity(order.len());
		for id in order {
			let spec = self.spec(id.clone()).spawn_timeout(timeout).restart(RestartType::Temporary);
			match self.boot_application(system, spec).await {
				Ok(app) => applications.push(app),
				Err(source) => {
					tracing::error!(app = %id, error = %source, started = applications.len(), "bosun.boot.failed");
					stop_in_reverse(&applications).await;
					return Err(BootError::Start { id, source });
				}
			}
		}
		Ok(Node {
			system: system.clone(),
			applications,
		})
	}

	/// Starts every registered application.
	pub async fn launch_all(&self, system: &ActorSystem) -> Result<Node, BootError> {
		let roots: Vec<BehaviorId> = self.registry().applications().map(|entry| entry.id().clone()).collect();
		self.launch(system, &roots).await
	}
}

#[cfg(test)]
mod tests {
	use async_trait::async_trait;
	use bosun_actor::Message;
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::application::SupervisorFlag;
	use crate::behavior::{ApplicationBehavior, BehaviorContext, Lifecycle, Reply, ServerBehavior};
	use crate::spec::ChildSpec;

	#[derive(Default)]
	struct App;

	#[async_trait]
	impl Lifecycle for App {}

	#[async_trait]
	impl ApplicationBehavior for App {
		async fn on_get_sup_flag(&mut self, _ctx: &mut BehaviorContext<'_>) -> (SupervisorFlag, Vec<ChildSpec>) {
			(SupervisorFlag::default(), Vec::new())
		}
	}

	#[derive(Default)]
	struct Srv;

	#[async_trait]
	impl Lifecycle for Srv {}

	#[async_trait]
	impl ServerBehavior for Srv {
		async fn on_message(&mut self, _ctx: &mut BehaviorContext<'_>, _message: Message) -> anyhow::Result<Reply> {
			Ok(Reply::NoReply)
		}
	}

	fn ids(names: &[&str]) -> Vec<BehaviorId> {
		names.iter().copied().map(BehaviorId::new).collect()
	}

	#[test]
	fn dependencies_start_first() {
		let registry = Registry::builder()
			.application("web", App::default)
			.application("db", App::default)
			.application("cache", App::default)
			.depend_on("web", "cache")
			.depend_on("cache", "db")
			.build()
			.unwrap();
		assert_eq!(startup_order(&registry, &ids(&["web"])).unwrap(), ids(&["db", "cache", "web"]));
	}

	#[test]
	fn registration_order_breaks_ties() {
		let registry = Registry::builder()
			.application("c", App::default)
			.application("a", App::default)
			.application("b", App::default)
			.depend_on("b", "c")
			.build()
			.unwrap();
		assert_eq!(startup_order(&registry, &ids(&["b", "a"])).unwrap(), ids(&["c", "a", "b"]));
	}

	#[test]
	fn only_reachable_applications_are_ordered() {
		let registry = Registry::builder()
			.application("a", App::default)
			.application("b", App::default)
			.application("unrelated", App::default)
			.depend_on("a", "b")
			.build()
			.unwrap();
		assert_eq!(startup_order(&registry, &ids(&["a"])).unwrap(), ids(&["b", "a"]));
	}

	#[test]
	fn cycle_is_rejected() {
		let registry = Registry::builder()
			.application("root", App::default)
			.application("a", App::default)
			.application("b", App::default)
			.depend_on("root", "a")
			.depend_on("a", "b")
			.depend_on("b", "a")
			.build()
			.unwrap();
		match startup_order(&registry, &ids(&["root"])) {
			Err(BootError::DependencyCycle(cycle)) => assert_eq!(cycle, ids(&["root", "a", "b"])),
			other => panic!("expected a cycle, got {other:?}"),
		}
	}

	#[test]
	fn unknown_dependency_is_rejected() {
		let registry = Registry::builder()
			.application("a", App::default)
			.depend_on("a", "ghost")
			.build()
			.unwrap();
		match startup_order(&registry, &ids(&["a"])) {
			Err(BootError::UnknownDependency { app, dependency }) => {
				assert_eq!(app, "a");
				assert_eq!(dependency, "ghost");
			}
			other => panic!("expected an unknown dependency, got {other:?}"),
		}
	}

	#[test]
	fn servers_do_not_take_part() {
		let registry = Registry::builder()
			.application("a", App::default)
			.server("srv", Srv::default)
			.depend_on("a", "srv")
			.build()
			.unwrap();
		assert!(matches!(
			startup_order(&registry, &ids(&["srv"])),
			Err(BootError::NotAnApplication(id)) if id == "srv"
		));
		assert!(matches!(
			startup_order(&registry, &ids(&["a"])),
			Err(BootError::NotAnApplication(id)) if id == "srv"
		));
		assert!(matches!(
			startup_order(&registry, &ids(&["nope"])),
			Err(BootError::NotRegistered(id)) if id == "nope"
		));
	}
}
