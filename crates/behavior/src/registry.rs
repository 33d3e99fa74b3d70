//! Behavior registry: producers and startup dependencies by id.
//!
//! Populated once, either through [`RegistryBuilder`] or link-time
//! [`register_server!`](crate::register_server) /
//! [`register_application!`](crate::register_application) /
//! [`depend_on!`](crate::depend_on) submissions, then frozen. Lookups on a
//! built [`Registry`] take no locks.

use std::fmt;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;

use crate::behavior::{ApplicationBehavior, ServerBehavior};
use crate::delegate::Instance;
use crate::error::RegistryError;
use crate::spec::BehaviorId;

/// Category of a registered producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerKind {
	GeneralServer,
	Application,
}

impl fmt::Display for ProducerKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::GeneralServer => f.write_str("general server"),
			Self::Application => f.write_str("application"),
		}
	}
}

pub type ServerProducer = Arc<dyn Fn() -> Box<dyn ServerBehavior> + Send + Sync>;
pub type ApplicationProducer = Arc<dyn Fn() -> Box<dyn ApplicationBehavior> + Send + Sync>;

/// Zero-argument factory of fresh behavior instances, one per incarnation.
#[derive(Clone)]
pub enum Producer {
	Server(ServerProducer),
	Application(ApplicationProducer),
}

impl Producer {
	pub fn server<B, F>(producer: F) -> Self
	where
		B: ServerBehavior,
		F: Fn() -> B + Send + Sync + 'static,
	{
		Self::Server(Arc::new(move || Box::new(producer()) as Box<dyn ServerBehavior>))
	}

	pub fn application<B, F>(producer: F) -> Self
	where
		B: ApplicationBehavior,
		F: Fn() -> B + Send + Sync + 'static,
	{
		Self::Application(Arc::new(move || Box::new(producer()) as Box<dyn ApplicationBehavior>))
	}

	pub fn kind(&self) -> ProducerKind {
		match self {
			Self::Server(_) => ProducerKind::GeneralServer,
			Self::Application(_) => ProducerKind::Application,
		}
	}

	pub(crate) fn produce(&self) -> Instance {
		match self {
			Self::Server(producer) => Instance::Server(producer()),
			Self::Application(producer) => Instance::Application(producer()),
		}
	}
}

impl fmt::Debug for Producer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Producer({})", self.kind())
	}
}

/// One registered behavior.
#[derive(Debug, Clone)]
pub struct RegistrationEntry {
	id: BehaviorId,
	producer: Producer,
	dependencies: Vec<BehaviorId>,
	crate_name: Option<&'static str>,
}

impl RegistrationEntry {
	pub fn id(&self) -> &BehaviorId {
		&self.id
	}

	pub fn producer(&self) -> &Producer {
		&self.producer
	}

	pub fn kind(&self) -> ProducerKind {
		self.producer.kind()
	}

	/// Applications this one must start after, in declaration order.
	pub fn dependencies(&self) -> &[BehaviorId] {
		&self.dependencies
	}

	/// Crate that submitted the entry, for link-time registrations.
	pub fn crate_name(&self) -> Option<&'static str> {
		self.crate_name
	}
}

/// Frozen id → entry map. Cheap to clone; iteration follows registration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
	entries: Arc<IndexMap<BehaviorId, RegistrationEntry>>,
}

static GLOBAL: LazyLock<Result<Registry, RegistryError>> = LazyLock::new(|| Registry::builder().extend_inventory().build());

impl Registry {
	pub fn builder() -> RegistryBuilder {
		RegistryBuilder::default()
	}

	/// Registry of every link-time submission in the binary, ids sorted.
	///
	/// Built on first use; a duplicate submission makes every call fail.
	pub fn global() -> Result<&'static Registry, RegistryError> {
		GLOBAL.as_ref().map_err(Clone::clone)
	}

	pub fn get(&self, id: &str) -> Option<&RegistrationEntry> {
		self.entries.get(id)
	}

	pub fn lookup(&self, id: &str) -> Result<&RegistrationEntry, RegistryError> {
		self.get(id).ok_or_else(|| RegistryError::NotRegistered(BehaviorId::new(id)))
	}

	pub fn contains(&self, id: &str) -> bool {
		self.entries.contains_key(id)
	}

	pub fn kind(&self, id: &str) -> Option<ProducerKind> {
		self.get(id).map(RegistrationEntry::kind)
	}

	/// Declared dependencies of `id`; empty for unknown ids.
	pub fn dependencies(&self, id: &str) -> &[BehaviorId] {
		self.get(id).map_or(&[][..], RegistrationEntry::dependencies)
	}

	/// Position of `id` in registration order.
	pub(crate) fn position(&self, id: &str) -> Option<usize> {
		self.entries.get_index_of(id)
	}

	pub fn ids(&self) -> impl Iterator<Item = &BehaviorId> {
		self.entries.keys()
	}

	pub fn entries(&self) -> impl Iterator<Item = &RegistrationEntry> {
		self.entries.values()
	}

	/// Registered applications, in registration order.
	pub fn applications(&self) -> impl Iterator<Item = &RegistrationEntry> {
		self.entries().filter(|entry| entry.kind() == ProducerKind::Application)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Single-threaded population phase of a [`Registry`].
///
/// Registration errors are kept and reported by [`build`](Self::build) so
/// calls can be chained.
#[derive(Default)]
pub struct RegistryBuilder {
	entries: IndexMap<BehaviorId, RegistrationEntry>,
	dependencies: Vec<(BehaviorId, BehaviorId)>,
	error: Option<RegistryError>,
}

impl RegistryBuilder {
	#[must_use]
	pub fn server<B, F>(self, id: impl Into<BehaviorId>, producer: F) -> Self
	where
		B: ServerBehavior,
		F: Fn() -> B + Send + Sync + 'static,
	{
		self.register(id, Producer::server(producer))
	}

	#[must_use]
	pub fn application<B, F>(self, id: impl Into<BehaviorId>, producer: F) -> Self
	where
		B: ApplicationBehavior,
		F: Fn() -> B + Send + Sync + 'static,
	{
		self.register(id, Producer::application(producer))
	}

	/// Registers `producer` under `id`. A second registration of the same id
	/// is rejected.
	#[must_use]
	pub fn register(self, id: impl Into<BehaviorId>, producer: Producer) -> Self {
		self.insert(id.into(), producer, None)
	}

	/// Declares that application `id` starts after `dependency`. Neither needs
	/// to be registered yet.
	#[must_use]
	pub fn depend_on(mut self, id: impl Into<BehaviorId>, dependency: impl Into<BehaviorId>) -> Self {
		self.dependencies.push((id.into(), dependency.into()));
		self
	}

	/// Adds every link-time submission, ordered by id.
	#[must_use]
	pub fn extend_inventory(mut self) -> Self {
		let mut behaviors: Vec<&'static BehaviorStatic> = inventory::iter::<BehaviorReg>.into_iter().map(|reg| reg.0).collect();
		behaviors.sort_by_key(|def| def.id);
		for def in behaviors {
			self = self.insert(BehaviorId::new(def.id), def.producer.into(), Some(def.crate_name));
		}

		let mut edges: Vec<&'static DependencyStatic> = inventory::iter::<DependencyReg>.into_iter().map(|reg| reg.0).collect();
		edges.sort_by_key(|edge| (edge.id, edge.dependency));
		for edge in edges {
			self = self.depend_on(edge.id, edge.dependency);
		}
		self
	}

	fn insert(mut self, id: BehaviorId, producer: Producer, crate_name: Option<&'static str>) -> Self {
		if self.entries.contains_key(&id) {
			tracing::warn!(id = %id, "bosun.registry.duplicate");
			self.error.get_or_insert(RegistryError::AlreadyRegistered(id));
			return self;
		}
		let entry = RegistrationEntry {
			id: id.clone(),
			producer,
			dependencies: Vec::new(),
			crate_name,
		};
		self.entries.insert(id, entry);
		self
	}

	pub fn build(self) -> Result<Registry, RegistryError> {
		let Self {
			mut entries,
			dependencies,
			error,
		} = self;
		if let Some(err) = error {
			return Err(err);
		}
		for (id, dependency) in dependencies {
			let Some(entry) = entries.get_mut(&id) else {
				tracing::warn!(id = %id, dependency = %dependency, "bosun.registry.dependency_dangling");
				continue;
			};
			if !entry.dependencies.contains(&dependency) {
				entry.dependencies.push(dependency);
			}
		}
		Ok(Registry {
			entries: Arc::new(entries),
		})
	}
}

/// Link-time producer of a behavior.
#[derive(Clone, Copy)]
pub enum StaticProducer {
	Server(fn() -> Box<dyn ServerBehavior>),
	Application(fn() -> Box<dyn ApplicationBehavior>),
}

impl From<StaticProducer> for Producer {
	fn from(producer: StaticProducer) -> Self {
		match producer {
			StaticProducer::Server(produce) => Self::Server(Arc::new(produce)),
			StaticProducer::Application(produce) => Self::Application(Arc::new(produce)),
		}
	}
}

/// Behavior submitted by [`register_server!`](crate::register_server) or
/// [`register_application!`](crate::register_application).
pub struct BehaviorStatic {
	pub id: &'static str,
	pub crate_name: &'static str,
	pub producer: StaticProducer,
}

/// Wrapper for `inventory::collect!`.
pub struct BehaviorReg(pub &'static BehaviorStatic);

inventory::collect!(BehaviorReg);

/// Dependency edge submitted by [`depend_on!`](crate::depend_on).
pub struct DependencyStatic {
	pub id: &'static str,
	pub dependency: &'static str,
}

/// Wrapper for `inventory::collect!`.
pub struct DependencyReg(pub &'static DependencyStatic);

inventory::collect!(DependencyReg);

#[cfg(test)]
mod tests {
	use async_trait::async_trait;
	use bosun_actor::Message;

	use super::*;
	use crate::application::SupervisorFlag;
	use crate::behavior::{BehaviorContext, Lifecycle, Reply};
	use crate::spec::ChildSpec;

	struct Noop;

	impl Lifecycle for Noop {}

	#[async_trait]
	impl ServerBehavior for Noop {
		async fn on_message(&mut self, _ctx: &mut BehaviorContext<'_>, _message: Message) -> anyhow::Result<Reply> {
			Ok(Reply::NoReply)
		}
	}

	struct App;

	impl Lifecycle for App {}

	#[async_trait]
	impl ApplicationBehavior for App {
		async fn on_get_sup_flag(&mut self, _ctx: &mut BehaviorContext<'_>) -> (SupervisorFlag, Vec<ChildSpec>) {
			(SupervisorFlag::default(), Vec::new())
		}
	}

	#[test]
	fn lookup_by_id() {
		let registry = Registry::builder().server("echo", || Noop).application("chat", || App).build().unwrap();
		assert_eq!(registry.len(), 2);
		assert_eq!(registry.kind("echo"), Some(ProducerKind::GeneralServer));
		assert_eq!(registry.lookup("chat").unwrap().kind(), ProducerKind::Application);
		assert_eq!(
			registry.lookup("missing").unwrap_err(),
			RegistryError::NotRegistered(BehaviorId::new("missing"))
		);
	}

	#[test]
	fn duplicate_registration_is_rejected() {
		let err = Registry::builder().server("echo", || Noop).application("echo", || App).build().unwrap_err();
		assert_eq!(err, RegistryError::AlreadyRegistered(BehaviorId::new("echo")));
	}

	#[test]
	fn dependencies_resolve_after_registration() {
		let registry = Registry::builder()
			.depend_on("game", "chat")
			.depend_on("game", "chat")
			.depend_on("ghost", "chat")
			.application("game", || App)
			.application("chat", || App)
			.build()
			.unwrap();
		assert_eq!(registry.dependencies("game"), [BehaviorId::new("chat")]);
		assert!(registry.dependencies("chat").is_empty());
		assert!(!registry.contains("ghost"));
	}

	#[test]
	fn iteration_follows_registration_order() {
		let registry = Registry::builder()
			.application("b", || App)
			.server("worker", || Noop)
			.application("a", || App)
			.build()
			.unwrap();
		let ids: Vec<_> = registry.ids().map(BehaviorId::as_str).collect();
		assert_eq!(ids, ["b", "worker", "a"]);
		let apps: Vec<_> = registry.applications().map(|entry| entry.id().as_str()).collect();
		assert_eq!(apps, ["b", "a"]);
		assert_eq!(registry.position("a"), Some(2));
	}

	#[test]
	fn produced_instances_are_fresh() {
		let producer = Producer::server(|| Noop);
		assert_eq!(producer.kind(), ProducerKind::GeneralServer);
		assert!(matches!(producer.produce(), Instance::Server(_)));
		assert!(matches!(producer.produce(), Instance::Server(_)));
	}
}
