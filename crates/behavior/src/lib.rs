//! Generic behaviors over the `bosun-actor` runtime.
//!
//! Behaviors are registered by id ([`Registry`], or link-time through
//! [`register_server!`] and [`register_application!`]) and started by an
//! [`Engine`] as supervised processes. The engine waits for the behavior's
//! mandatory initialization before handing back a [`GeneralServer`] or
//! [`Application`] handle. Applications describe a supervision tree of child
//! behaviors and are brought up in dependency order by [`Engine::launch`].

#[macro_use]
mod macros;

mod application;
mod behavior;
mod bootstrap;
mod config;
mod delegate;
mod engine;
mod error;
mod forward;
mod readiness;
mod registry;
mod server;
mod spec;

pub use application::{Application, ChildHandle, SupervisorFlag};
pub use behavior::{ApplicationBehavior, BehaviorContext, Lifecycle, Reply, ServerBehavior, TimeoutReceiver};
pub use bootstrap::{Node, startup_order};
pub use config::{DEFAULT_REQUEST_TIMEOUT, EngineConfig, StartFailurePolicy};
pub use engine::Engine;
pub use error::{BootError, RegistryError, ServerError, StartError};
pub use forward::{Forward, RespondPolicy};
pub use registry::{
	ApplicationProducer, BehaviorReg, BehaviorStatic, DependencyReg, DependencyStatic, Producer, ProducerKind, RegistrationEntry, Registry, RegistryBuilder,
	ServerProducer, StaticProducer,
};
pub use server::GeneralServer;
pub use spec::{BehaviorId, ChildSpec, DEFAULT_SPAWN_TIMEOUT, InitArgs, ReceiveTimeout, SpawnSpec};

#[doc(hidden)]
pub mod __private {
	pub use inventory;
	pub use paste;
}
