use std::time::Duration;

use bosun_actor::{RequestError, SendError, SpawnError};

use crate::registry::ProducerKind;
use crate::spec::BehaviorId;

/// Registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
	#[error("behavior {0} is already registered")]
	AlreadyRegistered(BehaviorId),
	#[error("behavior {0} is not registered")]
	NotRegistered(BehaviorId),
}

/// Failure to start a behavior.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StartError {
	#[error("behavior {0} is not registered")]
	NotRegistered(BehaviorId),
	#[error("behavior {id} is a {actual}, not a {expected}")]
	WrongProducerKind {
		id: BehaviorId,
		expected: ProducerKind,
		actual: ProducerKind,
	},
	#[error("spawn failed: {0}")]
	Spawn(#[from] SpawnError),
	#[error("behavior {id} was not ready within {timeout:?}")]
	ReadinessTimeout { id: BehaviorId, timeout: Duration },
	#[error("behavior {id} failed to start: {reason}")]
	InitFailed { id: BehaviorId, reason: String },
	#[error("behavior {id} arms a receive timeout but does not implement {capability}")]
	MissingCapability { id: BehaviorId, capability: &'static str },
	#[error("behavior {id} stopped before it became ready")]
	Aborted { id: BehaviorId },
	#[error("child {child} of {parent} failed to start")]
	Child {
		parent: BehaviorId,
		child: BehaviorId,
		#[source]
		source: Box<StartError>,
	},
}

impl StartError {
	/// Behavior the error is about, when it names one.
	pub fn behavior(&self) -> Option<&BehaviorId> {
		match self {
			Self::NotRegistered(id)
			| Self::WrongProducerKind { id, .. }
			| Self::ReadinessTimeout { id, .. }
			| Self::InitFailed { id, .. }
			| Self::MissingCapability { id, .. }
			| Self::Aborted { id } => Some(id),
			Self::Child { parent, .. } => Some(parent),
			Self::Spawn(_) => None,
		}
	}
}

/// Failure of an operation on a started handle.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("behavior {0} is not running")]
	NotRunning(BehaviorId),
	#[error(transparent)]
	Send(#[from] SendError),
	#[error(transparent)]
	Request(#[from] RequestError),
}

/// Failure to bring up a set of applications.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BootError {
	#[error("application {0} is not registered")]
	NotRegistered(BehaviorId),
	#[error("behavior {0} is not an application")]
	NotAnApplication(BehaviorId),
	#[error("application {app} depends on unregistered {dependency}")]
	UnknownDependency { app: BehaviorId, dependency: BehaviorId },
	#[error("dependency cycle among applications: {}", join_ids(.0))]
	DependencyCycle(Vec<BehaviorId>),
	#[error("application {id} failed to start")]
	Start {
		id: BehaviorId,
		#[source]
		source: StartError,
	},
}

fn join_ids(ids: &[BehaviorId]) -> String {
	ids.iter().map(BehaviorId::as_str).collect::<Vec<_>>().join(", ")
}
