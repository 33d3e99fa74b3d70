//! Behavior identifiers and the value objects describing one start.

use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bosun_actor::{RestartType, SupervisorStrategy};

/// Readiness wait applied by [`SpawnSpec::new`].
pub const DEFAULT_SPAWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Name a behavior is registered and started under.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BehaviorId(Arc<str>);

impl BehaviorId {
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for BehaviorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for BehaviorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&*self.0, f)
	}
}

impl Borrow<str> for BehaviorId {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl From<&str> for BehaviorId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for BehaviorId {
	fn from(id: String) -> Self {
		Self::new(id)
	}
}

impl From<&BehaviorId> for BehaviorId {
	fn from(id: &BehaviorId) -> Self {
		id.clone()
	}
}

impl PartialEq<str> for BehaviorId {
	fn eq(&self, other: &str) -> bool {
		&*self.0 == other
	}
}

impl PartialEq<&str> for BehaviorId {
	fn eq(&self, other: &&str) -> bool {
		&*self.0 == *other
	}
}

/// Opaque initial arguments handed to `on_started` and `on_post_started`.
///
/// Shared by every incarnation of the process, so the payload must be `Sync`.
#[derive(Clone, Default)]
pub struct InitArgs(Option<Arc<dyn Any + Send + Sync>>);

impl InitArgs {
	pub fn new<T: Any + Send + Sync>(value: T) -> Self {
		Self(Some(Arc::new(value)))
	}

	pub fn none() -> Self {
		Self(None)
	}

	/// Borrows the payload as a `T`, if present and of that type.
	pub fn get<T: Any>(&self) -> Option<&T> {
		self.0.as_deref()?.downcast_ref::<T>()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_none()
	}
}

impl fmt::Debug for InitArgs {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.0 {
			Some(_) => f.write_str("InitArgs(..)"),
			None => f.write_str("InitArgs(none)"),
		}
	}
}

/// Idle timeout a started process arms on itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiveTimeout {
	/// Never time out, whatever the engine default says.
	Disabled,
	/// Use the engine's default receive timeout.
	#[default]
	Inherit,
	/// Time out after this long without a message.
	After(Duration),
}

impl ReceiveTimeout {
	/// Signed-millisecond form: negative disables, zero inherits, positive
	/// arms the timer.
	pub fn from_millis(millis: i64) -> Self {
		match millis {
			m if m < 0 => Self::Disabled,
			0 => Self::Inherit,
			m => Self::After(Duration::from_millis(m.unsigned_abs())),
		}
	}

	pub(crate) fn resolve(self, default: Option<Duration>) -> Option<Duration> {
		match self {
			Self::Disabled => None,
			Self::Inherit => default.filter(|d| !d.is_zero()),
			Self::After(d) => (!d.is_zero()).then_some(d),
		}
	}
}

/// Everything needed to start one behavior.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
	id: BehaviorId,
	args: InitArgs,
	receive_timeout: ReceiveTimeout,
	spawn_timeout: Option<Duration>,
	name: Option<String>,
	supervisor: Option<SupervisorStrategy>,
	restart: RestartType,
}

/// One entry of an application's supervision tree.
pub type ChildSpec = SpawnSpec;

impl SpawnSpec {
	pub fn new(id: impl Into<BehaviorId>) -> Self {
		Self {
			id: id.into(),
			args: InitArgs::none(),
			receive_timeout: ReceiveTimeout::Inherit,
			spawn_timeout: Some(DEFAULT_SPAWN_TIMEOUT),
			name: None,
			supervisor: None,
			restart: RestartType::Permanent,
		}
	}

	#[must_use]
	pub fn args(mut self, args: InitArgs) -> Self {
		self.args = args;
		self
	}

	/// Shorthand for `args(InitArgs::new(value))`.
	#[must_use]
	pub fn arg<T: Any + Send + Sync>(self, value: T) -> Self {
		self.args(InitArgs::new(value))
	}

	#[must_use]
	pub fn receive_timeout(mut self, timeout: ReceiveTimeout) -> Self {
		self.receive_timeout = timeout;
		self
	}

	/// Bounds the readiness wait. Zero means do not wait at all.
	#[must_use]
	pub fn spawn_timeout(mut self, timeout: Duration) -> Self {
		self.spawn_timeout = (!timeout.is_zero()).then_some(timeout);
		self
	}

	/// Returns as soon as the process is spawned, without a readiness wait.
	#[must_use]
	pub fn no_wait(mut self) -> Self {
		self.spawn_timeout = None;
		self
	}

	/// Process name for logs; defaults to the behavior id.
	#[must_use]
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Strategy the started process applies to its own children.
	#[must_use]
	pub fn supervisor(mut self, strategy: SupervisorStrategy) -> Self {
		self.supervisor = Some(strategy);
		self
	}

	#[must_use]
	pub fn restart(mut self, restart: RestartType) -> Self {
		self.restart = restart;
		self
	}

	pub fn id(&self) -> &BehaviorId {
		&self.id
	}

	pub fn init_args(&self) -> &InitArgs {
		&self.args
	}

	pub fn receive_timeout_setting(&self) -> ReceiveTimeout {
		self.receive_timeout
	}

	/// `None` when the start does not wait for readiness.
	pub fn spawn_timeout_setting(&self) -> Option<Duration> {
		self.spawn_timeout
	}

	pub fn process_name(&self) -> &str {
		self.name.as_deref().unwrap_or(self.id.as_str())
	}

	pub fn supervisor_strategy(&self) -> Option<&SupervisorStrategy> {
		self.supervisor.as_ref()
	}

	pub fn restart_type(&self) -> RestartType {
		self.restart
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn receive_timeout_sign_convention() {
		assert_eq!(ReceiveTimeout::from_millis(-1), ReceiveTimeout::Disabled);
		assert_eq!(ReceiveTimeout::from_millis(0), ReceiveTimeout::Inherit);
		assert_eq!(ReceiveTimeout::from_millis(250), ReceiveTimeout::After(Duration::from_millis(250)));
	}

	#[test]
	fn receive_timeout_resolution() {
		let default = Some(Duration::from_secs(3));
		assert_eq!(ReceiveTimeout::Disabled.resolve(default), None);
		assert_eq!(ReceiveTimeout::Inherit.resolve(default), default);
		assert_eq!(ReceiveTimeout::Inherit.resolve(None), None);
		assert_eq!(ReceiveTimeout::After(Duration::ZERO).resolve(default), None);
		assert_eq!(
			ReceiveTimeout::After(Duration::from_millis(100)).resolve(None),
			Some(Duration::from_millis(100))
		);
	}

	#[test]
	fn zero_spawn_timeout_means_no_wait() {
		let spec = SpawnSpec::new("worker");
		assert_eq!(spec.spawn_timeout_setting(), Some(DEFAULT_SPAWN_TIMEOUT));
		assert_eq!(spec.clone().spawn_timeout(Duration::ZERO).spawn_timeout_setting(), None);
		assert_eq!(spec.no_wait().spawn_timeout_setting(), None);
	}

	#[test]
	fn init_args_downcast() {
		let args = InitArgs::new(42u32);
		assert_eq!(args.get::<u32>(), Some(&42));
		assert_eq!(args.get::<String>(), None);
		assert!(InitArgs::none().get::<u32>().is_none());
	}

	#[test]
	fn process_name_defaults_to_id() {
		assert_eq!(SpawnSpec::new("chat").process_name(), "chat");
		assert_eq!(SpawnSpec::new("chat").name("chat-1").process_name(), "chat-1");
	}
}
