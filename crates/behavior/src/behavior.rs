//! Callback contracts implemented by user behaviors.

use std::time::Duration;

use async_trait::async_trait;
use bosun_actor::{Context, Message, ProcessRef, SendError, Sender};

use crate::application::{ChildHandle, SupervisorFlag};
use crate::engine::Engine;
use crate::error::StartError;
use crate::forward::Forward;
use crate::server::GeneralServer;
use crate::spec::{BehaviorId, ChildSpec, InitArgs, SpawnSpec};

/// Lifecycle callbacks shared by servers and applications.
///
/// Only [`on_started`](Lifecycle::on_started) gates readiness: the starter
/// is released once it returns.
#[async_trait]
pub trait Lifecycle: Send + 'static {
	/// Mandatory initialization. An error fails the start.
	async fn on_started(&mut self, _ctx: &mut BehaviorContext<'_>, _args: &InitArgs) -> anyhow::Result<()> {
		Ok(())
	}

	/// Longer setup after readiness; failures are logged, not reported.
	async fn on_post_started(&mut self, _ctx: &mut BehaviorContext<'_>, _args: &InitArgs) -> anyhow::Result<()> {
		Ok(())
	}

	async fn on_restarting(&mut self, _ctx: &mut BehaviorContext<'_>) {}

	async fn on_stopping(&mut self, _ctx: &mut BehaviorContext<'_>) {}

	async fn on_stopped(&mut self, _ctx: &mut BehaviorContext<'_>) {}
}

/// Answer of a message handler.
#[derive(Debug)]
pub enum Reply {
	/// Nothing is sent back.
	NoReply,
	/// Sent to the original sender, if it is known.
	Respond(Message),
	/// Redirected through the forwarding protocol.
	Forward(Forward),
}

impl Reply {
	pub fn respond<T: Send + 'static>(value: T) -> Self {
		Self::Respond(Message::new(value))
	}
}

impl From<Forward> for Reply {
	fn from(forward: Forward) -> Self {
		Self::Forward(forward)
	}
}

/// Message-handling behavior run inside a [`GeneralServer`].
#[async_trait]
pub trait ServerBehavior: Lifecycle {
	async fn on_message(&mut self, ctx: &mut BehaviorContext<'_>, message: Message) -> anyhow::Result<Reply>;

	/// Timeout capability. Behaviors started with a receive timeout must
	/// return `Some`; the check runs once, when the process starts.
	fn timeout_receiver(&mut self) -> Option<&mut dyn TimeoutReceiver> {
		None
	}
}

/// Optional capability invoked when a server sat idle for its receive timeout.
#[async_trait]
pub trait TimeoutReceiver: Send {
	async fn on_timeout(&mut self, ctx: &mut BehaviorContext<'_>) -> anyhow::Result<()>;
}

/// Top-level behavior owning a supervision tree.
#[async_trait]
pub trait ApplicationBehavior: Lifecycle {
	/// Restart strategy and ordered children, read once per start after
	/// `on_post_started`.
	async fn on_get_sup_flag(&mut self, ctx: &mut BehaviorContext<'_>) -> (SupervisorFlag, Vec<ChildSpec>);
}

/// What a behavior callback sees of its process.
pub struct BehaviorContext<'a> {
	process: &'a mut Context,
	engine: &'a Engine,
	id: &'a BehaviorId,
}

impl<'a> BehaviorContext<'a> {
	pub(crate) fn new(process: &'a mut Context, engine: &'a Engine, id: &'a BehaviorId) -> Self {
		Self { process, engine, id }
	}

	pub fn id(&self) -> &BehaviorId {
		self.id
	}

	pub fn engine(&self) -> &Engine {
		self.engine
	}

	pub fn process(&self) -> &Context {
		self.process
	}

	pub fn process_mut(&mut self) -> &mut Context {
		self.process
	}

	pub fn self_ref(&self) -> &ProcessRef {
		self.process.self_ref()
	}

	/// Reply target of the message being handled.
	pub fn sender(&self) -> Option<&Sender> {
		self.process.sender()
	}

	pub fn incarnation(&self) -> u64 {
		self.process.incarnation()
	}

	/// Answers the current sender right away, ahead of the handler's [`Reply`].
	pub async fn respond<M: Send + 'static>(&self, message: M) -> Result<(), SendError> {
		self.process.respond(message).await
	}

	pub async fn send<M: Send + 'static>(&self, target: &ProcessRef, message: M) -> Result<(), SendError> {
		self.process.send(target, message).await
	}

	/// Sends with this process as the reply target.
	pub async fn request<M: Send + 'static>(&self, target: &ProcessRef, message: M) -> Result<(), SendError> {
		self.process.request(target, message).await
	}

	/// Starts a registered general server as a child of this process.
	pub async fn start(&self, id: impl Into<BehaviorId>) -> Result<GeneralServer, StartError> {
		let spec = self.engine.spec(id);
		self.engine.start_spec(&*self.process, spec).await
	}

	/// Starts any registered behavior as a child of this process.
	pub async fn start_child(&self, spec: SpawnSpec) -> Result<ChildHandle, StartError> {
		self.engine.start_child(&*self.process, spec).await
	}

	pub fn set_receive_timeout(&mut self, timeout: Duration) {
		self.process.set_receive_timeout(timeout);
	}

	pub fn cancel_receive_timeout(&mut self) {
		self.process.cancel_receive_timeout();
	}

	pub fn stop_self(&self) {
		self.process.stop_self();
	}

	pub fn poison_self(&self) {
		self.process.poison_self();
	}
}
