use std::sync::Arc;
use std::time::Duration;

use crate::mailbox::SendError;
use crate::message::{Message, Sender};
use crate::process::{self, Parent, Pid, ProcessRef};
use crate::props::Props;
use crate::supervision::SupervisorStrategy;
use crate::system::{ActorSystem, SpawnError, Spawner};

/// Per-incarnation view a process gets of itself and the runtime.
///
/// A fresh context is built for every incarnation, so a receive timeout set
/// before a restart does not survive it.
pub struct Context {
	system: ActorSystem,
	me: ProcessRef,
	incarnation: u64,
	sender: Option<Sender>,
	receive_timeout: Option<Duration>,
	timeout_fired: bool,
}

impl Context {
	pub(crate) fn new(system: ActorSystem, me: ProcessRef, incarnation: u64) -> Self {
		Self {
			system,
			me,
			incarnation,
			sender: None,
			receive_timeout: None,
			timeout_fired: false,
		}
	}

	pub fn self_ref(&self) -> &ProcessRef {
		&self.me
	}

	pub fn pid(&self) -> Pid {
		self.me.pid()
	}

	/// Parent process, or `None` for roots and orphans.
	pub fn parent(&self) -> Option<ProcessRef> {
		self.me.parent()
	}

	/// 1 for the first instance, incremented on every restart.
	pub fn incarnation(&self) -> u64 {
		self.incarnation
	}

	/// Reply target of the message being handled, if it carried one.
	pub fn sender(&self) -> Option<&Sender> {
		self.sender.as_ref()
	}

	pub(crate) fn set_sender(&mut self, sender: Option<Sender>) {
		self.sender = sender;
	}

	/// Answers the sender of the current message.
	///
	/// Messages without a reply target are answered into the void.
	pub async fn respond<M: Send + 'static>(&self, message: M) -> Result<(), SendError> {
		match &self.sender {
			Some(sender) => sender.tell(Message::new(message)).await,
			None => {
				tracing::trace!(pid = %self.pid(), "bosun.process.respond_without_sender");
				Ok(())
			}
		}
	}

	/// Fire-and-forget send with no reply target.
	pub async fn send<M: Send + 'static>(&self, target: &ProcessRef, message: M) -> Result<(), SendError> {
		target.send(message).await
	}

	/// Sends with this process as the reply target.
	pub async fn request<M: Send + 'static>(&self, target: &ProcessRef, message: M) -> Result<(), SendError> {
		target.request(message, self.me.clone()).await
	}

	/// Sends with an explicit reply target, which may be absent.
	pub async fn request_with_sender<M: Send + 'static>(&self, target: &ProcessRef, message: M, sender: Option<Sender>) -> Result<(), SendError> {
		target.deliver(Message::new(message), sender).await
	}

	/// Arms the idle timer. A zero duration disarms it.
	///
	/// The timer fires once per idle period: after a `ReceiveTimeout` it stays
	/// quiet until the next message arrives or it is set again.
	pub fn set_receive_timeout(&mut self, timeout: Duration) {
		self.receive_timeout = (!timeout.is_zero()).then_some(timeout);
		self.timeout_fired = false;
	}

	pub fn cancel_receive_timeout(&mut self) {
		self.receive_timeout = None;
	}

	pub fn receive_timeout(&self) -> Option<Duration> {
		self.receive_timeout
	}

	/// Idle timeout for the next wait, `None` once fired for this idle period.
	pub(crate) fn armed_receive_timeout(&self) -> Option<Duration> {
		if self.timeout_fired { None } else { self.receive_timeout }
	}

	pub(crate) fn set_timeout_fired(&mut self, fired: bool) {
		self.timeout_fired = fired;
	}

	/// Live children in spawn order.
	pub fn children(&self) -> Vec<ProcessRef> {
		self.me.children()
	}

	/// Replaces the strategy applied to this process's children.
	pub fn set_child_strategy(&self, strategy: SupervisorStrategy) {
		self.me.cell().set_child_strategy(strategy);
	}

	pub fn child_strategy(&self) -> SupervisorStrategy {
		self.me.cell().child_strategy()
	}

	/// Requests a graceful stop once the current event has been handled.
	pub fn stop_self(&self) {
		self.me.stop();
	}

	/// Stops after every message already queued has been handled.
	pub fn poison_self(&self) {
		self.me.poison();
	}
}

impl Spawner for Context {
	fn spawn(&self, props: Props) -> Result<ProcessRef, SpawnError> {
		process::launch(&self.system, Parent::Process(Arc::downgrade(self.me.cell())), props)
	}

	fn system(&self) -> &ActorSystem {
		&self.system
	}
}

impl std::fmt::Debug for Context {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Context")
			.field("process", &self.me)
			.field("incarnation", &self.incarnation)
			.field("receive_timeout", &self.receive_timeout)
			.finish_non_exhaustive()
	}
}
