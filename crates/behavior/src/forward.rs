//! Redirection of a handled message to a third process.

use bosun_actor::{Context, Message, ProcessRef, SendError};

/// Where the forward target's reply goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RespondPolicy {
	/// Fire-and-forget; nobody gets a reply.
	#[default]
	NoResponse,
	/// The target answers the caller of the message being handled.
	OriginalSender,
	/// The target answers the forwarding process.
	HandlerSelf,
}

/// Forward decided by a message handler, executed once by the delegate.
#[derive(Debug)]
pub struct Forward {
	target: Option<ProcessRef>,
	message: Message,
	respond: RespondPolicy,
}

impl Forward {
	/// Forwards `message` to `target` without a reply. A `None` target makes
	/// the forward a no-op.
	pub fn new<M: Send + 'static>(target: impl Into<Option<ProcessRef>>, message: M) -> Self {
		Self {
			target: target.into(),
			message: Message::new(message),
			respond: RespondPolicy::NoResponse,
		}
	}

	#[must_use]
	pub fn respond(mut self, policy: RespondPolicy) -> Self {
		self.respond = policy;
		self
	}

	#[must_use]
	pub fn to_original_sender(self) -> Self {
		self.respond(RespondPolicy::OriginalSender)
	}

	#[must_use]
	pub fn to_handler(self) -> Self {
		self.respond(RespondPolicy::HandlerSelf)
	}

	pub fn target(&self) -> Option<&ProcessRef> {
		self.target.as_ref()
	}

	pub fn policy(&self) -> RespondPolicy {
		self.respond
	}
}

/// Delivers `forward` on behalf of the process owning `ctx`.
pub(crate) async fn execute(ctx: &Context, forward: Forward) -> Result<(), SendError> {
	let Forward { target, message, respond } = forward;
	let Some(target) = target else {
		tracing::trace!(pid = %ctx.pid(), payload = message.type_name(), "bosun.forward.no_target");
		return Ok(());
	};
	tracing::trace!(pid = %ctx.pid(), target = %target.pid(), policy = ?respond, "bosun.forward");
	match respond {
		RespondPolicy::NoResponse => ctx.send(&target, message).await,
		RespondPolicy::OriginalSender => ctx.request_with_sender(&target, message, ctx.sender().cloned()).await,
		RespondPolicy::HandlerSelf => ctx.request(&target, message).await,
	}
}
