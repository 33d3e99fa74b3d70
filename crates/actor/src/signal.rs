use async_trait::async_trait;

use crate::context::Context;
use crate::message::Message;

/// Lifecycle signal delivered to a process as an ordinary event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
	/// Delivered first to every fresh instance, including restarted ones.
	Started,
	/// Delivered to a failed instance right before it is replaced.
	Restarting,
	/// Delivered once the process decided to stop, before its children stop.
	Stopping,
	/// Last event an instance ever sees.
	Stopped,
	/// No message arrived within the configured receive timeout.
	ReceiveTimeout,
}

/// One unit of work handed to [`Process::receive`].
#[derive(Debug)]
pub enum Event {
	Signal(Signal),
	Message(Message),
}

/// Single-threaded message handler driven by the runtime.
///
/// Returning `Err` marks the instance as failed; the parent's
/// [`SupervisorStrategy`](crate::SupervisorStrategy) then decides between a
/// restart and a stop.
#[async_trait]
pub trait Process: Send + 'static {
	async fn receive(&mut self, ctx: &mut Context, event: Event) -> Result<(), String>;
}
