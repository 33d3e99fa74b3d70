use std::any::Any;
use std::fmt;

use crate::future::Responder;
use crate::mailbox::SendError;
use crate::process::ProcessRef;

/// Type-erased message payload.
///
/// Processes exchange arbitrary `Send` values; receivers recover the concrete
/// type with [`Message::downcast`] or [`Message::downcast_ref`].
pub struct Message {
	inner: Box<dyn Any + Send>,
	type_name: &'static str,
}

impl Message {
	/// Wraps a value. Wrapping a `Message` returns it unchanged.
	pub fn new<T>(value: T) -> Self
	where
		T: Send + 'static,
	{
		let type_name = std::any::type_name::<T>();
		let boxed: Box<dyn Any + Send> = Box::new(value);
		match boxed.downcast::<Message>() {
			Ok(message) => *message,
			Err(inner) => Self { inner, type_name },
		}
	}

	/// Returns whether the payload is a `T`.
	pub fn is<T: Any>(&self) -> bool {
		self.inner.is::<T>()
	}

	/// Moves the payload out as a `T`, or hands the message back.
	pub fn downcast<T: Any>(self) -> Result<T, Self> {
		let type_name = self.type_name;
		match self.inner.downcast::<T>() {
			Ok(value) => Ok(*value),
			Err(inner) => Err(Self { inner, type_name }),
		}
	}

	/// Borrows the payload as a `T`.
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.inner.downcast_ref::<T>()
	}

	/// Type name of the wrapped payload, for diagnostics.
	pub fn type_name(&self) -> &'static str {
		self.type_name
	}
}

impl fmt::Debug for Message {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Message<{}>", self.type_name)
	}
}

/// Reply target of an in-flight message.
#[derive(Clone, Debug)]
pub enum Sender {
	/// Another process; the reply lands in its mailbox.
	Process(ProcessRef),
	/// A caller waiting on a [`ReplyFuture`](crate::ReplyFuture).
	Future(Responder),
}

impl Sender {
	/// Delivers `message` to this reply target.
	pub async fn tell(&self, message: Message) -> Result<(), SendError> {
		match self {
			Self::Process(target) => target.send(message).await,
			Self::Future(responder) => {
				if responder.resolve(message) {
					Ok(())
				} else {
					Err(SendError::Closed)
				}
			}
		}
	}

	/// Returns the process behind this target, if any.
	pub fn process(&self) -> Option<&ProcessRef> {
		match self {
			Self::Process(target) => Some(target),
			Self::Future(_) => None,
		}
	}
}

impl From<ProcessRef> for Sender {
	fn from(process: ProcessRef) -> Self {
		Self::Process(process)
	}
}

impl From<Responder> for Sender {
	fn from(responder: Responder) -> Self {
		Self::Future(responder)
	}
}

/// One queued delivery: payload plus optional reply target.
#[derive(Debug)]
pub(crate) struct Envelope {
	pub(crate) message: Message,
	pub(crate) sender: Option<Sender>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn downcast_recovers_payload() {
		let message = Message::new(String::from("ping"));
		assert!(message.is::<String>());
		assert_eq!(message.downcast_ref::<String>().map(String::as_str), Some("ping"));
		assert_eq!(message.downcast::<String>().unwrap(), "ping");
	}

	#[test]
	fn failed_downcast_returns_message() {
		let message = Message::new(7u32);
		let message = message.downcast::<i64>().unwrap_err();
		assert_eq!(message.type_name(), "u32");
		assert_eq!(message.downcast::<u32>().unwrap(), 7);
	}

	#[test]
	fn wrapping_a_message_does_not_nest() {
		let message = Message::new(Message::new(5u8));
		assert!(message.is::<u8>());
		assert_eq!(format!("{message:?}"), "Message<u8>");
	}
}
