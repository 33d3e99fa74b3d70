use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::mailbox::SendError;
use crate::message::Message;

/// Failure of a request/response exchange.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
	/// No reply arrived within the request timeout.
	#[error("request timed out after {0:?}")]
	Timeout(Duration),
	/// The reply slot was dropped without an answer.
	#[error("request dropped without a reply")]
	Dropped,
	/// The request could not be enqueued.
	#[error("request could not be delivered: {0}")]
	Send(#[from] SendError),
	/// A reply arrived but carried an unexpected payload type.
	#[error("unexpected reply: expected {expected}, got {actual}")]
	UnexpectedReply { expected: &'static str, actual: &'static str },
}

/// Resolve-once reply slot shared with the process answering a request.
#[derive(Clone)]
pub struct Responder {
	slot: Arc<Mutex<Option<oneshot::Sender<Message>>>>,
}

impl Responder {
	/// Resolves the pending request. Only the first call has an effect.
	///
	/// Returns `false` when already resolved or the waiter went away.
	pub fn resolve(&self, message: Message) -> bool {
		let Some(tx) = self.slot.lock().take() else {
			return false;
		};
		tx.send(message).is_ok()
	}

	/// Returns whether this slot was already used.
	pub fn is_resolved(&self) -> bool {
		self.slot.lock().is_none()
	}
}

impl fmt::Debug for Responder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Responder").field("resolved", &self.is_resolved()).finish()
	}
}

/// Pending reply to one request, bounded by a deadline fixed at creation.
pub struct ReplyFuture {
	rx: oneshot::Receiver<Message>,
	timeout: Duration,
	deadline: Instant,
	failed: Option<SendError>,
}

/// Creates a linked responder and reply future with the given timeout.
pub fn reply_channel(timeout: Duration) -> (Responder, ReplyFuture) {
	let (tx, rx) = oneshot::channel();
	let responder = Responder {
		slot: Arc::new(Mutex::new(Some(tx))),
	};
	let future = ReplyFuture {
		rx,
		timeout,
		deadline: Instant::now() + timeout,
		failed: None,
	};
	(responder, future)
}

impl ReplyFuture {
	pub(crate) fn fail(mut self, err: SendError) -> Self {
		self.failed = Some(err);
		self
	}

	/// Timeout this future was created with.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Waits for the reply.
	pub async fn wait(self) -> Result<Message, RequestError> {
		if let Some(err) = self.failed {
			return Err(err.into());
		}
		match tokio::time::timeout_at(self.deadline, self.rx).await {
			Ok(Ok(message)) => Ok(message),
			Ok(Err(_)) => Err(RequestError::Dropped),
			Err(_) => Err(RequestError::Timeout(self.timeout)),
		}
	}

	/// Waits for the reply and downcasts it to `T`.
	pub async fn wait_for<T: Any>(self) -> Result<T, RequestError> {
		let message = self.wait().await?;
		message.downcast::<T>().map_err(|message| RequestError::UnexpectedReply {
			expected: std::any::type_name::<T>(),
			actual: message.type_name(),
		})
	}
}

impl fmt::Debug for ReplyFuture {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ReplyFuture").field("timeout", &self.timeout).finish_non_exhaustive()
	}
}
