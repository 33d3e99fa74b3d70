//! One-shot readiness handshake between a starter and the process it spawned.
//!
//! Built on the runtime's reply future: the delegate resolves it once when
//! mandatory initialization finished, the starter waits on it with the spawn
//! timeout. Every incarnation shares the same signal, so only the first
//! outcome is ever observed.

use std::time::Duration;

use bosun_actor::{Message, ReplyFuture, RequestError, Responder, reply_channel};

use crate::error::StartError;
use crate::spec::BehaviorId;

type Outcome = Result<(), StartError>;

/// Delegate side of the handshake.
#[derive(Clone, Debug)]
pub(crate) struct ReadinessSignal {
	responder: Responder,
}

/// Starter side of the handshake.
#[derive(Debug)]
pub(crate) struct ReadinessWaiter {
	future: ReplyFuture,
}

/// Creates a linked signal and waiter; the wait deadline starts now.
pub(crate) fn readiness(timeout: Duration) -> (ReadinessSignal, ReadinessWaiter) {
	let (responder, future) = reply_channel(timeout);
	(ReadinessSignal { responder }, ReadinessWaiter { future })
}

impl ReadinessSignal {
	/// Reports the start outcome. Returns `false` if an outcome was already
	/// reported or nobody waits anymore.
	pub(crate) fn notify(&self, outcome: Outcome) -> bool {
		self.responder.resolve(Message::new(outcome))
	}
}

impl ReadinessWaiter {
	pub(crate) async fn wait(self, id: &BehaviorId) -> Outcome {
		let timeout = self.future.timeout();
		match self.future.wait_for::<Outcome>().await {
			Ok(outcome) => outcome,
			Err(RequestError::Timeout(_)) => Err(StartError::ReadinessTimeout { id: id.clone(), timeout }),
			Err(_) => Err(StartError::Aborted { id: id.clone() }),
		}
	}
}
