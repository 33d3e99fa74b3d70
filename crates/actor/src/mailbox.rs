use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Mailbox send error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
	/// Mailbox is closed; the process stopped or is draining after a poison.
	#[error("process mailbox closed")]
	Closed,
	/// Queue is full and a non-blocking send was used.
	#[error("process mailbox full")]
	Full,
}

struct MailboxState<T> {
	queue: VecDeque<T>,
	closed: bool,
}

struct MailboxInner<T> {
	capacity: usize,
	state: Mutex<MailboxState<T>>,
	notify_recv: Notify,
	notify_send: Notify,
}

/// Bounded FIFO mailbox owned by one process.
///
/// Senders wait for capacity (backpressure) instead of dropping. Closing is
/// two-flavoured: [`Mailbox::close`] lets the receiver drain what is queued,
/// [`Mailbox::close_and_discard`] throws the queue away.
pub struct Mailbox<T> {
	inner: Arc<MailboxInner<T>>,
}

impl<T> Clone for Mailbox<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Mailbox<T> {
	/// Creates a bounded mailbox.
	///
	/// # Panics
	///
	/// Panics if `capacity` is zero.
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0, "mailbox capacity must be > 0");
		Self {
			inner: Arc::new(MailboxInner {
				capacity,
				state: Mutex::new(MailboxState {
					queue: VecDeque::with_capacity(capacity.min(64)),
					closed: false,
				}),
				notify_recv: Notify::new(),
				notify_send: Notify::new(),
			}),
		}
	}

	/// Enqueues one item, waiting for capacity when full.
	pub async fn send(&self, item: T) -> Result<(), SendError> {
		let mut item = Some(item);
		loop {
			// Register before checking capacity so a concurrent recv cannot
			// slip its wakeup in between.
			let notified = self.inner.notify_send.notified();
			{
				let mut state = self.inner.state.lock();
				if state.closed {
					return Err(SendError::Closed);
				}
				if state.queue.len() < self.inner.capacity {
					if let Some(item) = item.take() {
						state.queue.push_back(item);
					}
					drop(state);
					self.inner.notify_recv.notify_one();
					return Ok(());
				}
			}
			notified.await;
		}
	}

	/// Non-blocking enqueue.
	pub fn try_send(&self, item: T) -> Result<(), SendError> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(SendError::Closed);
		}
		if state.queue.len() >= self.inner.capacity {
			return Err(SendError::Full);
		}
		state.queue.push_back(item);
		drop(state);
		self.inner.notify_recv.notify_one();
		Ok(())
	}

	/// Receives one item. Returns `None` once the mailbox is closed and drained.
	pub async fn recv(&self) -> Option<T> {
		loop {
			let notified = self.inner.notify_recv.notified();
			{
				let mut state = self.inner.state.lock();
				if let Some(item) = state.queue.pop_front() {
					drop(state);
					self.inner.notify_send.notify_one();
					return Some(item);
				}
				if state.closed {
					return None;
				}
			}
			notified.await;
		}
	}

	/// Closes the mailbox. Queued items remain receivable.
	pub fn close(&self) {
		self.inner.state.lock().closed = true;
		self.inner.notify_recv.notify_waiters();
		self.inner.notify_send.notify_waiters();
	}

	/// Closes the mailbox and drops everything still queued.
	///
	/// Returns the number of discarded items.
	pub fn close_and_discard(&self) -> usize {
		let discarded = {
			let mut state = self.inner.state.lock();
			state.closed = true;
			std::mem::take(&mut state.queue)
		};
		self.inner.notify_recv.notify_waiters();
		self.inner.notify_send.notify_waiters();
		// Dropped outside the lock; items may own reply slots whose drop wakes
		// other tasks.
		discarded.len()
	}

	/// Returns whether the mailbox was closed.
	pub fn is_closed(&self) -> bool {
		self.inner.state.lock().closed
	}

	/// Returns current queue length.
	pub fn len(&self) -> usize {
		self.inner.state.lock().queue.len()
	}

	/// Returns `true` when nothing is queued.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns queue capacity.
	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}
}
