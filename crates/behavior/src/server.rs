//! Caller-side handle of a started behavior.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bosun_actor::{Pid, ProcessRef, ReplyFuture, Sender};
use parking_lot::{Mutex, RwLock};

use crate::application::ChildHandle;
use crate::error::ServerError;
use crate::registry::ProducerKind;
use crate::spec::{BehaviorId, InitArgs};

/// State shared between a handle and the delegate running its process.
///
/// The handle owns it; the delegate only holds a `Weak`.
pub(crate) struct ServerShared {
	pub(crate) id: BehaviorId,
	pub(crate) kind: ProducerKind,
	process: RwLock<Option<ProcessRef>>,
	delegate_bound: AtomicBool,
	pub(crate) init_args: InitArgs,
	pub(crate) receive_timeout: Option<Duration>,
	request_timeout: Duration,
	children: Mutex<Vec<ChildHandle>>,
}

impl ServerShared {
	pub(crate) fn bind_delegate(&self) {
		self.delegate_bound.store(true, Ordering::Release);
	}

	/// Terminal stop of the process: forget it and its children.
	pub(crate) fn release(&self, pid: Pid) {
		self.delegate_bound.store(false, Ordering::Release);
		let mut process = self.process.write();
		if process.as_ref().is_some_and(|process| process.pid() == pid) {
			*process = None;
		}
		drop(process);
		self.children.lock().clear();
	}

	/// The process, unless it terminated. A process can end without its
	/// delegate seeing `Stopped` (a panic, or restarts exhausted during
	/// start), so a dead reference is released here instead.
	fn live_process(&self) -> Option<ProcessRef> {
		let process = self.process.read().clone()?;
		if process.is_alive() {
			return Some(process);
		}
		self.release(process.pid());
		None
	}

	pub(crate) fn push_child(&self, child: ChildHandle) {
		self.children.lock().push(child);
	}

	pub(crate) fn clear_children(&self) {
		self.children.lock().clear();
	}

	pub(crate) fn children(&self) -> Vec<ChildHandle> {
		self.children.lock().clone()
	}
}

/// Handle to a general server: send, request and stop.
///
/// The process reference is set only once the start call observed
/// readiness, and cleared when the process reports its terminal stop.
#[derive(Clone)]
pub struct GeneralServer {
	pub(crate) shared: Arc<ServerShared>,
}

impl GeneralServer {
	pub(crate) fn new(id: BehaviorId, kind: ProducerKind, init_args: InitArgs, receive_timeout: Option<Duration>, request_timeout: Duration) -> Self {
		Self {
			shared: Arc::new(ServerShared {
				id,
				kind,
				process: RwLock::new(None),
				delegate_bound: AtomicBool::new(false),
				init_args,
				receive_timeout,
				request_timeout,
				children: Mutex::new(Vec::new()),
			}),
		}
	}

	pub(crate) fn set_process(&self, process: ProcessRef) {
		*self.shared.process.write() = Some(process);
	}

	pub fn id(&self) -> &BehaviorId {
		&self.shared.id
	}

	pub fn kind(&self) -> ProducerKind {
		self.shared.kind
	}

	pub fn pid(&self) -> Option<Pid> {
		self.shared.live_process().as_ref().map(ProcessRef::pid)
	}

	pub fn process(&self) -> Option<ProcessRef> {
		self.shared.live_process()
	}

	pub fn is_running(&self) -> bool {
		self.shared.live_process().is_some()
	}

	/// Whether a delegate is currently attached to this handle.
	pub fn has_delegate(&self) -> bool {
		self.shared.live_process();
		self.shared.delegate_bound.load(Ordering::Acquire)
	}

	pub fn init_args(&self) -> &InitArgs {
		&self.shared.init_args
	}

	/// Effective receive timeout, after inheritance from the engine default.
	pub fn receive_timeout(&self) -> Option<Duration> {
		self.shared.receive_timeout
	}

	fn running(&self) -> Result<ProcessRef, ServerError> {
		self.process().ok_or_else(|| ServerError::NotRunning(self.shared.id.clone()))
	}

	pub async fn send<M: Send + 'static>(&self, message: M) -> Result<(), ServerError> {
		Ok(self.running()?.send(message).await?)
	}

	/// Sends `message` with `sender` as its reply target.
	pub async fn request<M: Send + 'static>(&self, message: M, sender: impl Into<Sender>) -> Result<(), ServerError> {
		Ok(self.running()?.request(message, sender).await?)
	}

	pub async fn request_future<M: Send + 'static>(&self, message: M, timeout: Duration) -> Result<ReplyFuture, ServerError> {
		Ok(self.running()?.request_future(message, timeout).await)
	}

	/// [`request_future`](Self::request_future) with the engine's request
	/// timeout, 5 seconds unless configured otherwise.
	pub async fn request_future_default<M: Send + 'static>(&self, message: M) -> Result<ReplyFuture, ServerError> {
		self.request_future(message, self.shared.request_timeout).await
	}

	/// Requests and waits for a reply of type `T`.
	pub async fn call<T: Any, M: Send + 'static>(&self, message: M) -> Result<T, ServerError> {
		let future = self.request_future_default(message).await?;
		Ok(future.wait_for::<T>().await?)
	}

	/// Stops without draining the mailbox.
	pub fn stop(&self) -> Result<(), ServerError> {
		self.running()?.stop();
		Ok(())
	}

	pub async fn stop_and_wait(&self) -> Result<(), ServerError> {
		self.running()?.stop_and_wait().await;
		Ok(())
	}

	/// Stops once every message already queued has been handled.
	pub fn poison(&self) -> Result<(), ServerError> {
		self.running()?.poison();
		Ok(())
	}

	pub async fn poison_and_wait(&self) -> Result<(), ServerError> {
		self.running()?.poison_and_wait().await;
		Ok(())
	}

	pub(crate) fn children(&self) -> Vec<ChildHandle> {
		self.shared.live_process();
		self.shared.children()
	}
}

impl fmt::Debug for GeneralServer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("GeneralServer")
			.field("id", &self.shared.id)
			.field("kind", &self.shared.kind)
			.field("pid", &self.pid())
			.finish_non_exhaustive()
	}
}
