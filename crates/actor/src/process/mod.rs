//! Process handles and the supervised run loop behind every process.

use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::future::{ReplyFuture, reply_channel};
use crate::mailbox::{Mailbox, SendError};
use crate::message::{Envelope, Message, Sender};
use crate::props::{ProcessFactory, Props};
use crate::signal::{Event, Process, Signal};
use crate::spawn::{panic_message, spawn_task};
use crate::supervision::{Directive, RestartStats, RestartType, StrategyKind, SupervisorStrategy};
use crate::system::{ActorSystem, SpawnError};

/// Process identifier, unique within one [`ActorSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(u64);

impl Pid {
	pub(crate) const fn new(raw: u64) -> Self {
		Self(raw)
	}

	pub const fn as_u64(self) -> u64 {
		self.0
	}
}

impl fmt::Display for Pid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

pub(crate) enum Parent {
	Root,
	Process(Weak<ProcessCell>),
}

/// Shared state of one process, outliving individual incarnations.
pub(crate) struct ProcessCell {
	pid: Pid,
	name: String,
	mailbox: Mailbox<Envelope>,
	stop: CancellationToken,
	restart_pending: AtomicBool,
	restart: Notify,
	children: Mutex<Vec<ProcessRef>>,
	child_strategy: Mutex<SupervisorStrategy>,
	parent: Parent,
	terminated: watch::Sender<bool>,
}

impl ProcessCell {
	pub(crate) fn set_child_strategy(&self, strategy: SupervisorStrategy) {
		*self.child_strategy.lock() = strategy;
	}

	pub(crate) fn child_strategy(&self) -> SupervisorStrategy {
		self.child_strategy.lock().clone()
	}

	fn is_terminated(&self) -> bool {
		*self.terminated.borrow()
	}

	/// Stops children one at a time, latest spawned first.
	async fn stop_children(&self) {
		let children = self.children.lock().clone();
		for child in children.iter().rev() {
			child.stop_and_wait().await;
		}
	}

	fn restart_siblings(&self) {
		let Parent::Process(parent) = &self.parent else {
			return;
		};
		let Some(parent) = parent.upgrade() else {
			return;
		};
		let siblings = parent.children.lock().clone();
		for sibling in siblings.iter().filter(|sibling| sibling.pid() != self.pid) {
			sibling.request_restart();
		}
	}
}

/// Handle to a process. Cheap to clone; equality is by [`Pid`].
#[derive(Clone)]
pub struct ProcessRef {
	cell: Arc<ProcessCell>,
}

impl ProcessRef {
	pub fn pid(&self) -> Pid {
		self.cell.pid
	}

	pub fn name(&self) -> &str {
		&self.cell.name
	}

	pub(crate) fn cell(&self) -> &Arc<ProcessCell> {
		&self.cell
	}

	/// Enqueues a message with no reply target, waiting for mailbox room.
	pub async fn send<M: Send + 'static>(&self, message: M) -> Result<(), SendError> {
		self.deliver(Message::new(message), None).await
	}

	/// Enqueues a message without waiting; fails with [`SendError::Full`]
	/// when the mailbox is at capacity.
	pub fn try_send<M: Send + 'static>(&self, message: M) -> Result<(), SendError> {
		self.cell.mailbox.try_send(Envelope {
			message: Message::new(message),
			sender: None,
		})
	}

	/// Enqueues a message whose replies go to `sender`.
	pub async fn request<M: Send + 'static>(&self, message: M, sender: impl Into<Sender>) -> Result<(), SendError> {
		self.deliver(Message::new(message), Some(sender.into())).await
	}

	/// Enqueues a message and returns a future resolved by the first reply.
	///
	/// Delivery failures surface when the future is awaited.
	pub async fn request_future<M: Send + 'static>(&self, message: M, timeout: Duration) -> ReplyFuture {
		let (responder, future) = reply_channel(timeout);
		match self.deliver(Message::new(message), Some(Sender::Future(responder))).await {
			Ok(()) => future,
			Err(err) => future.fail(err),
		}
	}

	pub(crate) async fn deliver(&self, message: Message, sender: Option<Sender>) -> Result<(), SendError> {
		self.cell.mailbox.send(Envelope { message, sender }).await
	}

	/// Requests a graceful stop. The handler in flight is abandoned and
	/// queued messages are discarded.
	pub fn stop(&self) {
		self.cell.stop.cancel();
	}

	pub async fn stop_and_wait(&self) {
		self.stop();
		self.terminated().await;
	}

	/// Closes the mailbox: queued messages are still handled, then the
	/// process stops. Later sends fail with [`SendError::Closed`].
	pub fn poison(&self) {
		self.cell.mailbox.close();
	}

	pub async fn poison_and_wait(&self) {
		self.poison();
		self.terminated().await;
	}

	/// Resolves once the process has fully terminated.
	pub async fn terminated(&self) {
		let mut rx = self.cell.terminated.subscribe();
		let _ = rx.wait_for(|done| *done).await;
	}

	pub fn is_alive(&self) -> bool {
		!self.cell.is_terminated()
	}

	/// Asks the process to replace its current instance once the message in
	/// flight has been handled.
	pub fn request_restart(&self) {
		self.cell.restart_pending.store(true, Ordering::Release);
		self.cell.restart.notify_waiters();
	}

	/// Live children in spawn order.
	pub fn children(&self) -> Vec<ProcessRef> {
		self.cell.children.lock().clone()
	}

	pub fn parent(&self) -> Option<ProcessRef> {
		match &self.cell.parent {
			Parent::Root => None,
			Parent::Process(parent) => parent.upgrade().map(|cell| ProcessRef { cell }),
		}
	}
}

impl PartialEq for ProcessRef {
	fn eq(&self, other: &Self) -> bool {
		self.pid() == other.pid()
	}
}

impl Eq for ProcessRef {}

impl Hash for ProcessRef {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.pid().hash(state);
	}
}

impl fmt::Debug for ProcessRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProcessRef").field("pid", &self.cell.pid).field("name", &self.cell.name).finish()
	}
}

/// Registers a new process under `parent` and starts its run loop.
pub(crate) fn launch(system: &ActorSystem, parent: Parent, props: Props) -> Result<ProcessRef, SpawnError> {
	if system.is_shut_down() {
		return Err(SpawnError::SystemShutdown);
	}
	let Props {
		factory,
		name,
		child_strategy,
		restart,
		mailbox_capacity,
	} = props;
	let capacity = mailbox_capacity.unwrap_or(system.config().mailbox_capacity);
	if capacity == 0 {
		return Err(SpawnError::InvalidMailboxCapacity);
	}
	let parent_cell = match &parent {
		Parent::Root => None,
		Parent::Process(weak) => {
			let cell = weak.upgrade().ok_or(SpawnError::ParentStopping)?;
			if cell.stop.is_cancelled() || cell.is_terminated() {
				return Err(SpawnError::ParentStopping);
			}
			Some(cell)
		}
	};

	let pid = system.next_pid();
	let (terminated, _) = watch::channel(false);
	let cell = Arc::new(ProcessCell {
		pid,
		name: name.unwrap_or_else(|| format!("process-{}", pid.as_u64())),
		mailbox: Mailbox::new(capacity),
		stop: CancellationToken::new(),
		restart_pending: AtomicBool::new(false),
		restart: Notify::new(),
		children: Mutex::new(Vec::new()),
		child_strategy: Mutex::new(child_strategy.unwrap_or_default()),
		parent,
		terminated,
	});
	let process = ProcessRef { cell };
	match parent_cell {
		Some(parent) => parent.children.lock().push(process.clone()),
		None => system.attach_root(process.clone()),
	}

	tracing::debug!(pid = %pid, name = %process.name(), restart = ?restart, "bosun.process.spawn");
	spawn_task(process.name(), run_process(system.clone(), process.clone(), factory, restart));
	Ok(process)
}

/// How one incarnation ended.
#[derive(Debug)]
enum Exit {
	/// Stopped gracefully; `Stopping` and `Stopped` were already delivered.
	Stopped,
	/// A sibling failure under a one-for-all parent asked for a restart.
	RestartRequested,
	/// `Started` failed; the instance never ran and gets no further signals.
	StartFailed(String),
	Failed(String),
}

enum Next {
	Envelope(Envelope),
	Timeout,
	Closed,
	Stop,
	Restart,
}

type Incarnation = (Box<dyn Process>, Context);

async fn run_process(system: ActorSystem, me: ProcessRef, factory: ProcessFactory, restart: RestartType) {
	let cell = Arc::clone(&me.cell);
	let mut stats = RestartStats::default();
	let mut incarnation = 0u64;

	loop {
		incarnation += 1;
		cell.restart_pending.store(false, Ordering::Release);
		let instance = factory();
		let ctx = Context::new(system.clone(), me.clone(), incarnation);
		let run_cell = Arc::clone(&cell);
		let task = spawn_task(&cell.name, async move {
			let mut instance = instance;
			let mut ctx = ctx;
			let exit = drive(&mut instance, &mut ctx, &run_cell).await;
			(instance, ctx, exit)
		});
		let (current, exit) = match task.await {
			Ok((_, _, exit @ Exit::StartFailed(_))) => (None, exit),
			Ok((instance, ctx, exit)) => (Some((instance, ctx)), exit),
			Err(err) => {
				let reason = match panic_message(err) {
					Some(msg) => format!("panicked: {msg}"),
					None => "process task cancelled".to_string(),
				};
				(None, Exit::Failed(reason))
			}
		};

		let verdict = match &exit {
			Exit::Stopped => break,
			Exit::RestartRequested if restart == RestartType::Temporary => Verdict::Stop,
			Exit::RestartRequested => Verdict::Restart {
				kind: StrategyKind::OneForOne,
				backoff: Duration::ZERO,
			},
			Exit::Failed(_) | Exit::StartFailed(_) => supervise(&system, &cell, restart, &mut stats),
		};
		tracing::debug!(
			pid = %cell.pid,
			name = %cell.name,
			incarnation,
			exit = ?exit,
			verdict = ?verdict,
			"bosun.process.exit"
		);

		match verdict {
			Verdict::Stop => {
				teardown(current, &cell).await;
				break;
			}
			Verdict::Restart { kind, backoff } => {
				if !matches!(exit, Exit::RestartRequested) && kind == StrategyKind::OneForAll {
					cell.restart_siblings();
				}
				let current = prepare_restart(current, &cell).await;
				tracing::debug!(pid = %cell.pid, name = %cell.name, incarnation, "bosun.process.restart");
				if !backoff.is_zero() {
					tokio::select! {
						_ = cell.stop.cancelled() => {
							teardown(current, &cell).await;
							break;
						}
						_ = tokio::time::sleep(backoff) => {}
					}
				}
				if cell.stop.is_cancelled() {
					teardown(current, &cell).await;
					break;
				}
			}
		}
	}

	finish(&system, &cell);
}

#[derive(Debug)]
enum Verdict {
	Restart { kind: StrategyKind, backoff: Duration },
	Stop,
}

fn supervise(system: &ActorSystem, cell: &ProcessCell, restart: RestartType, stats: &mut RestartStats) -> Verdict {
	if cell.stop.is_cancelled() || restart == RestartType::Temporary {
		return Verdict::Stop;
	}
	let strategy = match &cell.parent {
		Parent::Root => system.config().root_strategy.clone(),
		Parent::Process(parent) => match parent.upgrade() {
			Some(parent) => parent.child_strategy(),
			None => return Verdict::Stop,
		},
	};
	match strategy.decide(stats, Instant::now()) {
		Directive::Restart => Verdict::Restart {
			kind: strategy.kind(),
			backoff: strategy.backoff_delay(),
		},
		Directive::Stop => Verdict::Stop,
	}
}

/// Runs one incarnation until it stops or fails.
async fn drive(instance: &mut Box<dyn Process>, ctx: &mut Context, cell: &ProcessCell) -> Exit {
	let started = tokio::select! {
		biased;
		_ = cell.stop.cancelled() => None,
		res = instance.receive(ctx, Event::Signal(Signal::Started)) => Some(res),
	};
	match started {
		None => {
			shutdown(instance, ctx, cell).await;
			return Exit::Stopped;
		}
		Some(Err(err)) => return Exit::StartFailed(err),
		Some(Ok(())) => {}
	}

	loop {
		let restart = cell.restart.notified();
		tokio::pin!(restart);
		restart.as_mut().enable();
		if cell.restart_pending.swap(false, Ordering::AcqRel) {
			return Exit::RestartRequested;
		}

		let next = tokio::select! {
			biased;
			_ = cell.stop.cancelled() => Next::Stop,
			_ = &mut restart => Next::Restart,
			next = next_envelope(&cell.mailbox, ctx.armed_receive_timeout()) => next,
		};
		let event = match next {
			Next::Stop | Next::Closed => break,
			Next::Restart => {
				cell.restart_pending.store(false, Ordering::Release);
				return Exit::RestartRequested;
			}
			Next::Timeout => {
				ctx.set_timeout_fired(true);
				Event::Signal(Signal::ReceiveTimeout)
			}
			Next::Envelope(envelope) => {
				ctx.set_timeout_fired(false);
				ctx.set_sender(envelope.sender);
				Event::Message(envelope.message)
			}
		};

		let handled = tokio::select! {
			biased;
			_ = cell.stop.cancelled() => None,
			res = instance.receive(ctx, event) => Some(res),
		};
		ctx.set_sender(None);
		match handled {
			None => break,
			Some(Ok(())) => {}
			Some(Err(err)) => return Exit::Failed(err),
		}
	}

	shutdown(instance, ctx, cell).await;
	Exit::Stopped
}

async fn next_envelope(mailbox: &Mailbox<Envelope>, timeout: Option<Duration>) -> Next {
	match timeout {
		Some(timeout) => match tokio::time::timeout(timeout, mailbox.recv()).await {
			Ok(Some(envelope)) => Next::Envelope(envelope),
			Ok(None) => Next::Closed,
			Err(_) => Next::Timeout,
		},
		None => mailbox.recv().await.map_or(Next::Closed, Next::Envelope),
	}
}

/// Graceful stop of a live instance: `Stopping`, children, `Stopped`.
async fn shutdown(instance: &mut Box<dyn Process>, ctx: &mut Context, cell: &ProcessCell) {
	deliver_signal(instance, ctx, Signal::Stopping, &cell.name).await;
	cell.stop_children().await;
	deliver_signal(instance, ctx, Signal::Stopped, &cell.name).await;
}

async fn deliver_signal(instance: &mut Box<dyn Process>, ctx: &mut Context, signal: Signal, name: &str) {
	if let Err(err) = instance.receive(ctx, Event::Signal(signal)).await {
		tracing::warn!(process = name, signal = ?signal, error = %err, "bosun.process.signal_failed");
	}
}

/// Runs `fut` as its own task so a panicking handler cannot take the run
/// loop down with it.
async fn guarded<F>(name: &str, fut: F) -> Option<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	match spawn_task(name, fut).await {
		Ok(output) => Some(output),
		Err(err) => {
			let reason = panic_message(err).unwrap_or_else(|| "cancelled".to_string());
			tracing::warn!(process = name, reason, "bosun.process.signal_panicked");
			None
		}
	}
}

/// Stops a failed instance for good.
async fn teardown(current: Option<Incarnation>, cell: &Arc<ProcessCell>) {
	match current {
		Some((mut instance, mut ctx)) => {
			let task_cell = Arc::clone(cell);
			let finished = guarded(&cell.name, async move {
				shutdown(&mut instance, &mut ctx, &task_cell).await;
			})
			.await;
			if finished.is_none() {
				cell.stop_children().await;
			}
		}
		None => cell.stop_children().await,
	}
}

/// Delivers `Restarting` to the outgoing instance and stops its children.
async fn prepare_restart(current: Option<Incarnation>, cell: &Arc<ProcessCell>) -> Option<Incarnation> {
	let restarted = match current {
		Some((mut instance, mut ctx)) => {
			let name = cell.name.clone();
			guarded(&cell.name, async move {
				deliver_signal(&mut instance, &mut ctx, Signal::Restarting, &name).await;
				(instance, ctx)
			})
			.await
		}
		None => None,
	};
	cell.stop_children().await;
	restarted
}

fn finish(system: &ActorSystem, cell: &ProcessCell) {
	let discarded = cell.mailbox.close_and_discard();
	if discarded > 0 {
		tracing::debug!(pid = %cell.pid, name = %cell.name, discarded, "bosun.process.discarded");
	}
	match &cell.parent {
		Parent::Root => system.detach_root(cell.pid),
		Parent::Process(parent) => {
			if let Some(parent) = parent.upgrade() {
				parent.children.lock().retain(|child| child.pid() != cell.pid);
			}
		}
	}
	cell.terminated.send_replace(true);
	tracing::debug!(pid = %cell.pid, name = %cell.name, "bosun.process.terminated");
}
