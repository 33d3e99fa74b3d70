//! Process adapter translating runtime events into behavior callbacks.
//!
//! One delegate is produced per incarnation. It reaches the owning handle only
//! through a `Weak`, and drops even that on the terminal `Stopped` signal.

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use bosun_actor::{Context, Event, Message, Process, Props, Signal, SupervisorStrategy};

use crate::behavior::{ApplicationBehavior, BehaviorContext, Reply, ServerBehavior};
use crate::config::StartFailurePolicy;
use crate::engine::Engine;
use crate::error::StartError;
use crate::forward;
use crate::readiness::ReadinessSignal;
use crate::registry::Producer;
use crate::server::ServerShared;
use crate::spec::{BehaviorId, InitArgs, SpawnSpec};

/// Name of the capability a behavior needs once it arms a receive timeout.
const TIMEOUT_CAPABILITY: &str = "TimeoutReceiver";

/// Freshly produced behavior instance.
pub(crate) enum Instance {
	Server(Box<dyn ServerBehavior>),
	Application(Box<dyn ApplicationBehavior>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	Starting,
	Running,
	Stopping,
	Stopped,
	/// `on_started` failed or the start was refused; no further callbacks.
	Failed,
}

/// Everything a delegate needs, cloned into each incarnation.
#[derive(Clone)]
pub(crate) struct Seed {
	pub(crate) engine: Engine,
	pub(crate) id: BehaviorId,
	pub(crate) producer: Producer,
	pub(crate) owner: Weak<ServerShared>,
	pub(crate) init_args: InitArgs,
	pub(crate) receive_timeout: Option<Duration>,
	pub(crate) readiness: Option<ReadinessSignal>,
	pub(crate) start_failure: StartFailurePolicy,
}

/// Builds the runtime descriptor for one start.
pub(crate) fn props(seed: Seed, spec: &SpawnSpec) -> Props {
	let mut props = Props::from_boxed(move || Box::new(Delegate::new(seed.clone())) as Box<dyn Process>)
		.name(spec.process_name())
		.restart(spec.restart_type());
	if let Some(strategy) = spec.supervisor_strategy() {
		props = props.with_supervisor(strategy.clone());
	}
	props
}

pub(crate) struct Delegate {
	behavior: Instance,
	owner: Weak<ServerShared>,
	engine: Engine,
	id: BehaviorId,
	init_args: InitArgs,
	receive_timeout: Option<Duration>,
	readiness: Option<ReadinessSignal>,
	start_failure: StartFailurePolicy,
	phase: Phase,
}

impl Delegate {
	fn new(seed: Seed) -> Self {
		Self {
			behavior: seed.producer.produce(),
			owner: seed.owner,
			engine: seed.engine,
			id: seed.id,
			init_args: seed.init_args,
			receive_timeout: seed.receive_timeout,
			readiness: seed.readiness,
			start_failure: seed.start_failure,
			phase: Phase::Starting,
		}
	}

	/// Returns whether a waiting starter received the outcome.
	fn report(&self, outcome: Result<(), StartError>) -> bool {
		self.readiness.as_ref().is_some_and(|readiness| readiness.notify(outcome))
	}

	fn has_timeout_capability(&mut self) -> bool {
		match &mut self.behavior {
			Instance::Server(behavior) => behavior.timeout_receiver().is_some(),
			Instance::Application(_) => false,
		}
	}

	async fn started(&mut self, ctx: &mut Context) -> Result<(), String> {
		if let Some(owner) = self.owner.upgrade() {
			owner.bind_delegate();
			owner.clear_children();
		}

		if let Some(timeout) = self.receive_timeout {
			if !self.has_timeout_capability() {
				let err = StartError::MissingCapability {
					id: self.id.clone(),
					capability: TIMEOUT_CAPABILITY,
				};
				tracing::error!(id = %self.id, error = %err, "bosun.server.start_failed");
				self.report(Err(err));
				self.phase = Phase::Failed;
				ctx.stop_self();
				return Ok(());
			}
			ctx.set_receive_timeout(timeout);
		}

		let mut bctx = BehaviorContext::new(ctx, &self.engine, &self.id);
		let initialized = match &mut self.behavior {
			Instance::Server(behavior) => behavior.on_started(&mut bctx, &self.init_args).await,
			Instance::Application(behavior) => behavior.on_started(&mut bctx, &self.init_args).await,
		};
		if let Err(err) = initialized {
			let err = StartError::InitFailed {
				id: self.id.clone(),
				reason: format!("{err:#}"),
			};
			return self.start_failed(ctx, err);
		}

		match &mut self.behavior {
			Instance::Server(behavior) => {
				if let Some(readiness) = &self.readiness {
					readiness.notify(Ok(()));
				}
				self.phase = Phase::Running;
				tracing::debug!(id = %self.id, pid = %ctx.pid(), incarnation = ctx.incarnation(), "bosun.server.ready");
				let mut bctx = BehaviorContext::new(ctx, &self.engine, &self.id);
				if let Err(err) = behavior.on_post_started(&mut bctx, &self.init_args).await {
					tracing::warn!(id = %self.id, error = %format!("{err:#}"), "bosun.server.post_start_failed");
				}
				Ok(())
			}
			Instance::Application(behavior) => {
				let mut bctx = BehaviorContext::new(ctx, &self.engine, &self.id);
				if let Err(err) = behavior.on_post_started(&mut bctx, &self.init_args).await {
					tracing::warn!(id = %self.id, error = %format!("{err:#}"), "bosun.server.post_start_failed");
				}
				let (flag, children) = behavior.on_get_sup_flag(&mut bctx).await;
				if let Err(err) = start_children(&self.engine, &self.id, &self.owner, ctx, flag.into(), children).await {
					return self.start_failed(ctx, err);
				}
				self.report(Ok(()));
				self.phase = Phase::Running;
				tracing::debug!(id = %self.id, pid = %ctx.pid(), incarnation = ctx.incarnation(), "bosun.server.ready");
				Ok(())
			}
		}
	}

	fn start_failed(&mut self, ctx: &mut Context, err: StartError) -> Result<(), String> {
		tracing::error!(id = %self.id, incarnation = ctx.incarnation(), error = %err, "bosun.server.start_failed");
		let reason = err.to_string();
		// A starter that saw the failure stops the process; restarting it
		// first would run `on_started` again behind its back.
		let observed = self.report(Err(err));
		self.phase = Phase::Failed;
		match self.start_failure {
			StartFailurePolicy::Supervise if !observed => Err(reason),
			StartFailurePolicy::Supervise | StartFailurePolicy::Terminate => {
				ctx.stop_self();
				Ok(())
			}
		}
	}

	async fn message(&mut self, ctx: &mut Context, message: Message) -> Result<(), String> {
		let behavior = match &mut self.behavior {
			Instance::Server(behavior) => behavior,
			Instance::Application(_) => {
				tracing::warn!(id = %self.id, payload = message.type_name(), "bosun.app.message_dropped");
				return Ok(());
			}
		};
		let mut bctx = BehaviorContext::new(ctx, &self.engine, &self.id);
		let reply = behavior.on_message(&mut bctx, message).await.map_err(|err| format!("{err:#}"))?;
		match reply {
			Reply::NoReply => {}
			Reply::Respond(message) => {
				if let Err(err) = ctx.respond(message).await {
					tracing::debug!(id = %self.id, error = %err, "bosun.server.reply_undeliverable");
				}
			}
			Reply::Forward(forward) => {
				if let Err(err) = forward::execute(ctx, forward).await {
					tracing::warn!(id = %self.id, error = %err, "bosun.forward.failed");
				}
			}
		}
		Ok(())
	}

	async fn timeout(&mut self, ctx: &mut Context) -> Result<(), String> {
		let mut bctx = BehaviorContext::new(ctx, &self.engine, &self.id);
		let receiver = match &mut self.behavior {
			Instance::Server(behavior) => behavior.timeout_receiver(),
			Instance::Application(_) => None,
		};
		match receiver {
			Some(receiver) => receiver.on_timeout(&mut bctx).await.map_err(|err| format!("{err:#}")),
			None => Err(format!("behavior {} received a timeout without the {TIMEOUT_CAPABILITY} capability", self.id)),
		}
	}

	async fn lifecycle(&mut self, ctx: &mut Context, signal: Signal) {
		let mut bctx = BehaviorContext::new(ctx, &self.engine, &self.id);
		match (&mut self.behavior, signal) {
			(Instance::Server(behavior), Signal::Restarting) => behavior.on_restarting(&mut bctx).await,
			(Instance::Application(behavior), Signal::Restarting) => behavior.on_restarting(&mut bctx).await,
			(Instance::Server(behavior), Signal::Stopping) => behavior.on_stopping(&mut bctx).await,
			(Instance::Application(behavior), Signal::Stopping) => behavior.on_stopping(&mut bctx).await,
			(Instance::Server(behavior), Signal::Stopped) => behavior.on_stopped(&mut bctx).await,
			(Instance::Application(behavior), Signal::Stopped) => behavior.on_stopped(&mut bctx).await,
			_ => {}
		}
	}

	/// Terminal cleanup: detach from the handle and drop every reference to it.
	fn release(&mut self, ctx: &Context) {
		if let Some(owner) = self.owner.upgrade() {
			owner.release(ctx.pid());
		}
		self.owner = Weak::new();
		self.readiness = None;
	}
}

#[async_trait]
impl Process for Delegate {
	async fn receive(&mut self, ctx: &mut Context, event: Event) -> Result<(), String> {
		match event {
			Event::Signal(Signal::Started) => self.started(ctx).await,
			Event::Signal(Signal::ReceiveTimeout) => {
				if self.phase != Phase::Running {
					return Ok(());
				}
				self.timeout(ctx).await
			}
			Event::Signal(Signal::Restarting) => {
				if self.phase == Phase::Running {
					self.lifecycle(ctx, Signal::Restarting).await;
				}
				if let Some(owner) = self.owner.upgrade() {
					owner.clear_children();
				}
				Ok(())
			}
			Event::Signal(Signal::Stopping) => {
				if self.phase == Phase::Starting {
					self.report(Err(StartError::Aborted { id: self.id.clone() }));
				}
				if self.phase == Phase::Running {
					self.phase = Phase::Stopping;
					self.lifecycle(ctx, Signal::Stopping).await;
				}
				Ok(())
			}
			Event::Signal(Signal::Stopped) => {
				if self.phase == Phase::Stopping {
					self.lifecycle(ctx, Signal::Stopped).await;
				}
				self.phase = Phase::Stopped;
				self.release(ctx);
				Ok(())
			}
			Event::Message(message) => self.message(ctx, message).await,
		}
	}
}

/// Starts an application's children in order under `strategy`.
async fn start_children(
	engine: &Engine,
	id: &BehaviorId,
	owner: &Weak<ServerShared>,
	ctx: &mut Context,
	strategy: SupervisorStrategy,
	children: Vec<SpawnSpec>,
) -> Result<(), StartError> {
	ctx.set_child_strategy(strategy);
	for spec in children {
		let child_id = spec.id().clone();
		let child = engine.start_child(&*ctx, spec).await.map_err(|source| StartError::Child {
			parent: id.clone(),
			child: child_id.clone(),
			source: Box::new(source),
		})?;
		tracing::debug!(app = %id, child = %child_id, pid = ?child.server().pid(), "bosun.app.child");
		if let Some(owner) = owner.upgrade() {
			owner.push_child(child);
		}
	}
	Ok(())
}
