mod common;

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bosun_actor::{ActorSystem, Message, ProcessRef, RequestError, RestartType, SupervisorStrategy, SystemConfig};
use bosun_behavior::{
	BehaviorContext, Engine, EngineConfig, Forward, InitArgs, Lifecycle, ReceiveTimeout, Registry, Reply, RespondPolicy, ServerBehavior, ServerError,
	SpawnSpec, StartError, StartFailurePolicy, TimeoutReceiver,
};
use common::{Log, entries, eventually, init_tracing, log, record};
use pretty_assertions::assert_eq;

#[derive(Debug)]
enum Cmd {
	Echo(&'static str),
	Ignore,
	Note(&'static str),
	Hold,
	Crash,
	Panic,
	Relay { to: Option<ProcessRef>, policy: RespondPolicy },
}

/// Echoes with a prefix taken from its init args and records its lifecycle.
struct Echo {
	log: Log,
	prefix: String,
	slow_start: Option<Duration>,
	fail_start: bool,
	/// Fail every `on_started` after the first incarnation.
	fail_restart: bool,
}

impl Echo {
	fn new(log: &Log) -> Self {
		Self {
			log: log.clone(),
			prefix: "echo".to_string(),
			slow_start: None,
			fail_start: false,
			fail_restart: false,
		}
	}
}

#[async_trait]
impl Lifecycle for Echo {
	async fn on_started(&mut self, ctx: &mut BehaviorContext<'_>, args: &InitArgs) -> anyhow::Result<()> {
		if let Some(prefix) = args.get::<String>() {
			self.prefix.clone_from(prefix);
		}
		if let Some(delay) = self.slow_start {
			tokio::time::sleep(delay).await;
		}
		if self.fail_start || (self.fail_restart && ctx.incarnation() > 1) {
			record(&self.log, "start_failed");
			return Err(anyhow!("no database"));
		}
		record(&self.log, format!("started#{}", ctx.incarnation()));
		Ok(())
	}

	async fn on_post_started(&mut self, _ctx: &mut BehaviorContext<'_>, _args: &InitArgs) -> anyhow::Result<()> {
		record(&self.log, "post_started");
		Ok(())
	}

	async fn on_restarting(&mut self, _ctx: &mut BehaviorContext<'_>) {
		record(&self.log, "restarting");
	}

	async fn on_stopping(&mut self, _ctx: &mut BehaviorContext<'_>) {
		record(&self.log, "stopping");
	}

	async fn on_stopped(&mut self, _ctx: &mut BehaviorContext<'_>) {
		record(&self.log, "stopped");
	}
}

#[async_trait]
impl ServerBehavior for Echo {
	async fn on_message(&mut self, _ctx: &mut BehaviorContext<'_>, message: Message) -> anyhow::Result<Reply> {
		let cmd = match message.downcast::<Cmd>() {
			Ok(cmd) => cmd,
			Err(other) => match other.downcast::<String>() {
				Ok(reply) => {
					record(&self.log, format!("reply:{reply}"));
					return Ok(Reply::NoReply);
				}
				Err(other) => return Err(anyhow!("unexpected {}", other.type_name())),
			},
		};
		Ok(match cmd {
			Cmd::Echo(text) => Reply::respond(format!("{}:{text}", self.prefix)),
			Cmd::Ignore => Reply::NoReply,
			Cmd::Note(note) => {
				record(&self.log, note);
				Reply::NoReply
			}
			Cmd::Hold => {
				record(&self.log, "hold");
				tokio::time::sleep(Duration::from_secs(60)).await;
				Reply::NoReply
			}
			Cmd::Crash => return Err(anyhow!("boom")),
			Cmd::Panic => panic!("echo handler panicked"),
			Cmd::Relay { to, policy } => Forward::new(to, Cmd::Echo("m2")).respond(policy).into(),
		})
	}
}

/// Server with the timeout capability.
struct Idle {
	log: Log,
}

#[async_trait]
impl Lifecycle for Idle {}

#[async_trait]
impl ServerBehavior for Idle {
	async fn on_message(&mut self, _ctx: &mut BehaviorContext<'_>, _message: Message) -> anyhow::Result<Reply> {
		record(&self.log, "message");
		Ok(Reply::NoReply)
	}

	fn timeout_receiver(&mut self) -> Option<&mut dyn TimeoutReceiver> {
		Some(self)
	}
}

#[async_trait]
impl TimeoutReceiver for Idle {
	async fn on_timeout(&mut self, _ctx: &mut BehaviorContext<'_>) -> anyhow::Result<()> {
		record(&self.log, "timeout");
		Ok(())
	}
}

fn engine(log: &Log) -> Engine {
	engine_with(log, EngineConfig::default())
}

fn engine_with(log: &Log, config: EngineConfig) -> Engine {
	let (echo, slow, broken, flaky, idle) = (log.clone(), log.clone(), log.clone(), log.clone(), log.clone());
	let registry = Registry::builder()
		.server("echo", move || Echo::new(&echo))
		.server("slow", move || Echo {
			slow_start: Some(Duration::from_secs(60)),
			..Echo::new(&slow)
		})
		.server("broken", move || Echo {
			fail_start: true,
			..Echo::new(&broken)
		})
		.server("flaky", move || Echo {
			fail_restart: true,
			..Echo::new(&flaky)
		})
		.server("idle", move || Idle { log: idle.clone() })
		.build()
		.unwrap();
	Engine::with_config(registry, config)
}

#[tokio::test]
async fn start_waits_for_on_started() {
	init_tracing();
	let log = log();
	let system = ActorSystem::new();
	let server = engine(&log).start(&system, "echo").await.unwrap();

	assert_eq!(entries(&log)[0], "started#1");
	assert!(server.pid().is_some());
	assert!(server.is_running());
	assert!(server.has_delegate());
	assert_eq!(server.call::<String, _>(Cmd::Echo("hi")).await.unwrap(), "echo:hi");
	system.shutdown().await;
}

#[tokio::test]
async fn init_args_reach_on_started() {
	let log = log();
	let system = ActorSystem::new();
	let spec = SpawnSpec::new("echo").arg("custom".to_string());
	let server = engine(&log).start_spec(&system, spec).await.unwrap();

	assert_eq!(server.init_args().get::<String>().map(String::as_str), Some("custom"));
	assert_eq!(server.call::<String, _>(Cmd::Echo("hi")).await.unwrap(), "custom:hi");
	system.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn readiness_timeout_leaves_process_running() {
	let log = log();
	let system = ActorSystem::new();
	let spec = SpawnSpec::new("slow").spawn_timeout(Duration::from_millis(100));
	let err = engine(&log).start_spec(&system, spec).await.unwrap_err();

	assert!(matches!(err, StartError::ReadinessTimeout { ref id, timeout } if id == "slow" && timeout == Duration::from_millis(100)));
	assert_eq!(system.roots().len(), 1);
	assert!(system.roots()[0].is_alive());
	system.shutdown().await;
}

#[tokio::test]
async fn no_wait_returns_before_on_started() {
	let log = log();
	let system = ActorSystem::new();
	let server = engine(&log).start_spec(&system, SpawnSpec::new("slow").no_wait()).await.unwrap();

	assert!(server.pid().is_some());
	assert!(entries(&log).is_empty());
	system.shutdown().await;
}

#[tokio::test]
async fn failed_init_is_reported_and_process_stopped() {
	let log = log();
	let system = ActorSystem::new();
	let err = engine(&log).start(&system, "broken").await.unwrap_err();

	match err {
		StartError::InitFailed { id, reason } => {
			assert_eq!(id, "broken");
			assert_eq!(reason, "no database");
		}
		other => panic!("expected InitFailed, got {other:?}"),
	}
	eventually(|| system.roots().is_empty()).await;
}

#[tokio::test]
async fn failure_seen_by_the_starter_is_not_retried() {
	let log = log();
	let system = ActorSystem::new();
	let config = EngineConfig::default().start_failure(StartFailurePolicy::Supervise);
	let err = engine_with(&log, config).start(&system, "broken").await.unwrap_err();

	assert!(matches!(err, StartError::InitFailed { .. }));
	eventually(|| system.roots().is_empty()).await;
	assert_eq!(entries(&log), ["start_failed"]);
}

#[tokio::test]
async fn terminate_policy_stops_on_failed_init() {
	let log = log();
	let system = ActorSystem::new();
	let config = EngineConfig::default().start_failure(StartFailurePolicy::Terminate);
	let err = engine_with(&log, config).start(&system, "broken").await.unwrap_err();

	assert!(matches!(err, StartError::InitFailed { .. }));
	eventually(|| system.roots().is_empty()).await;
	assert_eq!(entries(&log), ["start_failed"]);
}

#[tokio::test]
async fn unknown_and_mismatched_behaviors_are_refused() {
	let log = log();
	let system = ActorSystem::new();
	let engine = engine(&log);

	assert!(matches!(engine.start(&system, "ghost").await, Err(StartError::NotRegistered(id)) if id == "ghost"));
	assert!(matches!(
		engine.start_application(&system, "echo").await,
		Err(StartError::WrongProducerKind { id, .. }) if id == "echo"
	));
	assert!(system.roots().is_empty());
}

#[tokio::test]
async fn spawn_errors_pass_through() {
	let log = log();
	let system = ActorSystem::new();
	system.shutdown().await;

	assert!(matches!(engine(&log).start(&system, "echo").await, Err(StartError::Spawn(_))));
}

#[tokio::test(start_paused = true)]
async fn no_reply_sends_nothing_back() {
	let log = log();
	let system = ActorSystem::new();
	let server = engine(&log).start(&system, "echo").await.unwrap();

	let reply = server.request_future(Cmd::Ignore, Duration::from_millis(200)).await.unwrap();
	assert!(matches!(reply.wait().await, Err(RequestError::Timeout(_))));
	system.shutdown().await;
}

#[tokio::test]
async fn forward_answers_the_original_sender() {
	let log = log();
	let system = ActorSystem::new();
	let engine = engine(&log);
	let relay = engine.start_spec(&system, SpawnSpec::new("echo").arg("relay".to_string())).await.unwrap();
	let target = engine.start(&system, "echo").await.unwrap();

	let reply = relay
		.call::<String, _>(Cmd::Relay {
			to: target.process(),
			policy: RespondPolicy::OriginalSender,
		})
		.await
		.unwrap();

	assert_eq!(reply, "echo:m2");
	assert!(!entries(&log).iter().any(|entry| entry.starts_with("reply:")));
	system.shutdown().await;
}

#[tokio::test]
async fn forward_answers_the_handler() {
	let log = log();
	let system = ActorSystem::new();
	let engine = engine(&log);
	let relay = engine.start(&system, "echo").await.unwrap();
	let target = engine.start_spec(&system, SpawnSpec::new("echo").arg("target".to_string())).await.unwrap();

	relay
		.send(Cmd::Relay {
			to: target.process(),
			policy: RespondPolicy::HandlerSelf,
		})
		.await
		.unwrap();

	eventually(|| entries(&log).contains(&"reply:target:m2".to_string())).await;
	system.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn forward_without_target_is_dropped() {
	let log = log();
	let system = ActorSystem::new();
	let relay = engine(&log).start(&system, "echo").await.unwrap();

	let reply = relay
		.request_future(
			Cmd::Relay {
				to: None,
				policy: RespondPolicy::OriginalSender,
			},
			Duration::from_millis(100),
		)
		.await
		.unwrap();
	assert!(matches!(reply.wait().await, Err(RequestError::Timeout(_))));
	assert!(relay.is_running());
	system.shutdown().await;
}

#[tokio::test]
async fn poison_handles_queued_messages_before_stopping() {
	let log = log();
	let system = ActorSystem::new();
	let server = engine(&log).start(&system, "echo").await.unwrap();

	for note in ["m1", "m2", "m3"] {
		server.send(Cmd::Note(note)).await.unwrap();
	}
	server.poison_and_wait().await.unwrap();

	assert_eq!(entries(&log), ["started#1", "post_started", "m1", "m2", "m3", "stopping", "stopped"]);
	assert_eq!(server.pid(), None);
	assert!(!server.has_delegate());
	assert!(matches!(server.send(Cmd::Note("late")).await, Err(ServerError::NotRunning(_))));
}

#[tokio::test]
async fn stop_may_drop_queued_messages() {
	let log = log();
	let system = ActorSystem::new();
	let server = engine(&log).start(&system, "echo").await.unwrap();

	server.send(Cmd::Hold).await.unwrap();
	server.send(Cmd::Note("m1")).await.unwrap();
	eventually(|| entries(&log).contains(&"hold".to_string())).await;
	server.stop_and_wait().await.unwrap();

	let log = entries(&log);
	assert!(!log.contains(&"m1".to_string()));
	assert_eq!(log.last().map(String::as_str), Some("stopped"));
	assert_eq!(server.pid(), None);
}

#[tokio::test]
async fn failed_handler_restarts_behind_the_same_handle() {
	let log = log();
	let system = ActorSystem::new();
	let server = engine(&log).start(&system, "echo").await.unwrap();
	let pid = server.pid();

	server.send(Cmd::Crash).await.unwrap();
	eventually(|| entries(&log).contains(&"started#2".to_string())).await;

	assert_eq!(server.pid(), pid);
	assert!(server.has_delegate());
	assert!(entries(&log).contains(&"restarting".to_string()));
	assert_eq!(server.call::<String, _>(Cmd::Echo("again")).await.unwrap(), "echo:again");
	system.shutdown().await;
}

#[tokio::test]
async fn panicked_process_is_forgotten_by_its_handle() {
	let log = log();
	let system = ActorSystem::new();
	let spec = SpawnSpec::new("echo").restart(RestartType::Temporary);
	let server = engine(&log).start_spec(&system, spec).await.unwrap();
	let process = server.process().unwrap();
	assert!(server.has_delegate());

	server.send(Cmd::Panic).await.unwrap();
	process.terminated().await;

	assert!(!entries(&log).contains(&"stopped".to_string()));
	assert_eq!(server.pid(), None);
	assert!(!server.has_delegate());
	assert!(!server.is_running());
	assert!(matches!(server.send(Cmd::Note("late")).await, Err(ServerError::NotRunning(ref id)) if id == "echo"));
	assert!(matches!(server.stop(), Err(ServerError::NotRunning(_))));
}

#[tokio::test]
async fn exhausted_restarts_are_forgotten_by_the_handle() {
	let log = log();
	let strategy = SupervisorStrategy::one_for_one(2, Duration::from_secs(5));
	let system = ActorSystem::with_config(SystemConfig::default().root_strategy(strategy));
	let server = engine(&log).start(&system, "flaky").await.unwrap();
	let process = server.process().unwrap();

	server.send(Cmd::Crash).await.unwrap();
	process.terminated().await;

	let log = entries(&log);
	assert_eq!(log[..2], ["started#1", "post_started"]);
	assert!(log.contains(&"start_failed".to_string()));
	assert!(!log.contains(&"stopped".to_string()));
	assert_eq!(server.pid(), None);
	assert!(!server.has_delegate());
	assert!(matches!(server.call::<String, _>(Cmd::Echo("late")).await, Err(ServerError::NotRunning(_))));
	assert!(system.roots().is_empty());
}

#[tokio::test(start_paused = true)]
async fn receive_timeout_fires_once_and_keeps_running() {
	let log = log();
	let system = ActorSystem::new();
	let spec = SpawnSpec::new("idle").receive_timeout(ReceiveTimeout::from_millis(100));
	let server = engine(&log).start_spec(&system, spec).await.unwrap();
	assert_eq!(server.receive_timeout(), Some(Duration::from_millis(100)));

	tokio::time::sleep(Duration::from_millis(90)).await;
	assert!(entries(&log).is_empty());

	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(entries(&log), ["timeout"]);

	tokio::time::sleep(Duration::from_millis(500)).await;
	assert_eq!(entries(&log), ["timeout"]);
	assert!(server.is_running());

	server.send(()).await.unwrap();
	tokio::time::sleep(Duration::from_millis(150)).await;
	assert_eq!(entries(&log), ["timeout", "message", "timeout"]);
	system.shutdown().await;
}

#[tokio::test]
async fn receive_timeout_requires_the_capability() {
	let log = log();
	let system = ActorSystem::new();
	let spec = SpawnSpec::new("echo").receive_timeout(ReceiveTimeout::After(Duration::from_millis(100)));
	let err = engine(&log).start_spec(&system, spec).await.unwrap_err();

	assert!(matches!(err, StartError::MissingCapability { ref id, capability } if id == "echo" && capability == "TimeoutReceiver"));
	assert!(entries(&log).is_empty());
	eventually(|| system.roots().is_empty()).await;
}

#[tokio::test]
async fn receive_timeout_inherits_the_engine_default() {
	let log = log();
	let system = ActorSystem::new();
	let engine = engine_with(&log, EngineConfig::default().default_receive_timeout(Some(Duration::from_secs(30))));

	assert!(matches!(engine.start(&system, "echo").await, Err(StartError::MissingCapability { .. })));

	let spec = SpawnSpec::new("echo").receive_timeout(ReceiveTimeout::Disabled);
	let server = engine.start_spec(&system, spec).await.unwrap();
	assert_eq!(server.receive_timeout(), None);

	let idle = engine.start(&system, "idle").await.unwrap();
	assert_eq!(idle.receive_timeout(), Some(Duration::from_secs(30)));
	system.shutdown().await;
}
