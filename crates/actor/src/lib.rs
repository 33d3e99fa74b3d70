//! Supervised process runtime: bounded mailboxes, lifecycle signals,
//! parent/child supervision and request/response futures.
//!
//! A process is any [`Process`] implementation spawned from [`Props`] through a
//! [`Spawner`]. The [`ActorSystem`] spawns top-level processes; a process
//! [`Context`] spawns children linked to the spawning process, which then
//! stop with it and are restarted according to its [`SupervisorStrategy`].

mod context;
mod future;
mod mailbox;
mod message;
mod process;
mod props;
mod signal;
mod spawn;
mod supervision;
mod system;

pub use context::Context;
pub use future::{ReplyFuture, RequestError, Responder, reply_channel};
pub use mailbox::{Mailbox, SendError};
pub use message::{Message, Sender};
pub use process::{Pid, ProcessRef};
pub use props::Props;
pub use signal::{Event, Process, Signal};
pub use supervision::{RestartType, StrategyKind, SupervisorStrategy};
pub use system::{ActorSystem, DEFAULT_MAILBOX_CAPACITY, SpawnError, Spawner, SystemConfig};
