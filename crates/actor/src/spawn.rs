use std::future::Future;
use std::sync::LazyLock;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::{JoinError, JoinHandle};

/// Hosts processes spawned from plain threads, e.g. a synchronous `main`
/// building its system before entering a runtime.
static DETACHED: LazyLock<Runtime> = LazyLock::new(|| {
	Builder::new_multi_thread()
		.enable_all()
		.worker_threads(2)
		.thread_name("bosun-detached")
		.build()
		.unwrap_or_else(|err| panic!("cannot host bosun processes outside tokio: {err}"))
});

/// Spawns one process task on the ambient runtime, or on the
/// detached runtime when called from outside any tokio context.
pub(crate) fn spawn_task<F>(process: &str, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	match Handle::try_current() {
		Ok(handle) => {
			tracing::trace!(process, "bosun.task.spawn");
			handle.spawn(fut)
		}
		Err(_) => {
			tracing::trace!(process, detached = true, "bosun.task.spawn");
			DETACHED.spawn(fut)
		}
	}
}

/// Extracts the panic payload message from a join error, if it was a panic.
pub(crate) fn panic_message(err: JoinError) -> Option<String> {
	let payload = err.try_into_panic().ok()?;
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	if let Some(msg) = payload.downcast_ref::<String>() {
		return Some(msg.clone());
	}
	Some("non-string panic payload".to_string())
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
