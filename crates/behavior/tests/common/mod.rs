#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}

pub fn log() -> Log {
	Arc::new(Mutex::new(Vec::new()))
}

pub fn record(log: &Log, entry: impl Into<String>) {
	log.lock().push(entry.into());
}

pub fn entries(log: &Log) -> Vec<String> {
	log.lock().clone()
}

/// Polls `check` until it holds or a second of (possibly paused) time passed.
pub async fn eventually(mut check: impl FnMut() -> bool) {
	for _ in 0..100 {
		if check() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("condition not reached in time");
}
