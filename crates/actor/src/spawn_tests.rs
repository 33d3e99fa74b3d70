use super::panic_message;

#[tokio::test]
async fn extracts_static_str_payload() {
	let handle = tokio::spawn(async { panic!("boom-str") });
	let err = handle.await.unwrap_err();
	let msg = panic_message(err).expect("should be a panic");
	assert!(msg.contains("boom-str"), "expected 'boom-str', got: {msg}");
}

#[tokio::test]
async fn extracts_formatted_payload() {
	let handle = tokio::spawn(async { panic!("process {} failed", 7) });
	let err = handle.await.unwrap_err();
	let msg = panic_message(err).expect("should be a panic");
	assert_eq!(msg, "process 7 failed");
}

#[tokio::test]
async fn returns_none_for_cancellation() {
	let handle = tokio::spawn(async {
		tokio::time::sleep(std::time::Duration::from_secs(60)).await;
	});
	handle.abort();
	let err = handle.await.unwrap_err();
	assert!(panic_message(err).is_none(), "cancelled task should return None");
}

#[test]
fn spawn_task_works_outside_runtime() {
	let handle = super::spawn_task("outside", async { 40 + 2 });
	let value = std::thread::spawn(move || {
		tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()
			.unwrap()
			.block_on(handle)
	})
	.join()
	.unwrap();
	assert_eq!(value.unwrap(), 42);
}
