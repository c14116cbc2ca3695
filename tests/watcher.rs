#![cfg(target_os = "linux")]

use std::{fs, time::Duration};

use notify::RecursiveMode;
use runr::watcher::{ChangeSource, FsChangeSource, WatchSpec, WatcherKind};
use tokio::time::{sleep, timeout};

#[tokio::test]
async fn writing_a_file_is_a_change() {
	let dir = tempfile::tempdir().expect("tempdir");
	let file = dir.path().join("watched.txt");
	fs::write(&file, "before").expect("seed file");

	let mut source = FsChangeSource::default();
	source
		.open(&WatchSpec::resolve([dir.path()]).expect("tempdir resolves"))
		.expect("watch tempdir");
	assert!(source.is_open());

	fs::write(&file, "after").expect("write file");

	let event = timeout(Duration::from_secs(5), source.events().recv())
		.await
		.expect("change within timeout")
		.expect("source still open");
	let path = event.path.expect("inotify reports the path");
	assert_eq!(path.file_name(), file.file_name());

	source.close();
}

#[tokio::test]
async fn nothing_is_delivered_after_close() {
	let dir = tempfile::tempdir().expect("tempdir");
	let file = dir.path().join("watched.txt");
	fs::write(&file, "before").expect("seed file");

	let mut source = FsChangeSource::default();
	source
		.open(&WatchSpec::resolve([dir.path()]).expect("tempdir resolves"))
		.expect("watch tempdir");
	source.close();
	assert!(!source.is_open());

	fs::write(&file, "after").expect("write file");
	sleep(Duration::from_millis(100)).await;

	assert_eq!(source.events().recv().await, None);
}

#[tokio::test]
async fn subdirectories_are_ignored_unless_recursive() {
	let dir = tempfile::tempdir().expect("tempdir");
	let nested = dir.path().join("nested");
	fs::create_dir(&nested).expect("subdir");
	let file = nested.join("deep.txt");
	fs::write(&file, "before").expect("seed file");
	let spec = WatchSpec::resolve([dir.path()]).expect("tempdir resolves");

	let mut flat = FsChangeSource::new(WatcherKind::Native, RecursiveMode::NonRecursive);
	flat.open(&spec).expect("watch tempdir");
	let mut deep = FsChangeSource::new(WatcherKind::Native, RecursiveMode::Recursive);
	deep.open(&spec).expect("watch tempdir");

	fs::write(&file, "after").expect("write file");

	let event = timeout(Duration::from_secs(5), deep.events().recv())
		.await
		.expect("recursive source sees the change")
		.expect("source still open");
	let path = event.path.expect("inotify reports the path");
	assert_eq!(path.file_name(), file.file_name());

	assert!(timeout(Duration::from_millis(200), flat.events().recv())
		.await
		.is_err());

	flat.close();
	deep.close();
}

#[tokio::test]
async fn watching_a_missing_directory_is_fatal() {
	let dir = tempfile::tempdir().expect("tempdir");
	let mut source = FsChangeSource::default();

	let result = source.open(&WatchSpec::new([dir.path().join("gone")]));
	assert!(result.is_err());
}
