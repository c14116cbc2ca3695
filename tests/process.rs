#![cfg(unix)]

use std::{io::ErrorKind, num::NonZeroI64, time::Duration};

use runr::{
	command::{CommandSpec, Stream},
	process::{InstanceEnd, Launcher, ProcessEnd, ProcessLauncher},
};
use tokio::time::timeout;

fn quiet(program: &str, args: &[&str]) -> CommandSpec {
	CommandSpec::new(program, args.iter().copied()).with_stdio(Stream::Null)
}

#[tokio::test]
async fn exits_successfully() -> Result<(), std::io::Error> {
	let mut launched = ProcessLauncher.launch(&quiet("true", &[]))?;
	assert!(launched.pid.is_some());

	let end = timeout(Duration::from_secs(5), launched.completion.wait())
		.await
		.expect("true should exit promptly");
	assert_eq!(end, InstanceEnd::Exited(ProcessEnd::Success));
	Ok(())
}

#[tokio::test]
async fn exit_code_is_classified() -> Result<(), std::io::Error> {
	let mut launched = ProcessLauncher.launch(&quiet("sh", &["-c", "exit 3"]))?;

	let end = timeout(Duration::from_secs(5), launched.completion.wait())
		.await
		.expect("sh should exit promptly");
	assert_eq!(
		end,
		InstanceEnd::Exited(ProcessEnd::ExitError(NonZeroI64::new(3).expect("non-zero")))
	);
	Ok(())
}

#[tokio::test]
async fn cancelling_terminates_a_long_running_process() -> Result<(), std::io::Error> {
	let mut launched = ProcessLauncher.launch(&quiet("sleep", &["60"]))?;
	assert_eq!(launched.completion.peek(), None);

	assert!(launched.cancel.cancel());
	let end = timeout(Duration::from_secs(5), launched.completion.wait())
		.await
		.expect("sleep should be killed promptly");
	assert_eq!(end, InstanceEnd::Canceled);
	Ok(())
}

#[tokio::test]
async fn cancelling_a_group_takes_its_children_too() -> Result<(), std::io::Error> {
	// the shell waits on sleep, so it only exits once sleep is gone too
	let mut launched = ProcessLauncher.launch(&quiet("sh", &["-c", "sleep 60; true"]))?;

	launched.cancel.cancel();
	let end = timeout(Duration::from_secs(5), launched.completion.wait())
		.await
		.expect("group should be killed promptly");
	assert_eq!(end, InstanceEnd::Canceled);
	Ok(())
}

#[tokio::test]
async fn dropping_the_handle_cancels() -> Result<(), std::io::Error> {
	let launched = ProcessLauncher.launch(&quiet("sleep", &["60"]))?;
	let mut completion = launched.completion;
	drop(launched.cancel);

	let end = timeout(Duration::from_secs(5), completion.wait())
		.await
		.expect("sleep should be killed promptly");
	assert_eq!(end, InstanceEnd::Canceled);
	Ok(())
}

#[tokio::test]
async fn missing_program_fails_to_launch() {
	let err = ProcessLauncher
		.launch(&quiet("/definitely/not/a/program", &[]))
		.expect_err("nothing to run");
	assert_eq!(err.kind(), ErrorKind::NotFound);
}
