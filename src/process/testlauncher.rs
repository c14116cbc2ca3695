use std::{
	io::{Error, ErrorKind, Result},
	path::Path,
	sync::{Arc, Mutex},
};

use crate::command::CommandSpec;

use super::{CancelHandle, Cancellation, Completer, Completion, InstanceEnd, Launched, Launcher};

/// Mock launcher which records what it is asked to do instead of spawning anything.
///
/// Launching `/does/not/exist` fails with `NotFound`, everything else succeeds.
#[derive(Debug, Clone, Default)]
pub struct TestLauncher {
	pub calls: Arc<Mutex<Vec<TestLaunchCall>>>,
	instances: Arc<Mutex<Vec<TestInstance>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestLaunchCall {
	Launch {
		command: String,
		/// Whether the previously launched instance had been asked to terminate by then.
		previous_cancelled: bool,
	},
	Refused {
		command: String,
	},
}

#[derive(Debug)]
struct TestInstance {
	cancellation: Cancellation,
	completer: Option<Completer>,
}

impl TestLauncher {
	pub fn calls(&self) -> Vec<TestLaunchCall> {
		self.calls.lock().expect("calls lock").clone()
	}

	pub fn launches(&self) -> usize {
		self.calls()
			.iter()
			.filter(|call| matches!(call, TestLaunchCall::Launch { .. }))
			.count()
	}

	/// Whether the nth successfully launched instance has been asked to terminate.
	pub fn cancelled(&self, n: usize) -> bool {
		self.instances.lock().expect("instances lock")[n]
			.cancellation
			.is_requested()
	}

	/// Make the nth instance exit on its own.
	pub fn finish(&self, n: usize, end: InstanceEnd) {
		if let Some(completer) = self.instances.lock().expect("instances lock")[n]
			.completer
			.take()
		{
			completer.complete(end);
		}
	}
}

impl Launcher for TestLauncher {
	fn launch(&self, command: &CommandSpec) -> Result<Launched> {
		let display = command.to_string();
		if command.program == Path::new("/does/not/exist") {
			self.calls
				.lock()
				.expect("calls lock")
				.push(TestLaunchCall::Refused { command: display });
			return Err(Error::new(ErrorKind::NotFound, "file not found"));
		}

		let mut instances = self.instances.lock().expect("instances lock");
		let previous_cancelled = instances
			.last_mut()
			.map_or(true, |last| last.cancellation.is_requested());

		let (cancel, cancellation) = CancelHandle::new();
		let (completer, completion) = Completion::channel();
		instances.push(TestInstance {
			cancellation,
			completer: Some(completer),
		});

		self.calls.lock().expect("calls lock").push(TestLaunchCall::Launch {
			command: display,
			previous_cancelled,
		});

		Ok(Launched {
			pid: None,
			cancel,
			completion,
		})
	}
}
