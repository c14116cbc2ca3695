//! The single-occupancy process slot.

use std::{fmt, future::pending};

use tracing::{debug, error, info, trace};

use crate::{
	command::CommandSpec,
	error::RuntimeError,
	process::{CancelHandle, Completion, InstanceEnd, Launcher},
};


/// Identifies one launch within a [`ProcessSlot`].
///
/// Ids increase monotonically, so a higher id is always a later launch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl fmt::Display for InstanceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// The live state of one launched child process.
///
/// This is owned exclusively by the [`ProcessSlot`] while it is current. Once it has been
/// cancelled or has exited, it is dropped and its handle released.
#[derive(Debug)]
pub struct RunningInstance {
	id: InstanceId,
	pid: Option<u32>,
	cancel: CancelHandle,
	completion: Completion,
}

impl RunningInstance {
	/// Which launch this is.
	pub const fn id(&self) -> InstanceId {
		self.id
	}
}

/// Holds at most one [`RunningInstance`].
///
/// All methods take `&mut self`: the slot is driven from a single control loop, which is what
/// keeps its bookkeeping consistent without any locking. Starting never waits for the process to
/// exit, and stopping never waits for it to be reaped; cancelled instances finish tearing down in
/// the background.
#[derive(Debug)]
pub struct ProcessSlot<L> {
	launcher: L,
	current: Option<RunningInstance>,
	launched: u64,
}

impl<L: Launcher> ProcessSlot<L> {
	/// An empty slot which will launch processes with `launcher`.
	pub const fn new(launcher: L) -> Self {
		Self {
			launcher,
			current: None,
			launched: 0,
		}
	}

	/// The launcher in use.
	pub const fn launcher(&self) -> &L {
		&self.launcher
	}

	/// The current instance, if any.
	pub const fn current(&self) -> Option<&RunningInstance> {
		self.current.as_ref()
	}

	/// Whether an instance is current.
	pub const fn is_running(&self) -> bool {
		self.current.is_some()
	}

	/// Launch the command.
	///
	/// Calling this while an instance is already current is a caller bug, but it is handled the
	/// same way as a [`restart`](Self::restart) so that no handle is ever leaked.
	///
	/// A launch failure is logged and leaves the slot empty.
	pub fn start(&mut self, command: &CommandSpec) {
		if let Some(instance) = self.current.take() {
			debug!(id=%instance.id, "start called with a live instance, cancelling it first");
			Self::cancel(instance);
		}

		self.launch(command);
	}

	/// Cancel the current instance, if any, then launch the command afresh.
	///
	/// The old instance is only asked to terminate; its teardown is not awaited.
	pub fn restart(&mut self, command: &CommandSpec) {
		if let Some(instance) = self.current.take() {
			info!(id=%instance.id, "terminated current process due to change in file");
			Self::cancel(instance);
		}

		self.launch(command);
	}

	/// Cancel the current instance, if any.
	///
	/// This is idempotent.
	pub fn stop(&mut self) {
		match self.current.take() {
			Some(instance) => Self::cancel(instance),
			None => trace!("nothing to stop"),
		}
	}

	/// Wait for the current instance to end on its own.
	///
	/// Never resolves while the slot is empty. This only ever looks at the current instance, so
	/// ends of superseded instances are never observed here. Cancel-safe.
	pub async fn exited(&mut self) -> (InstanceId, InstanceEnd) {
		match self.current.as_mut() {
			Some(instance) => (instance.id, instance.completion.wait().await),
			None => pending().await,
		}
	}

	/// Release the instance `id` after it ended.
	///
	/// If `id` is no longer current, this is a stale notification and is discarded.
	pub fn reap(&mut self, id: InstanceId, end: InstanceEnd) {
		match &self.current {
			Some(instance) if instance.id == id => {
				debug!(%id, ?end, "current instance reaped, slot is empty");
				self.current = None;
			}
			_ => trace!(%id, ?end, "discarding end of a superseded instance"),
		}
	}

	fn launch(&mut self, command: &CommandSpec) {
		self.launched += 1;
		let id = InstanceId(self.launched);
		info!(%command, %id, "running");

		match self.launcher.launch(command) {
			Ok(launched) => {
				self.current = Some(RunningInstance {
					id,
					pid: launched.pid,
					cancel: launched.cancel,
					completion: launched.completion,
				});
			}
			Err(err) => {
				let err = RuntimeError::Launch {
					command: command.to_string(),
					err,
				};
				error!(%id, "{err}");
			}
		}
	}

	fn cancel(mut instance: RunningInstance) {
		if instance.cancel.cancel() {
			debug!(id=%instance.id, pid=?instance.pid, "cancellation requested");
		}
	}
}
