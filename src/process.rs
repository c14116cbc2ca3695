//! Launching processes, cancelling them, and learning how they ended.
//!
//! The [`Launcher`] trait is the seam between the supervisor and the OS: given a
//! [`CommandSpec`], it starts a process and hands back a [`Launched`], made of a [`CancelHandle`]
//! which requests termination and a [`Completion`] which resolves once the process has been
//! reaped. [`ProcessLauncher`] is the implementation backed by real processes.

use std::{
	fmt,
	num::{NonZeroI32, NonZeroI64},
	process::ExitStatus,
};

use tokio::{
	process::Child,
	select,
	sync::{oneshot, watch},
};
use tracing::{debug, error, info, trace, warn};

use crate::{command::CommandSpec, error::RuntimeError};

#[cfg(test)]
pub(crate) use self::testlauncher::{TestLaunchCall, TestLauncher};

#[cfg(test)]
mod testlauncher;

/// The end status of a process.
///
/// A structured, portable take on [`std::process::ExitStatus`]. The "success" value is zero on
/// all platforms, so it gets its own variant and the others use `NonZero` types.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ProcessEnd {
	/// The process ended successfully, with exit status = 0.
	Success,

	/// The process exited with a non-zero exit status.
	ExitError(NonZeroI64),

	/// The process exited due to a signal.
	ExitSignal(i32),

	/// The process was stopped (but not terminated).
	ExitStop(NonZeroI32),

	/// The process suffered an unhandled exception (typically Windows only).
	Exception(NonZeroI32),

	/// The process was continued.
	Continued,
}

impl From<ExitStatus> for ProcessEnd {
	#[cfg(unix)]
	fn from(status: ExitStatus) -> Self {
		use std::os::unix::process::ExitStatusExt;

		if let Some(code) = status.code() {
			return NonZeroI64::new(code.into()).map_or(Self::Success, Self::ExitError);
		}

		if status.continued() {
			return Self::Continued;
		}

		if let Some(sig) = status.stopped_signal().and_then(NonZeroI32::new) {
			return Self::ExitStop(sig);
		}

		status.signal().map_or(Self::Success, Self::ExitSignal)
	}

	#[cfg(windows)]
	fn from(status: ExitStatus) -> Self {
		// NTSTATUS codes have the high bit set
		match status.code().and_then(NonZeroI32::new) {
			None => Self::Success,
			Some(code) if code.get() < 0 => Self::Exception(code),
			Some(code) => Self::ExitError(code.into()),
		}
	}
}

impl fmt::Display for ProcessEnd {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Success => write!(f, "exited successfully"),
			Self::ExitError(code) => write!(f, "exited with status {code}"),
			Self::ExitSignal(sig) => write!(f, "killed by signal {sig}"),
			Self::ExitStop(sig) => write!(f, "stopped by signal {sig}"),
			Self::Exception(code) => write!(f, "raised exception {code:#x}"),
			Self::Continued => write!(f, "continued"),
		}
	}
}

/// How a launched instance came to be reaped.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum InstanceEnd {
	/// The instance was terminated because its [`CancelHandle`] fired (or was dropped).
	///
	/// This is the expected outcome during a restart and is not an error.
	Canceled,

	/// The process exited on its own, successfully or not.
	Exited(ProcessEnd),

	/// The outcome could not be determined: waiting on the process failed, or whatever was
	/// watching it went away.
	Unknown,
}

impl InstanceEnd {
	/// Whether this end is worth reporting as a failure.
	pub const fn is_failure(self) -> bool {
		!matches!(self, Self::Canceled | Self::Exited(ProcessEnd::Success))
	}
}

/// An owned, single-use capability to request termination of one launched process.
///
/// Firing the handle is idempotent: only the first [`cancel`](Self::cancel) does anything.
/// Dropping a handle which was never fired is treated by the receiving side as a cancellation too,
/// so a process never outlives the last handle to it.
#[derive(Debug)]
pub struct CancelHandle(Option<oneshot::Sender<()>>);

/// The receiving side of a [`CancelHandle`], held by whatever supervises the process.
#[derive(Debug)]
pub struct Cancellation(oneshot::Receiver<()>);

impl CancelHandle {
	/// Create a handle and its matching [`Cancellation`].
	pub fn new() -> (Self, Cancellation) {
		let (tx, rx) = oneshot::channel();
		(Self(Some(tx)), Cancellation(rx))
	}

	/// Request termination.
	///
	/// Returns `true` the first time, `false` on all subsequent calls.
	pub fn cancel(&mut self) -> bool {
		if let Some(tx) = self.0.take() {
			// the receiver may have gone already if the process exited on its own
			tx.send(()).ok();
			true
		} else {
			false
		}
	}

	/// Whether [`cancel`](Self::cancel) has been called.
	pub const fn is_cancelled(&self) -> bool {
		self.0.is_none()
	}
}

impl Cancellation {
	/// Resolves when the handle fires or is dropped.
	///
	/// This is cancel-safe.
	pub async fn requested(&mut self) {
		(&mut self.0).await.ok();
	}

	/// Check without waiting whether termination was requested.
	pub fn is_requested(&mut self) -> bool {
		!matches!(self.0.try_recv(), Err(oneshot::error::TryRecvError::Empty))
	}
}

/// The sending side of a [`Completion`].
#[derive(Debug)]
pub struct Completer(watch::Sender<Option<InstanceEnd>>);

impl Completer {
	/// Mark the instance as reaped.
	pub fn complete(self, end: InstanceEnd) {
		self.0.send_replace(Some(end));
	}
}

/// Resolves once a launched instance has been reaped, with how it ended.
///
/// Completions can be cloned and awaited from several places.
#[derive(Clone, Debug)]
pub struct Completion(watch::Receiver<Option<InstanceEnd>>);

impl Completion {
	/// Create a completion and its [`Completer`].
	pub fn channel() -> (Completer, Self) {
		let (tx, rx) = watch::channel(None);
		(Completer(tx), Self(rx))
	}

	/// How the instance ended, if it has been reaped yet.
	pub fn peek(&self) -> Option<InstanceEnd> {
		*self.0.borrow()
	}

	/// Wait for the instance to be reaped.
	///
	/// If the [`Completer`] is dropped without completing, this resolves to
	/// [`InstanceEnd::Unknown`]. This is cancel-safe.
	pub async fn wait(&mut self) -> InstanceEnd {
		let end = match self.0.wait_for(Option::is_some).await {
			Ok(end) => *end,
			Err(_) => None,
		};

		end.or_else(|| self.peek()).unwrap_or(InstanceEnd::Unknown)
	}
}

/// What a [`Launcher`] hands back for a successfully launched process.
#[derive(Debug)]
pub struct Launched {
	/// The OS process ID, if known.
	pub pid: Option<u32>,

	/// Requests termination of the process.
	pub cancel: CancelHandle,

	/// Resolves once the process is reaped.
	pub completion: Completion,
}

/// Something which can start a [`CommandSpec`].
///
/// Launching must not wait for the process to exit: it returns as soon as the OS has accepted
/// the launch request. The process is then watched in the background until it is reaped.
pub trait Launcher {
	/// Launch the command.
	///
	/// An error means nothing was started.
	fn launch(&self, command: &CommandSpec) -> std::io::Result<Launched>;
}

/// Launches real processes on the Tokio runtime.
///
/// Each launched process gets a small reaper task which waits for it to exit or for its
/// [`CancelHandle`] to fire, terminates it in the latter case, and then logs how it ended. Must
/// be used from within a Tokio runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
	fn launch(&self, command: &CommandSpec) -> std::io::Result<Launched> {
		let mut child = command.to_spawnable().spawn()?;
		let pid = child.id();
		let grouped = command.grouped;
		let cmdline = command.to_string();
		debug!(command=%cmdline, ?pid, "process spawned");

		let (cancel, mut cancellation) = CancelHandle::new();
		let (completer, completion) = Completion::channel();

		tokio::spawn(async move {
			let end = select! {
				status = child.wait() => match status {
					Ok(status) => InstanceEnd::Exited(status.into()),
					Err(err) => {
						error!(command=%cmdline, err=%RuntimeError::Wait(err), "lost track of process");
						InstanceEnd::Unknown
					}
				},
				() = cancellation.requested() => {
					terminate(&mut child, pid, grouped);
					match child.wait().await {
						Ok(status) => trace!(?status, "canceled process reaped"),
						Err(err) => warn!(command=%cmdline, err=%RuntimeError::Wait(err), "canceled process could not be reaped"),
					}
					InstanceEnd::Canceled
				}
			};

			report(&cmdline, end);
			completer.complete(end);
		});

		Ok(Launched {
			pid,
			cancel,
			completion,
		})
	}
}

fn terminate(child: &mut Child, pid: Option<u32>, grouped: bool) {
	#[cfg(unix)]
	if grouped {
		use nix::{
			sys::signal::{killpg, Signal},
			unistd::Pid,
		};

		if let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
			trace!(pgid, "killing process group");
			match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
				Ok(()) => return,
				Err(err) => debug!(pgid, %err, "killpg failed, falling back to killing the leader"),
			}
		}
	}

	#[cfg(not(unix))]
	let _ = (pid, grouped);

	if let Err(err) = child.start_kill() {
		debug!(%err, "process was already gone");
	}
}

/// Log how an instance ended, keeping cancellations out of the error stream.
pub(crate) fn report(command: &str, end: InstanceEnd) {
	match end {
		InstanceEnd::Canceled => info!(%command, "process terminated"),
		InstanceEnd::Exited(ProcessEnd::Success) => info!(%command, "process finished"),
		InstanceEnd::Exited(status) => warn!(%command, %status, "process failed"),
		InstanceEnd::Unknown => warn!(%command, "process ended in an unknown way"),
	}
}
