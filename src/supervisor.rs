//! The watch-and-restart control loop.

use tokio::{select, sync::oneshot};
use tracing::{debug, info, trace, warn};

use crate::{
	command::CommandSpec,
	error::CriticalError,
	process::Launcher,
	slot::ProcessSlot,
	watcher::{ChangeSource, WatchSpec},
};


/// Request to terminate the whole supervisor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownSignal;

/// Owns a [`ChangeSource`] and a [`ProcessSlot`], and restarts the command on every change.
///
/// There's no debouncing: a burst of N changes causes N restarts, each cancelling the previous
/// instance, and the instance left running is the one for the last change.
#[derive(Debug)]
pub struct Supervisor<S, L> {
	source: S,
	slot: ProcessSlot<L>,
}

impl<S: ChangeSource, L: Launcher> Supervisor<S, L> {
	/// A supervisor which will watch with `source` and launch with `launcher`.
	pub const fn new(source: S, launcher: L) -> Self {
		Self {
			source,
			slot: ProcessSlot::new(launcher),
		}
	}

	/// The change source.
	pub const fn source(&self) -> &S {
		&self.source
	}

	/// The process slot.
	pub const fn slot(&self) -> &ProcessSlot<L> {
		&self.slot
	}

	/// Run until shutdown.
	///
	/// Launches `command`, opens the change source over `spec`, then waits for whichever comes
	/// first of a change (restart the command), the current instance ending on its own (empty the
	/// slot), or a shutdown (close the source, stop the command, return). A dropped shutdown sender
	/// counts as a shutdown.
	///
	/// The only error is failing to open the change source, which is fatal.
	pub async fn run(
		&mut self,
		spec: &WatchSpec,
		command: &CommandSpec,
		mut shutdown: oneshot::Receiver<ShutdownSignal>,
	) -> Result<(), CriticalError> {
		self.slot.start(command);

		if let Err(err) = self.source.open(spec) {
			self.slot.stop();
			return Err(err);
		}

		info!(dirs=?spec.dirs(), "watching for changes");

		let mut events_open = true;
		loop {
			select! {
				event = self.source.events().recv(), if events_open => match event {
					Some(event) => {
						debug!(path=?event.path, "restarting on change");
						self.slot.restart(command);
					}
					None => {
						warn!("change source closed, no more restarts will happen");
						events_open = false;
					}
				},
				(id, end) = self.slot.exited() => {
					trace!(%id, ?end, "current instance ended on its own");
					self.slot.reap(id, end);
				}
				signal = &mut shutdown => {
					debug!(?signal, "shutting down");
					self.source.close();
					self.slot.stop();
					return Ok(());
				}
			}
		}
	}
}
