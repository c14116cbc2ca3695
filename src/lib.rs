//! runr: run a command, and restart it whenever watched files are written to.
//!
//! The pieces fit together like this:
//!
//! - a [`ChangeSource`](watcher::ChangeSource) turns filesystem writes into
//!   [`ChangeEvent`](watcher::ChangeEvent)s,
//! - a [`ProcessSlot`](slot::ProcessSlot) holds at most one running instance of the command,
//!   launched through a [`Launcher`](process::Launcher),
//! - the [`Supervisor`](supervisor::Supervisor) restarts the command on every change, until it
//!   receives a [`ShutdownSignal`](supervisor::ShutdownSignal).
//!
//! There is no debouncing: every write restarts the command.

#![warn(clippy::unwrap_used, missing_docs)]
#![deny(rust_2018_idioms)]

use clap::Parser;
use miette::Result;
use tracing::{debug, info, warn};

use crate::{
	args::Args, process::ProcessLauncher, supervisor::Supervisor, watcher::FsChangeSource,
};

pub mod args;
pub mod command;
pub mod error;
pub mod process;
pub mod signal;
pub mod slot;
pub mod supervisor;
pub mod watcher;

/// Run the CLI until shutdown.
///
/// Returns once a shutdown signal has been handled and the command has been stopped, or with the
/// first fatal error.
pub async fn run() -> Result<()> {
	let log_on = args::logging::preargs();
	let args = Args::parse();

	let _log_guard = if log_on {
		warn!("ignoring logging options from args");
		None
	} else {
		Some(args::logging::postargs(&args.logging).await?)
	};

	debug!(version=%env!("CARGO_PKG_VERSION"), ?args, "starting from CLI");

	let spec = args.watch_spec()?;
	let command = args.command_spec()?;
	let shutdown = signal::shutdown_on_signals()?;

	let source = FsChangeSource::new(args.watcher_kind(), args.recursive_mode());
	Supervisor::new(source, ProcessLauncher)
		.run(&spec, &command, shutdown)
		.await?;

	info!("stopped");
	Ok(())
}
