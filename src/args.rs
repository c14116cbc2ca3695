//! The command-line interface.

use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueHint};
use notify::RecursiveMode;
use tracing::debug;

use crate::{
	command::CommandSpec,
	error::CriticalError,
	watcher::{WatchSpec, WatcherKind},
};

pub use self::logging::LoggingArgs;

pub mod logging;

const OPTSET_WATCHING: &str = "Watching options";
const OPTSET_COMMAND: &str = "Command options";
const OPTSET_DEBUGGING: &str = "Debugging options";

/// Run any command when files change.
///
/// The command is started once, then killed and started again every time a file in one of the
/// watched directories is written to.
#[derive(Debug, Clone, Parser)]
#[command(name = "runr", author, version, about, long_about = None)]
#[cfg_attr(debug_assertions, command(before_help = "⚠ DEBUG BUILD ⚠"))]
pub struct Args {
	/// Command to run, and restart on changes
	///
	/// Everything after the options is the command: the program, then its arguments, passed as
	/// they are. There's no shell involved, so to use pipes or globs, run a shell explicitly.
	#[arg(
		help_heading = OPTSET_COMMAND,
		trailing_var_arg = true,
		num_args = 1..,
		required = true,
		value_name = "COMMAND",
		value_hint = ValueHint::CommandWithArguments,
	)]
	pub command: Vec<String>,

	/// Watch a specific directory
	///
	/// Can be given several times. Defaults to the current directory.
	#[arg(
		short,
		long,
		help_heading = OPTSET_WATCHING,
		default_value = ".",
		value_hint = ValueHint::DirPath,
		value_name = "DIR",
	)]
	pub watch: Vec<PathBuf>,

	/// Also watch subdirectories
	///
	/// By default, only files directly inside the watched directories are considered.
	#[arg(
		short,
		long,
		help_heading = OPTSET_WATCHING,
	)]
	pub recursive: bool,

	/// Poll for changes instead of using native notifications
	///
	/// Optionally takes the polling interval in milliseconds, as `--poll=MS`. Defaults to 500.
	#[arg(
		long,
		help_heading = OPTSET_WATCHING,
		num_args = 0..=1,
		require_equals = true,
		default_missing_value = "500",
		value_name = "MS",
	)]
	pub poll: Option<u64>,

	/// Don't run the command in its own process group
	///
	/// By default on unix, the command leads a new process group, and the whole group is killed
	/// when it gets restarted. With this, only the command process itself is killed, and anything
	/// it spawned is left running.
	#[arg(
		long,
		help_heading = OPTSET_COMMAND,
	)]
	pub no_process_group: bool,

	#[command(flatten)]
	pub logging: LoggingArgs,
}

impl Args {
	/// The canonicalised, de-duplicated directories to watch.
	pub fn watch_spec(&self) -> Result<WatchSpec, CriticalError> {
		let spec = WatchSpec::resolve(&self.watch)?;
		debug!(dirs=?spec.dirs(), "resolved watch directories");
		Ok(spec)
	}

	/// The command to run.
	pub fn command_spec(&self) -> Result<CommandSpec, CriticalError> {
		let mut command = CommandSpec::from_argv(&self.command).ok_or(CriticalError::NoCommand)?;
		command.grouped = !self.no_process_group;
		debug!(%command, grouped=command.grouped, "resolved command");
		Ok(command)
	}

	/// Which filesystem watcher to use.
	pub fn watcher_kind(&self) -> WatcherKind {
		self.poll.map_or(WatcherKind::Native, |ms| {
			WatcherKind::Poll(Duration::from_millis(ms))
		})
	}

	/// Whether to watch subdirectories.
	pub const fn recursive_mode(&self) -> RecursiveMode {
		if self.recursive {
			RecursiveMode::Recursive
		} else {
			RecursiveMode::NonRecursive
		}
	}
}
