//! Error types.
//!
//! Errors are split the way they are handled: a [`CriticalError`] ends the program and surfaces at
//! the entry point, a [`RuntimeError`] is contained where it happens and only ever logged.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::watcher::WatcherKind;

/// Errors which are not recoverable and stop runr.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum CriticalError {
	/// The filesystem watcher could not be created.
	#[error("fs: cannot initialise {kind:?} watcher")]
	#[diagnostic(code(runr::critical::fs_watcher_init))]
	FsWatcherInit {
		/// The kind of watcher.
		kind: WatcherKind,

		/// The error which occurred.
		#[source]
		err: FsWatcherError,
	},

	/// A directory could not be registered with the filesystem watcher.
	#[error("fs: cannot watch {path:?}")]
	#[diagnostic(code(runr::critical::fs_watch_path))]
	FsWatchPath {
		/// The directory that was refused.
		path: PathBuf,

		/// The underlying error.
		#[source]
		err: notify::Error,
	},

	/// A directory given on the command line could not be resolved.
	#[error("cannot resolve watch directory {path:?}")]
	#[diagnostic(
		code(runr::critical::canonicalize),
		help("check that the directory exists and is readable")
	)]
	Canonicalize {
		/// The path as given.
		path: PathBuf,

		/// The I/O error which occurred.
		#[source]
		err: std::io::Error,
	},

	/// No command was given.
	#[error("require commands to run")]
	#[diagnostic(
		code(runr::critical::no_command),
		help("pass the command after the options, e.g. `runr -w src -- cargo test`")
	)]
	NoCommand,

	/// A critical I/O error occurred.
	#[error("io({about}): {err}")]
	#[diagnostic(code(runr::critical::io_error))]
	IoError {
		/// What it was about.
		about: &'static str,

		/// The I/O error which occurred.
		#[source]
		err: std::io::Error,
	},
}

/// Errors which are reported to the user but never stop the supervisor.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum RuntimeError {
	/// An error event emitted by the filesystem watcher, like a queue overflow.
	#[error("fs watcher error: {0}")]
	#[diagnostic(code(runr::runtime::fs_watcher))]
	FsWatcher(#[source] notify::Error),

	/// The command could not be launched.
	#[error("cannot launch `{command}`: {err}")]
	#[diagnostic(
		code(runr::runtime::launch),
		help("fix the command and save a watched file to try again")
	)]
	Launch {
		/// The command line, for display.
		command: String,

		/// The I/O error from the OS.
		#[source]
		err: std::io::Error,
	},

	/// Waiting on a launched process failed.
	#[error("when waiting on process: {0}")]
	#[diagnostic(code(runr::runtime::wait))]
	Wait(#[source] std::io::Error),
}

/// Specialised error for filesystem watcher initialisation.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum FsWatcherError {
	/// Generic watcher error.
	#[error("failed to create: {0}")]
	#[diagnostic(code(runr::fs_watcher::create))]
	Create(#[source] notify::Error),

	/// Hit the inotify watch limit.
	#[error("OS limit on number of inotify watches reached: {0}")]
	#[diagnostic(
		code(runr::fs_watcher::too_many_watches),
		help("you will want to increase your inotify.max_user_watches, see inotify(7) and https://watchexec.github.io/docs/inotify-limits.html")
	)]
	TooManyWatches(#[source] notify::Error),

	/// Hit the open file limit.
	#[error("OS limit on open file handles reached: {0}")]
	#[diagnostic(
		code(runr::fs_watcher::too_many_handles),
		help("you will want to increase your `nofile` limit, see pam_limits(8)")
	)]
	TooManyHandles(#[source] notify::Error),
}

impl FsWatcherError {
	pub(crate) fn classify(err: notify::Error) -> Self {
		if cfg!(target_os = "linux")
			&& (matches!(err.kind, notify::ErrorKind::MaxFilesWatch)
				|| matches!(err.kind, notify::ErrorKind::Io(ref ioerr) if ioerr.raw_os_error() == Some(28)))
		{
			Self::TooManyWatches(err)
		} else if cfg!(target_os = "linux")
			&& matches!(err.kind, notify::ErrorKind::Io(ref ioerr) if ioerr.raw_os_error() == Some(24))
		{
			Self::TooManyHandles(err)
		} else {
			Self::Create(err)
		}
	}
}
