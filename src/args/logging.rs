//! Diagnostic logging setup.

use std::{env::var, io::stderr, path::PathBuf};

use clap::{ArgAction, Parser, ValueHint};
use miette::{bail, Result};
use tokio::fs::metadata;
use tracing::{info, warn};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};

/// Name of the log file created when `--log-file` points at a directory.
const DEFAULT_LOG_FILE: &str = "runr.log";

/// Diagnostic logging options.
#[derive(Debug, Clone, Parser)]
pub struct LoggingArgs {
	/// Set diagnostic log level
	///
	/// Without this, runr prints what it's doing (changes detected, command started, command
	/// terminated) and any warnings. Use multiple times to increase verbosity, up to '-vvvv'.
	///
	/// Setting $RUST_LOG also works, and takes precedence.
	#[arg(
		long,
		short,
		help_heading = super::OPTSET_DEBUGGING,
		action = ArgAction::Count,
		num_args = 0,
	)]
	pub verbose: u8,

	/// Write diagnostic logs to a file
	///
	/// This writes logs to a file, instead of the terminal, in JSON format. If the path is a
	/// directory, a 'runr.log' file is created inside it. Prefer a path outside the watched
	/// directories, or every log line will trigger a restart.
	#[arg(
		long,
		help_heading = super::OPTSET_DEBUGGING,
		value_hint = ValueHint::AnyPath,
		value_name = "PATH",
	)]
	pub log_file: Option<PathBuf>,
}

/// Set up logging from `RUST_LOG`, before arguments are parsed.
///
/// Returns whether logging was configured.
pub fn preargs() -> bool {
	let Ok(filter) = var("RUST_LOG") else {
		return false;
	};

	match tracing_subscriber::fmt::try_init() {
		Ok(()) => {
			warn!(RUST_LOG=%filter, "logging configured from RUST_LOG");
			true
		}
		Err(e) => {
			eprintln!("Failed to initialise logging with RUST_LOG, falling back\n{e}");
			false
		}
	}
}

/// Set up logging from the parsed arguments.
///
/// The returned guard flushes the log writer when dropped, so it must be held until exit.
pub async fn postargs(args: &LoggingArgs) -> Result<WorkerGuard> {
	let (log_writer, guard) = if let Some(file) = &args.log_file {
		let is_dir = metadata(&file).await.map_or(false, |info| info.is_dir());
		let (dir, filename) = if is_dir {
			(file.to_owned(), PathBuf::from(DEFAULT_LOG_FILE))
		} else if let (Some(parent), Some(file_name)) = (file.parent(), file.file_name()) {
			(parent.into(), PathBuf::from(file_name))
		} else {
			bail!("Failed to determine log file name");
		};

		non_blocking(rolling::never(dir, filename))
	} else {
		non_blocking(stderr())
	};

	let mut builder = tracing_subscriber::fmt()
		.with_env_filter(filter_for(args.verbose))
		.with_target(args.verbose > 0);

	if args.verbose > 2 {
		use tracing_subscriber::fmt::format::FmtSpan;
		builder = builder.with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);
	}

	match if args.log_file.is_some() {
		builder.json().with_writer(log_writer).try_init()
	} else if args.verbose > 3 {
		builder.pretty().with_writer(log_writer).try_init()
	} else {
		builder.with_writer(log_writer).try_init()
	} {
		Ok(()) => info!(verbosity = args.verbose, "logging initialised"),
		Err(e) => eprintln!("Failed to initialise logging, continuing with none\n{e}"),
	}

	Ok(guard)
}

fn filter_for(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn,runr=info",
		1 => "info,runr=debug",
		2 => "debug,runr=trace",
		_ => "trace",
	}
}
