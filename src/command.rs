//! Command construction.

use std::{fmt, path::PathBuf, process::Stdio};

use tokio::process::Command as TokioCommand;
use tracing::trace;

/// How one of the child's standard streams is bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Stream {
	/// Share the stream with the runr process.
	#[default]
	Inherit,

	/// Connect the stream to the null device.
	Null,
}

impl Stream {
	fn to_stdio(self) -> Stdio {
		match self {
			Self::Inherit => Stdio::inherit(),
			Self::Null => Stdio::null(),
		}
	}
}

/// The command to (re)start.
///
/// This is fixed for the lifetime of a supervisor: every restart launches the exact same program
/// with the exact same arguments. The program is executed directly, not through a shell.
///
/// ```
/// # use runr::command::CommandSpec;
/// let cmd = CommandSpec::new("cargo", ["test", "--lib"]);
/// assert_eq!(cmd.to_string(), "cargo test --lib");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommandSpec {
	/// Path or name of the program.
	pub program: PathBuf,

	/// The arguments to pass.
	pub args: Vec<String>,

	/// Binding for the child's stdin.
	pub stdin: Stream,

	/// Binding for the child's stdout.
	pub stdout: Stream,

	/// Binding for the child's stderr.
	pub stderr: Stream,

	/// Spawn the program as the leader of a new process group.
	///
	/// On Unix, cancelling a grouped command terminates the whole group, so anything the program
	/// itself spawned goes away with it. Elsewhere this has no effect.
	pub grouped: bool,
}

impl CommandSpec {
	/// A grouped command bound to the calling process's standard streams.
	pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			program: program.into(),
			args: args.into_iter().map(Into::into).collect(),
			stdin: Stream::Inherit,
			stdout: Stream::Inherit,
			stderr: Stream::Inherit,
			grouped: true,
		}
	}

	/// Build from an argv-style list: the program followed by its arguments.
	///
	/// Returns `None` if the list is empty.
	pub fn from_argv(argv: &[String]) -> Option<Self> {
		let (program, args) = argv.split_first()?;
		Some(Self::new(program, args.iter().cloned()))
	}

	/// Bind all three standard streams the same way.
	#[must_use]
	pub fn with_stdio(mut self, stream: Stream) -> Self {
		self.stdin = stream;
		self.stdout = stream;
		self.stderr = stream;
		self
	}

	/// Obtain a [`tokio::process::Command`].
	pub fn to_spawnable(&self) -> TokioCommand {
		trace!(command=?self, "constructing command");

		let mut cmd = TokioCommand::new(&self.program);
		cmd.args(&self.args)
			.stdin(self.stdin.to_stdio())
			.stdout(self.stdout.to_stdio())
			.stderr(self.stderr.to_stdio())
			.kill_on_drop(true);

		#[cfg(unix)]
		if self.grouped {
			cmd.process_group(0);
		}

		cmd
	}
}

impl fmt::Display for CommandSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.program.display())?;
		for arg in &self.args {
			write!(f, " {arg}")?;
		}

		Ok(())
	}
}
