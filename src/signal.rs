//! Shutdown requests from the OS.

use tokio::{select, sync::oneshot};
use tracing::{debug, trace};

use crate::{error::CriticalError, supervisor::ShutdownSignal};

/// A notification sent to the runr process which means it should stop.
///
/// On Windows, only [`Interrupt`][Signal::Interrupt] and [`Terminate`][Signal::Terminate] are
/// produced: they are respectively `Ctrl-C` and `Ctrl-Break`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
	/// The terminal went away.
	///
	/// On Unix, this is `SIGHUP`. On Windows, it is not produced.
	Hangup,

	/// The user asked to stop.
	///
	/// On Unix, this is `SIGINT`. On Windows, this is `Ctrl+C`.
	Interrupt,

	/// Something asked the process to stop.
	///
	/// On Unix, this is `SIGTERM`. On Windows, this is `Ctrl+Break`.
	Terminate,
}

/// Start listening for shutdown signals.
///
/// The returned receiver resolves once, on the first signal received. The listeners are
/// registered before this returns, so a signal arriving any time after is caught. Must be called
/// from within a tokio runtime.
pub fn shutdown_on_signals() -> Result<oneshot::Receiver<ShutdownSignal>, CriticalError> {
	let (sender, receiver) = oneshot::channel();
	imp_listen(sender)?;
	Ok(receiver)
}

#[cfg(unix)]
fn imp_listen(sender: oneshot::Sender<ShutdownSignal>) -> Result<(), CriticalError> {
	use tokio::signal::unix::{signal, SignalKind};

	debug!("launching unix signal listener");

	macro_rules! listen {
		($sig:ident) => {{
			trace!(kind=%stringify!($sig), "listening for unix signal");
			signal(SignalKind::$sig()).map_err(|err| CriticalError::IoError {
				about: concat!("setting ", stringify!($sig), " signal listener"),
				err,
			})?
		}};
	}

	let mut s_hangup = listen!(hangup);
	let mut s_interrupt = listen!(interrupt);
	let mut s_terminate = listen!(terminate);

	tokio::spawn(async move {
		let sig = select!(
			_ = s_hangup.recv() => Signal::Hangup,
			_ = s_interrupt.recv() => Signal::Interrupt,
			_ = s_terminate.recv() => Signal::Terminate,
		);

		debug!(?sig, "received unix signal");
		deliver(sender, sig);
	});

	Ok(())
}

#[cfg(windows)]
fn imp_listen(sender: oneshot::Sender<ShutdownSignal>) -> Result<(), CriticalError> {
	use tokio::signal::windows::{ctrl_break, ctrl_c};

	debug!("launching windows signal listener");

	macro_rules! listen {
		($sig:ident) => {{
			trace!(kind=%stringify!($sig), "listening for windows process notification");
			$sig().map_err(|err| CriticalError::IoError {
				about: concat!("setting ", stringify!($sig), " listener"),
				err,
			})?
		}};
	}

	let mut sigint = listen!(ctrl_c);
	let mut sigbreak = listen!(ctrl_break);

	tokio::spawn(async move {
		let sig = select!(
			_ = sigint.recv() => Signal::Interrupt,
			_ = sigbreak.recv() => Signal::Terminate,
		);

		debug!(?sig, "received windows process notification");
		deliver(sender, sig);
	});

	Ok(())
}

fn deliver(sender: oneshot::Sender<ShutdownSignal>, sig: Signal) {
	if sender.send(ShutdownSignal).is_err() {
		trace!(?sig, "supervisor already gone, dropping shutdown request");
	}
}

#[cfg(all(test, unix))]
mod test {
	use std::time::Duration;

	use nix::{
		sys::signal::{kill, Signal as NixSignal},
		unistd::Pid,
	};
	use tokio::time::timeout;

	use super::*;

	#[tokio::test]
	async fn hangup_requests_shutdown() {
		let shutdown = shutdown_on_signals().expect("listeners");
		kill(Pid::this(), NixSignal::SIGHUP).expect("send SIGHUP to self");

		let signal = timeout(Duration::from_secs(2), shutdown)
			.await
			.expect("signal within timeout")
			.expect("sender not dropped");
		assert_eq!(signal, ShutdownSignal);
	}
}
