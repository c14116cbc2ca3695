//! Change source for writes to files in watched directories.
//!
//! All coupling to the notify crate lives here. The supervisor only sees the [`ChangeSource`]
//! contract: open on a [`WatchSpec`], read [`ChangeEvent`]s, close.

use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use notify::{
	event::{MetadataKind, ModifyKind},
	EventKind, RecursiveMode, Watcher as _,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::error::{CriticalError, FsWatcherError, RuntimeError};

/// What kind of filesystem watcher to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum WatcherKind {
	/// The notify-recommended watcher on the platform.
	///
	/// That's inotify, FSEvents, kqueue, or ReadDirectoryChangesW, depending. For platforms notify
	/// doesn't support natively, it's polling with a default interval.
	#[default]
	Native,

	/// Notify's [poll watcher][notify::PollWatcher] with a custom interval.
	Poll(Duration),
}

impl WatcherKind {
	fn create(
		self,
		f: impl notify::EventHandler,
	) -> Result<Box<dyn notify::Watcher + Send>, CriticalError> {
		use notify::Config;

		match self {
			Self::Native => {
				notify::RecommendedWatcher::new(f, Config::default()).map(|w| Box::new(w) as _)
			}
			Self::Poll(delay) => notify::PollWatcher::new(
				f,
				Config::default()
					.with_poll_interval(delay)
					.with_compare_contents(true),
			)
			.map(|w| Box::new(w) as _),
		}
		.map_err(|err| CriticalError::FsWatcherInit {
			kind: self,
			err: FsWatcherError::classify(err),
		})
	}
}

/// The directories to watch.
///
/// Duplicates are dropped on construction, keeping the first occurrence. Once a supervisor has
/// started, its spec doesn't change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchSpec {
	dirs: Vec<PathBuf>,
}

impl WatchSpec {
	/// Build a spec from paths, as they are.
	pub fn new(dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
		let mut spec = Self::default();
		for dir in dirs {
			let dir = dir.into();
			if !spec.dirs.contains(&dir) {
				spec.dirs.push(dir);
			}
		}

		spec
	}

	/// Build a spec from paths, resolving each to its canonical form first.
	///
	/// This way `.` and the absolute path of the current directory count as the same thing.
	pub fn resolve(dirs: impl IntoIterator<Item = impl AsRef<Path>>) -> Result<Self, CriticalError> {
		let dirs = dirs
			.into_iter()
			.map(|dir| {
				let dir = dir.as_ref();
				dir.canonicalize().map_err(|err| CriticalError::Canonicalize {
					path: dir.to_owned(),
					err,
				})
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self::new(dirs))
	}

	/// The directories, in the order they were first given.
	pub fn dirs(&self) -> &[PathBuf] {
		&self.dirs
	}
}

/// Something relevant changed.
///
/// The path is only there to be logged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeEvent {
	/// The path that was written to, if the watcher said.
	pub path: Option<PathBuf>,
}

/// A stream of change notifications over a set of directories.
pub trait ChangeSource {
	/// Start observing the directories in `spec`.
	///
	/// Failing here is fatal: with nothing to observe, there's nothing to act on.
	fn open(&mut self, spec: &WatchSpec) -> Result<(), CriticalError>;

	/// The stream of events.
	///
	/// This stays open until [`close`](Self::close) is called.
	fn events(&mut self) -> &mut mpsc::UnboundedReceiver<ChangeEvent>;

	/// Stop observing and release the underlying watcher.
	///
	/// Idempotent. No event is delivered from [`events`](Self::events) after this returns.
	fn close(&mut self);
}

/// Whether a notify event kind is a write to file contents.
///
/// Creations, removals, renames, permission changes, and accesses are all ignored.
pub fn is_write(kind: &EventKind) -> bool {
	matches!(
		kind,
		EventKind::Modify(
			ModifyKind::Any
				| ModifyKind::Data(_)
				| ModifyKind::Metadata(MetadataKind::WriteTime)
		)
	)
}

/// A [`ChangeSource`] backed by a notify watcher.
#[derive(Debug)]
pub struct FsChangeSource {
	kind: WatcherKind,
	mode: RecursiveMode,
	watcher: Option<Watcher>,
	sender: mpsc::UnboundedSender<ChangeEvent>,
	receiver: mpsc::UnboundedReceiver<ChangeEvent>,
}

struct Watcher(Box<dyn notify::Watcher + Send>);

impl std::fmt::Debug for Watcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Watcher").finish_non_exhaustive()
	}
}

impl FsChangeSource {
	/// A source that will use the given watcher kind and recursion mode once opened.
	pub fn new(kind: WatcherKind, mode: RecursiveMode) -> Self {
		let (sender, receiver) = mpsc::unbounded_channel();
		Self {
			kind,
			mode,
			watcher: None,
			sender,
			receiver,
		}
	}

	/// Whether the source is currently watching.
	pub const fn is_open(&self) -> bool {
		self.watcher.is_some()
	}
}

impl Default for FsChangeSource {
	fn default() -> Self {
		Self::new(WatcherKind::default(), RecursiveMode::NonRecursive)
	}
}

impl ChangeSource for FsChangeSource {
	fn open(&mut self, spec: &WatchSpec) -> Result<(), CriticalError> {
		debug!(kind=?self.kind, mode=?self.mode, "creating watcher");

		let (sender, receiver) = mpsc::unbounded_channel();
		self.sender = sender;
		self.receiver = receiver;

		let events = self.sender.clone();
		let mut watcher = self.kind.create(move |nev: Result<notify::Event, notify::Error>| {
			trace!(event = ?nev, "receiving possible event from watcher");
			match nev {
				Ok(nev) => {
					if let Some(event) = translate(nev) {
						// only fails once the source has been closed
						events.send(event).ok();
					}
				}
				Err(err) => error!(err=%RuntimeError::FsWatcher(err), "watcher error, continuing"),
			}
		})?;

		for dir in spec.dirs() {
			trace!(?dir, "adding path to the watcher");
			watcher
				.watch(dir, self.mode)
				.map_err(|err| CriticalError::FsWatchPath {
					path: dir.clone(),
					err,
				})?;
			debug!(?dir, "watching");
		}

		self.watcher = Some(Watcher(watcher));
		Ok(())
	}

	fn events(&mut self) -> &mut mpsc::UnboundedReceiver<ChangeEvent> {
		&mut self.receiver
	}

	fn close(&mut self) {
		if self.watcher.take().is_some() {
			debug!("watcher dropped");
		}

		self.receiver.close();
		while let Ok(event) = self.receiver.try_recv() {
			trace!(?event, "discarding event received before close");
		}
	}
}

fn translate(nev: notify::Event) -> Option<ChangeEvent> {
	let path = nev.paths.into_iter().next();
	if is_write(&nev.kind) {
		info!(?path, "change detected");
		Some(ChangeEvent { path })
	} else {
		debug!(?path, kind=?nev.kind, "ignoring non-write event");
		None
	}
}
