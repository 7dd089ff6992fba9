//! One persistent remote shell and the command protocol spoken over it.
//!
//! A session runs at most one command at a time. Its command state moves
//! `Free -> Running -> Complete -> Free`: [`Session::submit`] writes a framed
//! command, the reader task feeds output through [`Session::on_data`] until the
//! completion marker shows up, and [`Session::take_output`] hands the result
//! back and frees the session.
//!
//! A command started with [`Session::start_async`] instead lends the output
//! stream to an [`OutputHandler`]; the session frees itself as soon as the
//! handler has been given the result.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use shellmux_protocol::{Completion, Frame, Markers, stderr_cleanup};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandOutput, StdoutTarget};
use crate::demux::OutputDemuxer;
use crate::error::{Error, Result};
use crate::process::ShellProcess;
use crate::resolve::RepoLayout;
use crate::transport::{OutputSink, spawn_reader};

pub type SessionId = u64;

/// Whether the remote shell runs on a pseudo-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
	/// Pty-backed; needed by commands that insist on a terminal.
	Interactive,
	/// Plain pipes; safe for binary output and long input lines.
	Raw,
}

impl fmt::Display for ConnectionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Interactive => "interactive",
			Self::Raw => "raw",
		})
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandState {
	#[default]
	Free,
	Running,
	Complete,
}

impl fmt::Display for CommandState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Free => "free",
			Self::Running => "running",
			Self::Complete => "complete",
		})
	}
}

/// Flushes cached metadata when a command may have changed remote files.
pub trait CacheInvalidator: Send + Sync {
	fn invalidate(&self, paths: &[PathBuf]);
}

/// Receives the output of a command started with [`Session::start_async`].
///
/// Callbacks run on the session's reader task and must not block.
pub trait OutputHandler: Send {
	/// Stdout bytes, in order, as they become available.
	fn on_output(&mut self, chunk: &[u8]);

	/// Called once with the complete result. Every stdout byte has already
	/// been passed to [`OutputHandler::on_output`].
	fn on_complete(&mut self, output: CommandOutput);
}

/// Shell text run once on a fresh session: merge stderr into stdout, stop the
/// pty from echoing input or rewriting newlines, and silence prompts.
const INTERACTIVE_INIT: &str = "exec 2>&1; stty -echo -onlcr 2>/dev/null; PS1=''; PS2=''";
const RAW_INIT: &str = "exec 2>&1; PS1=''; PS2=''";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Status {
	state: CommandState,
	closed: bool,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
	separate_stderr: bool,
	invalidate: bool,
	lent: bool,
}

#[derive(Default)]
struct Inner {
	state: CommandState,
	closed: bool,
	demux: OutputDemuxer,
	pending: Option<Pending>,
	completion: Option<Completion>,
	last_exit: Option<i32>,
	tracked: BTreeSet<PathBuf>,
}

impl Inner {
	fn status(&self) -> Status {
		Status {
			state: self.state,
			closed: self.closed,
		}
	}
}

/// What a chunk of output did to the running command.
enum Step {
	Idle,
	Stream(Vec<u8>),
	Completed {
		exit_code: i32,
		tail: Vec<u8>,
		lent_output: Option<CommandOutput>,
		invalidate: Vec<PathBuf>,
	},
}

/// Everything needed to attach a session to a pair of pipes.
pub(crate) struct SessionSpec {
	pub id: SessionId,
	pub kind: ConnectionKind,
	pub layout: RepoLayout,
	pub markers: Markers,
	pub stderr_path: String,
	pub command_timeout: Option<Duration>,
	pub invalidator: Option<Arc<dyn CacheInvalidator>>,
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

pub struct Session {
	id: SessionId,
	kind: ConnectionKind,
	markers: Markers,
	stderr_path: String,
	command_timeout: Option<Duration>,
	layout: RwLock<RepoLayout>,
	inner: Mutex<Inner>,
	status: watch::Sender<Status>,
	writer: tokio::sync::Mutex<Writer>,
	handler: Mutex<Option<Box<dyn OutputHandler>>>,
	process: Mutex<Option<ShellProcess>>,
	reader: Mutex<Option<JoinHandle<()>>>,
	leased: AtomicBool,
	invalidator: Option<Arc<dyn CacheInvalidator>>,
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let status = self.inner.lock().status();
		f.debug_struct("Session")
			.field("id", &self.id)
			.field("kind", &self.kind)
			.field("state", &status.state)
			.field("closed", &status.closed)
			.field("work_dir", &self.layout.read().work_dir)
			.finish()
	}
}

impl Session {
	/// Wires a session to the shell's stdin (`writer`) and stdout (`reader`)
	/// and starts the reader task.
	pub(crate) fn attach<R, W>(
		spec: SessionSpec,
		reader: R,
		writer: W,
		process: Option<ShellProcess>,
	) -> Arc<Self>
	where
		R: AsyncRead + Unpin + Send + 'static,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		let (status, _) = watch::channel(Status {
			state: CommandState::Free,
			closed: false,
		});

		let session = Arc::new(Self {
			id: spec.id,
			kind: spec.kind,
			markers: spec.markers,
			stderr_path: spec.stderr_path,
			command_timeout: spec.command_timeout,
			layout: RwLock::new(spec.layout),
			inner: Mutex::new(Inner::default()),
			status,
			writer: tokio::sync::Mutex::new(Box::new(writer)),
			handler: Mutex::new(None),
			process: Mutex::new(process),
			reader: Mutex::new(None),
			leased: AtomicBool::new(false),
			invalidator: spec.invalidator,
		});

		let task = spawn_reader(reader, Arc::downgrade(&session));
		*session.reader.lock() = Some(task);
		session
	}

	/// Prepares a freshly attached shell for framed commands.
	pub(crate) async fn initialize(&self) -> Result<()> {
		let init = match self.kind {
			ConnectionKind::Interactive => INTERACTIVE_INIT,
			ConnectionKind::Raw => RAW_INIT,
		};
		let output = self.run(&Command::new(".", init)).await?;
		debug!(
			target = "shellmux.session",
			session = self.id,
			kind = %self.kind,
			exit_code = output.exit_code,
			"session initialized"
		);
		Ok(())
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn kind(&self) -> ConnectionKind {
		self.kind
	}

	pub fn markers(&self) -> &Markers {
		&self.markers
	}

	pub fn layout(&self) -> RepoLayout {
		self.layout.read().clone()
	}

	pub(crate) fn set_layout(&self, layout: RepoLayout) {
		*self.layout.write() = layout;
	}

	/// Whether this session's repository covers `path`.
	pub fn serves(&self, path: &Path) -> bool {
		self.layout.read().contains(path)
	}

	pub fn state(&self) -> CommandState {
		self.inner.lock().state
	}

	pub fn is_closed(&self) -> bool {
		self.inner.lock().closed
	}

	/// Free, open, and not held by a lease.
	pub fn is_available(&self) -> bool {
		let inner = self.inner.lock();
		inner.state == CommandState::Free && !inner.closed && !self.leased.load(Ordering::Acquire)
	}

	/// Exit code of the most recently completed command.
	pub fn last_exit_code(&self) -> Option<i32> {
		self.inner.lock().last_exit
	}

	/// Records paths whose cached metadata depends on this session's repository.
	pub fn track_paths<I>(&self, paths: I)
	where
		I: IntoIterator<Item = PathBuf>,
	{
		self.inner.lock().tracked.extend(paths);
	}

	pub fn tracked_paths(&self) -> Vec<PathBuf> {
		self.inner.lock().tracked.iter().cloned().collect()
	}

	/// Writes a framed command to the shell.
	///
	/// # Errors
	///
	/// Returns `Error::NotFree` if another command has not been taken yet, and
	/// `Error::SessionClosed` if the shell is gone.
	pub async fn submit(&self, command: &Command) -> Result<()> {
		self.dispatch(command, None).await
	}

	/// Submits a command whose output goes to `handler` instead of
	/// [`Session::take_output`].
	pub async fn start_async(&self, command: &Command, handler: Box<dyn OutputHandler>) -> Result<()> {
		self.dispatch(command, Some(handler)).await
	}

	async fn dispatch(&self, command: &Command, handler: Option<Box<dyn OutputHandler>>) -> Result<()> {
		let mut text = Frame::new(&command.dir, &command.text)
			.with_input(command.input.as_deref())
			.with_separate_stderr(command.destination.separate_stderr)
			.render(&self.markers, &self.stderr_path);
		if command.destination.separate_stderr {
			text.push_str(&stderr_cleanup(&self.stderr_path));
		}

		{
			let mut inner = self.inner.lock();
			if inner.closed {
				return Err(Error::SessionClosed(self.id));
			}
			let state = inner.state;
			if state != CommandState::Free {
				return Err(Error::NotFree {
					session: self.id,
					state,
				});
			}

			let lent = handler.is_some();
			*self.handler.lock() = handler;
			inner.demux.arm();
			inner.completion = None;
			inner.pending = Some(Pending {
				separate_stderr: command.destination.separate_stderr,
				invalidate: command.invalidate_cache,
				lent,
			});
			inner.state = CommandState::Running;
			self.status.send_replace(inner.status());
		}

		debug!(
			target = "shellmux.session",
			session = self.id,
			dir = %command.dir.display(),
			command = %command.text,
			"submit"
		);

		if let Err(e) = self.write_all(text.as_bytes()).await {
			warn!(target = "shellmux.session", session = self.id, error = %e, "write to shell failed");
			self.mark_closed();
			return Err(Error::SessionClosed(self.id));
		}
		Ok(())
	}

	async fn write_all(&self, bytes: &[u8]) -> std::io::Result<()> {
		let mut writer = self.writer.lock().await;
		writer.write_all(bytes).await?;
		writer.flush().await
	}

	/// Appends shell output and completes the running command once its marker
	/// line has arrived.
	pub fn on_data(&self, chunk: &[u8]) {
		match self.absorb(chunk) {
			Step::Idle => {}
			Step::Stream(bytes) => {
				if let Some(handler) = self.handler.lock().as_mut() {
					handler.on_output(&bytes);
				}
			}
			Step::Completed {
				exit_code,
				tail,
				lent_output,
				invalidate,
			} => {
				debug!(target = "shellmux.session", session = self.id, exit_code, "command complete");

				if !invalidate.is_empty() {
					if let Some(invalidator) = &self.invalidator {
						debug!(
							target = "shellmux.session",
							session = self.id,
							paths = invalidate.len(),
							"invalidating tracked paths"
						);
						invalidator.invalidate(&invalidate);
					}
				}

				if let Some(output) = lent_output {
					let handler = self.handler.lock().take();
					if let Some(mut handler) = handler {
						if !tail.is_empty() {
							handler.on_output(&tail);
						}
						handler.on_complete(output);
					}
				}

				let inner = self.inner.lock();
				self.status.send_replace(inner.status());
			}
		}
	}

	fn absorb(&self, chunk: &[u8]) -> Step {
		let mut inner = self.inner.lock();
		inner.demux.push(chunk);

		if inner.state != CommandState::Running {
			return Step::Idle;
		}
		let Some(pending) = inner.pending else {
			return Step::Idle;
		};

		let Some(done) = inner.demux.scan(&self.markers) else {
			if pending.lent {
				if let Some(bytes) = inner.demux.streamable(&self.markers) {
					return Step::Stream(bytes);
				}
			}
			return Step::Idle;
		};

		let exit_code = done.exit_code;
		inner.last_exit = Some(exit_code);
		let invalidate = if pending.invalidate {
			inner.tracked.iter().cloned().collect()
		} else {
			Vec::new()
		};

		if pending.lent {
			let tail = inner.demux.unstreamed(&done).to_vec();
			let output = inner.demux.take(&done, pending.separate_stderr);
			inner.pending = None;
			inner.state = CommandState::Free;
			Step::Completed {
				exit_code,
				tail,
				lent_output: Some(output),
				invalidate,
			}
		} else {
			inner.completion = Some(done);
			inner.state = CommandState::Complete;
			Step::Completed {
				exit_code,
				tail: Vec::new(),
				lent_output: None,
				invalidate,
			}
		}
	}

	/// Waits until the running command completes.
	///
	/// # Errors
	///
	/// Returns `Error::Timeout` when the configured command timeout elapses;
	/// the shell is killed and the session closed. Returns
	/// `Error::SessionClosed` if the shell exits first.
	pub async fn wait(&self) -> Result<CommandState> {
		fn settled(status: &Status) -> bool {
			status.closed || status.state != CommandState::Running
		}

		let mut rx = self.status.subscribe();
		let outcome = match self.command_timeout {
			Some(limit) => tokio::time::timeout(limit, rx.wait_for(settled))
				.await
				.map(|result| result.map(|status| *status))
				.map_err(|_| limit),
			None => Ok(rx.wait_for(settled).await.map(|status| *status)),
		};

		let waited = match outcome {
			Ok(waited) => waited,
			Err(limit) => {
				warn!(
					target = "shellmux.session",
					session = self.id,
					timeout_secs = limit.as_secs_f64(),
					"command timed out; killing session"
				);
				self.terminate().await;
				return Err(Error::Timeout {
					session: self.id,
					after: limit,
				});
			}
		};

		let status = waited.map_err(|_| Error::SessionClosed(self.id))?;
		if status.state == CommandState::Running {
			return Err(Error::SessionClosed(self.id));
		}
		Ok(status.state)
	}

	/// Returns the completed command's output and frees the session.
	pub fn take_output(&self) -> Result<CommandOutput> {
		let mut inner = self.inner.lock();
		let state = inner.state;
		let not_complete = Error::NotComplete {
			session: self.id,
			state,
		};
		if state != CommandState::Complete {
			return Err(not_complete);
		}
		let (Some(done), Some(pending)) = (inner.completion.take(), inner.pending.take()) else {
			return Err(not_complete);
		};

		let output = inner.demux.take(&done, pending.separate_stderr);
		inner.state = CommandState::Free;
		self.status.send_replace(inner.status());
		Ok(output)
	}

	/// Submits, waits, and takes the output, applying the command's stdout
	/// destination.
	pub async fn run(&self, command: &Command) -> Result<CommandOutput> {
		self.submit(command).await?;
		self.wait().await?;
		let mut output = self.take_output()?;

		match &command.destination.stdout {
			StdoutTarget::Buffer => {}
			StdoutTarget::Discard => output.stdout.clear(),
			StdoutTarget::File(path) => {
				tokio::fs::write(path, &output.stdout).await?;
				output.stdout.clear();
			}
		}
		Ok(output)
	}

	/// Reserves the session for one caller; `None` if it is busy, closed, or
	/// already leased.
	pub(crate) fn try_lease(self: &Arc<Self>) -> Option<SessionLease> {
		{
			let inner = self.inner.lock();
			if inner.state != CommandState::Free || inner.closed {
				return None;
			}
		}
		self.leased
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.ok()?;
		Some(SessionLease {
			session: Arc::clone(self),
		})
	}

	pub(crate) fn mark_closed(&self) {
		let mut inner = self.inner.lock();
		if inner.closed {
			return;
		}
		inner.closed = true;
		self.status.send_replace(inner.status());
		drop(inner);

		self.handler.lock().take();
		info!(target = "shellmux.session", session = self.id, "session closed");
	}

	/// Kills the shell immediately.
	pub async fn terminate(&self) {
		self.mark_closed();
		if let Some(task) = self.reader.lock().take() {
			task.abort();
		}
		let process = self.process.lock().take();
		if let Some(process) = process {
			if let Err(e) = process.kill().await {
				warn!(target = "shellmux.session", session = self.id, error = %e, "kill failed");
			}
		}
	}

	/// Removes the stderr temp file and lets the shell exit by closing its stdin.
	pub async fn shutdown(&self) {
		if !self.is_closed() {
			let _ = self.write_all(stderr_cleanup(&self.stderr_path).as_bytes()).await;
		}
		self.mark_closed();
		let _ = self.writer.lock().await.shutdown().await;
		let process = self.process.lock().take();
		if let Some(process) = process {
			if let Err(e) = process.shutdown().await {
				warn!(target = "shellmux.session", session = self.id, error = %e, "shutdown failed");
			}
		}
	}
}

impl OutputSink for Session {
	fn on_data(&self, chunk: &[u8]) {
		Session::on_data(self, chunk);
	}

	fn on_eof(&self) {
		self.mark_closed();
	}
}

/// Exclusive use of a session; released on drop.
#[derive(Debug)]
pub struct SessionLease {
	session: Arc<Session>,
}

impl SessionLease {
	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}
}

impl Deref for SessionLease {
	type Target = Session;

	fn deref(&self) -> &Session {
		&self.session
	}
}

impl Drop for SessionLease {
	fn drop(&mut self) {
		self.session.leased.store(false, Ordering::Release);
	}
}

#[cfg(test)]
mod tests;
