//! Lifecycle of the shell process behind one session.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tracing::debug;

use crate::error::{Error, Result};
use crate::launcher::Launcher;
use crate::session::ConnectionKind;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A running shell (local or over ssh) with piped stdio.
///
/// The process is killed when this value is dropped. Anything the launcher
/// itself prints on stderr, such as ssh diagnostics, is logged at debug level.
#[derive(Debug)]
pub struct ShellProcess {
	child: Child,
	label: String,
}

impl ShellProcess {
	/// Spawns a shell for a session of the given kind.
	///
	/// # Errors
	///
	/// Returns `Error::LaunchFailed` if the process cannot be spawned or exits
	/// immediately.
	pub fn launch(launcher: &Launcher, kind: ConnectionKind) -> Result<Self> {
		let label = launcher.describe();
		let mut cmd = launcher.command(kind);
		cmd.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		let mut child = cmd
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("{label}: failed to spawn process: {e}")))?;

		if let Some(status) = child
			.try_wait()
			.map_err(|e| Error::LaunchFailed(format!("{label}: failed to check process status: {e}")))?
		{
			return Err(Error::LaunchFailed(format!(
				"{label}: process exited immediately with status: {status}"
			)));
		}

		if let Some(stderr) = child.stderr.take() {
			let source = label.clone();
			tokio::spawn(async move {
				let mut lines = BufReader::new(stderr).lines();
				while let Ok(Some(line)) = lines.next_line().await {
					debug!(target = "shellmux.process", source = %source, "{line}");
				}
			});
		}

		debug!(target = "shellmux.process", source = %label, pid = ?child.id(), %kind, "shell started");
		Ok(Self { child, label })
	}

	/// Takes the stdin/stdout pipes; only the first call succeeds.
	pub fn take_pipes(&mut self) -> Result<(ChildStdin, ChildStdout)> {
		match (self.child.stdin.take(), self.child.stdout.take()) {
			(Some(stdin), Some(stdout)) => Ok((stdin, stdout)),
			_ => Err(Error::LaunchFailed(format!("{}: stdio pipes already taken", self.label))),
		}
	}

	pub fn id(&self) -> Option<u32> {
		self.child.id()
	}

	/// Closes stdin so the shell exits on its own, killing it if it lingers.
	pub async fn shutdown(mut self) -> Result<()> {
		drop(self.child.stdin.take());

		match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(e)) => Err(Error::LaunchFailed(format!("failed to wait for process: {e}"))),
			Err(_) => self.kill().await,
		}
	}

	/// Force kills the shell.
	pub async fn kill(mut self) -> Result<()> {
		self.child
			.kill()
			.await
			.map_err(|e| Error::LaunchFailed(format!("failed to kill process: {e}")))
	}
}
