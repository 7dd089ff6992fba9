//! Starting the shell a session talks to.
//!
//! A [`Launcher`] knows how to spawn one shell process per session: either an
//! `ssh` client connected to the remote host, or a local POSIX shell (used for
//! local repositories and in tests).

use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command::CommandOutput;
use crate::error::{Error, Result};
use crate::session::ConnectionKind;

/// Environment variable naming an explicit `ssh` executable.
pub const SSH_ENV: &str = "SHELLMUX_SSH";

/// Shell started on the far end of every connection.
pub const DEFAULT_SHELL: &str = "/bin/sh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launcher {
	/// A local shell; the connection kind makes no difference.
	Local { shell: PathBuf },
	/// An `ssh` client running a shell on a remote host.
	Ssh(SshTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
	pub program: PathBuf,
	pub host: String,
	pub user: Option<String>,
	pub port: Option<u16>,
	/// Extra arguments passed to `ssh` before the destination.
	pub options: Vec<String>,
	pub remote_shell: String,
}

impl SshTarget {
	pub fn destination(&self) -> String {
		match &self.user {
			Some(user) => format!("{user}@{}", self.host),
			None => self.host.clone(),
		}
	}

	fn args(&self, kind: ConnectionKind) -> Vec<String> {
		let mut args = self.options.clone();
		if let Some(port) = self.port {
			args.push("-p".to_string());
			args.push(port.to_string());
		}
		args.push(
			match kind {
				ConnectionKind::Raw => "-T",
				ConnectionKind::Interactive => "-tt",
			}
			.to_string(),
		);
		args.push(self.destination());
		args.push(self.remote_shell.clone());
		args
	}

	fn one_shot_args(&self, text: &str) -> Vec<String> {
		let mut args = self.options.clone();
		if let Some(port) = self.port {
			args.push("-p".to_string());
			args.push(port.to_string());
		}
		args.push("-T".to_string());
		args.push(self.destination());
		args.push(text.to_string());
		args
	}
}

impl Launcher {
	pub fn local() -> Self {
		Self::Local {
			shell: PathBuf::from(DEFAULT_SHELL),
		}
	}

	/// An ssh launcher using the first usable `ssh` found by [`locate_ssh`].
	pub fn ssh(host: impl Into<String>, user: Option<String>, port: Option<u16>) -> Result<Self> {
		Ok(Self::Ssh(SshTarget {
			program: locate_ssh()?,
			host: host.into(),
			user,
			port,
			options: Vec::new(),
			remote_shell: DEFAULT_SHELL.to_string(),
		}))
	}

	/// Builds the process command for one session of the given kind.
	pub fn command(&self, kind: ConnectionKind) -> Command {
		match self {
			Self::Local { shell } => Command::new(shell),
			Self::Ssh(target) => {
				let mut cmd = Command::new(&target.program);
				cmd.args(target.args(kind));
				cmd
			}
		}
	}

	/// Runs `text` in a shell of its own that exits when the text does.
	///
	/// Stdout and stderr are captured separately. This is the unpooled path:
	/// every call pays for a new process and, over ssh, a new connection.
	pub async fn one_shot(&self, text: &str, input: Option<&[u8]>) -> Result<CommandOutput> {
		let mut cmd = match self {
			Self::Local { shell } => {
				let mut cmd = Command::new(shell);
				cmd.arg("-c").arg(text);
				cmd
			}
			Self::Ssh(target) => {
				let mut cmd = Command::new(&target.program);
				cmd.args(target.one_shot_args(text));
				cmd
			}
		};
		cmd.stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		let mut child = cmd
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("{}: {e}", self.describe())))?;

		let writer = match (input, child.stdin.take()) {
			(Some(input), Some(mut stdin)) => {
				let input = input.to_vec();
				Some(tokio::spawn(async move {
					let _ = stdin.write_all(&input).await;
				}))
			}
			_ => None,
		};

		let output = child.wait_with_output().await?;
		if let Some(writer) = writer {
			let _ = writer.await;
		}

		debug!(
			target = "shellmux.launcher",
			launcher = %self.describe(),
			exit_code = ?output.status.code(),
			bytes = output.stdout.len(),
			"one-shot command finished"
		);
		Ok(CommandOutput {
			exit_code: output.status.code().unwrap_or(-1),
			stdout: output.stdout,
			stderr: Some(output.stderr),
		})
	}

	/// Short label for logs.
	pub fn describe(&self) -> String {
		match self {
			Self::Local { shell } => format!("local:{}", shell.display()),
			Self::Ssh(target) => match target.port {
				Some(port) => format!("ssh:{}:{port}", target.destination()),
				None => format!("ssh:{}", target.destination()),
			},
		}
	}
}

/// Locates an `ssh` client.
///
/// Checks, in order:
/// 1. The `SHELLMUX_SSH` environment variable
/// 2. `ssh` on `PATH`
/// 3. Common install locations
///
/// # Errors
///
/// Returns [`Error::LauncherNotFound`] if no runnable client exists.
pub fn locate_ssh() -> Result<PathBuf> {
	if let Some(explicit) = std::env::var_os(SSH_ENV).map(PathBuf::from) {
		if let Some(program) = resolve_candidate_with_fallback(SSH_ENV, explicit, find_ssh_on_system) {
			return Ok(program);
		}
	}

	find_ssh_on_system()
}

fn find_ssh_on_system() -> Result<PathBuf> {
	if let Ok(path) = which::which("ssh") {
		if program_is_usable(&path) {
			return Ok(path);
		}
	}

	let common_locations = [
		"/usr/bin/ssh",
		"/usr/local/bin/ssh",
		"/opt/homebrew/bin/ssh",
		"/opt/local/bin/ssh",
	];

	common_locations
		.iter()
		.map(PathBuf::from)
		.find(|path| path.exists() && program_is_usable(path))
		.ok_or_else(|| {
			Error::LauncherNotFound(format!(
				"ssh executable not found. Install OpenSSH or set {SSH_ENV}."
			))
		})
}

fn resolve_candidate_with_fallback<F>(label: &str, candidate: PathBuf, find_fallback: F) -> Option<PathBuf>
where
	F: Fn() -> Result<PathBuf>,
{
	let usable = program_is_usable(&candidate);
	debug!(
		target = "shellmux.launcher",
		source = label,
		program = %candidate.display(),
		usable,
		"checked ssh candidate"
	);
	if usable {
		return Some(candidate);
	}

	warn!(
		target = "shellmux.launcher",
		source = label,
		program = %candidate.display(),
		"ssh candidate is not runnable; trying fallback"
	);

	let fallback = find_fallback().ok()?;
	if fallback == candidate || !program_is_usable(&fallback) {
		return None;
	}
	Some(fallback)
}

fn program_is_usable(program: &Path) -> bool {
	StdCommand::new(program)
		.arg("-V")
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.status()
		.map(|status| status.success())
		.unwrap_or(false)
}
