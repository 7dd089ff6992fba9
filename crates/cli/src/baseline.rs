//! Unaccelerated host primitives.
//!
//! Every request starts its own process: `ssh host '<command>'` for remote
//! locations, a direct local process otherwise. These are what the
//! accelerated decorators fall back to, and what `--no-accel` uses alone.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use shellmux::{
	CommandOutput, Error, FileReader, LauncherFactory, RemotePath, RemotePathResolver, Result,
	StdoutTarget, VcsDispatcher, VcsRequest,
};
use shellmux_protocol::quote_path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub struct SshBaseline {
	launchers: Arc<dyn LauncherFactory>,
	resolver: Arc<dyn RemotePathResolver>,
}

impl SshBaseline {
	pub fn new(launchers: Arc<dyn LauncherFactory>, resolver: Arc<dyn RemotePathResolver>) -> Self {
		Self { launchers, resolver }
	}

	/// Remote path for `location`, or `None` when it names a local path.
	fn remote(&self, location: &str) -> Result<Option<RemotePath>> {
		match self.resolver.resolve(location) {
			Ok(remote) => Ok(Some(remote)),
			Err(Error::NotRemote(_)) => Ok(None),
			Err(e) => Err(e),
		}
	}

	async fn run_remote(&self, remote: &RemotePath, text: &str, input: Option<&[u8]>) -> Result<CommandOutput> {
		let launcher = self.launchers.launcher(&remote.host)?;
		debug!(target = "shellmux.baseline", host = %remote.host, "one-shot ssh command");
		Ok(launcher.one_shot(text, input).await?)
	}
}

#[async_trait]
impl VcsDispatcher for SshBaseline {
	async fn dispatch(&self, request: &VcsRequest) -> Result<CommandOutput> {
		let input = request.input.as_deref().map(str::as_bytes);
		let output = match self.remote(&request.location)? {
			Some(remote) => {
				let text = format!("cd {} && {}", quote_path(&remote.path), request.command_line());
				self.run_remote(&remote, &text, input).await?
			}
			None => run_local_git(Path::new(&request.location), &request.args, input).await?,
		};
		deliver(output, &request.destination.stdout, request.destination.separate_stderr).await
	}
}

#[async_trait]
impl FileReader for SshBaseline {
	async fn read(&self, location: &str) -> Result<Vec<u8>> {
		let Some(remote) = self.remote(location)? else {
			return Ok(tokio::fs::read(location).await?);
		};

		let text = format!("cat {}", quote_path(&remote.path));
		let output = self.run_remote(&remote, &text, None).await?;
		if output.success() {
			Ok(output.stdout)
		} else {
			Err(Error::Host(format!(
				"cat {remote} exited with status {}: {}",
				output.exit_code,
				output.stderr_lossy().unwrap_or_default().trim()
			)))
		}
	}
}

async fn run_local_git(dir: &Path, args: &[String], input: Option<&[u8]>) -> Result<CommandOutput> {
	let mut child = tokio::process::Command::new("git")
		.args(args)
		.current_dir(dir)
		.stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true)
		.spawn()?;

	if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
		let input = input.to_vec();
		tokio::spawn(async move {
			let _ = stdin.write_all(&input).await;
		});
	}

	let output = child.wait_with_output().await?;
	Ok(CommandOutput {
		exit_code: output.status.code().unwrap_or(-1),
		stdout: output.stdout,
		stderr: Some(output.stderr),
	})
}

/// Applies the requested destination to a one-shot result, whose streams
/// always arrive separately.
async fn deliver(mut output: CommandOutput, stdout: &StdoutTarget, separate_stderr: bool) -> Result<CommandOutput> {
	if !separate_stderr {
		if let Some(stderr) = output.stderr.take() {
			output.stdout.extend_from_slice(&stderr);
		}
	}
	match stdout {
		StdoutTarget::Buffer => {}
		StdoutTarget::Discard => output.stdout.clear(),
		StdoutTarget::File(path) => {
			tokio::fs::write(path, &output.stdout).await?;
			output.stdout.clear();
		}
	}
	Ok(output)
}
