use std::io::{self, Write};

use serde::Serialize;
use shellmux::{Command, ConnectionKind};
use tracing::debug;

use super::Context;
use crate::error::Result;
use crate::output::TextOutput;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecStep {
	pub command: String,
	pub exit_code: i32,
	pub stdout: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecData {
	pub location: String,
	/// The session every step ran on.
	pub session: u64,
	pub steps: Vec<ExecStep>,
}

impl ExecData {
	/// Status of the last step, like a shell script.
	pub fn exit_code(&self) -> i32 {
		self.steps.last().map_or(0, |step| step.exit_code)
	}
}

impl TextOutput for ExecData {
	fn write_text(&self, out: &mut dyn Write) -> io::Result<()> {
		for step in &self.steps {
			out.write_all(step.stdout.as_bytes())?;
		}
		Ok(())
	}
}

/// Non-empty lines that are not comments.
pub(super) fn script_lines(script: &str) -> impl Iterator<Item = &str> {
	script
		.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
}

pub(super) async fn execute(ctx: &Context, location: &str, script: &str) -> Result<ExecData> {
	let remote = ctx.remote(location)?;
	let session = ctx.accelerator.acquire(&remote, ConnectionKind::Raw).await?;

	let mut steps = Vec::new();
	for line in script_lines(script) {
		let output = session.run(&Command::new(&remote.path, line)).await?;
		debug!(target = "shellmux.cli", session = session.id(), exit_code = output.exit_code, "exec step");
		steps.push(ExecStep {
			command: line.to_string(),
			exit_code: output.exit_code,
			stdout: output.stdout_lossy(),
		});
	}

	Ok(ExecData {
		location: location.to_string(),
		session: session.id(),
		steps,
	})
}
