use std::io::{self, Write};
use std::sync::Arc;

use serde::Serialize;
use shellmux::{AcceleratedDispatcher, Destination, VcsDispatcher, VcsRequest};

use super::Context;
use crate::error::Result;
use crate::output::TextOutput;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunData {
	pub location: String,
	pub args: Vec<String>,
	pub exit_code: i32,
	pub stdout: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stderr: Option<String>,
}

impl TextOutput for RunData {
	fn write_text(&self, out: &mut dyn Write) -> io::Result<()> {
		out.write_all(self.stdout.as_bytes())?;
		if let Some(stderr) = &self.stderr {
			io::stderr().write_all(stderr.as_bytes())?;
		}
		Ok(())
	}
}

pub(super) fn request(location: String, args: Vec<String>, input: Option<String>, separate_stderr: bool) -> VcsRequest {
	let destination = if separate_stderr {
		Destination::buffer().with_separate_stderr()
	} else {
		Destination::buffer()
	};
	let mut request = VcsRequest::new(location, args).with_destination(destination);
	request.input = input;
	request
}

pub(super) async fn execute(ctx: &Context, request: VcsRequest) -> Result<RunData> {
	let output = if ctx.accelerate {
		AcceleratedDispatcher::new(
			Arc::clone(&ctx.baseline),
			Arc::clone(&ctx.accelerator),
			Arc::clone(&ctx.resolver),
		)
		.dispatch(&request)
		.await?
	} else {
		ctx.baseline.dispatch(&request).await?
	};

	Ok(RunData {
		exit_code: output.exit_code,
		stdout: output.stdout_lossy(),
		stderr: output.stderr_lossy(),
		location: request.location,
		args: request.args,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_carries_input_and_stderr_policy() {
		let request = request(
			"ssh://build/srv".into(),
			vec!["commit".into(), "-F".into(), "-".into()],
			Some("message\n".into()),
			true,
		);
		assert_eq!(request.command_line(), "git commit -F -");
		assert_eq!(request.input.as_deref(), Some("message\n"));
		assert!(request.destination.separate_stderr);
	}

	#[test]
	fn text_output_is_the_raw_stdout() {
		let data = RunData {
			location: "ssh://build/srv".into(),
			args: vec!["status".into()],
			exit_code: 0,
			stdout: "On branch main\n".into(),
			stderr: None,
		};
		let mut buf = Vec::new();
		data.write_text(&mut buf).unwrap();
		assert_eq!(buf, b"On branch main\n");
	}
}
