//! Command framing: turns one logical command into the literal text written to
//! a session's shell.
//!
//! Every frame has the same shape:
//!
//! ```text
//! cd <dir>;<command>[ 2>'<stderr-path>']; export RET=$?; echo -n <stderr-marker>; if [ -e '<stderr-path>' ]; then cat '<stderr-path>'; fi; echo $RET <done-marker>; cd - > /dev/null
//! ```
//!
//! When input is supplied the command is prefixed with `printf '%s' '<input>' | `,
//! so the literal text reaches the command's stdin.

use std::path::Path;

use crate::markers::Markers;
use crate::quote::{quote_arg, quote_path};

/// A command ready to be framed for one session.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
	/// Directory the command runs in; the shell returns to its previous
	/// directory afterwards.
	pub dir: &'a Path,
	/// Shell text of the command itself.
	pub command: &'a str,
	/// Literal text piped to the command's stdin.
	pub input: Option<&'a str>,
	/// Whether the command's stderr is redirected to the session's temp file.
	pub separate_stderr: bool,
}

impl<'a> Frame<'a> {
	pub fn new(dir: &'a Path, command: &'a str) -> Self {
		Self {
			dir,
			command,
			input: None,
			separate_stderr: false,
		}
	}

	pub fn with_input(mut self, input: Option<&'a str>) -> Self {
		self.input = input;
		self
	}

	pub fn with_separate_stderr(mut self, separate: bool) -> Self {
		self.separate_stderr = separate;
		self
	}

	/// Renders the frame, newline-terminated.
	pub fn render(&self, markers: &Markers, stderr_path: &str) -> String {
		let mut text = String::with_capacity(self.command.len() + 256);

		text.push_str("cd ");
		text.push_str(&quote_path(self.dir));
		text.push(';');

		if let Some(input) = self.input {
			text.push_str("printf '%s' ");
			text.push_str(&quote_arg(input));
			text.push_str(" | ");
		}
		text.push_str(self.command);

		if self.separate_stderr {
			text.push_str(" 2>'");
			text.push_str(stderr_path);
			text.push('\'');
		}

		text.push_str("; export RET=$?; echo -n ");
		text.push_str(markers.stderr());
		text.push_str("; if [ -e '");
		text.push_str(stderr_path);
		text.push_str("' ]; then cat '");
		text.push_str(stderr_path);
		text.push_str("'; fi; echo $RET ");
		text.push_str(markers.done());
		text.push_str("; cd - > /dev/null\n");
		text
	}
}

/// Line that removes the stderr temp file without printing anything.
///
/// Written after every frame that redirected stderr, so a later frame's
/// `cat` never replays output from an earlier command.
pub fn stderr_cleanup(stderr_path: &str) -> String {
	format!("rm -f '{stderr_path}'\n")
}
