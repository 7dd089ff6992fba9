//! Commands submitted to a session and the output they produce.

use std::path::{Path, PathBuf};

/// Where a command's stdout ends up once it completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdoutTarget {
	/// Dropped.
	Discard,
	/// Returned in [`CommandOutput::stdout`].
	#[default]
	Buffer,
	/// Written to a local file; [`CommandOutput::stdout`] is left empty.
	File(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destination {
	pub stdout: StdoutTarget,
	/// Capture stderr separately through the session's temp file instead of
	/// letting it interleave with stdout.
	pub separate_stderr: bool,
}

impl Destination {
	pub fn buffer() -> Self {
		Self::default()
	}

	pub fn discard() -> Self {
		Self {
			stdout: StdoutTarget::Discard,
			separate_stderr: false,
		}
	}

	pub fn file(path: impl Into<PathBuf>) -> Self {
		Self {
			stdout: StdoutTarget::File(path.into()),
			separate_stderr: false,
		}
	}

	pub fn with_separate_stderr(mut self) -> Self {
		self.separate_stderr = true;
		self
	}
}

/// One logical command for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
	/// Remote directory the command runs in.
	pub dir: PathBuf,
	/// Shell text; arguments must already be quoted.
	pub text: String,
	/// Literal text piped to the command's stdin.
	pub input: Option<String>,
	pub destination: Destination,
	/// Flush cached metadata for the session's tracked paths on completion.
	pub invalidate_cache: bool,
}

impl Command {
	pub fn new(dir: impl AsRef<Path>, text: impl Into<String>) -> Self {
		Self {
			dir: dir.as_ref().to_path_buf(),
			text: text.into(),
			input: None,
			destination: Destination::default(),
			invalidate_cache: false,
		}
	}

	pub fn with_input(mut self, input: impl Into<String>) -> Self {
		self.input = Some(input.into());
		self
	}

	pub fn with_destination(mut self, destination: Destination) -> Self {
		self.destination = destination;
		self
	}

	pub fn invalidating_cache(mut self) -> Self {
		self.invalidate_cache = true;
		self
	}
}

/// Result of one completed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
	pub exit_code: i32,
	pub stdout: Vec<u8>,
	/// Present only when separate stderr capture was requested.
	pub stderr: Option<Vec<u8>>,
}

impl CommandOutput {
	pub fn success(&self) -> bool {
		self.exit_code == 0
	}

	pub fn stdout_lossy(&self) -> String {
		String::from_utf8_lossy(&self.stdout).into_owned()
	}

	pub fn stderr_lossy(&self) -> Option<String> {
		self.stderr
			.as_deref()
			.map(|bytes| String::from_utf8_lossy(bytes).into_owned())
	}
}
