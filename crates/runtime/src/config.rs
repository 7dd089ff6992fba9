//! Runtime tunables.

use std::path::Path;
use std::time::Duration;

use shellmux_protocol::{Frame, Markers};

/// Default bound on a single command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Default remote directory for per-session stderr files.
pub const DEFAULT_REMOTE_TMP_DIR: &str = "/tmp";

/// Hex digits in a session salt.
const SALT_LEN: usize = 8;

/// Fresh per-session salt.
pub(crate) fn new_salt() -> String {
	format!("{:0width$x}", rand::random::<u32>(), width = SALT_LEN)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
	/// How long `wait` blocks before the session is killed. `None` waits forever.
	pub command_timeout: Option<Duration>,
	/// Suffix every marker with a per-session random salt.
	pub salted_markers: bool,
	/// Remote directory holding each session's stderr temp file.
	pub remote_tmp_dir: String,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
			salted_markers: true,
			remote_tmp_dir: DEFAULT_REMOTE_TMP_DIR.to_string(),
		}
	}
}

impl RuntimeConfig {
	pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.command_timeout = timeout;
		self
	}

	pub fn with_salted_markers(mut self, salted: bool) -> Self {
		self.salted_markers = salted;
		self
	}

	pub fn with_remote_tmp_dir(mut self, dir: impl Into<String>) -> Self {
		self.remote_tmp_dir = dir.into();
		self
	}

	pub(crate) fn markers(&self, salt: &str) -> Markers {
		if self.salted_markers {
			Markers::salted(salt)
		} else {
			Markers::fixed()
		}
	}

	pub(crate) fn stderr_path(&self, salt: &str) -> String {
		format!("{}/shellmux-{salt}.err", self.remote_tmp_dir.trim_end_matches('/'))
	}

	/// Length of the line a session created with this config writes for
	/// `command` run in `dir`, input excluded.
	pub fn framed_len(&self, dir: &Path, command: &str, separate_stderr: bool) -> usize {
		let salt = "0".repeat(SALT_LEN);
		Frame::new(dir, command)
			.with_separate_stderr(separate_stderr)
			.render(&self.markers(&salt), &self.stderr_path(&salt))
			.len()
	}
}
