//! In-band tokens that delimit command output.

/// Literal completion token used when markers are not salted.
pub const DONE_TOKEN: &str = "DONE";

/// Literal stderr separator used when markers are not salted.
pub const STDERR_TOKEN: &str = "__SHELLMUX_STDERR__";

/// Literal end-of-file sentinel used when markers are not salted.
pub const EOF_TOKEN: &str = "__SHELLMUX_EOF__";

/// The set of tokens one session injects into its output stream.
///
/// The completion marker appears on the wire as `<exit-code> <done>`; the stderr
/// marker separates captured stdout from the replayed stderr file; the eof
/// sentinel terminates file contents in probe output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
	done: String,
	stderr: String,
	eof: String,
}

impl Default for Markers {
	fn default() -> Self {
		Self::fixed()
	}
}

impl Markers {
	/// Markers made of fixed literal tokens.
	pub fn fixed() -> Self {
		Self {
			done: DONE_TOKEN.to_string(),
			stderr: STDERR_TOKEN.to_string(),
			eof: EOF_TOKEN.to_string(),
		}
	}

	/// Markers suffixed with `salt`, so output that merely contains the fixed
	/// tokens cannot complete a command.
	///
	/// The salt must be shell-safe (alphanumeric); it is emitted unquoted.
	pub fn salted(salt: &str) -> Self {
		debug_assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
		Self {
			done: format!("{DONE_TOKEN}.{salt}"),
			stderr: format!("__SHELLMUX_STDERR_{salt}__"),
			eof: format!("__SHELLMUX_EOF_{salt}__"),
		}
	}

	pub fn done(&self) -> &str {
		&self.done
	}

	pub fn stderr(&self) -> &str {
		&self.stderr
	}

	pub fn eof(&self) -> &str {
		&self.eof
	}
}
