//! Error types for the session runtime.

use std::path::PathBuf;
use std::time::Duration;

use shellmux_protocol::ProtocolError;
use thiserror::Error;

use crate::session::{CommandState, SessionId};

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// No usable program was found to start a remote shell.
	#[error("Shell launcher not found: {0}")]
	LauncherNotFound(String),

	/// The shell process could not be started or initialized.
	#[error("Failed to launch shell: {0}")]
	LaunchFailed(String),

	/// A command was submitted to a session that is not free.
	#[error("Session {session} is {state}, not free")]
	NotFree {
		session: SessionId,
		state: CommandState,
	},

	/// Output was requested before the command completed.
	#[error("Session {session} is {state}, no completed command to read")]
	NotComplete {
		session: SessionId,
		state: CommandState,
	},

	/// The shell exited or its pipes closed.
	#[error("Session {0} is closed")]
	SessionClosed(SessionId),

	/// A command did not complete in time; the session has been killed.
	#[error("Command on session {session} timed out after {}s", after.as_secs_f64())]
	Timeout { session: SessionId, after: Duration },

	/// Repository layout could not be determined for a path.
	#[error("Cannot resolve repository for {path}: {reason}")]
	Resolution { path: PathBuf, reason: String },

	#[error("Protocol error: {0}")]
	Protocol(#[from] ProtocolError),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout { .. })
	}

	/// Returns true if the caller broke the free/running/complete discipline.
	pub fn is_protocol_violation(&self) -> bool {
		matches!(self, Error::NotFree { .. } | Error::NotComplete { .. })
	}

	/// Returns true if the session can no longer run commands.
	pub fn is_session_lost(&self) -> bool {
		matches!(self, Error::SessionClosed(_) | Error::Timeout { .. })
	}
}
