//! Error types for the accelerator.

use shellmux_protocol::ProtocolError;
use thiserror::Error;

/// Result type alias for accelerator operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// A batch probe exited non-zero; no records were written.
	#[error("File attributes unavailable (probe exited with status {exit_code})")]
	AttributesUnavailable { exit_code: i32 },

	/// The location does not name a remote host.
	#[error("Not a remote location: {0}")]
	NotRemote(String),

	#[error("Invalid remote location '{location}': {reason}")]
	InvalidLocation { location: String, reason: String },

	/// A host-provided implementation failed.
	#[error("Host operation failed: {0}")]
	Host(String),

	#[error(transparent)]
	Runtime(#[from] shellmux_runtime::Error),

	#[error("Protocol error: {0}")]
	Protocol(#[from] ProtocolError),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Whether an interceptor may quietly hand the request to the wrapped
	/// implementation instead.
	///
	/// True for failures that happen before anything ran remotely: the path is
	/// not remote, no session could be started or resolved, or the metadata
	/// probe did not produce records.
	pub fn allows_fallback(&self) -> bool {
		use shellmux_runtime::Error as Runtime;

		match self {
			Error::AttributesUnavailable { .. }
			| Error::NotRemote(_)
			| Error::InvalidLocation { .. }
			| Error::Protocol(_) => true,
			Error::Runtime(inner) => matches!(
				inner,
				Runtime::LauncherNotFound(_)
					| Runtime::LaunchFailed(_)
					| Runtime::Resolution { .. }
					| Runtime::SessionClosed(_)
					| Runtime::Protocol(_)
			),
			Error::Host(_) | Error::Io(_) => false,
		}
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Runtime(inner) if inner.is_timeout())
	}
}
