//! Errors raised while decoding shell output.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Error)]
pub enum ProtocolError {
	/// The probe output ended before every path was accounted for.
	#[error("probe output truncated while reading {path}: expected {expected}")]
	Truncated { path: PathBuf, expected: &'static str },

	/// A line that must be blank was not.
	#[error("probe output malformed at {path}: expected blank line, found {found:?}")]
	ExpectedBlank { path: PathBuf, found: String },

	/// A flag line carried a token the probe script never emits.
	#[error("unknown attribute flag: {0:?}")]
	UnknownFlag(String),

	/// Output remained after the last path was parsed.
	#[error("probe output has {0} trailing bytes")]
	TrailingOutput(usize),
}
