//! Result envelope shared by every command.
//!
//! With `--format json` each command prints one envelope on stdout:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "ok": true,
//!   "command": "run",
//!   "data": { ... },
//!   "timings": { "durationMs": 42 }
//! }
//! ```
//!
//! On failure `data` is replaced by
//! `"error": { "code": "RESOLUTION_FAILED", "message": "..." }`.
//! With `--format text` commands print their data the way a shell user expects
//! (raw command output, one line per path) and errors go to stderr.


use std::io::{self, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Bumped on breaking changes to the envelope.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// JSON envelope
	Json,
}

impl std::str::FromStr for OutputFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"text" => Ok(OutputFormat::Text),
			"json" => Ok(OutputFormat::Json),
			_ => Err(format!("unknown format: {s}")),
		}
	}
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
		}
	}
}

/// How a command's data reads in text mode.
pub trait TextOutput {
	fn write_text(&self, out: &mut dyn Write) -> io::Result<()>;
}

impl TextOutput for () {
	fn write_text(&self, _out: &mut dyn Write) -> io::Result<()> {
		Ok(())
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema_version: Option<u32>,

	pub ok: bool,

	/// Subcommand name (`run`, `exec`, `stat`, `cat`)
	pub command: String,

	/// Only present on success
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,

	/// Only present on failure
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub timings: Option<Timings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,

	pub message: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Bad location or arguments
	InvalidInput,
	/// Unreadable or malformed config file
	ConfigError,
	/// No ssh client, or the shell could not be started
	ConnectionFailed,
	/// The location is not inside a git repository
	ResolutionFailed,
	/// A command did not complete in time
	Timeout,
	/// The shell's output did not follow the framing protocol
	ProtocolError,
	/// A metadata probe failed
	AttributesUnavailable,
	IoError,
	InternalError,
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
			ErrorCode::ConfigError => write!(f, "CONFIG_ERROR"),
			ErrorCode::ConnectionFailed => write!(f, "CONNECTION_FAILED"),
			ErrorCode::ResolutionFailed => write!(f, "RESOLUTION_FAILED"),
			ErrorCode::Timeout => write!(f, "TIMEOUT"),
			ErrorCode::ProtocolError => write!(f, "PROTOCOL_ERROR"),
			ErrorCode::AttributesUnavailable => write!(f, "ATTRIBUTES_UNAVAILABLE"),
			ErrorCode::IoError => write!(f, "IO_ERROR"),
			ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
		}
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	pub duration_ms: u64,
}

impl From<Duration> for Timings {
	fn from(duration: Duration) -> Self {
		Timings {
			duration_ms: duration.as_millis() as u64,
		}
	}
}

pub struct ResultBuilder<T: Serialize> {
	command: String,
	data: Option<T>,
	error: Option<CommandError>,
	start_time: Instant,
}

impl<T: Serialize> ResultBuilder<T> {
	/// Starts the clock for `command`.
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			data: None,
			error: None,
			start_time: Instant::now(),
		}
	}

	/// Keeps timing from an earlier start.
	pub fn started_at(mut self, start: Instant) -> Self {
		self.start_time = start;
		self
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, error: CommandError) -> Self {
		self.error = Some(error);
		self
	}

	pub fn build(self) -> CommandResult<T> {
		let ok = self.error.is_none() && self.data.is_some();
		CommandResult {
			schema_version: Some(SCHEMA_VERSION),
			ok,
			command: self.command,
			data: self.data,
			error: self.error,
			timings: Some(Timings::from(self.start_time.elapsed())),
		}
	}
}

/// Prints a result to stdout in the given format.
pub fn print_result<T: Serialize + TextOutput>(result: &CommandResult<T>, format: OutputFormat) {
	match format {
		OutputFormat::Json => {
			if let Ok(json) = serde_json::to_string_pretty(result) {
				println!("{json}");
			}
		}
		OutputFormat::Text => {
			let mut stdout = io::stdout().lock();
			if let Some(data) = &result.data {
				let _ = data.write_text(&mut stdout);
			}
			let _ = stdout.flush();
			if let Some(error) = &result.error {
				print_error_stderr(error);
			}
		}
	}
}

pub fn print_error_stderr(error: &CommandError) {
	eprintln!("Error [{}]: {}", error.code, error.message);
}
