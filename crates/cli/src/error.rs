use std::path::PathBuf;

use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error("failed to read config {path}: {source}")]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("malformed config {path}: {source}")]
	ConfigParse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error(transparent)]
	Accelerator(#[from] shellmux::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl From<shellmux_runtime::Error> for CliError {
	fn from(err: shellmux_runtime::Error) -> Self {
		CliError::Accelerator(err.into())
	}
}

impl CliError {
	/// Converts this error into the envelope's error object.
	pub fn to_command_error(&self) -> CommandError {
		let (code, message, details) = match self {
			CliError::InvalidInput(msg) => (ErrorCode::InvalidInput, msg.clone(), None),
			CliError::ConfigRead { path, .. } | CliError::ConfigParse { path, .. } => (
				ErrorCode::ConfigError,
				self.to_string(),
				Some(serde_json::json!({ "path": path })),
			),
			CliError::Accelerator(err) => classify_accelerator_error(err),
			CliError::Io(err) => (ErrorCode::IoError, err.to_string(), None),
			CliError::Json(err) => (ErrorCode::InternalError, format!("JSON error: {err}"), None),
			CliError::Anyhow(err) => match err.downcast_ref::<std::io::Error>() {
				Some(_) => (ErrorCode::IoError, format!("{err:#}"), None),
				None => (ErrorCode::InternalError, format!("{err:#}"), None),
			},
		};

		CommandError {
			code,
			message,
			details,
		}
	}
}

fn classify_accelerator_error(err: &shellmux::Error) -> (ErrorCode, String, Option<serde_json::Value>) {
	use shellmux::Error as Accel;

	let message = err.to_string();
	match err {
		Accel::NotRemote(location) | Accel::InvalidLocation { location, .. } => (
			ErrorCode::InvalidInput,
			message,
			Some(serde_json::json!({ "location": location })),
		),
		Accel::AttributesUnavailable { exit_code } => (
			ErrorCode::AttributesUnavailable,
			message,
			Some(serde_json::json!({ "exitCode": exit_code })),
		),
		Accel::Protocol(_) => (ErrorCode::ProtocolError, message, None),
		Accel::Io(_) => (ErrorCode::IoError, message, None),
		Accel::Host(_) => (ErrorCode::ConnectionFailed, message, None),
		Accel::Runtime(inner) => {
			let (code, message, details) = classify_runtime_error(inner, message);
			let details = if inner.is_session_lost() {
				let mut details = details.unwrap_or_else(|| serde_json::json!({}));
				details["sessionLost"] = serde_json::Value::Bool(true);
				Some(details)
			} else {
				details
			};
			(code, message, details)
		}
	}
}

fn classify_runtime_error(
	inner: &shellmux_runtime::Error,
	message: String,
) -> (ErrorCode, String, Option<serde_json::Value>) {
	use shellmux_runtime::Error as Runtime;

	match inner {
		Runtime::LauncherNotFound(_) | Runtime::LaunchFailed(_) | Runtime::SessionClosed(_) => {
			(ErrorCode::ConnectionFailed, message, None)
		}
		Runtime::Resolution { path, .. } => (
			ErrorCode::ResolutionFailed,
			message,
			Some(serde_json::json!({ "path": path })),
		),
		Runtime::Timeout { after, .. } => (
			ErrorCode::Timeout,
			message,
			Some(serde_json::json!({ "timeoutMs": after.as_millis() as u64 })),
		),
		Runtime::Protocol(_) | Runtime::NotFree { .. } | Runtime::NotComplete { .. } => {
			(ErrorCode::ProtocolError, message, None)
		}
		Runtime::Io(_) => (ErrorCode::IoError, message, None),
	}
}
