//! Decorators over the host's own primitives.
//!
//! Each host primitive is a trait; each decorator wraps the host's
//! implementation, serves the request through the accelerator when it can,
//! and otherwise hands it to the wrapped implementation unchanged.

mod dispatcher;
mod process;
mod reader;

pub use dispatcher::{AcceleratedDispatcher, VcsDispatcher, VcsRequest};
pub use process::{AcceleratedProcessStarter, ProcessRequest, ProcessStarter};
pub use reader::{CachedFileReader, FileReader};

use std::path::Path;

use shellmux_runtime::{ConnectionKind, RuntimeConfig};

/// Program whose invocations are accelerated.
pub const ACCELERATED_PROGRAM: &str = "git";

/// Longest framed line sent over a pty; longer ones go over raw pipes,
/// since terminals cap the length of an input line.
const MAX_INTERACTIVE_LINE: usize = 1024;

/// Interactive framing unless the command carries input or its framed line
/// would be too long for a terminal.
///
/// Piped input may contain carriage returns, which a pty would rewrite.
pub(crate) fn connection_kind_for(
	config: &RuntimeConfig,
	dir: &Path,
	command_text: &str,
	input: Option<&str>,
	separate_stderr: bool,
) -> ConnectionKind {
	if input.is_some() || config.framed_len(dir, command_text, separate_stderr) > MAX_INTERACTIVE_LINE {
		ConnectionKind::Raw
	} else {
		ConnectionKind::Interactive
	}
}

/// Whether `program` names the accelerated program, with or without a directory.
pub(crate) fn is_accelerated_program(program: &str) -> bool {
	Path::new(program)
		.file_name()
		.is_some_and(|name| name == ACCELERATED_PROGRAM)
}
