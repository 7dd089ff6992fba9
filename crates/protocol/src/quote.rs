//! POSIX shell quoting for text interpolated into wire commands.

use std::borrow::Cow;
use std::path::Path;

/// Quotes `arg` for a POSIX shell, leaving it untouched when it only holds safe characters.
///
/// Also used for literal stdin text after `printf '%s'`, where an unquoted
/// leading dash is harmless because the format string comes first.
pub fn quote_arg(arg: &str) -> Cow<'_, str> {
	shell_escape::unix::escape(Cow::Borrowed(arg))
}

/// Quotes a remote path for a POSIX shell.
pub fn quote_path(path: &Path) -> String {
	quote_arg(&path.to_string_lossy()).into_owned()
}

/// Joins an argument vector into a single shell command line.
pub fn join_args<S: AsRef<str>>(program: &str, args: &[S]) -> String {
	let mut line = quote_arg(program).into_owned();
	for arg in args {
		line.push(' ');
		line.push_str(&quote_arg(arg.as_ref()));
	}
	line
}
