//! Batch probe: one shell script answering attribute queries for many paths.
//!
//! For each path, in order, the script prints:
//!
//! ```text
//! <flags>\n                       space-joined subset of `e f r w d l`
//! \n<truename>\n\n<stat>\n        only when the path exists
//! \n<content><eof-sentinel>\n     only for readable regular files
//! \n                              separator
//! ```
//!
//! The script's exit status is that of a final check that `stat` and
//! `readlink` exist on the remote, so a host missing them fails the whole batch
//! instead of yielding records with blank canonical paths and stat fields.

use std::path::{Path, PathBuf};

use crate::error::{ProtocolError, Result};
use crate::markers::Markers;
use crate::quote::quote_path;
use crate::record::{
	AttributeFlags, FLAG_DIRECTORY, FLAG_EXISTS, FLAG_READABLE, FLAG_REGULAR, FLAG_SYMLINK,
	FLAG_WRITABLE, FileMetadataRecord,
};

/// Last statement of every probe; sets the script's exit status.
const TOOLS_CHECK: &str = "command -v stat >/dev/null 2>&1 && command -v readlink >/dev/null 2>&1";

/// `stat` format producing the fields [`crate::StatFields`] understands.
pub const STAT_FORMAT: &str = "%s %Y %a %u %g %i %h";

const TESTS: [(&str, &str); 6] = [
	(FLAG_EXISTS, "-e"),
	(FLAG_REGULAR, "-f"),
	(FLAG_READABLE, "-r"),
	(FLAG_WRITABLE, "-w"),
	(FLAG_DIRECTORY, "-d"),
	(FLAG_SYMLINK, "-L"),
];

/// Script text for an ordered set of paths.
#[derive(Debug, Clone)]
pub struct ProbeScript {
	paths: Vec<PathBuf>,
	text: String,
}

impl ProbeScript {
	pub fn build(paths: &[PathBuf], markers: &Markers) -> Self {
		let mut text = String::with_capacity(paths.len() * 512);
		for path in paths {
			push_path_probe(&mut text, path, markers);
		}
		text.push_str(TOOLS_CHECK);
		Self {
			paths: paths.to_vec(),
			text,
		}
	}

	pub fn paths(&self) -> &[PathBuf] {
		&self.paths
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	/// Parses the script's stdout into one record per path, in path order.
	pub fn parse(&self, output: &[u8], markers: &Markers) -> Result<Vec<FileMetadataRecord>> {
		parse_probe_output(&self.paths, output, markers)
	}
}

fn push_path_probe(text: &mut String, path: &Path, markers: &Markers) {
	let q = quote_path(path);

	for (flag, test) in TESTS {
		text.push_str(&format!("if [ {test} {q} ]; then printf '{flag} '; fi; "));
	}
	text.push_str("echo; ");

	text.push_str(&format!(
		"if [ -e {q} ]; then echo; {{ readlink -f {q} 2>/dev/null || echo; }}; echo; \
		 {{ stat -L -c '{STAT_FORMAT}' {q} 2>/dev/null || echo; }}; fi; "
	));

	text.push_str(&format!(
		"if [ -f {q} ] && [ -r {q} ]; then echo; cat {q} 2>/dev/null; echo {eof}; fi; ",
		eof = markers.eof()
	));

	text.push_str("echo; ");
}

/// Walks probe output path by path.
pub fn parse_probe_output(
	paths: &[PathBuf],
	output: &[u8],
	markers: &Markers,
) -> Result<Vec<FileMetadataRecord>> {
	let mut cursor = Cursor { buf: output, pos: 0 };
	let mut records = Vec::with_capacity(paths.len());

	for path in paths {
		let flags_line = cursor.line(path, "attribute flags")?;
		let flags = AttributeFlags::parse(&String::from_utf8_lossy(flags_line))?;
		let mut record = FileMetadataRecord::missing(path.clone());
		record.flags = flags;

		if flags.exists {
			cursor.blank(path)?;
			let truename = cursor.line(path, "canonical path")?;
			if !truename.is_empty() {
				record.truename = Some(PathBuf::from(String::from_utf8_lossy(truename).into_owned()));
			}
			cursor.blank(path)?;
			let stat = cursor.line(path, "stat fields")?;
			if !stat.is_empty() {
				record.stat = Some(String::from_utf8_lossy(stat).into_owned());
			}
		}

		if flags.is_readable_file() {
			cursor.blank(path)?;
			let content = cursor.until(markers.eof().as_bytes(), path)?;
			record.content = Some(content.to_vec());
			cursor.line_end(path)?;
		}

		cursor.blank(path)?;
		records.push(record);
	}

	match output.len() - cursor.pos {
		0 => Ok(records),
		rest => Err(ProtocolError::TrailingOutput(rest)),
	}
}

struct Cursor<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Cursor<'a> {
	/// Next line without its terminator (`\n` or `\r\n`).
	fn line(&mut self, path: &Path, expected: &'static str) -> Result<&'a [u8]> {
		let rest = &self.buf[self.pos..];
		let Some(nl) = rest.iter().position(|&b| b == b'\n') else {
			return Err(truncated(path, expected));
		};
		self.pos += nl + 1;
		let line = &rest[..nl];
		Ok(line.strip_suffix(b"\r").unwrap_or(line))
	}

	fn blank(&mut self, path: &Path) -> Result<()> {
		let line = self.line(path, "blank line")?;
		if line.is_empty() {
			Ok(())
		} else {
			Err(ProtocolError::ExpectedBlank {
				path: path.to_path_buf(),
				found: String::from_utf8_lossy(line).into_owned(),
			})
		}
	}

	/// Bytes up to `sentinel`; the cursor moves past the sentinel.
	fn until(&mut self, sentinel: &[u8], path: &Path) -> Result<&'a [u8]> {
		let rest = &self.buf[self.pos..];
		let Some(at) = rest.windows(sentinel.len()).position(|w| w == sentinel) else {
			return Err(truncated(path, "end-of-file sentinel"));
		};
		self.pos += at + sentinel.len();
		Ok(&rest[..at])
	}

	/// Consumes the line terminator that follows a sentinel.
	fn line_end(&mut self, path: &Path) -> Result<()> {
		self.blank(path)
	}
}

fn truncated(path: &Path, expected: &'static str) -> ProtocolError {
	ProtocolError::Truncated {
		path: path.to_path_buf(),
		expected,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn paths(list: &[&str]) -> Vec<PathBuf> {
		list.iter().map(PathBuf::from).collect()
	}

	#[test]
	fn script_probes_each_path_in_order() {
		let script = ProbeScript::build(&paths(&["/srv/a", "/srv/b c"]), &Markers::fixed());
		let first = script.text().find("[ -e /srv/a ]").unwrap();
		let second = script.text().find("[ -e '/srv/b c' ]").unwrap();
		assert!(first < second);
		assert!(script.text().contains("echo __SHELLMUX_EOF__;"));
		assert!(script.text().contains("stat -L -c '%s %Y %a %u %g %i %h'"));
		assert!(script.text().ends_with("echo; command -v stat >/dev/null 2>&1 && command -v readlink >/dev/null 2>&1"));
	}

	#[test]
	fn parses_mixed_output() {
		let out = b"e f r w \n\n/srv/repo/HEAD\n\n23 1700000000 644 1000 1000 77 1\n\nref: refs/heads/main\n__SHELLMUX_EOF__\n\n\
			e r w d \n\n/srv/repo/refs\n\n4096 1700000000 755 1000 1000 78 3\n\n\
			\n\n\
			l \n\n";
		let probe = paths(&["/srv/repo/HEAD", "/srv/repo/refs", "/srv/repo/nope", "/srv/repo/dangling"]);
		let records = parse_probe_output(&probe, out, &Markers::fixed()).unwrap();

		assert_eq!(records.len(), 4);
		assert_eq!(records[0].content.as_deref(), Some(&b"ref: refs/heads/main\n"[..]));
		assert_eq!(records[0].stat_fields().unwrap().size, 23);
		assert!(records[1].flags.directory);
		assert!(records[1].content.is_none());
		assert_eq!(records[1].truename.as_deref(), Some(Path::new("/srv/repo/refs")));
		assert!(!records[2].flags.exists);
		assert!(records[2].truename.is_none());
		assert!(records[3].flags.symlink && !records[3].flags.exists);
	}

	#[test]
	fn content_without_trailing_newline() {
		let out = b"e f r \n\n/x\n\n3 1 600 0 0 1 1\n\nabc__SHELLMUX_EOF__\n\n";
		let records = parse_probe_output(&paths(&["/x"]), out, &Markers::fixed()).unwrap();
		assert_eq!(records[0].content.as_deref(), Some(&b"abc"[..]));
	}

	#[test]
	fn binary_content_survives() {
		let mut out = b"e f r \n\n/bin.dat\n\n4 1 600 0 0 1 1\n\n".to_vec();
		out.extend_from_slice(&[0, 159, 146, 150]);
		out.extend_from_slice(b"__SHELLMUX_EOF__\n\n");
		let records = parse_probe_output(&paths(&["/bin.dat"]), &out, &Markers::fixed()).unwrap();
		assert_eq!(records[0].content.as_deref(), Some(&[0u8, 159, 146, 150][..]));
	}

	#[test]
	fn truncated_output_is_an_error() {
		let out = b"e f r \n\n/x\n\n3 1 600 0 0 1 1\n\nabc";
		let err = parse_probe_output(&paths(&["/x"]), out, &Markers::fixed()).unwrap_err();
		assert!(matches!(err, ProtocolError::Truncated { .. }));
	}

	#[test]
	fn missing_separator_is_an_error() {
		let out = b"\nstray\n";
		let err = parse_probe_output(&paths(&["/x"]), out, &Markers::fixed()).unwrap_err();
		assert!(matches!(err, ProtocolError::ExpectedBlank { .. }));
	}

	#[test]
	fn trailing_bytes_are_an_error() {
		let out = b"\n\nextra";
		let err = parse_probe_output(&paths(&["/x"]), out, &Markers::fixed()).unwrap_err();
		assert!(matches!(err, ProtocolError::TrailingOutput(5)));
	}
}
