//! Completion scanning over a session's accumulated output.
//!
//! The scanner never looks below the offset recorded when the command was
//! submitted, so a marker left behind by an earlier command cannot complete the
//! current one.

use std::ops::Range;

use crate::markers::Markers;

/// Location of one command's result inside the output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
	/// Exit status reported by the shell.
	pub exit_code: i32,
	/// Bytes the command wrote to stdout (and stderr, when not redirected).
	pub stdout: Range<usize>,
	/// Bytes replayed from the stderr temp file, when the stderr marker was seen.
	pub stderr: Option<Range<usize>>,
	/// Offset just past the completion line; bytes from here on belong to
	/// whatever the shell prints next.
	pub end: usize,
}

/// Searches `buf[start..]` backward for `<digits> <done-marker>` followed by a
/// line end.
///
/// Returns `None` while the marker line has not fully arrived.
///
/// The exit code is printed straight after the replayed stderr with no
/// separator, so separately captured stderr that ends in digits without a
/// trailing newline runs into it: `line 7` followed by exit 1 reads back as
/// stderr `line ` and exit code 71. Callers needing exact codes should make
/// sure such stderr ends with a newline.
pub fn find_completion(buf: &[u8], start: usize, markers: &Markers) -> Option<Completion> {
	if start > buf.len() {
		return None;
	}

	let mut needle = Vec::with_capacity(markers.done().len() + 1);
	needle.push(b' ');
	needle.extend_from_slice(markers.done().as_bytes());

	let mut limit = buf.len();
	while let Some(at) = rfind(&buf[start..limit], &needle).map(|pos| start + pos) {
		limit = at;

		let after = at + needle.len();
		let line_end = match &buf[after..] {
			[] | [b'\r'] => return None,
			[b'\n', ..] => after + 1,
			[b'\r', b'\n', ..] => after + 2,
			_ => continue,
		};

		let Some((digits_start, exit_code)) = exit_code_before(buf, start, at) else {
			continue;
		};

		let (stdout, stderr) = match rfind(&buf[start..digits_start], markers.stderr().as_bytes()) {
			Some(pos) => {
				let marker_start = start + pos;
				let marker_end = marker_start + markers.stderr().len();
				(start..marker_start, Some(marker_end..digits_start))
			}
			None => (start..digits_start, None),
		};

		return Some(Completion {
			exit_code,
			stdout,
			stderr,
			end: line_end,
		});
	}

	None
}

/// Parses the run of ASCII digits ending at `end`, not reaching below `floor`.
fn exit_code_before(buf: &[u8], floor: usize, end: usize) -> Option<(usize, i32)> {
	let mut begin = end;
	while begin > floor && buf[begin - 1].is_ascii_digit() {
		begin -= 1;
	}
	if begin == end {
		return None;
	}
	let digits = std::str::from_utf8(&buf[begin..end]).ok()?;
	let code = digits.parse::<i32>().ok()?;
	Some((begin, code))
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	if needle.is_empty() || haystack.len() < needle.len() {
		return None;
	}
	haystack.windows(needle.len()).rposition(|window| window == needle)
}
