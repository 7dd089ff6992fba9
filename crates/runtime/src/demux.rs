//! Accumulated shell output for one session.

use shellmux_protocol::{Completion, Markers, find_completion};

use crate::command::CommandOutput;

/// Buffers everything a session's shell prints and extracts one command's
/// result at a time.
///
/// `floor` is the buffer length when the current command was submitted; the
/// completion search never looks below it.
#[derive(Debug, Default)]
pub(crate) struct OutputDemuxer {
	buffer: Vec<u8>,
	floor: usize,
	/// Next byte to hand to a streaming consumer.
	forwarded: usize,
	/// The stderr marker has been seen while streaming; nothing past it is stdout.
	streaming_done: bool,
}

impl OutputDemuxer {
	/// Records the current end of output as the lower bound for the next search.
	pub fn arm(&mut self) {
		self.floor = self.buffer.len();
		self.forwarded = self.floor;
		self.streaming_done = false;
	}

	pub fn push(&mut self, chunk: &[u8]) {
		self.buffer.extend_from_slice(chunk);
	}

	pub fn scan(&self, markers: &Markers) -> Option<Completion> {
		find_completion(&self.buffer, self.floor, markers)
	}

	/// Stdout bytes that can be handed out before the command completes.
	///
	/// A trailing partial stderr marker is held back until more output arrives.
	pub fn streamable(&mut self, markers: &Markers) -> Option<Vec<u8>> {
		if self.streaming_done {
			return None;
		}

		let marker = markers.stderr().as_bytes();
		let pending = &self.buffer[self.forwarded..];
		let stop = match pending.windows(marker.len()).position(|w| w == marker) {
			Some(at) => {
				self.streaming_done = true;
				self.forwarded + at
			}
			None => self.buffer.len() - partial_marker_suffix(pending, marker),
		};

		if stop == self.forwarded {
			return None;
		}
		let bytes = self.buffer[self.forwarded..stop].to_vec();
		self.forwarded = stop;
		Some(bytes)
	}

	/// Stdout bytes of a completed command not yet handed to a streaming consumer.
	pub fn unstreamed(&self, completion: &Completion) -> &[u8] {
		let from = self.forwarded.clamp(completion.stdout.start, completion.stdout.end);
		&self.buffer[from..completion.stdout.end]
	}

	/// Extracts the command's output and discards everything up to the end of
	/// its completion line.
	pub fn take(&mut self, completion: &Completion, keep_stderr: bool) -> CommandOutput {
		let stdout = self.buffer[completion.stdout.clone()].to_vec();
		let stderr = if keep_stderr {
			Some(
				completion
					.stderr
					.clone()
					.map(|range| self.buffer[range].to_vec())
					.unwrap_or_default(),
			)
		} else {
			None
		};

		self.buffer.drain(..completion.end);
		self.floor = 0;
		self.forwarded = 0;

		CommandOutput {
			exit_code: completion.exit_code,
			stdout,
			stderr,
		}
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.buffer.len()
	}
}

/// Length of the longest proper prefix of `marker` that `bytes` ends with.
fn partial_marker_suffix(bytes: &[u8], marker: &[u8]) -> usize {
	let longest = marker.len().saturating_sub(1).min(bytes.len());
	(1..=longest)
		.rev()
		.find(|&n| bytes.ends_with(&marker[..n]))
		.unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fed(chunks: &[&[u8]]) -> OutputDemuxer {
		let mut demux = OutputDemuxer::default();
		demux.arm();
		for chunk in chunks {
			demux.push(chunk);
		}
		demux
	}

	#[test]
	fn completion_split_across_chunks() {
		let markers = Markers::fixed();
		let mut demux = fed(&[b"hi\n__SHELLMUX_STD", b"ERR__0 DO"]);
		assert!(demux.scan(&markers).is_none());

		demux.push(b"NE\n");
		let done = demux.scan(&markers).unwrap();
		let output = demux.take(&done, false);
		assert_eq!(output.exit_code, 0);
		assert_eq!(output.stdout, b"hi\n");
		assert!(output.stderr.is_none());
		assert_eq!(demux.len(), 0);
	}

	#[test]
	fn stale_marker_below_floor_is_ignored() {
		let markers = Markers::fixed();
		let mut demux = OutputDemuxer::default();
		demux.push(b"late output 0 DONE\n");
		demux.arm();
		assert!(demux.scan(&markers).is_none());

		demux.push(b"fresh__SHELLMUX_STDERR__7 DONE\n");
		let done = demux.scan(&markers).unwrap();
		let output = demux.take(&done, true);
		assert_eq!(output.exit_code, 7);
		assert_eq!(output.stdout, b"fresh");
		assert_eq!(output.stderr.as_deref(), Some(&b""[..]));
	}

	#[test]
	fn bytes_after_completion_line_survive_take() {
		let markers = Markers::fixed();
		let mut demux = fed(&[b"a__SHELLMUX_STDERR__0 DONE\nnext"]);
		let done = demux.scan(&markers).unwrap();
		demux.take(&done, false);
		assert_eq!(demux.len(), 4);
	}

	#[test]
	fn streaming_holds_back_possible_marker_prefix() {
		let markers = Markers::fixed();
		let mut demux = fed(&[b"progress 10%\n__SHELL"]);
		let first = demux.streamable(&markers).unwrap();
		assert_eq!(first, b"progress 10%\n");

		demux.push(b"MUX_STDERR__0 DONE\n");
		assert!(demux.streamable(&markers).is_none());

		let done = demux.scan(&markers).unwrap();
		assert!(demux.unstreamed(&done).is_empty());
		assert_eq!(demux.take(&done, false).stdout, b"progress 10%\n");
	}

	#[test]
	fn unstreamed_returns_the_remaining_stdout() {
		let markers = Markers::fixed();
		let mut demux = fed(&[b"abcdefghijklmnopqrstuvwxyz0123456789"]);
		let streamed = demux.streamable(&markers).unwrap();
		demux.push(b"__SHELLMUX_STDERR__0 DONE\n");
		let done = demux.scan(&markers).unwrap();

		let mut all = streamed;
		all.extend_from_slice(demux.unstreamed(&done));
		assert_eq!(all, b"abcdefghijklmnopqrstuvwxyz0123456789");
	}
}
