//! Byte pump between a shell's stdout and the session that owns it.

use std::sync::Weak;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const READ_CHUNK: usize = 32 * 1024;

/// Receives raw shell output in arrival order.
pub(crate) trait OutputSink: Send + Sync + 'static {
	fn on_data(&self, chunk: &[u8]);

	/// The stream ended or failed; no more data will arrive.
	fn on_eof(&self);
}

/// Spawns a task that feeds everything read from `reader` to `sink`.
///
/// The task holds only a weak reference, so dropping the sink stops it at
/// the next read.
pub(crate) fn spawn_reader<R, S>(mut reader: R, sink: Weak<S>) -> JoinHandle<()>
where
	R: AsyncRead + Unpin + Send + 'static,
	S: OutputSink,
{
	tokio::spawn(async move {
		let mut buf = vec![0u8; READ_CHUNK];
		loop {
			match reader.read(&mut buf).await {
				Ok(0) => {
					debug!(target = "shellmux.transport", "shell output closed");
					break;
				}
				Ok(n) => match sink.upgrade() {
					Some(sink) => sink.on_data(&buf[..n]),
					None => return,
				},
				Err(e) => {
					warn!(target = "shellmux.transport", error = %e, "shell output read failed");
					break;
				}
			}
		}
		if let Some(sink) = sink.upgrade() {
			sink.on_eof();
		}
	})
}
