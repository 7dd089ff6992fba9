//! Cache-first metadata lookups with a batch probe on miss.

use std::path::PathBuf;
use std::sync::Arc;

use shellmux_protocol::FileMetadataRecord;
use shellmux_runtime::ConnectionKind;
use tracing::trace;

use crate::accelerator::Accelerator;
use crate::cache::{CacheValue, Property};
use crate::error::{Error, Result};
use crate::host::{HostIdentity, RemotePath};

/// Answers attribute queries for remote files.
#[derive(Clone)]
pub struct RemoteFiles {
	accelerator: Arc<Accelerator>,
}

impl RemoteFiles {
	pub fn new(accelerator: Arc<Accelerator>) -> Self {
		Self { accelerator }
	}

	/// One property of `remote`, probing the host only when the cache misses.
	pub async fn property(&self, remote: &RemotePath, property: Property) -> Result<CacheValue> {
		let cache = self.accelerator.cache();
		if let Some(value) = cache.get(&remote.host, &remote.path, property) {
			trace!(target = "shellmux.loader", path = %remote, ?property, "cache hit");
			return Ok(value);
		}

		self.prefetch(&remote.host, std::slice::from_ref(&remote.path))
			.await?;
		cache
			.get(&remote.host, &remote.path, property)
			.ok_or(Error::AttributesUnavailable { exit_code: 0 })
	}

	/// Content of `remote`, or `None` when it is not a readable regular file.
	pub async fn read(&self, remote: &RemotePath) -> Result<Option<Arc<[u8]>>> {
		match self.property(remote, Property::Content).await? {
			CacheValue::Content(content) => Ok(content),
			_ => Ok(None),
		}
	}

	/// Probes `paths` in one round trip and caches the results.
	///
	/// The session is chosen by the first path.
	pub async fn prefetch(&self, host: &HostIdentity, paths: &[PathBuf]) -> Result<Vec<FileMetadataRecord>> {
		let Some(first) = paths.first() else {
			return Ok(Vec::new());
		};

		let anchor = RemotePath::new(host.clone(), first);
		let session = self.accelerator.acquire(&anchor, ConnectionKind::Raw).await?;
		self.accelerator.loader().load(host, &session, paths).await
	}
}
