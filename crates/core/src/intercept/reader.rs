use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::cache::{CacheGateway, CacheValue, Property};
use crate::error::Result;
use crate::host::RemotePathResolver;
use crate::lookup::RemoteFiles;

/// Host primitive that reads a whole file.
#[async_trait]
pub trait FileReader: Send + Sync {
	async fn read(&self, location: &str) -> Result<Vec<u8>>;
}

#[async_trait]
impl<T: FileReader + ?Sized> FileReader for Arc<T> {
	async fn read(&self, location: &str) -> Result<Vec<u8>> {
		(**self).read(location).await
	}
}

/// Serves file contents from the metadata cache when it holds them.
///
/// With [`CachedFileReader::with_prefetch`], a miss triggers a batch probe
/// first; otherwise misses go straight to the wrapped reader.
pub struct CachedFileReader<R> {
	inner: R,
	cache: Arc<dyn CacheGateway>,
	resolver: Arc<dyn RemotePathResolver>,
	files: Option<RemoteFiles>,
}

impl<R> CachedFileReader<R> {
	pub fn new(inner: R, cache: Arc<dyn CacheGateway>, resolver: Arc<dyn RemotePathResolver>) -> Self {
		Self {
			inner,
			cache,
			resolver,
			files: None,
		}
	}

	pub fn with_prefetch(mut self, files: RemoteFiles) -> Self {
		self.files = Some(files);
		self
	}
}

#[async_trait]
impl<R: FileReader> FileReader for CachedFileReader<R> {
	async fn read(&self, location: &str) -> Result<Vec<u8>> {
		let remote = match self.resolver.resolve(location) {
			Ok(remote) => remote,
			Err(_) => return self.inner.read(location).await,
		};

		if let Some(CacheValue::Content(Some(content))) =
			self.cache.get(&remote.host, &remote.path, Property::Content)
		{
			trace!(target = "shellmux.intercept", path = %remote, bytes = content.len(), "read served from cache");
			return Ok(content.to_vec());
		}

		if let Some(files) = &self.files {
			match files.read(&remote).await {
				Ok(Some(content)) => return Ok(content.to_vec()),
				Ok(None) => {}
				Err(e) if e.allows_fallback() => {
					debug!(target = "shellmux.intercept", path = %remote, reason = %e, "read prefetch failed");
				}
				Err(e) => return Err(e),
			}
		}

		self.inner.read(location).await
	}
}
