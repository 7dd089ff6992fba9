//! Metadata cache keyed by (host, path, property).
//!
//! The accelerator writes probe results here and interceptors read from it.
//! Hosts with their own cache implement [`CacheGateway`]; [`MemoryCache`] is a
//! process-local implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shellmux_protocol::FileMetadataRecord;
use shellmux_runtime::CacheInvalidator;
use tracing::trace;

use crate::host::HostIdentity;

/// One cached fact about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Property {
	Exists,
	Regular,
	Readable,
	Writable,
	Directory,
	Symlink,
	Truename,
	Stat,
	Content,
}

impl Property {
	pub const ALL: [Property; 9] = [
		Property::Exists,
		Property::Regular,
		Property::Readable,
		Property::Writable,
		Property::Directory,
		Property::Symlink,
		Property::Truename,
		Property::Stat,
		Property::Content,
	];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
	Flag(bool),
	/// Canonical path; `None` when the path does not exist.
	Truename(Option<PathBuf>),
	/// Raw stat line; `None` when the path does not exist.
	Stat(Option<String>),
	/// File content; `None` when the path is not a readable regular file.
	Content(Option<Arc<[u8]>>),
}

impl CacheValue {
	pub fn as_flag(&self) -> Option<bool> {
		match self {
			CacheValue::Flag(flag) => Some(*flag),
			_ => None,
		}
	}

	pub fn as_content(&self) -> Option<&Arc<[u8]>> {
		match self {
			CacheValue::Content(content) => content.as_ref(),
			_ => None,
		}
	}
}

/// Splits a probe record into one cache entry per property.
pub fn record_entries(record: &FileMetadataRecord) -> [(Property, CacheValue); 9] {
	let flags = record.flags;
	[
		(Property::Exists, CacheValue::Flag(flags.exists)),
		(Property::Regular, CacheValue::Flag(flags.regular)),
		(Property::Readable, CacheValue::Flag(flags.readable)),
		(Property::Writable, CacheValue::Flag(flags.writable)),
		(Property::Directory, CacheValue::Flag(flags.directory)),
		(Property::Symlink, CacheValue::Flag(flags.symlink)),
		(Property::Truename, CacheValue::Truename(record.truename.clone())),
		(Property::Stat, CacheValue::Stat(record.stat.clone())),
		(
			Property::Content,
			CacheValue::Content(record.content.as_deref().map(Arc::from)),
		),
	]
}

/// Metadata cache the accelerator populates and consults.
///
/// Writes are last-writer-wins per key.
pub trait CacheGateway: Send + Sync {
	fn get(&self, host: &HostIdentity, path: &Path, property: Property) -> Option<CacheValue>;

	fn set(&self, host: &HostIdentity, path: &Path, property: Property, value: CacheValue);

	/// Drops every property cached for `path`.
	fn flush(&self, host: &HostIdentity, path: &Path);

	fn get_or(
		&self,
		host: &HostIdentity,
		path: &Path,
		property: Property,
		default: CacheValue,
	) -> CacheValue {
		self.get(host, path, property).unwrap_or(default)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
	host: HostIdentity,
	path: PathBuf,
	property: Property,
}

/// Concurrent in-memory [`CacheGateway`].
#[derive(Debug, Default)]
pub struct MemoryCache {
	entries: DashMap<CacheKey, CacheValue>,
}

impl MemoryCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	fn key(host: &HostIdentity, path: &Path, property: Property) -> CacheKey {
		CacheKey {
			host: host.clone(),
			path: path.to_path_buf(),
			property,
		}
	}
}

impl CacheGateway for MemoryCache {
	fn get(&self, host: &HostIdentity, path: &Path, property: Property) -> Option<CacheValue> {
		self.entries
			.get(&Self::key(host, path, property))
			.map(|entry| entry.value().clone())
	}

	fn set(&self, host: &HostIdentity, path: &Path, property: Property, value: CacheValue) {
		self.entries.insert(Self::key(host, path, property), value);
	}

	fn flush(&self, host: &HostIdentity, path: &Path) {
		for property in Property::ALL {
			self.entries.remove(&Self::key(host, path, property));
		}
	}
}

/// Flushes a host's cache entries when a session reports its tracked paths
/// may have changed.
pub struct CacheFlusher {
	cache: Arc<dyn CacheGateway>,
	host: HostIdentity,
}

impl CacheFlusher {
	pub fn new(cache: Arc<dyn CacheGateway>, host: HostIdentity) -> Self {
		Self { cache, host }
	}
}

impl CacheInvalidator for CacheFlusher {
	fn invalidate(&self, paths: &[PathBuf]) {
		for path in paths {
			trace!(target = "shellmux.cache", host = %self.host, path = %path.display(), "flush");
			self.cache.flush(&self.host, path);
		}
	}
}
