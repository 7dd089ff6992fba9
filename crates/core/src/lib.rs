//! Accelerated version-control access to remote trees.
//!
//! A host editor or tool hands shellmux its own primitives for running git,
//! starting processes and reading files. The decorators in [`intercept`] wrap
//! those primitives: requests for remote locations run over pooled, long-lived
//! shell sessions, and metadata queries are answered from a cache that one
//! batch probe fills for many paths at once. Anything that cannot be
//! accelerated goes to the wrapped primitive unchanged.
//!
//! - [`Accelerator`]: one session pool per host plus the shared cache
//! - [`BatchAttributeLoader`] and [`RemoteFiles`]: batch probes and cache-first lookups
//! - [`intercept`]: [`AcceleratedDispatcher`], [`AcceleratedProcessStarter`], [`CachedFileReader`]

pub mod accelerator;
pub mod cache;
pub mod error;
pub mod host;
pub mod intercept;
pub mod loader;
pub mod lookup;

pub use accelerator::{Accelerator, LauncherFactory, LocalLauncherFactory, SshLauncherFactory};
pub use cache::{CacheFlusher, CacheGateway, CacheValue, MemoryCache, Property, record_entries};
pub use error::{Error, Result};
pub use host::{HostIdentity, RemotePath, RemotePathResolver, SshUrlResolver};
pub use intercept::{
	AcceleratedDispatcher, AcceleratedProcessStarter, CachedFileReader, FileReader, ProcessRequest,
	ProcessStarter, VcsDispatcher, VcsRequest,
};
pub use loader::BatchAttributeLoader;
pub use lookup::RemoteFiles;
pub use shellmux_protocol::{AttributeFlags, FileMetadataRecord, StatFields};
pub use shellmux_runtime::{
	Command, CommandOutput, ConnectionKind, Destination, OutputHandler, RuntimeConfig, StdoutTarget,
};
