//! Per-host session pools sharing one metadata cache.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use shellmux_runtime::{
	ConnectionKind, Launcher, RuntimeConfig, SessionLease, SessionPool, SshTarget, locate_ssh,
};
use tracing::info;

use crate::cache::{CacheFlusher, CacheGateway};
use crate::error::Result;
use crate::host::{HostIdentity, RemotePath};
use crate::loader::BatchAttributeLoader;

/// Decides how sessions to a host are started.
pub trait LauncherFactory: Send + Sync {
	fn launcher(&self, host: &HostIdentity) -> Result<Launcher>;
}

/// Connects with the system `ssh` client.
#[derive(Debug, Clone, Default)]
pub struct SshLauncherFactory {
	/// Explicit client; discovered with [`locate_ssh`] when unset.
	pub program: Option<PathBuf>,
	/// Extra arguments placed before the destination.
	pub options: Vec<String>,
	/// Remote shell; `/bin/sh` when unset.
	pub remote_shell: Option<String>,
}

impl LauncherFactory for SshLauncherFactory {
	fn launcher(&self, host: &HostIdentity) -> Result<Launcher> {
		let program = match &self.program {
			Some(program) => program.clone(),
			None => locate_ssh()?,
		};
		Ok(Launcher::Ssh(SshTarget {
			program,
			host: host.host.clone(),
			user: host.user.clone(),
			port: host.port,
			options: self.options.clone(),
			remote_shell: self
				.remote_shell
				.clone()
				.unwrap_or_else(|| shellmux_runtime::launcher::DEFAULT_SHELL.to_string()),
		}))
	}
}

/// Runs every "remote" session as a local shell. Used for local trees and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncherFactory;

impl LauncherFactory for LocalLauncherFactory {
	fn launcher(&self, _host: &HostIdentity) -> Result<Launcher> {
		Ok(Launcher::local())
	}
}

/// Entry point for accelerated access to remote hosts.
///
/// Holds one [`SessionPool`] per host, created on first use, each wired to
/// flush the shared cache when an invalidating command completes.
pub struct Accelerator {
	pools: DashMap<HostIdentity, Arc<SessionPool>>,
	launchers: Arc<dyn LauncherFactory>,
	config: RuntimeConfig,
	cache: Arc<dyn CacheGateway>,
}

impl Accelerator {
	pub fn new(
		launchers: Arc<dyn LauncherFactory>,
		config: RuntimeConfig,
		cache: Arc<dyn CacheGateway>,
	) -> Self {
		Self {
			pools: DashMap::new(),
			launchers,
			config,
			cache,
		}
	}

	pub fn cache(&self) -> &Arc<dyn CacheGateway> {
		&self.cache
	}

	pub fn config(&self) -> &RuntimeConfig {
		&self.config
	}

	pub fn loader(&self) -> BatchAttributeLoader {
		BatchAttributeLoader::new(Arc::clone(&self.cache))
	}

	/// The pool for `host`, created if needed.
	pub fn pool(&self, host: &HostIdentity) -> Result<Arc<SessionPool>> {
		if let Some(pool) = self.pools.get(host) {
			return Ok(Arc::clone(pool.value()));
		}

		let launcher = self.launchers.launcher(host)?;
		let flusher = CacheFlusher::new(Arc::clone(&self.cache), host.clone());
		let pool = SessionPool::new(launcher, self.config.clone()).with_invalidator(Arc::new(flusher));

		let pool = self
			.pools
			.entry(host.clone())
			.or_insert_with(|| {
				info!(target = "shellmux.pool", host = %host, "pool created");
				Arc::new(pool)
			})
			.clone();
		Ok(pool)
	}

	/// The pool for `host` if one was already created.
	pub fn existing_pool(&self, host: &HostIdentity) -> Option<Arc<SessionPool>> {
		self.pools.get(host).map(|pool| Arc::clone(pool.value()))
	}

	/// Leases a session serving `remote`.
	pub async fn acquire(&self, remote: &RemotePath, kind: ConnectionKind) -> Result<SessionLease> {
		let pool = self.pool(&remote.host)?;
		Ok(pool.acquire(&remote.path, kind).await?)
	}

	/// Shuts down every pool.
	pub async fn shutdown(&self) {
		let pools: Vec<Arc<SessionPool>> = self
			.pools
			.iter()
			.map(|entry| Arc::clone(entry.value()))
			.collect();
		self.pools.clear();
		for pool in pools {
			pool.shutdown().await;
		}
	}
}
