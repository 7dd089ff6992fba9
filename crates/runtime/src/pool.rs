//! Sessions for one remote host, grouped by repository.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{RuntimeConfig, new_salt};
use crate::error::{Error, Result};
use crate::launcher::Launcher;
use crate::process::ShellProcess;
use crate::resolve::{RepoLayout, parse_layout, resolution_command};
use crate::session::{CacheInvalidator, ConnectionKind, Session, SessionLease, SessionSpec};
use crate::strategy::{AcquireStrategy, Candidate, resolve_acquire_strategy};

/// Every live session to one host.
///
/// Sessions are created on demand by [`SessionPool::acquire`] and dropped from
/// the pool once their shell exits or a command times out.
pub struct SessionPool {
	launcher: Launcher,
	config: RuntimeConfig,
	sessions: Mutex<Vec<Arc<Session>>>,
	next_id: AtomicU64,
	invalidator: Option<Arc<dyn CacheInvalidator>>,
}

impl std::fmt::Debug for SessionPool {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionPool")
			.field("launcher", &self.launcher)
			.field("sessions", &self.sessions.lock().len())
			.finish()
	}
}

impl SessionPool {
	pub fn new(launcher: Launcher, config: RuntimeConfig) -> Self {
		Self {
			launcher,
			config,
			sessions: Mutex::new(Vec::new()),
			next_id: AtomicU64::new(1),
			invalidator: None,
		}
	}

	/// Installs the hook run when an invalidating command completes.
	pub fn with_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
		self.invalidator = Some(invalidator);
		self
	}

	pub fn launcher(&self) -> &Launcher {
		&self.launcher
	}

	pub fn config(&self) -> &RuntimeConfig {
		&self.config
	}

	pub fn len(&self) -> usize {
		self.sessions.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Live sessions whose repository covers `path`, in creation order.
	pub fn sessions_for(&self, path: &Path) -> Vec<Arc<Session>> {
		let mut sessions = self.sessions.lock();
		reap(&mut sessions);
		sessions
			.iter()
			.filter(|session| session.serves(path))
			.cloned()
			.collect()
	}

	/// Leases an idle `kind` session already serving `path`, without starting one.
	pub fn try_acquire(&self, path: &Path, kind: ConnectionKind) -> Option<SessionLease> {
		self.sessions_for(path)
			.iter()
			.filter(|session| session.kind() == kind)
			.find_map(|session| session.try_lease())
	}

	/// Leases a free `kind` session for `path`, starting a new one when none is
	/// idle.
	///
	/// A new session copies the layout of any session already serving the
	/// path; otherwise git is asked where the repository lives.
	///
	/// # Errors
	///
	/// Returns `Error::Resolution` if `path` is not inside a repository, and
	/// launch errors if the shell cannot be started.
	pub async fn acquire(&self, path: &Path, kind: ConnectionKind) -> Result<SessionLease> {
		let template = {
			let matching = self.sessions_for(path);
			let candidates: Vec<Candidate> = matching
				.iter()
				.map(|session| Candidate {
					kind: session.kind(),
					available: session.is_available(),
				})
				.collect();

			match resolve_acquire_strategy(&candidates, kind) {
				AcquireStrategy::Reuse(index) => match matching[index].try_lease() {
					Some(lease) => {
						debug!(target = "shellmux.pool", session = lease.id(), path = %path.display(), "reusing session");
						return Ok(lease);
					}
					None => Some(matching[index].layout()),
				},
				AcquireStrategy::CloneLayout(index) => Some(matching[index].layout()),
				AcquireStrategy::ResolveFresh => None,
			}
		};

		let session = self.open(kind, path, template).await?;
		let lease = session
			.try_lease()
			.ok_or_else(|| Error::SessionClosed(session.id()))?;
		self.sessions.lock().push(session);
		Ok(lease)
	}

	async fn open(&self, kind: ConnectionKind, dir: &Path, layout: Option<RepoLayout>) -> Result<Arc<Session>> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let salt = new_salt();
		let markers = self.config.markers(&salt);
		let stderr_path = self.config.stderr_path(&salt);

		let mut process = ShellProcess::launch(&self.launcher, kind)?;
		let (stdin, stdout) = process.take_pipes()?;
		let resolving = layout.is_none();
		let session = Session::attach(
			SessionSpec {
				id,
				kind,
				layout: layout.unwrap_or_else(|| RepoLayout::provisional(dir)),
				markers,
				stderr_path,
				command_timeout: self.config.command_timeout,
				invalidator: self.invalidator.clone(),
			},
			stdout,
			stdin,
			Some(process),
		);

		if let Err(e) = self.prepare(&session, dir, resolving).await {
			session.terminate().await;
			return Err(e);
		}

		info!(
			target = "shellmux.pool",
			session = id,
			%kind,
			launcher = %self.launcher.describe(),
			work_dir = %session.layout().work_dir.display(),
			"session opened"
		);
		Ok(session)
	}

	async fn prepare(&self, session: &Session, dir: &Path, resolving: bool) -> Result<()> {
		session.initialize().await?;
		if resolving {
			let output = session.run(&resolution_command(dir)).await?;
			session.set_layout(parse_layout(dir, &output)?);
		}
		Ok(())
	}

	/// Closes every session.
	pub async fn shutdown(&self) {
		let sessions: Vec<Arc<Session>> = std::mem::take(&mut *self.sessions.lock());
		for session in sessions {
			session.shutdown().await;
		}
		info!(target = "shellmux.pool", launcher = %self.launcher.describe(), "pool shut down");
	}
}

fn reap(sessions: &mut Vec<Arc<Session>>) {
	let before = sessions.len();
	sessions.retain(|session| !session.is_closed());
	let reaped = before - sessions.len();
	if reaped > 0 {
		debug!(target = "shellmux.pool", reaped, "dropped closed sessions");
	}
}
