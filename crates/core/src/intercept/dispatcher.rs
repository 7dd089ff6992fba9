use std::sync::Arc;

use async_trait::async_trait;
use shellmux_protocol::join_args;
use shellmux_runtime::{Command, CommandOutput, Destination};
use tracing::debug;

use super::{ACCELERATED_PROGRAM, connection_kind_for};
use crate::accelerator::Accelerator;
use crate::error::Result;
use crate::host::RemotePathResolver;

/// A version-control command as the host issues it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsRequest {
	/// Host location of the directory the command runs in.
	pub location: String,
	/// Arguments after the program name.
	pub args: Vec<String>,
	pub input: Option<String>,
	pub destination: Destination,
}

impl VcsRequest {
	pub fn new<I, S>(location: impl Into<String>, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			location: location.into(),
			args: args.into_iter().map(Into::into).collect(),
			input: None,
			destination: Destination::default(),
		}
	}

	pub fn with_input(mut self, input: impl Into<String>) -> Self {
		self.input = Some(input.into());
		self
	}

	pub fn with_destination(mut self, destination: Destination) -> Self {
		self.destination = destination;
		self
	}

	/// The command line, arguments quoted.
	pub fn command_line(&self) -> String {
		join_args(ACCELERATED_PROGRAM, &self.args)
	}
}

/// Host primitive that runs a version-control command.
#[async_trait]
pub trait VcsDispatcher: Send + Sync {
	/// Runs the command to completion. A non-zero exit is a normal result.
	async fn dispatch(&self, request: &VcsRequest) -> Result<CommandOutput>;
}

#[async_trait]
impl<T: VcsDispatcher + ?Sized> VcsDispatcher for Arc<T> {
	async fn dispatch(&self, request: &VcsRequest) -> Result<CommandOutput> {
		(**self).dispatch(request).await
	}
}

/// Runs version-control commands on pooled sessions, falling back to the
/// wrapped dispatcher when the location is local or no session can be had.
pub struct AcceleratedDispatcher<D> {
	inner: D,
	accelerator: Arc<Accelerator>,
	resolver: Arc<dyn RemotePathResolver>,
}

impl<D> AcceleratedDispatcher<D> {
	pub fn new(inner: D, accelerator: Arc<Accelerator>, resolver: Arc<dyn RemotePathResolver>) -> Self {
		Self {
			inner,
			accelerator,
			resolver,
		}
	}

	pub fn inner(&self) -> &D {
		&self.inner
	}
}

#[async_trait]
impl<D: VcsDispatcher> VcsDispatcher for AcceleratedDispatcher<D> {
	async fn dispatch(&self, request: &VcsRequest) -> Result<CommandOutput> {
		let command_line = request.command_line();

		let acquired = match self.resolver.resolve(&request.location) {
			Ok(remote) => {
				let kind = connection_kind_for(
					self.accelerator.config(),
					&remote.path,
					&command_line,
					request.input.as_deref(),
					request.destination.separate_stderr,
				);
				self.accelerator
					.acquire(&remote, kind)
					.await
					.map(|session| (remote, session))
			}
			Err(e) => Err(e),
		};

		let (remote, session) = match acquired {
			Ok(acquired) => acquired,
			Err(e) if e.allows_fallback() => {
				debug!(
					target = "shellmux.intercept",
					location = %request.location,
					reason = %e,
					"dispatch falling back"
				);
				return self.inner.dispatch(request).await;
			}
			Err(e) => return Err(e),
		};

		let mut command = Command::new(&remote.path, command_line)
			.with_destination(request.destination.clone())
			.invalidating_cache();
		command.input = request.input.clone();

		debug!(
			target = "shellmux.intercept",
			session = session.id(),
			path = %remote,
			kind = %session.kind(),
			"dispatch accelerated"
		);
		Ok(session.run(&command).await?)
	}
}
