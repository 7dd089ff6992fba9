use std::sync::Arc;

use async_trait::async_trait;
use shellmux_protocol::join_args;
use shellmux_runtime::{Command, OutputHandler};
use tracing::debug;

use super::{connection_kind_for, is_accelerated_program};
use crate::accelerator::Accelerator;
use crate::error::Result;
use crate::host::RemotePathResolver;

/// An asynchronous process the host wants started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
	/// Host location of the working directory.
	pub location: String,
	pub program: String,
	pub args: Vec<String>,
	pub input: Option<String>,
}

impl ProcessRequest {
	pub fn new<I, S>(location: impl Into<String>, program: impl Into<String>, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			location: location.into(),
			program: program.into(),
			args: args.into_iter().map(Into::into).collect(),
			input: None,
		}
	}

	pub fn with_input(mut self, input: impl Into<String>) -> Self {
		self.input = Some(input.into());
		self
	}
}

/// Host primitive that starts a process and streams its output to a handler.
#[async_trait]
pub trait ProcessStarter: Send + Sync {
	/// Returns once the process is running; output and completion arrive
	/// through `handler`.
	async fn start(&self, request: &ProcessRequest, handler: Box<dyn OutputHandler>) -> Result<()>;
}

#[async_trait]
impl<T: ProcessStarter + ?Sized> ProcessStarter for Arc<T> {
	async fn start(&self, request: &ProcessRequest, handler: Box<dyn OutputHandler>) -> Result<()> {
		(**self).start(request, handler).await
	}
}

/// Starts the accelerated program on a pooled session's shell instead of a
/// new remote process. The session lends its output to the handler and frees
/// itself when the command completes.
pub struct AcceleratedProcessStarter<P> {
	inner: P,
	accelerator: Arc<Accelerator>,
	resolver: Arc<dyn RemotePathResolver>,
}

impl<P> AcceleratedProcessStarter<P> {
	pub fn new(inner: P, accelerator: Arc<Accelerator>, resolver: Arc<dyn RemotePathResolver>) -> Self {
		Self {
			inner,
			accelerator,
			resolver,
		}
	}
}

#[async_trait]
impl<P: ProcessStarter> ProcessStarter for AcceleratedProcessStarter<P> {
	async fn start(&self, request: &ProcessRequest, handler: Box<dyn OutputHandler>) -> Result<()> {
		if !is_accelerated_program(&request.program) {
			return self.inner.start(request, handler).await;
		}

		let command_line = join_args(&request.program, &request.args);

		let acquired = match self.resolver.resolve(&request.location) {
			Ok(remote) => {
				let kind = connection_kind_for(
					self.accelerator.config(),
					&remote.path,
					&command_line,
					request.input.as_deref(),
					false,
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
					"process start falling back"
				);
				return self.inner.start(request, handler).await;
			}
			Err(e) => return Err(e),
		};

		let mut command = Command::new(&remote.path, command_line).invalidating_cache();
		command.input = request.input.clone();

		debug!(
			target = "shellmux.intercept",
			session = session.id(),
			path = %remote,
			"process start accelerated"
		);
		Ok(session.start_async(&command, handler).await?)
	}
}
