//! Subcommand implementations.

mod cat;
mod exec;
mod run;
mod stat;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use serde::Serialize;
use shellmux::{
	Accelerator, LauncherFactory, MemoryCache, RemoteFiles, RemotePath, RemotePathResolver,
	SshUrlResolver,
};
use tracing::debug;

use crate::baseline::SshBaseline;
use crate::cli::{Cli, Commands};
use crate::config::{self, Config};
use crate::error::Result;
use crate::output::{self, OutputFormat, ResultBuilder, TextOutput};

pub use cat::CatData;
pub use exec::{ExecData, ExecStep};
pub use run::RunData;
pub use stat::{StatData, StatEntry};

/// Everything a subcommand needs, built once per invocation.
pub struct Context {
	pub format: OutputFormat,
	pub accelerate: bool,
	pub accelerator: Arc<Accelerator>,
	pub resolver: Arc<dyn RemotePathResolver>,
	pub baseline: Arc<SshBaseline>,
}

impl Context {
	pub fn new(format: OutputFormat, accelerate: bool, config: &Config) -> Self {
		let launchers: Arc<dyn LauncherFactory> = Arc::new(config.launcher_factory());
		let resolver: Arc<dyn RemotePathResolver> = Arc::new(SshUrlResolver);
		Self {
			format,
			accelerate,
			accelerator: Arc::new(Accelerator::new(
				Arc::clone(&launchers),
				config.runtime_config(),
				Arc::new(MemoryCache::new()),
			)),
			baseline: Arc::new(SshBaseline::new(launchers, Arc::clone(&resolver))),
			resolver,
		}
	}

	pub fn files(&self) -> RemoteFiles {
		RemoteFiles::new(Arc::clone(&self.accelerator))
	}

	/// Resolves a location that must name a remote path.
	pub fn remote(&self, location: &str) -> Result<RemotePath> {
		Ok(self.resolver.resolve(location)?)
	}
}

/// Runs the parsed command line and returns the process exit status.
pub async fn dispatch(cli: Cli) -> Result<i32> {
	let cwd = std::env::current_dir().context("cannot determine the working directory")?;
	let mut config = config::load(cli.config.as_deref(), &cwd)?;
	cli.overrides.apply(&mut config);
	debug!(target = "shellmux.cli", ?config, "effective config");

	let ctx = Context::new(cli.format, !cli.no_accel, &config);
	let started = Instant::now();
	let name = cli.command.name();

	let outcome = match cli.command {
		Commands::Run {
			location,
			input,
			stdin,
			separate_stderr,
			args,
		} => {
			let input = match (input, stdin) {
				(Some(text), _) => Some(text),
				(None, true) => Some(read_stdin()?),
				(None, false) => None,
			};
			let request = run::request(location, args, input, separate_stderr);
			run::execute(&ctx, request).await.map(|data| {
				let code = data.exit_code;
				emit(name, started, data, ctx.format);
				code
			})
		}
		Commands::Exec { location } => {
			let script = read_stdin()?;
			exec::execute(&ctx, &location, &script).await.map(|data| {
				let code = data.exit_code();
				emit(name, started, data, ctx.format);
				code
			})
		}
		Commands::Stat { locations } => stat::execute(&ctx, &locations).await.map(|data| {
			emit(name, started, data, ctx.format);
			0
		}),
		Commands::Cat { location } => cat::execute(&ctx, &location).await.map(|data| {
			emit(name, started, data, ctx.format);
			0
		}),
	};

	ctx.accelerator.shutdown().await;
	outcome
}

fn emit<T: Serialize + TextOutput>(name: &str, started: Instant, data: T, format: OutputFormat) {
	let result = ResultBuilder::new(name).started_at(started).data(data).build();
	output::print_result(&result, format);
}

fn read_stdin() -> Result<String> {
	let text = std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?;
	Ok(text)
}
