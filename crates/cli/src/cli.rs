use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;
use crate::output::OutputFormat;
use crate::styles::cli_styles;

#[derive(Parser, Debug)]
#[command(name = "shellmux")]
#[command(about = "Run git and read files on remote hosts over pooled shell sessions")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Config file to use instead of the global and project ones
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(flatten)]
	pub overrides: Overrides,

	/// Skip the session pool and cache; every request runs its own process
	#[arg(long, global = true)]
	pub no_accel: bool,

	#[command(subcommand)]
	pub command: Commands,
}

/// Flags that take precedence over config files.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
	/// ssh executable
	#[arg(long, global = true, value_name = "PATH")]
	pub ssh: Option<PathBuf>,

	/// Command timeout in seconds (0 waits forever)
	#[arg(long, global = true, value_name = "SECS")]
	pub timeout: Option<u64>,

	/// Use the fixed, unsalted completion markers
	#[arg(long, global = true)]
	pub fixed_markers: bool,
}

impl Overrides {
	pub fn apply(&self, config: &mut Config) {
		config.merge(&Config {
			ssh_program: self.ssh.clone(),
			command_timeout_secs: self.timeout,
			salted_markers: self.fixed_markers.then_some(false),
			..Default::default()
		});
	}
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run a git command in a directory
	///
	/// The directory is an ssh://[user@]host[:port]/path location; local
	/// paths run git directly.
	#[command(alias = "git")]
	Run {
		/// Directory to run in
		location: String,

		/// Text piped to the command's stdin
		#[arg(long, value_name = "TEXT", conflicts_with = "stdin")]
		input: Option<String>,

		/// Pipe this process's stdin to the command
		#[arg(long)]
		stdin: bool,

		/// Capture stderr separately instead of merging it into stdout
		#[arg(long)]
		separate_stderr: bool,

		/// Arguments passed to git
		#[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
		args: Vec<String>,
	},

	/// Run shell commands read from stdin, one per line, on one session
	Exec {
		/// Remote directory the commands run in
		location: String,
	},

	/// Load attributes for several remote paths in one round trip
	Stat {
		/// Remote paths, as ssh:// locations
		#[arg(required = true)]
		locations: Vec<String>,
	},

	/// Print a remote file, served from the metadata cache when possible
	Cat {
		location: String,
	},
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Run { .. } => "run",
			Commands::Exec { .. } => "exec",
			Commands::Stat { .. } => "stat",
			Commands::Cat { .. } => "cat",
		}
	}
}
