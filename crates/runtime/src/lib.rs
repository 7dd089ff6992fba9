//! Persistent shell sessions to remote hosts.
//!
//! This crate owns the processes and the command protocol:
//!
//! - [`Launcher`] and [`ShellProcess`]: start a shell locally or over ssh
//! - [`Session`]: one shell running one framed command at a time
//! - [`SessionPool`]: sessions for one host, grouped by repository
//!
//! Wire text (framing, completion markers, probe scripts) comes from
//! `shellmux-protocol`.

pub mod command;
pub mod config;
mod demux;
pub mod error;
pub mod launcher;
pub mod pool;
pub mod process;
pub mod resolve;
pub mod session;
pub mod strategy;
mod transport;

pub use command::{Command, CommandOutput, Destination, StdoutTarget};
pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use launcher::{Launcher, SshTarget, locate_ssh};
pub use pool::SessionPool;
pub use process::ShellProcess;
pub use resolve::RepoLayout;
pub use session::{
	CacheInvalidator, CommandState, ConnectionKind, OutputHandler, Session, SessionId, SessionLease,
};
pub use shellmux_protocol as protocol;
