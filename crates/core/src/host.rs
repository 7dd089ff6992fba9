//! Remote hosts and the locations that name files on them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Who and where a session connects to. Cache entries and pools are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostIdentity {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,
	pub host: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub port: Option<u16>,
}

impl HostIdentity {
	pub fn new(host: impl Into<String>) -> Self {
		Self {
			user: None,
			host: host.into(),
			port: None,
		}
	}

	pub fn with_user(mut self, user: impl Into<String>) -> Self {
		self.user = Some(user.into());
		self
	}

	pub fn with_port(mut self, port: u16) -> Self {
		self.port = Some(port);
		self
	}
}

impl fmt::Display for HostIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if let Some(user) = &self.user {
			write!(f, "{user}@")?;
		}
		f.write_str(&self.host)?;
		if let Some(port) = self.port {
			write!(f, ":{port}")?;
		}
		Ok(())
	}
}

/// An absolute path on a specific host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath {
	pub host: HostIdentity,
	pub path: PathBuf,
}

impl RemotePath {
	pub fn new(host: HostIdentity, path: impl Into<PathBuf>) -> Self {
		Self {
			host,
			path: path.into(),
		}
	}

	/// The same host with a different path.
	pub fn with_path(&self, path: impl AsRef<Path>) -> Self {
		Self::new(self.host.clone(), path.as_ref())
	}
}

impl fmt::Display for RemotePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ssh://{}{}", self.host, self.path.display())
	}
}

/// Maps the host's own location strings to remote paths.
pub trait RemotePathResolver: Send + Sync {
	/// `Err(Error::NotRemote)` for locations on the local machine.
	fn resolve(&self, location: &str) -> Result<RemotePath>;
}

/// Resolves `ssh://[user@]host[:port]/absolute/path` locations.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshUrlResolver;

impl RemotePathResolver for SshUrlResolver {
	fn resolve(&self, location: &str) -> Result<RemotePath> {
		if !location.starts_with("ssh://") {
			return Err(Error::NotRemote(location.to_string()));
		}

		let invalid = |reason: &str| Error::InvalidLocation {
			location: location.to_string(),
			reason: reason.to_string(),
		};

		let url = Url::parse(location).map_err(|e| invalid(&e.to_string()))?;
		let host = url
			.host_str()
			.filter(|host| !host.is_empty())
			.ok_or_else(|| invalid("missing host"))?;

		let mut identity = HostIdentity::new(host);
		if !url.username().is_empty() {
			let user = urlencoding::decode(url.username()).map_err(|e| invalid(&e.to_string()))?;
			identity.user = Some(user.into_owned());
		}
		identity.port = url.port();

		let path = urlencoding::decode(url.path()).map_err(|e| invalid(&e.to_string()))?;
		let path = if path.is_empty() { "/".to_string() } else { path.into_owned() };
		Ok(RemotePath::new(identity, path))
	}
}
