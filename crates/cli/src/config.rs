//! Config file loading.
//!
//! The global file lives at `$XDG_CONFIG_HOME/shellmux/config.json`. A
//! project file at `.shellmux/config.json` in the working directory or any
//! ancestor is merged over it, and command-line flags win over both.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shellmux::SshLauncherFactory;
use shellmux_runtime::RuntimeConfig;
use tracing::debug;

use crate::error::{CliError, Result};

pub const CONFIG_DIR: &str = "shellmux";
pub const PROJECT_DIR: &str = ".shellmux";
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
	/// `ssh` executable; discovered when unset.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ssh_program: Option<PathBuf>,

	/// Extra arguments for every `ssh` invocation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ssh_args: Option<Vec<String>>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub remote_shell: Option<String>,

	/// Seconds; `0` disables the deadline.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command_timeout_secs: Option<u64>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub salted_markers: Option<bool>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub remote_tmp_dir: Option<String>,
}

impl Config {
	/// Overlays every field `other` sets.
	pub fn merge(&mut self, other: &Config) {
		if other.ssh_program.is_some() {
			self.ssh_program = other.ssh_program.clone();
		}
		if other.ssh_args.is_some() {
			self.ssh_args = other.ssh_args.clone();
		}
		if other.remote_shell.is_some() {
			self.remote_shell = other.remote_shell.clone();
		}
		if other.command_timeout_secs.is_some() {
			self.command_timeout_secs = other.command_timeout_secs;
		}
		if other.salted_markers.is_some() {
			self.salted_markers = other.salted_markers;
		}
		if other.remote_tmp_dir.is_some() {
			self.remote_tmp_dir = other.remote_tmp_dir.clone();
		}
	}

	pub fn runtime_config(&self) -> RuntimeConfig {
		let mut config = RuntimeConfig::default();
		if let Some(secs) = self.command_timeout_secs {
			config = config.with_command_timeout((secs > 0).then(|| Duration::from_secs(secs)));
		}
		if let Some(salted) = self.salted_markers {
			config = config.with_salted_markers(salted);
		}
		if let Some(dir) = &self.remote_tmp_dir {
			config = config.with_remote_tmp_dir(dir.clone());
		}
		config
	}

	pub fn launcher_factory(&self) -> SshLauncherFactory {
		SshLauncherFactory {
			program: self.ssh_program.clone(),
			options: self.ssh_args.clone().unwrap_or_default(),
			remote_shell: self.remote_shell.clone(),
		}
	}
}

/// Where config files are looked up.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
	pub global: Option<PathBuf>,
	pub project: Option<PathBuf>,
}

impl ConfigPaths {
	pub fn discover(cwd: &Path) -> Self {
		let global = dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE));
		let project = cwd
			.ancestors()
			.map(|dir| dir.join(PROJECT_DIR).join(CONFIG_FILE))
			.find(|path| path.is_file());
		Self { global, project }
	}
}

/// Loads the effective config.
///
/// An explicit file replaces discovery and must exist. Discovered files are
/// skipped when absent.
pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Config> {
	if let Some(path) = explicit {
		return read_config(path);
	}

	let paths = ConfigPaths::discover(cwd);
	let mut config = Config::default();
	for path in [paths.global, paths.project].into_iter().flatten() {
		if path.is_file() {
			debug!(target = "shellmux.config", path = %path.display(), "loading config");
			config.merge(&read_config(&path)?);
		}
	}
	Ok(config)
}

fn read_config(path: &Path) -> Result<Config> {
	let content = fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
		path: path.to_path_buf(),
		source,
	})?;
	serde_json::from_str(&content).map_err(|source| CliError::ConfigParse {
		path: path.to_path_buf(),
		source,
	})
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	fn write(path: &Path, json: &str) {
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, json).unwrap();
	}

	#[test]
	fn merge_prefers_set_fields() {
		let mut base = Config {
			ssh_program: Some("/usr/bin/ssh".into()),
			command_timeout_secs: Some(60),
			..Default::default()
		};
		base.merge(&Config {
			command_timeout_secs: Some(5),
			salted_markers: Some(false),
			..Default::default()
		});
		assert_eq!(base.ssh_program.as_deref(), Some(Path::new("/usr/bin/ssh")));
		assert_eq!(base.command_timeout_secs, Some(5));
		assert_eq!(base.salted_markers, Some(false));
	}

	#[test]
	fn runtime_config_maps_fields() {
		let config = Config {
			command_timeout_secs: Some(0),
			salted_markers: Some(false),
			remote_tmp_dir: Some("/var/tmp".into()),
			..Default::default()
		};
		let runtime = config.runtime_config();
		assert_eq!(runtime.command_timeout, None);
		assert!(!runtime.salted_markers);
		assert_eq!(runtime.remote_tmp_dir, "/var/tmp");

		assert_eq!(Config::default().runtime_config(), RuntimeConfig::default());
	}

	#[test]
	fn launcher_factory_carries_ssh_settings() {
		let config = Config {
			ssh_args: Some(vec!["-oBatchMode=yes".into()]),
			remote_shell: Some("/bin/bash".into()),
			..Default::default()
		};
		let factory = config.launcher_factory();
		assert_eq!(factory.options, ["-oBatchMode=yes"]);
		assert_eq!(factory.remote_shell.as_deref(), Some("/bin/bash"));
		assert!(factory.program.is_none());
	}

	#[test]
	fn project_config_is_found_in_ancestors() {
		let temp = TempDir::new().unwrap();
		let project = temp.path().join(PROJECT_DIR).join(CONFIG_FILE);
		write(&project, r#"{ "remoteShell": "/bin/dash" }"#);
		let nested = temp.path().join("a/b");
		fs::create_dir_all(&nested).unwrap();

		let paths = ConfigPaths::discover(&nested);
		assert_eq!(paths.project, Some(project));
	}

	#[test]
	fn explicit_config_must_parse() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("bad.json");
		write(&path, "{ not json");
		assert!(matches!(load(Some(&path), temp.path()), Err(CliError::ConfigParse { .. })));

		let missing = temp.path().join("missing.json");
		assert!(matches!(load(Some(&missing), temp.path()), Err(CliError::ConfigRead { .. })));
	}

	#[test]
	fn explicit_config_is_read() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("config.json");
		write(&path, r#"{ "sshArgs": ["-v"], "commandTimeoutSecs": 9 }"#);
		let config = load(Some(&path), temp.path()).unwrap();
		assert_eq!(config.ssh_args, Some(vec!["-v".to_string()]));
		assert_eq!(config.command_timeout_secs, Some(9));
	}
}
