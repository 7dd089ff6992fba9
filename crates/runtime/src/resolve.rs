//! Repository layout discovery.

use std::path::{Path, PathBuf};

use shellmux_protocol::quote_path;

use crate::command::{Command, CommandOutput, Destination};
use crate::error::{Error, Result};

/// Where a repository's working tree and git directory live on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
	pub work_dir: PathBuf,
	/// Git directory as reported by `git rev-parse --git-dir`, made absolute.
	pub git_dir: PathBuf,
	/// Git directory with symlinks resolved.
	pub git_dir_canonical: PathBuf,
}

impl RepoLayout {
	pub fn new(
		work_dir: impl Into<PathBuf>,
		git_dir: impl Into<PathBuf>,
		git_dir_canonical: impl Into<PathBuf>,
	) -> Self {
		Self {
			work_dir: work_dir.into(),
			git_dir: git_dir.into(),
			git_dir_canonical: git_dir_canonical.into(),
		}
	}

	/// Layout used before resolution finishes: everything points at `dir`.
	pub(crate) fn provisional(dir: &Path) -> Self {
		Self::new(dir, dir, dir)
	}

	/// Whether `path` lies in the working tree or the git directory.
	pub fn contains(&self, path: &Path) -> bool {
		path.starts_with(&self.work_dir) || self.is_internal(path)
	}

	/// Whether `path` lies inside the git directory.
	pub fn is_internal(&self, path: &Path) -> bool {
		path.starts_with(&self.git_dir) || path.starts_with(&self.git_dir_canonical)
	}
}

/// Prints the directory it settled in, the top level, the git dir and its
/// physical path, one per line. `path` may name a file or a missing entry, in
/// which case its parent is used. Paths inside a git directory resolve from
/// the directory that holds it.
pub(crate) fn resolution_command(path: &Path) -> Command {
	let text = format!(
		"(d={path}; [ -d \"$d\" ] || d=$(dirname \"$d\"); cd \"$d\" || exit; \
		 if [ \"$(git rev-parse --is-inside-git-dir 2>/dev/null)\" = true ]; then cd \"$(git rev-parse --absolute-git-dir)/..\" || exit; fi; \
		 pwd && git rev-parse --show-toplevel --git-dir && cd \"$(git rev-parse --git-dir)\" && pwd -P)",
		path = quote_path(path)
	);
	Command::new("/", text).with_destination(Destination::buffer().with_separate_stderr())
}

pub(crate) fn parse_layout(path: &Path, output: &CommandOutput) -> Result<RepoLayout> {
	let failure = |reason: String| Error::Resolution {
		path: path.to_path_buf(),
		reason,
	};

	if !output.success() {
		let detail = output.stderr_lossy().unwrap_or_default();
		return Err(failure(format!(
			"git exited with status {}: {}",
			output.exit_code,
			detail.trim()
		)));
	}

	let stdout = output.stdout_lossy();
	let mut lines = stdout
		.lines()
		.map(|line| line.trim_end_matches('\r'))
		.filter(|line| !line.is_empty());
	let (Some(base), Some(top), Some(git_dir), Some(canonical)) =
		(lines.next(), lines.next(), lines.next(), lines.next())
	else {
		return Err(failure(format!("unexpected git output: {:?}", stdout.trim())));
	};

	let git_dir = Path::new(git_dir);
	let git_dir = if git_dir.is_absolute() {
		git_dir.to_path_buf()
	} else {
		Path::new(base).join(git_dir)
	};

	Ok(RepoLayout::new(top, git_dir, canonical))
}
