//! Sessions against a local `/bin/sh`, standing in for a remote host.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shellmux_runtime::{
	Command, CommandOutput, CommandState, ConnectionKind, Destination, Error, Launcher,
	OutputHandler, RuntimeConfig, SessionPool, SshTarget,
};
use tempfile::TempDir;

fn git_repo() -> (TempDir, PathBuf) {
	let temp = TempDir::new().unwrap();
	let status = std::process::Command::new("git")
		.args(["init", "-q"])
		.current_dir(temp.path())
		.status()
		.unwrap();
	assert!(status.success());
	let root = std::fs::canonicalize(temp.path()).unwrap();
	(temp, root)
}

fn pool(config: RuntimeConfig) -> SessionPool {
	SessionPool::new(Launcher::local(), config)
}

#[tokio::test]
async fn echo_round_trip() {
	let (_temp, root) = git_repo();
	let pool = pool(RuntimeConfig::default());
	let session = pool.acquire(&root, ConnectionKind::Raw).await.unwrap();

	let output = session.run(&Command::new(&root, "echo hi")).await.unwrap();
	assert_eq!(output.exit_code, 0);
	assert_eq!(output.stdout, b"hi\n");
	assert_eq!(session.layout().work_dir, root);
	assert_eq!(session.layout().git_dir_canonical, root.join(".git"));
	pool.shutdown().await;
}

#[tokio::test]
async fn separate_stderr_and_exit_code() {
	let (_temp, root) = git_repo();
	let pool = pool(RuntimeConfig::default());
	let session = pool.acquire(&root, ConnectionKind::Raw).await.unwrap();

	let cmd = Command::new(&root, "sh -c 'printf boom >&2; exit 3'")
		.with_destination(Destination::buffer().with_separate_stderr());
	let output = session.run(&cmd).await.unwrap();
	assert_eq!(output.exit_code, 3);
	assert!(output.stdout.is_empty());
	assert_eq!(output.stderr.as_deref(), Some(&b"boom"[..]));

	let merged = session
		.run(&Command::new(&root, "sh -c 'echo out; echo err >&2'"))
		.await
		.unwrap();
	assert_eq!(merged.stdout_lossy(), "out\nerr\n");
	assert!(merged.stderr.is_none());
	pool.shutdown().await;
}

#[tokio::test]
async fn captured_stderr_does_not_leak_into_later_exit_codes() {
	let (_temp, root) = git_repo();
	let pool = pool(RuntimeConfig::default());
	let session = pool.acquire(&root, ConnectionKind::Raw).await.unwrap();

	// Digits at the end of captured stderr run into the exit code.
	let cmd = Command::new(&root, "sh -c 'printf \"line 7\" >&2; exit 1'")
		.with_destination(Destination::buffer().with_separate_stderr());
	let output = session.run(&cmd).await.unwrap();
	assert_eq!(output.exit_code, 71);
	assert_eq!(output.stderr.as_deref(), Some(&b"line "[..]));

	let next = session.run(&Command::new(&root, "true")).await.unwrap();
	assert_eq!(next.exit_code, 0);
	assert!(next.stdout.is_empty());

	let captured = session
		.run(&Command::new(&root, "true").with_destination(Destination::buffer().with_separate_stderr()))
		.await
		.unwrap();
	assert_eq!(captured.exit_code, 0);
	assert_eq!(captured.stderr.as_deref(), Some(&b""[..]));
	pool.shutdown().await;
}

#[tokio::test]
async fn input_reaches_stdin_verbatim() {
	let (_temp, root) = git_repo();
	let pool = pool(RuntimeConfig::default());
	let session = pool.acquire(&root, ConnectionKind::Raw).await.unwrap();

	let text = "it's a 'quoted'\nmulti-line $HOME `input` \\ -n\n";
	let output = session
		.run(&Command::new(&root, "cat").with_input(text))
		.await
		.unwrap();
	assert_eq!(output.stdout_lossy(), text);
	pool.shutdown().await;
}

#[tokio::test]
async fn commands_run_in_their_directory_and_in_order() {
	let (_temp, root) = git_repo();
	std::fs::create_dir(root.join("sub")).unwrap();
	let pool = pool(RuntimeConfig::default());
	let session = pool.acquire(&root, ConnectionKind::Raw).await.unwrap();

	let inner = session.run(&Command::new(root.join("sub"), "pwd -P")).await.unwrap();
	assert_eq!(inner.stdout_lossy().trim_end(), root.join("sub").to_string_lossy());

	for i in 0..5 {
		let output = session
			.run(&Command::new(&root, format!("echo {i}; exit_code={i}; (exit $exit_code)")))
			.await
			.unwrap();
		assert_eq!(output.stdout_lossy(), format!("{i}\n"));
		assert_eq!(output.exit_code, i);
	}
	pool.shutdown().await;
}

#[tokio::test]
async fn output_containing_the_plain_marker_does_not_end_the_command() {
	let (_temp, root) = git_repo();
	let pool = pool(RuntimeConfig::default());
	let session = pool.acquire(&root, ConnectionKind::Raw).await.unwrap();

	let output = session
		.run(&Command::new(&root, "echo 0 DONE; sleep 0.2; echo after"))
		.await
		.unwrap();
	assert_eq!(output.stdout_lossy(), "0 DONE\nafter\n");
	pool.shutdown().await;
}

#[tokio::test]
async fn busy_session_leads_to_a_second_with_the_same_layout() {
	let (_temp, root) = git_repo();
	let pool = pool(RuntimeConfig::default());

	let first = pool.acquire(&root, ConnectionKind::Raw).await.unwrap();
	let second = pool.acquire(&root.join("src"), ConnectionKind::Raw).await.unwrap();
	assert_ne!(first.id(), second.id());
	assert_eq!(first.layout(), second.layout());
	assert_eq!(pool.len(), 2);

	let first_id = first.id();
	drop(first);
	drop(second);
	let again = pool.acquire(&root, ConnectionKind::Raw).await.unwrap();
	assert_eq!(again.id(), first_id);
	pool.shutdown().await;
}

#[tokio::test]
async fn unknown_directory_fails_resolution() {
	let temp = TempDir::new().unwrap();
	let pool = pool(RuntimeConfig::default());

	let err = pool.acquire(temp.path(), ConnectionKind::Raw).await.unwrap_err();
	assert!(matches!(err, Error::Resolution { .. }));
	assert!(pool.is_empty());
}

#[tokio::test]
async fn paths_inside_the_git_dir_resolve_to_the_work_tree() {
	let (_temp, root) = git_repo();
	let pool = pool(RuntimeConfig::default());

	let session = pool
		.acquire(&root.join(".git/refs/heads"), ConnectionKind::Raw)
		.await
		.unwrap();
	let layout = session.layout();
	assert_eq!(layout.work_dir, root);
	assert!(layout.is_internal(&root.join(".git/HEAD")));
	pool.shutdown().await;
}

#[tokio::test]
async fn timeout_kills_and_reaps_the_session() {
	let (_temp, root) = git_repo();
	let pool = pool(RuntimeConfig::default().with_command_timeout(Some(Duration::from_secs(2))));
	let session = pool.acquire(&root, ConnectionKind::Raw).await.unwrap();

	let err = session
		.run(&Command::new(&root, "sleep 30"))
		.await
		.unwrap_err();
	assert!(err.is_timeout());
	drop(session);
	assert!(pool.sessions_for(&root).is_empty());
}

#[tokio::test]
async fn interactive_kind_works_over_plain_pipes() {
	let (_temp, root) = git_repo();
	let pool = pool(RuntimeConfig::default().with_salted_markers(false));
	let session = pool.acquire(&root, ConnectionKind::Interactive).await.unwrap();
	assert_eq!(session.kind(), ConnectionKind::Interactive);

	let output = session.run(&Command::new(&root, "git rev-parse --is-inside-work-tree")).await.unwrap();
	assert_eq!(output.stdout_lossy(), "true\n");
	pool.shutdown().await;
}

/// An `ssh` stand-in that gives `-tt` connections a real pseudo-terminal via
/// util-linux `script`, and plain pipes otherwise.
fn pty_launcher(dir: &Path) -> Launcher {
	use std::os::unix::fs::PermissionsExt;

	let program = dir.join("ssh");
	std::fs::write(
		&program,
		"#!/bin/sh\nfor arg; do\n  if [ \"$arg\" = -tt ]; then exec script -qfec /bin/sh /dev/null; fi\ndone\nexec /bin/sh\n",
	)
	.unwrap();
	std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

	Launcher::Ssh(SshTarget {
		program,
		host: "localhost".to_string(),
		user: None,
		port: None,
		options: Vec::new(),
		remote_shell: "/bin/sh".to_string(),
	})
}

fn has_script() -> bool {
	std::process::Command::new("script")
		.arg("--version")
		.output()
		.is_ok_and(|output| output.status.success())
}

#[tokio::test]
async fn interactive_kind_runs_through_a_pseudo_terminal() {
	if !has_script() {
		eprintln!("skipping: util-linux script not installed");
		return;
	}
	let (_temp, root) = git_repo();
	let bin = TempDir::new().unwrap();
	let pool = SessionPool::new(pty_launcher(bin.path()), RuntimeConfig::default());
	let session = pool.acquire(&root, ConnectionKind::Interactive).await.unwrap();
	assert_eq!(session.kind(), ConnectionKind::Interactive);
	assert_eq!(session.layout().work_dir, root);

	let output = session.run(&Command::new(&root, "echo hi")).await.unwrap();
	assert_eq!(output.exit_code, 0);
	assert_eq!(output.stdout, b"hi\n");

	let cmd = Command::new(&root, "sh -c 'echo boom >&2; exit 3'")
		.with_destination(Destination::buffer().with_separate_stderr());
	let output = session.run(&cmd).await.unwrap();
	assert_eq!(output.exit_code, 3);
	assert!(output.stdout.is_empty());
	assert_eq!(output.stderr.as_deref(), Some(&b"boom\n"[..]));

	let after = session.run(&Command::new(&root, "true")).await.unwrap();
	assert_eq!(after.exit_code, 0);
	pool.shutdown().await;
}

struct Collect(Arc<Mutex<(Vec<u8>, Option<CommandOutput>)>>);

impl OutputHandler for Collect {
	fn on_output(&mut self, chunk: &[u8]) {
		self.0.lock().0.extend_from_slice(chunk);
	}

	fn on_complete(&mut self, output: CommandOutput) {
		self.0.lock().1 = Some(output);
	}
}

#[tokio::test]
async fn async_command_hands_output_to_the_handler() {
	let (_temp, root) = git_repo();
	let pool = pool(RuntimeConfig::default());
	let session = pool.acquire(&root, ConnectionKind::Raw).await.unwrap();
	let seen = Arc::new(Mutex::new((Vec::new(), None)));

	session
		.start_async(
			&Command::new(&root, "for i in 1 2 3; do echo line $i; sleep 0.05; done"),
			Box::new(Collect(Arc::clone(&seen))),
		)
		.await
		.unwrap();

	for _ in 0..100 {
		if session.state() == CommandState::Free {
			break;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	assert_eq!(session.state(), CommandState::Free);

	let seen = seen.lock();
	assert_eq!(seen.0, b"line 1\nline 2\nline 3\n");
	assert_eq!(seen.1.as_ref().map(|output| output.exit_code), Some(0));
	drop(seen);
	pool.shutdown().await;
}

#[tokio::test]
async fn stdout_can_go_to_a_local_file() {
	let (_temp, root) = git_repo();
	let out_dir = TempDir::new().unwrap();
	let target = out_dir.path().join("out.txt");
	let pool = pool(RuntimeConfig::default());
	let session = pool.acquire(&root, ConnectionKind::Raw).await.unwrap();

	let output = session
		.run(&Command::new(&root, "printf 'a\\nb'").with_destination(Destination::file(&target)))
		.await
		.unwrap();
	assert!(output.stdout.is_empty());
	assert_eq!(std::fs::read(Path::new(&target)).unwrap(), b"a\nb");
	pool.shutdown().await;
}
