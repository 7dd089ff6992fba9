use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

use super::*;
use crate::command::Destination;

fn spec(timeout: Option<Duration>, invalidator: Option<Arc<dyn CacheInvalidator>>) -> SessionSpec {
	SessionSpec {
		id: 7,
		kind: ConnectionKind::Raw,
		layout: RepoLayout::new("/srv/repo", "/srv/repo/.git", "/srv/repo/.git"),
		markers: Markers::fixed(),
		stderr_path: "/tmp/shellmux-test.err".to_string(),
		command_timeout: timeout,
		invalidator,
	}
}

/// Returns the session plus the far ends of its stdin and stdout.
fn create_test_session(
	timeout: Option<Duration>,
	invalidator: Option<Arc<dyn CacheInvalidator>>,
) -> (Arc<Session>, DuplexStream, DuplexStream) {
	let (stdin_read, stdin_write) = duplex(64 * 1024);
	let (stdout_read, stdout_write) = duplex(64 * 1024);
	let session = Session::attach(spec(timeout, invalidator), stdout_read, stdin_write, None);
	(session, stdin_read, stdout_write)
}

async fn read_frame(stdin: &mut DuplexStream) -> String {
	let mut frame = Vec::new();
	loop {
		let byte = stdin.read_u8().await.unwrap();
		frame.push(byte);
		if byte == b'\n' {
			return String::from_utf8(frame).unwrap();
		}
	}
}

#[derive(Default)]
struct RecordingInvalidator {
	calls: Mutex<Vec<Vec<PathBuf>>>,
}

impl CacheInvalidator for RecordingInvalidator {
	fn invalidate(&self, paths: &[PathBuf]) {
		self.calls.lock().push(paths.to_vec());
	}
}

#[derive(Default)]
struct Recorded {
	chunks: Vec<Vec<u8>>,
	completed: Option<CommandOutput>,
}

struct RecordingHandler(Arc<Mutex<Recorded>>);

impl OutputHandler for RecordingHandler {
	fn on_output(&mut self, chunk: &[u8]) {
		self.0.lock().chunks.push(chunk.to_vec());
	}

	fn on_complete(&mut self, output: CommandOutput) {
		self.0.lock().completed = Some(output);
	}
}

#[tokio::test]
async fn test_submit_writes_framed_command() {
	let (session, mut stdin, _stdout) = create_test_session(None, None);

	session
		.submit(&Command::new("/srv/repo", "git status --porcelain"))
		.await
		.unwrap();

	let frame = read_frame(&mut stdin).await;
	assert!(frame.starts_with("cd /srv/repo;git status --porcelain; export RET=$?;"));
	assert!(frame.ends_with("echo $RET DONE; cd - > /dev/null\n"));
	assert_eq!(session.state(), CommandState::Running);
}

#[tokio::test]
async fn test_full_command_cycle() {
	let (session, _stdin, _stdout) = create_test_session(None, None);

	session.submit(&Command::new("/srv/repo", "echo hi")).await.unwrap();
	session.on_data(b"hi\n__SHELLMUX_STDERR__");
	assert_eq!(session.state(), CommandState::Running);
	session.on_data(b"0 DONE\n");

	assert_eq!(session.wait().await.unwrap(), CommandState::Complete);
	let output = session.take_output().unwrap();
	assert_eq!(output.exit_code, 0);
	assert_eq!(output.stdout, b"hi\n");
	assert!(output.stderr.is_none());
	assert_eq!(session.state(), CommandState::Free);
	assert_eq!(session.last_exit_code(), Some(0));
}

#[tokio::test]
async fn test_output_through_the_pipe() {
	let (session, mut stdin, mut stdout) = create_test_session(None, None);

	let shell = tokio::spawn(async move {
		let frame = read_frame(&mut stdin).await;
		assert!(frame.contains("git rev-parse HEAD"));
		stdout
			.write_all(b"0123abcd\n__SHELLMUX_STDERR__0 DONE\n")
			.await
			.unwrap();
		(stdin, stdout)
	});

	let output = session
		.run(&Command::new("/srv/repo", "git rev-parse HEAD"))
		.await
		.unwrap();
	assert_eq!(output.stdout_lossy(), "0123abcd\n");
	let _pipes = shell.await.unwrap();
}

#[tokio::test]
async fn test_separate_stderr_is_reported() {
	let (session, _stdin, _stdout) = create_test_session(None, None);

	let cmd = Command::new("/srv/repo", "sh -c 'printf boom >&2; exit 3'")
		.with_destination(Destination::buffer().with_separate_stderr());
	session.submit(&cmd).await.unwrap();
	session.on_data(b"__SHELLMUX_STDERR__boom3 DONE\n");

	session.wait().await.unwrap();
	let output = session.take_output().unwrap();
	assert_eq!(output.exit_code, 3);
	assert!(output.stdout.is_empty());
	assert_eq!(output.stderr.as_deref(), Some(&b"boom"[..]));
}

#[tokio::test]
async fn test_stderr_capture_is_followed_by_cleanup() {
	let (session, mut stdin, _stdout) = create_test_session(None, None);

	let cmd = Command::new("/srv/repo", "git fetch").with_destination(Destination::buffer().with_separate_stderr());
	session.submit(&cmd).await.unwrap();
	let frame = read_frame(&mut stdin).await;
	assert!(frame.starts_with("cd /srv/repo;git fetch 2>'/tmp/shellmux-test.err';"));
	assert_eq!(read_frame(&mut stdin).await, "rm -f '/tmp/shellmux-test.err'\n");
	session.on_data(b"__SHELLMUX_STDERR__0 DONE\n");
	session.wait().await.unwrap();
	session.take_output().unwrap();

	session.submit(&Command::new("/srv/repo", "true")).await.unwrap();
	let frame = read_frame(&mut stdin).await;
	assert!(frame.starts_with("cd /srv/repo;true;"));
	session.on_data(b"__SHELLMUX_STDERR__0 DONE\n");
	session.wait().await.unwrap();
	session.take_output().unwrap();
	session.submit(&Command::new("/srv/repo", "true")).await.unwrap();
	assert!(read_frame(&mut stdin).await.starts_with("cd /srv/repo;true;"));
}

#[tokio::test]
async fn test_protocol_violations_are_rejected() {
	let (session, _stdin, _stdout) = create_test_session(None, None);

	let err = session.take_output().unwrap_err();
	assert!(err.is_protocol_violation());

	session.submit(&Command::new("/srv/repo", "sleep 1")).await.unwrap();
	let err = session
		.submit(&Command::new("/srv/repo", "true"))
		.await
		.unwrap_err();
	assert!(matches!(
		err,
		Error::NotFree {
			session: 7,
			state: CommandState::Running
		}
	));
	assert!(matches!(
		session.take_output(),
		Err(Error::NotComplete {
			state: CommandState::Running,
			..
		})
	));

	session.on_data(b"__SHELLMUX_STDERR__0 DONE\n");
	assert!(session.submit(&Command::new("/srv/repo", "true")).await.is_err());
	session.take_output().unwrap();
}

#[tokio::test]
async fn test_stale_marker_does_not_complete_next_command() {
	let (session, _stdin, _stdout) = create_test_session(None, None);

	session.on_data(b"leftover 0 DONE\n");
	session.submit(&Command::new("/srv/repo", "git fetch")).await.unwrap();
	assert_eq!(session.state(), CommandState::Running);

	session.on_data(b"fetched\n__SHELLMUX_STDERR__0 DONE\n");
	session.wait().await.unwrap();
	assert_eq!(session.take_output().unwrap().stdout, b"fetched\n");
}

#[tokio::test]
async fn test_back_to_back_commands_keep_their_output_apart() {
	let (session, _stdin, _stdout) = create_test_session(None, None);

	session.submit(&Command::new("/srv/repo", "echo one")).await.unwrap();
	session.on_data(b"one\n__SHELLMUX_STDERR__0 DONE\n");
	session.wait().await.unwrap();
	assert_eq!(session.take_output().unwrap().stdout, b"one\n");

	session.submit(&Command::new("/srv/repo", "echo two")).await.unwrap();
	session.on_data(b"two\n__SHELLMUX_STDERR__1 DONE\n");
	session.wait().await.unwrap();
	let second = session.take_output().unwrap();
	assert_eq!(second.stdout, b"two\n");
	assert_eq!(second.exit_code, 1);
}

#[tokio::test]
async fn test_wait_times_out_and_closes_session() {
	let (session, _stdin, _stdout) = create_test_session(Some(Duration::from_millis(50)), None);

	session.submit(&Command::new("/srv/repo", "sleep 100")).await.unwrap();
	let err = session.wait().await.unwrap_err();
	assert!(err.is_timeout());
	assert!(session.is_closed());
	assert!(matches!(
		session.submit(&Command::new("/srv/repo", "true")).await,
		Err(Error::SessionClosed(7))
	));
}

#[tokio::test]
async fn test_shell_exit_wakes_waiter() {
	let (session, _stdin, stdout) = create_test_session(None, None);

	session.submit(&Command::new("/srv/repo", "exit")).await.unwrap();
	drop(stdout);

	let err = session.wait().await.unwrap_err();
	assert!(matches!(err, Error::SessionClosed(7)));
	assert!(session.is_closed());
	assert!(!session.is_available());
}

#[tokio::test]
async fn test_async_command_streams_to_handler_and_frees_session() {
	let (session, _stdin, _stdout) = create_test_session(None, None);
	let recorded = Arc::new(Mutex::new(Recorded::default()));

	session
		.start_async(
			&Command::new("/srv/repo", "git log"),
			Box::new(RecordingHandler(Arc::clone(&recorded))),
		)
		.await
		.unwrap();

	session.on_data(b"commit 1\n");
	session.on_data(b"commit 2\n__SHELL");
	assert_eq!(session.state(), CommandState::Running);
	session.on_data(b"MUX_STDERR__0 DONE\n");

	assert_eq!(session.state(), CommandState::Free);
	let recorded = recorded.lock();
	let streamed: Vec<u8> = recorded.chunks.concat();
	assert_eq!(streamed, b"commit 1\ncommit 2\n");
	let output = recorded.completed.as_ref().unwrap();
	assert_eq!(output.exit_code, 0);
	assert_eq!(output.stdout, b"commit 1\ncommit 2\n");
}

#[tokio::test]
async fn test_invalidating_command_flushes_tracked_paths() {
	let invalidator = Arc::new(RecordingInvalidator::default());
	let (session, _stdin, _stdout) = create_test_session(None, Some(invalidator.clone() as Arc<dyn CacheInvalidator>));
	session.track_paths([PathBuf::from("/srv/repo/.git/HEAD"), PathBuf::from("/srv/repo/.git/index")]);
	session.track_paths([PathBuf::from("/srv/repo/.git/HEAD")]);
	assert_eq!(session.tracked_paths().len(), 2);

	session.submit(&Command::new("/srv/repo", "git status")).await.unwrap();
	session.on_data(b"__SHELLMUX_STDERR__0 DONE\n");
	session.take_output().unwrap();
	assert!(invalidator.calls.lock().is_empty());

	session
		.submit(&Command::new("/srv/repo", "git commit -m x").invalidating_cache())
		.await
		.unwrap();
	session.on_data(b"__SHELLMUX_STDERR__0 DONE\n");
	session.take_output().unwrap();

	let calls = invalidator.calls.lock();
	assert_eq!(calls.len(), 1);
	assert_eq!(
		calls[0],
		vec![PathBuf::from("/srv/repo/.git/HEAD"), PathBuf::from("/srv/repo/.git/index")]
	);
}

#[tokio::test]
async fn test_lease_is_exclusive_until_dropped() {
	let (session, _stdin, _stdout) = create_test_session(None, None);

	let lease = session.try_lease().unwrap();
	assert!(!session.is_available());
	assert!(session.try_lease().is_none());
	assert_eq!(lease.id(), 7);

	drop(lease);
	assert!(session.is_available());
}

#[tokio::test]
async fn test_run_writes_stdout_to_file() {
	let (session, mut stdin, mut stdout) = create_test_session(None, None);
	let dir = tempfile::tempdir().unwrap();
	let target = dir.path().join("blob");

	let shell = tokio::spawn(async move {
		read_frame(&mut stdin).await;
		stdout
			.write_all(b"file body\n__SHELLMUX_STDERR__0 DONE\n")
			.await
			.unwrap();
		(stdin, stdout)
	});

	let output = session
		.run(&Command::new("/srv/repo", "git show HEAD:README").with_destination(Destination::file(&target)))
		.await
		.unwrap();
	assert!(output.stdout.is_empty());
	assert_eq!(std::fs::read(&target).unwrap(), b"file body\n");
	let _pipes = shell.await.unwrap();
}
