//! Child-process execution.
//!
//! Two entry points: [`run_to_completion`] for build-style commands whose
//! output is simply captured, and [`run_until_deadline`] for launched
//! binaries that are polled for a bounded time, audited, then terminated
//! (gracefully, escalating to kill).

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use naprel_error::{NaprelError, Result};
use tracing::{debug, warn};

use crate::interrupt;
use crate::platform::{CommandSpec, PlatformProfile};
use crate::policy::LibraryPolicy;

/// Fixed polling interval while waiting on a launched binary.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Grace window between the graceful-termination signal and forced kill.
pub const DEFAULT_REAP_GRACE: Duration = Duration::from_secs(10);

/// One launched-binary run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub command: CommandSpec,
    pub cwd: PathBuf,
    /// Installation root under which any loaded library is accepted.
    pub accepted_root: Option<PathBuf>,
    /// Whether the child exiting on its own (with `success_exit_code`)
    /// is the expected outcome.
    pub expect_early_exit: bool,
    pub success_exit_code: i32,
    /// How long to poll before declaring the child healthy (or hung).
    pub wait: Duration,
    /// Windows editor quirk: stdout is sometimes left uncaptured.
    pub capture_stdout: bool,
    pub reap_grace: Duration,
}

impl RunRequest {
    #[must_use]
    pub fn new(command: CommandSpec, cwd: PathBuf, wait: Duration) -> Self {
        Self {
            command,
            cwd,
            accepted_root: None,
            expect_early_exit: false,
            success_exit_code: 0,
            wait,
            capture_stdout: true,
            reap_grace: DEFAULT_REAP_GRACE,
        }
    }

    #[must_use]
    pub fn accepted_root(mut self, root: PathBuf) -> Self {
        self.accepted_root = Some(root);
        self
    }

    #[must_use]
    pub fn expect_early_exit(mut self, expect: bool) -> Self {
        self.expect_early_exit = expect;
        self
    }

    #[must_use]
    pub fn capture_stdout(mut self, capture: bool) -> Self {
        self.capture_stdout = capture;
        self
    }
}

/// What came back from a launched-binary run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub unexpected_libraries: Vec<PathBuf>,
    /// The child's own exit code; `None` when the harness terminated it.
    pub exit_code: Option<i32>,
}

impl RunOutcome {
    /// Library paths as strings for the results tree.
    #[must_use]
    pub fn unexpected_library_strings(&self) -> Vec<String> {
        self.unexpected_libraries
            .iter()
            .map(|p| p.display().to_string())
            .collect()
    }
}

/// Run a build-style command to completion, capturing output.
pub fn run_to_completion(command: &CommandSpec, cwd: &Path) -> Result<(i32, String, String)> {
    debug!(command = %command.display(), cwd = %cwd.display(), "running to completion");
    let output = Command::new(absolute_program(command, cwd))
        .args(&command.args)
        .current_dir(cwd)
        .output()
        .map_err(|source| NaprelError::Spawn {
            command: command.display(),
            source,
        })?;
    Ok((
        output.status.code().unwrap_or(-1),
        lossy(output.stdout),
        lossy(output.stderr),
    ))
}

/// Launch a binary, poll it for up to `request.wait`, audit it, and stop it.
///
/// - Child still running at the deadline: the live audit runs (Linux), a
///   graceful-termination signal is sent, escalating to kill after the
///   grace window. Success iff an early exit was *not* expected. A child
///   that refuses graceful termination costs a warning, not the phase.
/// - Child already exited: success iff an early exit was expected *and*
///   the exit code matches. Its exit code is honoured either way.
///
/// Captured stderr is fed to the post-mortem audit (macOS).
pub fn run_until_deadline(
    profile: &PlatformProfile,
    policy: &LibraryPolicy,
    request: &RunRequest,
) -> Result<RunOutcome> {
    debug!(
        command = %request.command.display(),
        cwd = %request.cwd.display(),
        wait_secs = request.wait.as_secs(),
        expect_early_exit = request.expect_early_exit,
        "launching binary"
    );

    let mut cmd = Command::new(absolute_program(&request.command, &request.cwd));
    cmd.args(&request.command.args).current_dir(&request.cwd);
    for (key, value) in profile.child_env() {
        cmd.env(key, value);
    }
    cmd.stdout(if request.capture_stdout {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| NaprelError::Spawn {
        command: request.command.display(),
        source,
    })?;

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    // Poll until the deadline, leaving early if the child exits on its own.
    let deadline = Instant::now() + request.wait;
    let mut status = child.try_wait()?;
    while status.is_none() && Instant::now() < deadline && !interrupt::requested() {
        thread::sleep(POLL_INTERVAL);
        status = child.try_wait()?;
    }

    if interrupt::requested() && status.is_none() {
        stop_child(&mut child, request.reap_grace);
        drain(stdout_reader);
        drain(stderr_reader);
        return Err(NaprelError::Interrupted);
    }

    let (success, exit_code, mut unexpected) = match status {
        // Still running at the deadline: audit live, then stop it.
        None => {
            let unexpected =
                profile.audit_live(child.id(), request.accepted_root.as_deref(), policy);
            stop_child(&mut child, request.reap_grace);
            (!request.expect_early_exit, None, unexpected)
        }
        // Exited on its own: honour its exit code.
        Some(status) => {
            let code = status.code();
            let success =
                request.expect_early_exit && code == Some(request.success_exit_code);
            (success, code, Vec::new())
        }
    };

    let stdout = drain(stdout_reader);
    let stderr = drain(stderr_reader);

    unexpected.extend(profile.audit_post_mortem(
        &stderr,
        request.accepted_root.as_deref(),
        policy,
    ));

    Ok(RunOutcome {
        success,
        stdout,
        stderr,
        unexpected_libraries: unexpected,
        exit_code,
    })
}

/// Graceful stop with kill escalation. Reaps the child before returning.
fn stop_child(child: &mut Child, grace: Duration) {
    signal_terminate(child);

    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) if Instant::now() >= deadline => break,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => {
                warn!(error = %err, "couldn't poll child while stopping it");
                break;
            }
        }
    }

    warn!("child didn't close on terminate; sending kill signal");
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn signal_terminate(child: &mut Child) {
    let pid = child.id() as libc::pid_t;
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn signal_terminate(child: &mut Child) {
    // No graceful signal on Windows; kill outright.
    let _ = child.kill();
}

fn spawn_reader<R: Read + Send + 'static>(mut stream: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        buf
    })
}

fn drain(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map_or_else(String::new, lossy)
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Resolve a relative program path against the working directory when it
/// exists there (app-local scripts), otherwise leave it to PATH lookup.
fn absolute_program(command: &CommandSpec, cwd: &Path) -> PathBuf {
    if command.program.is_absolute() {
        return command.program.clone();
    }
    let local = cwd.join(&command.program);
    if local.exists() {
        local
    } else {
        command.program.clone()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::platform::{Platform, PlatformProfile};

    fn profile() -> PlatformProfile {
        // Windows profile: no live audit, so tests don't depend on lsof.
        PlatformProfile::new(Platform::Windows, "x86_64", 1)
    }

    fn policy() -> LibraryPolicy {
        LibraryPolicy::builtin(Platform::Windows, "x86_64").unwrap()
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_owned(), script.to_owned()],
        }
    }

    fn request(script: &str, wait: Duration) -> RunRequest {
        RunRequest::new(sh(script), std::env::temp_dir(), wait)
    }

    #[test]
    fn expected_early_exit_succeeds() {
        let req = request("echo hi; exit 0", Duration::from_secs(6)).expect_early_exit(true);
        let outcome = run_until_deadline(&profile(), &policy(), &req).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.stdout.contains("hi"));
    }

    #[test]
    fn crash_records_exit_code() {
        let req = request("exit 134", Duration::from_secs(6));
        let outcome = run_until_deadline(&profile(), &policy(), &req).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(134));
    }

    #[test]
    fn wrong_exit_code_fails_even_when_early_exit_expected() {
        let req = request("exit 2", Duration::from_secs(6)).expect_early_exit(true);
        let outcome = run_until_deadline(&profile(), &policy(), &req).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(2));
    }

    #[test]
    fn healthy_long_runner_is_terminated_and_succeeds() {
        let req = request("sleep 30", Duration::from_secs(1));
        let outcome = run_until_deadline(&profile(), &policy(), &req).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, None);
    }

    #[test]
    fn still_running_fails_when_early_exit_was_expected() {
        let req = request("sleep 30", Duration::from_secs(1)).expect_early_exit(true);
        let outcome = run_until_deadline(&profile(), &policy(), &req).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, None);
    }

    #[test]
    fn sigterm_refusal_escalates_to_kill_but_still_succeeds() {
        let mut req = request("trap '' TERM; sleep 30", Duration::from_secs(1));
        req.reap_grace = Duration::from_secs(2);
        let outcome = run_until_deadline(&profile(), &policy(), &req).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, None);
    }

    #[test]
    fn stderr_is_captured() {
        let req = request("echo oops >&2; exit 7", Duration::from_secs(6));
        let outcome = run_until_deadline(&profile(), &policy(), &req).unwrap();
        assert!(outcome.stderr.contains("oops"));
        assert_eq!(outcome.exit_code, Some(7));
    }

    #[test]
    fn spawn_failure_is_reported() {
        let req = RunRequest::new(
            CommandSpec {
                program: PathBuf::from("/nonexistent/definitely-not-a-binary"),
                args: vec![],
            },
            std::env::temp_dir(),
            Duration::from_secs(1),
        );
        let err = run_until_deadline(&profile(), &policy(), &req);
        assert!(matches!(err, Err(NaprelError::Spawn { .. })));
    }

    #[test]
    fn run_to_completion_captures_both_streams() {
        let (code, stdout, stderr) =
            run_to_completion(&sh("echo out; echo err >&2; exit 3"), &std::env::temp_dir())
                .unwrap();
        assert_eq!(code, 3);
        assert!(stdout.contains("out"));
        assert!(stderr.contains("err"));
    }
}
