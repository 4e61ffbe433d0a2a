//! Runs in the parent: waits for the child, measures its resource usage, and turns the
//! kernel's report into a verdict.
//!
//! The wait primitive used here (`wait4`) returns the child's termination status and
//! its kernel-accounted resource usage in one call, so there is no need for a second
//! thread polling `/proc` on a timer — the kernel itself enforces the CPU-time cap and
//! delivers a signal when it fires.

use std::time::Instant;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd;

use crate::policy::Policy;

/// Outcome of running one case, before it is folded into a `VerdictRecord`.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Exit code (for normal exits) or signal number (for signaled termination).
    pub status: i32,
    /// Wall-clock time spent waiting for the child, in milliseconds.
    pub time_used: u64,
    /// Maximum resident set size reported by the kernel, in kilobytes.
    pub memory_used: u64,
    pub time_limit_exceeded: bool,
    pub memory_limit_exceeded: bool,
    pub runtime_error: bool,
    pub system_error: bool,
    pub error_message: String,
}

impl ExecutionOutcome {
    fn normal(exit_code: i32) -> ExecutionOutcome {
        ExecutionOutcome {
            status: exit_code,
            time_used: 0,
            memory_used: 0,
            time_limit_exceeded: false,
            memory_limit_exceeded: false,
            runtime_error: false,
            system_error: false,
            error_message: String::new(),
        }
    }

    fn with_runtime_error(status: i32, message: String) -> ExecutionOutcome {
        ExecutionOutcome {
            status,
            runtime_error: true,
            error_message: message,
            ..ExecutionOutcome::normal(status)
        }
    }
}

/// A system-level failure to even launch or wait for a case (fork, pipe, or wait
/// failing at the OS level). The case runner turns this into a `system_error` verdict
/// rather than aborting the whole run.
#[derive(Debug, Clone)]
pub struct SystemFailure(pub String);

/// Fork, invoke `run_child` on the child side to set up isolation and exec the judged
/// program, and wait for it on the parent side, returning the classified outcome.
pub fn supervise(
    policy: &Policy,
    run_child: impl FnOnce(std::os::unix::io::RawFd, std::os::unix::io::RawFd) -> !,
) -> Result<ExecutionOutcome, SystemFailure> {
    let (read_fd, write_fd) = unistd::pipe()
        .map_err(|e| SystemFailure(format!("cannot create error pipe: {}", e)))?;
    // The parent only ever peeks at this pipe once, after the child has already
    // terminated, so a blocking read could never actually block here — but setting it
    // non-blocking up front keeps that property true even if wait4 ever raced ahead of
    // a still-writing child.
    fcntl(read_fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
        .map_err(|e| SystemFailure(format!("cannot configure error pipe: {}", e)))?;

    let start = Instant::now();
    let fork_result = unsafe { nix::unistd::fork() }
        .map_err(|e| SystemFailure(format!("cannot fork: {}", e)))?;

    match fork_result {
        nix::unistd::ForkResult::Child => {
            run_child(write_fd, read_fd)
        }
        nix::unistd::ForkResult::Parent { child } => {
            let _ = unistd::close(write_fd);

            let wait_result = wait_with_usage(child.as_raw());
            let elapsed = start.elapsed();

            let pipe_message = read_error_pipe(read_fd);
            let _ = unistd::close(read_fd);

            let (status, rusage) = wait_result
                .map_err(|e| SystemFailure(format!("wait4 failed: {}", e)))?;

            let mut outcome = classify(status, &rusage);
            outcome.time_used = elapsed.as_millis() as u64;

            apply_parent_side_overrides(&mut outcome, policy);

            // A diagnostic the child wrote before it ever reached `execve` (failed
            // redirect, rlimit, chroot, or exec call) is always more specific than the
            // generic "exited abnormally" text classification alone would produce, so
            // it has the final say over `error_message` once present. It never touches
            // the boolean flags, which stay exactly as classification left them.
            if let Some(msg) = pipe_message {
                outcome.error_message = msg;
            }

            Ok(outcome)
        }
    }
}

/// Non-blocking best-effort read of the child's pre-exec diagnostic, if any. Returns
/// `None` both when nothing was written and when the read itself fails (e.g. the pipe
/// was already empty and non-blocking), since neither case should fail the case.
fn read_error_pipe(read_fd: std::os::unix::io::RawFd) -> Option<String> {
    let mut buf = [0u8; 1024];
    match unistd::read(read_fd, &mut buf) {
        Ok(n) if n > 0 => Some(String::from_utf8_lossy(&buf[..n]).into_owned()),
        _ => None,
    }
}

/// Raw classification result from `wait4`: either the process exited normally with a
/// code, or it was terminated by a signal.
enum WaitStatus {
    Exited(i32),
    Signaled(i32),
}

fn wait_with_usage(pid: i32) -> std::io::Result<(WaitStatus, libc::rusage)> {
    let mut status: libc::c_int = 0;
    let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };

    let ret = unsafe { libc::wait4(pid, &mut status, 0, &mut rusage) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let wait_status = if libc::WIFSIGNALED(status) {
        WaitStatus::Signaled(libc::WTERMSIG(status))
    } else {
        WaitStatus::Exited(libc::WEXITSTATUS(status))
    };

    Ok((wait_status, rusage))
}

fn classify(status: WaitStatus, rusage: &libc::rusage) -> ExecutionOutcome {
    let memory_used = rusage.ru_maxrss as u64;

    let mut outcome = match status {
        WaitStatus::Exited(0) => ExecutionOutcome::normal(0),
        WaitStatus::Exited(code) => ExecutionOutcome::with_runtime_error(
            code,
            format!("program exited abnormally, exit code: {}", code),
        ),
        WaitStatus::Signaled(sig) => classify_signal(sig),
    };

    outcome.memory_used = memory_used;
    outcome
}

fn classify_signal(sig: i32) -> ExecutionOutcome {
    match sig {
        libc::SIGXCPU => ExecutionOutcome {
            time_limit_exceeded: true,
            error_message: "time limit exceeded".to_owned(),
            ..ExecutionOutcome::normal(sig)
        },
        libc::SIGXFSZ => ExecutionOutcome {
            error_message: "output limit exceeded".to_owned(),
            ..ExecutionOutcome::normal(sig)
        },
        libc::SIGSEGV => ExecutionOutcome::with_runtime_error(sig, "segmentation fault".to_owned()),
        libc::SIGABRT => ExecutionOutcome::with_runtime_error(sig, "program aborted".to_owned()),
        other => ExecutionOutcome::with_runtime_error(
            other,
            format!("program killed by signal: {}", other),
        ),
    }
}

/// Promote (never demote) the classification based on the parent's own wall-time and
/// memory observations. The kernel does not always deliver a limit-exceeded signal
/// before a program manages to exit normally, so these checks run unconditionally
/// after the kernel-reported status has already been classified.
fn apply_parent_side_overrides(outcome: &mut ExecutionOutcome, policy: &Policy) {
    if outcome.time_used > policy.time_limit {
        outcome.time_limit_exceeded = true;
        outcome.runtime_error = false;
        outcome.error_message = "time limit exceeded".to_owned();
    }
    if outcome.memory_used > policy.memory_limit {
        outcome.memory_limit_exceeded = true;
        outcome.runtime_error = false;
        outcome.error_message = "memory limit exceeded".to_owned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_pipe_reports_child_diagnostic() {
        let (read_fd, write_fd) = unistd::pipe().unwrap();
        fcntl(read_fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).unwrap();

        unistd::write(write_fd, b"cannot enter chroot: Permission denied").unwrap();
        let _ = unistd::close(write_fd);

        let message = read_error_pipe(read_fd);
        let _ = unistd::close(read_fd);

        assert_eq!(message.as_deref(), Some("cannot enter chroot: Permission denied"));
    }

    #[test]
    fn test_read_error_pipe_empty_is_none() {
        let (read_fd, write_fd) = unistd::pipe().unwrap();
        fcntl(read_fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).unwrap();
        let _ = unistd::close(write_fd);

        let message = read_error_pipe(read_fd);
        let _ = unistd::close(read_fd);

        assert_eq!(message, None);
    }

    fn test_policy() -> Policy {
        Policy {
            time_limit: 1000,
            memory_limit: 65536,
            output_limit: 10240,
            process_limit: 1,
            stack_limit: 8192,
            seccomp_enabled: true,
            chroot_enabled: true,
        }
    }

    #[test]
    fn test_classify_normal_exit() {
        let rusage: libc::rusage = unsafe { std::mem::zeroed() };
        let outcome = classify(WaitStatus::Exited(0), &rusage);
        assert_eq!(outcome.status, 0);
        assert!(!outcome.runtime_error);
        assert!(!outcome.time_limit_exceeded);
        assert!(outcome.error_message.is_empty());
    }

    #[test]
    fn test_classify_nonzero_exit_is_runtime_error() {
        let rusage: libc::rusage = unsafe { std::mem::zeroed() };
        let outcome = classify(WaitStatus::Exited(7), &rusage);
        assert!(outcome.runtime_error);
        assert_eq!(outcome.status, 7);
        assert_eq!(outcome.error_message, "program exited abnormally, exit code: 7");
    }

    #[test]
    fn test_classify_sigsegv() {
        let rusage: libc::rusage = unsafe { std::mem::zeroed() };
        let outcome = classify(WaitStatus::Signaled(libc::SIGSEGV), &rusage);
        assert!(outcome.runtime_error);
        assert_eq!(outcome.error_message, "segmentation fault");
    }

    #[test]
    fn test_classify_sigxcpu_sets_tle() {
        let rusage: libc::rusage = unsafe { std::mem::zeroed() };
        let outcome = classify(WaitStatus::Signaled(libc::SIGXCPU), &rusage);
        assert!(outcome.time_limit_exceeded);
        assert!(!outcome.runtime_error);
    }

    #[test]
    fn test_parent_side_override_promotes_tle() {
        let policy = test_policy();
        let mut outcome = ExecutionOutcome::normal(0);
        outcome.time_used = policy.time_limit + 1;

        apply_parent_side_overrides(&mut outcome, &policy);

        assert!(outcome.time_limit_exceeded);
        assert!(!outcome.runtime_error);
    }

    #[test]
    fn test_parent_side_override_never_demotes() {
        // A kernel-declared runtime error must survive even if the parent-side checks
        // see nothing wrong with the observed usage.
        let policy = test_policy();
        let mut outcome = ExecutionOutcome::with_runtime_error(11, "segmentation fault".to_owned());

        apply_parent_side_overrides(&mut outcome, &policy);

        assert!(outcome.runtime_error);
        assert_eq!(outcome.error_message, "segmentation fault");
    }
}
