//! What the forked child does between `fork` and `execve`.
//!
//! The sequence below must run in exactly this order: redirecting the standard streams
//! before applying resource limits would let a slow write to an unlimited stdout steal
//! CPU time unaccounted for; installing the syscall filter before the chroot would
//! leave the filter unable to see the `chroot`/`chdir` calls it still needs to allow;
//! and `execve` must always be the last thing the child does, since there is no
//! meaningful way to recover inside this process once isolation has begun.
//!
//! Every step before `execve` that can fail writes a short diagnostic to the error
//! pipe and terminates; nothing past the standard-stream redirection is allowed to log
//! anywhere else, since stderr is by then pointed at the case's captured output file.

use std::ffi::CString;
use std::fs::File;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::path::Path;

use nix::unistd;

use crate::environment::SandboxEnvironment;
use crate::policy::Policy;
use crate::rlimits::{self, Resource};
use crate::seccomp;

/// Exit code used when the child cannot even report a diagnostic usefully; mirrors the
/// convention of reserving a high, otherwise-unused code for "never got to exec".
const SETUP_FAILURE_EXIT_CODE: i32 = 127;

/// Run the child side of one case. Never returns: every path out of this function is
/// either a successful `execve` or a `std::process::exit`.
pub fn run(
    error_pipe_write: RawFd,
    error_pipe_read: RawFd,
    env: &SandboxEnvironment,
    policy: &Policy,
) -> ! {
    // Step 1: close the read end of the error channel; only the parent reads it.
    let _ = unistd::close(error_pipe_read);

    // Step 2: open the staged input and the sandbox output, pre-chroot so the sandbox
    // root's real path still resolves.
    let stdin_file = match File::open(env.input_path()) {
        Ok(f) => f,
        Err(e) => fail(error_pipe_write, &format!("cannot open case input: {}", e)),
    };
    let stdout_file = match File::create(env.output_path()) {
        Ok(f) => f,
        Err(e) => fail(error_pipe_write, &format!("cannot open case output: {}", e)),
    };
    let stderr_file = match stdout_file.try_clone() {
        Ok(f) => f,
        Err(e) => fail(error_pipe_write, &format!("cannot duplicate case output: {}", e)),
    };

    // Step 3: redirect the standard streams, then drop the now-redundant originals.
    if let Err(e) = redirect(stdin_file, stdout_file, stderr_file) {
        fail(error_pipe_write, &format!("cannot redirect standard streams: {}", e));
    }

    // Step 4: apply resource limits. Both soft and hard caps are set to the policy
    // value so the child cannot raise its own ceiling.
    if let Err(e) = apply_resource_limits(policy) {
        fail(error_pipe_write, &format!("cannot apply resource limits: {}", e));
    }

    // Step 5: install the syscall filter. Failure here is not fatal: the child simply
    // runs unfiltered, since a judge that refuses to run a program because the
    // optional hardening layer failed to load is worse than one that runs it without
    // that layer. Nothing is logged here: standard error is already redirected into
    // the case's captured output at this point, so any diagnostic has nowhere to go
    // but the error pipe, and a non-fatal step doesn't warrant one.
    if policy.seccomp_enabled {
        let _ = seccomp::install_allowlist();
    }

    // Step 6: substitute the filesystem root. Fatal: a program that believes it is
    // jailed but isn't must never run.
    if policy.chroot_enabled {
        if let Err(e) = enter_chroot(env.root()) {
            fail(error_pipe_write, &format!("cannot enter chroot: {}", e));
        }
    }

    // Step 7: replace the process image.
    let binary_path = if policy.chroot_enabled {
        env.chrooted_binary_path()
    } else {
        env.binary_path()
    };
    if let Err(e) = exec_program(&binary_path) {
        fail(error_pipe_write, &format!("cannot execute program: {}", e));
    }
    unreachable!("execve returned without an error")
}

/// Write `msg` to the error pipe, best-effort, then exit. Always diverges.
fn fail(write_fd: RawFd, msg: &str) -> ! {
    let _ = unistd::write(write_fd, msg.as_bytes());
    std::process::exit(SETUP_FAILURE_EXIT_CODE);
}

fn redirect(stdin: File, stdout: File, stderr: File) -> nix::Result<()> {
    unistd::dup2(stdin.into_raw_fd(), libc::STDIN_FILENO)?;
    unistd::dup2(stdout.into_raw_fd(), libc::STDOUT_FILENO)?;
    unistd::dup2(stderr.into_raw_fd(), libc::STDERR_FILENO)?;
    Ok(())
}

fn apply_resource_limits(policy: &Policy) -> std::io::Result<()> {
    rlimits::setrlimit_hard(Resource::CPUTime, policy.cpu_time_limit_secs())?;
    rlimits::setrlimit_hard(Resource::AddressSpace, policy.memory_limit_bytes())?;
    rlimits::setrlimit_hard(Resource::FileSize, policy.output_limit)?;
    rlimits::setrlimit_hard(Resource::NumProcesses, policy.process_limit)?;
    rlimits::setrlimit_hard(Resource::StackSize, policy.stack_limit_bytes())?;
    Ok(())
}

/// Change the filesystem root to `root` and the working directory to `/` inside it.
/// `nix` 0.15 has no safe `chroot` wrapper, so this drops to raw `libc`, the same
/// approach used for the same call elsewhere in the example pack.
fn enter_chroot(root: &Path) -> std::io::Result<()> {
    let native_root = CString::new(root.as_os_str().to_str().unwrap())
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;

    if unsafe { libc::chroot(native_root.as_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let native_cwd = CString::new("/").unwrap();
    if unsafe { libc::chdir(native_cwd.as_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    Ok(())
}

/// Replace the process image with the program at `path`, passing no arguments and an
/// empty environment. Returns only on failure; a successful call never returns here.
fn exec_program(path: &Path) -> nix::Result<()> {
    let native_path = CString::new(path.as_os_str().to_str().unwrap()).unwrap();
    let argv = [native_path.clone()];
    let envp: [CString; 0] = [];

    unistd::execve(&native_path, &argv, &envp)?;
    Ok(())
}
