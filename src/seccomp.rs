//! Facilities relating to the seccomp feature of Linux systems, based on the
//! `seccomp_sys` crate which further depends on the `libseccomp` native library.
//!
//! Use `install_allowlist` to install the fixed syscall allow-list the execution core
//! applies to every judged program when `seccomp_enabled` is set in the policy.

use std::error::Error;
use std::ffi::CString;
use std::fmt::{Display, Formatter};

use seccomp_sys::*;

/// The error type used in this module.
#[derive(Clone, Copy, Debug)]
pub struct SeccompError {
    errno: i32,
}

impl SeccompError {
    /// Create a new `SeccompError` instance.
    pub fn new(errno: i32) -> Self {
        SeccompError { errno }
    }

    /// Get the error number returned by the underlying `libseccomp` library.
    pub fn errno(&self) -> i32 {
        self.errno
    }
}

impl Display for SeccompError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("seccomp error: {}", self.errno))
    }
}

impl Error for SeccompError {}

/// The result type used in this module.
pub type Result<T> = std::result::Result<T, SeccompError>;

/// Represent the action to take on a specific syscall.
#[derive(Clone, Copy, Debug)]
#[allow(dead_code)]
pub enum Action {
    /// Allow the syscall.
    Allow,

    /// Kill the calling thread immediately.
    KillThread,

    /// Kill the calling process immediately, as though it were killed by the delivery
    /// of a `SIGSYS` signal.
    KillProcess,

    /// Send a `SIGSYS` signal to the calling thread.
    Trap,

    /// The called syscall immediately returns with the specified return value.
    Errno(u32),

    /// Notify any tracing thread with the specified value.
    Trace(u32),
}

impl Action {
    /// Convert the `Action` enum value into native, libseccomp compatible format.
    pub fn as_native(&self) -> u32 {
        match self {
            Action::Allow => SCMP_ACT_ALLOW,
            Action::KillThread => SCMP_ACT_KILL,
            Action::KillProcess => SCMP_ACT_KILL_PROCESS,
            Action::Trap => SCMP_ACT_TRAP,
            Action::Errno(errno) => SCMP_ACT_ERRNO(*errno),
            Action::Trace(sig) => SCMP_ACT_TRACE(*sig),
        }
    }
}

/// Represent a single syscall filter rule.
#[derive(Clone, Copy, Debug)]
pub struct SyscallFilter {
    /// The syscall ID to filter.
    pub syscall: i32,

    /// The action to perform when the specified syscall is invoked.
    pub action: Action,
}

impl SyscallFilter {
    /// Create a new `SyscallFilter` value filtering on the given syscall with the
    /// given action.
    pub fn new(syscall: i32, action: Action) -> Self {
        SyscallFilter { syscall, action }
    }
}

/// Resolve a syscall name (e.g. `"read"`) to its native syscall number on the current
/// architecture.
pub fn resolve_syscall_name(name: &str) -> Option<i32> {
    let native_name = CString::new(name).ok()?;
    let id = unsafe { seccomp_syscall_resolve_name(native_name.as_ptr()) };
    if id < 0 {
        None
    } else {
        Some(id)
    }
}

/// The syscalls a judged program is allowed to invoke once a filter is installed. This
/// is a deliberately narrow, inherited allow-list: it covers the syscalls the reference
/// execution core allowed and nothing more. It is known to be too narrow for programs
/// that rely on a dynamic loader doing anything beyond the most basic mapping dance;
/// widening it is left as a documented limitation rather than attempted speculatively.
pub const ALLOWED_SYSCALLS: &[&str] = &[
    "read",
    "write",
    "open",
    "close",
    "fstat",
    "mmap",
    "mprotect",
    "munmap",
    "brk",
    "rt_sigaction",
    "rt_sigprocmask",
    "rt_sigreturn",
    "ioctl",
    "access",
    "exit_group",
    "exit",
];

/// Install a default-kill seccomp filter that allows exactly the syscalls named in
/// `ALLOWED_SYSCALLS`. Syscall names that fail to resolve on the current architecture
/// are silently skipped, since the set is meant to be conservative rather than exact
/// across every target.
pub fn install_allowlist() -> Result<()> {
    let filters = ALLOWED_SYSCALLS.iter()
        .filter_map(|name| resolve_syscall_name(name))
        .map(|id| SyscallFilter::new(id, Action::Allow));
    apply_syscall_filters(filters)
}

/// Apply a list of syscall filters to the calling process. After calling this
/// function, if the calling process invokes any syscall not on the given list, the
/// kernel kills the calling process immediately; otherwise the corresponding action for
/// the syscall is performed.
pub fn apply_syscall_filters<T>(filters: T) -> Result<()>
    where T: IntoIterator<Item = SyscallFilter> {
    let ctx = unsafe { seccomp_init(SCMP_ACT_KILL) };
    if ctx.is_null() {
        return Err(SeccompError::new(-1));
    }

    for filter in filters {
        let ret = unsafe {
            seccomp_rule_add_array(
                ctx, filter.action.as_native(), filter.syscall, 0, std::ptr::null())
        };
        if ret < 0 {
            return Err(SeccompError::new(ret));
        }
    }

    let ret = unsafe { seccomp_load(ctx) };
    if ret < 0 {
        return Err(SeccompError::new(ret));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::resolve_syscall_name;

    #[test]
    fn test_resolve_known_syscall() {
        assert!(resolve_syscall_name("read").is_some());
        assert!(resolve_syscall_name("write").is_some());
    }

    #[test]
    fn test_resolve_unknown_syscall() {
        assert_eq!(resolve_syscall_name("not_a_real_syscall_name"), None);
    }
}
