//! The resource policy applied to every judged case.
//!
//! A `Policy` is loaded once at startup from a JSON document and handed to the
//! `Engine` for the lifetime of a run. All fields are required; a document missing any
//! of them fails to deserialize and is treated as a fatal configuration error by the
//! caller. Unrecognized keys are ignored, which is `serde_json`'s default behavior for
//! a struct without `#[serde(deny_unknown_fields)]`.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, ResultExt, ErrorKind};

/// Resource limits and sandboxing toggles for one judged program.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Policy {
    /// CPU time limit, in milliseconds.
    pub time_limit: u64,

    /// Address space limit, in kilobytes.
    pub memory_limit: u64,

    /// Maximum size of any file the child may produce, in bytes.
    pub output_limit: u64,

    /// Maximum number of processes the child's effective user may own.
    pub process_limit: u64,

    /// Stack size limit, in kilobytes.
    pub stack_limit: u64,

    /// Whether to install a syscall allow-list filter in the child.
    pub seccomp_enabled: bool,

    /// Whether to chroot the child into the sandbox directory.
    pub chroot_enabled: bool,
}

impl Policy {
    /// Load a `Policy` from a JSON file at the given path.
    ///
    /// Any missing required field or malformed document is reported as
    /// `ErrorKind::InvalidPolicy`.
    pub fn load(path: &Path) -> Result<Policy> {
        let content = std::fs::read_to_string(path)
            .chain_err(|| ErrorKind::InvalidPolicy(
                format!("cannot read {}", path.display())))?;
        let policy: Policy = serde_json::from_str(&content)
            .chain_err(|| ErrorKind::InvalidPolicy(
                format!("cannot parse {}", path.display())))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Check that every numeric field is strictly positive.
    fn validate(&self) -> Result<()> {
        if self.time_limit == 0 {
            bail!(ErrorKind::InvalidPolicy("time_limit must be positive".to_owned()));
        }
        if self.memory_limit == 0 {
            bail!(ErrorKind::InvalidPolicy("memory_limit must be positive".to_owned()));
        }
        if self.output_limit == 0 {
            bail!(ErrorKind::InvalidPolicy("output_limit must be positive".to_owned()));
        }
        if self.process_limit == 0 {
            bail!(ErrorKind::InvalidPolicy("process_limit must be positive".to_owned()));
        }
        if self.stack_limit == 0 {
            bail!(ErrorKind::InvalidPolicy("stack_limit must be positive".to_owned()));
        }

        Ok(())
    }

    /// CPU time limit rounded up to whole seconds, as required by the native
    /// `rlimit` mechanism.
    pub fn cpu_time_limit_secs(&self) -> u64 {
        (self.time_limit + 999) / 1000
    }

    /// Address space limit in bytes.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit * 1024
    }

    /// Stack limit in bytes.
    pub fn stack_limit_bytes(&self) -> u64 {
        self.stack_limit * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::Policy;
    use std::io::Write;

    fn write_policy(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_policy() {
        let file = write_policy(r#"{
            "time_limit": 1000,
            "memory_limit": 65536,
            "output_limit": 10240,
            "process_limit": 1,
            "stack_limit": 8192,
            "seccomp_enabled": true,
            "chroot_enabled": true
        }"#);

        let policy = Policy::load(file.path()).unwrap();
        assert_eq!(policy.time_limit, 1000);
        assert_eq!(policy.memory_limit, 65536);
        assert_eq!(policy.cpu_time_limit_secs(), 1);
        assert_eq!(policy.memory_limit_bytes(), 65536 * 1024);
    }

    #[test]
    fn test_load_missing_field_is_fatal() {
        let file = write_policy(r#"{
            "time_limit": 1000,
            "memory_limit": 65536,
            "output_limit": 10240,
            "process_limit": 1,
            "seccomp_enabled": true,
            "chroot_enabled": true
        }"#);

        assert_matches::assert_matches!(Policy::load(file.path()), Err(_));
    }

    #[test]
    fn test_load_ignores_unknown_field() {
        let file = write_policy(r#"{
            "time_limit": 1000,
            "memory_limit": 65536,
            "output_limit": 10240,
            "process_limit": 1,
            "stack_limit": 8192,
            "seccomp_enabled": true,
            "chroot_enabled": true,
            "future_knob": 42
        }"#);

        assert!(Policy::load(file.path()).is_ok());
    }

    #[test]
    fn test_cpu_time_limit_rounds_up() {
        let file = write_policy(r#"{
            "time_limit": 1001,
            "memory_limit": 65536,
            "output_limit": 10240,
            "process_limit": 1,
            "stack_limit": 8192,
            "seccomp_enabled": false,
            "chroot_enabled": false
        }"#);

        let policy = Policy::load(file.path()).unwrap();
        assert_eq!(policy.cpu_time_limit_secs(), 2);
    }
}
