//! This crate implements the execution-sandbox core of an automated program-judging
//! service. Given a compiled user binary, a directory of input cases, and a resource
//! policy, it runs the binary once per case inside an isolated environment, observes
//! resource usage, classifies the outcome, and emits a verdict record per case.
//!
//! The crate is organized the way the sandboxing logic it grew from was organized:
//!
//! * Normal process operations: fork, redirect, wait, classify;
//!
//! * Resource limits: CPU time, memory, output size, process count, stack size;
//!
//! * Process syscall filtering via seccomp;
//!
//! * Filesystem jailing via chroot.

#![cfg(unix)]

#[macro_use]
extern crate error_chain;

mod case_runner;
mod child;
mod environment;
mod error;
mod policy;
mod result_sink;
mod rlimits;
mod seccomp;
mod supervisor;
mod verdict;

use std::path::{Path, PathBuf};

pub use error::{Error, ErrorKind, Result};
pub use policy::Policy;
pub use verdict::VerdictRecord;

use environment::SandboxEnvironment;

/// Owns the policy and sandbox environment for one run and exposes the single entry
/// point the CLI calls.
pub struct Engine {
    policy: Policy,
    env: SandboxEnvironment,
}

impl Engine {
    /// Load the policy from `policy_path` and prepare a fresh sandbox at
    /// `sandbox_dir`.
    pub fn new(policy_path: &Path, sandbox_dir: &Path) -> Result<Engine> {
        let policy = Policy::load(policy_path)?;
        let env = SandboxEnvironment::prepare(sandbox_dir)?;
        Ok(Engine { policy, env })
    }

    /// Run every case discovered under `stdin_dir` against `binary`, capturing outputs
    /// under `stdout_dir`, and return one verdict record per case.
    pub fn run_all(
        &self,
        binary: &Path,
        stdin_dir: &Path,
        stdout_dir: &Path,
    ) -> Result<Vec<VerdictRecord>> {
        case_runner::run_all(&self.policy, &self.env, binary, stdin_dir, stdout_dir)
    }

    /// Write `records` to `result_path` as the documented result artifact.
    pub fn write_result(&self, records: &[VerdictRecord], result_path: &Path) -> Result<()> {
        result_sink::write(records, result_path)
    }
}

/// Convenience entry point used by the CLI binary: loads the policy, prepares the
/// sandbox, runs every case, and writes the result artifact, all in one call.
pub fn execute(
    policy_path: &Path,
    sandbox_dir: &Path,
    binary: &Path,
    stdin_dir: &Path,
    stdout_dir: &Path,
    result_path: &Path,
) -> Result<Vec<VerdictRecord>> {
    let engine = Engine::new(policy_path, sandbox_dir)?;
    let records = engine.run_all(binary, stdin_dir, stdout_dir)?;
    engine.write_result(&records, result_path)?;
    Ok(records)
}

/// Default relative path of the policy file, matching the reference layout.
pub fn default_policy_path() -> PathBuf {
    PathBuf::from("limits.json")
}
