//! The sandbox's on-disk filesystem tree.
//!
//! A `SandboxEnvironment` owns a directory that is reused across every case of one
//! run. It is populated once with the minimal runtime a judged program expects to find
//! at its filesystem root (the structured replacement for the shell `mkdir`/`cp`
//! sequence the reference implementation used), then staged and harvested once per
//! case, and removed when the run finishes.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};

use crate::error::{Result, ResultExt, ErrorKind};

/// Host directories copied into the sandbox so that a dynamically linked judged
/// program can still find its loader and shared libraries once chrooted. The
/// destination directory is always created, but population from the host is skipped
/// when the host path doesn't exist, since not every platform lays out its library
/// tree the same way.
const RUNTIME_LIBRARY_DIRS: &[&str] = &["/lib", "/lib64", "/usr/lib"];

/// Relative path, inside the sandbox, of the staged user binary.
const BINARY_PATH: &str = "test";

/// Relative path, inside the sandbox, of the staged case input.
const INPUT_PATH: &str = "input";

/// Relative path, inside the sandbox, of the case output the child produces.
const OUTPUT_PATH: &str = "output";

/// An isolated filesystem subtree hosting one program's execution.
pub struct SandboxEnvironment {
    root: PathBuf,
}

impl SandboxEnvironment {
    /// Create and populate the sandbox directory at `root`. Any previous contents at
    /// `root` are removed first.
    pub fn prepare(root: &Path) -> Result<SandboxEnvironment> {
        if root.exists() {
            fs::remove_dir_all(root)
                .chain_err(|| ErrorKind::SandboxSetupFailed(
                    format!("cannot clear stale sandbox at {}", root.display())))?;
        }
        fs::create_dir_all(root)
            .chain_err(|| ErrorKind::SandboxSetupFailed(
                format!("cannot create sandbox root {}", root.display())))?;

        fs::create_dir_all(root.join("tmp"))
            .chain_err(|| ErrorKind::SandboxSetupFailed("cannot create /tmp".to_owned()))?;
        fs::create_dir_all(root.join("bin"))
            .chain_err(|| ErrorKind::SandboxSetupFailed("cannot create /bin".to_owned()))?;

        for dir in RUNTIME_LIBRARY_DIRS {
            let sandbox_dir = root.join(dir.trim_start_matches('/'));
            fs::create_dir_all(&sandbox_dir)
                .chain_err(|| ErrorKind::SandboxSetupFailed(
                    format!("cannot create {}", sandbox_dir.display())))?;

            let host_dir = Path::new(dir);
            if !host_dir.is_dir() {
                continue;
            }
            copy_dir_recursive(host_dir, &sandbox_dir)
                .chain_err(|| ErrorKind::SandboxSetupFailed(
                    format!("cannot populate {}", sandbox_dir.display())))?;
        }

        debug!("sandbox prepared at {}", root.display());
        Ok(SandboxEnvironment { root: root.to_path_buf() })
    }

    /// Absolute path to the sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path at which the staged binary is expected to be found.
    pub fn binary_path(&self) -> PathBuf {
        self.root.join(BINARY_PATH)
    }

    /// Path, relative to the sandbox root, at which the staged binary will be found
    /// once the child has chrooted.
    pub fn chrooted_binary_path(&self) -> PathBuf {
        PathBuf::from("/").join(BINARY_PATH)
    }

    /// Absolute path to the staged case input.
    pub fn input_path(&self) -> PathBuf {
        self.root.join(INPUT_PATH)
    }

    /// Absolute path to the case output file, as seen from outside the sandbox.
    pub fn output_path(&self) -> PathBuf {
        self.root.join(OUTPUT_PATH)
    }

    /// Copy the user binary and the case input into their fixed staging locations,
    /// overwriting any previous copy, and truncate the output location.
    pub fn stage_case(&self, binary: &Path, input: &Path) -> Result<()> {
        fs::copy(binary, self.binary_path())
            .chain_err(|| ErrorKind::SandboxSetupFailed(
                format!("cannot stage binary {}", binary.display())))?;
        set_executable(&self.binary_path())
            .chain_err(|| ErrorKind::SandboxSetupFailed(
                "cannot mark staged binary executable".to_owned()))?;

        fs::copy(input, self.input_path())
            .chain_err(|| ErrorKind::SandboxSetupFailed(
                format!("cannot stage input {}", input.display())))?;

        // Truncate (or create) the output file so a previous case's leftovers never
        // leak into this one's capture.
        fs::File::create(self.output_path())
            .chain_err(|| ErrorKind::SandboxSetupFailed(
                "cannot truncate case output".to_owned()))?;

        trace!("staged case: binary={}, input={}", binary.display(), input.display());
        Ok(())
    }

    /// Copy the sandbox's case output to `dest`, if it exists. Absence of the output
    /// file is not an error: the child may have died before producing any output.
    pub fn harvest_output(&self, dest: &Path) -> Result<()> {
        let output = self.output_path();
        if !output.exists() {
            return Ok(());
        }

        if let Err(e) = fs::copy(&output, dest) {
            warn!("failed to harvest output from {}: {}", output.display(), e);
        }
        Ok(())
    }

    /// Read the captured output back, for embedding directly into a verdict. Returns
    /// an empty string if no output was produced.
    pub fn read_output(&self) -> String {
        fs::read_to_string(self.output_path()).unwrap_or_default()
    }

    /// Remove the sandbox root. Best-effort: failures are logged, never surfaced.
    pub fn destroy(&self) {
        if let Err(e) = fs::remove_dir_all(&self.root) {
            warn!("failed to remove sandbox {}: {}", self.root.display(), e);
        }
    }
}

impl Drop for SandboxEnvironment {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Recursively copy `src` onto `dst`, creating directories as needed.
fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dst_path = dst.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dst_path)?;
        } else if file_type.is_symlink() {
            // Preserve symlinks (common for versioned shared libraries) instead of
            // following and duplicating their target.
            let target = fs::read_link(entry.path())?;
            let _ = fs::remove_file(&dst_path);
            std::os::unix::fs::symlink(target, &dst_path)?;
        } else {
            fs::copy(entry.path(), &dst_path)?;
        }
    }
    Ok(())
}

/// Ensure the file at `path` has the owner-executable bit set.
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_prepare_creates_library_dirs_even_when_host_path_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox_root = dir.path().join("sandbox");

        let env = SandboxEnvironment::prepare(&sandbox_root).unwrap();
        for lib_dir in RUNTIME_LIBRARY_DIRS {
            let sandbox_dir = env.root().join(lib_dir.trim_start_matches('/'));
            assert!(sandbox_dir.is_dir(), "{} was not created", sandbox_dir.display());
        }
    }

    #[test]
    fn test_prepare_and_destroy_leaves_no_residue() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox_root = dir.path().join("sandbox");

        {
            let env = SandboxEnvironment::prepare(&sandbox_root).unwrap();
            assert!(env.root().exists());
        }

        assert!(!sandbox_root.exists());
    }

    #[test]
    fn test_stage_and_harvest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox_root = dir.path().join("sandbox");
        let env = SandboxEnvironment::prepare(&sandbox_root).unwrap();

        let binary = dir.path().join("prog");
        fs::write(&binary, b"#!/bin/sh\necho hi\n").unwrap();
        let input = dir.path().join("case.in");
        fs::write(&input, b"1 2\n").unwrap();

        env.stage_case(&binary, &input).unwrap();
        assert!(env.binary_path().exists());
        assert!(env.input_path().exists());

        let mut output_file = fs::File::create(env.output_path()).unwrap();
        output_file.write_all(b"hi\n").unwrap();
        drop(output_file);

        assert_eq!(env.read_output(), "hi\n");

        let dest = dir.path().join("case.out");
        env.harvest_output(&dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "hi\n");
    }

    #[test]
    fn test_harvest_missing_output_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox_root = dir.path().join("sandbox");
        let env = SandboxEnvironment::prepare(&sandbox_root).unwrap();
        fs::remove_file(env.output_path()).ok();

        let dest = dir.path().join("case.out");
        assert!(env.harvest_output(&dest).is_ok());
        assert!(!dest.exists());
    }
}
