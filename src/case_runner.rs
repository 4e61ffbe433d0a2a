//! Iterates the discovered cases, runs each one through the sandbox, and assembles the
//! aggregate set of verdicts.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, trace, warn};

use crate::child;
use crate::environment::SandboxEnvironment;
use crate::error::{Result, ResultExt, ErrorKind};
use crate::policy::Policy;
use crate::supervisor::{self, SystemFailure};
use crate::verdict::VerdictRecord;

/// Discover `<name>.in` files under `stdin_dir`, sorted by name for reproducible run
/// output, and return their stems paired with their full paths.
fn discover_cases(stdin_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut cases = Vec::new();

    let entries = fs::read_dir(stdin_dir)
        .chain_err(|| ErrorKind::SandboxSetupFailed(
            format!("cannot read input directory {}", stdin_dir.display())))?;

    for entry in entries {
        let entry = entry
            .chain_err(|| ErrorKind::SandboxSetupFailed("cannot read directory entry".to_owned()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("in") {
            continue;
        }
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.to_owned(),
            None => continue,
        };
        cases.push((stem, path));
    }

    cases.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(cases)
}

/// Run every case discovered under `stdin_dir` against `binary`, using `env` as the
/// reusable sandbox and `policy` as the resource policy, capturing outputs into
/// `stdout_dir`. Returns one verdict record per case, in case-name order.
pub fn run_all(
    policy: &Policy,
    env: &SandboxEnvironment,
    binary: &Path,
    stdin_dir: &Path,
    stdout_dir: &Path,
) -> Result<Vec<VerdictRecord>> {
    fs::create_dir_all(stdout_dir)
        .chain_err(|| ErrorKind::SandboxSetupFailed(
            format!("cannot create output directory {}", stdout_dir.display())))?;

    let cases = discover_cases(stdin_dir)?;
    info!("discovered {} case(s) under {}", cases.len(), stdin_dir.display());

    let mut records = Vec::with_capacity(cases.len());
    for (name, input_path) in cases {
        trace!("running case {}", name);
        let record = run_one_case(policy, env, binary, &name, &input_path, stdout_dir);
        records.push(record);
    }

    Ok(records)
}

fn run_one_case(
    policy: &Policy,
    env: &SandboxEnvironment,
    binary: &Path,
    name: &str,
    input_path: &Path,
    stdout_dir: &Path,
) -> VerdictRecord {
    if let Err(e) = env.stage_case(binary, input_path) {
        warn!("case {} failed to stage: {}", name, e);
        return VerdictRecord::system_error(name.to_owned(), e.to_string());
    }

    let result = supervisor::supervise(policy, |write_fd, read_fd| {
        child::run(write_fd, read_fd, env, policy)
    });

    match result {
        Ok(outcome) => {
            let output = env.read_output();
            let dest = stdout_dir.join(format!("{}.out", name));
            if let Err(e) = env.harvest_output(&dest) {
                warn!("case {} output harvest failed: {}", name, e);
            }
            VerdictRecord::from_outcome(name.to_owned(), outcome, output)
        }
        Err(SystemFailure(msg)) => {
            warn!("case {} hit a system error: {}", name, msg);
            VerdictRecord::system_error(name.to_owned(), msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_cases_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.in"), "").unwrap();
        fs::write(dir.path().join("a.in"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let cases = discover_cases(dir.path()).unwrap();
        let names: Vec<&str> = cases.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
