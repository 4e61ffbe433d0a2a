//! Serializes the aggregate of verdict records to the result artifact.

use std::path::Path;

use serde::Serialize;

use crate::error::{Result, ResultExt, ErrorKind};
use crate::verdict::VerdictRecord;

/// The top-level shape of the result artifact: a single object holding the list of
/// per-case verdicts under `test_cases`.
#[derive(Serialize)]
struct ResultDocument<'a> {
    test_cases: &'a [VerdictRecord],
}

/// Write `records` to `path` as the result artifact. Writes to a sibling temp file
/// first and renames it into place, so a crash or a `kill -9` mid-write never leaves a
/// half-written artifact at `path`.
pub fn write(records: &[VerdictRecord], path: &Path) -> Result<()> {
    let document = ResultDocument { test_cases: records };

    let tmp_path = path.with_extension("json.tmp");
    let file = std::fs::File::create(&tmp_path)
        .chain_err(|| ErrorKind::ResultWriteFailed(
            format!("cannot create {}", tmp_path.display())))?;
    serde_json::to_writer_pretty(file, &document)
        .chain_err(|| ErrorKind::ResultWriteFailed("cannot serialize result document".to_owned()))?;

    std::fs::rename(&tmp_path, path)
        .chain_err(|| ErrorKind::ResultWriteFailed(
            format!("cannot move result into place at {}", path.display())))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_round_trips_through_serde_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("execute_message.json");

        let records = vec![VerdictRecord::system_error("case1".to_owned(), "boom".to_owned())];
        write(&records, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["test_cases"][0]["test_name"], "case1");
        assert_eq!(parsed["test_cases"][0]["system_error"], true);
    }

    #[test]
    fn test_write_leaves_no_temp_file_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("execute_message.json");
        write(&[], &path).unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("execute_message.json.tmp").exists());
    }
}
